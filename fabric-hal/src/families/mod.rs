//! Per-family backend adapters (§4.2). Each is feature-gated exactly like
//! `wgpu-hal`'s `vulkan`/`metal`/`dx12`/`gles` features, so a worker can be
//! built for only the families relevant to its platform.

#[cfg(feature = "cuda")]
pub mod cuda;
#[cfg(feature = "directml")]
pub mod directml;
#[cfg(feature = "metal")]
pub mod metal;
pub mod cpu;
#[cfg(feature = "rocm")]
pub mod rocm;
#[cfg(feature = "vulkan")]
pub mod vulkan;
