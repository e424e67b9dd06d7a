//! The error taxonomy (§7): kinds, not types, unified into one `thiserror`
//! enum so "a single structured record with kind, component, device (if
//! applicable), and human message" (§7 propagation policy) is satisfied by
//! one `Display` impl rather than an ad hoc struct.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FabricError {
    #[error("[{component}] configuration error: {message}")]
    Configuration {
        component: &'static str,
        message: String,
    },

    #[error("[{component}] no backend available{}", device_suffix(.device_id))]
    BackendUnavailable {
        component: &'static str,
        device_id: Option<String>,
    },

    #[error("[{component}] device init failed{}: {message}", device_suffix(.device_id))]
    DeviceInitFailed {
        component: &'static str,
        device_id: Option<String>,
        message: String,
    },

    #[error("[{component}] invalid handle{}", device_suffix(.device_id))]
    InvalidHandle {
        component: &'static str,
        device_id: Option<String>,
    },

    #[error("[{component}] range overflow{}", device_suffix(.device_id))]
    RangeOverflow {
        component: &'static str,
        device_id: Option<String>,
    },

    #[error("[{component}] out of memory{}: requested {requested_bytes} bytes", device_suffix(.device_id))]
    OutOfMemory {
        component: &'static str,
        device_id: Option<String>,
        requested_bytes: u64,
    },

    #[error("[{component}] peer access unsupported{}", device_suffix(.device_id))]
    PeerAccessUnsupported {
        component: &'static str,
        device_id: Option<String>,
    },

    #[error("[{component}] access denied for principal {principal_id}{}", device_suffix(.device_id))]
    AccessDenied {
        component: &'static str,
        principal_id: String,
        device_id: Option<String>,
    },

    #[error("[{component}] quota exceeded for principal {principal_id}{}", device_suffix(.device_id))]
    QuotaExceeded {
        component: &'static str,
        principal_id: String,
        device_id: Option<String>,
    },

    #[error("[{component}] timeout after {elapsed_ms}ms{}", device_suffix(.device_id))]
    Timeout {
        component: &'static str,
        device_id: Option<String>,
        elapsed_ms: u64,
    },

    #[error("[{component}] device throttled{}", device_suffix(.device_id))]
    Throttled {
        component: &'static str,
        device_id: Option<String>,
    },

    #[error("[{component}] unknown device {device_id}")]
    UnknownDevice {
        component: &'static str,
        device_id: String,
    },

    #[error("[{component}] size invalid: {size}")]
    SizeInvalid { component: &'static str, size: i64 },

    #[error("[{component}] backend closed")]
    BackendClosed { component: &'static str },

    #[error("[{component}] persistent event-log append failure: {message}")]
    EventLogAppendFailed {
        component: &'static str,
        message: String,
    },
}

fn device_suffix(device_id: &Option<String>) -> String {
    match device_id {
        Some(id) => format!(" (device {id})"),
        None => String::new(),
    }
}

impl FabricError {
    /// Process exit code per §6: `2` configuration, `3` no backend with
    /// `fallback=deny`, `4` persistent log append failure, `0` otherwise
    /// handled by the caller (errors that are recoverable in-process don't
    /// map to a process exit code at all).
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            FabricError::Configuration { .. } => Some(2),
            FabricError::BackendUnavailable { .. } => Some(3),
            FabricError::EventLogAppendFailed { .. } => Some(4),
            _ => None,
        }
    }
}
