//! Worker and master process entry points (§5 Concurrency & Resource
//! Model, §6 External Interfaces). Mirrors `naga-cli`'s role as a thin CLI
//! over a library crate: all behavior lives in `fabric-hal`/`fabric-core`,
//! this binary only wires up config, a runtime, and signal-driven shutdown.

mod config;
mod master;
mod worker;

use clap::{Parser, Subcommand, ValueEnum};
use fabric_types::PlatformTag;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fabric", about = "Distributed heterogeneous inference runtime")]
struct Cli {
    /// Path to a FabricConfig TOML file; defaults apply where absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover local devices, run telemetry and the thermal executor.
    Worker {
        #[arg(long, value_enum, default_value_t = PlatformArg::from_host())]
        platform: PlatformArg,
        #[arg(long, default_value_t = 1)]
        device_count: usize,
    },
    /// Build a `RuntimeContext`, place a synthetic pipeline, print the
    /// decision log.
    Master {
        #[arg(long, value_enum, default_value_t = PlatformArg::from_host())]
        platform: PlatformArg,
        #[arg(long, default_value_t = 2)]
        device_count: usize,
        #[arg(long, default_value_t = 4)]
        shards: usize,
        #[arg(long, default_value_t = 4 * 1024 * 1024 * 1024)]
        shard_memory_bytes: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PlatformArg {
    Linux,
    Windows,
    Macos,
    Mobile,
}

impl PlatformArg {
    fn from_host() -> Self {
        if cfg!(target_os = "windows") {
            PlatformArg::Windows
        } else if cfg!(target_os = "macos") {
            PlatformArg::Macos
        } else if cfg!(target_os = "ios") || cfg!(target_os = "android") {
            PlatformArg::Mobile
        } else {
            PlatformArg::Linux
        }
    }

    fn into_tag(self) -> PlatformTag {
        match self {
            PlatformArg::Linux => PlatformTag::Linux,
            PlatformArg::Windows => PlatformTag::Windows,
            PlatformArg::Macos => PlatformTag::MacOs,
            PlatformArg::Mobile => PlatformTag::Mobile,
        }
    }
}

impl std::fmt::Display for PlatformArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlatformArg::Linux => "linux",
            PlatformArg::Windows => "windows",
            PlatformArg::Macos => "macos",
            PlatformArg::Mobile => "mobile",
        };
        f.write_str(s)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "configuration error");
            return ExitCode::from(err.exit_code().unwrap_or(2) as u8);
        }
    };

    let result = match cli.command {
        Command::Worker { platform, device_count } => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build current-thread runtime")
            .block_on(worker::run(config, platform.into_tag(), device_count)),
        Command::Master {
            platform,
            device_count,
            shards,
            shard_memory_bytes,
        } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("failed to build multi-thread runtime")
            .block_on(master::run(config, platform.into_tag(), device_count, shards, shard_memory_bytes)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "fatal error");
            ExitCode::from(err.exit_code().unwrap_or(1) as u8)
        }
    }
}
