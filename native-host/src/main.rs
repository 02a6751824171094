//! Native Messaging Host - Entry point
//!
//! Launched by the browser with stdin/stdout connected to the extension.
//!
//! # Usage
//!
//! ```bash
//! metarelay-host [--config PATH] [browser-supplied args...]
//! ```

use metarelay_host::config::GeneralConfig;
use metarelay_host::{HostConfig, NativeMessagingHost, PipeServer};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command line options
#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    /// Origin and similar arguments the browser appends
    browser_args: Vec<String>,
}

/// Parse command line arguments
fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("metarelay-host v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i]));
                }
            }
            other => parsed.browser_args.push(other.to_string()),
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"Metarelay Host - Native messaging host for the page-metadata relay

USAGE:
    metarelay-host [OPTIONS] [BROWSER ARGS...]

OPTIONS:
    -h, --help              Show this help message
    -v, --version           Show version
    -c, --config <PATH>     Path to configuration file

The browser starts this binary itself; stdout carries protocol frames, so
logs go to the configured log file (default: /tmp/metarelay-host.log).
"#
    );
}

/// Install the tracing subscriber; stdout is reserved for frames
fn init_logging(config: &GeneralConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let file = config.log_file.as_ref().and_then(|path| {
        OpenOptions::new().create(true).append(true).open(path).ok()
    });

    match file {
        Some(file) => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
            .init(),
        None => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args();

    let config_path = args
        .config_path
        .clone()
        .unwrap_or_else(HostConfig::default_config_path);
    let loaded = HostConfig::try_load_from_path(&config_path);
    let config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => HostConfig::default(),
    };
    init_logging(&config.general);

    info!("Native host started (pid {})", std::process::id());
    match loaded {
        Ok(Some(_)) => info!("Loaded configuration from {:?}", config_path),
        Ok(None) => info!("No config file found at {:?}, using defaults", config_path),
        Err(e) => warn!("{} ({:?}), using defaults", e, config_path),
    }
    for arg in &args.browser_args {
        info!("Ignoring browser argument: {}", arg);
    }

    let host = Arc::new(NativeMessagingHost::start(
        tokio::io::stdin(),
        tokio::io::stdout(),
        config.host.response_timeout(),
    ));
    let server = PipeServer::new(config.server.clone(), Arc::clone(&host));

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Pipe server error: {}", e);
            }
        }
        _ = host.closed() => {
            info!("Extension disconnected, exiting");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    // Clean up socket file
    if let Err(e) = server.remove_socket() {
        warn!("Failed to remove {:?}: {}", server.socket_path(), e);
    }

    Ok(())
}
