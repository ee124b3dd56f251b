//! modelgate entry point.
//!
//! Bootstraps the proxy with:
//! - Configuration loading (TOML file + env var overrides)
//! - Structured logging init
//! - The axum HTTP server
//! - A background idle-reap sweep
//! - Signal handling for graceful shutdown
//!
//! ## CLI Subcommands
//!
//! - `modelgated` or `modelgated serve` - Run the HTTP server (default)
//! - `modelgated health` - Full health check against a running instance (exit 0/1)
//! - `modelgated live` - Liveness probe (exit 0/1)
//! - `modelgated ready` - Readiness probe (exit 0/1)

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use modelgate::cli::{get_default_addr, run_health, run_liveness, run_readiness};
use modelgate::config::Settings;
use modelgate::shutdown::ShutdownResult;
use modelgate::telemetry;
use modelgate::Runtime;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" | "" => match serve().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("server error: {e}");
                ExitCode::FAILURE
            }
        },
        "health" => ExitCode::from(run_health(&get_default_addr()).await as u8),
        "live" | "liveness" => ExitCode::from(run_liveness(&get_default_addr()).await as u8),
        "ready" | "readiness" => ExitCode::from(run_readiness(&get_default_addr()).await as u8),
        "version" | "--version" | "-V" => {
            println!("modelgated {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        other => {
            eprintln!("unknown command: {other}");
            print_usage();
            ExitCode::FAILURE
        }
    }
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("PROXY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("modelgate.toml"));

    let settings = if config_path.exists() {
        Settings::load(&config_path)?
    } else {
        Settings::from_env()?
    };

    telemetry::init_logging(&settings.logging)?;
    telemetry::init_metrics();

    let pid_file = std::env::var("PROXY_PID_FILE").ok().map(PathBuf::from);
    if let Some(path) = &pid_file {
        std::fs::write(path, std::process::id().to_string())?;
    }

    let runtime = Runtime::new(settings);
    let app = runtime.build_router();

    let addr = format!("{}:{}", runtime.settings.proxy.host, runtime.settings.proxy.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "modelgate listening");

    let reap_manager = runtime.manager.clone();
    let reap_interval = Duration::from_secs(30);
    let reap_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reap_interval);
        loop {
            ticker.tick().await;
            reap_manager.reap_idle().await;
        }
    });

    let shutdown_timeout = Duration::from_secs(runtime.settings.proxy.stop_timeout_seconds);
    let shutdown = runtime.shutdown.clone();

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining");
    });

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server exited with error");
    }

    reap_task.abort();

    match shutdown.initiate(shutdown_timeout).await {
        ShutdownResult::Complete => tracing::info!("shutdown complete"),
        ShutdownResult::Timeout { remaining } => {
            tracing::warn!(remaining, "shutdown timed out with in-flight requests remaining");
        }
    }

    if let Some(path) = &pid_file {
        let _ = std::fs::remove_file(path);
    }

    Ok(())
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "modelgate v{version} - dynamic inference-model proxy

USAGE:
    modelgated [COMMAND]

COMMANDS:
    serve        Run the HTTP server (default when no command given)
    health       Full health check against a running instance (exit 0/1)
    live         Liveness probe (exit 0/1)
    ready        Readiness probe (exit 0/1)
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    PROXY_CONFIG               Path to the TOML config file (default: modelgate.toml)
    PROXY_PID_FILE             If set, write the server's PID here on startup and remove it on exit
    PROXY_ADDR                 Base URL used by health/live/ready (default: http://127.0.0.1:8080)
    PROXY_LISTEN_PORT          Override proxy.port
    PROXY_IDLE_TIMEOUT_SECONDS Override proxy.idle_timeout_seconds
    PROXY_BASE_PORT            Override proxy.base_port
    GPU_DEVICE_ID               Override gpu.device_id
    GPU_RESERVED_MB            Override gpu.reserved_buffer_mb
    RUST_LOG                   Log level (debug, info, warn, error)
"
    );
}
