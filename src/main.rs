use clap::Parser;
use page_capture::{failure_exit, load_config, setup_logging, usage_exit, Cli, CliRunner};
use std::future::Future;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let (code, message) = usage_exit(&e);
            if e.use_stderr() {
                eprintln!("{}", message.trim_end());
            } else {
                println!("{}", message.trim_end());
            }
            std::process::exit(code);
        }
    };

    if let Err(e) = setup_logging(args.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    info!("Starting page-capture v{}", env!("CARGO_PKG_VERSION"));

    // Handlers are installed before the browser launches so an early signal is not lost
    let shutdown = match shutdown_signal() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            error!("Failed to install signal handlers: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args, shutdown).await {
        let (code, message) = failure_exit(&e);
        eprintln!("{message}");
        std::process::exit(code);
    }
}

async fn run(args: Cli, shutdown: impl Future<Output = &'static str>) -> anyhow::Result<()> {
    let config = load_config(&args).await?;
    let runner = CliRunner::new(config, &args)?;
    runner.run(shutdown).await
}

#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(_) => std::future::pending().await,
        }
    })
}
