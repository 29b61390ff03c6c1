use clap::Parser;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, Level};

use pacer::{PacerConfig, Throttle};

/// Throttled line analyzer: reads lines from stdin and rate-limits an
/// expensive analysis step, demonstrating the pacer library.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Minimum interval between analysis runs, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    info!("Starting Pacer");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => PacerConfig::from_file(path)?,
        None => PacerConfig::default(),
    };
    if let Some(interval_ms) = args.interval_ms {
        config.interval_ms = interval_ms;
    }
    info!(interval_ms = config.interval_ms, "Configuration loaded");

    // The "expensive" downstream operation: a line analysis summary. At most
    // one run per interval, always fed the newest line seen by then.
    let throttle = Throttle::new(config.interval(), |line: String| {
        let words = line.split_whitespace().count();
        let chars = line.chars().count();
        info!(words, chars, "analyzed: {line}");
    })?;
    info!("Throttle initialized, reading from stdin");

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut current = String::new();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    // Unchanged input does not retrigger the analysis.
                    if line == current {
                        continue;
                    }
                    current.clone_from(&line);
                    throttle.invoke(line);
                }
                None => break,
            },
            _ = &mut shutdown => break,
        }
    }

    throttle.shutdown().await?;
    info!("Pacer stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
