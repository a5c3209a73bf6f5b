use clap::Parser;
use tracing_subscriber::EnvFilter;

use ak_cli::cli::Cli;
use ak_cli::commands;
use ak_core::services::deployer::AwsToolchain;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let _guard = if cli.debug {
        Some(setup_debug_logging())
    } else {
        setup_stderr_logging(cli.verbose);
        None
    };

    let output = commands::run(cli, &AwsToolchain).await?;
    print!("{output}");
    Ok(())
}

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Configure file-based tracing to `.agentkit-debug.log` in CWD.
/// Returns the guard that must be held alive for the duration of the program.
fn setup_debug_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::never(".", ".agentkit-debug.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter_or("debug"))
        .with_ansi(false)
        .init();

    guard
}

fn setup_stderr_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter_or(level))
        .with_target(false)
        .init();
}
