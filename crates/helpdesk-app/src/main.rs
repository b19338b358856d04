use anyhow::Result;
use clap::Parser;
use helpdesk_app::{AssignmentDesk, Cli, CommandOutcome};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => helpdesk_config::load_from_path(path)?,
        None => helpdesk_config::load_from_env()?,
    };
    init_logging(config.log_filter(), cli.verbose);

    let desk = AssignmentDesk::from_config(&config)?;
    let mut stdout = std::io::stdout();
    let outcome = desk.run(&cli.command, &mut stdout).await?;

    Ok(match outcome {
        CommandOutcome::Completed => ExitCode::SUCCESS,
        CommandOutcome::Failed => ExitCode::FAILURE,
    })
}

/// RUST_LOG wins over `--verbose`, which wins over the config file's `[logging] filter`.
fn init_logging(config_filter: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { config_filter };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(fallback))
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
