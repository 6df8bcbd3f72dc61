use clap::Parser;
use rulegen::cli::Cli;
use rulegen::{logger, pipeline};
use std::process::ExitCode;
use tracing::{error, info};

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = cli.into_settings()?;
    let (fetcher, llm) = pipeline::default_collaborators(&settings)?;

    match pipeline::run(&settings, fetcher, llm).await? {
        Some(dir) => info!(dir = %dir.display(), "rules written"),
        None => info!("no components identified, no rules written"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init_tracing(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "rule generation failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
