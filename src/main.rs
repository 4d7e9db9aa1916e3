use anyhow::Result;
use clap::Parser;
use huddle::{
    app,
    cli::{handle_token_command, load_config, Cli, CliCommand},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("huddle {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Token(ref args)) => {
            let config = load_config(&cli)?;
            handle_token_command(args, &config)?;
            return Ok(());
        }
        Some(CliCommand::Serve) | None => {}
    }

    let config = load_config(&cli)?;
    app::run_service(config).await
}
