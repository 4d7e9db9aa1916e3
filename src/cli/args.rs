use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "huddle")]
#[command(about = "Meeting coordination server", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Load configuration from this file instead of the default location
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the server (default)
    Serve,
    /// Print version information
    Version,
    /// Mint an identity token for local testing
    Token(TokenCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct TokenCliArgs {
    /// User id carried by the token
    #[arg(short, long)]
    pub user: String,
    /// Hours until the token expires
    #[arg(long, default_value = "24")]
    pub ttl_hours: u64,
}
