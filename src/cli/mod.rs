use anyhow::{bail, Result};
use std::time::Duration;

use crate::auth::JwtVerifier;
use crate::config::Config;

mod args;

pub use args::{Cli, CliCommand, TokenCliArgs};

/// Load the file named by `--config`, or the default config.
pub fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

pub fn handle_token_command(args: &TokenCliArgs, config: &Config) -> Result<()> {
    let Some(ttl_secs) = args.ttl_hours.checked_mul(3600) else {
        bail!("--ttl-hours {} is too large", args.ttl_hours);
    };
    let verifier = JwtVerifier::new(&config.auth.jwt_secret);
    let token = verifier.issue(&args.user, Duration::from_secs(ttl_secs))?;
    println!("{}", token);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_rejects_overflowing_ttl() {
        let args = TokenCliArgs {
            user: "u1".to_string(),
            ttl_hours: u64::MAX,
        };
        let err = handle_token_command(&args, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
