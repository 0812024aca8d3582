//! Secret commands

use anyhow::{Context, Result};
use camino::Utf8Path;
use clap::{Args, Subcommand};
use cloud_proxy_secrets::SecretsProxy;
use std::io::Write;

use super::load_config;

#[derive(Subcommand, Debug)]
pub enum SecretCommands {
    /// Print a secret value to stdout
    Get(GetArgs),
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Connection name from the configuration file
    pub connection: String,

    /// Secret name
    pub name: String,

    /// Write the raw bytes instead of text
    #[arg(long)]
    pub binary: bool,
}

pub async fn run(cmd: SecretCommands, config_path: Option<&Utf8Path>) -> Result<()> {
    match cmd {
        SecretCommands::Get(args) => get(args, config_path).await,
    }
}

async fn get(args: GetArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let credentials = config.connection(&args.connection)?;
    let proxy = SecretsProxy::connect(credentials, &config.secrets)
        .await
        .with_context(|| format!("Failed to connect secrets store '{}'", args.connection))?;

    let mut stdout = std::io::stdout().lock();
    if args.binary {
        let bytes = proxy
            .get_binary_secret(&args.name)
            .await
            .with_context(|| format!("Failed to read secret '{}'", args.name))?;
        stdout.write_all(&bytes)?;
    } else {
        let value = proxy
            .get_secret(&args.name)
            .await
            .with_context(|| format!("Failed to read secret '{}'", args.name))?;
        writeln!(stdout, "{value}")?;
    }
    stdout.flush()?;
    Ok(())
}
