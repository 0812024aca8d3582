//! Config command

use anyhow::Result;
use camino::Utf8Path;
use clap::{Args, Subcommand};
use cloud_proxy_core::ProxyConfig;

use super::load_config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved configuration (credentials redacted)
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(cmd: ConfigCommands, config_path: Option<&Utf8Path>) -> Result<()> {
    match cmd {
        ConfigCommands::Show(args) => show(args, config_path),
    }
}

fn show(args: ShowArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    println!("{}", render(&config, args.json)?);
    Ok(())
}

fn render(config: &ProxyConfig, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(config)?)
    } else {
        Ok(serde_yaml_ng::to_string(config)?)
    }
}
