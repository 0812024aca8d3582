//! Storage commands

use anyhow::{Context, Result};
use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Subcommand};
use cloud_proxy_core::ProxyConfig;
use cloud_proxy_storage::{CopyOutcome, CopyStrategy, ListOptions, ObjectRef, StorageProxy};
use std::collections::BTreeMap;
use std::io::Write;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::load_config;
use crate::output;

#[derive(Subcommand, Debug)]
pub enum StorageCommands {
    /// List files or folders in a container
    Ls(LsArgs),

    /// Write an object to stdout
    Cat(ObjectArgs),

    /// Upload a local file
    Put(PutArgs),

    /// Delete an object
    Rm(ObjectArgs),

    /// Copy an object, in parts when it is large
    Cp(CpArgs),
}

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Connection name from the configuration file
    pub connection: String,

    /// Bucket or container
    pub container: String,

    /// Only list keys starting with this prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// List folder prefixes instead of files
    #[arg(long)]
    pub folders: bool,

    /// Maximum number of results (default 500)
    #[arg(long)]
    pub max: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ObjectArgs {
    /// Connection name from the configuration file
    pub connection: String,

    /// Bucket or container
    pub container: String,

    /// Object key
    pub key: String,
}

#[derive(Args, Debug)]
pub struct PutArgs {
    #[command(flatten)]
    pub object: ObjectArgs,

    /// Local file to upload
    pub file: Utf8PathBuf,
}

#[derive(Args, Debug)]
pub struct CpArgs {
    /// Source connection name
    pub source_connection: String,

    /// Source bucket or container
    pub source_container: String,

    /// Source object key
    pub source_key: String,

    /// Destination connection name
    pub destination_connection: String,

    /// Destination bucket or container
    pub destination_container: String,

    /// Destination object key
    pub destination_key: String,

    /// Maximum part transfers in flight (overrides configuration)
    #[arg(long)]
    pub concurrency: Option<usize>,
}

pub async fn run(cmd: StorageCommands, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    match cmd {
        StorageCommands::Ls(args) => ls(args, &config).await,
        StorageCommands::Cat(args) => cat(args, &config).await,
        StorageCommands::Put(args) => put(args, &config).await,
        StorageCommands::Rm(args) => rm(args, &config).await,
        StorageCommands::Cp(args) => cp(args, &config).await,
    }
}

async fn connect(config: &ProxyConfig, connection: &str) -> Result<StorageProxy> {
    let credentials = config.connection(connection)?;
    StorageProxy::connect(credentials, &config.copy)
        .await
        .with_context(|| format!("Failed to connect storage '{connection}'"))
}

async fn ls(args: LsArgs, config: &ProxyConfig) -> Result<()> {
    let proxy = connect(config, &args.connection).await?;
    let mut options = if args.folders {
        ListOptions::folders(args.prefix)
    } else {
        ListOptions::files(args.prefix)
    };
    if let Some(max) = args.max {
        options = options.with_max_results(max);
    }

    let names = proxy
        .list(&args.container, &options)
        .await
        .with_context(|| format!("Failed to list {}", args.container))?;

    let mut stdout = std::io::stdout().lock();
    for name in &names {
        writeln!(stdout, "{name}")?;
    }
    Ok(())
}

async fn cat(args: ObjectArgs, config: &ProxyConfig) -> Result<()> {
    let proxy = connect(config, &args.connection).await?;
    let object = ObjectRef::new(args.container, args.key);
    let data = proxy
        .get(&object)
        .await
        .with_context(|| format!("Failed to read {object}"))?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}

async fn put(args: PutArgs, config: &ProxyConfig) -> Result<()> {
    let proxy = connect(config, &args.object.connection).await?;
    let object = ObjectRef::new(args.object.container, args.object.key);
    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file))?;
    let size = data.len() as u64;

    proxy
        .put(&object, Bytes::from(data), &BTreeMap::new())
        .await
        .with_context(|| format!("Failed to upload {object}"))?;

    output::success(&format!(
        "Uploaded {} ({})",
        object,
        output::format_bytes(size)
    ));
    Ok(())
}

async fn rm(args: ObjectArgs, config: &ProxyConfig) -> Result<()> {
    let proxy = connect(config, &args.connection).await?;
    let object = ObjectRef::new(args.container, args.key);
    proxy
        .delete(&object)
        .await
        .with_context(|| format!("Failed to delete {object}"))?;
    output::success(&format!("Deleted {object}"));
    Ok(())
}

async fn cp(args: CpArgs, config: &ProxyConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let source = connect(config, &args.source_connection)
        .await?
        .with_cancellation(cancel.clone());
    // One connection name means one set of credentials; share the store so
    // large copies run server-side.
    let destination = if args.destination_connection == args.source_connection {
        source.share_store(config.copy.clone())?
    } else {
        connect(config, &args.destination_connection).await?
    };

    let from = ObjectRef::new(args.source_container, args.source_key);
    let to = ObjectRef::new(args.destination_container, args.destination_key);

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling copy");
            interrupt.cancel();
        }
    });

    let spinner = output::spinner(&format!("Copying {from} to {to}..."));
    let result = source
        .copy_to(&from, &destination, &to, args.concurrency)
        .await;
    spinner.finish_and_clear();

    let outcome = result.with_context(|| format!("Failed to copy {from} to {to}"))?;
    output::success(&format!("Copied {from} to {to}"));
    output::kv("strategy", &outcome.strategy.to_string());
    output::kv("size", &output::format_bytes(outcome.bytes));
    output::kv("parts", &outcome.parts.to_string());
    if copied_server_side(&outcome, source.shares_store_with(&destination)) {
        output::info("Parts were copied server-side");
    }
    Ok(())
}

/// Single-shot copies have no parts to report on
fn copied_server_side(outcome: &CopyOutcome, shared_store: bool) -> bool {
    shared_store && outcome.strategy == CopyStrategy::Multipart
}
