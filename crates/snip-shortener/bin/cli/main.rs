mod cli;

use crate::cli::{Command, LogFormat, CLI};
use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;
use snip_core::{BatchItem, ShortCode, UserId};
use snip_shortener::{CreateStatus, DeletionQueue, ServiceConfig, StorageService};
use snip_storage::{StorageBackend, StorageConfig};
use std::io::Read;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct BatchOutput {
    correlation_id: String,
    short_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    info!(
        storage_backend = %config.storage,
        base_url = %config.base_url,
        "starting snip"
    );

    let storage = StorageConfig::builder()
        .mode(config.storage.into())
        .file_path(config.file_storage_path.clone())
        .database_dsn(config.database_dsn.clone())
        .build();
    let backend = StorageBackend::open(&storage)
        .await
        .context("failed to open storage backend")?;
    let service = StorageService::with_calculator(
        backend,
        snip_core::Crc32Calculator::new(),
        ServiceConfig::builder()
            .operation_timeout(Duration::from_secs(config.timeout_secs))
            .build(),
    );

    let outcome = run(&service, &config).await;
    service.repository().close().await;
    outcome
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run(service: &StorageService<StorageBackend>, config: &CLI) -> anyhow::Result<()> {
    match &config.command {
        Command::Shorten { url, user } => {
            let (code, status) = service.create(url, user.map(UserId::new)).await?;
            if status == CreateStatus::Conflict {
                info!(code = %code, "url was already shortened");
            }
            println!("{}", code.to_url(&config.base_url));
        }
        Command::Batch { input, user } => {
            let raw = match input {
                Some(path) => tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read stdin")?;
                    buf
                }
            };
            let items: Vec<BatchItem> =
                serde_json::from_str(&raw).context("batch input is not a JSON array of items")?;

            let results = service
                .batch_create(items, user.map(UserId::new))
                .await?;
            let output: Vec<_> = results
                .into_iter()
                .map(|result| BatchOutput {
                    short_url: result.short_code.to_url(&config.base_url),
                    correlation_id: result.correlation_id,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Resolve { code } => {
            println!("{}", service.get(code).await?);
        }
        Command::Urls { user } => {
            for link in service.urls(UserId::new(*user)).await? {
                println!(
                    "{}\t{}",
                    link.short_code.to_url(&config.base_url),
                    link.original_url
                );
            }
        }
        Command::Delete { user, codes } => {
            let codes = codes
                .iter()
                .map(|code| ShortCode::new(code.as_str()))
                .collect::<Result<Vec<_>, _>>()?;
            let queue = DeletionQueue::spawn(service.clone());
            queue.enqueue(UserId::new(*user), codes)?;
            println!("accepted");
            queue.shutdown().await?;
        }
        Command::Ping => {
            if !service.ping().await {
                bail!("storage backend is not reachable");
            }
            println!("ok");
        }
    }

    Ok(())
}
