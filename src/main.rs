#[macro_use]
extern crate tracing;

mod config;
mod error;
mod form;
mod models;
mod response;
mod routes;
mod samples;
mod service;
mod storage;
mod utils;


use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::Server;
use tracing_subscriber::filter::LevelFilter;
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::samples::SampleDocuments;
use crate::service::IngestionService;
use crate::storage::backends::FileSystemBackend;
use crate::storage::StorageBackend;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct Args {
    #[clap(long, env, default_value = "info")]
    /// The maximum level logs are emitted at.
    log_level: LevelFilter,

    #[clap(short, long, env, default_value = "config.yaml")]
    /// The path to the YAML runtime config file.
    config_file: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the server with the given configuration.
    Run {
        #[clap(long, env, default_value = "127.0.0.1")]
        /// The host to bind the server to.
        host: String,

        #[clap(short, long, env, default_value_t = 8080)]
        /// The port to bind the server to.
        port: u16,
    },

    /// Writes a template config file for the given record backend.
    Init {
        #[clap(short, long)]
        /// One of postgres, mysql, sqlite or scylla.
        backend: String,
    },

    /// Deletes the given records from the record store in one batch.
    Purge {
        #[clap(required = true)]
        ids: Vec<Uuid>,
    },

    /// Prints the ids and content types held by the record store.
    List {
        #[clap(long, default_value_t = 50)]
        limit: u32,

        #[clap(long, default_value_t = 0)]
        offset: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    match args.command {
        Command::Init { backend } => run_init(&args.config_file, &backend).await,
        Command::Run { host, port } => {
            let cfg = RuntimeConfig::from_file(&args.config_file)?;
            run_server(cfg, &host, port).await
        }
        Command::Purge { ids } => {
            let cfg = RuntimeConfig::from_file(&args.config_file)?;
            let service = build_service(&cfg).await?;

            service.delete_records(&ids).await?;
            info!("purged {} records", ids.len());
            Ok(())
        }
        Command::List { limit, offset } => {
            let cfg = RuntimeConfig::from_file(&args.config_file)?;
            let service = build_service(&cfg).await?;

            for summary in service.list_records(limit, offset).await? {
                println!("{}", serde_json::to_string(&summary)?);
            }
            Ok(())
        }
    }
}

async fn run_init(path: &Path, backend: &str) -> Result<()> {
    let template = RuntimeConfig::template(backend)?;
    let out = serde_yaml::to_string(&template)?;
    tokio::fs::write(path, out)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!("wrote template config to {}", path.display());
    Ok(())
}

async fn build_service(cfg: &RuntimeConfig) -> Result<Arc<IngestionService>> {
    let records = cfg.backend.connect().await?;

    let uploads = FileSystemBackend::new(&cfg.storage.uploads_directory);
    if let Err(e) = uploads.ready().await {
        warn!(
            "uploads to {} will fail until this is fixed: {}",
            uploads.directory().display(),
            e,
        );
    }

    let assets = FileSystemBackend::new(&cfg.storage.assets_directory);

    Ok(Arc::new(IngestionService::new(
        Arc::new(uploads),
        Arc::new(assets),
        records,
    )))
}

async fn run_server(cfg: RuntimeConfig, host: &str, port: u16) -> Result<()> {
    let service = build_service(&cfg).await?;
    let samples = SampleDocuments::build()?;
    let app = routes::app(service, routes::TransportConfig::from(&cfg), samples);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("serving on http://{}", addr);

    Server::new(TcpListener::bind(addr)).run(app).await?;

    Ok(())
}
