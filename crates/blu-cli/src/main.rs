//! Blutography CLI
//!
//! Drives the storage client and image pipeline from the command line:
//! connectivity check, photo ingest, downloads and local inspection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blu_core::AppConfig;
use blu_gallery::{GalleryIngest, MemoryCatalogStore};
use blu_imaging::{ExifMetadataExtractor, PreviewGenerator};
use blu_storage::ObjectStorageClient;

#[derive(Parser)]
#[command(name = "blutography")]
#[command(about = "Blutography photo storage and preview tool", long_about = None)]
struct Cli {
    /// Config file (TOML/JSON/YAML); defaults to config/blutography if present
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Read settings from plain B2_*/PREVIEW_*/WORKER_* variables only
    #[arg(long, global = true, conflicts_with = "config")]
    env_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize, upload and delete a ping object
    Ping,

    /// Ingest photos: upload originals, write previews, print catalog records
    Upload {
        /// Photo files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Download a stored original
    Download {
        /// File name in the bucket
        name: String,

        /// Output path (defaults to the file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete one stored file version
    Delete {
        /// File name in the bucket
        name: String,

        /// Remote file id returned by the upload
        file_id: String,
    },

    /// Print the capture metadata of a local JPEG
    Inspect {
        file: PathBuf,
    },

    /// Generate a preview for a local JPEG
    Preview {
        file: PathBuf,

        /// Output path (defaults to the preview directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = if cli.env_only {
        AppConfig::from_env()
    } else {
        AppConfig::load(cli.config.as_deref())
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Commands::Ping => ping(&config).await,
        Commands::Upload { files } => upload(&config, files).await,
        Commands::Download { name, output } => download(&config, &name, output).await,
        Commands::Delete { name, file_id } => delete(&config, &name, &file_id).await,
        Commands::Inspect { file } => inspect(&file).await,
        Commands::Preview { file, output } => preview(&config, &file, output).await,
    }
}

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,blu_storage=debug,blu_gallery=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn storage_client(config: &AppConfig) -> Result<ObjectStorageClient> {
    let b2 = config
        .require_b2()
        .context("Object storage is not configured")?;
    Ok(ObjectStorageClient::from_config(b2)?)
}

async fn ping(config: &AppConfig) -> Result<()> {
    let client = storage_client(config)?;
    let report = client.run_diagnostic().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.success {
        bail!("diagnostic failed at stage {}", report.stage);
    }
    Ok(())
}

async fn upload(config: &AppConfig, files: Vec<PathBuf>) -> Result<()> {
    let client = Arc::new(storage_client(config)?);
    let ingest = Arc::new(GalleryIngest::from_config(
        client,
        Arc::new(MemoryCatalogStore::new()),
        config,
    ));

    let mut batch = Vec::with_capacity(files.len());
    for path in &files {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        batch.push((file_name(path)?, Bytes::from(data)));
    }

    let preview_dir = PathBuf::from(&config.preview.directory);
    tokio::fs::create_dir_all(&preview_dir)
        .await
        .with_context(|| format!("Failed to create {}", preview_dir.display()))?;

    let results = ingest.ingest_batch(batch).await;

    let mut failed = 0;
    for (name, result) in results {
        match result {
            Ok(photo) => {
                let path = preview_dir.join(&photo.item.preview_name);
                tokio::fs::write(&path, &photo.preview)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("{}", serde_json::to_string(&photo.item)?);
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", name, e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} uploads failed", failed, files.len());
    }
    Ok(())
}

async fn download(config: &AppConfig, name: &str, output: Option<PathBuf>) -> Result<()> {
    let client = storage_client(config)?;
    let data = client.download(name).await?;

    let output = match output {
        Some(path) => path,
        None => PathBuf::from(file_name(Path::new(name))?),
    };
    tokio::fs::write(&output, &data)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(path = %output.display(), size = data.len(), "Downloaded");
    Ok(())
}

async fn delete(config: &AppConfig, name: &str, file_id: &str) -> Result<()> {
    let client = storage_client(config)?;
    let credential = client.credential().await?;
    client.delete(&credential, name, file_id).await?;

    info!(name, file_id, "Deleted");
    Ok(())
}

async fn inspect(file: &Path) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let report = ExifMetadataExtractor::new().extract_detailed(&data);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn preview(config: &AppConfig, file: &Path, output: Option<PathBuf>) -> Result<()> {
    let name = file_name(file)?;
    let data = Bytes::from(
        tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?,
    );

    let generator = PreviewGenerator::from_config(&config.preview);
    let preview = tokio::task::spawn_blocking({
        let name = name.clone();
        move || generator.generate_preview(data, &name)
    })
    .await?;

    let output = match output {
        Some(path) => path,
        None => {
            let dir = PathBuf::from(&config.preview.directory);
            tokio::fs::create_dir_all(&dir).await?;
            dir.join(PreviewGenerator::preview_name(&name))
        }
    };
    tokio::fs::write(&output, &preview)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(path = %output.display(), size = preview.len(), "Preview written");
    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => Ok(name.to_string()),
        None => bail!("{} has no usable file name", path.display()),
    }
}
