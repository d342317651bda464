//! # Asset Optimizer - Main Entry Point
//!
//! Host minimale attorno alla libreria: importa file nello store locale e li pubblica
//! attraverso il `PublishInterceptor`, chiudendo ogni comando con un commit esplicito.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del logging con `tracing` (`RUST_LOG` ha la precedenza su `--verbose`)
//! - Caricamento della configurazione e costruzione di store, repository e interceptor
//! - Un comando = una unit of work: `persist()` alla fine, `discard()` se qualcosa fallisce
//!
//! ## Esempio di utilizzo:
//! ```bash
//! asset-optimizer init
//! asset-optimizer publish ./assets --collection persistent --verbose
//! asset-optimizer uri ./assets/logo.png
//! asset-optimizer status
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use asset_optimizer::progress::{describe, ProgressManager, PublishStats};
use asset_optimizer::storage::local::hash_file;
use asset_optimizer::utils::format_size;
use asset_optimizer::{
    Asset, AssetStore, Config, JsonFileRepository, LocalAssetStore, PublishInterceptor, Publishable,
    RelationRepository, TargetRegistry,
};

#[derive(Parser)]
#[command(name = "asset-optimizer")]
#[command(about = "Publish assets through external optimizers with a content-addressed cache")]
struct Args {
    /// Configuration file (default: ~/.asset-optimizer/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import every file below a directory and publish it
    Publish {
        directory: PathBuf,
        #[arg(long, default_value = "persistent")]
        collection: String,
    },
    /// Print the public URI of a previously imported file
    Uri {
        file: PathBuf,
        #[arg(long, default_value = "persistent")]
        collection: String,
    },
    /// Unpublish a previously imported file
    Unpublish {
        file: PathBuf,
        #[arg(long, default_value = "persistent")]
        collection: String,
    },
    /// Unpublish and delete a previously imported file
    Remove {
        file: PathBuf,
        #[arg(long, default_value = "persistent")]
        collection: String,
    },
    /// Show stored optimized artifacts
    Status,
    /// Write the default configuration file
    Init,
}

struct Runtime {
    assets: Arc<LocalAssetStore>,
    repository: Arc<JsonFileRepository>,
    registry: TargetRegistry,
    interceptor: Arc<PublishInterceptor>,
}

impl Runtime {
    async fn open(config: &Config) -> Result<Self> {
        let assets = Arc::new(
            LocalAssetStore::new(&config.storage_path)
                .await
                .with_context(|| format!("opening asset store {}", config.storage_path.display()))?,
        );
        let repository = Arc::new(
            JsonFileRepository::new(&config.relations_path)
                .await
                .with_context(|| format!("opening relations {}", config.relations_path.display()))?,
        );
        let interceptor = Arc::new(PublishInterceptor::from_config(
            config,
            assets.clone(),
            repository.clone(),
        )?);

        let mut registry = TargetRegistry::new();
        registry.register(interceptor.clone());

        Ok(Self {
            assets,
            repository,
            registry,
            interceptor,
        })
    }

    /// Commit point of the command
    async fn persist(&self) -> Result<()> {
        match self.registry.persist_all().await {
            Ok(reports) => {
                for report in reports.iter().filter(|report| !report.is_empty()) {
                    info!(
                        "Stored {} new optimized artifacts, removed {}, {} already optimized elsewhere",
                        report.inserted.len(),
                        report.removed.len(),
                        report.conflicts.len()
                    );
                }
                Ok(())
            }
            Err(e) => {
                self.discard().await;
                Err(e.into())
            }
        }
    }

    async fn discard(&self) {
        for target in self.registry.registered() {
            target.discard().await;
        }
    }

    async fn find_imported(&self, file: &Path, collection: &str) -> Result<Asset> {
        let filename = file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .with_context(|| format!("not a file: {}", file.display()))?;
        let content_hash = hash_file(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;

        self.assets
            .find(collection, &content_hash, &filename)
            .await
            .with_context(|| format!("{} was never imported into collection {}", file.display(), collection))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("asset_optimizer={}", default_level)));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);

    if let Commands::Init = args.command {
        if config_path.exists() {
            return Err(anyhow::anyhow!("Configuration already exists: {}", config_path.display()));
        }
        Config::default().save_to_file(&config_path).await?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    let config = Config::from_file(&config_path)
        .await
        .with_context(|| format!("loading configuration {}", config_path.display()))?;
    let runtime = Runtime::open(&config).await?;

    match args.command {
        Commands::Publish { directory, collection } => publish(&runtime, &directory, &collection).await?,
        Commands::Uri { file, collection } => {
            let asset = runtime.find_imported(&file, &collection).await?;
            println!("{}", runtime.interceptor.public_uri(&asset).await?);
        }
        Commands::Unpublish { file, collection } => {
            let asset = runtime.find_imported(&file, &collection).await?;
            if let Err(e) = runtime.interceptor.unpublish_resource(&asset).await {
                runtime.discard().await;
                return Err(e.into());
            }
            runtime.persist().await?;
            println!("Unpublished {}", asset.filename);
        }
        Commands::Remove { file, collection } => {
            let asset = runtime.find_imported(&file, &collection).await?;
            remove(&runtime, &asset).await?;
            println!("Removed {}", asset.filename);
        }
        Commands::Status => status(&runtime).await?,
        Commands::Init => {}
    }

    Ok(())
}

async fn publish(runtime: &Runtime, directory: &Path, collection: &str) -> Result<()> {
    if !directory.is_dir() {
        return Err(anyhow::anyhow!("Not a directory: {}", directory.display()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(directory)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    info!("Publishing {} files from {}", files.len(), directory.display());

    let progress = ProgressManager::new(files.len() as u64);
    let mut stats = PublishStats::new();

    for path in &files {
        let asset = match runtime.assets.import_file(path, collection).await {
            Ok(asset) => asset,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                stats.add_error();
                progress.update(&format!("{}: import failed", path.display()));
                continue;
            }
        };

        match runtime.interceptor.publish_with_outcome(&asset, collection).await {
            Ok(outcome) => {
                stats.record(&outcome);
                progress.update(&describe(&asset.filename, &outcome));
            }
            Err(e) => {
                error!("Publishing {} failed, aborting: {}", asset.filename, e);
                progress.finish("aborted");
                runtime.discard().await;
                return Err(e.into());
            }
        }
    }

    runtime.persist().await?;
    progress.finish(&stats.format_summary());
    println!("{}", stats.format_summary());
    Ok(())
}

/// Unpublish `asset` and drop its optimized artifact. The original is deleted
/// only after the commit went through, so a failed commit leaves it in place.
async fn remove(runtime: &Runtime, asset: &Asset) -> Result<()> {
    if let Err(e) = stage_removal(runtime, asset).await {
        runtime.discard().await;
        return Err(e);
    }
    runtime.persist().await?;
    runtime.assets.remove(asset).await?;
    Ok(())
}

async fn stage_removal(runtime: &Runtime, asset: &Asset) -> Result<()> {
    runtime.interceptor.unpublish_resource(asset).await?;
    runtime.interceptor.on_asset_removed(asset).await?;
    Ok(())
}

async fn status(runtime: &Runtime) -> Result<()> {
    let relations = runtime.repository.all().await?;
    let artifact_bytes: u64 = relations.iter().map(|relation| relation.artifact.size).sum();

    println!("Relations file: {}", runtime.repository.path().display());
    println!("Optimized artifacts: {}", relations.len());
    println!("Artifact storage: {}", format_size(artifact_bytes));
    println!(
        "Optimized media types: {}",
        runtime.interceptor.rules().len()
    );
    Ok(())
}
