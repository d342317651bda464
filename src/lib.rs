//! # Asset Optimizer Library
//!
//! Ottimizzazione degli asset al momento della pubblicazione, con cache indirizzata per contenuto.
//!
//! ## Responsabilità:
//! - Decorare un target di pubblicazione reale (`PublishInterceptor`)
//! - Eseguire tool esterni (optipng, jpegtran, cwebp, ...) su copie temporanee
//! - Ricordare in modo durevole l'artefatto ottimizzato per ogni (hash, filename)
//! - Raggruppare le modifiche in una unit of work con un commit esplicito
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione JSON e validazione strutturale
//! - `error`: `OptimizeError` e classificazione recuperabile / fatale
//! - `content_key`: Identità di cache derivata da hash + filename
//! - `template` / `rule`: Template degli argomenti e tabella delle regole per media type
//! - `tool_resolver`: Risoluzione dei binari nel `PATH`
//! - `asset` / `storage`: Metadati degli asset e store locale
//! - `target`: Trait `Publishable` e target su filesystem
//! - `relation`: Relazioni durevoli, repository e staging della unit of work
//! - `file_lock`: Lock fra processi e riscrittura atomica dei file JSON condivisi
//! - `optimizer`: Runner, interceptor, deletion coordinator, registry
//! - `progress` / `utils`: Statistiche e formattazione per il binario host
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use asset_optimizer::{Config, JsonFileRepository, LocalAssetStore, PublishInterceptor, Publishable};
//!
//! let config = Config::from_file(&path).await?;
//! let assets = Arc::new(LocalAssetStore::new(&config.storage_path).await?);
//! let repository = Arc::new(JsonFileRepository::new(&config.relations_path).await?);
//! let interceptor = PublishInterceptor::from_config(&config, assets.clone(), repository)?;
//!
//! let logo = assets.import_file(Path::new("logo.png"), "persistent").await?;
//! interceptor.publish_resource(&logo, "persistent").await?;
//! interceptor.persist().await?;
//! ```

pub mod asset;
pub mod config;
pub mod content_key;
pub mod error;
mod file_lock;
pub mod optimizer;
pub mod progress;
pub mod relation;
pub mod rule;
pub mod storage;
pub mod target;
pub mod template;
pub mod tool_resolver;
pub mod utils;

pub use asset::{Asset, Collection};
pub use config::{Config, RuleConfig, TargetConfig};
pub use content_key::ContentKey;
pub use error::{OptimizeError, Result};
pub use optimizer::{DeletionCoordinator, OptimizerRunner, PublishInterceptor, PublishOutcome, TargetRegistry};
pub use relation::{JsonFileRepository, MemoryRepository, OptimizedArtifactRelation, OptimizedArtifactStore, RelationRepository};
pub use rule::{OptimizerRule, RuleTable};
pub use storage::{AssetStore, LocalAssetStore};
pub use target::{FileSystemTarget, Publishable};
