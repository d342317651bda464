//! # Publish Interceptor
//!
//! Decoratore su un target reale: ogni publish/unpublish passa da qui.
//!
//! ## Stati per ogni asset pubblicato:
//! - `NotApplicable`: nessuna regola per il media type (o stream non disponibile) → passthrough
//! - `Cached`: relazione committata → viene pubblicato l'artefatto ottimizzato
//! - `AlreadyStaged`: relazione già in staging in questa unit of work → originale, nessun nuovo run
//! - `Optimized`: cache miss, il runner ha prodotto un artefatto → relazione in staging, originale pubblicato
//! - `FailedFallback`: il tool esterno ha fallito → warning, originale pubblicato
//!
//! ## Unit of work:
//! Le relazioni nuove diventano visibili (anche per `public_uri`) solo dopo `persist()`.
//! `persist()` committa in una transazione e poi sincronizza il target reale:
//! pubblica gli artefatti inseriti e ritira quelli rimossi.
//!
//! Solo gli errori dell'ottimizzatore vengono assorbiti; storage, I/O e target propagano.

use super::deletion::DeletionCoordinator;
use super::runner::OptimizerRunner;
use crate::asset::{Asset, Collection};
use crate::config::Config;
use crate::error::Result;
use crate::relation::{CommitReport, Lookup, OptimizedArtifactRelation, OptimizedArtifactStore, RelationRepository};
use crate::rule::RuleTable;
use crate::storage::AssetStore;
use crate::target::{build_target, Publishable};
use crate::tool_resolver::ToolPathResolver;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one asset on the publish path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    NotApplicable,
    Cached { artifact: Asset },
    AlreadyStaged,
    Optimized { original_size: u64, optimized_size: u64 },
    FailedFallback,
}

pub struct PublishInterceptor {
    name: String,
    rules: RuleTable,
    real_target: Box<dyn Publishable>,
    assets: Arc<dyn AssetStore>,
    store: OptimizedArtifactStore,
    runner: OptimizerRunner,
    deletions: DeletionCoordinator,
    optimized_collection: String,
}

impl PublishInterceptor {
    pub fn new(
        name: &str,
        rules: RuleTable,
        real_target: Box<dyn Publishable>,
        assets: Arc<dyn AssetStore>,
        repository: Arc<dyn RelationRepository>,
        runner: OptimizerRunner,
        optimized_collection: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            rules,
            real_target,
            store: OptimizedArtifactStore::new(repository, assets.clone()),
            assets,
            runner,
            deletions: DeletionCoordinator::new(),
            optimized_collection: optimized_collection.to_string(),
        }
    }

    /// Build an interceptor and its real target from configuration. Every rule is
    /// resolved and parsed here, so a broken configuration never reaches publish time.
    pub fn from_config(
        config: &Config,
        assets: Arc<dyn AssetStore>,
        repository: Arc<dyn RelationRepository>,
    ) -> Result<Self> {
        config.validate()?;
        let rules = RuleTable::from_config(&config.media_types, &ToolPathResolver::new())?;
        let real_target = build_target(&config.name, &config.target, assets.clone());
        let runner = OptimizerRunner::new(assets.clone(), config.temp_dir(), config.optimizer_timeout());

        info!(
            "Target {} optimizes {} media types into collection {}",
            config.name,
            rules.len(),
            config.optimized_collection
        );
        Ok(Self::new(
            &config.name,
            rules,
            real_target,
            assets,
            repository,
            runner,
            &config.optimized_collection,
        ))
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn store(&self) -> &OptimizedArtifactStore {
        &self.store
    }

    pub fn real_target(&self) -> &dyn Publishable {
        self.real_target.as_ref()
    }

    pub fn should_optimize(&self, media_type: &str) -> bool {
        self.rules.should_optimize(media_type)
    }

    /// True when publishing `asset` now would run the optimizer
    pub async fn needs_to_be_optimized(&self, asset: &Asset) -> Result<bool> {
        if !self.should_optimize(&asset.media_type) {
            return Ok(false);
        }
        match self.store.lookup(&asset.content_key()).await? {
            Lookup::Committed(_) | Lookup::Pending(_) => Ok(false),
            Lookup::PendingRemoval(_) | Lookup::Missing => Ok(self.assets.open(asset).await?.is_some()),
        }
    }

    /// Publish one asset and report which path it took
    pub async fn publish_with_outcome(&self, asset: &Asset, collection: &str) -> Result<PublishOutcome> {
        let outcome = self.optimize_if_needed(asset).await?;
        match &outcome {
            PublishOutcome::Cached { artifact } => {
                self.real_target
                    .publish_resource(artifact, &self.optimized_collection)
                    .await?;
            }
            _ => self.real_target.publish_resource(asset, collection).await?,
        }
        Ok(outcome)
    }

    async fn optimize_if_needed(&self, asset: &Asset) -> Result<PublishOutcome> {
        let Some(rule) = self.rules.rule_for(&asset.media_type) else {
            debug!(filename = %asset.filename, "No optimizer rule for {}", asset.media_type);
            return Ok(PublishOutcome::NotApplicable);
        };

        let key = asset.content_key();
        match self.store.lookup(&key).await? {
            Lookup::Committed(relation) => {
                debug!(filename = %asset.filename, key = %key, "Using cached optimized artifact");
                return Ok(PublishOutcome::Cached {
                    artifact: relation.artifact,
                });
            }
            Lookup::Pending(_) => {
                debug!(filename = %asset.filename, key = %key, "Optimized artifact already staged");
                return Ok(PublishOutcome::AlreadyStaged);
            }
            Lookup::PendingRemoval(_) | Lookup::Missing => {}
        }

        let Some(stream) = self.assets.open(asset).await? else {
            debug!(filename = %asset.filename, "Stream not available, skipping optimization");
            return Ok(PublishOutcome::NotApplicable);
        };

        match self
            .runner
            .run(stream, &asset.filename, &asset.media_type, rule, &self.optimized_collection)
            .await
        {
            Ok(result) => {
                info!(
                    filename = %asset.filename,
                    key = %key,
                    "Optimized {} -> {} bytes",
                    result.original_size,
                    result.artifact.size
                );
                let optimized_size = result.artifact.size;
                self.store
                    .stage(OptimizedArtifactRelation::new(key, result.artifact))
                    .await;
                Ok(PublishOutcome::Optimized {
                    original_size: result.original_size,
                    optimized_size,
                })
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    "Optimization of resource \"{}\" failed, using original, error: {}",
                    asset.filename, e
                );
                Ok(PublishOutcome::FailedFallback)
            }
            Err(e) => Err(e),
        }
    }

    /// Forward the deletion of `asset` to the deletion coordinator
    pub async fn on_asset_removed(&self, asset: &Asset) -> Result<bool> {
        self.deletions.on_original_removed(&self.store, asset).await
    }

    /// Commit the unit of work, then bring the real target in line with it
    pub async fn persist(&self) -> Result<CommitReport> {
        let report = self.store.commit().await?;

        for relation in &report.removed {
            // byte-identical artifacts share the original's published location
            if relation.artifact.content_key() == relation.key {
                continue;
            }
            if let Err(e) = self.real_target.unpublish_resource(&relation.artifact).await {
                warn!("Could not unpublish optimized artifact {}: {}", relation.artifact.id, e);
            }
        }
        for relation in &report.inserted {
            if let Err(e) = self
                .real_target
                .publish_resource(&relation.artifact, &self.optimized_collection)
                .await
            {
                warn!("Could not publish optimized artifact {}: {}", relation.artifact.id, e);
            }
        }

        self.deletions.reset().await;
        Ok(report)
    }

    /// Abandon the unit of work
    pub async fn discard(&self) {
        self.store.discard().await;
        self.deletions.reset().await;
    }
}

#[async_trait]
impl Publishable for PublishInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish_collection(&self, collection: &Collection) -> Result<()> {
        let mut assets = Vec::with_capacity(collection.assets.len());
        for asset in &collection.assets {
            match self.optimize_if_needed(asset).await? {
                PublishOutcome::Cached { artifact } => assets.push(artifact),
                _ => assets.push(asset.clone()),
            }
        }
        self.real_target
            .publish_collection(&Collection::new(&collection.name, assets))
            .await
    }

    async fn publish_resource(&self, asset: &Asset, collection: &str) -> Result<()> {
        self.publish_with_outcome(asset, collection).await.map(|_| ())
    }

    async fn unpublish_resource(&self, asset: &Asset) -> Result<()> {
        if self.should_optimize(&asset.media_type) {
            match self.store.lookup(&asset.content_key()).await? {
                Lookup::Committed(relation) | Lookup::Pending(relation) => {
                    self.store.stage_removal(relation).await;
                }
                Lookup::PendingRemoval(_) => {}
                Lookup::Missing => {
                    debug!(filename = %asset.filename, "Unpublished asset has no optimized artifact");
                }
            }
        }
        self.real_target.unpublish_resource(asset).await
    }

    async fn public_uri(&self, asset: &Asset) -> Result<String> {
        if self.should_optimize(&asset.media_type) {
            if let Lookup::Committed(relation) = self.store.lookup(&asset.content_key()).await? {
                return self.real_target.public_uri(&relation.artifact).await;
            }
        }
        self.real_target.public_uri(asset).await
    }

    fn public_static_uri(&self, relative_path: &str) -> String {
        self.real_target.public_static_uri(relative_path)
    }
}
