//! # Optimized Artifact Store
//!
//! Combina il repository durevole con lo staging in memoria di una unit of work.
//!
//! ## Flusso:
//! 1. `lookup()` distingue relazioni committate, in attesa di insert, in attesa di rimozione
//! 2. `stage()` / `stage_removal()` modificano solo il `PendingWriteSet`
//! 3. `commit()` applica tutto in una transazione, poi esegue il cascade sugli artefatti
//! 4. `discard()` abbandona la unit of work ed elimina gli artefatti mai referenziati
//!
//! Dopo un commit fallito il `PendingWriteSet` resta com'era: il chiamante deve trattare
//! la unit of work come abortita (tipicamente con `discard()`).

use super::{Conflict, OptimizedArtifactRelation, RelationRepository, RepositoryTransaction};
use crate::asset::Asset;
use crate::content_key::ContentKey;
use crate::error::{OptimizeError, Result};
use crate::storage::AssetStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// State of a key as seen from inside the current unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Durable and not staged for removal
    Committed(OptimizedArtifactRelation),
    /// Staged in this unit of work, not yet durable
    Pending(OptimizedArtifactRelation),
    /// Durable, but staged for removal
    PendingRemoval(OptimizedArtifactRelation),
    Missing,
}

/// Staged changes of one unit of work
#[derive(Debug, Default)]
pub struct PendingWriteSet {
    new_relations: BTreeMap<ContentKey, OptimizedArtifactRelation>,
    removals: BTreeMap<ContentKey, OptimizedArtifactRelation>,
    orphaned: Vec<Asset>,
}

impl PendingWriteSet {
    pub fn is_empty(&self) -> bool {
        self.new_relations.is_empty() && self.removals.is_empty() && self.orphaned.is_empty()
    }

    pub fn new_relations(&self) -> impl Iterator<Item = &OptimizedArtifactRelation> {
        self.new_relations.values()
    }

    pub fn removals(&self) -> impl Iterator<Item = &OptimizedArtifactRelation> {
        self.removals.values()
    }

    fn to_transaction(&self) -> RepositoryTransaction {
        RepositoryTransaction {
            removals: self.removals.keys().cloned().collect(),
            inserts: self.new_relations.values().cloned().collect(),
        }
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub inserted: Vec<OptimizedArtifactRelation>,
    pub removed: Vec<OptimizedArtifactRelation>,
    pub conflicts: Vec<Conflict>,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty() && self.conflicts.is_empty()
    }
}

pub struct OptimizedArtifactStore {
    repository: Arc<dyn RelationRepository>,
    assets: Arc<dyn AssetStore>,
    pending: Mutex<PendingWriteSet>,
}

impl OptimizedArtifactStore {
    pub fn new(repository: Arc<dyn RelationRepository>, assets: Arc<dyn AssetStore>) -> Self {
        Self {
            repository,
            assets,
            pending: Mutex::new(PendingWriteSet::default()),
        }
    }

    /// Durable relation for `key`, ignoring staged changes
    pub async fn find(&self, key: &ContentKey) -> Result<Option<OptimizedArtifactRelation>> {
        self.repository.find_by_key(key).await
    }

    pub async fn find_by_artifact(&self, artifact_id: &Uuid) -> Result<Option<OptimizedArtifactRelation>> {
        self.repository.find_by_artifact(artifact_id).await
    }

    /// State of `key` including changes staged in this unit of work
    pub async fn lookup(&self, key: &ContentKey) -> Result<Lookup> {
        {
            let pending = self.pending.lock().await;
            if let Some(relation) = pending.new_relations.get(key) {
                return Ok(Lookup::Pending(relation.clone()));
            }
            if let Some(relation) = pending.removals.get(key) {
                return Ok(Lookup::PendingRemoval(relation.clone()));
            }
        }

        Ok(match self.repository.find_by_key(key).await? {
            Some(relation) => Lookup::Committed(relation),
            None => Lookup::Missing,
        })
    }

    /// Stage a new relation for the next commit
    pub async fn stage(&self, relation: OptimizedArtifactRelation) {
        let mut pending = self.pending.lock().await;
        debug!("Staging relation {} -> {}", relation.key, relation.artifact.id);
        if let Some(replaced) = pending.new_relations.insert(relation.key.clone(), relation) {
            pending.orphaned.push(replaced.artifact);
        }
    }

    /// Stage removal of a relation (and, through cascade, of its artifact).
    /// Returns false when the removal was already staged.
    pub async fn stage_removal(&self, relation: OptimizedArtifactRelation) -> bool {
        let mut pending = self.pending.lock().await;
        let key = relation.key.clone();

        let staged_artifact = pending.new_relations.get(&key).map(|staged| staged.artifact.id);
        if staged_artifact == Some(relation.artifact.id) {
            // never reached storage, only the artifact needs to go
            if let Some(staged) = pending.new_relations.remove(&key) {
                pending.orphaned.push(staged.artifact);
            }
            debug!("Cancelled staged relation {}", key);
            return true;
        }

        debug!("Staging removal of relation {}", key);
        pending.removals.insert(key, relation).is_none()
    }

    pub async fn has_pending_changes(&self) -> bool {
        !self.pending.lock().await.is_empty()
    }

    /// Persist every staged change in one transaction, then clear the staging set
    pub async fn commit(&self) -> Result<CommitReport> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return Ok(CommitReport::default());
        }

        let transaction = pending.to_transaction();
        let outcome = if transaction.is_empty() {
            Default::default()
        } else {
            self.repository
                .commit_transaction(transaction)
                .await
                .map_err(|e| match e {
                    OptimizeError::StorageCommitFailed(_) => e,
                    other => OptimizeError::StorageCommitFailed(other.to_string()),
                })?
        };
        let staged = std::mem::take(&mut *pending);
        drop(pending);

        for relation in &outcome.removed {
            self.delete_artifact(&relation.artifact).await;
        }
        for conflict in &outcome.conflicts {
            if conflict.rejected.artifact.id == conflict.existing.artifact.id {
                warn!(
                    "Artifact {} already belongs to relation {}, not storing it under {}",
                    conflict.existing.artifact.id, conflict.existing.key, conflict.rejected.key
                );
                continue;
            }
            info!(
                "Relation {} was already stored with artifact {}, dropping artifact {}",
                conflict.existing.key, conflict.existing.artifact.id, conflict.rejected.artifact.id
            );
            self.delete_artifact(&conflict.rejected.artifact).await;
        }
        for orphan in &staged.orphaned {
            self.delete_artifact(orphan).await;
        }

        info!(
            "Committed {} new and {} removed optimized artifact relations",
            outcome.inserted.len(),
            outcome.removed.len()
        );
        Ok(CommitReport {
            inserted: outcome.inserted,
            removed: outcome.removed,
            conflicts: outcome.conflicts,
        })
    }

    /// Drop every staged change, deleting artifacts nothing will reference
    pub async fn discard(&self) {
        let staged = std::mem::take(&mut *self.pending.lock().await);
        for relation in staged.new_relations.values() {
            self.delete_artifact(&relation.artifact).await;
        }
        for orphan in &staged.orphaned {
            self.delete_artifact(orphan).await;
        }
    }

    /// Remove the relation stored under `key` right away. Unknown keys are a no-op.
    pub async fn remove_by_key(&self, key: &ContentKey) -> Result<bool> {
        let mut transaction = RepositoryTransaction::default();
        transaction.remove(key.clone());
        let outcome = self
            .repository
            .commit_transaction(transaction)
            .await
            .map_err(|e| match e {
                OptimizeError::StorageCommitFailed(_) => e,
                other => OptimizeError::StorageCommitFailed(other.to_string()),
            })?;

        for relation in &outcome.removed {
            self.delete_artifact(&relation.artifact).await;
        }
        Ok(!outcome.removed.is_empty())
    }

    async fn delete_artifact(&self, artifact: &Asset) {
        if let Err(e) = self.assets.remove(artifact).await {
            warn!("Could not delete optimized artifact {} ({}): {}", artifact.id, artifact.filename, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{MemoryRepository, TransactionOutcome};
    use crate::storage::LocalAssetStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FailingRepository;

    #[async_trait]
    impl RelationRepository for FailingRepository {
        async fn find_by_key(&self, _key: &ContentKey) -> Result<Option<OptimizedArtifactRelation>> {
            Ok(None)
        }

        async fn find_by_artifact(&self, _id: &Uuid) -> Result<Option<OptimizedArtifactRelation>> {
            Ok(None)
        }

        async fn commit_transaction(&self, _tx: RepositoryTransaction) -> Result<TransactionOutcome> {
            Err(OptimizeError::Io(std::io::Error::new(std::io::ErrorKind::Other, "database is locked")))
        }

        async fn all(&self) -> Result<Vec<OptimizedArtifactRelation>> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        _dir: TempDir,
        assets: Arc<LocalAssetStore>,
        repository: Arc<MemoryRepository>,
        store: OptimizedArtifactStore,
        source: std::path::PathBuf,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let assets = Arc::new(LocalAssetStore::new(&dir.path().join("store")).await.unwrap());
        let repository = Arc::new(MemoryRepository::new());
        let store = OptimizedArtifactStore::new(repository.clone(), assets.clone());
        let source = dir.path().join("logo.png");
        std::fs::write(&source, b"optimized bytes").unwrap();
        Fixture {
            _dir: dir,
            assets,
            repository,
            store,
            source,
        }
    }

    async fn artifact_relation(fx: &Fixture, hash: &str) -> OptimizedArtifactRelation {
        let artifact = fx
            .assets
            .import_artifact(&fx.source, "optimized", "logo.png")
            .await
            .unwrap();
        OptimizedArtifactRelation::new(ContentKey::compute(hash, "logo.png"), artifact)
    }

    #[tokio::test]
    async fn test_stage_is_not_durable_until_commit() {
        let fx = fixture().await;
        let relation = artifact_relation(&fx, "abc").await;

        fx.store.stage(relation.clone()).await;
        assert!(fx.store.find(&relation.key).await.unwrap().is_none());
        assert_eq!(fx.store.lookup(&relation.key).await.unwrap(), Lookup::Pending(relation.clone()));

        let report = fx.store.commit().await.unwrap();
        assert_eq!(report.inserted, vec![relation.clone()]);
        assert_eq!(fx.store.lookup(&relation.key).await.unwrap(), Lookup::Committed(relation));
        assert!(!fx.store.has_pending_changes().await);
    }

    #[tokio::test]
    async fn test_removal_cascades_to_artifact() {
        let fx = fixture().await;
        let relation = artifact_relation(&fx, "abc").await;
        fx.store.stage(relation.clone()).await;
        fx.store.commit().await.unwrap();

        assert!(fx.store.stage_removal(relation.clone()).await);
        assert!(!fx.store.stage_removal(relation.clone()).await);
        assert_eq!(
            fx.store.lookup(&relation.key).await.unwrap(),
            Lookup::PendingRemoval(relation.clone())
        );

        let report = fx.store.commit().await.unwrap();
        assert_eq!(report.removed, vec![relation.clone()]);
        assert!(fx.repository.is_empty().await);
        assert!(fx.assets.get(&relation.artifact.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelling_a_staged_relation_deletes_its_artifact() {
        let fx = fixture().await;
        let relation = artifact_relation(&fx, "abc").await;

        fx.store.stage(relation.clone()).await;
        assert!(fx.store.stage_removal(relation.clone()).await);
        assert_eq!(fx.store.lookup(&relation.key).await.unwrap(), Lookup::Missing);

        let report = fx.store.commit().await.unwrap();
        assert!(report.inserted.is_empty());
        assert!(fx.assets.get(&relation.artifact.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lost_race_keeps_existing_relation() {
        let fx = fixture().await;
        let winner = artifact_relation(&fx, "abc").await;
        let loser = artifact_relation(&fx, "abc").await;

        let mut tx = RepositoryTransaction::default();
        tx.insert(winner.clone());
        fx.repository.commit_transaction(tx).await.unwrap();

        fx.store.stage(loser.clone()).await;
        let report = fx.store.commit().await.unwrap();

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].existing, winner);
        assert_eq!(fx.store.find(&winner.key).await.unwrap(), Some(winner.clone()));
        assert!(fx.assets.get(&loser.artifact.id).await.unwrap().is_none());
        assert!(fx.assets.get(&winner.artifact.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_artifact_claimed_by_another_key_is_kept() {
        let fx = fixture().await;
        let owner = artifact_relation(&fx, "abc").await;
        let claim = OptimizedArtifactRelation::new(ContentKey::compute("def", "logo.png"), owner.artifact.clone());
        fx.store.stage(owner.clone()).await;
        fx.store.commit().await.unwrap();

        fx.store.stage(claim.clone()).await;
        let report = fx.store.commit().await.unwrap();

        assert!(report.inserted.is_empty());
        assert_eq!(report.conflicts[0].existing, owner);
        assert!(fx.store.find(&claim.key).await.unwrap().is_none());
        assert!(fx.assets.get(&owner.artifact.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_commit_propagates_and_applies_nothing() {
        let fx = fixture().await;
        let store = OptimizedArtifactStore::new(Arc::new(FailingRepository), fx.assets.clone());
        let relation = artifact_relation(&fx, "abc").await;

        store.stage(relation.clone()).await;
        let result = store.commit().await;
        assert!(matches!(result, Err(OptimizeError::StorageCommitFailed(_))));
        assert!(store.has_pending_changes().await);

        store.discard().await;
        assert!(!store.has_pending_changes().await);
        assert!(fx.assets.get(&relation.artifact.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_by_key_is_idempotent() {
        let fx = fixture().await;
        let relation = artifact_relation(&fx, "abc").await;
        fx.store.stage(relation.clone()).await;
        fx.store.commit().await.unwrap();

        assert!(fx.store.remove_by_key(&relation.key).await.unwrap());
        assert!(!fx.store.remove_by_key(&relation.key).await.unwrap());
        assert!(fx.assets.get(&relation.artifact.id).await.unwrap().is_none());
    }
}
