//! # JSON File Relation Repository
//!
//! Persiste le relazioni in un singolo file JSON.
//!
//! ## Strategia di persistence:
//! - Stato caricato in memoria all'apertura, usato per i lookup
//! - Al commit si prende il lock esclusivo su `relations.json.lock`, il file viene riletto
//!   e la transazione viene applicata alla copia appena letta: il vincolo di unicità vale
//!   anche fra processi diversi, vince il primo commit
//! - La copia viene scritta su file temporaneo che sostituisce l'originale con un rename
//!   atomico: se la scrittura fallisce lo stato precedente resta intatto
//! - Solo dopo il rename la copia diventa lo stato in memoria
//!
//! ## Esempio struttura file:
//! ```json
//! {
//!   "relations": {
//!     "113a0b5f…": {
//!       "key": "113a0b5f…",
//!       "artifact": { "id": "…", "content_hash": "…", "filename": "logo.png", … }
//!     }
//!   }
//! }
//! ```

use super::{OptimizedArtifactRelation, RelationRepository, RelationTable, RepositoryTransaction, TransactionOutcome};
use crate::content_key::ContentKey;
use crate::error::{OptimizeError, Result};
use crate::file_lock::{read_json_or_default, write_json_atomically, FileLock};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub struct JsonFileRepository {
    path: PathBuf,
    table: RwLock<RelationTable>,
}

impl JsonFileRepository {
    /// Open the repository stored at `path`, creating parent directories
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let table = load(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            table: RwLock::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Refresh the in-memory state from disk
    pub async fn reload(&self) -> Result<()> {
        let fresh = load(&self.path).await?;
        *self.table.write().await = fresh;
        Ok(())
    }
}

async fn load(path: &Path) -> Result<RelationTable> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelationTable::default()),
        Err(e) => Err(e.into()),
    }
}

/// Reload, apply and rewrite while holding the cross-process lock
fn commit_locked(path: &Path, transaction: RepositoryTransaction) -> Result<(RelationTable, TransactionOutcome)> {
    let _lock = FileLock::acquire(path)
        .map_err(|e| OptimizeError::StorageCommitFailed(format!("locking {}: {}", path.display(), e)))?;

    let mut next: RelationTable = read_json_or_default(path)
        .map_err(|e| OptimizeError::StorageCommitFailed(format!("reading {}: {}", path.display(), e)))?;
    let outcome = next.apply(transaction);

    write_json_atomically(path, &next)
        .map_err(|e| OptimizeError::StorageCommitFailed(format!("writing {}: {}", path.display(), e)))?;
    Ok((next, outcome))
}

#[async_trait]
impl RelationRepository for JsonFileRepository {
    async fn find_by_key(&self, key: &ContentKey) -> Result<Option<OptimizedArtifactRelation>> {
        Ok(self.table.read().await.get(key).cloned())
    }

    async fn find_by_artifact(&self, artifact_id: &Uuid) -> Result<Option<OptimizedArtifactRelation>> {
        Ok(self.table.read().await.by_artifact(artifact_id).cloned())
    }

    async fn commit_transaction(&self, transaction: RepositoryTransaction) -> Result<TransactionOutcome> {
        let mut table = self.table.write().await;

        let path = self.path.clone();
        let (next, outcome) = tokio::task::spawn_blocking(move || commit_locked(&path, transaction))
            .await
            .map_err(|e| OptimizeError::StorageCommitFailed(e.to_string()))??;

        *table = next;
        debug!(
            "Committed {} inserts, {} removals, {} conflicts to {}",
            outcome.inserted.len(),
            outcome.removed.len(),
            outcome.conflicts.len(),
            self.path.display()
        );
        Ok(outcome)
    }

    async fn all(&self) -> Result<Vec<OptimizedArtifactRelation>> {
        Ok(self.table.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn relation(hash: &str) -> OptimizedArtifactRelation {
        OptimizedArtifactRelation::new(
            ContentKey::compute(hash, "photo.jpg"),
            Asset {
                id: Uuid::new_v4(),
                content_hash: format!("optimized-{}", hash),
                filename: "photo.jpg".to_string(),
                media_type: "image/jpeg".to_string(),
                size: 10,
                collection: "optimized".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_relations_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("relations.json");
        let rel = relation("a");

        {
            let repository = JsonFileRepository::new(&path).await.unwrap();
            let mut tx = RepositoryTransaction::default();
            tx.insert(rel.clone());
            repository.commit_transaction(tx).await.unwrap();
        }

        let reopened = JsonFileRepository::new(&path).await.unwrap();
        assert_eq!(reopened.find_by_key(&rel.key).await.unwrap(), Some(rel.clone()));
        assert_eq!(reopened.find_by_artifact(&rel.artifact.id).await.unwrap(), Some(rel));
    }

    #[tokio::test]
    async fn test_commit_sees_other_writers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relations.json");
        let worker_a = JsonFileRepository::new(&path).await.unwrap();
        let worker_b = JsonFileRepository::new(&path).await.unwrap();

        let mut tx = RepositoryTransaction::default();
        tx.insert(relation("shared"));
        worker_a.commit_transaction(tx).await.unwrap();

        // worker_b never looked the key up, so it optimized again
        assert!(worker_b.find_by_key(&ContentKey::compute("shared", "photo.jpg")).await.unwrap().is_none());
        let mut tx = RepositoryTransaction::default();
        tx.insert(relation("shared"));
        tx.insert(relation("own"));
        let outcome = worker_b.commit_transaction(tx).await.unwrap();

        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.inserted.len(), 1);
        assert_eq!(worker_b.all().await.unwrap().len(), 2);

        worker_a.reload().await.unwrap();
        assert_eq!(worker_a.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_commit_without_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relations.json");
        let repository = JsonFileRepository::new(&path).await.unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let mut tx = RepositoryTransaction::default();
        tx.insert(relation("a"));
        let result = repository.commit_transaction(tx).await;

        assert!(matches!(result, Err(OptimizeError::StorageCommitFailed(_))));
        assert!(repository.all().await.unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_workers_keep_every_insert() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relations.json");
        let workers = [
            Arc::new(JsonFileRepository::new(&path).await.unwrap()),
            Arc::new(JsonFileRepository::new(&path).await.unwrap()),
        ];

        let mut handles = Vec::new();
        for i in 0..40usize {
            let repository = workers[i % 2].clone();
            handles.push(tokio::spawn(async move {
                let mut tx = RepositoryTransaction::default();
                tx.insert(relation(&format!("asset-{}", i)));
                repository.commit_transaction(tx).await.unwrap().inserted.len()
            }));
        }
        let mut reported = 0;
        for handle in handles {
            reported += handle.await.unwrap();
        }

        assert_eq!(reported, 40);
        let reopened = JsonFileRepository::new(&path).await.unwrap();
        assert_eq!(reopened.all().await.unwrap().len(), 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_workers_on_one_key_have_one_winner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relations.json");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repository = Arc::new(JsonFileRepository::new(&path).await.unwrap());
            handles.push(tokio::spawn(async move {
                let mut tx = RepositoryTransaction::default();
                tx.insert(relation("shared"));
                repository.commit_transaction(tx).await.unwrap()
            }));
        }
        let mut inserted = 0;
        let mut conflicts = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            inserted += outcome.inserted.len();
            conflicts += outcome.conflicts.len();
        }

        assert_eq!(inserted, 1);
        assert_eq!(conflicts, 7);
        let reopened = JsonFileRepository::new(&path).await.unwrap();
        assert_eq!(reopened.all().await.unwrap().len(), 1);
    }
}
