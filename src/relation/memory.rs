//! Relation repository kept entirely in memory. Used for tests and for hosts
//! that embed their own persistence around it.

use super::{OptimizedArtifactRelation, RelationRepository, RelationTable, RepositoryTransaction, TransactionOutcome};
use crate::content_key::ContentKey;
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryRepository {
    table: RwLock<RelationTable>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.values().count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RelationRepository for MemoryRepository {
    async fn find_by_key(&self, key: &ContentKey) -> Result<Option<OptimizedArtifactRelation>> {
        Ok(self.table.read().await.get(key).cloned())
    }

    async fn find_by_artifact(&self, artifact_id: &Uuid) -> Result<Option<OptimizedArtifactRelation>> {
        Ok(self.table.read().await.by_artifact(artifact_id).cloned())
    }

    async fn commit_transaction(&self, transaction: RepositoryTransaction) -> Result<TransactionOutcome> {
        Ok(self.table.write().await.apply(transaction))
    }

    async fn all(&self) -> Result<Vec<OptimizedArtifactRelation>> {
        Ok(self.table.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;

    fn relation(hash: &str) -> OptimizedArtifactRelation {
        OptimizedArtifactRelation::new(
            ContentKey::compute(hash, "logo.png"),
            Asset {
                id: Uuid::new_v4(),
                content_hash: format!("optimized-{}", hash),
                filename: "logo.png".to_string(),
                media_type: "image/png".to_string(),
                size: 10,
                collection: "optimized".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_commit_and_lookup() {
        let repository = MemoryRepository::new();
        let rel = relation("a");

        let mut tx = RepositoryTransaction::default();
        tx.insert(rel.clone());
        let outcome = repository.commit_transaction(tx).await.unwrap();

        assert_eq!(outcome.inserted, vec![rel.clone()]);
        assert_eq!(repository.find_by_key(&rel.key).await.unwrap(), Some(rel.clone()));
        assert_eq!(repository.find_by_artifact(&rel.artifact.id).await.unwrap(), Some(rel));
    }

    #[tokio::test]
    async fn test_duplicate_key_is_a_conflict() {
        let repository = MemoryRepository::new();
        let first = relation("a");
        let mut second = relation("a");
        second.artifact.content_hash = "other".to_string();

        let mut tx = RepositoryTransaction::default();
        tx.insert(first.clone());
        repository.commit_transaction(tx).await.unwrap();

        let mut tx = RepositoryTransaction::default();
        tx.insert(second.clone());
        tx.insert(relation("b"));
        let outcome = repository.commit_transaction(tx).await.unwrap();

        assert_eq!(outcome.inserted.len(), 1);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].rejected, second);
        assert_eq!(outcome.conflicts[0].existing, first);
        assert_eq!(repository.len().await, 2);
    }

    #[tokio::test]
    async fn test_removal_before_insert_allows_replacement() {
        let repository = MemoryRepository::new();
        let old = relation("a");
        let mut tx = RepositoryTransaction::default();
        tx.insert(old.clone());
        repository.commit_transaction(tx).await.unwrap();

        let mut replacement = relation("a");
        replacement.artifact.size = 5;
        let mut tx = RepositoryTransaction::default();
        tx.remove(old.key.clone());
        tx.insert(replacement.clone());
        let outcome = repository.commit_transaction(tx).await.unwrap();

        assert_eq!(outcome.removed, vec![old.clone()]);
        assert_eq!(outcome.inserted, vec![replacement.clone()]);
        assert_eq!(repository.find_by_key(&old.key).await.unwrap(), Some(replacement));
    }

    #[tokio::test]
    async fn test_removing_unknown_key_is_noop() {
        let repository = MemoryRepository::new();
        let mut tx = RepositoryTransaction::default();
        tx.remove(ContentKey::compute("nope", "x.png"));
        let outcome = repository.commit_transaction(tx).await.unwrap();
        assert!(outcome.removed.is_empty());
        assert!(repository.is_empty().await);
    }
}
