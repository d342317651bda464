//! # Optimized Artifact Relations
//!
//! Questo modulo gestisce il mapping durevole ContentKey → artefatto ottimizzato.
//!
//! ## Responsabilità:
//! - `OptimizedArtifactRelation`: il record persistito `{ key, artifact }`
//! - `RelationRepository`: repository transazionale (lookup per chiave e per artefatto)
//! - `MemoryRepository` / `JsonFileRepository`: implementazioni in memoria e su file JSON
//! - `OptimizedArtifactStore`: staging in memoria (`PendingWriteSet`) + commit atomico
//!
//! ## Invarianti:
//! - `key` è unica: al più un artefatto ottimizzato per identità di contenuto
//! - l'artefatto appartiene esclusivamente alla relazione: rimuovere la relazione
//!   rimuove anche l'artefatto (cascade, eseguito da `OptimizedArtifactStore`)
//! - una transazione si applica tutta o per niente

pub mod json_file;
pub mod memory;
pub mod store;

pub use json_file::JsonFileRepository;
pub use memory::MemoryRepository;
pub use store::{CommitReport, Lookup, OptimizedArtifactStore, PendingWriteSet};

use crate::asset::Asset;
use crate::content_key::ContentKey;
use crate::error::{OptimizeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Durable link from an original's content identity to its optimized artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizedArtifactRelation {
    pub key: ContentKey,
    pub artifact: Asset,
}

impl OptimizedArtifactRelation {
    pub fn new(key: ContentKey, artifact: Asset) -> Self {
        Self { key, artifact }
    }
}

/// Changes applied atomically by `RelationRepository::commit_transaction`.
/// Removals are applied before inserts.
#[derive(Debug, Clone, Default)]
pub struct RepositoryTransaction {
    pub removals: Vec<ContentKey>,
    pub inserts: Vec<OptimizedArtifactRelation>,
}

impl RepositoryTransaction {
    pub fn remove(&mut self, key: ContentKey) {
        self.removals.push(key);
    }

    pub fn insert(&mut self, relation: OptimizedArtifactRelation) {
        self.inserts.push(relation);
    }

    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.inserts.is_empty()
    }
}

/// An insert that lost against a relation already stored under the same key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub rejected: OptimizedArtifactRelation,
    pub existing: OptimizedArtifactRelation,
}

/// What a committed transaction actually changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub inserted: Vec<OptimizedArtifactRelation>,
    pub removed: Vec<OptimizedArtifactRelation>,
    pub conflicts: Vec<Conflict>,
}

#[async_trait]
pub trait RelationRepository: Send + Sync {
    async fn find_by_key(&self, key: &ContentKey) -> Result<Option<OptimizedArtifactRelation>>;

    async fn find_by_artifact(&self, artifact_id: &Uuid) -> Result<Option<OptimizedArtifactRelation>>;

    /// Apply the transaction atomically. Duplicate keys are reported as
    /// conflicts, not errors; a failure leaves the repository unchanged.
    async fn commit_transaction(&self, transaction: RepositoryTransaction) -> Result<TransactionOutcome>;

    async fn all(&self) -> Result<Vec<OptimizedArtifactRelation>>;
}

/// In-memory relation table shared by the repository implementations.
/// Keys and artifact ids are both unique; `artifacts` indexes the owner of each artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StoredRelations", into = "StoredRelations")]
pub(crate) struct RelationTable {
    relations: HashMap<ContentKey, OptimizedArtifactRelation>,
    artifacts: HashMap<Uuid, ContentKey>,
}

/// On-disk form of `RelationTable`; the artifact index is rebuilt on load
#[derive(Serialize, Deserialize)]
struct StoredRelations {
    relations: HashMap<ContentKey, OptimizedArtifactRelation>,
}

impl From<StoredRelations> for RelationTable {
    fn from(stored: StoredRelations) -> Self {
        let artifacts = stored
            .relations
            .values()
            .map(|relation| (relation.artifact.id, relation.key.clone()))
            .collect();
        Self {
            relations: stored.relations,
            artifacts,
        }
    }
}

impl From<RelationTable> for StoredRelations {
    fn from(table: RelationTable) -> Self {
        Self {
            relations: table.relations,
        }
    }
}

impl RelationTable {
    pub(crate) fn get(&self, key: &ContentKey) -> Option<&OptimizedArtifactRelation> {
        self.relations.get(key)
    }

    pub(crate) fn by_artifact(&self, artifact_id: &Uuid) -> Option<&OptimizedArtifactRelation> {
        self.artifacts
            .get(artifact_id)
            .and_then(|key| self.relations.get(key))
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &OptimizedArtifactRelation> {
        self.relations.values()
    }

    /// Stored relation an insert of `relation` would collide with, by key or by artifact
    fn conflicting(&self, relation: &OptimizedArtifactRelation) -> Option<&OptimizedArtifactRelation> {
        self.get(&relation.key)
            .or_else(|| self.by_artifact(&relation.artifact.id))
    }

    fn insert(&mut self, relation: OptimizedArtifactRelation) -> Result<()> {
        if self.conflicting(&relation).is_some() {
            return Err(OptimizeError::DuplicateKey(relation.key));
        }
        self.artifacts.insert(relation.artifact.id, relation.key.clone());
        self.relations.insert(relation.key.clone(), relation);
        Ok(())
    }

    fn remove(&mut self, key: &ContentKey) -> Option<OptimizedArtifactRelation> {
        let removed = self.relations.remove(key)?;
        if self.artifacts.get(&removed.artifact.id) == Some(key) {
            self.artifacts.remove(&removed.artifact.id);
        }
        Some(removed)
    }

    /// Apply a transaction to this table in place and describe the result
    pub(crate) fn apply(&mut self, transaction: RepositoryTransaction) -> TransactionOutcome {
        let mut outcome = TransactionOutcome::default();

        for key in transaction.removals {
            if let Some(removed) = self.remove(&key) {
                outcome.removed.push(removed);
            }
        }

        for relation in transaction.inserts {
            match self.insert(relation.clone()) {
                Ok(()) => outcome.inserted.push(relation),
                Err(_) => {
                    let existing = self
                        .conflicting(&relation)
                        .cloned()
                        .unwrap_or_else(|| relation.clone());
                    outcome.conflicts.push(Conflict {
                        rejected: relation,
                        existing,
                    });
                }
            }
        }

        outcome
    }
}
