//! Reacts to the deletion of assets by staging removal of the owning relation.
//!
//! Two kinds of deleted assets matter: an original (found by its content key) and an
//! optimized artifact (found by artifact id). The same relation is removed once per
//! unit of work no matter how many notifications arrive for it.

use crate::asset::Asset;
use crate::content_key::ContentKey;
use crate::error::Result;
use crate::relation::{Lookup, OptimizedArtifactStore};
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
pub struct DeletionCoordinator {
    seen: Mutex<HashSet<ContentKey>>,
}

impl DeletionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage removal of the relation owned by `asset`. Returns true when a
    /// removal was staged by this call.
    pub async fn on_original_removed(&self, store: &OptimizedArtifactStore, asset: &Asset) -> Result<bool> {
        let relation = match store.lookup(&asset.content_key()).await? {
            Lookup::Committed(relation) | Lookup::Pending(relation) => Some(relation),
            Lookup::PendingRemoval(_) | Lookup::Missing => store.find_by_artifact(&asset.id).await?,
        };

        let Some(relation) = relation else {
            return Ok(false);
        };

        let mut seen = self.seen.lock().await;
        if !seen.insert(relation.key.clone()) {
            debug!("Removal of relation {} already handled", relation.key);
            return Ok(false);
        }
        drop(seen);

        debug!("Asset {} removed, dropping relation {}", asset.id, relation.key);
        Ok(store.stage_removal(relation).await)
    }

    /// Forget handled keys at a unit-of-work boundary
    pub async fn reset(&self) {
        self.seen.lock().await.clear();
    }

    pub async fn handled(&self) -> usize {
        self.seen.lock().await.len()
    }
}
