use super::Publishable;
use crate::asset::{Asset, Collection};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Publish(Uuid),
    Unpublish(Uuid),
}

/// Test double recording every publish/unpublish it receives
#[derive(Clone, Default)]
pub struct RecordingTarget {
    calls: Arc<Mutex<Vec<Call>>>,
    collections: Arc<Mutex<Vec<(Uuid, String)>>>,
}

impl RecordingTarget {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<Uuid> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Publish(id) => Some(id),
                Call::Unpublish(_) => None,
            })
            .collect()
    }

    pub fn unpublished(&self) -> Vec<Uuid> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Unpublish(id) => Some(id),
                Call::Publish(_) => None,
            })
            .collect()
    }

    /// Every published asset with the collection it was published into
    pub fn published_into(&self) -> Vec<(Uuid, String)> {
        self.collections.lock().unwrap().clone()
    }

    pub fn uri_of(asset: &Asset) -> String {
        format!("mem://{}/{}", asset.content_hash, asset.filename)
    }
}

#[async_trait]
impl Publishable for RecordingTarget {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish_collection(&self, collection: &Collection) -> Result<()> {
        for asset in &collection.assets {
            self.publish_resource(asset, &collection.name).await?;
        }
        Ok(())
    }

    async fn publish_resource(&self, asset: &Asset, collection: &str) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Publish(asset.id));
        self.collections
            .lock()
            .unwrap()
            .push((asset.id, collection.to_string()));
        Ok(())
    }

    async fn unpublish_resource(&self, asset: &Asset) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Unpublish(asset.id));
        Ok(())
    }

    async fn public_uri(&self, asset: &Asset) -> Result<String> {
        Ok(Self::uri_of(asset))
    }

    fn public_static_uri(&self, relative_path: &str) -> String {
        format!("mem://static/{}", relative_path)
    }
}
