//! # Publishing Target Module
//!
//! Un target rende gli asset pubblicamente serviti e ne calcola l'URI.
//!
//! ## Componenti:
//! - `Publishable`: capability implementata dai target reali ed anche dal
//!   `PublishInterceptor`, che decora un target per composizione
//! - `FileSystemTarget`: copia i bytes in `<path>/<hash>/<filename>`
//! - `build_target()`: factory dal `TargetConfig`

pub mod filesystem;
#[cfg(test)]
pub(crate) mod recording;

pub use filesystem::FileSystemTarget;

use crate::asset::{Asset, Collection};
use crate::config::TargetConfig;
use crate::error::Result;
use crate::storage::AssetStore;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Publishable: Send + Sync {
    fn name(&self) -> &str;

    /// Publish every asset of the collection
    async fn publish_collection(&self, collection: &Collection) -> Result<()>;

    /// Publish one asset belonging to `collection`
    async fn publish_resource(&self, asset: &Asset, collection: &str) -> Result<()>;

    async fn unpublish_resource(&self, asset: &Asset) -> Result<()>;

    /// Public URI under which `asset` is (or would be) served
    async fn public_uri(&self, asset: &Asset) -> Result<String>;

    /// Public URI of a static resource, relative to the target root
    fn public_static_uri(&self, relative_path: &str) -> String;
}

/// Build the real target described by the configuration
pub fn build_target(name: &str, config: &TargetConfig, source: Arc<dyn AssetStore>) -> Box<dyn Publishable> {
    match config {
        TargetConfig::FileSystem { path, base_uri } => {
            Box::new(FileSystemTarget::new(name, path.clone(), base_uri, source))
        }
    }
}
