//! # Asset Storage Module
//!
//! Interfaccia verso lo storage degli asset (originali e artefatti ottimizzati).
//!
//! - `AssetStore`: trait usato dal runner (import) e dall'interceptor (stream, rimozione)
//! - `LocalAssetStore`: implementazione su filesystem con indice JSON

pub mod local;

pub use local::LocalAssetStore;

use crate::asset::{Asset, Collection};
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Readable byte stream of a stored asset
pub type AssetStream = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Open the bytes of an asset. `None` means the bytes are not available.
    async fn open(&self, asset: &Asset) -> Result<Option<AssetStream>>;

    /// Import a file as a new asset of `collection`, named `filename`
    async fn import_artifact(&self, path: &Path, collection: &str, filename: &str) -> Result<Asset>;

    /// Delete an asset and its bytes. Unknown assets are ignored.
    async fn remove(&self, asset: &Asset) -> Result<()>;

    async fn get(&self, id: &Uuid) -> Result<Option<Asset>>;

    async fn collection(&self, name: &str) -> Result<Collection>;
}
