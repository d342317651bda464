//! File system publishing target.
//!
//! Published bytes live at `<path>/<content hash>/<filename>`; the public URI
//! is `<base uri>/<content hash>/<encoded filename>`.

use super::Publishable;
use crate::asset::{Asset, Collection};
use crate::error::{OptimizeError, Result};
use crate::storage::AssetStore;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

pub struct FileSystemTarget {
    name: String,
    path: PathBuf,
    base_uri: String,
    source: Arc<dyn AssetStore>,
}

impl FileSystemTarget {
    pub fn new(name: &str, path: PathBuf, base_uri: &str, source: Arc<dyn AssetStore>) -> Self {
        Self {
            name: name.to_string(),
            path,
            base_uri: base_uri.trim_end_matches('/').to_string(),
            source,
        }
    }

    /// Where the bytes of `asset` are published
    pub fn published_path(&self, asset: &Asset) -> PathBuf {
        self.path.join(&asset.content_hash).join(&asset.filename)
    }
}

#[async_trait]
impl Publishable for FileSystemTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish_collection(&self, collection: &Collection) -> Result<()> {
        for asset in &collection.assets {
            self.publish_resource(asset, &collection.name).await?;
        }
        Ok(())
    }

    async fn publish_resource(&self, asset: &Asset, collection: &str) -> Result<()> {
        let destination = self.published_path(asset);
        if fs::metadata(&destination).await.map(|m| m.len() == asset.size).unwrap_or(false) {
            debug!("{} already published at {}", asset.filename, destination.display());
            return Ok(());
        }

        let mut stream = self.source.open(asset).await?.ok_or_else(|| {
            OptimizeError::Publish(format!(
                "could not read asset {} ({}) from collection {}",
                asset.id, asset.filename, collection
            ))
        })?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&destination).await?;
        tokio::io::copy(&mut stream, &mut file).await?;

        debug!("Published {} to {}", asset.filename, destination.display());
        Ok(())
    }

    async fn unpublish_resource(&self, asset: &Asset) -> Result<()> {
        let destination = self.published_path(asset);
        match fs::remove_file(&destination).await {
            Ok(()) => debug!("Unpublished {}", destination.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        // The hash directory is shared by every filename with the same bytes.
        if let Some(parent) = destination.parent() {
            let _ = fs::remove_dir(parent).await;
        }
        Ok(())
    }

    async fn public_uri(&self, asset: &Asset) -> Result<String> {
        Ok(format!(
            "{}/{}/{}",
            self.base_uri,
            asset.content_hash,
            encode_segment(&asset.filename)
        ))
    }

    fn public_static_uri(&self, relative_path: &str) -> String {
        format!(
            "{}/{}",
            self.base_uri,
            relative_path
                .trim_start_matches('/')
                .split('/')
                .map(encode_segment)
                .collect::<Vec<_>>()
                .join("/")
        )
    }
}

fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalAssetStore;
    use tempfile::TempDir;

    async fn fixture(dir: &TempDir) -> (Arc<LocalAssetStore>, FileSystemTarget) {
        let store = Arc::new(LocalAssetStore::new(&dir.path().join("store")).await.unwrap());
        let target = FileSystemTarget::new(
            "web",
            dir.path().join("public"),
            "https://cdn.example.com/res/",
            store.clone(),
        );
        (store, target)
    }

    #[tokio::test]
    async fn test_publish_and_unpublish() {
        let dir = TempDir::new().unwrap();
        let (store, target) = fixture(&dir).await;
        let file = dir.path().join("logo.png");
        std::fs::write(&file, b"png bytes").unwrap();
        let asset = store.import_file(&file, "persistent").await.unwrap();

        target.publish_resource(&asset, "persistent").await.unwrap();
        let published = target.published_path(&asset);
        assert_eq!(std::fs::read(&published).unwrap(), b"png bytes");

        target.unpublish_resource(&asset).await.unwrap();
        assert!(!published.exists());
        target.unpublish_resource(&asset).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_bytes_fail_publish() {
        let dir = TempDir::new().unwrap();
        let (store, target) = fixture(&dir).await;
        let file = dir.path().join("logo.png");
        std::fs::write(&file, b"png bytes").unwrap();
        let asset = store.import_file(&file, "persistent").await.unwrap();
        std::fs::remove_file(store.blob_path(&asset)).unwrap();

        let result = target.publish_resource(&asset, "persistent").await;
        assert!(matches!(result, Err(OptimizeError::Publish(_))));
    }

    #[tokio::test]
    async fn test_uris_are_encoded() {
        let dir = TempDir::new().unwrap();
        let (store, target) = fixture(&dir).await;
        let file = dir.path().join("my logo.png");
        std::fs::write(&file, b"png").unwrap();
        let asset = store.import_file(&file, "persistent").await.unwrap();

        assert_eq!(
            target.public_uri(&asset).await.unwrap(),
            format!("https://cdn.example.com/res/{}/my%20logo.png", asset.content_hash)
        );
        assert_eq!(
            target.public_static_uri("/Packages/Site/main.css"),
            "https://cdn.example.com/res/Packages/Site/main.css"
        );
        assert_eq!(
            target.public_static_uri("Fonts/café & co.woff2"),
            "https://cdn.example.com/res/Fonts/caf%C3%A9%20%26%20co.woff2"
        );
    }
}
