//! # Local Asset Store
//!
//! Storage su filesystem per asset originali e artefatti ottimizzati.
//!
//! ## Layout su disco:
//! ```text
//! <root>/index.json              indice id → Asset
//! <root>/index.json.lock         lock esclusivo fra processi
//! <root>/<collection>/<id>       bytes dell'asset
//! ```
//!
//! ## Strategia di persistence:
//! - Indice caricato in memoria all'apertura
//! - Ogni modifica prende il lock, rilegge l'indice su disco (altri processi possono
//!   averlo aggiornato), applica la modifica e lo riscrive con un rename atomico
//! - `import_file` deduplica per (collection, hash, filename), `import_artifact` no:
//!   ogni artefatto ottimizzato appartiene ad una sola relazione

use super::{AssetStore, AssetStream};
use crate::asset::{media_type_for, Asset, Collection};
use crate::error::{OptimizeError, Result};
use crate::file_lock::{read_json_or_default, write_json_atomically, FileLock};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

const INDEX_FILENAME: &str = "index.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct AssetIndex {
    assets: HashMap<String, Asset>,
}

enum IndexChange {
    Insert(Asset),
    Remove(Uuid),
}

/// Filesystem-backed asset store
pub struct LocalAssetStore {
    root: PathBuf,
    index: RwLock<AssetIndex>,
}

impl LocalAssetStore {
    /// Open (or create) a store rooted at `root`
    pub async fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).await?;

        let index_path = root.join(INDEX_FILENAME);
        let index = if index_path.exists() {
            let content = fs::read_to_string(&index_path).await?;
            serde_json::from_str(&content)?
        } else {
            AssetIndex::default()
        };

        Ok(Self {
            root: root.to_path_buf(),
            index: RwLock::new(index),
        })
    }

    /// Import a file under its own name, reusing an identical asset of the same collection
    pub async fn import_file(&self, path: &Path, collection: &str) -> Result<Asset> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| {
                OptimizeError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("not a file path: {}", path.display()),
                ))
            })?;

        let content_hash = hash_file(path).await?;
        if let Some(existing) = self.find(collection, &content_hash, &filename).await {
            debug!("Reusing stored asset {} for {}", existing.id, path.display());
            return Ok(existing);
        }

        self.store(path, collection, &filename, content_hash).await
    }

    /// Find an asset by collection, content hash and filename
    pub async fn find(&self, collection: &str, content_hash: &str, filename: &str) -> Option<Asset> {
        self.index
            .read()
            .await
            .assets
            .values()
            .find(|asset| {
                asset.collection == collection
                    && asset.content_hash == content_hash
                    && asset.filename == filename
            })
            .cloned()
    }

    pub fn blob_path(&self, asset: &Asset) -> PathBuf {
        self.root.join(&asset.collection).join(asset.id.to_string())
    }

    async fn store(
        &self,
        path: &Path,
        collection: &str,
        filename: &str,
        content_hash: String,
    ) -> Result<Asset> {
        check_collection_name(collection)?;

        let size = fs::metadata(path).await?.len();
        let asset = Asset {
            id: Uuid::new_v4(),
            content_hash,
            filename: filename.to_string(),
            media_type: media_type_for(filename).to_string(),
            size,
            collection: collection.to_string(),
        };

        let blob = self.blob_path(&asset);
        if let Some(parent) = blob.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(path, &blob).await?;

        if let Err(e) = self.update_index(IndexChange::Insert(asset.clone())).await {
            let _ = fs::remove_file(&blob).await;
            return Err(e);
        }

        debug!("Stored {} as {} in collection {}", filename, asset.id, collection);
        Ok(asset)
    }

    /// Apply `change` to the index on disk under the cross-process lock and
    /// refresh the in-memory copy. Returns false when nothing had to change.
    async fn update_index(&self, change: IndexChange) -> Result<bool> {
        let mut index = self.index.write().await;
        let index_path = self.root.join(INDEX_FILENAME);

        let (fresh, changed) = tokio::task::spawn_blocking(move || -> Result<(AssetIndex, bool)> {
            let _lock = FileLock::acquire(&index_path)?;
            let mut fresh: AssetIndex = read_json_or_default(&index_path)?;
            let changed = match change {
                IndexChange::Insert(asset) => {
                    fresh.assets.insert(asset.id.to_string(), asset);
                    true
                }
                IndexChange::Remove(id) => fresh.assets.remove(&id.to_string()).is_some(),
            };
            if changed {
                write_json_atomically(&index_path, &fresh)?;
            }
            Ok((fresh, changed))
        })
        .await
        .map_err(|e| OptimizeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))??;

        *index = fresh;
        Ok(changed)
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn open(&self, asset: &Asset) -> Result<Option<AssetStream>> {
        match fs::File::open(self.blob_path(asset)).await {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn import_artifact(&self, path: &Path, collection: &str, filename: &str) -> Result<Asset> {
        let content_hash = hash_file(path).await?;
        self.store(path, collection, filename, content_hash).await
    }

    async fn remove(&self, asset: &Asset) -> Result<()> {
        self.update_index(IndexChange::Remove(asset.id)).await?;

        match fs::remove_file(self.blob_path(asset)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Asset>> {
        Ok(self.index.read().await.assets.get(&id.to_string()).cloned())
    }

    async fn collection(&self, name: &str) -> Result<Collection> {
        let mut assets: Vec<Asset> = self
            .index
            .read()
            .await
            .assets
            .values()
            .filter(|asset| asset.collection == name)
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.filename.cmp(&b.filename).then(a.id.cmp(&b.id)));
        Ok(Collection::new(name, assets))
    }
}

/// Hex SHA-256 of a file's bytes
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn check_collection_name(collection: &str) -> Result<()> {
    let valid = !collection.is_empty()
        && collection != "."
        && collection != ".."
        && !collection.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(OptimizeError::Configuration(format!(
            "invalid collection name \"{}\"",
            collection
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn read_all(store: &LocalAssetStore, asset: &Asset) -> Vec<u8> {
        let mut stream = store.open(asset).await.unwrap().expect("stream");
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await.unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_import_records_hash_and_size() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("logo.png");
        std::fs::write(&file, b"not really a png").unwrap();

        let store = LocalAssetStore::new(&dir.path().join("store")).await.unwrap();
        let asset = store.import_file(&file, "persistent").await.unwrap();

        assert_eq!(asset.filename, "logo.png");
        assert_eq!(asset.media_type, "image/png");
        assert_eq!(asset.size, 16);
        assert_eq!(asset.content_hash, hex::encode(Sha256::digest(b"not really a png")));
        assert_eq!(read_all(&store, &asset).await, b"not really a png");
    }

    #[tokio::test]
    async fn test_import_file_deduplicates_but_artifacts_do_not() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"same").unwrap();
        let store = LocalAssetStore::new(&dir.path().join("store")).await.unwrap();

        let first = store.import_file(&file, "persistent").await.unwrap();
        let second = store.import_file(&file, "persistent").await.unwrap();
        assert_eq!(first.id, second.id);

        let a = store.import_artifact(&file, "optimized", "a.png").await.unwrap();
        let b = store.import_artifact(&file, "optimized", "a.png").await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.collection("optimized").await.unwrap().assets.len(), 2);
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.jpg");
        std::fs::write(&file, b"jpeg").unwrap();
        let root = dir.path().join("store");

        let id = {
            let store = LocalAssetStore::new(&root).await.unwrap();
            store.import_file(&file, "persistent").await.unwrap().id
        };

        let reopened = LocalAssetStore::new(&root).await.unwrap();
        let asset = reopened.get(&id).await.unwrap().expect("asset after reopen");
        assert_eq!(asset.filename, "a.jpg");
        assert_eq!(read_all(&reopened, &asset).await, b"jpeg");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"bytes").unwrap();
        let store = LocalAssetStore::new(&dir.path().join("store")).await.unwrap();
        let asset = store.import_file(&file, "persistent").await.unwrap();

        store.remove(&asset).await.unwrap();
        store.remove(&asset).await.unwrap();

        assert!(store.get(&asset.id).await.unwrap().is_none());
        assert!(store.open(&asset).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_like_collection() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"bytes").unwrap();
        let store = LocalAssetStore::new(&dir.path().join("store")).await.unwrap();

        assert!(store.import_file(&file, "../escape").await.is_err());
    }

    #[tokio::test]
    async fn test_stores_on_one_root_merge_their_index_entries() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");
        let worker_a = LocalAssetStore::new(&root).await.unwrap();
        let worker_b = LocalAssetStore::new(&root).await.unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"bytes").unwrap();

        let first = worker_a.import_artifact(&file, "optimized", "a.png").await.unwrap();
        let second = worker_b.import_artifact(&file, "optimized", "a.png").await.unwrap();
        // worker_b picked up worker_a's entry while it held the lock
        assert!(worker_b.get(&first.id).await.unwrap().is_some());

        worker_b.remove(&second).await.unwrap();
        let reopened = LocalAssetStore::new(&root).await.unwrap();
        assert!(reopened.get(&first.id).await.unwrap().is_some());
        assert!(reopened.get(&second.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_imports_keep_every_index_entry() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");
        let workers = [
            Arc::new(LocalAssetStore::new(&root).await.unwrap()),
            Arc::new(LocalAssetStore::new(&root).await.unwrap()),
        ];

        let mut handles = Vec::new();
        for i in 0..30usize {
            let file = dir.path().join(format!("asset-{}.png", i));
            std::fs::write(&file, format!("bytes {}", i)).unwrap();
            let store = workers[i % 2].clone();
            handles.push(tokio::spawn(async move {
                store.import_artifact(&file, "optimized", "asset.png").await.unwrap().id
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        let reopened = LocalAssetStore::new(&root).await.unwrap();
        for id in &ids {
            assert!(reopened.get(id).await.unwrap().is_some());
        }
        assert_eq!(reopened.collection("optimized").await.unwrap().assets.len(), 30);
    }
}
