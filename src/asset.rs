//! # Asset Module
//!
//! Metadati degli asset gestiti dall'asset store.
//!
//! ## Strutture dati:
//! - `Asset`: Un blob memorizzato (originale o artefatto ottimizzato) con hash, nome, media type
//! - `Collection`: Insieme di asset pubblicati insieme
//!
//! ## Identità:
//! - `id`: Identificatore univoco del blob nello store (un artefatto ottimizzato ha il suo)
//! - `content_key()`: Identità di cache (hash contenuto + filename), vedi `ContentKey`

use crate::content_key::ContentKey;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// A stored byte blob with its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    /// Hex SHA-256 of the bytes
    pub content_hash: String,
    pub filename: String,
    pub media_type: String,
    pub size: u64,
    pub collection: String,
}

impl Asset {
    /// Cache identity of this asset when it is an original
    pub fn content_key(&self) -> ContentKey {
        ContentKey::compute(&self.content_hash, &self.filename)
    }
}

/// A named group of assets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    pub name: String,
    pub assets: Vec<Asset>,
}

impl Collection {
    pub fn new(name: &str, assets: Vec<Asset>) -> Self {
        Self {
            name: name.to_string(),
            assets,
        }
    }
}

/// Guess the media type from the filename extension
pub fn media_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("avif") => "image/avif",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}
