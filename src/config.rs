//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione di un'istanza di target ottimizzante.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con la mappa media type → regola di ottimizzazione
//! - Descrive il target reale da decorare (`TargetConfig`)
//! - Fornisce validazione strutturale dei parametri
//! - Supporta caricamento/salvataggio da/verso file JSON
//!
//! ## Parametri di configurazione:
//! - `name`: Nome del target (usato dal registry)
//! - `mediaTypes`: Mappa media type → `{binaryPath, arguments, outfileExtension?}` oppure `null`
//!   (`null` = nessuna ottimizzazione per quel tipo)
//! - `target`: Target reale di pubblicazione (default: filesystem)
//! - `optimizedCollection`: Collection dove vengono importati gli artefatti ottimizzati
//! - `storagePath` / `relationsPath`: Dove vivono asset e relazioni (default: `~/.asset-optimizer`)
//! - `tempDir`: Directory per i file temporanei (default: temp di sistema)
//! - `optimizerTimeoutSecs`: Timeout per singola invocazione (default: 180)
//!
//! ## Validazione:
//! La validazione qui è solo strutturale. Binari e template vengono verificati da
//! `RuleTable::from_config` alla costruzione dell'interceptor, mai durante il publish.
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config::from_file(&path).await?;
//! let interceptor = PublishInterceptor::from_config(&config, assets, repository)?;
//! ```

use crate::error::{OptimizeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Optimizer invocation for one media type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Binary to run, either a bare name looked up in PATH or a path
    pub binary_path: String,
    /// Argument template with `{originalPath}` and `{optimizedPath}`
    #[serde(alias = "argumentsExpression")]
    pub arguments: String,
    /// Overrides the output file extension (e.g. when converting JPEG to WebP)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outfile_extension: Option<String>,
}

impl RuleConfig {
    pub fn new(binary_path: &str, arguments: &str) -> Self {
        Self {
            binary_path: binary_path.to_string(),
            arguments: arguments.to_string(),
            outfile_extension: None,
        }
    }

    pub fn with_outfile_extension(mut self, extension: &str) -> Self {
        self.outfile_extension = Some(extension.to_string());
        self
    }
}

/// The real publishing target wrapped by the interceptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TargetConfig {
    #[serde(rename_all = "camelCase")]
    FileSystem { path: PathBuf, base_uri: String },
}

/// Configuration for one optimizing target instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub name: String,
    pub media_types: BTreeMap<String, Option<RuleConfig>>,
    pub target: TargetConfig,
    pub optimized_collection: String,
    pub storage_path: PathBuf,
    pub relations_path: PathBuf,
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub optimizer_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    180
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".asset-optimizer")
}

impl Default for Config {
    fn default() -> Self {
        let state_dir = default_state_dir();

        let mut media_types = BTreeMap::new();
        media_types.insert(
            "image/png".to_string(),
            Some(RuleConfig::new(
                "optipng",
                "-quiet -o2 -out {optimizedPath} {originalPath}",
            )),
        );
        media_types.insert(
            "image/jpeg".to_string(),
            Some(RuleConfig::new(
                "jpegtran",
                "-copy none -optimize -progressive -outfile {optimizedPath} {originalPath}",
            )),
        );
        media_types.insert(
            "image/webp".to_string(),
            Some(RuleConfig::new(
                "cwebp",
                "-quiet -q 80 {originalPath} -o {optimizedPath}",
            )),
        );
        media_types.insert("image/svg+xml".to_string(), None);

        Self {
            name: "optimized".to_string(),
            media_types,
            target: TargetConfig::FileSystem {
                path: state_dir.join("public"),
                base_uri: "http://localhost/_Resources/Persistent".to_string(),
            },
            optimized_collection: "optimized".to_string(),
            storage_path: state_dir.join("storage"),
            relations_path: state_dir.join("relations.json"),
            temp_dir: None,
            optimizer_timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(OptimizeError::Configuration("Target name must not be empty".to_string()));
        }

        if self.optimized_collection.trim().is_empty() {
            return Err(OptimizeError::Configuration(
                "Optimized collection name must not be empty".to_string(),
            ));
        }

        if self.optimizer_timeout_secs == 0 {
            return Err(OptimizeError::Configuration(
                "Optimizer timeout must be greater than 0".to_string(),
            ));
        }

        match &self.target {
            TargetConfig::FileSystem { base_uri, .. } if base_uri.trim().is_empty() => {
                return Err(OptimizeError::Configuration(
                    "File system target needs a base URI".to_string(),
                ));
            }
            TargetConfig::FileSystem { .. } => {}
        }

        for (media_type, rule) in &self.media_types {
            if let Some(rule) = rule {
                if rule.binary_path.trim().is_empty() {
                    return Err(OptimizeError::Configuration(format!(
                        "Rule for {} has no binaryPath",
                        media_type
                    )));
                }
                if rule.arguments.trim().is_empty() {
                    return Err(OptimizeError::Configuration(format!(
                        "Rule for {} has no arguments",
                        media_type
                    )));
                }
            }
        }

        Ok(())
    }

    /// `~/.asset-optimizer/config.json`
    pub fn default_path() -> PathBuf {
        default_state_dir().join("config.json")
    }

    pub fn optimizer_timeout(&self) -> Duration {
        Duration::from_secs(self.optimizer_timeout_secs)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
