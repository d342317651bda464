//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore della libreria.
//!
//! ## Categorie di errori:
//! - **Ottimizzatore** (recuperabili): `OptimizationFailed`, `OptimizerTimeout`, `OptimizerSpawn`.
//!   Il publish prosegue con l'asset originale.
//! - **Storage** (fatali per la unit of work): `StorageCommitFailed`, `Io`, `Serialization`.
//! - **Configurazione** (fatali all'avvio): `Configuration`, `MissingDependency`.
//! - `DuplicateKey`: chiave o artefatto già presenti, conflitto atteso in caso di race tra processi.
//!
//! ## Esempio:
//! ```rust,ignore
//! match runner.run(stream, "logo.png", "image/png", rule, "optimized").await {
//!     Ok(result) => stage(result),
//!     Err(e) if e.is_recoverable() => warn!("using original: {}", e),
//!     Err(e) => return Err(e),
//! }
//! ```

use crate::content_key::ContentKey;
use std::time::Duration;

pub type Result<T, E = OptimizeError> = std::result::Result<T, E>;

/// Custom error types for publish-time optimization
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Optimization not successful for command: {command}\nExit status code: {}\nOutput:\n{output}", format_exit_code(.exit_code))]
    OptimizationFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Optimizer timed out after {timeout:?}: {command}")]
    OptimizerTimeout { command: String, timeout: Duration },

    #[error("Optimizer could not be started: {command}: {source}")]
    OptimizerSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage commit failed: {0}")]
    StorageCommitFailed(String),

    #[error("Relation already exists for key {0}")]
    DuplicateKey(ContentKey),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Publishing error: {0}")]
    Publish(String),
}

impl OptimizeError {
    /// Errors raised by the external optimizer itself. Everything else is an
    /// infrastructure failure and must reach the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OptimizeError::OptimizationFailed { .. }
                | OptimizeError::OptimizerTimeout { .. }
                | OptimizeError::OptimizerSpawn { .. }
        )
    }
}

fn format_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "terminated by signal".to_string(),
    }
}
