//! # Optimizer Runner
//!
//! Esegue il tool esterno su una copia temporanea dell'asset e importa il risultato migliore.
//!
//! ## Pipeline:
//! 1. **Directory temporanea**: una `TempDir` con nome casuale per ogni invocazione,
//!    quindi due run concorrenti sullo stesso host non collidono mai
//! 2. **Materializzazione**: lo stream viene copiato in `original.<ext>`
//! 3. **Output path**: `optimized.<ext>` con l'estensione della regola, altrimenti quella originale
//! 4. **Processo**: `<binary> <argomenti renderizzati>` con timeout, stdout e stderr catturati
//! 5. **Verifica**: l'assenza del file di output è il segnale di fallimento, non l'exit code
//! 6. **Selezione**: viene importato il file più piccolo (a parità vince l'originale)
//! 7. **Cleanup**: la `TempDir` viene rimossa su ogni percorso di uscita
//!
//! ## Errori:
//! - `OptimizerSpawn`: il binario non può essere avviato
//! - `OptimizerTimeout`: il processo supera il timeout e viene terminato (`kill_on_drop`)
//! - `OptimizationFailed`: nessun file di output; porta comando, exit code e output catturato
//! - Tutto il resto (I/O sui file temporanei, import nello store) non è recuperabile

use crate::asset::Asset;
use crate::error::{OptimizeError, Result};
use crate::rule::OptimizerRule;
use crate::storage::{AssetStore, AssetStream};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Outcome of one optimizer invocation
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Imported artifact, named like the original
    pub artifact: Asset,
    pub original_size: u64,
    pub optimized_size: u64,
    /// True when the tool's output was not smaller and the original bytes were imported
    pub kept_original: bool,
}

impl OptimizationResult {
    pub fn bytes_saved(&self) -> u64 {
        self.original_size.saturating_sub(self.artifact.size)
    }
}

pub struct OptimizerRunner {
    assets: Arc<dyn AssetStore>,
    temp_dir: PathBuf,
    timeout: Duration,
}

impl OptimizerRunner {
    pub fn new(assets: Arc<dyn AssetStore>, temp_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            assets,
            temp_dir,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Optimize the bytes in `stream` and import the smaller of input and output
    /// into `collection` under `filename`.
    pub async fn run(
        &self,
        mut stream: AssetStream,
        filename: &str,
        media_type: &str,
        rule: &OptimizerRule,
        collection: &str,
    ) -> Result<OptimizationResult> {
        fs::create_dir_all(&self.temp_dir).await?;
        let workdir = tempfile::Builder::new()
            .prefix("optimizer-")
            .tempdir_in(&self.temp_dir)?;

        let extension = extension_of(filename);
        let original_path = workdir.path().join(with_extension("original", extension.as_deref()));
        let optimized_path = workdir
            .path()
            .join(with_extension("optimized", rule.output_extension().or(extension.as_deref())));

        let mut original = fs::File::create(&original_path).await?;
        let original_size = tokio::io::copy(&mut stream, &mut original).await?;
        original.flush().await?;
        drop(original);

        debug!(
            "Optimizing {} ({}, {} bytes) with {}",
            filename,
            media_type,
            original_size,
            rule.binary().display()
        );
        let optimized_size = self.execute(rule, &original_path, &optimized_path).await?;

        let kept_original = original_size <= optimized_size;
        let best = if kept_original { &original_path } else { &optimized_path };
        if kept_original {
            debug!(
                "Optimizer output for {} is not smaller ({} >= {} bytes), keeping original bytes",
                filename, optimized_size, original_size
            );
        }

        let artifact = self.assets.import_artifact(best, collection, filename).await?;

        if let Err(e) = workdir.close() {
            warn!("Could not remove optimizer temp dir: {}", e);
        }

        Ok(OptimizationResult {
            artifact,
            original_size,
            optimized_size,
            kept_original,
        })
    }

    /// Run the external tool, returning the size of the file it produced
    async fn execute(&self, rule: &OptimizerRule, original: &Path, optimized: &Path) -> Result<u64> {
        let prepared = rule.command(original, optimized);
        let command_line = prepared.to_string();
        debug!("Running optimizer: {}", command_line);

        let mut command = Command::new(&prepared.program);
        command
            .args(&prepared.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let start_time = Instant::now();
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                return Err(OptimizeError::OptimizerTimeout {
                    command: command_line,
                    timeout: self.timeout,
                });
            }
            Ok(Err(source)) => {
                return Err(OptimizeError::OptimizerSpawn {
                    command: command_line,
                    source,
                });
            }
            Ok(Ok(output)) => output,
        };
        debug!("Optimizer finished in {:?} with {}", start_time.elapsed(), output.status);

        let produced = match fs::metadata(optimized).await {
            Ok(metadata) if metadata.is_file() => Some(metadata.len()),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        match produced {
            Some(size) => {
                if !output.status.success() {
                    warn!(
                        "Optimizer exited with {} but produced output, using it: {}",
                        output.status, command_line
                    );
                }
                Ok(size)
            }
            None => Err(OptimizeError::OptimizationFailed {
                command: command_line,
                exit_code: output.status.code(),
                output: combined_output(&output.stdout, &output.stderr),
            }),
        }
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_string())
        .filter(|ext| !ext.is_empty())
}

fn with_extension(stem: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem.to_string(),
    }
}

fn combined_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let parts: Vec<&str> = [stdout.trim_end(), stderr.trim_end()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect();
    parts.join("\n")
}
