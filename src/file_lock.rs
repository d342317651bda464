//! # Shared JSON Files
//!
//! I file JSON condivisi fra processi (relazioni, indice degli asset) vengono
//! riscritti sempre con lo stesso schema:
//!
//! 1. lock esclusivo sul file sidecar `<file>.lock`
//! 2. rilettura del file (un altro processo può averlo appena aggiornato)
//! 3. modifica della copia e scrittura su un `NamedTempFile` nella stessa directory
//! 4. rename atomico sul file originale, poi rilascio del lock
//!
//! Le funzioni qui sono bloccanti: i chiamanti async le eseguono in `spawn_blocking`.

use crate::error::{OptimizeError, Result};
use fs4::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Exclusive cross-process lock on `<file>.lock`, released when dropped
pub(crate) struct FileLock {
    _file: File,
}

impl FileLock {
    /// Block until the lock guarding `path` is held
    pub(crate) fn acquire(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(lock_path(path))?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Parse `path`, or return the default value when it does not exist yet
pub(crate) fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Replace `path` with `value` through a unique temp file and an atomic rename
pub(crate) fn write_json_atomically<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| OptimizeError::Io(e.error))?;
    Ok(())
}
