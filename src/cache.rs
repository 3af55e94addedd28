//! cache
//!
//! File-backed persistence cache: one JSON document per run context, whole
//! document replaced on save.
//!
//! # Concurrency
//!
//! The in-memory buffer and file handle are the only state in this crate
//! touched from more than one logical path (the main path loads, the exit
//! path saves), so every post-init operation takes the one internal mutex.
//!
//! # Lifecycle
//!
//! `init` opens (creating if absent) and reads the whole file; `load`
//! decodes the bytes read at init time, reporting "never written" as
//! `Ok(None)` rather than an error; `save` truncates, writes the new
//! encoding at offset 0, syncs to stable storage, and closes the handle.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{persistence_io, Error, Result};

#[derive(Debug, Default)]
struct Inner {
    data: Option<Vec<u8>>,
    file: Option<fs::File>,
    path: Option<PathBuf>,
}

/// Whole-document, file-backed store of a run's carried-over state.
#[derive(Debug, Default)]
pub struct Cache {
    inner: Mutex<Inner>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Open the cache file, creating it (and its parent directories) if
    /// absent, and read its current contents into memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] on any I/O failure.
    pub fn init(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| persistence_io(&parent.to_path_buf(), "cannot create", e))?;
            }
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| persistence_io(&path.to_path_buf(), "cannot open", e))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| persistence_io(&path.to_path_buf(), "cannot read", e))?;

        let mut inner = self.lock();
        inner.data = if bytes.is_empty() { None } else { Some(bytes) };
        inner.file = Some(file);
        inner.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Decode the document read at init time.
    ///
    /// Returns `Ok(None)` when the file was empty or never written; the
    /// caller's state is left untouched in that case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] when bytes exist but do not decode.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let inner = self.lock();
        let bytes = match &inner.data {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let value = serde_json::from_slice(bytes).map_err(|e| {
            Error::Persistence(format!("cannot decode cached document: {}", e))
        })?;
        Ok(Some(value))
    }

    /// Replace the document: truncate, write the new encoding at offset 0,
    /// sync to stable storage, and close the handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] when called before [`Cache::init`] or
    /// on any encode/I/O failure.
    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        let mut inner = self.lock();
        let path = inner
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("<uninitialized>"));
        let mut file = inner
            .file
            .take()
            .ok_or_else(|| Error::Persistence("cache must be initialized first".to_string()))?;

        let encoded = serde_json::to_vec(value)
            .map_err(|e| Error::Persistence(format!("cannot encode document: {}", e)))?;

        file.set_len(0)
            .map_err(|e| persistence_io(&path, "cannot truncate", e))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| persistence_io(&path, "cannot seek", e))?;
        file.write_all(&encoded)
            .map_err(|e| persistence_io(&path, "cannot write", e))?;
        file.sync_all()
            .map_err(|e| persistence_io(&path, "cannot sync", e))?;
        drop(file); // closes the handle

        inner.data = Some(encoded);
        Ok(())
    }

    /// Close the file handle without saving. Idempotent.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.file = None;
    }

    /// True once `init` has run and the handle is still open.
    pub fn is_open(&self) -> bool {
        self.lock().file.is_some()
    }
}

/// Cache file name for a subcommand: `data.json` for the default, otherwise
/// `data_<name>.json`.
pub(crate) fn cache_file_name(subcommand: &str) -> String {
    if subcommand == crate::registry::DEFAULT_NAME {
        "data.json".to_string()
    } else {
        format!("data_{}.json", subcommand)
    }
}
