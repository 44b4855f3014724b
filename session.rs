//! Store sessions: the open/closed lifecycle around an [`OrderedStore`].
//!
//! Every operation checks that the session is open before touching the
//! backend, so a closed session fails with `StoreUnavailable` and performs
//! no I/O.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{Backend, StoreOptions};
use crate::errors::{ErrorBuilder, IoContext, LevelTreeError, Result};
use crate::store::{LogStore, MemoryStore, OrderedStore};

pub struct Session {
    path: Option<PathBuf>,
    store: Option<Box<dyn OrderedStore>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Session {
    /// Open the database at `path` with the backend named in `options`.
    pub fn open(path: impl AsRef<Path>, options: &StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        let store: Box<dyn OrderedStore> = match options.backend {
            Backend::Log => Box::new(LogStore::open(path, options).map_err(|source| {
                LevelTreeError::Open {
                    path: path.to_path_buf(),
                    source,
                }
            })?),
            Backend::Memory => Box::new(MemoryStore::new()),
        };

        debug!(path = %path.display(), backend = ?options.backend, "session opened");
        Ok(Session {
            path: Some(path.to_path_buf()),
            store: Some(store),
        })
    }

    /// Wrap an already-open backend.
    pub fn with_store(store: impl OrderedStore + 'static) -> Self {
        Session {
            path: None,
            store: Some(Box::new(store)),
        }
    }

    pub fn in_memory() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    /// Release the backend. Closing a session twice fails the second time.
    pub fn close(&mut self) -> Result<()> {
        let mut store = self.store.take().ok_or_else(|| self.unavailable("close database"))?;
        store.close().io_context("closing database")?;
        debug!(path = ?self.path, "session closed");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.store("get key")?
            .get(key)
            .map_err(|e| ErrorBuilder::point_failure("get", key, e).build())
    }

    pub fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.store_mut("put key")?
            .put(key, value)
            .map_err(|e| ErrorBuilder::point_failure("put", key, e).build())
    }

    /// Delete `key`, reporting whether it existed.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        self.store_mut("delete key")?
            .delete(key)
            .map_err(|e| ErrorBuilder::point_failure("delete", key, e).build())
    }

    /// Ascending full-range scan. Iteration failures surface as `Scan`.
    pub fn scan(&self) -> Result<impl Iterator<Item = Result<(String, String)>> + '_> {
        let store = self.store("scan database")?;
        Ok(store
            .scan()
            .map(|entry| entry.map_err(|source| LevelTreeError::Scan { source })))
    }

    fn store(&self, operation: &'static str) -> Result<&dyn OrderedStore> {
        match &self.store {
            Some(store) => Ok(&**store),
            None => Err(self.unavailable(operation)),
        }
    }

    fn store_mut(&mut self, operation: &'static str) -> Result<&mut (dyn OrderedStore + 'static)> {
        match self.store.as_deref_mut() {
            Some(store) => Ok(store),
            None => Err(LevelTreeError::StoreUnavailable {
                operation,
                path: self.path.clone(),
            }),
        }
    }

    fn unavailable(&self, operation: &'static str) -> LevelTreeError {
        LevelTreeError::StoreUnavailable {
            operation,
            path: self.path.clone(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(mut store) = self.store.take() {
            let _ = store.close();
        }
    }
}
