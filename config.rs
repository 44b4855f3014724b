// Options for opening a store session

use serde::{Deserialize, Serialize};

/// Which `OrderedStore` implementation a session opens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Append-only log in a directory, replayed on open
    #[default]
    Log,
    /// Ephemeral in-memory map; the path is only used as a name
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Create the database directory if it does not exist
    pub create_if_missing: bool,
    /// Refuse to open a database that already has data
    pub error_if_exists: bool,
    /// fsync the log after every write
    pub sync_writes: bool,
    pub backend: Backend,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            create_if_missing: true,
            error_if_exists: false,
            sync_writes: false,
            backend: Backend::Log,
        }
    }
}

impl StoreOptions {
    pub fn memory() -> Self {
        StoreOptions {
            backend: Backend::Memory,
            ..Self::default()
        }
    }

    pub fn create_if_missing(mut self, yes: bool) -> Self {
        self.create_if_missing = yes;
        self
    }

    pub fn error_if_exists(mut self, yes: bool) -> Self {
        self.error_if_exists = yes;
        self
    }

    pub fn sync_writes(mut self, yes: bool) -> Self {
        self.sync_writes = yes;
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = StoreOptions::default();
        assert!(opts.create_if_missing);
        assert!(!opts.error_if_exists);
        assert!(!opts.sync_writes);
        assert_eq!(opts.backend, Backend::Log);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let opts: StoreOptions = serde_json::from_str(r#"{"sync_writes": true, "backend": "memory"}"#).unwrap();
        assert!(opts.sync_writes);
        assert!(opts.create_if_missing);
        assert_eq!(opts.backend, Backend::Memory);
    }
}
