// Request router: external commands mapped onto sessions, one session per path
// Speaks a JSON-lines protocol: one request object in, one reply object out

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::StoreOptions;
use crate::errors::{LevelTreeError, Result};
use crate::matcher::MatchMode;
use crate::prune::prune_subtree;
use crate::reconstruct::reconstruct;
use crate::session::Session;
use crate::tree::NamespaceTree;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Request {
    OpenDb {
        path: PathBuf,
        #[serde(default)]
        options: Option<StoreOptions>,
    },
    ParseDb {
        path: PathBuf,
    },
    GetKey {
        path: PathBuf,
        key: String,
    },
    PutKey {
        path: PathBuf,
        key: String,
        value: String,
    },
    DeleteKey {
        path: PathBuf,
        key: String,
    },
    DeleteSublevel {
        path: PathBuf,
        prefix: String,
        #[serde(default)]
        mode: MatchMode,
    },
    CloseDb {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    fn success(result: Value) -> Self {
        Reply { ok: true, result: Some(result), error: None }
    }

    fn failure(error: &LevelTreeError) -> Self {
        Reply { ok: false, result: None, error: Some(error.to_string()) }
    }
}

/// Holds the open sessions, keyed by storage path
#[derive(Debug, Default)]
pub struct Router {
    sessions: HashMap<PathBuf, Session>,
    options: StoreOptions,
}

impl Router {
    pub fn new(options: StoreOptions) -> Self {
        Router {
            sessions: HashMap::new(),
            options,
        }
    }

    /// Open `path` unless a session for it already exists.
    pub fn open_db(&mut self, path: &Path, options: Option<&StoreOptions>) -> Result<()> {
        if self.sessions.contains_key(path) {
            debug!(path = %path.display(), "database already open");
            return Ok(());
        }
        let session = Session::open(path, options.unwrap_or(&self.options))?;
        self.sessions.insert(path.to_path_buf(), session);
        info!(path = %path.display(), "database opened");
        Ok(())
    }

    pub fn parse_db(&self, path: &Path) -> Result<NamespaceTree> {
        reconstruct(self.session(path, "parse database")?)
    }

    pub fn get_key(&self, path: &Path, key: &str) -> Result<Option<String>> {
        self.session(path, "get key")?.get(key)
    }

    pub fn put_key(&mut self, path: &Path, key: &str, value: &str) -> Result<()> {
        self.session_mut(path, "put key")?.put(key, value)
    }

    pub fn delete_key(&mut self, path: &Path, key: &str) -> Result<bool> {
        self.session_mut(path, "delete key")?.delete(key)
    }

    pub fn delete_sublevel(&mut self, path: &Path, prefix: &str, mode: MatchMode) -> Result<usize> {
        prune_subtree(self.session_mut(path, "delete sublevel")?, prefix, mode)
    }

    /// Close and forget the session for `path`.
    pub fn close_db(&mut self, path: &Path) -> Result<()> {
        let mut session = self
            .sessions
            .remove(path)
            .ok_or_else(|| LevelTreeError::unavailable("close database").at_path(path))?;
        session.close()?;
        info!(path = %path.display(), "database closed");
        Ok(())
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.sessions.contains_key(path)
    }

    /// Close every session, returning the first failure.
    pub fn close_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for (path, mut session) in self.sessions.drain() {
            if let Err(e) = session.close() {
                warn!(path = %path.display(), error = %e, "failed to close database");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn handle(&mut self, request: Request) -> Result<Value> {
        match request {
            Request::OpenDb { path, options } => {
                self.open_db(&path, options.as_ref())?;
                Ok(Value::Bool(true))
            }
            Request::ParseDb { path } => Ok(self.parse_db(&path)?.to_json()),
            Request::GetKey { path, key } => {
                Ok(self.get_key(&path, &key)?.map_or(Value::Null, Value::String))
            }
            Request::PutKey { path, key, value } => {
                self.put_key(&path, &key, &value)?;
                Ok(Value::Bool(true))
            }
            Request::DeleteKey { path, key } => Ok(Value::Bool(self.delete_key(&path, &key)?)),
            Request::DeleteSublevel { path, prefix, mode } => {
                Ok(Value::from(self.delete_sublevel(&path, &prefix, mode)?))
            }
            Request::CloseDb { path } => {
                self.close_db(&path)?;
                Ok(Value::Bool(true))
            }
        }
    }

    /// Handle one protocol line. Malformed input becomes an error reply.
    pub fn handle_line(&mut self, line: &str) -> Reply {
        let outcome = serde_json::from_str::<Request>(line)
            .map_err(|e| LevelTreeError::InvalidRequest { reason: e.to_string() })
            .and_then(|request| self.handle(request));

        match outcome {
            Ok(result) => Reply::success(result),
            Err(e) => {
                debug!(error = %e, "request failed");
                Reply::failure(&e)
            }
        }
    }

    fn session(&self, path: &Path, operation: &'static str) -> Result<&Session> {
        self.sessions
            .get(path)
            .ok_or_else(|| LevelTreeError::unavailable(operation).at_path(path))
    }

    fn session_mut(&mut self, path: &Path, operation: &'static str) -> Result<&mut Session> {
        self.sessions
            .get_mut(path)
            .ok_or_else(|| LevelTreeError::unavailable(operation).at_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn line(router: &mut Router, request: Value) -> Reply {
        router.handle_line(&request.to_string())
    }

    #[test]
    fn test_protocol_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let p = path.to_str().unwrap();
        let mut router = Router::default();

        assert!(line(&mut router, json!({"command": "open-db", "path": p})).ok);
        assert!(line(&mut router, json!({"command": "put-key", "path": p, "key": "sub!k1", "value": "v1"})).ok);
        assert!(line(&mut router, json!({"command": "put-key", "path": p, "key": "top", "value": "t"})).ok);

        let tree = line(&mut router, json!({"command": "parse-db", "path": p}));
        assert_eq!(tree.result, Some(json!({"!sub": {"k1": "v1"}, "top": "t"})));

        let got = line(&mut router, json!({"command": "get-key", "path": p, "key": "top"}));
        assert_eq!(got.result, Some(json!("t")));

        let pruned = line(&mut router, json!({"command": "delete-sublevel", "path": p, "prefix": "sub"}));
        assert_eq!(pruned.result, Some(json!(1)));

        let missing = line(&mut router, json!({"command": "get-key", "path": p, "key": "sub!k1"}));
        assert_eq!(missing.result, Some(Value::Null));

        assert!(line(&mut router, json!({"command": "close-db", "path": p})).ok);
        assert!(!router.is_open(&path));
    }

    #[test]
    fn test_open_is_idempotent_per_path() {
        let dir = tempdir().unwrap();
        let mut router = Router::default();

        router.open_db(dir.path(), None).unwrap();
        router.put_key(dir.path(), "k", "v").unwrap();
        router.open_db(dir.path(), None).unwrap();

        assert_eq!(router.get_key(dir.path(), "k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_unopened_path_is_unavailable() {
        let mut router = Router::new(StoreOptions::memory());
        let err = router.delete_sublevel(Path::new("nowhere"), "x", MatchMode::Literal).unwrap_err();
        assert!(matches!(err, LevelTreeError::StoreUnavailable { path: Some(_), .. }));

        let reply = line(&mut router, json!({"command": "parse-db", "path": "nowhere"}));
        assert!(!reply.ok);
        assert!(reply.error.unwrap().contains("nowhere"));
    }

    #[test]
    fn test_malformed_lines_become_error_replies() {
        let mut router = Router::new(StoreOptions::memory());

        let reply = router.handle_line("not json");
        assert!(!reply.ok);
        assert!(reply.error.unwrap().starts_with("Invalid request"));

        let reply = line(&mut router, json!({"command": "launch-rockets"}));
        assert!(!reply.ok);
    }

    #[test]
    fn test_open_with_per_request_options() {
        let mut router = Router::default();
        let reply = line(
            &mut router,
            json!({"command": "open-db", "path": "scratch", "options": {"backend": "memory"}}),
        );
        assert!(reply.ok);
        router.put_key(Path::new("scratch"), "a!b", "1").unwrap();

        let reply = line(
            &mut router,
            json!({"command": "delete-sublevel", "path": "scratch", "prefix": "a", "mode": "segments"}),
        );
        assert_eq!(reply.result, Some(json!(1)));
        router.close_all().unwrap();
        assert!(!router.is_open(Path::new("scratch")));
    }

    #[test]
    fn test_reply_serialization_omits_empty_fields() {
        let ok = serde_json::to_value(Reply::success(json!(3))).unwrap();
        assert_eq!(ok, json!({"ok": true, "result": 3}));
    }
}
