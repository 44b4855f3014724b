// Async wrapper for store sessions
// Runs every blocking operation on tokio's blocking pool; the session mutex is
// held for the whole operation so scans, prunes and point writes never interleave

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task;

use crate::config::StoreOptions;
use crate::errors::{IoContext, Result};
use crate::matcher::MatchMode;
use crate::prune::prune_subtree;
use crate::reconstruct::reconstruct;
use crate::session::Session;
use crate::tree::NamespaceTree;

/// Cloneable async handle to one session
#[derive(Debug, Clone)]
pub struct AsyncSession {
    inner: Arc<Mutex<Session>>,
}

impl AsyncSession {
    /// Open a session at the given path
    pub async fn open(path: &Path, options: StoreOptions) -> Result<Self> {
        let path_buf: PathBuf = path.to_path_buf();
        let session = task::spawn_blocking(move || Session::open(&path_buf, &options))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
            .io_context("opening database")??;

        Ok(Self::from_session(session))
    }

    pub fn from_session(session: Session) -> Self {
        AsyncSession {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    async fn run<T, F>(&self, context: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session) -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        task::spawn_blocking(move || {
            let mut session = inner.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut session)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        .io_context(context)?
    }

    /// Rebuild the namespace tree asynchronously
    pub async fn reconstruct(&self) -> Result<NamespaceTree> {
        self.run("reconstructing namespace", |session| reconstruct(session)).await
    }

    /// Delete every key under a prefix asynchronously
    pub async fn prune_subtree(&self, prefix: &str, mode: MatchMode) -> Result<usize> {
        let prefix = prefix.to_string();
        self.run("pruning sublevel", move |session| prune_subtree(session, &prefix, mode))
            .await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.run("reading key", move |session| session.get(&key)).await
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.run("writing key", move |session| session.put(&key, &value)).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.run("deleting key", move |session| session.delete(&key)).await
    }

    /// Batch put - multiple writes in a single blocking call
    pub async fn batch_put(&self, entries: Vec<(String, String)>) -> Result<()> {
        self.run("writing batch", move |session| {
            for (key, value) in &entries {
                session.put(key, value)?;
            }
            Ok(())
        })
        .await
    }

    pub async fn close(&self) -> Result<()> {
        self.run("closing database", |session| session.close()).await
    }

    pub async fn is_open(&self) -> bool {
        self.run("checking session", |session| Ok(session.is_open()))
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LevelTreeError;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_async_basic_operations() {
        let dir = tempdir().unwrap();
        let session = AsyncSession::open(dir.path(), StoreOptions::default()).await.unwrap();

        session.put("app!users!alice", "Alice").await.unwrap();
        assert_eq!(session.get("app!users!alice").await.unwrap(), Some("Alice".to_string()));

        assert!(session.delete("app!users!alice").await.unwrap());
        assert_eq!(session.get("app!users!alice").await.unwrap(), None);
        assert_eq!(session.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_async_reconstruct_and_prune() {
        let session = AsyncSession::from_session(Session::in_memory());
        session
            .batch_put(vec![
                ("x!1".to_string(), "a".to_string()),
                ("x!2".to_string(), "b".to_string()),
                ("y!1".to_string(), "c".to_string()),
            ])
            .await
            .unwrap();

        let tree = session.reconstruct().await.unwrap();
        assert_eq!(tree.leaf_count(), 3);

        assert_eq!(session.prune_subtree("x", MatchMode::Literal).await.unwrap(), 2);
        assert_eq!(session.prune_subtree("x", MatchMode::Literal).await.unwrap(), 0);
        assert_eq!(session.get("y!1").await.unwrap(), Some("c".to_string()));
    }

    #[tokio::test]
    async fn test_async_concurrent_writers_and_prunes() {
        let session = AsyncSession::from_session(Session::in_memory());

        let mut handles = vec![];
        for i in 0..8 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..50 {
                    let key = format!("task{}!key{}", i, j);
                    session.put(&key, "v").await.unwrap();
                }
                session.prune_subtree(&format!("task{}!", i), MatchMode::Literal).await.unwrap()
            }));
        }

        let mut pruned = 0;
        for handle in handles {
            pruned += handle.await.unwrap();
        }

        assert_eq!(pruned, 400);
        assert!(session.reconstruct().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_async_close_rejects_later_calls() {
        let session = AsyncSession::from_session(Session::in_memory());
        session.close().await.unwrap();

        assert!(!session.is_open().await);
        let err = session.reconstruct().await.unwrap_err();
        assert!(matches!(err, LevelTreeError::StoreUnavailable { .. }));
    }
}
