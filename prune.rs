// Subtree pruning: scan to completion, then delete
// No delete is issued while the scan that selected the keys is still alive

use tracing::{debug, info};

use crate::errors::{LevelTreeError, Result};
use crate::matcher::{MatchMode, PrefixMatcher};
use crate::session::Session;

/// Keys selected by one full scan, ready to be deleted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    keys: Vec<String>,
}

impl PrunePlan {
    /// Scan the whole store and materialize every key `matcher` accepts.
    pub fn collect(session: &Session, matcher: &PrefixMatcher) -> Result<Self> {
        let mut keys = Vec::new();
        for entry in session.scan()? {
            let (key, _) = entry?;
            if matcher.matches(&key) {
                keys.push(key);
            }
        }

        debug!(mode = %matcher.mode(), matched = keys.len(), "collected prune plan");
        Ok(PrunePlan { keys })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Delete every planned key, returning how many actually existed.
    ///
    /// Stops at the first failed delete; the error carries the number of
    /// deletions already committed, which are not rolled back.
    pub fn apply(self, session: &mut Session) -> Result<usize> {
        let mut deleted = 0usize;
        for key in &self.keys {
            match session.delete(key) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => return Err(e.with_committed(deleted)),
            }
        }
        Ok(deleted)
    }
}

/// Delete every key under `prefix`, returning the number deleted.
///
/// Fails with `StoreUnavailable` before compiling anything when the session
/// is closed, and with `InvalidPattern` before scanning when the prefix
/// cannot be compiled.
pub fn prune_subtree(session: &mut Session, prefix: &str, mode: MatchMode) -> Result<usize> {
    if !session.is_open() {
        return Err(LevelTreeError::StoreUnavailable {
            operation: "delete sublevel",
            path: session.path().map(|p| p.to_path_buf()),
        });
    }

    let matcher = PrefixMatcher::compile(prefix, mode)?;
    let plan = PrunePlan::collect(session, &matcher)?;
    let planned = plan.len();
    let deleted = plan.apply(session)?;

    info!(prefix, %mode, planned, deleted, "pruned sublevel");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn session_with(keys: &[&str]) -> Session {
        let store: MemoryStore = keys.iter().map(|k| (*k, "v")).collect();
        Session::with_store(store)
    }

    #[test]
    fn test_plan_lists_matching_keys_in_order() {
        let session = session_with(&["x!2", "y!1", "x!1", "xy!1"]);
        let matcher = PrefixMatcher::compile("x", MatchMode::Segments).unwrap();

        let plan = PrunePlan::collect(&session, &matcher).unwrap();
        assert_eq!(plan.keys(), &["x!1".to_string(), "x!2".to_string()]);
    }

    #[test]
    fn test_prune_counts_only_existing_keys() {
        let mut session = session_with(&["x!1", "x!2"]);
        let matcher = PrefixMatcher::compile("x", MatchMode::Literal).unwrap();
        let plan = PrunePlan::collect(&session, &matcher).unwrap();

        session.delete("x!2").unwrap();
        assert_eq!(plan.apply(&mut session).unwrap(), 1);
    }

    #[test]
    fn test_invalid_pattern_leaves_store_untouched() {
        let mut session = session_with(&["a!1", "(!1"]);
        let err = prune_subtree(&mut session, "(", MatchMode::Regex).unwrap_err();

        assert!(matches!(err, LevelTreeError::InvalidPattern { .. }));
        assert_eq!(session.get("(!1").unwrap(), Some("v".to_string()));
        assert_eq!(session.get("a!1").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_literal_prefix_with_metacharacters() {
        let mut session = session_with(&["a.b!1", "axb!1"]);
        assert_eq!(prune_subtree(&mut session, "a.b", MatchMode::Literal).unwrap(), 1);
        assert_eq!(session.get("axb!1").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_closed_session_checked_before_pattern() {
        let mut session = session_with(&["a"]);
        session.close().unwrap();

        let err = prune_subtree(&mut session, "(", MatchMode::Regex).unwrap_err();
        assert!(matches!(err, LevelTreeError::StoreUnavailable { .. }));
    }
}
