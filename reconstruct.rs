// Namespace reconstruction: one ascending scan into a fresh tree

use tracing::debug;

use crate::errors::Result;
use crate::session::Session;
use crate::tree::NamespaceTree;

/// Rebuild the hierarchical view of every key in the session.
///
/// Keys with no segments (empty or only separators) are skipped. The tree
/// is built fresh on each call and owned by the caller.
pub fn reconstruct(session: &Session) -> Result<NamespaceTree> {
    let mut tree = NamespaceTree::new();
    let mut scanned = 0usize;
    let mut skipped = 0usize;

    for entry in session.scan()? {
        let (key, value) = entry?;
        scanned += 1;
        if !tree.insert(&key, value) {
            skipped += 1;
        }
    }

    debug!(scanned, skipped, leaves = tree.leaf_count(), "reconstructed namespace");
    Ok(tree)
}
