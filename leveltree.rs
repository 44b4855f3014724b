//! Hierarchical namespace browser and subtree pruner for ordered key-value
//! stores whose keys encode levels with runs of `!` (the sublevel
//! convention: `users!alice!name`).
//!
//! Two engines sit on top of a [`Session`]:
//!
//! - [`reconstruct`] scans the store once and rebuilds a nested
//!   [`NamespaceTree`].
//! - [`prune_subtree`] scans the store once, collects every key under a
//!   prefix, and deletes them only after the scan has finished.
//!
//! [`Router`] maps the JSON-lines command protocol onto sessions cached per
//! storage path, and [`AsyncSession`] runs the same operations from async
//! code.

mod async_wrapper;
mod config;
mod errors;
mod keys;
mod matcher;
mod prune;
mod reconstruct;
mod router;
mod session;
mod store;
mod tree;

pub use async_wrapper::AsyncSession;
pub use config::{Backend, StoreOptions};
pub use errors::{ErrorBuilder, IoContext, LevelTreeError, Result};
pub use keys::{branch_tag, join, segments, KeyPath, SEPARATOR};
pub use matcher::{MatchMode, PrefixMatcher};
pub use prune::{prune_subtree, PrunePlan};
pub use reconstruct::reconstruct;
pub use router::{Reply, Request, Router};
pub use session::Session;
pub use store::{LogStore, MemoryStore, OrderedStore, Scan};
pub use tree::{NamespaceTree, Node};
