// In-memory namespace tree rebuilt from flat `!`-delimited keys

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::keys::{branch_tag, KeyPath};

/// Nested view of the key space.
///
/// Branches and leaves live in separate maps, so a name can be both a
/// branch (`a!b` exists) and a leaf (`a` exists) without either
/// overwriting the other. Serialized output tags branch names with a
/// leading separator: `{"!a": {"b": "v2"}, "a": "v1"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceTree {
    branches: BTreeMap<String, NamespaceTree>,
    leaves: BTreeMap<String, String>,
}

/// A child of a tree node: the tagged `Branch | Leaf` view over the two
/// maps. `children` yields a name twice when it is both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node<'a> {
    Branch(&'a NamespaceTree),
    Leaf(&'a str),
}

impl NamespaceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `value` at the path encoded by `key`, creating branches on the
    /// way down. Returns false (and changes nothing) for keys with no
    /// segments. A second key resolving to the same path replaces the leaf.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> bool {
        let Some(path) = KeyPath::parse(key) else {
            return false;
        };

        let mut node = self;
        for name in path.branches() {
            node = node.branches.entry((*name).to_string()).or_default();
        }
        node.leaves.insert(path.leaf().to_string(), value.into());
        true
    }

    pub fn branch(&self, name: &str) -> Option<&NamespaceTree> {
        self.branches.get(name)
    }

    pub fn leaf(&self, name: &str) -> Option<&str> {
        self.leaves.get(name).map(String::as_str)
    }

    /// Walk branch names down from this node.
    pub fn subtree(&self, branches: &[&str]) -> Option<&NamespaceTree> {
        branches
            .iter()
            .try_fold(self, |node, name| node.branch(name))
    }

    /// Leaf value at a segment path (last segment is the leaf name).
    pub fn get(&self, path: &[&str]) -> Option<&str> {
        let (leaf, branches) = path.split_last()?;
        self.subtree(branches)?.leaf(leaf)
    }

    /// Leaf value for a raw store key.
    pub fn get_key(&self, key: &str) -> Option<&str> {
        let path = KeyPath::parse(key)?;
        self.subtree(path.branches())?.leaf(path.leaf())
    }

    /// Direct children: branches first, then leaves, each in name order.
    pub fn children(&self) -> impl Iterator<Item = (&str, Node<'_>)> {
        self.branches
            .iter()
            .map(|(name, tree)| (name.as_str(), Node::Branch(tree)))
            .chain(
                self.leaves
                    .iter()
                    .map(|(name, value)| (name.as_str(), Node::Leaf(value.as_str()))),
            )
    }

    /// Number of direct children
    pub fn len(&self) -> usize {
        self.branches.len() + self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.leaves.is_empty()
    }

    /// Number of leaves anywhere below this node
    pub fn leaf_count(&self) -> usize {
        self.leaves.len() + self.branches.values().map(NamespaceTree::leaf_count).sum::<usize>()
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (name, child) in self.children() {
            match child {
                Node::Branch(tree) => map.insert(branch_tag(name), tree.to_json()),
                Node::Leaf(value) => map.insert(name.to_string(), Value::String(value.to_string())),
            };
        }
        Value::Object(map)
    }
}

impl Serialize for NamespaceTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, child) in self.children() {
            match child {
                Node::Branch(tree) => map.serialize_entry(&branch_tag(name), tree)?,
                Node::Leaf(value) => map.serialize_entry(name, value)?,
            }
        }
        map.end()
    }
}
