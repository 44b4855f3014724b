//! Key grammar: hierarchy is encoded in raw keys as runs of `!`.
//!
//! A run of one or more separators is a single boundary, and the empty
//! tokens produced by leading, trailing or doubled separators are dropped.
//! `"!!users!alice!!name!"` therefore has the path `users / alice / name`.

/// Level separator character
pub const SEPARATOR: char = '!';

/// Split a raw key into its path segments.
pub fn segments(key: &str) -> impl Iterator<Item = &str> + '_ {
    key.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// A tokenized raw key: zero or more branch names followed by a leaf name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath<'a> {
    branches: Vec<&'a str>,
    leaf: &'a str,
}

impl<'a> KeyPath<'a> {
    /// Tokenize `key`. Returns `None` when the key has no segments at all
    /// (empty, or made only of separators).
    pub fn parse(key: &'a str) -> Option<Self> {
        let mut branches: Vec<&str> = segments(key).collect();
        let leaf = branches.pop()?;
        Some(KeyPath { branches, leaf })
    }

    pub fn branches(&self) -> &[&'a str] {
        &self.branches
    }

    pub fn leaf(&self) -> &'a str {
        self.leaf
    }

    pub fn depth(&self) -> usize {
        self.branches.len() + 1
    }

    /// True when this path's leading segments are exactly `prefix`.
    pub fn starts_with<S: AsRef<str>>(&self, prefix: &[S]) -> bool {
        if prefix.len() > self.depth() {
            return false;
        }
        self.branches
            .iter()
            .chain(std::iter::once(&self.leaf))
            .zip(prefix)
            .all(|(a, b)| *a == b.as_ref())
    }
}

/// Render a branch name the way the tree output tags it.
pub fn branch_tag(name: &str) -> String {
    format!("{}{}", SEPARATOR, name)
}

/// Build a raw key from segments with single separators.
pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(SEPARATOR);
        }
        key.push_str(part.as_ref());
    }
    key
}
