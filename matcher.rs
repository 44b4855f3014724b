// Prefix matching for subtree pruning
// Caller text is compiled once into an anchored rule, then tested against every scanned key

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorBuilder, Result};
use crate::keys::{segments, KeyPath};

/// How a prune prefix is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Raw key starts with the prefix text, metacharacters included
    #[default]
    Literal,
    /// Key's leading path segments equal the prefix's segments
    Segments,
    /// Prefix is a regular expression anchored at the start of the key
    Regex,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchMode::Literal => "literal",
            MatchMode::Segments => "segments",
            MatchMode::Regex => "regex",
        };
        f.write_str(name)
    }
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "literal" => Ok(MatchMode::Literal),
            "segments" => Ok(MatchMode::Segments),
            "regex" => Ok(MatchMode::Regex),
            other => Err(format!("unknown match mode '{}'", other)),
        }
    }
}

/// A compiled prefix rule
#[derive(Debug, Clone)]
pub enum PrefixMatcher {
    Literal(String),
    Segments(Vec<String>),
    Regex(Regex),
}

impl PrefixMatcher {
    /// Compile `prefix` under `mode`. Fails with `InvalidPattern` when the
    /// prefix would match every key or the regex engine rejects it.
    pub fn compile(prefix: &str, mode: MatchMode) -> Result<Self> {
        match mode {
            MatchMode::Literal => {
                if prefix.is_empty() {
                    return Err(ErrorBuilder::invalid_pattern(prefix)
                        .reason("empty prefix would match every key")
                        .build());
                }
                Ok(PrefixMatcher::Literal(prefix.to_string()))
            }

            MatchMode::Segments => {
                let parts: Vec<String> = segments(prefix).map(str::to_string).collect();
                if parts.is_empty() {
                    return Err(ErrorBuilder::invalid_pattern(prefix)
                        .reason("prefix has no path segments")
                        .build());
                }
                Ok(PrefixMatcher::Segments(parts))
            }

            MatchMode::Regex => {
                if prefix.is_empty() {
                    return Err(ErrorBuilder::invalid_pattern(prefix)
                        .reason("empty prefix would match every key")
                        .build());
                }
                let anchored = format!("^(?:{})", prefix);
                Regex::new(&anchored)
                    .map(PrefixMatcher::Regex)
                    .map_err(|e| ErrorBuilder::invalid_pattern(prefix).reason(e.to_string()).build())
            }
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            PrefixMatcher::Literal(prefix) => key.starts_with(prefix.as_str()),
            PrefixMatcher::Segments(parts) => {
                KeyPath::parse(key).map_or(false, |path| path.starts_with(parts.as_slice()))
            }
            PrefixMatcher::Regex(re) => re.is_match(key),
        }
    }

    pub fn mode(&self) -> MatchMode {
        match self {
            PrefixMatcher::Literal(_) => MatchMode::Literal,
            PrefixMatcher::Segments(_) => MatchMode::Segments,
            PrefixMatcher::Regex(_) => MatchMode::Regex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LevelTreeError;

    #[test]
    fn test_literal_is_raw_prefix() {
        let m = PrefixMatcher::compile("x", MatchMode::Literal).unwrap();
        assert!(m.matches("x!1"));
        assert!(m.matches("x"));
        assert!(m.matches("xylophone"));
        assert!(!m.matches("y!1"));
        assert!(!m.matches("!x!1"));
    }

    #[test]
    fn test_literal_ignores_metacharacters() {
        let m = PrefixMatcher::compile("a.b", MatchMode::Literal).unwrap();
        assert!(m.matches("a.b!c"));
        assert!(!m.matches("axb!c"));

        let m = PrefixMatcher::compile("(", MatchMode::Literal).unwrap();
        assert!(m.matches("(paren"));
    }

    #[test]
    fn test_segments_respects_boundaries() {
        let m = PrefixMatcher::compile("x", MatchMode::Segments).unwrap();
        assert!(m.matches("x!1"));
        assert!(m.matches("!!x!!2"));
        assert!(m.matches("x"));
        assert!(!m.matches("xy!1"));

        let m = PrefixMatcher::compile("!app!!users!", MatchMode::Segments).unwrap();
        assert!(m.matches("app!users!alice"));
        assert!(!m.matches("app!usersx!alice"));
        assert!(!m.matches("app"));
    }

    #[test]
    fn test_regex_is_anchored() {
        let m = PrefixMatcher::compile("user[0-9]+!", MatchMode::Regex).unwrap();
        assert!(m.matches("user42!name"));
        assert!(!m.matches("olduser42!name"));

        let alt = PrefixMatcher::compile("a|b", MatchMode::Regex).unwrap();
        assert!(alt.matches("b!1"));
        assert!(!alt.matches("cb!1"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = PrefixMatcher::compile("(unclosed", MatchMode::Regex).unwrap_err();
        assert!(matches!(err, LevelTreeError::InvalidPattern { .. }));
    }

    #[test]
    fn test_empty_prefix_rejected_in_every_mode() {
        for mode in [MatchMode::Literal, MatchMode::Segments, MatchMode::Regex] {
            let err = PrefixMatcher::compile("", mode).unwrap_err();
            assert!(matches!(err, LevelTreeError::InvalidPattern { .. }), "mode {}", mode);
        }
        assert!(PrefixMatcher::compile("!!!", MatchMode::Segments).is_err());
    }

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!("segments".parse::<MatchMode>().unwrap(), MatchMode::Segments);
        assert!("glob".parse::<MatchMode>().is_err());
        assert_eq!(MatchMode::default().to_string(), "literal");
        let m = PrefixMatcher::compile("a", MatchMode::Regex).unwrap();
        assert_eq!(m.mode(), MatchMode::Regex);
    }
}
