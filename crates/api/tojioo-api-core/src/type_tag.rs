//! Type tags label the logical payload kind of a socket or bus entry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Host type label such as `IMAGE` or `MASK`, or the `*` wildcard.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TypeTag {
    #[default]
    Wildcard,
    Named(String),
}

impl TypeTag {
    pub const WILDCARD: &'static str = "*";

    pub fn named(name: impl Into<String>) -> Self {
        TypeTag::from(name.into())
    }

    #[inline]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, TypeTag::Wildcard)
    }

    pub fn as_str(&self) -> &str {
        match self {
            TypeTag::Wildcard => Self::WILDCARD,
            TypeTag::Named(name) => name,
        }
    }

    /// Wildcards match anything in either direction; concrete tags match by equality.
    pub fn matches(&self, other: &TypeTag) -> bool {
        match (self, other) {
            (TypeTag::Wildcard, _) | (_, TypeTag::Wildcard) => true,
            (TypeTag::Named(a), TypeTag::Named(b)) => a == b,
        }
    }
}

impl From<String> for TypeTag {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == Self::WILDCARD {
            TypeTag::Wildcard
        } else if trimmed.len() == raw.len() {
            TypeTag::Named(raw)
        } else {
            TypeTag::Named(trimmed.to_string())
        }
    }
}

impl From<&str> for TypeTag {
    fn from(raw: &str) -> Self {
        TypeTag::from(raw.to_string())
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        match tag {
            TypeTag::Wildcard => TypeTag::WILDCARD.to_string(),
            TypeTag::Named(name) => name,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_in_both_directions() {
        let image = TypeTag::named("IMAGE");
        assert!(TypeTag::Wildcard.matches(&image));
        assert!(image.matches(&TypeTag::Wildcard));
        assert!(!image.matches(&TypeTag::named("MASK")));
    }

    #[test]
    fn star_and_blank_parse_as_wildcard() {
        assert_eq!(TypeTag::from("*"), TypeTag::Wildcard);
        assert_eq!(TypeTag::from(""), TypeTag::Wildcard);
        assert_eq!(TypeTag::from(" IMAGE "), TypeTag::named("IMAGE"));
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&TypeTag::named("MASK")).expect("serialize");
        assert_eq!(json, "\"MASK\"");
        let back: TypeTag = serde_json::from_str("\"*\"").expect("deserialize");
        assert!(back.is_wildcard());
    }
}
