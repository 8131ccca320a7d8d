//! Entity tags as carried by `If-Match` and `If-None-Match`.

use crate::version::Version;

/// A single entity tag from a conditional header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityTag {
    /// `*`: matches any existing entity.
    Any,
    /// A strong tag (`"..."`), holding the unquoted opaque value.
    Strong(String),
    /// A weak tag (`W/"..."`). Weak tags never match.
    Weak(String),
}

impl EntityTag {
    /// Builds the strong tag for a version.
    pub fn for_version(version: &Version) -> Self {
        EntityTag::Strong(version.to_base64())
    }

    /// Parses a single tag.
    ///
    /// A bare token without quotes is accepted as a strong tag.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if value == "*" {
            return Some(EntityTag::Any);
        }
        if let Some(rest) = value.strip_prefix("W/").or_else(|| value.strip_prefix("w/")) {
            return Some(EntityTag::Weak(unquote(rest).to_string()));
        }
        Some(EntityTag::Strong(unquote(value).to_string()))
    }

    /// Parses a comma-separated header value into tags.
    pub fn parse_list(header: &str) -> Vec<Self> {
        header.split(',').filter_map(EntityTag::parse).collect()
    }

    /// Returns true if this tag is satisfied by an entity with `version`.
    ///
    /// Uses strong comparison: the decoded tag bytes must equal the version
    /// bytes exactly.
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            EntityTag::Any => true,
            EntityTag::Weak(_) => false,
            EntityTag::Strong(opaque) => {
                !version.is_empty()
                    && Version::from_base64(opaque)
                        .map(|tag| tag == *version)
                        .unwrap_or(false)
            }
        }
    }

    /// Returns the version carried by a strong tag.
    pub fn version(&self) -> Option<Version> {
        match self {
            EntityTag::Strong(opaque) => Version::from_base64(opaque).ok(),
            _ => None,
        }
    }

    /// Renders the tag in header form.
    pub fn to_header(&self) -> String {
        match self {
            EntityTag::Any => "*".to_string(),
            EntityTag::Strong(opaque) => format!("\"{opaque}\""),
            EntityTag::Weak(opaque) => format!("W/\"{opaque}\""),
        }
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version() -> Version {
        Version::new(vec![0x01, 0x00, 0x42, 0x22, 0x47, 0x8F])
    }

    #[test]
    fn parse_variants() {
        assert_eq!(EntityTag::parse("*"), Some(EntityTag::Any));
        assert_eq!(
            EntityTag::parse("\"AQBCIkeP\""),
            Some(EntityTag::Strong("AQBCIkeP".into()))
        );
        assert_eq!(
            EntityTag::parse("W/\"AQBCIkeP\""),
            Some(EntityTag::Weak("AQBCIkeP".into()))
        );
        assert_eq!(
            EntityTag::parse("AQBCIkeP"),
            Some(EntityTag::Strong("AQBCIkeP".into()))
        );
        assert_eq!(EntityTag::parse("  "), None);
    }

    #[test]
    fn parse_list_splits_on_commas() {
        let tags = EntityTag::parse_list("\"abc\", W/\"def\", *");
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[2], EntityTag::Any);
    }

    #[test]
    fn strong_tag_matches_same_bytes() {
        assert!(EntityTag::for_version(&version()).matches(&version()));
        assert!(!EntityTag::Strong("AQBCIkeQ".into()).matches(&version()));
    }

    #[test]
    fn weak_tag_never_matches() {
        assert!(!EntityTag::Weak(version().to_base64()).matches(&version()));
    }

    #[test]
    fn star_matches_anything() {
        assert!(EntityTag::Any.matches(&version()));
        assert!(EntityTag::Any.matches(&Version::empty()));
    }

    #[test]
    fn strong_tag_never_matches_empty_version() {
        assert!(!EntityTag::Strong(String::new()).matches(&Version::empty()));
    }

    #[test]
    fn header_form() {
        assert_eq!(EntityTag::for_version(&version()).to_header(), "\"AQBCIkeP\"");
        assert_eq!(EntityTag::Weak("x".into()).to_header(), "W/\"x\"");
    }
}
