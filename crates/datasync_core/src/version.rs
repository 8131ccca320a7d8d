//! Opaque version tokens.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// An opaque, per-entity version token.
///
/// Versions are compared byte-for-byte. An empty version means "no version"
/// and never satisfies a precondition.
///
/// On the wire a version is the standard base64 encoding of its bytes.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Version(Vec<u8>);

impl Version {
    /// Wraps raw version bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the empty version.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Generates a fresh random version (16 bytes).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().as_bytes().to_vec())
    }

    /// Returns true if the version carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encodes the version as standard base64.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Decodes a version from standard base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64.
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(encoded.trim()).map(Self)
    }

    /// Returns the strong ETag header value for this version.
    ///
    /// Returns `None` for an empty version.
    pub fn to_etag(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(format!("\"{}\"", self.to_base64()))
        }
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.to_base64())
    }
}

impl From<Vec<u8>> for Version {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VersionVisitor;

        impl<'de> Visitor<'de> for VersionVisitor {
            type Value = Version;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a base64 encoded version string or null")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Version, E> {
                Version::from_base64(value).map_err(|e| E::custom(format!("invalid version: {e}")))
            }

            fn visit_none<E: de::Error>(self) -> Result<Version, E> {
                Ok(Version::empty())
            }

            fn visit_unit<E: de::Error>(self) -> Result<Version, E> {
                Ok(Version::empty())
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Version, D::Error> {
                d.deserialize_any(self)
            }
        }

        deserializer.deserialize_option(VersionVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_of_known_bytes() {
        let version = Version::new(vec![0x01, 0x00, 0x42, 0x22, 0x47, 0x8F]);
        assert_eq!(version.to_etag().as_deref(), Some("\"AQBCIkeP\""));
    }

    #[test]
    fn empty_version_has_no_etag() {
        assert_eq!(Version::empty().to_etag(), None);
        assert!(Version::default().is_empty());
    }

    #[test]
    fn generated_versions_differ() {
        let a = Version::generate();
        let b = Version::generate();
        assert_eq!(a.as_bytes().len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn from_base64_rejects_garbage() {
        assert!(Version::from_base64("not base64!").is_err());
    }

    #[test]
    fn json_null_is_empty() {
        let version: Version = serde_json::from_str("null").unwrap();
        assert!(version.is_empty());

        let version: Version = serde_json::from_str("\"AQBCIkeP\"").unwrap();
        assert_eq!(version.as_bytes(), &[0x01, 0x00, 0x42, 0x22, 0x47, 0x8F]);
    }
}
