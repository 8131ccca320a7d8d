//! The entity shape shared by every table.

use crate::error::{TableError, TableResult};
use crate::version::Version;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Names of the system properties, in wire (camelCase) form.
const SYSTEM_PROPERTIES: [&str; 4] = ["id", "updatedAt", "version", "deleted"];

/// Maximum length of an entity id.
const MAX_ID_LENGTH: usize = 127;

/// A table entity.
///
/// The system properties (`id`, `updatedAt`, `version`, `deleted`) are
/// maintained by repositories. Everything else lives in `properties` and is
/// flattened into the JSON form:
///
/// ```json
/// { "id": "m1", "updatedAt": "2024-01-01T00:00:00.000Z", "version": "AQBCIkeP",
///   "deleted": false, "title": "Inception" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableData {
    /// Globally unique id within the table.
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
    /// Time of the last write, millisecond precision.
    #[serde(default = "epoch", with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Version token regenerated on every write.
    #[serde(default)]
    pub version: Version,
    /// Soft-delete marker.
    #[serde(default, deserialize_with = "nullable")]
    pub deleted: bool,
    /// Non-system properties.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl TableData {
    /// Creates an empty entity with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            updated_at: epoch(),
            version: Version::empty(),
            deleted: false,
            properties: Map::new(),
        }
    }

    /// Generates a fresh entity id.
    pub fn new_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Sets a property, builder style.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Returns a property by exact name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Converts a typed model into an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the model does not serialize to a JSON object or
    /// its system properties are malformed.
    pub fn from_typed<T: Serialize>(model: &T) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::to_value(model)?)
    }

    /// Converts the entity into a typed model.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not fit the model.
    pub fn to_typed<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.to_value()?)
    }

    /// Parses an entity from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns a `400 Bad Request` error if the value is not an object or a
    /// system property is malformed.
    pub fn from_value(value: Value) -> TableResult<Self> {
        if !value.is_object() {
            return Err(TableError::bad_request("entity must be a JSON object"));
        }
        serde_json::from_value(value).map_err(|e| TableError::bad_request(e.to_string()))
    }

    /// Converts the entity into its JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if a property cannot be represented as JSON.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Returns the strong ETag header value, if the entity has a version.
    pub fn etag(&self) -> Option<String> {
        self.version.to_etag()
    }

    /// Returns the `Last-Modified` header value.
    pub fn last_modified(&self) -> String {
        crate::conditional::format_http_date(&self.updated_at)
    }

    /// Stamps a new `updated_at` and `version` for a write.
    ///
    /// `updated_at` never moves backwards relative to `previous`, so two
    /// writes within the same millisecond still order correctly.
    pub fn stamp(&mut self, previous: Option<&DateTime<Utc>>) {
        let now = Utc::now().trunc_subsecs(3);
        self.updated_at = match previous {
            Some(prev) if *prev >= now => *prev + Duration::milliseconds(1),
            _ => now,
        };
        self.version = Version::generate();
    }
}

/// Returns true if `name` is a system property (case-insensitive).
pub fn is_system_property(name: &str) -> bool {
    SYSTEM_PROPERTIES
        .iter()
        .any(|system| system.eq_ignore_ascii_case(name))
}

/// Validates an entity id.
///
/// Ids start with an ASCII letter or digit, continue with letters, digits or
/// any of `_ . | : -`, and are at most 127 characters long.
///
/// # Errors
///
/// Returns a `400 Bad Request` error for an invalid id.
pub fn validate_id(id: &str) -> TableResult<()> {
    let mut chars = id.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {
            id.len() <= MAX_ID_LENGTH
                && chars.all(|c| c.is_ascii_alphanumeric() || "_.|:-".contains(c))
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(TableError::bad_request(format!("invalid entity id '{id}'")))
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH)
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// RFC 3339 timestamps with millisecond precision.
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(super::epoch()),
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| de::Error::custom(format!("invalid updatedAt '{raw}': {e}"))),
        }
    }
}
