//! HTTP conditional request evaluation.
//!
//! The four conditional headers are evaluated against the stored entity
//! before any read or write:
//!
//! | Header | Fails when | Read result | Write result |
//! |--------|-----------|-------------|--------------|
//! | `If-Match` | entity absent or no strong match | 412 | 412 |
//! | `If-Unmodified-Since` | entity absent or modified after the date | 412 | 412 |
//! | `If-None-Match` | entity present and a tag matches | 304 | 412 |
//! | `If-Modified-Since` | entity absent, or not modified since the date | 304 / 412 | 412 |
//!
//! `If-Unmodified-Since` is only consulted without `If-Match`, and
//! `If-Modified-Since` only without `If-None-Match`.

use crate::entity::TableData;
use crate::error::{TableError, TableResult};
use crate::etag::EntityTag;
use crate::version::Version;
use chrono::{DateTime, SubsecRound, Utc};
use tracing::debug;

/// The conditional headers of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preconditions {
    /// Parsed `If-Match` tags.
    pub if_match: Option<Vec<EntityTag>>,
    /// Parsed `If-None-Match` tags.
    pub if_none_match: Option<Vec<EntityTag>>,
    /// Parsed `If-Modified-Since` date.
    pub if_modified_since: Option<DateTime<Utc>>,
    /// Parsed `If-Unmodified-Since` date.
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

impl Preconditions {
    /// Creates an empty set of preconditions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds preconditions from raw header values.
    ///
    /// Dates that do not parse are ignored.
    pub fn from_headers(
        if_match: Option<&str>,
        if_none_match: Option<&str>,
        if_modified_since: Option<&str>,
        if_unmodified_since: Option<&str>,
    ) -> Self {
        Self {
            if_match: if_match.map(EntityTag::parse_list),
            if_none_match: if_none_match.map(EntityTag::parse_list),
            if_modified_since: if_modified_since.and_then(parse_http_date),
            if_unmodified_since: if_unmodified_since.and_then(parse_http_date),
        }
    }

    /// Sets `If-Match` from a header value.
    #[must_use]
    pub fn with_if_match(mut self, header: &str) -> Self {
        self.if_match = Some(EntityTag::parse_list(header));
        self
    }

    /// Sets `If-None-Match` from a header value.
    #[must_use]
    pub fn with_if_none_match(mut self, header: &str) -> Self {
        self.if_none_match = Some(EntityTag::parse_list(header));
        self
    }

    /// Sets `If-Modified-Since`.
    #[must_use]
    pub fn with_if_modified_since(mut self, date: DateTime<Utc>) -> Self {
        self.if_modified_since = Some(date);
        self
    }

    /// Sets `If-Unmodified-Since`.
    #[must_use]
    pub fn with_if_unmodified_since(mut self, date: DateTime<Utc>) -> Self {
        self.if_unmodified_since = Some(date);
        self
    }

    /// Returns true if no conditional header is present.
    pub fn is_empty(&self) -> bool {
        self.if_match.is_none()
            && self.if_none_match.is_none()
            && self.if_modified_since.is_none()
            && self.if_unmodified_since.is_none()
    }

    /// Evaluates the preconditions against the stored entity.
    ///
    /// `read_only` is true for GET and HEAD. On success returns the version
    /// the write must be conditioned on, or `None` for no version check.
    ///
    /// # Errors
    ///
    /// - `304 Not Modified` for reads whose cached copy is current
    /// - `412 Precondition Failed`, with the stored entity when there is one
    pub fn evaluate(
        &self,
        read_only: bool,
        entity: Option<&TableData>,
    ) -> TableResult<Option<Version>> {
        let mut version = None;

        if let Some(tags) = &self.if_match {
            let current = entity.ok_or(TableError::PreconditionFailed(None))?;
            match tags.iter().find(|tag| tag.matches(&current.version)) {
                Some(EntityTag::Any) => {}
                Some(_) => version = Some(current.version.clone()),
                None => {
                    debug!(id = %current.id, "If-Match did not match");
                    return Err(TableError::precondition_failed(current.clone()));
                }
            }
        } else if let Some(since) = self.if_unmodified_since {
            let current = entity.ok_or(TableError::PreconditionFailed(None))?;
            if current.updated_at.trunc_subsecs(0) > since {
                debug!(id = %current.id, "modified after If-Unmodified-Since");
                return Err(TableError::precondition_failed(current.clone()));
            }
        }

        if let Some(tags) = &self.if_none_match {
            if let Some(current) = entity {
                if tags.iter().any(|tag| tag.matches(&current.version)) {
                    return Err(unchanged(read_only, current));
                }
            }
        } else if let Some(since) = self.if_modified_since {
            let current = entity.ok_or(TableError::PreconditionFailed(None))?;
            if current.updated_at.trunc_subsecs(0) <= since {
                return Err(unchanged(read_only, current));
            }
        }

        Ok(version)
    }
}

fn unchanged(read_only: bool, current: &TableData) -> TableError {
    if read_only {
        TableError::not_modified(current.clone())
    } else {
        TableError::precondition_failed(current.clone())
    }
}

/// Formats a timestamp as an RFC 1123 HTTP date.
pub fn format_http_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parses an RFC 1123 HTTP date.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}
