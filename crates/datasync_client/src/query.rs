//! Client-side OData query builder.

use chrono::{DateTime, SecondsFormat, Utc};

/// System query options for a table query.
///
/// ```
/// use datasync_client::Query;
///
/// let query = Query::new().filter("year gt 2000").order_by("title").top(10).count(true);
/// assert_eq!(query.to_query_string(), "%24filter=year+gt+2000&%24orderby=title&%24top=10&%24count=true");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    filter: Option<String>,
    orderby: Vec<String>,
    select: Vec<String>,
    skip: Option<usize>,
    top: Option<usize>,
    count: bool,
    include_deleted: bool,
}

impl Query {
    /// Creates an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `$filter`, joining with any existing filter using `and`.
    #[must_use]
    pub fn filter(mut self, expression: impl Into<String>) -> Self {
        let expression = expression.into();
        self.filter = Some(match self.filter {
            Some(existing) => format!("({existing}) and ({expression})"),
            None => expression,
        });
        self
    }

    /// Appends an ascending `$orderby` clause.
    #[must_use]
    pub fn order_by(mut self, property: &str) -> Self {
        self.orderby.push(property.to_string());
        self
    }

    /// Appends a descending `$orderby` clause.
    #[must_use]
    pub fn order_by_desc(mut self, property: &str) -> Self {
        self.orderby.push(format!("{property} desc"));
        self
    }

    /// Sets `$select`.
    #[must_use]
    pub fn select(mut self, properties: &[&str]) -> Self {
        self.select = properties.iter().map(|p| (*p).to_string()).collect();
        self
    }

    /// Sets `$skip`.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets `$top`.
    #[must_use]
    pub fn top(mut self, top: usize) -> Self {
        self.top = Some(top);
        self
    }

    /// Sets `$count`.
    #[must_use]
    pub fn count(mut self, count: bool) -> Self {
        self.count = count;
        self
    }

    /// Includes soft-deleted entities.
    #[must_use]
    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    /// The incremental pull query: everything changed after `since`,
    /// oldest first, tombstones included.
    pub fn changed_since(since: Option<DateTime<Utc>>) -> Self {
        let query = Self::new()
            .order_by("updatedAt")
            .order_by("id")
            .include_deleted(true);
        match since {
            Some(since) => query.filter(format!(
                "updatedAt gt datetimeoffset'{}'",
                since.to_rfc3339_opts(SecondsFormat::Millis, true)
            )),
            None => query,
        }
    }

    /// Renders the form-encoded query string, without a leading `?`.
    pub fn to_query_string(&self) -> String {
        let mut out = url::form_urlencoded::Serializer::new(String::new());
        if let Some(filter) = &self.filter {
            out.append_pair("$filter", filter);
        }
        if !self.orderby.is_empty() {
            out.append_pair("$orderby", &self.orderby.join(","));
        }
        if !self.select.is_empty() {
            out.append_pair("$select", &self.select.join(","));
        }
        if let Some(skip) = self.skip {
            out.append_pair("$skip", &skip.to_string());
        }
        if let Some(top) = self.top {
            out.append_pair("$top", &top.to_string());
        }
        if self.count {
            out.append_pair("$count", "true");
        }
        if self.include_deleted {
            out.append_pair("__includedeleted", "true");
        }
        out.finish()
    }
}
