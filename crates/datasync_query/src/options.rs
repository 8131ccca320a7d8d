//! Query string options and paged execution.

use crate::ast::{Expr, OrderBy};
use crate::error::{QueryError, QueryResult};
use crate::eval::{evaluate, sort_order, Operand};
use crate::parser::{parse_filter, parse_orderby};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Query parameter that includes soft-deleted entities.
pub const INCLUDE_DELETED: &str = "__includedeleted";

/// Parsed OData query options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// `$filter`
    pub filter: Option<Expr>,
    /// `$orderby`
    pub orderby: Vec<OrderBy>,
    /// `$select`, as given.
    pub select: Option<Vec<String>>,
    /// `$skip`
    pub skip: usize,
    /// `$top`
    pub top: Option<usize>,
    /// `$count`
    pub count: bool,
    /// `__includedeleted`
    pub include_deleted: bool,
    /// The raw query string, kept for building `nextLink`.
    raw: String,
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    /// The (projected) items.
    pub items: Vec<Value>,
    /// Number of items matching the filter, before paging.
    pub total: usize,
}

impl QueryOptions {
    /// Parses a raw (still percent-encoded) query string.
    ///
    /// Parameters that are not system query options are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed expressions, non-numeric or negative
    /// `$skip`/`$top`, invalid `$count`, or unsupported options.
    pub fn parse(raw: &str) -> QueryResult<Self> {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        let mut options = QueryOptions {
            raw: raw.to_string(),
            ..Default::default()
        };

        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let value = value.trim();
            match key.as_ref() {
                "$filter" => options.filter = Some(parse_filter(value)?),
                "$orderby" => options.orderby = parse_orderby(value)?,
                "$select" => options.select = Some(parse_select(value)?),
                "$skip" => options.skip = parse_count("$skip", value)?,
                "$top" => options.top = Some(parse_count("$top", value)?),
                "$count" => {
                    options.count = parse_bool(value)
                        .ok_or_else(|| QueryError::invalid("$count", "expected true or false"))?;
                }
                key if key.eq_ignore_ascii_case(INCLUDE_DELETED) => {
                    options.include_deleted = value.eq_ignore_ascii_case("true");
                }
                key if key.starts_with('$') => {
                    return Err(QueryError::Unsupported(key.to_string()));
                }
                _ => {}
            }
        }
        Ok(options)
    }

    /// Returns true if `item` satisfies `$filter`.
    pub fn matches(&self, item: &Value) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| evaluate(filter, item).is_true())
    }

    /// Filters, orders, pages and projects `items`.
    ///
    /// Ordering always ends with `id` ascending so that paging is stable.
    /// At most `min($top, page_size)` items are returned.
    pub fn execute(&self, items: Vec<Value>, page_size: usize) -> QueryPage {
        let mut matching: Vec<Value> = items.into_iter().filter(|item| self.matches(item)).collect();
        let total = matching.len();

        if self.orderby.is_empty() {
            matching.sort_by(by_id);
        } else {
            let mut keyed: Vec<(Vec<Operand>, Value)> = matching
                .into_iter()
                .map(|item| {
                    let keys: Vec<Operand> =
                        self.orderby.iter().map(|o| evaluate(&o.expr, &item)).collect();
                    (keys, item)
                })
                .collect();
            keyed.sort_by(|(ka, a), (kb, b)| {
                for (clause, (x, y)) in self.orderby.iter().zip(ka.iter().zip(kb)) {
                    let ord = sort_order(x, y);
                    let ord = if clause.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                by_id(a, b)
            });
            matching = keyed.into_iter().map(|(_, item)| item).collect();
        }

        let take = self.top.map_or(page_size, |top| top.min(page_size));
        let items = matching
            .into_iter()
            .skip(self.skip)
            .take(take)
            .map(|item| self.project(item))
            .collect();
        QueryPage { items, total }
    }

    /// Applies `$select` to one item.
    pub fn project(&self, item: Value) -> Value {
        let (Some(select), Value::Object(map)) = (&self.select, &item) else {
            return item;
        };
        let projected: Map<String, Value> = map
            .iter()
            .filter(|(key, _)| select.iter().any(|s| s.eq_ignore_ascii_case(key)))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Value::Object(projected)
    }

    /// Builds the query string of the next page, or `None` on the last page.
    ///
    /// `returned` is the number of items in the current page and `total` the
    /// number of matching items.
    pub fn next_link_query(&self, returned: usize, total: usize) -> Option<String> {
        let skip = self.skip + returned;
        if skip >= total || returned == 0 {
            return None;
        }
        let top = match self.top {
            Some(top) if top <= returned => return None,
            Some(top) => Some(top - returned),
            None => None,
        };

        let mut parts: Vec<String> = self
            .raw
            .split('&')
            .filter(|part| !part.is_empty())
            .filter(|part| {
                let key = part.split('=').next().unwrap_or_default();
                let key = decode(key);
                key != "$skip" && key != "$top"
            })
            .map(str::to_string)
            .collect();
        parts.push(format!("$skip={skip}"));
        if let Some(top) = top {
            parts.push(format!("$top={top}"));
        }
        Some(parts.join("&"))
    }
}

/// Returns true if a raw query string asks for soft-deleted entities.
///
/// Unlike [`QueryOptions::parse`] this never fails, so it can be used on
/// single-entity requests that carry no other options.
pub fn include_deleted(raw: &str) -> bool {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    url::form_urlencoded::parse(raw.as_bytes()).any(|(key, value)| {
        key.eq_ignore_ascii_case(INCLUDE_DELETED) && value.trim().eq_ignore_ascii_case("true")
    })
}

fn by_id(a: &Value, b: &Value) -> Ordering {
    let id = |v: &Value| v.get("id").and_then(Value::as_str).map(str::to_string);
    id(a).cmp(&id(b))
}

fn decode(component: &str) -> String {
    url::form_urlencoded::parse(component.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

fn parse_select(value: &str) -> QueryResult<Vec<String>> {
    let fields: Vec<String> = value
        .split(',')
        .map(|field| field.trim().to_string())
        .collect();
    if fields.iter().any(|field| {
        field.is_empty() || !field.chars().all(|c| c.is_alphanumeric() || c == '_')
    }) {
        return Err(QueryError::invalid("$select", format!("invalid field list '{value}'")));
    }
    Ok(fields)
}

fn parse_count(option: &str, value: &str) -> QueryResult<usize> {
    value
        .parse::<usize>()
        .map_err(|_| QueryError::invalid(option, format!("'{value}' is not a non-negative integer")))
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
