//! The paged query response body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of a table query.
///
/// ```json
/// { "items": [ ... ], "count": 248, "nextLink": "/tables/movies?$count=true&$skip=100" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult {
    /// The items on this page, possibly projected by `$select`.
    #[serde(default)]
    pub items: Vec<Value>,
    /// Total number of matching items, present when `$count=true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Link to the next page, absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

impl PagedResult {
    /// Returns true if there is no further page.
    pub fn is_last_page(&self) -> bool {
        self.next_link.is_none()
    }
}
