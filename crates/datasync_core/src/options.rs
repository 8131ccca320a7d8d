//! Per-table options.

use crate::error::{TableError, TableResult};

/// Default number of items in one page of query results.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default largest `$top` a client may request.
pub const DEFAULT_MAX_TOP: usize = 128_000;

/// Options controlling a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    /// Maximum number of items returned per page.
    pub page_size: usize,
    /// Largest `$top` value accepted.
    pub max_top: usize,
    /// Whether deletes mark the entity instead of removing it.
    pub enable_soft_delete: bool,
    /// Status code returned when access control rejects a request.
    pub unauthorized_status: u16,
}

impl TableOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_top: DEFAULT_MAX_TOP,
            enable_soft_delete: false,
            unauthorized_status: 401,
        }
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the maximum `$top`.
    #[must_use]
    pub fn with_max_top(mut self, max_top: usize) -> Self {
        self.max_top = max_top;
        self
    }

    /// Enables or disables soft delete.
    #[must_use]
    pub fn with_soft_delete(mut self, enabled: bool) -> Self {
        self.enable_soft_delete = enabled;
        self
    }

    /// Sets the status reported for unauthorized requests.
    #[must_use]
    pub fn with_unauthorized_status(mut self, status: u16) -> Self {
        self.unauthorized_status = status;
        self
    }

    /// Checks that the options are consistent.
    ///
    /// # Errors
    ///
    /// Returns an error if the page size is zero or above `max_top`, or the
    /// unauthorized status is not a 4xx code.
    pub fn validate(&self) -> TableResult<()> {
        if self.page_size == 0 || self.page_size > self.max_top {
            return Err(TableError::bad_request(format!(
                "page size {} must be between 1 and {}",
                self.page_size, self.max_top
            )));
        }
        if !(400..500).contains(&self.unauthorized_status) {
            return Err(TableError::bad_request(format!(
                "unauthorized status {} is not a client error",
                self.unauthorized_status
            )));
        }
        Ok(())
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self::new()
    }
}
