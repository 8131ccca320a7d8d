//! Access control hooks for tables.
//!
//! A provider decides, per caller, which entities are visible (the data
//! view), whether an operation is allowed, and may adjust entities before
//! they are stored.

use crate::entity::TableData;
use crate::error::TableResult;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The operation being performed on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableOperation {
    /// POST a new entity.
    Create,
    /// GET one entity.
    Read,
    /// PUT or PATCH an entity.
    Update,
    /// DELETE an entity.
    Delete,
    /// GET a page of entities.
    Query,
}

impl fmt::Display for TableOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableOperation::Create => "create",
            TableOperation::Read => "read",
            TableOperation::Update => "update",
            TableOperation::Delete => "delete",
            TableOperation::Query => "query",
        };
        f.write_str(name)
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// User id from a validated token. `None` for anonymous callers.
    pub user_id: Option<String>,
}

impl Identity {
    /// An anonymous caller.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated user.
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
        }
    }

    /// Returns true if the caller is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// A predicate limiting which entities a caller can see.
#[derive(Clone)]
pub struct DataView(Arc<dyn Fn(&TableData) -> bool + Send + Sync>);

impl DataView {
    /// Wraps a predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&TableData) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Returns true if the entity is visible.
    pub fn contains(&self, entity: &TableData) -> bool {
        (self.0)(entity)
    }
}

impl fmt::Debug for DataView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataView(..)")
    }
}

/// Per-table access control.
///
/// Every method has a permissive default, so providers only override what
/// they restrict.
pub trait AccessControlProvider: Send + Sync {
    /// Returns the view of the table visible to `identity`.
    ///
    /// Entities outside the view behave as if they did not exist.
    fn data_view(&self, _identity: &Identity) -> Option<DataView> {
        None
    }

    /// Returns true if `identity` may perform `operation`.
    ///
    /// `entity` is the stored entity for reads, updates and deletes, the
    /// incoming entity for creates, and `None` for queries.
    fn is_authorized(
        &self,
        _operation: TableOperation,
        _identity: &Identity,
        _entity: Option<&TableData>,
    ) -> bool {
        true
    }

    /// Runs before an entity is written; may modify it.
    ///
    /// # Errors
    ///
    /// An error aborts the write and is returned to the caller.
    fn pre_commit_hook(
        &self,
        _operation: TableOperation,
        _entity: &mut TableData,
        _identity: &Identity,
    ) -> TableResult<()> {
        Ok(())
    }

    /// Runs after a write has been stored.
    fn post_commit_hook(&self, _operation: TableOperation, _entity: &TableData, _identity: &Identity) {}
}

/// Provider that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessControlProvider for AllowAll {}

/// Personal tables: each user only sees and writes their own entities.
///
/// The owner is recorded in a property (by default `userId`), stamped on
/// every write. Anonymous callers are rejected.
#[derive(Debug, Clone)]
pub struct OwnerAccessControl {
    field: String,
}

impl OwnerAccessControl {
    /// Creates a provider recording the owner in `userId`.
    pub fn new() -> Self {
        Self::with_field("userId")
    }

    /// Creates a provider recording the owner in `field`.
    pub fn with_field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Returns the owner property name.
    pub fn field(&self) -> &str {
        &self.field
    }

    fn owned_by(&self, entity: &TableData, user: &str) -> bool {
        matches!(entity.property(&self.field), Some(Value::String(owner)) if owner == user)
    }
}

impl Default for OwnerAccessControl {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessControlProvider for OwnerAccessControl {
    fn data_view(&self, identity: &Identity) -> Option<DataView> {
        let field = self.field.clone();
        let user = identity.user_id.clone();
        Some(DataView::new(move |entity| match (&user, entity.property(&field)) {
            (Some(user), Some(Value::String(owner))) => owner == user,
            _ => false,
        }))
    }

    fn is_authorized(
        &self,
        operation: TableOperation,
        identity: &Identity,
        entity: Option<&TableData>,
    ) -> bool {
        let Some(user) = identity.user_id.as_deref() else {
            return false;
        };
        match (operation, entity) {
            (TableOperation::Create | TableOperation::Query, _) => true,
            (_, Some(entity)) => self.owned_by(entity, user),
            (_, None) => false,
        }
    }

    fn pre_commit_hook(
        &self,
        _operation: TableOperation,
        entity: &mut TableData,
        identity: &Identity,
    ) -> TableResult<()> {
        if let Some(user) = &identity.user_id {
            entity
                .properties
                .insert(self.field.clone(), Value::String(user.clone()));
        }
        Ok(())
    }
}
