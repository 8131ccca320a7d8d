//! The table controller: the conditional-request and soft-delete rules
//! layered over a repository.
//!
//! The controller is independent of any HTTP framework. The HTTP layer
//! extracts a [`RequestContext`] and a JSON body and maps the returned
//! [`TableError`]s onto responses.

use datasync_core::{
    apply_merge_patch, validate_id, AccessControlProvider, AllowAll, ChangeFeed, DataView,
    Identity, PagedResult, Preconditions, TableData, TableError, TableOperation, TableOptions,
    TableResult,
};
use datasync_query::QueryOptions;
use datasync_storage::Repository;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Path prefix under which tables are served.
pub const TABLES_PREFIX: &str = "/tables";

/// Per-request inputs the controller needs besides the body.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Who is calling.
    pub identity: Identity,
    /// Conditional request headers.
    pub preconditions: Preconditions,
    /// Whether `__includedeleted=true` was given.
    pub include_deleted: bool,
}

impl RequestContext {
    /// Creates an anonymous context with no preconditions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the caller.
    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the preconditions.
    #[must_use]
    pub fn with_preconditions(mut self, preconditions: Preconditions) -> Self {
        self.preconditions = preconditions;
        self
    }

    /// Sets whether soft-deleted entities are visible.
    #[must_use]
    pub fn with_include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }
}

/// Serves one table.
pub struct TableController {
    name: String,
    repository: Arc<dyn Repository>,
    options: TableOptions,
    access: Arc<dyn AccessControlProvider>,
    feed: Option<Arc<ChangeFeed>>,
}

impl TableController {
    /// Creates a controller with default options that allows everything.
    pub fn new(name: impl Into<String>, repository: Arc<dyn Repository>) -> Self {
        Self {
            name: name.into(),
            repository,
            options: TableOptions::default(),
            access: Arc::new(AllowAll),
            feed: None,
        }
    }

    /// Sets the table options.
    #[must_use]
    pub fn with_options(mut self, options: TableOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the access control provider.
    #[must_use]
    pub fn with_access_control(mut self, access: Arc<dyn AccessControlProvider>) -> Self {
        self.access = access;
        self
    }

    /// Publishes committed writes to `feed`.
    #[must_use]
    pub fn with_change_feed(mut self, feed: Arc<ChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the table options.
    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Returns the repository.
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// Returns the path of the table, e.g. `/tables/movies`.
    pub fn route(&self) -> String {
        format!("{TABLES_PREFIX}/{}", self.name)
    }

    /// Returns the path of one entity.
    pub fn entity_route(&self, id: &str) -> String {
        format!("{}/{id}", self.route())
    }

    /// Creates an entity.
    ///
    /// # Errors
    ///
    /// `400` for a malformed body or id, the unauthorized status, `409` if the
    /// id exists, `412` if `If-None-Match: *` finds an existing entity.
    pub fn create(&self, ctx: &RequestContext, body: Value) -> TableResult<TableData> {
        let mut entity = TableData::from_value(body)?;
        if entity.id.is_empty() {
            entity.id = TableData::new_id();
        } else {
            validate_id(&entity.id)?;
        }
        self.authorize(TableOperation::Create, &ctx.identity, Some(&entity))?;

        if !ctx.preconditions.is_empty() {
            let existing = match self.repository.read(&entity.id) {
                Ok(existing) => Some(existing),
                Err(TableError::NotFound) => None,
                Err(e) => return Err(e),
            };
            ctx.preconditions.evaluate(false, existing.as_ref())?;
        }

        self.access
            .pre_commit_hook(TableOperation::Create, &mut entity, &ctx.identity)?;
        let stored = self.repository.create(entity)?;
        self.committed(TableOperation::Create, &stored, &ctx.identity);
        Ok(stored)
    }

    /// Reads an entity.
    ///
    /// # Errors
    ///
    /// `404` if missing or outside the caller's view, the unauthorized
    /// status, `410` if soft-deleted, `304`/`412` from preconditions.
    pub fn read(&self, ctx: &RequestContext, id: &str) -> TableResult<TableData> {
        let entity = self.load(ctx, id)?;
        self.authorize(TableOperation::Read, &ctx.identity, Some(&entity))?;
        self.check_deleted(&entity, ctx.include_deleted)?;
        ctx.preconditions.evaluate(true, Some(&entity))?;
        Ok(entity)
    }

    /// Replaces an entity with `body`.
    ///
    /// # Errors
    ///
    /// `400` if the body id differs from `id`, otherwise as [`Self::read`]
    /// plus `412` when the stored version does not match.
    pub fn replace(&self, ctx: &RequestContext, id: &str, body: Value) -> TableResult<TableData> {
        let mut entity = TableData::from_value(body)?;
        if entity.id != id {
            warn!(table = %self.name, id, body_id = %entity.id, "replace id mismatch");
            return Err(TableError::bad_request(format!(
                "entity id '{}' does not match '{id}'",
                entity.id
            )));
        }
        let existing = self.load(ctx, id)?;
        self.authorize(TableOperation::Update, &ctx.identity, Some(&existing))?;
        self.check_deleted(&existing, ctx.include_deleted)?;
        let version = ctx.preconditions.evaluate(false, Some(&existing))?;

        self.access
            .pre_commit_hook(TableOperation::Update, &mut entity, &ctx.identity)?;
        let stored = self.repository.replace(entity, version.as_ref())?;
        self.committed(TableOperation::Update, &stored, &ctx.identity);
        Ok(stored)
    }

    /// Applies a JSON merge patch to an entity.
    ///
    /// The patch may not change `id`, `updatedAt` or `version`. A patch
    /// setting `deleted` to `false` restores a soft-deleted entity.
    ///
    /// # Errors
    ///
    /// As [`Self::replace`].
    pub fn patch(&self, ctx: &RequestContext, id: &str, patch: Value) -> TableResult<TableData> {
        if !patch.is_object() {
            return Err(TableError::bad_request("patch must be a JSON object"));
        }
        let existing = self.load(ctx, id)?;
        self.authorize(TableOperation::Update, &ctx.identity, Some(&existing))?;

        let mut merged = existing
            .to_value()
            .map_err(|e| TableError::repository(e.to_string()))?;
        for name in ["id", "updatedAt", "version"] {
            if let Some(value) = patch.get(name) {
                if !same_system_value(name, value, &merged[name]) {
                    return Err(TableError::bad_request(format!("'{name}' cannot be changed")));
                }
            }
        }

        let restores = patch.get("deleted") == Some(&Value::Bool(false));
        if !restores {
            self.check_deleted(&existing, ctx.include_deleted)?;
        }
        let version = ctx.preconditions.evaluate(false, Some(&existing))?;

        apply_merge_patch(&mut merged, &patch);
        let mut entity = TableData::from_value(merged)?;
        self.access
            .pre_commit_hook(TableOperation::Update, &mut entity, &ctx.identity)?;
        let expected = version.unwrap_or_else(|| existing.version.clone());
        let stored = self.repository.replace(entity, Some(&expected))?;
        self.committed(TableOperation::Update, &stored, &ctx.identity);
        Ok(stored)
    }

    /// Deletes an entity, or marks it deleted when soft delete is on.
    ///
    /// # Errors
    ///
    /// As [`Self::read`]; a soft-deleted entity is always `410`.
    pub fn delete(&self, ctx: &RequestContext, id: &str) -> TableResult<()> {
        let existing = self.load(ctx, id)?;
        self.authorize(TableOperation::Delete, &ctx.identity, Some(&existing))?;
        self.check_deleted(&existing, false)?;
        let version = ctx.preconditions.evaluate(false, Some(&existing))?;

        if self.options.enable_soft_delete {
            debug!(table = %self.name, id, "soft delete");
            let mut entity = existing.clone();
            entity.deleted = true;
            self.access
                .pre_commit_hook(TableOperation::Update, &mut entity, &ctx.identity)?;
            let expected = version.unwrap_or_else(|| existing.version.clone());
            let stored = self.repository.replace(entity, Some(&expected))?;
            self.committed(TableOperation::Update, &stored, &ctx.identity);
        } else {
            self.repository.delete(id, version.as_ref())?;
            self.committed(TableOperation::Delete, &existing, &ctx.identity);
        }
        Ok(())
    }

    /// Runs an OData query over the caller's view of the table.
    ///
    /// # Errors
    ///
    /// `400` for invalid query options or `$top` above the maximum, the
    /// unauthorized status, or a repository error.
    pub fn query(&self, ctx: &RequestContext, raw_query: &str) -> TableResult<PagedResult> {
        self.authorize(TableOperation::Query, &ctx.identity, None)?;
        let options = QueryOptions::parse(raw_query).map_err(|e| {
            warn!(table = %self.name, error = %e, "invalid query");
            TableError::bad_request(e.to_string())
        })?;
        if let Some(top) = options.top.filter(|top| *top > self.options.max_top) {
            return Err(TableError::bad_request(format!(
                "$top {top} exceeds the maximum of {}",
                self.options.max_top
            )));
        }

        let view = self.access.data_view(&ctx.identity);
        let hide_deleted = self.options.enable_soft_delete && !options.include_deleted;
        let items = self
            .repository
            .query()?
            .into_iter()
            .filter(|entity| in_view(view.as_ref(), entity))
            .filter(|entity| !(hide_deleted && entity.deleted))
            .map(|entity| entity.to_value())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TableError::repository(e.to_string()))?;

        let page = options.execute(items, self.options.page_size);
        let next_link = options
            .next_link_query(page.items.len(), page.total)
            .map(|query| format!("{}?{query}", self.route()));
        debug!(table = %self.name, returned = page.items.len(), total = page.total, "query");

        Ok(PagedResult {
            count: options.count.then_some(page.total),
            items: page.items,
            next_link,
        })
    }

    /// Reads an entity the caller can see.
    fn load(&self, ctx: &RequestContext, id: &str) -> TableResult<TableData> {
        let entity = self.repository.read(id)?;
        if !in_view(self.access.data_view(&ctx.identity).as_ref(), &entity) {
            debug!(table = %self.name, id, "entity outside data view");
            return Err(TableError::NotFound);
        }
        Ok(entity)
    }

    fn authorize(
        &self,
        operation: TableOperation,
        identity: &Identity,
        entity: Option<&TableData>,
    ) -> TableResult<()> {
        if self.access.is_authorized(operation, identity, entity) {
            Ok(())
        } else {
            warn!(
                table = %self.name,
                %operation,
                id = entity.map(|e| e.id.as_str()).unwrap_or_default(),
                "unauthorized"
            );
            Err(TableError::Unauthorized {
                status: self.options.unauthorized_status,
            })
        }
    }

    fn check_deleted(&self, entity: &TableData, include_deleted: bool) -> TableResult<()> {
        if self.options.enable_soft_delete && entity.deleted && !include_deleted {
            debug!(table = %self.name, id = %entity.id, "entity is soft-deleted");
            return Err(TableError::Gone);
        }
        Ok(())
    }

    fn committed(&self, operation: TableOperation, entity: &TableData, identity: &Identity) {
        self.access.post_commit_hook(operation, entity, identity);
        if let Some(feed) = &self.feed {
            feed.publish(operation, &self.name, entity);
        }
        info!(table = %self.name, id = %entity.id, %operation, "committed");
    }
}

impl std::fmt::Debug for TableController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableController")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("change_feed", &self.feed.is_some())
            .finish_non_exhaustive()
    }
}

fn in_view(view: Option<&DataView>, entity: &TableData) -> bool {
    view.map_or(true, |view| view.contains(entity))
}

/// Compares a patched system property against the stored one.
fn same_system_value(name: &str, patched: &Value, stored: &Value) -> bool {
    if name == "updatedAt" {
        let parse = |v: &Value| {
            v.as_str()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        };
        return match (parse(patched), parse(stored)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
    }
    patched == stored
}

/// Parses a request body as a JSON object.
///
/// `merge_patch` additionally accepts `application/merge-patch+json`.
///
/// # Errors
///
/// `415` for a missing or non-JSON content type, `400` for malformed JSON or
/// a non-object body.
pub fn parse_body(content_type: Option<&str>, body: &[u8], merge_patch: bool) -> TableResult<Value> {
    let media_type = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();
    let accepted = media_type == "application/json"
        || (merge_patch && media_type == "application/merge-patch+json");
    if !accepted {
        return Err(TableError::UnsupportedMediaType(media_type));
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| TableError::bad_request(format!("invalid JSON: {e}")))?;
    if !value.is_object() {
        return Err(TableError::bad_request("body must be a JSON object"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasync_core::{EntityTag, OwnerAccessControl};
    use datasync_storage::InMemoryRepository;
    use serde_json::json;

    fn controller(soft_delete: bool) -> TableController {
        let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        TableController::new("movies", repo)
            .with_options(TableOptions::default().with_soft_delete(soft_delete).with_page_size(2))
    }

    fn ctx() -> RequestContext {
        RequestContext::new()
    }

    fn if_match(entity: &TableData) -> RequestContext {
        ctx().with_preconditions(Preconditions::new().with_if_match(&entity.etag().unwrap()))
    }

    #[test]
    fn create_assigns_id_and_rejects_bad_ids() {
        let c = controller(false);
        let stored = c.create(&ctx(), json!({"title": "Heat"})).unwrap();
        assert_eq!(stored.id.len(), 32);

        assert_eq!(c.create(&ctx(), json!({"id": "bad id"})).unwrap_err().status(), 400);
        assert_eq!(c.create(&ctx(), json!({"id": stored.id})).unwrap_err().status(), 409);
    }

    #[test]
    fn create_if_none_match_star() {
        let c = controller(false);
        let star = ctx().with_preconditions(Preconditions::new().with_if_none_match("*"));
        c.create(&star, json!({"id": "m1"})).unwrap();
        let err = c.create(&star, json!({"id": "m1"})).unwrap_err();
        assert_eq!(err.status(), 412);
        assert_eq!(err.payload().map(|e| e.id.as_str()), Some("m1"));
    }

    #[test]
    fn read_honours_preconditions() {
        let c = controller(false);
        let stored = c.create(&ctx(), json!({"id": "m1"})).unwrap();
        let etag = stored.etag().unwrap();

        let inm = ctx().with_preconditions(Preconditions::new().with_if_none_match(&etag));
        assert_eq!(c.read(&inm, "m1").unwrap_err().status(), 304);
        assert_eq!(c.read(&ctx(), "m1").unwrap(), stored);
        assert_eq!(c.read(&ctx(), "nope").unwrap_err().status(), 404);
    }

    #[test]
    fn replace_with_stale_etag_returns_current() {
        let c = controller(false);
        let v1 = c.create(&ctx(), json!({"id": "m1", "n": 1})).unwrap();
        let v2 = c.replace(&if_match(&v1), "m1", json!({"id": "m1", "n": 2})).unwrap();

        let err = c
            .replace(&if_match(&v1), "m1", json!({"id": "m1", "n": 3}))
            .unwrap_err();
        assert_eq!(err.status(), 412);
        assert_eq!(err.payload(), Some(&v2));

        let err = c.replace(&ctx(), "m1", json!({"id": "other"})).unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn patch_merges_and_guards_system_properties() {
        let c = controller(false);
        let v1 = c
            .create(&ctx(), json!({"id": "m1", "title": "Heat", "year": 1995}))
            .unwrap();

        let v2 = c
            .patch(&ctx(), "m1", json!({"year": 1996, "title": null}))
            .unwrap();
        assert_eq!(v2.property("year"), Some(&json!(1996)));
        assert!(v2.property("title").is_none());
        assert_ne!(v2.version, v1.version);

        assert_eq!(c.patch(&ctx(), "m1", json!({"id": "m2"})).unwrap_err().status(), 400);
        assert_eq!(
            c.patch(&ctx(), "m1", json!({"version": "AAAA"})).unwrap_err().status(),
            400
        );
        let same = json!({"id": "m1", "version": v2.version.to_base64(), "year": 2000});
        assert!(c.patch(&ctx(), "m1", same).is_ok());
        assert_eq!(c.patch(&ctx(), "m1", json!([1])).unwrap_err().status(), 400);
    }

    #[test]
    fn soft_delete_lifecycle() {
        let c = controller(true);
        c.create(&ctx(), json!({"id": "m1"})).unwrap();
        c.delete(&ctx(), "m1").unwrap();

        assert_eq!(c.read(&ctx(), "m1").unwrap_err().status(), 410);
        assert!(c.read(&ctx().with_include_deleted(true), "m1").unwrap().deleted);
        assert_eq!(c.delete(&ctx(), "m1").unwrap_err().status(), 410);
        assert_eq!(c.patch(&ctx(), "m1", json!({"n": 1})).unwrap_err().status(), 410);
        assert_eq!(c.query(&ctx(), "").unwrap().items.len(), 0);
        assert_eq!(c.query(&ctx(), "__includedeleted=true").unwrap().items.len(), 1);

        let restored = c.patch(&ctx(), "m1", json!({"deleted": false})).unwrap();
        assert!(!restored.deleted);
        assert_eq!(c.query(&ctx(), "").unwrap().items.len(), 1);
    }

    #[test]
    fn hard_delete_checks_version() {
        let c = controller(false);
        let v1 = c.create(&ctx(), json!({"id": "m1"})).unwrap();
        c.replace(&ctx(), "m1", json!({"id": "m1"})).unwrap();
        assert_eq!(c.delete(&if_match(&v1), "m1").unwrap_err().status(), 412);
        c.delete(&ctx(), "m1").unwrap();
        assert_eq!(c.read(&ctx(), "m1").unwrap_err().status(), 404);
    }

    #[test]
    fn query_paging_and_limits() {
        let c = controller(false);
        for i in 0..5 {
            c.create(&ctx(), json!({"id": format!("m{i}"), "n": i})).unwrap();
        }
        let page = c.query(&ctx(), "$count=true").unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.count, Some(5));
        assert_eq!(page.next_link.as_deref(), Some("/tables/movies?$count=true&$skip=2"));

        let page = c.query(&ctx(), "$skip=4").unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.next_link.is_none());
        assert!(page.count.is_none());

        assert_eq!(c.query(&ctx(), "$top=200000").unwrap_err().status(), 400);
        assert_eq!(c.query(&ctx(), "$filter=n%20eq").unwrap_err().status(), 400);
    }

    #[test]
    fn owner_access_control() {
        let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let c = TableController::new("todos", repo)
            .with_access_control(Arc::new(OwnerAccessControl::new()))
            .with_options(TableOptions::default().with_unauthorized_status(403));
        let alice = ctx().with_identity(Identity::user("alice"));
        let bob = ctx().with_identity(Identity::user("bob"));

        let item = c.create(&alice, json!({"id": "t1", "text": "milk"})).unwrap();
        assert_eq!(item.property("userId"), Some(&json!("alice")));

        assert_eq!(c.read(&bob, "t1").unwrap_err().status(), 404);
        assert_eq!(c.query(&bob, "").unwrap().items.len(), 0);
        assert_eq!(c.query(&alice, "").unwrap().items.len(), 1);
        assert_eq!(c.query(&ctx(), "").unwrap_err().status(), 403);
    }

    #[test]
    fn change_feed_receives_commits() {
        let feed = Arc::new(ChangeFeed::new());
        let c = controller(true).with_change_feed(Arc::clone(&feed));
        let rx = feed.subscribe();

        c.create(&ctx(), json!({"id": "m1"})).unwrap();
        c.delete(&ctx(), "m1").unwrap();

        let first = rx.recv().unwrap();
        assert_eq!(first.operation, TableOperation::Create);
        let second = rx.recv().unwrap();
        assert_eq!(second.operation, TableOperation::Update);
        assert!(second.entity.deleted);
        assert_eq!(second.table, "movies");
    }

    #[test]
    fn weak_etags_never_match() {
        let c = controller(false);
        let stored = c.create(&ctx(), json!({"id": "m1"})).unwrap();
        let weak = format!("W/{}", stored.etag().unwrap());
        assert!(matches!(EntityTag::parse_list(&weak)[0], EntityTag::Weak(_)));
        let pre = ctx().with_preconditions(Preconditions::new().with_if_match(&weak));
        assert_eq!(c.replace(&pre, "m1", json!({"id": "m1"})).unwrap_err().status(), 412);
    }

    #[test]
    fn body_parsing() {
        assert!(parse_body(Some("application/json; charset=utf-8"), b"{}", false).is_ok());
        assert!(parse_body(Some("application/merge-patch+json"), b"{}", true).is_ok());
        assert_eq!(
            parse_body(Some("application/merge-patch+json"), b"{}", false)
                .unwrap_err()
                .status(),
            415
        );
        assert_eq!(parse_body(None, b"{}", false).unwrap_err().status(), 415);
        assert_eq!(parse_body(Some("text/plain"), b"{}", false).unwrap_err().status(), 415);
        assert_eq!(parse_body(Some("application/json"), b"{", false).unwrap_err().status(), 400);
        assert_eq!(parse_body(Some("application/json"), b"[]", false).unwrap_err().status(), 400);
    }
}
