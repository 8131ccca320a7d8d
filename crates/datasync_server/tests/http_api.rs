//! End-to-end tests of the HTTP surface.

use axum::http::StatusCode;
use datasync_core::{OwnerAccessControl, TableOptions};
use datasync_server::{DatasyncServer, ServerConfig, TableController};
use datasync_testkit::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn movies_server(options: TableOptions) -> (TestServer, TestRepository) {
    let repo = TestRepository::memory().with_movies();
    let server = DatasyncServer::new(ServerConfig::default()).with_table(repo.controller(options));
    (TestServer::new(&server), repo)
}

fn default_server() -> TestServer {
    movies_server(TableOptions::default()).0
}

#[tokio::test]
async fn read_sets_entity_headers() {
    let server = default_server();
    let response = server.send(TestRequest::get("/tables/movies/id-001")).await;

    assert_eq!(response.status, StatusCode::OK);
    let entity = response.entity();
    assert_eq!(entity.property("title"), Some(&json!("The Godfather")));
    assert_eq!(response.etag(), entity.etag().as_deref());
    assert_eq!(
        response.header("last-modified"),
        Some(entity.last_modified().as_str())
    );
}

#[tokio::test]
async fn read_missing_and_unknown_table() {
    let server = default_server();
    let missing = server.send(TestRequest::get("/tables/movies/nope")).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert!(missing.json()["error"].is_string());

    let unknown = server.send(TestRequest::get("/tables/books")).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn conditional_read_returns_not_modified() {
    let server = default_server();
    let first = server.send(TestRequest::get("/tables/movies/id-002")).await;
    let etag = first.etag().unwrap().to_string();

    let again = server
        .send(TestRequest::get("/tables/movies/id-002").if_none_match(&etag))
        .await;
    assert_eq!(again.status, StatusCode::NOT_MODIFIED);
    assert!(again.body.is_empty());
    assert_eq!(again.etag(), Some(etag.as_str()));
}

#[tokio::test]
async fn create_returns_location() {
    let server = default_server();
    let response = server
        .send(TestRequest::post("/tables/movies").json(&json!({"id": "new-1", "title": "Heat"})))
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.header("location"), Some("/tables/movies/new-1"));
    let entity = response.entity();
    assert!(!entity.version.is_empty());
    assert_eq!(response.etag(), entity.etag().as_deref());
}

#[tokio::test]
async fn create_duplicate_is_conflict_with_current_entity() {
    let server = default_server();
    let response = server
        .send(TestRequest::post("/tables/movies").json(&json!({"id": "id-000", "title": "Copy"})))
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    let current = response.entity();
    assert_eq!(current.property("title"), Some(&json!("The Shawshank Redemption")));
    assert_eq!(response.etag(), current.etag().as_deref());
}

#[tokio::test]
async fn replace_with_stale_etag_is_precondition_failed() {
    let server = default_server();
    let original = server.send(TestRequest::get("/tables/movies/id-003")).await;
    let stale = original.etag().unwrap().to_string();
    let mut body = original.json();

    body["title"] = json!("Pulp Fiction (Remastered)");
    let updated = server
        .send(TestRequest::put("/tables/movies/id-003").if_match(&stale).json(&body))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_ne!(updated.etag(), Some(stale.as_str()));

    body["title"] = json!("Lost update");
    let rejected = server
        .send(TestRequest::put("/tables/movies/id-003").if_match(&stale).json(&body))
        .await;
    assert_eq!(rejected.status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(
        rejected.entity().property("title"),
        Some(&json!("Pulp Fiction (Remastered)"))
    );
    assert_eq!(rejected.etag(), updated.etag());
}

#[tokio::test]
async fn replace_id_mismatch_is_bad_request() {
    let server = default_server();
    let response = server
        .send(TestRequest::put("/tables/movies/id-003").json(&json!({"id": "id-004"})))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_accepts_merge_patch() {
    let server = default_server();
    let response = server
        .send(
            TestRequest::patch("/tables/movies/id-005")
                .body("application/merge-patch+json", r#"{"rating":"PG","duration":null}"#),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let entity = response.entity();
    assert_eq!(entity.property("rating"), Some(&json!("PG")));
    assert_eq!(entity.property("duration"), None);
    assert_eq!(entity.property("title"), Some(&json!("12 Angry Men")));
}

#[tokio::test]
async fn patch_cannot_change_version() {
    let server = default_server();
    let response = server
        .send(TestRequest::patch("/tables/movies/id-005").json(&json!({"version": "AAAA"})))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn media_type_is_checked() {
    let server = default_server();
    let response = server
        .send(TestRequest::post("/tables/movies").body("text/plain", r#"{"id":"x"}"#))
        .await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = server
        .send(TestRequest::put("/tables/movies/id-000").body("application/merge-patch+json", "{}"))
        .await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = server
        .send(TestRequest::post("/tables/movies").body("application/json", "[1,2]"))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn hard_delete_removes_entity() {
    let server = default_server();
    let response = server.send(TestRequest::delete("/tables/movies/id-006")).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = server.send(TestRequest::get("/tables/movies/id-006")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn soft_delete_lifecycle() {
    let (server, repo) = movies_server(TableOptions::default().with_soft_delete(true));

    let response = server.send(TestRequest::delete("/tables/movies/id-007")).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(repo.read("id-007").unwrap().deleted);

    let gone = server.send(TestRequest::get("/tables/movies/id-007")).await;
    assert_eq!(gone.status, StatusCode::GONE);
    let again = server.send(TestRequest::delete("/tables/movies/id-007")).await;
    assert_eq!(again.status, StatusCode::GONE);

    let visible = server
        .send(TestRequest::get("/tables/movies/id-007?__includedeleted=true"))
        .await;
    assert_eq!(visible.status, StatusCode::OK);
    assert!(visible.entity().deleted);

    let page = server.send(TestRequest::get("/tables/movies")).await.page();
    assert_eq!(page.items.len(), MOVIE_COUNT - 1);
    let page = server
        .send(TestRequest::get("/tables/movies?__includedeleted=true"))
        .await
        .page();
    assert_eq!(page.items.len(), MOVIE_COUNT);

    let restored = server
        .send(TestRequest::patch("/tables/movies/id-007").json(&json!({"deleted": false})))
        .await;
    assert_eq!(restored.status, StatusCode::OK);
    assert!(!restored.entity().deleted);
}

#[tokio::test]
async fn query_pages_with_next_link() {
    let (server, _repo) = movies_server(TableOptions::default().with_page_size(5));

    let first = server
        .send(TestRequest::get("/tables/movies?$count=true"))
        .await
        .page();
    assert_eq!(first.items.len(), 5);
    assert_eq!(first.count, Some(MOVIE_COUNT));
    assert_eq!(
        first.next_link.as_deref(),
        Some("/tables/movies?$count=true&$skip=5")
    );

    let mut link = first.next_link;
    let mut seen = first.items.len();
    while let Some(next) = link {
        let page = server.send(TestRequest::get(next)).await.page();
        seen += page.items.len();
        link = page.next_link;
    }
    assert_eq!(seen, MOVIE_COUNT);
}

#[tokio::test]
async fn query_filters_orders_and_selects() {
    let server = default_server();
    let page = server
        .send(TestRequest::get(
            "/tables/movies?$filter=bestPictureWinner%20eq%20true&$orderby=year%20desc&$select=id,title,year",
        ))
        .await
        .page();

    let years: Vec<_> = page.items.iter().map(|m| m["year"].as_u64().unwrap()).collect();
    assert_eq!(years, vec![2003, 1993, 1975, 1974, 1972]);
    assert!(page.items.iter().all(|m| m.as_object().unwrap().len() == 3));
    assert_eq!(page.count, None);
    assert!(page.is_last_page());
}

#[tokio::test]
async fn query_rejects_bad_options() {
    let (server, _repo) = movies_server(TableOptions::default().with_max_top(10));
    for uri in [
        "/tables/movies?$top=11",
        "/tables/movies?$filter=year%20eq",
        "/tables/movies?$skip=-1",
        "/tables/movies?$expand=cast",
    ] {
        let response = server.send(TestRequest::get(uri)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn api_version_header_is_checked() {
    let server = default_server();
    let ok = server
        .send(TestRequest::get("/tables/movies/id-000").header("zumo-api-version", "3.0.0"))
        .await;
    assert_eq!(ok.status, StatusCode::OK);

    let old = server
        .send(TestRequest::get("/tables/movies/id-000").header("zumo-api-version", "1.0.0"))
        .await;
    assert_eq!(old.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn authentication_is_enforced() {
    let repo = TestRepository::memory().with_movies();
    let config = ServerConfig::default().with_auth(b"test-secret".to_vec());
    let server = TestServer::new(
        &DatasyncServer::new(config).with_table(repo.controller(TableOptions::default())),
    );

    let anonymous = server.send(TestRequest::get("/tables/movies/id-000")).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let forged = server
        .send(TestRequest::get("/tables/movies/id-000").bearer("a.1.b"))
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);

    let token = server.token("alice");
    let ok = server
        .send(TestRequest::get("/tables/movies/id-000").bearer(&token))
        .await;
    assert_eq!(ok.status, StatusCode::OK);

    let ok = server
        .send(TestRequest::get("/tables/movies/id-000").header("x-zumo-auth", token))
        .await;
    assert_eq!(ok.status, StatusCode::OK);
}

#[tokio::test]
async fn owners_only_see_their_entities() {
    let repo = TestRepository::memory();
    let controller = TableController::new(MOVIES, Arc::clone(&repo.repo))
        .with_access_control(Arc::new(OwnerAccessControl::new()));
    let config = ServerConfig::default().with_optional_auth(b"test-secret".to_vec());
    let server = TestServer::new(&DatasyncServer::new(config).with_table(controller));
    let alice = server.token("alice");
    let bob = server.token("bob");

    let created = server
        .send(
            TestRequest::post("/tables/movies")
                .bearer(&alice)
                .json(&json!({"id": "a1", "title": "Heat"})),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.json()["userId"], json!("alice"));

    let hidden = server
        .send(TestRequest::get("/tables/movies/a1").bearer(&bob))
        .await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);

    let page = server
        .send(TestRequest::get("/tables/movies").bearer(&bob))
        .await
        .page();
    assert!(page.items.is_empty());

    let anonymous = server.send(TestRequest::get("/tables/movies")).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_lists_tables() {
    let server = default_server();
    let response = server.send(TestRequest::get("/health")).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["tables"], json!(["movies"]));
}
