//! HTTP API tests driving the router in-process.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use mergeway_core::config::MergeConfig;
use mergeway_core::{Engine, MemoryRecords, MemoryRepositories};
use mergeway_store::{MemoryStore, ObjectId, ObjectStore, Signature};
use serde_json::{Value, json};
use tower::ServiceExt;

fn setup() -> (Router, MemoryStore) {
    let repos = MemoryRepositories::new();
    let store = repos.create("demo");
    let engine = Engine::new(repos, MemoryRecords::new(), MergeConfig::default());
    (mergeway_server::router(Arc::new(engine)), store)
}

fn commit(store: &MemoryStore, parents: &[&ObjectId], files: &[(&str, &str)]) -> ObjectId {
    let parents: Vec<ObjectId> = parents.iter().map(|p| (*p).clone()).collect();
    let author = Signature::new("Test User", "test@example.com");
    store.commit_files(&parents, files, &author, "change").unwrap()
}

/// `main` at a base commit, `feature` one commit ahead.
fn linear(store: &MemoryStore) -> (ObjectId, ObjectId) {
    let base = commit(store, &[], &[("f.txt", "A")]);
    let tip = commit(store, &[&base], &[("f.txt", "B")]);
    store.create_branch("main", &base).unwrap();
    store.create_branch("feature", &tip).unwrap();
    (base, tip)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

fn new_pull(source: &str, target: &str) -> Value {
    json!({
        "title": format!("Merge {source}"),
        "source_branch": source,
        "target_branch": target,
    })
}

#[tokio::test]
async fn test_health() {
    let (app, _) = setup();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
}

#[tokio::test]
async fn test_create_and_get() {
    let (app, store) = setup();
    linear(&store);

    let (status, created) = send(
        &app,
        Method::POST,
        "/repos/demo/pulls",
        Some(new_pull("feature", "main")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 1);
    assert_eq!(created["state"], "open");
    assert_eq!(created["source_branch"], "feature");

    let (status, fetched) = send(&app, Method::GET, "/repos/demo/pulls/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_not_found() {
    let (app, store) = setup();
    linear(&store);

    let (status, body) = send(&app, Method::GET, "/repos/demo/pulls/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = send(&app, Method::GET, "/repos/missing/pulls", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_branch_is_unprocessable() {
    let (app, store) = setup();
    linear(&store);

    let (status, body) = send(
        &app,
        Method::POST,
        "/repos/demo/pulls",
        Some(new_pull("nope", "main")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_reference");

    let (status, _) = send(
        &app,
        Method::POST,
        "/repos/demo/pulls",
        Some(new_pull("bad..name", "main")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let (app, store) = setup();
    linear(&store);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/repos/demo/pulls")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/repos/demo/pulls",
        Some(json!({ "title": "missing branches" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = send(&app, Method::GET, "/repos/demo/pulls/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_commits_and_fast_forward_merge() {
    let (app, store) = setup();
    let (_, tip) = linear(&store);
    send(&app, Method::POST, "/repos/demo/pulls", Some(new_pull("feature", "main"))).await;

    let (status, commits) = send(&app, Method::GET, "/repos/demo/pulls/1/commits", None).await;
    assert_eq!(status, StatusCode::OK);
    let commits = commits.as_array().unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0]["sha"], tip.as_str());

    let (status, mergeable) =
        send(&app, Method::GET, "/repos/demo/pulls/1/mergeable", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mergeable["mergeable"], true);

    let (status, merged) = send(&app, Method::PUT, "/repos/demo/pulls/1/merge", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(merged["state"], "merged");
    assert_eq!(merged["merge_commit"], tip.as_str());
    assert_eq!(store.branch_tip("main").unwrap(), tip);

    let (status, body) = send(&app, Method::PUT, "/repos/demo/pulls/1/merge", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn test_conflict_reports_paths() {
    let (app, store) = setup();
    let base = commit(&store, &[], &[("f.txt", "base")]);
    let one = commit(&store, &[&base], &[("f.txt", "one")]);
    let two = commit(&store, &[&base], &[("f.txt", "two")]);
    store.create_branch("main", &two).unwrap();
    store.create_branch("feature", &one).unwrap();
    send(&app, Method::POST, "/repos/demo/pulls", Some(new_pull("feature", "main"))).await;

    let (status, mergeable) =
        send(&app, Method::GET, "/repos/demo/pulls/1/mergeable", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mergeable["mergeable"], false);

    let (status, body) = send(&app, Method::PUT, "/repos/demo/pulls/1/merge", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["conflicts"], json!([{ "path": "f.txt", "reason": "both_modified" }]));
    assert_eq!(store.branch_tip("main").unwrap(), two);

    let (_, pr) = send(&app, Method::GET, "/repos/demo/pulls/1", None).await;
    assert_eq!(pr["state"], "open");
}

#[tokio::test]
async fn test_patch_and_list_filter() {
    let (app, store) = setup();
    linear(&store);
    send(&app, Method::POST, "/repos/demo/pulls", Some(new_pull("feature", "main"))).await;
    send(&app, Method::POST, "/repos/demo/pulls", Some(new_pull("feature", "main"))).await;

    let (status, edited) = send(
        &app,
        Method::PATCH,
        "/repos/demo/pulls/1",
        Some(json!({ "title": "Renamed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["title"], "Renamed");
    assert_eq!(edited["state"], "open");

    let (status, closed) = send(
        &app,
        Method::PATCH,
        "/repos/demo/pulls/2",
        Some(json!({ "title": "Superseded", "state": "closed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["state"], "closed");
    assert_eq!(closed["title"], "Superseded");
    assert!(closed["closed_at"].is_string());

    let (status, body) = send(
        &app,
        Method::PATCH,
        "/repos/demo/pulls/2",
        Some(json!({ "state": "open" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_state");

    let (_, all) = send(&app, Method::GET, "/repos/demo/pulls", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (status, open) = send(&app, Method::GET, "/repos/demo/pulls?state=open", None).await;
    assert_eq!(status, StatusCode::OK);
    let open = open.as_array().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0]["id"], 1);

    let (status, _) = send(&app, Method::GET, "/repos/demo/pulls?state=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_file_directory_clash_is_a_conflict() {
    let (app, store) = setup();
    let base = commit(&store, &[], &[("x", "x")]);
    let file = commit(&store, &[&base], &[("x", "x"), ("a", "file")]);
    let dir = commit(&store, &[&base], &[("x", "x"), ("a/b", "nested")]);
    store.create_branch("main", &dir).unwrap();
    store.create_branch("feature", &file).unwrap();
    send(&app, Method::POST, "/repos/demo/pulls", Some(new_pull("feature", "main"))).await;

    let (status, body) = send(&app, Method::PUT, "/repos/demo/pulls/1/merge", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["conflicts"], json!([{ "path": "a", "reason": "file_directory" }]));
    assert_eq!(store.branch_tip("main").unwrap(), dir);
}
