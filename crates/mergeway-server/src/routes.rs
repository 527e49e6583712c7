use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use mergeway_core::{Engine, RecordStore, StoreProvider};
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Build the HTTP API around `engine`.
pub fn router<P, R>(engine: Arc<Engine<P, R>>) -> Router
where
    P: StoreProvider + 'static,
    R: RecordStore + 'static,
{
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route(
            "/repos/{repo}/pulls",
            post(handlers::create::<P, R>).get(handlers::list::<P, R>),
        )
        .route(
            "/repos/{repo}/pulls/{id}",
            get(handlers::get::<P, R>).patch(handlers::update::<P, R>),
        )
        .route(
            "/repos/{repo}/pulls/{id}/commits",
            get(handlers::commits::<P, R>),
        )
        .route(
            "/repos/{repo}/pulls/{id}/mergeable",
            get(handlers::mergeable::<P, R>),
        )
        .route("/repos/{repo}/pulls/{id}/merge", put(handlers::merge::<P, R>))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}
