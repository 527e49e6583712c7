//! Request handlers.
//!
//! Every engine call may block on repository I/O, so handlers hand the work
//! to tokio's blocking pool.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use mergeway_core::{
    CommitSummary, Engine, Mergeability, NewPullRequest, PullFilter, PullRequest,
    PullRequestPatch, RecordStore, StoreProvider,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};

pub type SharedEngine<P, R> = Arc<Engine<P, R>>;

/// Target state accepted by `PATCH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchState {
    Open,
    Closed,
}

/// Body of `PATCH /repos/{repo}/pulls/{id}`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateBody {
    pub title: Option<String>,
    pub description: Option<String>,
    pub target_branch: Option<String>,
    pub state: Option<PatchState>,
}

async fn blocking<P, R, T, F>(engine: SharedEngine<P, R>, f: F) -> ApiResult<T>
where
    P: StoreProvider + 'static,
    R: RecordStore + 'static,
    T: Send + 'static,
    F: FnOnce(&Engine<P, R>) -> mergeway_core::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

pub async fn create<P, R>(
    State(engine): State<SharedEngine<P, R>>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<NewPullRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PullRequest>)>
where
    P: StoreProvider + 'static,
    R: RecordStore + 'static,
{
    let Path(repo) = path?;
    let Json(request) = body?;
    let pr = blocking(engine, move |engine| engine.create(&repo, request)).await?;
    Ok((StatusCode::CREATED, Json(pr)))
}

pub async fn list<P, R>(
    State(engine): State<SharedEngine<P, R>>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<PullFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<PullRequest>>>
where
    P: StoreProvider + 'static,
    R: RecordStore + 'static,
{
    let Path(repo) = path?;
    let Query(filter) = query?;
    let prs = blocking(engine, move |engine| engine.list(&repo, &filter)).await?;
    Ok(Json(prs))
}

pub async fn get<P, R>(
    State(engine): State<SharedEngine<P, R>>,
    path: Result<Path<(String, u64)>, PathRejection>,
) -> ApiResult<Json<PullRequest>>
where
    P: StoreProvider + 'static,
    R: RecordStore + 'static,
{
    let Path((repo, id)) = path?;
    let pr = blocking(engine, move |engine| engine.get(&repo, id)).await?;
    Ok(Json(pr))
}

pub async fn update<P, R>(
    State(engine): State<SharedEngine<P, R>>,
    path: Result<Path<(String, u64)>, PathRejection>,
    body: Result<Json<UpdateBody>, JsonRejection>,
) -> ApiResult<Json<PullRequest>>
where
    P: StoreProvider + 'static,
    R: RecordStore + 'static,
{
    let Path((repo, id)) = path?;
    let Json(body) = body?;
    let patch = PullRequestPatch {
        title: body.title,
        description: body.description,
        target_branch: body.target_branch,
        close: body.state == Some(PatchState::Closed),
    };

    let pr = blocking(engine, move |engine| engine.update(&repo, id, patch)).await?;
    Ok(Json(pr))
}

pub async fn commits<P, R>(
    State(engine): State<SharedEngine<P, R>>,
    path: Result<Path<(String, u64)>, PathRejection>,
) -> ApiResult<Json<Vec<CommitSummary>>>
where
    P: StoreProvider + 'static,
    R: RecordStore + 'static,
{
    let Path((repo, id)) = path?;
    let commits = blocking(engine, move |engine| engine.commits(&repo, id)).await?;
    Ok(Json(commits))
}

pub async fn mergeable<P, R>(
    State(engine): State<SharedEngine<P, R>>,
    path: Result<Path<(String, u64)>, PathRejection>,
) -> ApiResult<Json<Mergeability>>
where
    P: StoreProvider + 'static,
    R: RecordStore + 'static,
{
    let Path((repo, id)) = path?;
    let result = blocking(engine, move |engine| engine.check_mergeable(&repo, id)).await?;
    Ok(Json(result))
}

pub async fn merge<P, R>(
    State(engine): State<SharedEngine<P, R>>,
    path: Result<Path<(String, u64)>, PathRejection>,
) -> ApiResult<Json<PullRequest>>
where
    P: StoreProvider + 'static,
    R: RecordStore + 'static,
{
    let Path((repo, id)) = path?;
    let pr = blocking(engine, move |engine| engine.request_merge(&repo, id)).await?;
    Ok(Json(pr))
}
