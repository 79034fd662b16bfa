//! HTTP handlers for the fast-path daemon's narrow `/api/v1` surface:
//! status, image inspection/import, and manual IPC driving.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sabfs_image::{DirEntry, FileKind, SabfsError, Stat};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::supervisor::FastpathSupervisor;

pub type AppState = Arc<FastpathSupervisor>;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

fn sabfs_error_response(err: SabfsError) -> Response {
    let status = match err {
        SabfsError::NotFound => StatusCode::NOT_FOUND,
        SabfsError::Exists => StatusCode::CONFLICT,
        SabfsError::InvalidArgument | SabfsError::NameTooLong => StatusCode::BAD_REQUEST,
        SabfsError::NotSupported => StatusCode::NOT_IMPLEMENTED,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, Json(ErrorResponse { error: err.to_string() })).into_response()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub accel_prefix: String,
    pub image_prefix: String,
    pub open_fd_count: usize,
    pub registered_workers: usize,
}

/// `GET /api/v1/status`
#[utoipa::path(get, path = "/api/v1/status", tag = "status", responses((status = 200, body = StatusResponse)))]
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let report = state.status();
    Json(StatusResponse {
        accel_prefix: report.accel_prefix,
        image_prefix: report.image_prefix,
        open_fd_count: report.open_fd_count,
        registered_workers: report.registered_workers,
    })
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileKindDto {
    Regular,
    Directory,
    Symlink,
}

impl From<FileKind> for FileKindDto {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Regular => FileKindDto::Regular,
            FileKind::Directory => FileKindDto::Directory,
            FileKind::Symlink => FileKindDto::Symlink,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatResponse {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub blocks: u64,
}

impl From<Stat> for StatResponse {
    fn from(st: Stat) -> Self {
        StatResponse { ino: st.ino, mode: st.mode, nlink: st.nlink, size: st.size, blocks: st.blocks }
    }
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct PathQuery {
    pub path: String,
}

/// `GET /api/v1/image/stat?path=...`
#[utoipa::path(get, path = "/api/v1/image/stat", tag = "image", params(PathQuery),
    responses((status = 200, body = StatResponse), (status = 404, body = ErrorResponse)))]
pub async fn image_stat(State(state): State<AppState>, Query(q): Query<PathQuery>) -> Response {
    match state.image_stat(&q.path) {
        Ok(st) => Json(StatResponse::from(st)).into_response(),
        Err(e) => sabfs_error_response(e),
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DirEntryDto {
    pub name: String,
    pub ino: u64,
    pub kind: FileKindDto,
}

impl From<DirEntry> for DirEntryDto {
    fn from(entry: DirEntry) -> Self {
        DirEntryDto { name: entry.name, ino: entry.ino, kind: entry.kind.into() }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReaddirResponse {
    pub entries: Vec<DirEntryDto>,
}

/// `GET /api/v1/image/readdir?path=...`
#[utoipa::path(get, path = "/api/v1/image/readdir", tag = "image", params(PathQuery),
    responses((status = 200, body = ReaddirResponse), (status = 404, body = ErrorResponse)))]
pub async fn image_readdir(State(state): State<AppState>, Query(q): Query<PathQuery>) -> Response {
    match state.image_readdir(&q.path) {
        Ok(entries) => {
            Json(ReaddirResponse { entries: entries.into_iter().map(Into::into).collect() }).into_response()
        }
        Err(e) => sabfs_error_response(e),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportRequest {
    pub path: String,
    /// Raw file bytes. Test fixtures only; not a transfer format for
    /// anything large.
    pub data: Vec<u8>,
    #[serde(default = "default_import_mode")]
    pub mode: u32,
}

fn default_import_mode() -> u32 {
    0o644
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImportResponse {
    pub imported: bool,
}

/// `POST /api/v1/image/import`
#[utoipa::path(post, path = "/api/v1/image/import", tag = "image",
    request_body = ImportRequest,
    responses((status = 200, body = ImportResponse), (status = 409, body = ErrorResponse)))]
pub async fn image_import(State(state): State<AppState>, Json(req): Json<ImportRequest>) -> Response {
    match state.image_import(&req.path, &req.data, req.mode) {
        Ok(()) => Json(ImportResponse { imported: true }).into_response(),
        Err(e) => sabfs_error_response(e),
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SlotsResponse {
    pub worker_ids: Vec<u32>,
}

/// `GET /api/v1/ipc/slots`
#[utoipa::path(get, path = "/api/v1/ipc/slots", tag = "ipc", responses((status = 200, body = SlotsResponse)))]
pub async fn ipc_slots(State(state): State<AppState>) -> Json<SlotsResponse> {
    Json(SlotsResponse { worker_ids: state.worker_ids() })
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForkRequest {
    pub worker_id: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForkResponse {
    pub pid: i64,
}

/// `POST /api/v1/ipc/fork` — drives a FORK request by hand, for manual
/// testing in place of a real guest worker thread.
#[utoipa::path(post, path = "/api/v1/ipc/fork", tag = "ipc", request_body = ForkRequest,
    responses((status = 200, body = ForkResponse), (status = 504, body = ErrorResponse)))]
pub async fn ipc_fork(State(state): State<AppState>, Json(req): Json<ForkRequest>) -> Response {
    match state.drive_fork(req.worker_id).await {
        Ok(pid) => Json(ForkResponse { pid }).into_response(),
        Err(e) => (StatusCode::GATEWAY_TIMEOUT, Json(ErrorResponse { error: e.to_string() })).into_response(),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WaitRequest {
    pub worker_id: u32,
    pub pid: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WaitResponse {
    pub status: i64,
}

/// `POST /api/v1/ipc/wait` — drives a WAIT request by hand.
#[utoipa::path(post, path = "/api/v1/ipc/wait", tag = "ipc", request_body = WaitRequest,
    responses((status = 200, body = WaitResponse), (status = 504, body = ErrorResponse)))]
pub async fn ipc_wait(State(state): State<AppState>, Json(req): Json<WaitRequest>) -> Response {
    match state.drive_wait(req.worker_id, req.pid).await {
        Ok(status) => Json(WaitResponse { status }).into_response(),
        Err(e) => (StatusCode::GATEWAY_TIMEOUT, Json(ErrorResponse { error: e.to_string() })).into_response(),
    }
}
