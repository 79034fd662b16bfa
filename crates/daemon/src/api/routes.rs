//! API routing

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::{handlers, middleware, ws};
use crate::supervisor::FastpathSupervisor;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::status,
        handlers::image_stat,
        handlers::image_readdir,
        handlers::image_import,
        handlers::ipc_slots,
        handlers::ipc_fork,
        handlers::ipc_wait,
    ),
    components(schemas(
        handlers::ErrorResponse,
        handlers::StatusResponse,
        handlers::StatResponse,
        handlers::FileKindDto,
        handlers::DirEntryDto,
        handlers::ReaddirResponse,
        handlers::ImportRequest,
        handlers::ImportResponse,
        handlers::SlotsResponse,
        handlers::ForkRequest,
        handlers::ForkResponse,
        handlers::WaitRequest,
        handlers::WaitResponse,
    )),
    tags(
        (name = "status", description = "Daemon status"),
        (name = "image", description = "Shared image inspection and import"),
        (name = "ipc", description = "Process-lifecycle IPC slot inspection and manual driving"),
    ),
    info(
        title = "Fast-path supervisor daemon",
        version = "0.1.0",
        description = "Operational surface over the shared image and the supervisor side of the process-lifecycle IPC protocol",
    )
)]
struct ApiDoc;

/// Create the API router
pub fn create_router(supervisor: Arc<FastpathSupervisor>) -> Router {
    let openapi = ApiDoc::openapi();

    Router::new()
        .route("/api/v1/status", get(handlers::status))
        .route("/api/v1/image/stat", get(handlers::image_stat))
        .route("/api/v1/image/readdir", get(handlers::image_readdir))
        .route("/api/v1/image/import", post(handlers::image_import))
        .route("/api/v1/ipc/slots", get(handlers::ipc_slots))
        .route("/api/v1/ipc/fork", post(handlers::ipc_fork))
        .route("/api/v1/ipc/wait", post(handlers::ipc_wait))
        .route("/events", get(ws::events_handler))
        .with_state(supervisor)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(CorsLayer::permissive())
}
