use axum::Json;
use shared_types::{AppError, AppErrorKind};
use utoipa::OpenApi;

use crate::auth::routes as auth_routes;
use crate::health::{self, HealthResponse};

#[derive(OpenApi)]
#[openapi(
    paths(health::health_check, auth_routes::verify),
    components(schemas(HealthResponse, AppError, AppErrorKind)),
    tags(
        (name = "auth", description = "Forward-auth verification for the reverse proxy"),
        (name = "health", description = "Health check endpoint")
    ),
    info(
        title = "Anduin Auth Gateway API",
        description = "Identity gateway for the Anduin data platform",
        version = "1.0.0"
    )
)]
pub struct ApiDoc;

/// Handler for `/api-docs/openapi.json`.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
