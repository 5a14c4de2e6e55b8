use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::{middleware as auth_mw, routes as auth_routes};
use crate::config::{feature_flags, GatewayConfig};
use crate::db::AppState;
use crate::telemetry::OtelTraceLayer;
use crate::{health, openapi, redirects, services};

/// The gateway's own routes. Anything unrouted is served from the static
/// assets folder.
pub fn gateway_routes(config: &GatewayConfig) -> Router<AppState> {
    let oidc = &config.oidc;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .route("/config.js", get(services::config_js))
        .route(&oidc.login_path, get(auth_routes::login))
        .route(&oidc.callback_path, get(auth_routes::callback))
        .route(&oidc.success_path, get(auth_routes::success))
        .route(&oidc.logout_path, get(auth_routes::logout))
        .route(&oidc.post_logout_path, get(auth_routes::post_logout))
        .route("/auth/verify", get(auth_routes::verify))
        .fallback_service(ServeDir::new(&config.static_assets_path))
}

/// Wrap `routes` in the gateway middleware stack.
///
/// Requests pass, outermost first: x-header cleaning, request id, tracing,
/// user verification, the OTel span (when telemetry is on), access control,
/// manual redirects, then the routes.
pub fn with_gateway_layers(routes: Router<AppState>, state: AppState) -> Router {
    let mut router = routes
        .layer(middleware::from_fn_with_state(
            state.clone(),
            redirects::manual_redirects,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_mw::access_control,
        ));

    if feature_flags().telemetry {
        router = router.layer(OtelTraceLayer::new(state.config.clone()));
    }

    router
        .layer(middleware::from_fn_with_state(state.clone(), auth_mw::set_user))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_mw::clean_x_headers,
        ))
        .with_state(state)
}

/// Build the full gateway router.
pub fn api_router(state: AppState) -> Router {
    let routes = gateway_routes(&state.config);
    with_gateway_layers(routes, state)
}
