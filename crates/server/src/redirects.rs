use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::GatewayConfig;

/// Target of the manual redirect for `path`, compared without trailing slashes.
pub fn redirect_target<'a>(redirects: &'a BTreeMap<String, String>, path: &str) -> Option<&'a str> {
    redirects
        .get(path.trim_end_matches('/'))
        .map(String::as_str)
}

/// Send requests for well-known legacy paths to their current location.
pub async fn manual_redirects(
    State(config): State<Arc<GatewayConfig>>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(target) = redirect_target(&config.proxy.manual_redirects, req.uri().path()) {
        tracing::debug!(from = req.uri().path(), to = target, "Manual redirect");
        return (StatusCode::FOUND, [(header::LOCATION, target.to_string())]).into_response();
    }
    next.run(req).await
}
