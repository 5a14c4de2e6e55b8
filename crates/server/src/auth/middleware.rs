use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use shared_types::GatewayUser;
use std::sync::Arc;

use super::{cookies, user};
use crate::config::GatewayConfig;
use crate::db::AppState;

/// True if `name` (lowercase) matches an allow-list entry. Entries ending in
/// `*` match by prefix.
fn x_header_allowed(name: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|entry| match entry.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => name == entry,
    })
}

/// Strip client-supplied `x-*` headers so the trusted user header can only be
/// set by the gateway itself.
pub async fn clean_x_headers(
    State(config): State<Arc<GatewayConfig>>,
    mut req: Request,
    next: Next,
) -> Response {
    let doomed: Vec<HeaderName> = req
        .headers()
        .keys()
        .filter(|name| {
            let name = name.as_str();
            name.starts_with("x-") && !x_header_allowed(name, &config.proxy.allowed_x_headers)
        })
        .cloned()
        .collect();

    for name in doomed {
        tracing::trace!(header = %name, "Removing inbound x-header");
        req.headers_mut().remove(&name);
    }

    next.run(req).await
}

/// Verify the request's token, if any, and attach the resulting
/// [`GatewayUser`] as a request extension and as the trusted user header.
///
/// Does NOT reject anonymous requests; access control decides.
pub async fn set_user(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let config = &state.config;
    let token = cookies::extract_token(req.headers(), &config.oidc.cookie_name);

    if let Some(token) = token {
        if let Some(claims) = state.verifier.verify(&token).await {
            let gateway_user = user::gateway_user(claims, &config.oidc, &state.security);
            tracing::debug!(
                username = gateway_user.username.as_deref().unwrap_or_default(),
                roles = ?gateway_user.roles,
                "Request user verified"
            );
            attach_user_header(&mut req, &config.auth.header, &gateway_user);
            req.extensions_mut().insert(gateway_user);
        }
    }

    next.run(req).await
}

fn attach_user_header(req: &mut Request, header: &str, user: &GatewayUser) {
    let name = match HeaderName::from_bytes(header.as_bytes()) {
        Ok(name) => name,
        Err(e) => {
            tracing::error!(header, error = %e, "AUTH_HEADER is not a valid header name");
            return;
        }
    };

    if let Some(value) = user_header_value(user) {
        req.headers_mut().insert(name, value);
    }
}

/// The user serialized as JSON for the trusted user header.
pub fn user_header_value(user: &GatewayUser) -> Option<HeaderValue> {
    let value = serde_json::to_vec(user)
        .map_err(|e| e.to_string())
        .and_then(|json| HeaderValue::from_bytes(&json).map_err(|e| e.to_string()));

    match value {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "Could not serialize user header");
            None
        }
    }
}

/// Paths reachable without a user.
pub fn is_public_path(path: &str, config: &GatewayConfig) -> bool {
    let under = |prefix: &str| match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    };
    path.starts_with(config.pages.unauthorized.as_str()) || under("/health") || under("/auth")
}

/// Gate every non-public path: anonymous users go to the login route and
/// users without a gateway role go to the unauthorized page.
pub async fn access_control(
    State(config): State<Arc<GatewayConfig>>,
    req: Request,
    next: Next,
) -> Response {
    if !config.auth.enabled {
        return next.run(req).await;
    }

    let path = req.uri().path().to_string();
    if is_public_path(&path, &config) {
        return next.run(req).await;
    }

    let rejection = match req.extensions().get::<GatewayUser>() {
        None => {
            tracing::debug!(path = %path, "Anonymous request redirected to login");
            Some(Redirect::to(&config.oidc.login_path))
        }
        Some(user) if !config.roles.authorizes(&user.roles) => {
            tracing::info!(
                path = %path,
                username = user.username.as_deref().unwrap_or_default(),
                "User lacks a gateway role"
            );
            Some(Redirect::to(&config.pages.unauthorized))
        }
        Some(_) => None,
    };

    match rejection {
        Some(redirect) => redirect.into_response(),
        None => next.run(req).await,
    }
}
