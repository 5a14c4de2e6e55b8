//! Login flow and forward-auth handlers under `/auth`.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use serde_json::Value;
use shared_types::AppError;
use std::sync::Arc;

use super::cookies::{self, HANDOFF_COOKIE};
use super::extractors::MaybeAuth;
use super::middleware::user_header_value;
use super::oauth;
use crate::config::{feature_flags, GatewayConfig};
use crate::db::AppState;
use crate::security::SecurityManager;
use crate::services;

/// Response header listing the roles the user holds in the addressed service.
pub const SERVICE_ROLES_HEADER: &str = "x-anduin-service-roles";

/// Response header naming the addressed service.
pub const SERVICE_HEADER: &str = "x-anduin-service";

/// Query accepted by the login route and replayed onto the success page.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub redirect: Option<String>,
    #[serde(rename = "set-cookie")]
    pub set_cookie: Option<String>,
    pub headless: Option<String>,
}

impl LoginQuery {
    /// Encode the present parameters as a query string, or `None` if empty.
    pub fn to_query_string(&self) -> Option<String> {
        let pairs: Vec<String> = [
            ("redirect", &self.redirect),
            ("set-cookie", &self.set_cookie),
            ("headless", &self.headless),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .map(|v| format!("{key}={}", urlencoding::encode(v)))
        })
        .collect();

        (!pairs.is_empty()).then(|| pairs.join("&"))
    }
}

/// Start the authorization-code flow.
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Redirect, AppError> {
    let url =
        oauth::get_authorize_url(&state.config, &state.oauth_states, query.to_query_string()).await?;
    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

/// Complete the login: exchange the code, provision the user in the BI
/// directory, and hand the token to the success page.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    let config = &state.config;
    let (verifier, success_query) = state
        .oauth_states
        .take(&params.state)
        .await
        .ok_or_else(|| AppError::bad_request("Invalid or expired OAuth state"))?;

    let access_token = oauth::exchange_code(config, params.code, verifier).await?;
    let mut claims = oauth::fetch_user_info(config, &access_token).await?;

    // Token claims fill in what userinfo leaves out (role mappings, mostly).
    if let (Some(Value::Object(token_claims)), Value::Object(info)) =
        (state.verifier.verify(&access_token).await, &mut claims)
    {
        for (key, value) in token_claims {
            info.entry(key).or_insert(value);
        }
    }

    if feature_flags().provisioning {
        match state.security.resolve_user_info(&claims) {
            Ok(info) => match state.security.provision(&state.directory, &info).await {
                Ok(user) => tracing::info!(
                    user_id = user.id,
                    username = %user.username,
                    roles = ?user.roles,
                    "User provisioned"
                ),
                Err(e) => tracing::error!(error = %e, "User provisioning failed"),
            },
            Err(e) => tracing::info!(error = %e, "User not provisioned"),
        }
    }

    let target = match success_query {
        Some(query) => format!("{}?{query}", config.oidc.success_path),
        None => config.oidc.success_path.clone(),
    };

    let mut response = Redirect::to(&target).into_response();
    response.headers_mut().append(
        header::SET_COOKIE,
        cookies::build_handoff_cookie(&access_token, config.secure_cookies)?,
    );
    Ok(response)
}

/// Deliver the token: as a `jwt` query parameter to an external redirect, as
/// a headless login page, or as the session cookie.
pub async fn success(
    State(config): State<Arc<GatewayConfig>>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let Some(token) = cookies::extract_cookie(&headers, HANDOFF_COOKIE).filter(|t| !t.is_empty())
    else {
        tracing::debug!("Success page reached without a pending login");
        return Ok(Redirect::to(&config.oidc.login_path).into_response());
    };

    let mut response = match (&query.redirect, &query.set_cookie) {
        (Some(redirect), None) => {
            Redirect::to(&format!("{redirect}?jwt={}", urlencoding::encode(&token))).into_response()
        }
        _ if query.headless.as_deref() == Some("true") => {
            Html(headless_page(&config, &token).await?).into_response()
        }
        _ => {
            let target = query.redirect.as_deref().unwrap_or(config.pages.homepage.as_str());
            let mut response = Redirect::to(target).into_response();
            response.headers_mut().append(
                header::SET_COOKIE,
                cookies::build_session_cookie(&config.oidc.cookie_name, &token, config.secure_cookies)?,
            );
            response
        }
    };

    response
        .headers_mut()
        .append(header::SET_COOKIE, cookies::build_clear_cookie(HANDOFF_COOKIE)?);
    Ok(response)
}

async fn headless_page(config: &GatewayConfig, token: &str) -> Result<String, AppError> {
    let path = config
        .static_assets_path
        .join(config.pages.headless_login.trim_start_matches('/'));
    let html = tokio::fs::read_to_string(&path).await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Headless login page unavailable");
        AppError::internal("Headless login page unavailable")
    })?;
    Ok(html.replace("{{JWT_TOKEN}}", token))
}

/// End the session at the identity provider.
pub async fn logout(State(config): State<Arc<GatewayConfig>>) -> Redirect {
    match oauth::end_session_url(&config) {
        Some(url) => Redirect::to(&url),
        None => Redirect::to(&config.oidc.post_logout_path),
    }
}

/// Landing route after provider logout: drop the session cookie.
pub async fn post_logout(State(config): State<Arc<GatewayConfig>>) -> Result<Response, AppError> {
    let mut response = Redirect::to(&config.pages.homepage).into_response();
    response.headers_mut().append(
        header::SET_COOKIE,
        cookies::build_clear_cookie(&config.oidc.cookie_name)?,
    );
    Ok(response)
}

/// Forward-auth check for an external reverse proxy.
///
/// The addressed service is taken from `X-Forwarded-Uri` (else the request
/// path) with the `Referer` path as fallback.
#[utoipa::path(
    get,
    path = "/auth/verify",
    responses(
        (status = 204, description = "User may pass; user and service role headers are set"),
        (status = 401, description = "No verified user", body = AppError),
        (status = 403, description = "User holds no gateway role", body = AppError)
    ),
    tag = "auth"
)]
pub async fn verify(
    State(config): State<Arc<GatewayConfig>>,
    MaybeAuth(user): MaybeAuth,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, AppError> {
    if !config.auth.enabled {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    if !config.roles.authorizes(&user.roles) {
        return Err(AppError::forbidden(format!(
            "You are not authorized to access {}",
            config.app_name
        )));
    }

    let forwarded = headers
        .get("x-forwarded-uri")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(['?', '#']).next().unwrap_or_default().to_string());
    let path = forwarded.unwrap_or_else(|| uri.path().to_string());
    let referer = headers.get(header::REFERER).and_then(|v| v.to_str().ok());

    let mut response = StatusCode::NO_CONTENT.into_response();
    let out = response.headers_mut();

    if let Some(value) = user_header_value(&user) {
        if let Ok(name) = HeaderName::from_bytes(config.auth.header.as_bytes()) {
            out.insert(name, value);
        }
    }

    if let Some(service) = services::route_for(&config.services, &path, referer) {
        let roles = service.grant.granted_roles(&user).join(",");
        tracing::debug!(service = %service.name, roles = %roles, "Forward-auth granted");
        if let Ok(value) = HeaderValue::from_str(&service.name) {
            out.insert(HeaderName::from_static(SERVICE_HEADER), value);
        }
        if let Ok(value) = HeaderValue::from_str(&roles) {
            out.insert(HeaderName::from_static(SERVICE_ROLES_HEADER), value);
        }
    }

    Ok(response)
}
