//! Authorization-code + PKCE client for the identity provider, which is
//! addressed through its Keycloak-style realm URL.

use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use serde_json::Value;
use shared_types::AppError;

use super::oauth_state::OAuthStateStore;
use crate::config::GatewayConfig;

/// Concrete OAuth client type with auth URL, token URL, and redirect URL set.
type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

fn realm_url(config: &GatewayConfig) -> Result<&str, AppError> {
    config
        .oidc
        .base_url
        .as_deref()
        .ok_or_else(|| AppError::internal("OIDC_BASE_URL is not configured"))
}

/// Build an OAuth2 client for the configured provider.
pub fn build_oauth_client(config: &GatewayConfig) -> Result<ConfiguredClient, AppError> {
    let base = realm_url(config)?;
    let oidc = &config.oidc;
    let invalid = |e: oauth2::url::ParseError| AppError::internal(format!("Invalid OIDC URL: {e}"));

    let client = BasicClient::new(ClientId::new(oidc.client_id.clone()))
        .set_client_secret(ClientSecret::new(oidc.client_secret.clone()))
        .set_auth_uri(AuthUrl::new(format!("{base}/protocol/openid-connect/auth")).map_err(invalid)?)
        .set_token_uri(TokenUrl::new(format!("{base}/protocol/openid-connect/token")).map_err(invalid)?)
        .set_redirect_uri(
            RedirectUrl::new(format!("{}{}", config.app_url, oidc.callback_path)).map_err(invalid)?,
        );

    Ok(client)
}

/// Generate the provider authorization URL and store the CSRF state in
/// `states`. `success_query` is replayed onto the success page after the
/// callback.
pub async fn get_authorize_url(
    config: &GatewayConfig,
    states: &OAuthStateStore,
    success_query: Option<String>,
) -> Result<String, AppError> {
    let client = build_oauth_client(config)?;
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let mut auth_request = client
        .authorize_url(CsrfToken::new_random)
        .set_pkce_challenge(pkce_challenge);

    for scope in config.oidc.scopes.split_whitespace() {
        auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
    }

    let (url, csrf) = auth_request.url();
    states.store(csrf.secret().clone(), pkce_verifier, success_query).await;

    Ok(url.to_string())
}

fn http_client() -> Result<reqwest::Client, AppError> {
    // The token endpoint must not be followed through redirects.
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| AppError::internal(format!("HTTP client error: {e}")))
}

/// Exchange an authorization code for the provider's access token.
pub async fn exchange_code(
    config: &GatewayConfig,
    code: String,
    verifier: PkceCodeVerifier,
) -> Result<String, AppError> {
    let client = build_oauth_client(config)?;
    let token_response = client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(verifier)
        .request_async(&http_client()?)
        .await
        .map_err(|e| AppError::upstream(format!("Token exchange failed: {e}")))?;

    Ok(token_response.access_token().secret().clone())
}

/// Fetch the userinfo document for an access token.
pub async fn fetch_user_info(config: &GatewayConfig, access_token: &str) -> Result<Value, AppError> {
    let base = realm_url(config)?;
    http_client()?
        .get(format!("{base}/protocol/openid-connect/userinfo"))
        .bearer_auth(access_token)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| AppError::upstream(format!("Failed to fetch user info: {e}")))?
        .json()
        .await
        .map_err(|e| AppError::upstream(format!("Failed to parse user info: {e}")))
}

/// Provider end-session URL returning the browser to the post-logout route,
/// or `None` when no provider is configured.
pub fn end_session_url(config: &GatewayConfig) -> Option<String> {
    let base = config.oidc.base_url.as_deref()?;
    let return_to = format!("{}{}", config.app_url, config.oidc.post_logout_path);
    Some(format!(
        "{base}/protocol/openid-connect/logout?client_id={}&post_logout_redirect_uri={}",
        urlencoding::encode(&config.oidc.client_id),
        urlencoding::encode(&return_to),
    ))
}
