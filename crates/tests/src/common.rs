use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    routing, Json, Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{Map, Value};
use server::config::GatewayConfig;
use server::db::AppState;
use std::collections::HashMap;
use tower::ServiceExt;

/// Shared secret the test gateway verifies tokens with.
pub const TEST_SECRET: &str = "integration-test-secret";

fn client_dir() -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../client").to_string()
}

pub fn links_fixture() -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/additional_links.json").to_string()
}

/// Gateway config from defaults plus `vars`; tokens are HS256-signed with
/// [`TEST_SECRET`] and static pages come from the workspace `client/` folder.
pub fn test_config(vars: &[(&str, &str)]) -> GatewayConfig {
    let mut map: HashMap<String, String> = HashMap::from([
        ("OIDC_JWT_SECRET".to_string(), TEST_SECRET.to_string()),
        ("STATIC_ASSETS_FOLDER".to_string(), client_dir()),
    ]);
    for (key, value) in vars {
        map.insert(key.to_string(), value.to_string());
    }
    GatewayConfig::from_lookup(|key| map.get(key).cloned()).expect("test config should load")
}

/// Echo the `x-*` request headers a backend service would receive.
async fn echo_headers(headers: HeaderMap) -> Json<Value> {
    let seen: Map<String, Value> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-"))
        .map(|(name, value)| {
            (
                name.to_string(),
                Value::String(String::from_utf8_lossy(value.as_bytes()).to_string()),
            )
        })
        .collect();
    Json(Value::Object(seen))
}

/// Full gateway router, plus `/superset/echo` and `/dagster/echo` standing in
/// for proxied backends.
pub fn test_app_with(vars: &[(&str, &str)]) -> Router {
    app_from_config(test_config(vars))
}

pub fn app_from_config(config: GatewayConfig) -> Router {
    let state = AppState::new(config, None);
    let routes = server::router::gateway_routes(&state.config)
        .route("/superset/echo", routing::get(echo_headers))
        .route("/dagster/echo", routing::get(echo_headers));
    server::router::with_gateway_layers(routes, state)
}

pub fn test_app() -> Router {
    test_app_with(&[])
}

/// Sign `claims` with the test secret, adding a one-hour `exp` when absent.
pub fn mint_token(mut claims: Value) -> String {
    if let Value::Object(map) = &mut claims {
        map.entry("exp")
            .or_insert_with(|| Value::from(chrono::Utc::now().timestamp() + 3600));
    }
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("token should encode")
}

/// Token for a user called `username` holding `roles` (top-level claim).
pub fn token_with_roles(username: &str, roles: &[&str]) -> String {
    mint_token(serde_json::json!({
        "preferred_username": username,
        "email": format!("{username}@example.edu"),
        "roles": roles,
    }))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.header(header::LOCATION.as_str())
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::String(self.body.clone()))
    }
}

/// GET `uri` with extra request headers.
pub async fn get_with(app: &Router, uri: &str, headers: &[(&str, &str)]) -> TestResponse {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

pub async fn get(app: &Router, uri: &str) -> TestResponse {
    get_with(app, uri, &[]).await
}

/// GET `uri` with the session cookie set to `token`.
pub async fn get_as(app: &Router, uri: &str, token: &str) -> TestResponse {
    let cookie = format!("anduin-jwt={token}");
    get_with(app, uri, &[("cookie", &cookie)]).await
}

/// Send a request through the router and collect the response.
pub async fn send(app: &Router, req: Request<Body>) -> TestResponse {
    let response = app
        .clone()
        .oneshot(req)
        .await
        .expect("Failed to send request");

    let status = response.status();
    let headers = response.headers().clone();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");

    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&body_bytes).to_string(),
    }
}
