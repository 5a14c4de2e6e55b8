use crate::common::*;
use axum::http::StatusCode;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn anonymous_request_is_sent_to_login() {
    let app = test_app();
    let res = get(&app, "/superset/echo").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/auth/login"));
}

#[tokio::test]
async fn invalid_token_counts_as_anonymous() {
    let app = test_app();
    let res = get_as(&app, "/superset/echo", "not.a.jwt").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/auth/login"));
}

#[tokio::test]
async fn expired_token_counts_as_anonymous() {
    let app = test_app();
    let token = mint_token(serde_json::json!({
        "preferred_username": "old",
        "roles": ["admin"],
        "exp": chrono::Utc::now().timestamp() - 3600,
    }));
    let res = get_as(&app, "/superset/echo", &token).await;
    assert_eq!(res.location(), Some("/auth/login"));
}

#[tokio::test]
async fn user_without_gateway_role_is_sent_to_unauthorized_page() {
    let app = test_app();
    let token = token_with_roles("pat", &["public", "offline_access"]);
    let res = get_as(&app, "/superset/echo", &token).await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/unauthorized.html"));
}

#[tokio::test]
async fn authorized_user_reaches_service_with_user_header() {
    let app = test_app();
    let token = token_with_roles("dana", &["dashboard"]);
    let res = get_as(&app, "/superset/echo", &token).await;
    assert_eq!(res.status, StatusCode::OK);

    let seen = res.json();
    let user: serde_json::Value =
        serde_json::from_str(seen["x-anduin-user"].as_str().unwrap()).unwrap();
    assert_eq!(user["username"], "dana");
    assert_eq!(user["roles"], serde_json::json!(["dana", "dashboard"]));
    assert_eq!(user["internal_role"], "Gamma");
    assert_eq!(user["email"], "dana@example.edu");
}

#[tokio::test]
async fn bearer_token_is_accepted() {
    let app = test_app();
    let token = token_with_roles("eve", &["execute"]);
    let auth = format!("bearer {token}");
    let res = get_with(&app, "/dagster/echo", &[("authorization", &auth)]).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.json()["x-anduin-user"].is_string());
}

#[tokio::test]
async fn filesystem_role_counts_as_gateway_role() {
    let app = test_app();
    let token = token_with_roles("fin", &["caskfs-lab"]);
    let res = get_as(&app, "/superset/echo", &token).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn ignored_roles_do_not_authorize() {
    let app = test_app_with(&[("OIDC_ROLE_IGNORE_LIST", "execute")]);
    let token = token_with_roles("ivy", &["execute"]);
    let res = get_as(&app, "/dagster/echo", &token).await;
    assert_eq!(res.location(), Some("/unauthorized.html"));
}

#[tokio::test]
async fn auth_disabled_lets_anonymous_through() {
    let app = test_app_with(&[("AUTH_ENABLED", "false")]);
    let res = get(&app, "/superset/echo").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.json().get("x-anduin-user").is_none());
}

#[tokio::test]
async fn health_is_public() {
    let app = test_app();
    let res = get(&app, "/health").await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db"], "disabled");
}

#[tokio::test]
async fn unauthorized_page_is_served_without_a_user() {
    let app = test_app();
    let res = get(&app, "/unauthorized.html").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("Not authorized"));
}

#[tokio::test]
async fn openapi_document_lists_gateway_endpoints() {
    let app = test_app_with(&[("AUTH_ENABLED", "false")]);
    let res = get(&app, "/api-docs/openapi.json").await;
    assert_eq!(res.status, StatusCode::OK);
    let doc = res.json();
    assert!(doc["paths"]["/health"].is_object());
    assert!(doc["paths"]["/auth/verify"].is_object());
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = test_app();
    let res = get(&app, "/health").await;
    assert!(res.header("x-request-id").is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn gateway_refuses_to_start_without_a_token_verifier() {
    let result = server::config::GatewayConfig::from_lookup(|_| None);
    assert!(matches!(
        result,
        Err(server::config::ConfigError::NoTokenVerifier)
    ));
}

#[tokio::test]
async fn tokens_signed_with_a_guessable_secret_are_ignored() {
    let config = server::config::GatewayConfig::from_lookup(|key| {
        (key == "AUTH_ENABLED").then(|| "false".to_string())
    })
    .expect("config without auth should load");
    let app = app_from_config(config);

    let forged = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &serde_json::json!({
            "preferred_username": "mallory",
            "roles": ["admin"],
            "exp": chrono::Utc::now().timestamp() + 3600,
        }),
        &jsonwebtoken::EncodingKey::from_secret(b"abcd1234"),
    )
    .unwrap();

    let res = get_as(&app, "/config.js", &forged).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("\"user\":null"));
}
