use crate::common::*;
use axum::http::StatusCode;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn anonymous_is_unauthorized() {
    let app = test_app();
    let res = get_with(&app, "/auth/verify", &[("x-forwarded-uri", "/superset/welcome")]).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.json()["kind"], "Unauthorized");
}

#[tokio::test]
async fn user_without_gateway_role_is_forbidden() {
    let app = test_app();
    let token = token_with_roles("pat", &["public"]);
    let res = get_as(&app, "/auth/verify", &token).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.json()["message"], "You are not authorized to access Anduin");
}

#[tokio::test]
async fn authorized_user_gets_service_roles() {
    let app = test_app();
    let token = token_with_roles("ada", &["Admin", "dashboard", "execute"]);
    let cookie = format!("anduin-jwt={token}");
    let res = get_with(
        &app,
        "/auth/verify",
        &[("cookie", &cookie), ("x-forwarded-uri", "/dagster/runs?page=2")],
    )
    .await;

    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert_eq!(res.header("x-anduin-service"), Some("dagster"));
    assert_eq!(res.header("x-anduin-service-roles"), Some("execute,admin"));

    let user: serde_json::Value = serde_json::from_str(res.header("x-anduin-user").unwrap()).unwrap();
    assert_eq!(user["username"], "ada");
}

#[tokio::test]
async fn referer_picks_the_service_for_shared_assets() {
    let app = test_app();
    let token = token_with_roles("dana", &["dashboard-admin"]);
    let cookie = format!("anduin-jwt={token}");
    let res = get_with(
        &app,
        "/auth/verify",
        &[
            ("cookie", &cookie),
            ("x-forwarded-uri", "/static/app.js"),
            ("referer", "https://portal.example.org/superset/dashboard/3/"),
        ],
    )
    .await;

    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert_eq!(res.header("x-anduin-service"), Some("superset"));
    assert_eq!(res.header("x-anduin-service-roles"), Some("dashboard-admin"));
}

#[tokio::test]
async fn filesystem_roles_drop_their_prefix() {
    let app = test_app();
    let token = token_with_roles("fin", &["caskfs-lab", "caskfs-archive"]);
    let cookie = format!("anduin-jwt={token}");
    let res = get_with(
        &app,
        "/auth/verify",
        &[("cookie", &cookie), ("x-forwarded-uri", "/cask/files/a.txt")],
    )
    .await;

    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert_eq!(res.header("x-anduin-service"), Some("cask"));
    assert_eq!(res.header("x-anduin-service-roles"), Some("lab,archive"));
}

#[tokio::test]
async fn unmatched_path_has_no_service_headers() {
    let app = test_app();
    let token = token_with_roles("ada", &["admin"]);
    let cookie = format!("anduin-jwt={token}");
    let res = get_with(&app, "/auth/verify", &[("cookie", &cookie), ("x-forwarded-uri", "/")]).await;

    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert!(res.header("x-anduin-service").is_none());
    assert!(res.header("x-anduin-user").is_some());
}

#[tokio::test]
async fn disabled_auth_always_passes() {
    let app = test_app_with(&[("AUTH_ENABLED", "false")]);
    let res = get(&app, "/auth/verify").await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
}
