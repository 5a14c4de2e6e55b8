use crate::common::*;
use axum::http::StatusCode;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn legacy_logout_goes_to_gateway_logout() {
    let app = test_app_with(&[("AUTH_ENABLED", "false")]);
    let res = get(&app, "/superset/logout/").await;
    assert_eq!(res.status, StatusCode::FOUND);
    assert_eq!(res.location(), Some("/auth/logout"));
}

#[tokio::test]
async fn user_info_moves_under_superset() {
    let app = test_app();
    let token = token_with_roles("dana", &["dashboard"]);
    let res = get_as(&app, "/user_info", &token).await;
    assert_eq!(res.status, StatusCode::FOUND);
    assert_eq!(res.location(), Some("/superset/user_info"));
}

#[tokio::test]
async fn redirects_sit_behind_access_control() {
    let app = test_app();
    let res = get(&app, "/user_info").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/auth/login"));
}

#[tokio::test]
async fn other_paths_are_untouched() {
    let app = test_app_with(&[("AUTH_ENABLED", "false")]);
    let res = get(&app, "/superset/echo").await;
    assert_eq!(res.status, StatusCode::OK);
}
