use crate::common::*;
use axum::http::StatusCode;
use pretty_assertions::assert_eq;

const IDP: &str = "https://idp.example.org/realms/main";

fn handoff(token: &str) -> String {
    format!("anduin-handoff={token}")
}

fn clears(cookies: &[String], name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{name}=;")) && c.contains("Max-Age=0"))
}

#[tokio::test]
async fn success_without_pending_login_restarts_it() {
    let app = test_app();
    let res = get(&app, "/auth/success").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/auth/login"));
}

#[tokio::test]
async fn success_sets_session_cookie_and_goes_home() {
    let app = test_app();
    let token = token_with_roles("dana", &["dashboard"]);
    let res = get_with(&app, "/auth/success", &[("cookie", &handoff(&token))]).await;

    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/"));

    let cookies = res.set_cookies();
    let session = cookies
        .iter()
        .find(|c| c.starts_with("anduin-jwt="))
        .expect("session cookie");
    assert!(session.contains(&token));
    assert!(session.contains("HttpOnly"));
    assert!(clears(&cookies, "anduin-handoff"));
}

#[tokio::test]
async fn success_hands_token_to_external_redirect() {
    let app = test_app();
    let token = token_with_roles("dana", &["dashboard"]);
    let res = get_with(
        &app,
        "/auth/success?redirect=https://tool.example.org/cb",
        &[("cookie", &handoff(&token))],
    )
    .await;

    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(
        res.location(),
        Some(format!("https://tool.example.org/cb?jwt={token}").as_str())
    );
    let cookies = res.set_cookies();
    assert!(!cookies.iter().any(|c| c.starts_with("anduin-jwt=")));
    assert!(clears(&cookies, "anduin-handoff"));
}

#[tokio::test]
async fn success_with_set_cookie_keeps_token_in_cookie() {
    let app = test_app();
    let token = token_with_roles("dana", &["dashboard"]);
    let res = get_with(
        &app,
        "/auth/success?redirect=/superset/welcome&set-cookie=true",
        &[("cookie", &handoff(&token))],
    )
    .await;

    assert_eq!(res.location(), Some("/superset/welcome"));
    assert!(res
        .set_cookies()
        .iter()
        .any(|c| c.starts_with(&format!("anduin-jwt={token}"))));
}

#[tokio::test]
async fn headless_success_renders_token_page() {
    let app = test_app();
    let token = token_with_roles("bot", &["execute"]);
    let res = get_with(
        &app,
        "/auth/success?headless=true",
        &[("cookie", &handoff(&token))],
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains(&token));
    assert!(!res.body.contains("{{JWT_TOKEN}}"));
    assert!(clears(&res.set_cookies(), "anduin-handoff"));
}

#[tokio::test]
async fn login_requires_an_identity_provider() {
    let app = test_app();
    let res = get(&app, "/auth/login").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json()["kind"], "InternalError");
}

#[tokio::test]
async fn login_redirects_to_identity_provider() {
    let app = test_app_with(&[("OIDC_BASE_URL", IDP), ("OIDC_CLIENT_ID", "anduin")]);
    let res = get(&app, "/auth/login?redirect=/dagster").await;

    assert_eq!(res.status, StatusCode::SEE_OTHER);
    let location = res.location().unwrap();
    assert!(location.starts_with(&format!("{IDP}/protocol/openid-connect/auth?")));
    assert!(location.contains("client_id=anduin"));
    assert!(location.contains("code_challenge_method=S256"));
}

#[tokio::test]
async fn callback_with_unknown_state_is_rejected() {
    let app = test_app_with(&[("OIDC_BASE_URL", IDP)]);
    let res = get(&app, "/auth/callback?code=abc&state=never-issued").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["kind"], "BadRequest");
}

#[tokio::test]
async fn logout_goes_to_identity_provider() {
    let app = test_app_with(&[
        ("OIDC_BASE_URL", IDP),
        ("OIDC_CLIENT_ID", "anduin"),
        ("ANDUIN_APP_URL", "https://portal.example.org"),
    ]);
    let res = get(&app, "/auth/logout").await;

    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(
        res.location(),
        Some(
            "https://idp.example.org/realms/main/protocol/openid-connect/logout?client_id=anduin\
             &post_logout_redirect_uri=https%3A%2F%2Fportal.example.org%2Fauth%2FpostLogoutRedirect"
        )
    );
}

#[tokio::test]
async fn logout_without_provider_skips_to_post_logout() {
    let app = test_app();
    let res = get(&app, "/auth/logout").await;
    assert_eq!(res.location(), Some("/auth/postLogoutRedirect"));
}

#[tokio::test]
async fn post_logout_clears_session() {
    let app = test_app();
    let res = get(&app, "/auth/postLogoutRedirect").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/"));
    assert!(clears(&res.set_cookies(), "anduin-jwt"));
}

#[tokio::test]
async fn login_state_belongs_to_the_issuing_gateway() {
    let vars = [("OIDC_BASE_URL", IDP), ("OIDC_CLIENT_ID", "anduin")];
    let issuing = test_app_with(&vars);
    let other = test_app_with(&vars);

    let res = get(&issuing, "/auth/login").await;
    let location = res.location().unwrap().to_string();
    let state = location
        .split(['?', '&'])
        .find_map(|pair| pair.strip_prefix("state="))
        .expect("authorize URL should carry a state");

    let res = get(&other, &format!("/auth/callback?code=abc&state={state}")).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}
