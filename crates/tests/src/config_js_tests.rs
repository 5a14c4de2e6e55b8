use crate::common::*;
use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::Value;

fn manifest(body: &str) -> Value {
    let json = body
        .strip_prefix("window.APP_CONFIG = ")
        .and_then(|rest| rest.strip_suffix(';'))
        .expect("config.js should assign window.APP_CONFIG");
    serde_json::from_str(json).unwrap()
}

fn service_names(manifest: &Value) -> Vec<String> {
    manifest["services"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn config_js_is_javascript() {
    let app = test_app_with(&[("AUTH_ENABLED", "false")]);
    let res = get(&app, "/config.js").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header("content-type"), Some("application/javascript"));

    let manifest = manifest(&res.body);
    assert_eq!(manifest["appName"], "Anduin");
    assert_eq!(manifest["user"], Value::Null);
}

#[tokio::test]
async fn lists_enabled_services_then_additional_links() {
    let links = links_fixture();
    let app = test_app_with(&[
        ("AUTH_ENABLED", "false"),
        ("ADDITIONAL_SERVICE_LINKS_CONFIG", &links),
        ("DOCS_URL", "https://docs.example.org"),
    ]);
    let manifest = manifest(&get(&app, "/config.js").await.body);

    assert_eq!(service_names(&manifest), vec!["cask", "superset", "dagster", "docs"]);
    let docs = &manifest["services"][3];
    assert_eq!(docs["link"], "https://docs.example.org/guide");
    assert_eq!(docs["target"], "_blank");

    let superset = &manifest["services"][1];
    assert_eq!(superset["link"], "/superset");
    assert_eq!(superset["title"], "Dashboards");
}

#[tokio::test]
async fn disabled_services_are_omitted() {
    let app = test_app_with(&[("AUTH_ENABLED", "false"), ("CASK_ENABLED", "false")]);
    let manifest = manifest(&get(&app, "/config.js").await.body);
    assert_eq!(service_names(&manifest), vec!["superset", "dagster"]);
}

#[tokio::test]
async fn missing_links_file_is_ignored() {
    let app = test_app_with(&[
        ("AUTH_ENABLED", "false"),
        ("ADDITIONAL_SERVICE_LINKS_CONFIG", "/no/such/links.json"),
    ]);
    let manifest = manifest(&get(&app, "/config.js").await.body);
    assert_eq!(service_names(&manifest).len(), 3);
}

#[tokio::test]
async fn signed_in_user_is_included() {
    let app = test_app();
    let token = token_with_roles("dana", &["dashboard"]);
    let res = get_as(&app, "/config.js", &token).await;
    assert_eq!(res.status, StatusCode::OK);

    let manifest = manifest(&res.body);
    assert_eq!(manifest["user"]["username"], "dana");
    assert_eq!(manifest["user"]["internal_role"], "Gamma");
}
