//! Backend services fronted by the gateway and the portal manifest that
//! advertises them.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use shared_types::{AppManifest, GatewayUser, ServiceLink};

use crate::auth::extractors::MaybeAuth;
use crate::config::GatewayConfig;
use std::sync::Arc;

/// How a service derives its own roles from a gateway user's roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleGrant {
    /// The user's roles that appear in this list, matched ignoring ASCII case.
    /// Granted names use the list's spelling.
    AllowList(Vec<String>),
    /// `<prefix>-<area>` grants `<area>`; the admin role grants `admin`.
    Prefixed { prefix: String, admin: String },
}

impl RoleGrant {
    pub fn granted_roles(&self, user: &GatewayUser) -> Vec<String> {
        match self {
            RoleGrant::AllowList(allowed) => allowed
                .iter()
                .filter(|role| user.has_role(role))
                .cloned()
                .collect(),
            RoleGrant::Prefixed { prefix, admin } => {
                let marker = format!("{}-", prefix.to_lowercase());
                user.roles
                    .iter()
                    .map(|r| r.to_lowercase())
                    .filter_map(|role| {
                        if let Some(area) = role.strip_prefix(marker.as_str()) {
                            Some(area.to_string())
                        } else if role.eq_ignore_ascii_case(admin) {
                            Some(admin.clone())
                        } else {
                            None
                        }
                    })
                    .collect()
            }
        }
    }
}

/// Presentation metadata for the portal navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUi {
    pub title: String,
    pub subtitle: String,
    pub icon: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub name: String,
    pub enabled: bool,
    pub url: String,
    pub path_prefix: String,
    pub ui: ServiceUi,
    pub grant: RoleGrant,
}

impl ServiceConfig {
    /// True if `path` is the prefix itself or lies beneath it.
    pub fn matches_path(&self, path: &str) -> bool {
        match path.strip_prefix(self.path_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Nav link advertised in the manifest.
    pub fn link(&self) -> ServiceLink {
        ServiceLink {
            name: self.name.clone(),
            link: self.path_prefix.clone(),
            title: self.ui.title.clone(),
            subtitle: self.ui.subtitle.clone(),
            icon: self.ui.icon.clone(),
            color: self.ui.color.clone(),
            extra: Default::default(),
        }
    }
}

/// Find the enabled service addressed by `path`, falling back to the path of
/// the `Referer` URL so assets requested by a service page route back to it.
pub fn route_for<'a>(
    services: &'a [ServiceConfig],
    path: &str,
    referer: Option<&str>,
) -> Option<&'a ServiceConfig> {
    let referer_path = referer.map(referer_path).unwrap_or_default();
    services
        .iter()
        .filter(|s| s.enabled)
        .find(|s| s.matches_path(path) || s.matches_path(&referer_path))
}

/// Path component of a Referer value; absolute URLs are stripped of scheme
/// and authority, anything unparseable is used verbatim.
fn referer_path(referer: &str) -> String {
    let without_scheme = match referer.split_once("://") {
        Some((_, rest)) => match rest.find('/') {
            Some(idx) => &rest[idx..],
            None => "/",
        },
        None => referer,
    };
    without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Build the portal manifest: enabled services followed by additional links.
pub fn manifest(config: &GatewayConfig, user: Option<GatewayUser>) -> AppManifest {
    let services = config
        .services
        .iter()
        .filter(|s| s.enabled)
        .map(ServiceConfig::link)
        .chain(config.additional_links.iter().cloned())
        .collect();

    AppManifest {
        app_name: config.app_name.clone(),
        user,
        services,
    }
}

/// Handler for `/config.js`: the manifest as a script assigning `window.APP_CONFIG`.
pub async fn config_js(
    State(config): State<Arc<GatewayConfig>>,
    MaybeAuth(user): MaybeAuth,
) -> impl IntoResponse {
    let manifest = manifest(&config, user);
    let json = serde_json::to_string(&manifest).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize app manifest");
        "{}".to_string()
    });

    (
        [(header::CONTENT_TYPE, "application/javascript")],
        format!("window.APP_CONFIG = {json};"),
    )
}
