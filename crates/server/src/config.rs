use shared_types::{AppConfig, FeatureFlags, ServiceLink};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use crate::claims::{self, ClaimPath};
use crate::roles::{GatewayRoles, RolePath, RolePriorityTable};
use crate::services::{RoleGrant, ServiceConfig, ServiceUi};

static FLAGS: OnceLock<FeatureFlags> = OnceLock::new();

/// Path to the config file, relative to the working directory.
const CONFIG_PATH: &str = "config.toml";

/// Read `config.toml`, parse feature flags, and store them in the global
/// `OnceLock`. Only the first call has effect.
///
/// If the file is missing or unparseable, all flags default to `false`.
pub fn load_feature_flags() {
    FLAGS.get_or_init(|| match std::fs::read_to_string(CONFIG_PATH) {
        Ok(contents) => {
            let config: AppConfig = toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = CONFIG_PATH, error = %e, "Failed to parse config, defaulting all flags off");
                AppConfig::default()
            });
            tracing::info!(flags = ?config.features, "Feature flags loaded");
            config.features
        }
        Err(e) => {
            tracing::info!(path = CONFIG_PATH, error = %e, "Config file not found, defaulting all flags off");
            FeatureFlags::default()
        }
    });
}

/// Get the loaded feature flags. Returns all-false defaults if
/// `load_feature_flags()` hasn't been called yet.
pub fn feature_flags() -> &'static FeatureFlags {
    static DEFAULT: FeatureFlags = FeatureFlags {
        telemetry: false,
        provisioning: false,
    };
    FLAGS.get().unwrap_or(&DEFAULT)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not a valid port: {value}")]
    InvalidPort { var: &'static str, value: String },
    #[error("{var} is not a valid number of seconds: {value}")]
    InvalidSeconds { var: &'static str, value: String },
    #[error("auth is enabled but neither OIDC_BASE_URL nor OIDC_JWT_SECRET is set")]
    NoTokenVerifier,
}

/// Settings for mapping claims to the BI application's internal role.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Name of the BI application, used in denial messages.
    pub app_name: String,
    pub role_path: RolePath,
    pub table: RolePriorityTable,
}

#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Realm URL of the identity provider, e.g. `https://idp/realms/main`.
    /// When unset, tokens are verified with `jwt_secret` instead of JWKS.
    pub base_url: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: String,
    /// HS256 secret, only read when there is no provider URL.
    pub jwt_secret: Option<String>,
    pub login_path: String,
    pub logout_path: String,
    pub success_path: String,
    pub callback_path: String,
    pub post_logout_path: String,
    pub cookie_name: String,
    pub roles_paths: Vec<ClaimPath>,
    pub first_name_path: ClaimPath,
    pub last_name_path: ClaimPath,
    pub email_path: ClaimPath,
    pub username_path: ClaimPath,
    pub role_ignore_list: Vec<String>,
    pub token_cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub enabled: bool,
    /// Header carrying the serialized user to downstream services.
    pub header: String,
}

#[derive(Debug, Clone)]
pub struct PagesConfig {
    pub unauthorized: String,
    pub headless_login: String,
    pub homepage: String,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Exact-path redirects applied before routing; keys have no trailing slash.
    pub manual_redirects: BTreeMap<String, String>,
    /// Client `x-*` headers that survive sanitisation; a trailing `*` matches
    /// by prefix.
    pub allowed_x_headers: Vec<String>,
}

/// Gateway configuration, read once from the environment at startup and
/// shared through `AppState`.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub app_name: String,
    pub app_url: String,
    pub port: u16,
    pub static_assets_path: PathBuf,
    pub secure_cookies: bool,
    pub additional_links: Vec<ServiceLink>,
    pub proxy: ProxyConfig,
    pub pages: PagesConfig,
    pub roles: GatewayRoles,
    pub auth: AuthConfig,
    pub oidc: OidcConfig,
    pub resolver: ResolverConfig,
    pub services: Vec<ServiceConfig>,
    pub database_url: Option<String>,
}

impl GatewayConfig {
    /// Load from process environment variables (after `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let flag_not_false = |key: &str| var(key).map(|v| v != "false").unwrap_or(true);

        let app_url = or("ANDUIN_APP_URL", "http://localhost:4000");

        let port = match var("PORT") {
            Some(raw) => clean_k8s_port(&raw).ok_or(ConfigError::InvalidPort {
                var: "PORT",
                value: raw,
            })?,
            None => 3000,
        };

        let token_cache_ttl = match var("OIDC_TOKEN_CACHE_TTL") {
            Some(raw) => Duration::from_secs(raw.parse().map_err(|_| {
                ConfigError::InvalidSeconds {
                    var: "OIDC_TOKEN_CACHE_TTL",
                    value: raw.clone(),
                }
            })?),
            None => Duration::from_secs(30),
        };

        let roles_paths = match var("OIDC_ROLES_CLAIM_PATHS") {
            Some(list) => claims::parse_path_list(&list),
            None => claims::parse_path_list("resource_access.anduin.roles,roles"),
        };

        let roles = GatewayRoles {
            admin: or("ADMIN_ROLE", "admin"),
            dashboard: or("ANDUIN_DASHBOARD_ROLE", "dashboard"),
            dashboard_admin: or("ANDUIN_DASHBOARD_ADMIN_ROLE", "dashboard-admin"),
            execute: or("ANDUIN_EXECUTE_ROLE", "execute"),
            filesystem_prefix: or("ANDUIN_FILESYSTEM_ROLE_PREFIX", "caskfs"),
        };

        let services = vec![
            ServiceConfig {
                name: "cask".to_string(),
                enabled: flag_not_false("CASK_ENABLED"),
                url: or("CASK_URL", "http://cask:3001"),
                path_prefix: or("CASK_PATH_PREFIX", "/cask"),
                ui: ServiceUi {
                    title: "Files".to_string(),
                    subtitle: "CaskFs".to_string(),
                    icon: "fas fa-file".to_string(),
                    color: "sage".to_string(),
                },
                grant: RoleGrant::Prefixed {
                    prefix: roles.filesystem_prefix.clone(),
                    admin: roles.admin.clone(),
                },
            },
            ServiceConfig {
                name: "superset".to_string(),
                enabled: flag_not_false("SUPERSET_ENABLED"),
                url: or("SUPERSET_URL", "http://superset:8088"),
                path_prefix: or("SUPERSET_PATH_PREFIX", "/superset"),
                ui: ServiceUi {
                    title: "Dashboards".to_string(),
                    subtitle: "Superset".to_string(),
                    icon: "fas fa-chart-bar".to_string(),
                    color: "poppy".to_string(),
                },
                grant: RoleGrant::AllowList(vec![
                    roles.dashboard.clone(),
                    roles.dashboard_admin.clone(),
                    roles.admin.clone(),
                ]),
            },
            ServiceConfig {
                name: "dagster".to_string(),
                enabled: flag_not_false("DAGSTER_ENABLED"),
                url: or("DAGSTER_URL", "http://dagster:3000"),
                path_prefix: or("DAGSTER_PATH_PREFIX", "/dagster"),
                ui: ServiceUi {
                    title: "Execute".to_string(),
                    subtitle: "Dagster".to_string(),
                    icon: "fas fa-code".to_string(),
                    color: "rec-pool".to_string(),
                },
                grant: RoleGrant::AllowList(vec![roles.execute.clone(), roles.admin.clone()]),
            },
        ];

        let additional_links = match var("ADDITIONAL_SERVICE_LINKS_CONFIG") {
            Some(path) => load_additional_links(&path, &lookup),
            None => Vec::new(),
        };

        let manual_redirects = [
            ("/superset/logout", "/auth/logout"),
            (
                "/static/assets/images/superset-logo-horiz.png",
                "/superset/static/assets/images/superset-logo-horiz.png",
            ),
            ("/user_info", "/superset/user_info"),
            (
                "/superset/superset/api/v1/chart/data",
                "/superset/api/v1/chart/data",
            ),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();

        let config = Self {
            app_name: or("APP_NAME", "Anduin"),
            secure_cookies: app_url.starts_with("https://"),
            app_url,
            port,
            static_assets_path: PathBuf::from(or("STATIC_ASSETS_FOLDER", "client")),
            additional_links,
            proxy: ProxyConfig {
                manual_redirects,
                allowed_x_headers: vec!["x-csrftoken".to_string(), "x-forwarded-*".to_string()],
            },
            pages: PagesConfig {
                unauthorized: or("UNAUTHORIZED_PAGE", "/unauthorized.html"),
                headless_login: or("HEADLESS_LOGIN_PAGE", "/headless.html"),
                homepage: or("HOMEPAGE", "/"),
            },
            roles,
            auth: AuthConfig {
                enabled: flag_not_false("AUTH_ENABLED"),
                header: or("AUTH_HEADER", "x-anduin-user").to_lowercase(),
            },
            oidc: OidcConfig {
                base_url: var("OIDC_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
                client_id: or("OIDC_CLIENT_ID", ""),
                client_secret: or("OIDC_CLIENT_SECRET", ""),
                scopes: or("OIDC_SCOPES", "openid profile email"),
                jwt_secret: var("OIDC_JWT_SECRET"),
                login_path: or("OIDC_LOGIN_PATH", "/auth/login"),
                logout_path: or("OIDC_LOGOUT_PATH", "/auth/logout"),
                success_path: or("OIDC_SUCCESS_PATH", "/auth/success"),
                callback_path: "/auth/callback".to_string(),
                post_logout_path: "/auth/postLogoutRedirect".to_string(),
                cookie_name: or("OIDC_COOKIE_NAME", "anduin-jwt"),
                roles_paths,
                first_name_path: ClaimPath::parse(&or("OIDC_FIRST_NAME_CLAIM_PATH", "given_name")),
                last_name_path: ClaimPath::parse(&or("OIDC_LAST_NAME_CLAIM_PATH", "family_name")),
                email_path: ClaimPath::parse(&or("OIDC_EMAIL_CLAIM_PATH", "email")),
                username_path: ClaimPath::parse(&or(
                    "OIDC_USERNAME_CLAIM_PATH",
                    "preferred_username",
                )),
                role_ignore_list: var("OIDC_ROLE_IGNORE_LIST")
                    .map(|list| {
                        list.split(',')
                            .map(str::trim)
                            .filter(|r| !r.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                token_cache_ttl,
            },
            resolver: ResolverConfig {
                app_name: or("BI_APP_NAME", "Superset"),
                role_path: RolePath::parse(&or(
                    "KEYCLOAK_ROLE_DOT_PATH",
                    "resource_access.aggie-experts.roles",
                )),
                table: RolePriorityTable::from_names(
                    or("KEYCLOAK_ADMIN_ROLE", "admin"),
                    or("KEYCLOAK_ELEVATED_ROLE", "dashboard-admin"),
                    or("KEYCLOAK_STANDARD_ROLE", "dashboard"),
                    or("KEYCLOAK_PUBLIC_ROLE", "public"),
                ),
            },
            services,
            database_url: var("DATABASE_URL"),
        };

        if config.auth.enabled
            && config.oidc.base_url.is_none()
            && config.oidc.jwt_secret.is_none()
        {
            return Err(ConfigError::NoTokenVerifier);
        }
        Ok(config)
    }
}

#[cfg(test)]
impl GatewayConfig {
    /// Defaults plus a shared token secret.
    pub(crate) fn for_tests() -> Self {
        Self::from_lookup(|key| (key == "OIDC_JWT_SECRET").then(|| "unit-test-secret".to_string()))
            .expect("test config should load")
    }
}

/// Parse a port that may be given in Kubernetes service-link form
/// (`tcp://10.0.0.1:3000`).
pub fn clean_k8s_port(value: &str) -> Option<u16> {
    let value = value.trim();
    let port = if value.starts_with("tcp:") {
        value.rsplit(':').next()?
    } else {
        value
    };
    port.parse().ok()
}

/// Read the additional nav links file: JSON after `${VAR}` substitution.
/// A missing or malformed file is logged and yields no links.
pub fn load_additional_links<F>(path: &str, lookup: F) -> Vec<ServiceLink>
where
    F: Fn(&str) -> Option<String>,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path, error = %e, "ADDITIONAL_SERVICE_LINKS_CONFIG could not be read");
            return Vec::new();
        }
    };

    let substituted = substitute_env(&contents, lookup);
    serde_json::from_str(&substituted).unwrap_or_else(|e| {
        tracing::error!(path, error = %e, "Error parsing ADDITIONAL_SERVICE_LINKS_CONFIG");
        Vec::new()
    })
}

/// Replace `${NAME}` (NAME = word characters) with the variable's value, or
/// nothing when unset. Other text, including malformed references, is kept.
pub fn substitute_env<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end)
                if end > 0
                    && after[..end]
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_') =>
            {
                out.push_str(&lookup(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
