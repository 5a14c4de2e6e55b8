use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Privilege tiers of the BI application, independent of the identity
/// provider's own role vocabulary. Serialized with the BI host's role names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum InternalRole {
    /// Administrative access.
    Admin,
    /// Elevated user: may create and edit shared content.
    Alpha,
    /// Standard user.
    Gamma,
    Public,
}

impl InternalRole {
    /// All roles, most privileged first.
    pub const ALL: [InternalRole; 4] = [
        InternalRole::Admin,
        InternalRole::Alpha,
        InternalRole::Gamma,
        InternalRole::Public,
    ];

    /// Role name as known to the BI host.
    pub fn as_str(&self) -> &'static str {
        match self {
            InternalRole::Admin => "Admin",
            InternalRole::Alpha => "Alpha",
            InternalRole::Gamma => "Gamma",
            InternalRole::Public => "Public",
        }
    }
}

impl std::fmt::Display for InternalRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User attributes extracted from identity-provider claims, ready for the
/// host's find-or-create call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserInfo {
    /// Stable identifier; the email address, empty when the claim is absent.
    pub id: String,
    pub username: Option<String>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Internal role chosen by the role resolver.
    pub role: InternalRole,
}

/// A user record held by a user directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectoryUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<String>,
}

/// The authenticated user as seen by the gateway and forwarded downstream in
/// the trusted user header.
///
/// The remaining token claims are flattened next to the derived fields so the
/// header carries the same shape as the verified token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GatewayUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_role: Option<InternalRole>,
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl GatewayUser {
    /// True if any of the user's roles matches `role`, ignoring ASCII case.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// A link rendered in the portal navigation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceLink {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
    /// Fields of externally configured links that the gateway passes through as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of `/config.js`, assigned to `window.APP_CONFIG`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    pub app_name: String,
    pub user: Option<GatewayUser>,
    pub services: Vec<ServiceLink>,
}
