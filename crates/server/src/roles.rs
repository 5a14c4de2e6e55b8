//! Mapping identity-provider role claims onto internal roles.

use serde_json::Value;
use shared_types::{AppError, InternalRole};

use crate::claims::{self, ClaimPath};

/// Location of the role list inside the claims.
pub type RolePath = ClaimPath;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleError {
    /// None of the configured external role names is present in the claims.
    #[error("no recognized role found at claim path `{path}`")]
    AuthorizationDenied { path: String },
}

impl From<RoleError> for AppError {
    fn from(err: RoleError) -> Self {
        AppError::forbidden(err.to_string())
    }
}

/// Ordered `(external role name, internal role)` pairs; the first entry whose
/// name appears in a user's role set wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePriorityTable {
    entries: Vec<(String, InternalRole)>,
}

impl RolePriorityTable {
    /// Build a table from entries in priority order. Entries with an empty
    /// external name are dropped so an unset variable can never match.
    pub fn new(entries: impl IntoIterator<Item = (String, InternalRole)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .filter(|(name, _)| !name.is_empty())
                .collect(),
        }
    }

    /// Standard table: admin, then elevated, then standard, then public.
    pub fn from_names(
        admin: impl Into<String>,
        elevated: impl Into<String>,
        standard: impl Into<String>,
        public: impl Into<String>,
    ) -> Self {
        Self::new([
            (admin.into(), InternalRole::Admin),
            (elevated.into(), InternalRole::Alpha),
            (standard.into(), InternalRole::Gamma),
            (public.into(), InternalRole::Public),
        ])
    }

    pub fn entries(&self) -> &[(String, InternalRole)] {
        &self.entries
    }

    /// First internal role whose external name is in `roles`.
    pub fn first_match<S: AsRef<str>>(&self, roles: &[S]) -> Option<InternalRole> {
        self.entries
            .iter()
            .find(|(name, _)| roles.iter().any(|r| r.as_ref() == name))
            .map(|(_, role)| *role)
    }
}

/// Resolve the single internal role for a set of claims.
///
/// The role list is read at `path`; an absent path or a non-list value counts
/// as an empty set. Fails with [`RoleError::AuthorizationDenied`] when no
/// entry of `table` matches.
pub fn resolve_role(
    claims: &Value,
    path: &RolePath,
    table: &RolePriorityTable,
) -> Result<InternalRole, RoleError> {
    let candidates = claims::string_list_at(claims, path);
    table
        .first_match(&candidates)
        .ok_or_else(|| RoleError::AuthorizationDenied {
            path: path.to_string(),
        })
}

/// Role names that grant entry through the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRoles {
    pub admin: String,
    pub dashboard: String,
    pub dashboard_admin: String,
    pub execute: String,
    /// Filesystem roles are `<prefix>-<area>`; the bare prefix also counts.
    pub filesystem_prefix: String,
}

impl Default for GatewayRoles {
    fn default() -> Self {
        Self {
            admin: "admin".to_string(),
            dashboard: "dashboard".to_string(),
            dashboard_admin: "dashboard-admin".to_string(),
            execute: "execute".to_string(),
            filesystem_prefix: "caskfs".to_string(),
        }
    }
}

impl GatewayRoles {
    /// True if `role` lets its holder past the gateway.
    pub fn allows(&self, role: &str) -> bool {
        if [&self.admin, &self.dashboard, &self.dashboard_admin, &self.execute]
            .into_iter()
            .any(|allowed| allowed == role)
        {
            return true;
        }
        !self.filesystem_prefix.is_empty()
            && (role == self.filesystem_prefix
                || role
                    .strip_prefix(self.filesystem_prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('-')))
    }

    /// True if any of `roles` is allowed.
    pub fn authorizes<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|r| self.allows(r.as_ref()))
    }
}
