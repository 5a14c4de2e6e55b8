//! Translating identity-provider claims into BI users and roles.
//!
//! [`SecurityManager`] is the capability a BI host needs from an identity
//! integration: who the user is and which internal role they get.
//! [`ClaimsSecurityManager`] implements it over configurable claim paths and
//! adds the provisioning step that writes the result to a [`UserDirectory`].

use serde_json::Value;
use shared_types::{AppError, DirectoryUser, InternalRole, UserInfo};

use crate::claims::{self, ClaimPath};
use crate::config::{OidcConfig, ResolverConfig};
use crate::directory::UserDirectory;
use crate::roles::{self, RoleError, RolePath, RolePriorityTable};

pub trait SecurityManager {
    /// Extract the user attributes and resolved role from `claims`.
    fn resolve_user_info(&self, claims: &Value) -> Result<UserInfo, AppError>;

    /// Resolve only the internal role for `claims`.
    fn resolve_role(&self, claims: &Value) -> Result<InternalRole, RoleError>;
}

/// Claim paths for the user attributes copied into [`UserInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserClaimPaths {
    pub username: ClaimPath,
    pub email: ClaimPath,
    pub first_name: ClaimPath,
    pub last_name: ClaimPath,
}

impl Default for UserClaimPaths {
    fn default() -> Self {
        Self {
            username: ClaimPath::parse("preferred_username"),
            email: ClaimPath::parse("email"),
            first_name: ClaimPath::parse("given_name"),
            last_name: ClaimPath::parse("family_name"),
        }
    }
}

impl From<&OidcConfig> for UserClaimPaths {
    fn from(oidc: &OidcConfig) -> Self {
        Self {
            username: oidc.username_path.clone(),
            email: oidc.email_path.clone(),
            first_name: oidc.first_name_path.clone(),
            last_name: oidc.last_name_path.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClaimsSecurityManager {
    app_name: String,
    role_path: RolePath,
    table: RolePriorityTable,
    user_paths: UserClaimPaths,
}

impl ClaimsSecurityManager {
    pub fn new(
        app_name: impl Into<String>,
        role_path: RolePath,
        table: RolePriorityTable,
        user_paths: UserClaimPaths,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            role_path,
            table,
            user_paths,
        }
    }

    pub fn from_config(resolver: &ResolverConfig, oidc: &OidcConfig) -> Self {
        Self::new(
            resolver.app_name.clone(),
            resolver.role_path.clone(),
            resolver.table.clone(),
            UserClaimPaths::from(oidc),
        )
    }

    /// The same resolver reading the role list from a different path.
    pub fn with_role_path(&self, role_path: RolePath) -> Self {
        Self {
            role_path,
            ..self.clone()
        }
    }

    /// Find or create the user, then make the resolved role their only role.
    ///
    /// A role the directory does not know is logged and leaves the user's
    /// existing roles untouched.
    pub async fn provision<D: UserDirectory>(
        &self,
        directory: &D,
        info: &UserInfo,
    ) -> Result<DirectoryUser, AppError> {
        let mut user = directory.find_or_create_user(info).await?;
        let role_name = info.role.as_str();

        match directory.find_role(role_name).await? {
            Some(role) => {
                let roles = vec![role];
                directory.assign_roles(user.id, &roles).await?;
                tracing::info!(user_id = user.id, username = %user.username, role = role_name, "Assigned role to user");
                user.roles = roles;
            }
            None => {
                tracing::warn!(user_id = user.id, role = role_name, "Role not found in directory");
            }
        }

        Ok(user)
    }

    /// Header-based login: the value of the gateway's trusted user header is
    /// parsed as claims, its flattened `roles` list is resolved, and the user
    /// is provisioned.
    pub async fn remote_user_login<D: UserDirectory>(
        &self,
        directory: &D,
        header_value: &str,
    ) -> Result<DirectoryUser, AppError> {
        let claims: Value = serde_json::from_str(header_value)
            .map_err(|e| AppError::bad_request(format!("Malformed user header: {e}")))?;
        let info = self
            .with_role_path(RolePath::parse("roles"))
            .resolve_user_info(&claims)?;
        self.provision(directory, &info).await
    }
}

impl SecurityManager for ClaimsSecurityManager {
    fn resolve_user_info(&self, claims: &Value) -> Result<UserInfo, AppError> {
        let role = self.resolve_role(claims).map_err(|e| {
            tracing::info!(error = %e, "Login rejected");
            AppError::forbidden(format!(
                "You are not authorized to access {}",
                self.app_name
            ))
        })?;

        let email = claims::string_at(claims, &self.user_paths.email).unwrap_or_default();
        Ok(UserInfo {
            id: email.clone(),
            username: claims::string_at(claims, &self.user_paths.username),
            email,
            first_name: claims::string_at(claims, &self.user_paths.first_name).unwrap_or_default(),
            last_name: claims::string_at(claims, &self.user_paths.last_name).unwrap_or_default(),
            role,
        })
    }

    fn resolve_role(&self, claims: &Value) -> Result<InternalRole, RoleError> {
        roles::resolve_role(claims, &self.role_path, &self.table)
    }
}
