use serde_json::{Map, Value};
use shared_types::GatewayUser;

use crate::claims::{self, ClaimPath};
use crate::config::OidcConfig;
use crate::roles::RolePath;
use crate::security::{ClaimsSecurityManager, SecurityManager};

/// Claim keys replaced by derived fields on [`GatewayUser`].
const DERIVED_KEYS: [&str; 3] = ["username", "roles", "internal_role"];

/// Build the gateway's view of a verified user.
///
/// Roles are the ordered union of the username, the preferred username, every
/// configured roles path, the top-level `roles` and `realmRoles`, minus the
/// ignore list. The internal role is resolved over that flattened list and is
/// `None` when no configured role matches.
pub fn gateway_user(
    claims: Value,
    oidc: &OidcConfig,
    security: &ClaimsSecurityManager,
) -> GatewayUser {
    let username = claims::string_at(&claims, &ClaimPath::parse("username"))
        .or_else(|| claims::string_at(&claims, &oidc.username_path));

    let mut roles: Vec<String> = Vec::new();
    let mut push = |role: String| {
        if !role.is_empty() && !roles.contains(&role) {
            roles.push(role);
        }
    };

    username.clone().into_iter().for_each(&mut push);
    claims::string_at(&claims, &ClaimPath::parse("preferred_username"))
        .into_iter()
        .for_each(&mut push);

    let mut paths = oidc.roles_paths.clone();
    paths.push(ClaimPath::parse("roles"));
    paths.push(ClaimPath::parse("realmRoles"));
    claims::merged_string_lists(&claims, &paths)
        .into_iter()
        .for_each(&mut push);

    roles.retain(|role| !oidc.role_ignore_list.contains(role));

    let internal_role = security
        .with_role_path(RolePath::parse("roles"))
        .resolve_role(&serde_json::json!({ "roles": roles }))
        .ok();

    let mut rest = match claims {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for key in DERIVED_KEYS {
        rest.remove(key);
    }

    GatewayUser {
        username,
        roles,
        internal_role,
        claims: rest,
    }
}
