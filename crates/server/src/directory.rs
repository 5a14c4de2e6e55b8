//! User and role storage used when provisioning BI users after login.

use shared_types::{AppError, DirectoryUser, InternalRole, UserInfo};
use sqlx::{Pool, Postgres};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error_convert::SqlxErrorExt;

/// Find-or-create and role assignment operations of a user store.
pub trait UserDirectory {
    /// Return the user matching `info`'s username (or email when there is no
    /// username), creating it when absent. Profile fields are refreshed.
    fn find_or_create_user(
        &self,
        info: &UserInfo,
    ) -> impl Future<Output = Result<DirectoryUser, AppError>> + Send;

    /// Canonical name of the role called `name`, if the store has it.
    fn find_role(&self, name: &str) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Replace the user's roles with `roles`.
    fn assign_roles(
        &self,
        user_id: i64,
        roles: &[String],
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

fn login_name(info: &UserInfo) -> Result<String, AppError> {
    info.username
        .clone()
        .filter(|u| !u.is_empty())
        .or_else(|| Some(info.email.clone()).filter(|e| !e.is_empty()))
        .ok_or_else(|| AppError::bad_request("Claims carry neither a username nor an email"))
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    users: Vec<DirectoryUser>,
    roles: Vec<String>,
}

/// Process-local directory. Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    inner: Arc<Mutex<MemoryInner>>,
}

impl InMemoryDirectory {
    /// Directory knowing the given role names.
    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                next_id: 1,
                users: Vec::new(),
                roles: roles.into_iter().map(Into::into).collect(),
            })),
        }
    }

    /// Directory knowing every internal role.
    pub fn seeded() -> Self {
        Self::with_roles(InternalRole::ALL.iter().map(InternalRole::as_str))
    }

    pub fn users(&self) -> Vec<DirectoryUser> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .users
            .clone()
    }
}

impl UserDirectory for InMemoryDirectory {
    async fn find_or_create_user(&self, info: &UserInfo) -> Result<DirectoryUser, AppError> {
        let username = login_name(info)?;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = inner.users.iter_mut().find(|u| u.username == username) {
            existing.email = info.email.clone();
            existing.first_name = info.first_name.clone();
            existing.last_name = info.last_name.clone();
            return Ok(existing.clone());
        }

        let user = DirectoryUser {
            id: inner.next_id.max(1),
            username,
            email: info.email.clone(),
            first_name: info.first_name.clone(),
            last_name: info.last_name.clone(),
            roles: Vec::new(),
        };
        inner.next_id = user.id + 1;
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn find_role(&self, name: &str) -> Result<Option<String>, AppError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.roles.iter().find(|r| r.as_str() == name).cloned())
    }

    async fn assign_roles(&self, user_id: i64, roles: &[String]) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| AppError::not_found(format!("User {user_id} not found")))?;
        user.roles = roles.to_vec();
        Ok(())
    }
}

/// Postgres-backed directory over the `users`, `roles` and `user_roles` tables.
#[derive(Clone)]
pub struct PgDirectory {
    pool: Pool<Postgres>,
}

impl PgDirectory {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn roles_of(&self, user_id: i64) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar::<_, String>(
            "SELECT r.name FROM user_roles ur JOIN roles r ON r.id = ur.role_id \
             WHERE ur.user_id = $1 ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.into_app_error())
    }
}

impl UserDirectory for PgDirectory {
    async fn find_or_create_user(&self, info: &UserInfo) -> Result<DirectoryUser, AppError> {
        let username = login_name(info)?;

        let (id, username, email, first_name, last_name) =
            sqlx::query_as::<_, (i64, String, String, String, String)>(
                r#"INSERT INTO users (username, email, first_name, last_name)
                   VALUES ($1, $2, $3, $4)
                   ON CONFLICT (username) DO UPDATE
                   SET email = EXCLUDED.email,
                       first_name = EXCLUDED.first_name,
                       last_name = EXCLUDED.last_name,
                       updated_at = NOW()
                   RETURNING id, username, email, first_name, last_name"#,
            )
            .bind(&username)
            .bind(&info.email)
            .bind(&info.first_name)
            .bind(&info.last_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.into_app_error())?;

        let roles = self.roles_of(id).await?;
        Ok(DirectoryUser {
            id,
            username,
            email,
            first_name,
            last_name,
            roles,
        })
    }

    async fn find_role(&self, name: &str) -> Result<Option<String>, AppError> {
        sqlx::query_scalar::<_, String>("SELECT name FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.into_app_error())
    }

    async fn assign_roles(&self, user_id: i64, roles: &[String]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| e.into_app_error())?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.into_app_error())?;

        for role in roles {
            sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) \
                 SELECT $1, id FROM roles WHERE name = $2",
            )
            .bind(user_id)
            .bind(role)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.into_app_error())?;
        }

        tx.commit().await.map_err(|e| e.into_app_error())
    }
}

/// The directory selected at startup.
#[derive(Clone)]
pub enum Directory {
    Memory(InMemoryDirectory),
    Postgres(PgDirectory),
}

impl UserDirectory for Directory {
    async fn find_or_create_user(&self, info: &UserInfo) -> Result<DirectoryUser, AppError> {
        match self {
            Directory::Memory(d) => d.find_or_create_user(info).await,
            Directory::Postgres(d) => d.find_or_create_user(info).await,
        }
    }

    async fn find_role(&self, name: &str) -> Result<Option<String>, AppError> {
        match self {
            Directory::Memory(d) => d.find_role(name).await,
            Directory::Postgres(d) => d.find_role(name).await,
        }
    }

    async fn assign_roles(&self, user_id: i64, roles: &[String]) -> Result<(), AppError> {
        match self {
            Directory::Memory(d) => d.assign_roles(user_id, roles).await,
            Directory::Postgres(d) => d.assign_roles(user_id, roles).await,
        }
    }
}
