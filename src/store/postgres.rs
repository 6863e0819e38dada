use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::auth::ledger::{hash_token, TokenEntry, TokenLedger};
use crate::domain::{NewUser, Role, RoleName, User};
use crate::error::{AppError, DatabaseError};
use crate::store::{CredentialStore, EMAIL_TAKEN, USERNAME_TAKEN, USER_NOT_FOUND};

type UserRow = (Uuid, String, String, String, Option<String>, DateTime<Utc>);
type TokenRow = (Uuid, Uuid, String, bool, bool, DateTime<Utc>);

const USERNAME_CONSTRAINT: &str = "users_username_key";
const EMAIL_CONSTRAINT: &str = "users_email_key";

/// Postgres-backed credential store and token ledger.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map a unique violation on the users table to the matching identity error.
fn identity_conflict(err: AppError) -> AppError {
    match err {
        AppError::Database(DatabaseError::UniqueConstraintViolation(constraint)) => {
            if constraint == USERNAME_CONSTRAINT {
                AppError::DuplicateIdentity(USERNAME_TAKEN.to_string())
            } else if constraint == EMAIL_CONSTRAINT {
                AppError::DuplicateIdentity(EMAIL_TAKEN.to_string())
            } else {
                AppError::Database(DatabaseError::UniqueConstraintViolation(constraint))
            }
        }
        other => other,
    }
}

fn token_entry(row: TokenRow) -> TokenEntry {
    let (id, user_id, token_hash, expired, revoked, created_at) = row;
    TokenEntry {
        id,
        user_id,
        token_hash,
        expired,
        revoked,
        created_at,
    }
}

async fn load_roles(conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<RoleName>, AppError> {
    let names = sqlx::query_scalar::<_, String>(
        r#"
        SELECT r.name
        FROM roles r
        INNER JOIN user_roles ur ON ur.role_id = r.id
        WHERE ur.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut roles = names
        .iter()
        .map(|name| name.parse::<RoleName>().map_err(AppError::from))
        .collect::<Result<Vec<_>, _>>()?;
    roles.sort();
    Ok(roles)
}

async fn hydrate(conn: &mut PgConnection, row: Option<UserRow>) -> Result<Option<User>, AppError> {
    let Some((id, username, email, password_hash, image_url, created_at)) = row else {
        return Ok(None);
    };
    let roles = load_roles(conn, id).await?;
    Ok(Some(User {
        id,
        username,
        email,
        password_hash,
        image_url,
        roles,
        created_at,
    }))
}

async fn fetch_user_by_id(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<User>, AppError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, email, password_hash, image_url, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    hydrate(conn, row).await
}

/// Lock the user row for the rest of the transaction. `NotFound` if absent.
async fn lock_user(conn: &mut PgConnection, user_id: Uuid) -> Result<(), AppError> {
    let owner = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    match owner {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound(USER_NOT_FOUND.to_string())),
    }
}

async fn upsert_role(conn: &mut PgConnection, name: RoleName) -> Result<Role, AppError> {
    sqlx::query("INSERT INTO roles (id, name) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
        .bind(Uuid::new_v4())
        .bind(name.as_str())
        .execute(&mut *conn)
        .await?;

    let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM roles WHERE name = $1")
        .bind(name.as_str())
        .fetch_one(&mut *conn)
        .await?;

    Ok(Role { id, name })
}

async fn revoke_valid(conn: &mut PgConnection, user_id: Uuid) -> Result<u64, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE tokens
        SET expired = true, revoked = true, revoked_at = $1
        WHERE user_id = $2 AND NOT (expired AND revoked)
        "#,
    )
    .bind(Utc::now())
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn insert_token(conn: &mut PgConnection, user_id: Uuid, token: &str) -> Result<TokenEntry, AppError> {
    let entry = TokenEntry::new(user_id, token);

    sqlx::query(
        r#"
        INSERT INTO tokens (id, user_id, token_hash, expired, revoked, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.id)
    .bind(entry.user_id)
    .bind(&entry.token_hash)
    .bind(entry.expired)
    .bind(entry.revoked)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(entry)
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn username_exists(&self, username: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;
        let user_id = Uuid::new_v4();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user_id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.image_url)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| identity_conflict(e.into()))?;

        let mut roles = user.roles;
        roles.sort();
        roles.dedup();
        for name in &roles {
            let role = upsert_role(&mut tx, *name).await?;
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
                .bind(user_id)
                .bind(role.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(User {
            id: user_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            image_url: user.image_url,
            roles,
            created_at,
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash, image_url, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
        hydrate(&mut conn, row).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash, image_url, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;
        hydrate(&mut conn, row).await
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_user_by_id(&mut conn, user_id).await
    }

    async fn find_or_create_role(&self, name: RoleName) -> Result<Role, AppError> {
        let mut conn = self.pool.acquire().await?;
        upsert_role(&mut conn, name).await
    }

    async fn set_user_role(&self, user_id: Uuid, role: RoleName, granted: bool) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user_id).await?;
        let role = upsert_role(&mut tx, role).await?;

        if granted {
            sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(user_id)
            .bind(role.id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
                .bind(user_id)
                .bind(role.id)
                .execute(&mut *tx)
                .await?;
        }

        let user = fetch_user_by_id(&mut tx, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;
        tx.commit().await?;
        Ok(user)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(USER_NOT_FOUND.to_string()));
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        username: &str,
        image_url: Option<&str>,
    ) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE users SET username = $1, image_url = $2 WHERE id = $3")
            .bind(username)
            .bind(image_url)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| identity_conflict(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(USER_NOT_FOUND.to_string()));
        }

        let user = fetch_user_by_id(&mut tx, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;
        tx.commit().await?;
        Ok(user)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        // No ON DELETE CASCADE in the schema: dependents go first, same transaction.
        sqlx::query("DELETE FROM tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        tracing::info!(user_id = %user_id, "User and dependent records deleted");
        Ok(true)
    }
}

#[async_trait]
impl TokenLedger for PgStore {
    async fn record_issued_token(&self, user_id: Uuid, token: &str) -> Result<TokenEntry, AppError> {
        let mut conn = self.pool.acquire().await?;
        insert_token(&mut conn, user_id, token).await
    }

    async fn list_valid_tokens(&self, user_id: Uuid) -> Result<Vec<TokenEntry>, AppError> {
        let rows = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT id, user_id, token_hash, expired, revoked, created_at
            FROM tokens
            WHERE user_id = $1 AND NOT (expired AND revoked)
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(token_entry).collect())
    }

    async fn revoke_all_valid_tokens(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut conn = self.pool.acquire().await?;
        let changed = revoke_valid(&mut conn, user_id).await?;
        tracing::info!(user_id = %user_id, revoked = changed, "Valid tokens revoked for user");
        Ok(changed)
    }

    async fn find_by_token_string(&self, token: &str) -> Result<Option<TokenEntry>, AppError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT id, user_id, token_hash, expired, revoked, created_at
            FROM tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(token_entry))
    }

    async fn revoke_all_and_record(&self, user_id: Uuid, token: &str) -> Result<TokenEntry, AppError> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the owner serializes concurrent logins/refreshes per user.
        lock_user(&mut tx, user_id).await?;

        let revoked = revoke_valid(&mut tx, user_id).await?;
        let entry = insert_token(&mut tx, user_id, token).await?;
        tx.commit().await?;

        tracing::debug!(user_id = %user_id, revoked = revoked, "Ledger rotated");
        Ok(entry)
    }
}
