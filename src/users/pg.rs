use anyhow::Context;
use axum::async_trait;
use serde_json::{Map, Value};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::{ProfileUpdate, UserUpdate};
use super::model::User;
use super::store::{StoreError, UserStore};

const USER_COLUMNS: &str = r#"
    id, nickname, email, first_name, last_name, bio,
    profile_picture_url, linkedin_profile_url, github_profile_url,
    location, extra_fields, role::text AS role, email_verified,
    hashed_password, verification_token, is_professional,
    professional_status_updated_at, professional_upgraded_by_id,
    last_login_at, failed_login_attempts, is_locked, created_at, updated_at
"#;

/// Row as read from `users`. Lockout columns are nullable in older
/// deployments, so they are read as options and defaulted.
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    nickname: String,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    bio: Option<String>,
    profile_picture_url: Option<String>,
    linkedin_profile_url: Option<String>,
    github_profile_url: Option<String>,
    location: Option<String>,
    extra_fields: Option<Json<Map<String, Value>>>,
    role: String,
    email_verified: bool,
    hashed_password: String,
    verification_token: Option<String>,
    is_professional: bool,
    professional_status_updated_at: Option<OffsetDateTime>,
    professional_upgraded_by_id: Option<Uuid>,
    last_login_at: Option<OffsetDateTime>,
    failed_login_attempts: Option<i32>,
    is_locked: Option<bool>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            role: r
                .role
                .parse()
                .with_context(|| format!("user {} has an unreadable role", r.id))?,
            id: r.id,
            nickname: r.nickname,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            bio: r.bio,
            profile_picture_url: r.profile_picture_url,
            linkedin_profile_url: r.linkedin_profile_url,
            github_profile_url: r.github_profile_url,
            location: r.location,
            extra_fields: r.extra_fields.map(|Json(m)| m),
            email_verified: r.email_verified,
            hashed_password: r.hashed_password,
            verification_token: r.verification_token,
            is_professional: r.is_professional,
            professional_status_updated_at: r.professional_status_updated_at,
            professional_upgraded_by_id: r.professional_upgraded_by_id,
            last_login_at: r.last_login_at,
            failed_login_attempts: r.failed_login_attempts.unwrap_or(0),
            is_locked: r.is_locked.unwrap_or(false),
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// `UserStore` backed by Postgres.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Locks the row, applies `f`, writes it back and commits.
    async fn mutate<F>(&self, id: Uuid, f: F) -> Result<Option<User>, StoreError>
    where
        F: FnOnce(&mut User) + Send,
    {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("lock user row")?;

        let Some(row) = row else {
            tx.rollback().await.context("rollback tx")?;
            return Ok(None);
        };

        let mut user = User::try_from(row)?;
        f(&mut user);
        let saved = write_user(&mut *tx, &user).await?;

        tx.commit().await.context("commit tx")?;
        Ok(Some(saved))
    }
}

async fn write_user(conn: &mut PgConnection, user: &User) -> Result<User, StoreError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        UPDATE users
           SET nickname = $2,
               email = $3,
               first_name = $4,
               last_name = $5,
               bio = $6,
               profile_picture_url = $7,
               linkedin_profile_url = $8,
               github_profile_url = $9,
               location = $10,
               extra_fields = $11,
               role = $12::"UserRole",
               is_professional = $13,
               professional_status_updated_at = $14,
               professional_upgraded_by_id = $15,
               updated_at = $16
         WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user.id)
    .bind(&user.nickname)
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.bio)
    .bind(&user.profile_picture_url)
    .bind(&user.linkedin_profile_url)
    .bind(&user.github_profile_url)
    .bind(&user.location)
    .bind(user.extra_fields.clone().map(Json))
    .bind(user.role.as_str())
    .bind(user.is_professional)
    .bind(user.professional_status_updated_at)
    .bind(user.professional_upgraded_by_id)
    .bind(user.updated_at)
    .fetch_one(conn)
    .await
    .map_err(|e| map_write_err(e, "update user"))?;

    Ok(User::try_from(row)?)
}

/// Unique violations become `Duplicate`; anything else is opaque.
fn map_write_err(err: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            let constraint = db.constraint().unwrap_or_default();
            let field = if constraint.contains("email") {
                "email"
            } else if constraint.contains("nickname") {
                "nickname"
            } else {
                "value"
            };
            return StoreError::Duplicate { field };
        }
    }
    StoreError::Other(anyhow::Error::new(err).context(what))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;

        Ok(row.map(User::try_from).transpose()?)
    }

    async fn insert(&self, user: &User) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (
                id, nickname, email, first_name, last_name, bio,
                profile_picture_url, linkedin_profile_url, github_profile_url,
                location, extra_fields, role, email_verified, hashed_password,
                verification_token, is_professional, professional_status_updated_at,
                professional_upgraded_by_id, last_login_at, failed_login_attempts,
                is_locked, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12::"UserRole",
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23
            )
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.nickname)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.bio)
        .bind(&user.profile_picture_url)
        .bind(&user.linkedin_profile_url)
        .bind(&user.github_profile_url)
        .bind(&user.location)
        .bind(user.extra_fields.clone().map(Json))
        .bind(user.role.as_str())
        .bind(user.email_verified)
        .bind(&user.hashed_password)
        .bind(&user.verification_token)
        .bind(user.is_professional)
        .bind(user.professional_status_updated_at)
        .bind(user.professional_upgraded_by_id)
        .bind(user.last_login_at)
        .bind(user.failed_login_attempts)
        .bind(user.is_locked)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_err(e, "insert user"))?;

        Ok(User::try_from(row)?)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        self.mutate(id, |u| u.apply_profile_update(update, now)).await
    }

    async fn set_professional_status(
        &self,
        target: Uuid,
        professional: bool,
        actor: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        self.mutate(target, |u| u.set_professional_status(professional, actor, now))
            .await
    }

    async fn update_user(
        &self,
        id: Uuid,
        update: &UserUpdate,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        self.mutate(id, |u| u.apply_admin_update(update, now)).await
    }
}
