use axum::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::{ProfileUpdate, UserUpdate};
use super::model::User;
use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{field} already in use")]
    Duplicate { field: &'static str },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { field } => ApiError::Conflict(format!("{field} already in use")),
            StoreError::Other(e) => ApiError::Internal(e),
        }
    }
}

/// Persistence port for users. Each mutating call is one read-modify-write
/// of a single row committed atomically; `Ok(None)` means no such user and
/// nothing was written.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn insert(&self, user: &User) -> Result<User, StoreError>;

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;

    async fn set_professional_status(
        &self,
        target: Uuid,
        professional: bool,
        actor: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;

    async fn update_user(
        &self,
        id: Uuid,
        update: &UserUpdate,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;
}
