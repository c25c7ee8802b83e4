use std::collections::HashMap;

use axum::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::dto::{ProfileUpdate, UserUpdate};
use super::model::User;
use super::store::{StoreError, UserStore};

/// In-process `UserStore`. The single mutex plays the part of the row lock
/// and a mutation is only kept if it passes the uniqueness checks.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn mutate<F>(&self, id: Uuid, f: F) -> Result<Option<User>, StoreError>
    where
        F: FnOnce(&mut User) + Send,
    {
        let mut users = self.users.lock().await;
        let Some(current) = users.get(&id) else {
            return Ok(None);
        };

        let mut next = current.clone();
        f(&mut next);
        check_unique(&users, &next)?;

        users.insert(id, next.clone());
        Ok(Some(next))
    }
}

fn check_unique(users: &HashMap<Uuid, User>, candidate: &User) -> Result<(), StoreError> {
    for other in users.values().filter(|u| u.id != candidate.id) {
        if other.email == candidate.email {
            return Err(StoreError::Duplicate { field: "email" });
        }
        if other.nickname == candidate.nickname {
            return Err(StoreError::Duplicate { field: "nickname" });
        }
    }
    Ok(())
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn insert(&self, user: &User) -> Result<User, StoreError> {
        let mut users = self.users.lock().await;
        if users.contains_key(&user.id) {
            return Err(StoreError::Duplicate { field: "id" });
        }
        check_unique(&users, user)?;
        users.insert(user.id, user.clone());
        Ok(user.clone())
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
