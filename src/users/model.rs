use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::dto::{ProfileUpdate, UserUpdate};

/// Closed set of roles. Stored in Postgres as the `"UserRole"` enum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Anonymous,
    Authenticated,
    Manager,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Anonymous => "ANONYMOUS",
            UserRole::Authenticated => "AUTHENTICATED",
            UserRole::Manager => "MANAGER",
            UserRole::Admin => "ADMIN",
        }
    }

    /// Managers and admins may change other users' records.
    pub fn is_elevated(&self) -> bool {
        matches!(self, UserRole::Manager | UserRole::Admin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ANONYMOUS" => Ok(UserRole::Anonymous),
            "AUTHENTICATED" => Ok(UserRole::Authenticated),
            "MANAGER" => Ok(UserRole::Manager),
            "ADMIN" => Ok(UserRole::Admin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// User record.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub nickname: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
    pub linkedin_profile_url: Option<String>,
    pub github_profile_url: Option<String>,
    pub location: Option<String>,
    pub extra_fields: Option<Map<String, Value>>,
    pub role: UserRole,
    pub email_verified: bool,
    pub hashed_password: String,
    pub verification_token: Option<String>,
    pub is_professional: bool,
    pub professional_status_updated_at: Option<OffsetDateTime>,
    /// Weak reference to the user who last upgraded this one.
    pub professional_upgraded_by_id: Option<Uuid>,
    pub last_login_at: Option<OffsetDateTime>,
    pub failed_login_attempts: i32,
    pub is_locked: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Fresh record with the defaults a registration produces.
    pub fn new(
        nickname: impl Into<String>,
        email: impl Into<String>,
        hashed_password: impl Into<String>,
        role: UserRole,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            nickname: nickname.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            bio: None,
            profile_picture_url: None,
            linkedin_profile_url: None,
            github_profile_url: None,
            location: None,
            extra_fields: None,
            role,
            email_verified: false,
            hashed_password: hashed_password.into(),
            verification_token: None,
            is_professional: false,
            professional_status_updated_at: None,
            professional_upgraded_by_id: None,
            last_login_at: None,
            failed_login_attempts: 0,
            is_locked: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Upgrade (`true`) records `actor` as the upgrader; clearing (`false`)
    /// drops the upgrader. Both directions stamp the time.
    pub fn set_professional_status(&mut self, professional: bool, actor: Uuid, now: OffsetDateTime) {
        let stamp = next_stamp(self.professional_status_updated_at, now);
        self.is_professional = professional;
        self.professional_status_updated_at = Some(stamp);
        self.professional_upgraded_by_id = professional.then_some(actor);
        self.touch(stamp);
    }

    /// Applies only the fields present in `update`.
    pub fn apply_profile_update(&mut self, update: &ProfileUpdate, now: OffsetDateTime) {
        assign(&mut self.first_name, &update.first_name);
        assign(&mut self.last_name, &update.last_name);
        assign(&mut self.bio, &update.bio);
        assign(&mut self.location, &update.location);
        assign(&mut self.extra_fields, &update.extra_fields);
        self.touch(now);
    }

    /// Admin-side partial update. `email`, `nickname` and `role` are never
    /// cleared; validation rejects a `null` for them before we get here.
    pub fn apply_admin_update(&mut self, update: &UserUpdate, now: OffsetDateTime) {
        if let Some(Some(email)) = &update.email {
            self.email = email.clone();
        }
        if let Some(Some(nickname)) = &update.nickname {
            self.nickname = nickname.clone();
        }
        if let Some(Some(role)) = update.role {
            self.role = role;
        }
        assign(&mut self.first_name, &update.first_name);
        assign(&mut self.last_name, &update.last_name);
        assign(&mut self.bio, &update.bio);
        assign(&mut self.profile_picture_url, &update.profile_picture_url);
        assign(&mut self.linkedin_profile_url, &update.linkedin_profile_url);
        assign(&mut self.github_profile_url, &update.github_profile_url);
        self.touch(now);
    }

    pub fn lock_account(&mut self) {
        self.is_locked = true;
    }

    pub fn unlock_account(&mut self) {
        self.is_locked = false;
        self.failed_login_attempts = 0;
    }

    pub fn verify_email(&mut self) {
        self.email_verified = true;
        self.verification_token = None;
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.role == role
    }

    fn touch(&mut self, now: OffsetDateTime) {
        self.updated_at = self.updated_at.max(now);
    }
}

fn assign<T: Clone>(slot: &mut Option<T>, patch: &Option<Option<T>>) {
    if let Some(value) = patch {
        *slot = value.clone();
    }
}

/// Postgres keeps microseconds, so a stamp that does not advance past the
/// previous one is bumped by a single microsecond.
pub fn next_stamp(prev: Option<OffsetDateTime>, now: OffsetDateTime) -> OffsetDateTime {
    let now = truncate_to_micros(now);
    match prev {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}

fn truncate_to_micros(t: OffsetDateTime) -> OffsetDateTime {
    let micros = t.microsecond();
    t.replace_microsecond(micros).unwrap_or(t)
}
