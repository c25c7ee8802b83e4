use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{User, UserRole};
use super::validation::{
    at_least_one, has_value, is_valid_email, is_valid_nickname, is_valid_url, max_len, present,
    Validate,
};
use crate::error::ApiError;

/// Body of `PATCH /profile/me`. Absent keys are left alone, `null` clears.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, deserialize_with = "present")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub last_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub location: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub extra_fields: Option<Option<Map<String, Value>>>,
}

impl Validate for ProfileUpdate {
    fn validate(&self) -> Result<(), ApiError> {
        at_least_one(&[
            has_value(&self.first_name),
            has_value(&self.last_name),
            has_value(&self.bio),
            has_value(&self.location),
            has_value(&self.extra_fields),
        ])?;
        max_len("first_name", &self.first_name, 100)?;
        max_len("last_name", &self.last_name, 100)?;
        max_len("bio", &self.bio, 500)?;
        max_len("location", &self.location, 120)?;
        Ok(())
    }
}

/// Body of `PATCH /users/:id`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct UserUpdate {
    #[serde(default, deserialize_with = "present")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub nickname: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub last_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub profile_picture_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub linkedin_profile_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub github_profile_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub role: Option<Option<UserRole>>,
}

impl Validate for UserUpdate {
    fn validate(&self) -> Result<(), ApiError> {
        at_least_one(&[
            has_value(&self.email),
            has_value(&self.nickname),
            has_value(&self.first_name),
            has_value(&self.last_name),
            has_value(&self.bio),
            has_value(&self.profile_picture_url),
            has_value(&self.linkedin_profile_url),
            has_value(&self.github_profile_url),
            has_value(&self.role),
        ])?;

        for (field, explicit_null) in [
            ("email", matches!(self.email, Some(None))),
            ("nickname", matches!(self.nickname, Some(None))),
            ("role", matches!(self.role, Some(None))),
        ] {
            if explicit_null {
                return Err(ApiError::validation(format!("{field} cannot be null")));
            }
        }

        if let Some(Some(email)) = &self.email {
            if !is_valid_email(email) {
                return Err(ApiError::validation("Invalid email"));
            }
        }
        max_len("email", &self.email, 255)?;

        if let Some(Some(nickname)) = &self.nickname {
            if nickname.chars().count() < 3 || !is_valid_nickname(nickname) {
                return Err(ApiError::validation(
                    "nickname must be at least 3 characters of letters, digits, '_' or '-'",
                ));
            }
        }
        max_len("nickname", &self.nickname, 50)?;

        max_len("first_name", &self.first_name, 100)?;
        max_len("last_name", &self.last_name, 100)?;
        max_len("bio", &self.bio, 500)?;

        for (field, value) in [
            ("profile_picture_url", &self.profile_picture_url),
            ("linkedin_profile_url", &self.linkedin_profile_url),
            ("github_profile_url", &self.github_profile_url),
        ] {
            if let Some(Some(url)) = value {
                if !is_valid_url(url) {
                    return Err(ApiError::validation(format!("{field}: Invalid URL format")));
                }
            }
            max_len(field, value, 255)?;
        }
        Ok(())
    }
}

/// Body of `POST /profile/upgrade`.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminUpgradeRequest {
    pub user_id: Uuid,
    pub professional: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Validate for AdminUpgradeRequest {
    fn validate(&self) -> Result<(), ApiError> {
        match &self.reason {
            Some(r) if r.chars().count() > 500 => Err(ApiError::validation(
                "reason must be at most 500 characters",
            )),
            _ => Ok(()),
        }
    }
}

/// Full user view returned by every endpoint that reads or mutates a user.
#[derive(Debug, Clone, Serialize)]
pub struct UserDetail {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
    pub linkedin_profile_url: Option<String>,
    pub github_profile_url: Option<String>,
    pub role: UserRole,
    pub professional: bool,
    pub location: Option<String>,
    pub extra_fields: Option<Map<String, Value>>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub professional_status_updated_at: Option<OffsetDateTime>,
    pub professional_upgraded_by_id: Option<Uuid>,
}

impl From<User> for UserDetail {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            nickname: u.nickname,
            first_name: u.first_name,
            last_name: u.last_name,
            bio: u.bio,
            profile_picture_url: u.profile_picture_url,
            linkedin_profile_url: u.linkedin_profile_url,
            github_profile_url: u.github_profile_url,
            role: u.role,
            professional: u.is_professional,
            location: u.location,
            extra_fields: u.extra_fields,
            professional_status_updated_at: u.professional_status_updated_at,
            professional_upgraded_by_id: u.professional_upgraded_by_id,
        }
    }
}
