use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};

use crate::error::ApiError;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref URL_RE: Regex = Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").unwrap();
    static ref NICKNAME_RE: Regex = Regex::new(r"^[\w-]+$").unwrap();
}

/// Field-level rules run after the body has been deserialized.
pub trait Validate {
    fn validate(&self) -> Result<(), ApiError>;
}

/// JSON body that has been parsed and passed [`Validate`].
/// Parse failures and rule violations both come back as 422.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Path parameters whose parse failures come back as 422 with the usual
/// error body.
pub struct ValidatedPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidatedPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(ValidatedPath(value))
    }
}

/// Distinguishes an absent key (`None`) from an explicit `null`
/// (`Some(None)`). Pair with `#[serde(default)]`.
pub fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_url(url: &str) -> bool {
    URL_RE.is_match(url)
}

pub(crate) fn is_valid_nickname(nickname: &str) -> bool {
    NICKNAME_RE.is_match(nickname)
}

pub(crate) fn max_len(field: &str, value: &Option<Option<String>>, max: usize) -> Result<(), ApiError> {
    match value {
        Some(Some(v)) if v.chars().count() > max => Err(ApiError::validation(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn at_least_one(provided: &[bool]) -> Result<(), ApiError> {
    if provided.iter().any(|p| *p) {
        Ok(())
    } else {
        Err(ApiError::validation(
            "At least one field must be provided for update",
        ))
    }
}

/// True when the key was sent with a non-null value.
pub(crate) fn has_value<T>(field: &Option<Option<T>>) -> bool {
    matches!(field, Some(Some(_)))
}
