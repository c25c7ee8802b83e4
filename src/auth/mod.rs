//! Bearer-token verification and the role-checking extractors built on it.

pub mod claims;
pub mod extractors;
pub mod jwt;

pub use extractors::{AuthUser, CurrentUser, ElevatedUser};
pub use jwt::JwtKeys;
