//! User profile backend: self-service profile edits, professional-status
//! upgrades by elevated staff, and the schema that backs them.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod schema;
pub mod state;
pub mod users;
