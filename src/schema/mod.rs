//! Database schema management.
//!
//! The base `users` table is owned by the versioned sqlx migrations under
//! `migrations/`. The professional-status columns are managed separately by
//! [`professional_status`], which inspects the live catalog and is safe to run
//! against any history.

pub mod professional_status;

use anyhow::Context;
use sqlx::PgPool;

pub use professional_status::{Direction, Step};

/// Versioned migrations followed by the existence-checked upgrade.
pub async fn migrate(db: &PgPool) -> anyhow::Result<Vec<Step>> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run versioned migrations")?;
    professional_status::run(db, Direction::Up).await
}
