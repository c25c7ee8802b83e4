//! Existence-checked migration for the professional-status columns on
//! `users`.
//!
//! Deployments reached this schema through different histories, so nothing
//! here assumes a starting point. The live catalog is read first, a plan is
//! computed against it, and only that plan is executed. Downgrade mirrors
//! upgrade: the foreign key goes first, then indexes, then columns in
//! reverse order, each only if present.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::Context;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

pub const TABLE: &str = "users";
pub const UPGRADED_BY_FK: &str = "fk_users_professional_upgraded_by";

/// Serialises concurrent runs across processes.
const ADVISORY_LOCK_KEY: i64 = 0x7072_6f66_6875_62; // "profhub"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub definition: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub column: &'static str,
}

/// Added in this order, dropped in reverse.
pub const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "location",
        definition: "VARCHAR(120)",
    },
    ColumnSpec {
        name: "is_professional",
        definition: "BOOLEAN NOT NULL DEFAULT false",
    },
    ColumnSpec {
        name: "professional_status_updated_at",
        definition: "TIMESTAMPTZ",
    },
    ColumnSpec {
        name: "professional_upgraded_by_id",
        definition: "UUID",
    },
    ColumnSpec {
        name: "extra_fields",
        definition: "JSONB",
    },
];

pub const INDEXES: &[IndexSpec] = &[
    IndexSpec {
        name: "ix_users_is_professional",
        column: "is_professional",
    },
    IndexSpec {
        name: "ix_users_professional_status_updated_at",
        column: "professional_status_updated_at",
    },
    IndexSpec {
        name: "ix_users_professional_upgraded_by_id",
        column: "professional_upgraded_by_id",
    },
];

/// Names of the objects that currently exist on `users`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LiveSchema {
    pub columns: BTreeSet<String>,
    pub constraints: BTreeSet<String>,
    pub indexes: BTreeSet<String>,
}

impl LiveSchema {
    fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    fn has_constraint(&self, name: &str) -> bool {
        self.constraints.contains(name)
    }

    fn has_index(&self, name: &str) -> bool {
        self.indexes.contains(name)
    }

    /// True when every column, index and the foreign key are in place.
    pub fn is_fully_migrated(&self) -> bool {
        plan_upgrade(self).is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AddColumn(ColumnSpec),
    AddUpgradedByForeignKey,
    CreateIndex(IndexSpec),
    DropUpgradedByForeignKey,
    DropIndex(IndexSpec),
    DropColumn(ColumnSpec),
}

impl Step {
    pub fn sql(&self) -> String {
        match self {
            Step::AddColumn(c) => {
                format!("ALTER TABLE {TABLE} ADD COLUMN {} {}", c.name, c.definition)
            }
            Step::AddUpgradedByForeignKey => format!(
                "ALTER TABLE {TABLE} ADD CONSTRAINT {UPGRADED_BY_FK} \
                 FOREIGN KEY (professional_upgraded_by_id) REFERENCES {TABLE} (id) \
                 ON DELETE SET NULL"
            ),
            Step::CreateIndex(i) => format!("CREATE INDEX {} ON {TABLE} ({})", i.name, i.column),
            Step::DropUpgradedByForeignKey => {
                format!("ALTER TABLE {TABLE} DROP CONSTRAINT {UPGRADED_BY_FK}")
            }
            Step::DropIndex(i) => format!("DROP INDEX {}", i.name),
            Step::DropColumn(c) => format!("ALTER TABLE {TABLE} DROP COLUMN {}", c.name),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql())
    }
}

/// Steps that bring `live` up to the target schema. Empty when nothing is
/// missing.
pub fn plan_upgrade(live: &LiveSchema) -> Vec<Step> {
    let mut steps: Vec<Step> = COLUMNS
        .iter()
        .filter(|c| !live.has_column(c.name))
        .map(|c| Step::AddColumn(*c))
        .collect();

    if !live.has_constraint(UPGRADED_BY_FK) {
        steps.push(Step::AddUpgradedByForeignKey);
    }

    steps.extend(
        INDEXES
            .iter()
            .filter(|i| !live.has_index(i.name))
            .map(|i| Step::CreateIndex(*i)),
    );
    steps
}

/// Steps that remove whatever part of the target schema is present.
pub fn plan_downgrade(live: &LiveSchema) -> Vec<Step> {
    let mut steps = Vec::new();

    if live.has_constraint(UPGRADED_BY_FK) {
        steps.push(Step::DropUpgradedByForeignKey);
    }

    steps.extend(
        INDEXES
            .iter()
            .rev()
            .filter(|i| live.has_index(i.name))
            .map(|i| Step::DropIndex(*i)),
    );

    steps.extend(
        COLUMNS
            .iter()
            .rev()
            .filter(|c| live.has_column(c.name))
            .map(|c| Step::DropColumn(*c)),
    );
    steps
}

/// Reads the live catalog for `users` in the current schema.
pub async fn inspect(conn: &mut PgConnection) -> anyhow::Result<LiveSchema> {
    let columns = sqlx::query_scalar::<_, String>(
        r#"
        SELECT column_name::text
          FROM information_schema.columns
         WHERE table_schema = current_schema()
           AND table_name = $1
        "#,
    )
    .bind(TABLE)
    .fetch_all(&mut *conn)
    .await
    .context("read users columns")?;

    let constraints = sqlx::query_scalar::<_, String>(
        r#"
        SELECT constraint_name::text
          FROM information_schema.table_constraints
         WHERE table_schema = current_schema()
           AND table_name = $1
        "#,
    )
    .bind(TABLE)
    .fetch_all(&mut *conn)
    .await
    .context("read users constraints")?;

    let indexes = sqlx::query_scalar::<_, String>(
        r#"
        SELECT indexname::text
          FROM pg_indexes
         WHERE schemaname = current_schema()
           AND tablename = $1
        "#,
    )
    .bind(TABLE)
    .fetch_all(&mut *conn)
    .await
    .context("read users indexes")?;

    Ok(LiveSchema {
        columns: columns.into_iter().collect(),
        constraints: constraints.into_iter().collect(),
        indexes: indexes.into_iter().collect(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Inspects, plans and applies in one transaction. Returns the steps that
/// were executed; an empty list means the schema was already in place.
pub async fn run(db: &PgPool, direction: Direction) -> anyhow::Result<Vec<Step>> {
    let mut tx = db.begin().await.context("begin migration tx")?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(ADVISORY_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .context("acquire migration lock")?;

    let live = inspect(&mut *tx).await?;
    let steps = match direction {
        Direction::Up => plan_upgrade(&live),
        Direction::Down => plan_downgrade(&live),
    };

    for step in &steps {
        debug!(sql = %step, "applying schema step");
        sqlx::query(&step.sql())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("apply `{step}`"))?;
    }

    tx.commit().await.context("commit migration tx")?;
    info!(?direction, applied = steps.len(), "professional status schema step done");
    Ok(steps)
}

/// Computes what `run` would do without changing anything.
pub async fn pending(db: &PgPool, direction: Direction) -> anyhow::Result<Vec<Step>> {
    let mut conn = db.acquire().await.context("acquire connection")?;
    let live = inspect(&mut conn).await?;
    Ok(match direction {
        Direction::Up => plan_upgrade(&live),
        Direction::Down => plan_downgrade(&live),
    })
}
