//! Operator entry point for the professional-status schema.
//!
//! `up` and `down` are existence-checked and can be repeated; `plan` prints
//! what `up` (or `down` with `--down`) would execute.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use profilehub::schema::{self, professional_status, Direction};

#[derive(Parser, Debug)]
#[command(name = "profilehub-schema", about = "Manage the users schema")]
struct Cli {
    /// Defaults to DATABASE_URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run versioned migrations, then add any missing professional-status objects.
    Up,
    /// Drop the professional-status objects that exist.
    Down,
    /// Print pending steps without applying them.
    Plan {
        #[arg(long)]
        down: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "profilehub=info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let db = PgPoolOptions::new()
        .max_connections(1)
        .connect(&cli.database_url)
        .await
        .context("connect to database")?;

    let steps = match cli.command {
        Command::Up => schema::migrate(&db).await?,
        Command::Down => professional_status::run(&db, Direction::Down).await?,
        Command::Plan { down } => {
            let direction = if down { Direction::Down } else { Direction::Up };
            professional_status::pending(&db, direction).await?
        }
    };

    if steps.is_empty() {
        println!("nothing to do");
    }
    for step in steps {
        println!("{step};");
    }
    Ok(())
}
