use profilehub::{app, config::AppConfig, schema, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "profilehub=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let addr = config.bind_addr();
    let run_migrations = config.db.run_migrations;

    let state = AppState::init(config).await?;

    if run_migrations {
        let applied = schema::migrate(&state.db).await?;
        tracing::info!(steps = applied.len(), "schema up to date");
    } else {
        tracing::info!("RUN_MIGRATIONS disabled; skipping schema checks");
    }

    app::serve(app::build_app(state), &addr).await
}
