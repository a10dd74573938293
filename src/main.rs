use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use corebank::config::Config;
use corebank::services::notifications;
use corebank::{create_router, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "corebank=info".into()),
        )
        .init();

    let config = Config::from_env().expect("invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to Postgres");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let state = AppState {
        pool,
        config: config.clone(),
    };

    if config.notify_sink_url.is_some() {
        tokio::spawn(notifications::dispatch_notifications(state.clone()));
    }

    let app = create_router(state);

    tracing::info!(addr = %config.bind_addr, "server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app).await.expect("server error");
}
