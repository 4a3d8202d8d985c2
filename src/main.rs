use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sql_approval_gate::config::{config, AppConfig};
use sql_approval_gate::server;
use sql_approval_gate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, TRANSLATOR_API_KEY, etc.
    let _ = dotenvy::dotenv();

    let config = config().clone();
    init_tracing(&config);
    info!("Starting SQL approval gate in {:?} mode", config.environment);

    let port = config.api.port;
    let state = AppState::from_config(config).await?;
    let databases = state.databases.clone();

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Listening on http://{}", bind_addr);

    server::serve(listener, state, server::shutdown_signal()).await?;

    if let Some(databases) = databases {
        databases.close_all().await;
    }
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let mut default_filter = String::from("info,sql_approval_gate=debug");
    if config.api.enable_request_logging {
        default_filter.push_str(",tower_http=debug");
    }
    if config.database.enable_query_logging {
        default_filter.push_str(",sqlx=info");
    } else {
        default_filter.push_str(",sqlx=warn");
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
