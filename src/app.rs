use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::supabase::{SupabaseApi, SupabaseClient};
use crate::webhook;

const MAX_BODY_BYTES: usize = 1024 * 1024; // 1MB safety cap

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SupabaseApi>,
    pub webhook_secret: Option<String>,
}

pub async fn run_server(config: Config) -> Result<()> {
    let store: Arc<dyn SupabaseApi> = Arc::new(SupabaseClient::new(
        &config.supabase_url,
        &config.supabase_anon_key,
        &config.supabase_service_role_key,
    )?);

    if config.webhook_api_key.is_some() {
        info!("Webhook authentication enabled (x-api-key)");
    } else {
        warn!("WEBHOOK_API_KEY not set - inbound webhook calls are unauthenticated");
    }

    let state = AppState {
        store,
        webhook_secret: config.webhook_api_key,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/webhook", post(webhook::receive).get(webhook::probe))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
