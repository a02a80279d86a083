//! HTTP server wiring: shared state, router and the serve loop.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use color_eyre::{eyre::WrapErr, Result};
use localhub_core::tasks::TaskRepository;
use localhub_storage::encrypted_vault::EncryptedFileVault;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{config::Settings, routes, storage};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Shared state handed to every handler.
pub struct AppState {
    pub vault: Arc<EncryptedFileVault>,
    pub tasks: Arc<dyn TaskRepository>,
    pub settings: Settings,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(
        state
            .settings
            .max_upload_bytes
            .saturating_add(MULTIPART_OVERHEAD),
    )
    .unwrap_or(usize::MAX);

    Router::new()
        .merge(routes::ops::router())
        .merge(routes::tasks::router())
        .merge(routes::files::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the vault (fatal if the key is unavailable) and serve until Ctrl-C/SIGTERM.
pub async fn run(settings: Settings) -> Result<()> {
    let vault = storage::open_vault(&settings)?;
    let state = Arc::new(AppState {
        vault: Arc::new(vault),
        tasks: Arc::new(storage::task_repo(&settings)),
        settings: settings.clone(),
    });

    let listener = TcpListener::bind(settings.bind)
        .await
        .wrap_err_with(|| format!("failed to bind to {}", settings.bind))?;
    info!(addr = %settings.bind, vault = %settings.vault_dir.display(), "LocalHub listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    info!("LocalHub stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl-C: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
