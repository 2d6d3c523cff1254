//! HTTP front end for the file repository.
//!
//! Routes:
//! - `GET /api/files?path=` lists a directory as JSON
//! - `GET /api/files/download?path=` downloads a file
//! - `POST /api/upload` stores multipart file fields
//! - `GET /` and `GET /<path>` browse: directories list, files download,
//!   and `<dir>.zip` streams an archive of `<dir>`

pub mod auth;
pub mod error;
pub mod handlers;
pub mod tls;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use axum_server::Handle;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::files::{FileRepository, Root};

pub use auth::Credentials;
pub use error::ApiError;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<FileRepository>,
    /// Chunks buffered per uploaded file between request and disk.
    pub pipe_capacity: usize,
}

/// Build the application router.
pub fn router(repository: FileRepository, config: &Config) -> Router {
    let state = AppState {
        repository: Arc::new(repository),
        pipe_capacity: config.file.archive_buffer_chunks,
    };
    let upload_limit = usize::try_from(config.file.max_size).unwrap_or(usize::MAX);

    let mut app = Router::new()
        .route("/api/files", get(handlers::list_files))
        .route("/api/files/download", get(handlers::download_file))
        .route(
            "/api/upload",
            post(handlers::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/", get(handlers::browse_root))
        .route("/*path", get(handlers::browse))
        .with_state(state);

    if let Some(credentials) = Credentials::from_config(&config.security) {
        app = app.layer(middleware::from_fn_with_state(
            Arc::new(credentials),
            auth::require_basic_auth,
        ));
    }

    app.layer(TraceLayer::new_for_http())
}

/// Serve the configured root until a shutdown signal arrives.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let root = Root::new(&config.file.root).with_context(|| {
        format!(
            "Failed to open shared directory {}",
            config.file.root.display()
        )
    })?;
    let addr = config.http.bind_addr()?;

    info!(
        root = %root.path().display(),
        %addr,
        tls = config.http.tls,
        auth = config.security.auth_enabled(),
        "Starting dirshare"
    );

    let repository =
        FileRepository::new(root).with_archive_capacity(config.file.archive_buffer_chunks);
    let app = router(repository, &config);

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(
        handle.clone(),
        config.http.shutdown_timeout(),
    ));

    if config.http.tls {
        let tls = tls::self_signed_config(addr.ip())
            .await
            .context("Failed to set up TLS")?;
        info!("Serving HTTPS with a self-signed certificate");
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;
    } else {
        axum_server::bind(addr)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(handle: Handle, timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    handle.graceful_shutdown(Some(timeout));
}
