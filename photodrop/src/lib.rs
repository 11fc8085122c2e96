//! # photodrop: profile photo uploads
//!
//! `photodrop` is a small HTTP service that accepts a single image per request, stores it on
//! local disk under a generated name and tells the caller where it can be fetched from.
//!
//! ## Request Flow
//!
//! `POST /api/upload` takes a `multipart/form-data` body with a `userId` text field and a
//! `file` field. The declared content type of the file must be an image, and the file may not
//! exceed the configured size (5MB by default). The bytes are streamed into a staging file in
//! the upload directory and, once the form has been read completely, linked to
//! `<userId>-<unix millis><ext>`. The response is `{ "path": "/uploads/profile-photos/..." }`.
//!
//! Every other request is answered from the public directory, which is also where the upload
//! directory lives, so returned paths can be fetched as-is. Dotfiles, including in-flight
//! staging files, are never served.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use photodrop::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = photodrop::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     photodrop::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod config;
pub mod errors;
pub mod openapi;
pub mod static_files;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use anyhow::Context;
use axum::{Router, extract::DefaultBodyLimit, routing::post};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use storage::PhotoStore;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, instrument};

/// Room on top of the file size limit for multipart boundaries, part headers and the
/// `userId` field, so the per-file check is what normally trips first.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .store(Arc::new(store))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<PhotoStore>,
}

/// Build the application router.
///
/// - `POST /api/upload` with a body limit derived from `uploads.max_file_size`
/// - static files from `public_dir` for everything else, dotfiles excluded
/// - request tracing
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> Router {
    let body_limit = usize::try_from(state.config.uploads.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route(
            "/api/upload",
            post(api::handlers::uploads::upload_photo).layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state.clone())
        .fallback_service(static_files::router(&state.config.public_dir))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// The HTTP server and the resources it owns.
///
/// 1. **Create**: [`Application::new`] creates the upload directory and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance, making sure the upload directory exists.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting photodrop with configuration: {:#?}", config);

        let store = PhotoStore::new(&config.public_dir, &config.uploads.subdir);
        store
            .ensure_dir()
            .await
            .with_context(|| format!("Failed to create upload directory {}", store.dir().display()))?;
        info!(dir = %store.dir().display(), "Upload directory ready");

        let app_state = AppState::builder().config(config.clone()).store(Arc::new(store)).build();
        let router = build_router(&app_state);

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Server running on port {} (http://{})", self.config.port, bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Server stopped");
        Ok(())
    }
}
