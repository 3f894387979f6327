//! `RelayServer`: axum router and listener.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};
use relay_runtime::ConnectionManager;
use relay_settings::Directory;
use relay_store::RegistrationStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::routes;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection lifecycle authority.
    pub manager: Arc<ConnectionManager>,
    /// Registration table.
    pub store: Arc<dyn RegistrationStore>,
    /// App and instance lookup tables.
    pub directory: Arc<Directory>,
    /// When the server started.
    pub start_time: Instant,
}

/// The relay's HTTP server.
pub struct RelayServer {
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl RelayServer {
    /// Create a server over the given collaborators.
    pub fn new(
        manager: Arc<ConnectionManager>,
        store: Arc<dyn RegistrationStore>,
        directory: Directory,
    ) -> Self {
        Self {
            state: AppState {
                manager,
                store,
                directory: Arc::new(directory),
                start_time: Instant::now(),
            },
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(routes::root))
            .route("/health", get(routes::health))
            .route("/register", post(routes::register))
            .route("/unregister", post(routes::unregister))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Serve on `listener` until shutdown is requested.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "listening");
        }
        let token = self.shutdown.token();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
