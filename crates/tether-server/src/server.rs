use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use tether_client::RemoteServiceClient;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;
use crate::translate::NameTranslator;

/// Receives pushes from the daemon.
pub struct TetherServer {
    config: ServerConfig,
    state: AppState,
}

impl TetherServer {
    pub fn new(config: ServerConfig, client: Arc<RemoteServiceClient>, translator: Arc<dyn NameTranslator>) -> Self {
        Self { config, state: AppState { client, translator } }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> ServerResult<()> {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind { addr, source })?;
        info!(%addr, "tether server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("tether server stopped");
        Ok(())
    }
}
