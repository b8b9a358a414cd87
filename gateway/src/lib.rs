//! Docview gateway
//!
//! Serves the edge router over HTTP: every request under the mount prefix
//! is forwarded to the primary or face-recognition backend.

use axum::Router;
use docview_core::{DocviewError, EdgeRouter, GatewayConfig};
use std::future::Future;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Core(#[from] DocviewError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

pub struct GatewayServer {
    config: GatewayConfig,
    router: EdgeRouter,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        if config.backends.primary_url.is_none() {
            warn!(target: "gateway", "Primary backend URL is not set; its routes will answer 500");
        }
        if config.backends.face_recog_url.is_none() {
            warn!(target: "gateway", "Face recognition backend URL is not set; its routes will answer 500");
        }

        let router = EdgeRouter::new(config.backends.clone())?
            .with_mount_prefix(config.mount_prefix.clone());
        Ok(Self { config, router })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Edge router with request tracing and permissive CORS
    pub fn app(&self) -> Router {
        self.router
            .clone()
            .router()
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
    }

    /// Bind the configured address and serve until Ctrl+C
    pub async fn serve(self) -> Result<(), GatewayError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_with_shutdown<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr()?;
        info!(
            target: "gateway",
            url = %format!("http://{}{}", local, self.config.mount_prefix),
            primary = ?self.config.backends.primary_url,
            face_recognition = ?self.config.backends.face_recog_url,
            "Gateway ready"
        );

        axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!(target: "gateway", "Gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: "gateway", "Shutdown signal received"),
        Err(e) => warn!(target: "gateway", error = %e, "Failed to listen for Ctrl+C"),
    }
}
