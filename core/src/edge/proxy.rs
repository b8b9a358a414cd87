// Edge router HTTP handler
//
// Forwards every request under the mount prefix to one of the two backends
// and relays the backend response back untouched.

use crate::config::BackendConfig;
use crate::edge::rules::{logical_path, RouteTable, Target};
use crate::{DocviewError, Result};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Terminal router failures; neither is retried
#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("Target API URL is not configured on the server.")]
    Unconfigured(Target),

    #[error("Error forwarding request to the backend.")]
    Upstream(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Unconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Stateless edge router
#[derive(Clone)]
pub struct EdgeRouter {
    routes: Arc<RouteTable>,
    backends: Arc<BackendConfig>,
    mount_prefix: String,
    http: reqwest::Client,
}

impl EdgeRouter {
    pub fn new(backends: BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(backends.request_timeout())
            .build()
            .map_err(|e| DocviewError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            routes: Arc::new(RouteTable::default()),
            backends: Arc::new(backends),
            mount_prefix: "/api".to_string(),
            http,
        })
    }

    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = Arc::new(routes);
        self
    }

    pub fn with_mount_prefix(mut self, mount_prefix: impl Into<String>) -> Self {
        self.mount_prefix = mount_prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    /// Axum router serving `{mount_prefix}/*path` for every method
    pub fn router(self) -> Router {
        let mount = self.mount_prefix.clone();
        Router::new()
            .route(&mount, any(forward_handler))
            .route(&format!("{}/*path", mount), any(forward_handler))
            .with_state(self)
    }

    fn base_url(&self, target: Target) -> Option<&str> {
        match target {
            Target::Primary => self.backends.primary_url.as_deref(),
            Target::FaceRecognition => self.backends.face_recog_url.as_deref(),
        }
    }

    /// Forward one inbound request and relay the backend's answer
    pub async fn forward(&self, request: Request) -> Response {
        match self.try_forward(request).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }

    async fn try_forward(&self, request: Request) -> std::result::Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();
        let logical = logical_path(&self.mount_prefix, parts.uri.path());
        let resolution = self.routes.resolve(&logical);

        let base = self.base_url(resolution.target).ok_or_else(|| {
            warn!(target: "edge", target_backend = %resolution.target, path = %logical, "Backend URL not configured");
            ProxyError::Unconfigured(resolution.target)
        })?;
        let url = RouteTable::target_url(base, &resolution, parts.uri.query());

        debug!(
            target: "edge",
            method = %parts.method,
            path = %logical,
            target_backend = %resolution.target,
            url = %url,
            "Forwarding request"
        );

        let mut outbound = self.http.request(parts.method.clone(), &url);
        if let Some(content_type) = parts.headers.get(header::CONTENT_TYPE) {
            outbound = outbound.header(header::CONTENT_TYPE, content_type.clone());
        }
        if parts.method != Method::GET && parts.method != Method::HEAD {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = outbound.send().await.map_err(|e| {
            warn!(target: "edge", url = %url, error = %e, "API proxy error");
            ProxyError::Upstream(e.to_string())
        })?;

        debug!(target: "edge", url = %url, status = %upstream.status(), "Relaying backend response");
        Ok(relay(upstream))
    }
}

async fn forward_handler(State(router): State<EdgeRouter>, request: Request) -> Response {
    router.forward(request).await
}

/// Copy status, headers and a streamed body from the backend response.
///
/// `connection` and `transfer-encoding` are dropped: the server re-frames the
/// body itself, everything else passes through as received.
fn relay(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers: HeaderMap = upstream.headers().clone();
    headers.remove(header::CONNECTION);
    headers.remove(header::TRANSFER_ENCODING);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_error_statuses() {
        assert_eq!(
            ProxyError::Unconfigured(Target::Primary).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::Upstream("connection refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn mount_prefix_is_normalized() {
        let router = EdgeRouter::new(BackendConfig::default())
            .unwrap()
            .with_mount_prefix("/gateway/");
        assert_eq!(router.mount_prefix(), "/gateway");
    }
}
