use axum::{extract::Request, routing::any, Json, Router};
use docview_core::{BackendConfig, GatewayConfig};
use docview_gateway::GatewayServer;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

async fn start_backend() -> String {
    let app = Router::new().route(
        "/*path",
        any(|request: Request| async move {
            Json(json!({ "path": request.uri().path() }))
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Gateway on an ephemeral port; returns its base URL and a stop handle
async fn start_gateway(
    config: GatewayConfig,
) -> (String, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let server = GatewayServer::new(config).unwrap();
    let handle = tokio::spawn(async move {
        server
            .serve_with_shutdown(listener, async {
                let _ = stopped.await;
            })
            .await
            .unwrap();
    });
    (format!("http://{}", addr), stop, handle)
}

#[tokio::test]
async fn test_gateway_forwards_and_shuts_down() {
    let primary = start_backend().await;
    let face = start_backend().await;
    let config = GatewayConfig {
        backends: BackendConfig::new(primary, face),
        ..GatewayConfig::default()
    };
    let (base, stop, handle) = start_gateway(config).await;

    let body: Value = reqwest::get(format!("{}/api/documents?page=1", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["path"], "/api/documents");

    let body: Value = reqwest::Client::new()
        .post(format!("{}/api/recognize_face", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["path"], "/recognize_face");

    stop.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_unconfigured_gateway_still_serves_errors() {
    let (base, stop, handle) = start_gateway(GatewayConfig::default()).await;

    let response = reqwest::get(format!("{}/api/tags", base)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Target API URL is not configured on the server.");

    // Outside the mount prefix nothing is routed
    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    stop.send(()).unwrap();
    handle.await.unwrap();
}
