//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{protect, SharedAdmission};
use crate::error::{Result, TollgateError};

/// Details reported by the health endpoint.
#[derive(Debug, Clone)]
struct HealthInfo {
    env: String,
}

async fn health_handler(State(info): State<Arc<HealthInfo>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "env": info.env,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Build the service router with every `/v1` route behind admission control.
pub fn router(env: &str, admission: SharedAdmission) -> Router {
    let info = Arc::new(HealthInfo {
        env: env.to_string(),
    });

    let v1 = Router::new()
        .route("/v1/health", get(health_handler))
        .with_state(info);

    protect(v1, admission)
}

/// HTTP server for the protected routes.
pub struct HttpServer {
    /// Bound listener
    listener: TcpListener,
    /// Routes to serve
    router: Router,
}

impl HttpServer {
    /// Bind the server to `addr`.
    pub async fn bind(addr: SocketAddr, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, router })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Starting HTTP server");

        // Peer addresses are needed to key callers without a forwarded header
        let service = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(self.listener, service)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                TollgateError::Io(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::FORWARDED_FOR;
    use crate::ratelimit::FixedWindowLimiter;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tower::ServiceExt;

    fn limited(limit: u64, enabled: bool) -> Router {
        let limiter = if enabled {
            FixedWindowLimiter::new(limit, Duration::from_secs(5)).unwrap()
        } else {
            FixedWindowLimiter::disabled()
        };
        router("test", Arc::new(limiter))
    }

    async fn get_health(app: &Router, forwarded_for: &str) -> axum::response::Response {
        let request = Request::builder()
            .uri("/v1/health")
            .header(FORWARDED_FOR, forwarded_for)
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_enforces_limit_per_client() {
        let app = limited(20, true);

        for i in 1..=22 {
            let response = get_health(&app, "192.168.1.1").await;
            if i <= 20 {
                assert_eq!(response.status(), StatusCode::OK, "Request {} should be OK", i);
            } else {
                assert_eq!(
                    response.status(),
                    StatusCode::TOO_MANY_REQUESTS,
                    "Request {} should be rate limited",
                    i
                );
                let retry_after: u64 = response.headers()[header::RETRY_AFTER]
                    .to_str()
                    .unwrap()
                    .parse()
                    .unwrap();
                assert!(retry_after <= 5);
            }
        }
    }

    #[tokio::test]
    async fn test_tracks_clients_separately() {
        let app = limited(5, true);

        for _ in 0..5 {
            assert_eq!(get_health(&app, "192.168.1.1").await.status(), StatusCode::OK);
        }
        for _ in 0..5 {
            assert_eq!(get_health(&app, "192.168.1.2").await.status(), StatusCode::OK);
        }

        assert_eq!(
            get_health(&app, "192.168.1.1").await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn test_disabled_admits_everything() {
        let app = limited(5, false);

        for _ in 0..10 {
            assert_eq!(get_health(&app, "192.168.1.1").await.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_health_body() {
        let app = limited(5, true);
        let response = get_health(&app, "192.168.1.1").await;

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["env"], "test");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    async fn raw_get(addr: SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /v1/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_server_keys_by_peer_address() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = HttpServer::bind(addr, limited(2, true)).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_with_shutdown(async move {
            let _ = shutdown_rx.await;
        }));

        assert!(raw_get(addr).await.starts_with("HTTP/1.1 200"));
        assert!(raw_get(addr).await.starts_with("HTTP/1.1 200"));

        let denied = raw_get(addr).await;
        assert!(denied.starts_with("HTTP/1.1 429"));
        assert!(denied.to_ascii_lowercase().contains("retry-after:"));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
