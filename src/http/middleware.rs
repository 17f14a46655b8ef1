//! Admission middleware for axum routers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tracing::{trace, warn};

use crate::ratelimit::{AdmissionControl, ClientKey, Decision};

/// Header carrying the originating client address when behind a proxy.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Admission control shared by every connection.
pub type SharedAdmission = Arc<dyn AdmissionControl>;

/// Wrap every route of `router` with admission control.
pub fn protect<S>(router: Router<S>, admission: SharedAdmission) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(admission, admission_middleware))
}

/// Derive the client key for a request.
///
/// Uses the first `X-Forwarded-For` value as given, then the peer IP. When
/// neither yields an address the request is counted against the shared
/// fallback key rather than skipping the limiter.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientKey {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(addr) = forwarded {
        return ClientKey::from(addr);
    }

    match peer {
        Some(addr) => ClientKey::from(addr.ip().to_string()),
        None => ClientKey::fallback(),
    }
}

/// Check the caller against the limiter before running the rest of the stack.
pub async fn admission_middleware(
    State(admission): State<SharedAdmission>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer);

    let decision = admission.allow(&key);
    if decision.admitted {
        trace!(key = %key, "Request admitted");
        return next.run(request).await;
    }

    warn!(
        key = key.as_str(),
        method = %request.method(),
        path = %request.uri().path(),
        retry_after_secs = decision.retry_after_secs(),
        "Rate limit exceeded"
    );
    rate_limit_exceeded(decision)
}

fn rate_limit_exceeded(decision: Decision) -> Response {
    let secs = decision.retry_after_secs();
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, secs.to_string())],
        Json(serde_json::json!({
            "error": format!("rate limit exceeded, retry after: {}s", secs),
        })),
    )
        .into_response()
}
