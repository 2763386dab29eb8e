use axum::{
    extract::{Request, State as AxumState},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Service;

mod http;

/// HTTP surface of the settlement service. The stake endpoint is public;
/// settlement and admin endpoints sit behind the shared-secret trust
/// boundary.
pub struct Api {
    service: Arc<Service>,
}

impl Api {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::HeaderName::from_static("x-request-id"),
            ]);

        Router::new()
            .route("/healthz", get(http::healthz))
            .route("/stake", post(http::stake))
            .route("/settlement/payout", post(http::settlement_payout))
            .route("/settlement/refund", post(http::settlement_refund))
            .route("/admin/payment-jobs", get(http::list_payment_jobs))
            .route("/admin/payment-jobs/:id/retry", post(http::retry_payment_job))
            .route("/metrics/http", get(http::http_metrics))
            .layer(cors)
            .layer(middleware::from_fn_with_state(
                self.service.clone(),
                request_id_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.service.clone())
    }
}

async fn request_id_middleware(
    AxumState(service): AxumState<Arc<Service>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static("x-request-id"))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    if response.status() == StatusCode::UNAUTHORIZED {
        service.http_metrics().inc_auth_rejects();
    }
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static("x-request-id"),
            header_value,
        );
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}

/// Fixed-time byte comparison for the shared settlement secret, so a
/// mismatching prefix costs the same as a mismatching suffix.
pub(crate) fn eq_constant_time(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (left, right) in a.iter().zip(b.iter()) {
        diff |= left ^ right;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(eq_constant_time(b"secret", b"secret"));
        assert!(!eq_constant_time(b"secret", b"secres"));
        assert!(!eq_constant_time(b"secret", b"secre"));
        assert!(!eq_constant_time(b"", b"x"));
        assert!(eq_constant_time(b"", b""));
    }
}
