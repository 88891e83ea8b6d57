use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response},
    middleware::Next,
};
use tracing::Instrument;
use uuid::Uuid;

const CORRELATION_HEADER: &str = "x-correlation-id";

/// Echo the caller's `X-Correlation-ID`, generating one if absent, and thread it
/// through a `tracing` span so every log line emitted for this request carries it.
pub async fn correlation_middleware(req: Request<Body>, next: Next) -> Response<Body> {
    let correlation_id = req
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", correlation_id = %correlation_id);
    let mut res = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        res.headers_mut()
            .insert(HeaderName::from_static(CORRELATION_HEADER), value);
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::Request, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(correlation_middleware))
    }

    #[tokio::test]
    async fn generates_correlation_id_when_absent() {
        let res = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let header = res
            .headers()
            .get(CORRELATION_HEADER)
            .expect("correlation id header present");
        assert!(Uuid::parse_str(header.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn echoes_caller_supplied_correlation_id() {
        let res = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(CORRELATION_HEADER, "caller-supplied-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            res.headers().get(CORRELATION_HEADER).unwrap(),
            "caller-supplied-id"
        );
    }
}
