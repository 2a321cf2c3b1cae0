//! Metrics HTTP endpoint for daemon mode

use crate::metrics;
use crate::APP_NAME;
use axum::{http::StatusCode, response::Html, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const METRICS_PATH: &str = "/metrics";

/// Routes served by the metrics server
pub fn routes() -> Router {
    Router::new()
        .route("/", get(index))
        .route(METRICS_PATH, get(metrics_endpoint))
        .layer(TraceLayer::new_for_http())
}

async fn index() -> Html<String> {
    Html(format!(
        "<html>\n<head><title>{name}</title></head>\n<body>\n<h1>{name}</h1>\n<p><a href='{path}'>Metrics</a></p>\n</body>\n</html>",
        name = APP_NAME,
        path = METRICS_PATH
    ))
}

async fn metrics_endpoint() -> Result<String, (StatusCode, String)> {
    metrics::export_metrics().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

/// Serve metrics on `addr` until the task is dropped
pub async fn start_metrics_server(addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Metrics server listening");

    axum::serve(listener, routes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_index_links_metrics() {
        let response = routes()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("href='/metrics'"));
        assert!(body.contains(APP_NAME));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        metrics::init_metrics();
        let response = routes()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("subid_sync_build_info"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = routes()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
