use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::handlers::{healthz, metrics, AppState};

/// Build the scrape-endpoint router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `/healthz` and `/metrics` on `bind` until `cancel` fires.
pub async fn run_server(
    bind: &str,
    registry: Registry,
    cancel: CancellationToken,
) -> Result<(), std::io::Error> {
    let state = Arc::new(AppState { registry });
    let app = build_router(state);

    let listener = TcpListener::bind(bind).await?;
    tracing::info!(addr = %bind, "scrape endpoints listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    tracing::info!("scrape endpoints stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    use crate::metrics::Bundle;

    fn test_app() -> (Bundle, Router) {
        let bundle = Bundle::new();
        let state = Arc::new(AppState {
            registry: bundle.registry.clone(),
        });
        let router = build_router(state);
        (bundle, router)
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let (_bundle, app) = test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
    }

    #[tokio::test]
    async fn metrics_exposes_registry() {
        let (_bundle, app) = test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("uptiq_build_info"));
        assert!(text.contains("uptiq_config_reload_success"));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (_bundle, app) = test_app();

        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
