//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/sync/status", get(handlers::sync_status))
        .route("/sync/cycles/last", get(handlers::last_cycle))
        .route("/sync/trigger", post(handlers::trigger_sync))
        .route("/sync/events", get(handlers::get_events))
        .route("/sync/events/stream", get(handlers::stream_events));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::rest::handlers::HealthCheckResponse;
    use crate::cluster::LocalCluster;
    use crate::config::SyncConfig;
    use crate::scheduler::Scheduler;
    use crate::storage::InMemoryDocumentStore;
    use crate::sync::{EventPublisher, SyncUpCron};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use modelsync_crypto::MasterKeyEncryptor;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{broadcast, mpsc};
    use tower::ServiceExt;

    fn test_state() -> (AppState, mpsc::Receiver<()>) {
        let cluster = LocalCluster::with_nodes(["n1"]);
        let (tx, _) = broadcast::channel(64);
        let cron = Arc::new(SyncUpCron::new(
            &SyncConfig::default(),
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(cluster.clone()),
            Arc::new(cluster),
            Arc::new(MasterKeyEncryptor::new()),
            EventPublisher::new(tx),
        ));
        let (scheduler, rx) = Scheduler::new(Duration::from_secs(10), cron.clone());
        (AppState::new(cron, scheduler), rx)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_returns_200() {
        let (state, _rx) = test_state();
        let app = create_router(state, true);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthCheckResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn status_reports_last_cycle() {
        let (state, _rx) = test_state();
        let cron = state.cron.clone();

        let (status, json) = get_json(create_router(state.clone(), false), "/api/v1/sync/status").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["last_cycle"].is_null());
        assert_eq!(json["gate_open"], true);

        let report = cron.run_cycle().await;
        let (_, json) = get_json(create_router(state, false), "/api/v1/sync/status").await;
        assert_eq!(json["last_cycle"]["cycle_id"], serde_json::to_value(report.cycle_id).unwrap());
        assert_eq!(json["last_cycle"]["outcome"], "no_model_index");
        assert!(json["master_key_fingerprint"].is_string());
    }

    #[tokio::test]
    async fn last_cycle_is_404_before_first_run() {
        let (state, _rx) = test_state();
        let (status, json) = get_json(create_router(state, false), "/api/v1/sync/cycles/last").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn trigger_enqueues_a_cycle() {
        let (state, mut rx) = test_state();
        let resp = create_router(state, false)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/sync/trigger")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn second_pending_trigger_is_rejected() {
        let (state, _rx) = test_state();
        let trigger = || {
            Request::builder()
                .method("POST")
                .uri("/api/v1/sync/trigger")
                .body(Body::empty())
                .unwrap()
        };

        let first = create_router(state.clone(), false).oneshot(trigger()).await.unwrap();
        assert_eq!(first.status(), StatusCode::ACCEPTED);

        let second = create_router(state, false).oneshot(trigger()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn events_validate_limit() {
        let (state, _rx) = test_state();
        state.cron.run_cycle().await;

        let (status, json) = get_json(create_router(state.clone(), false), "/api/v1/sync/events?limit=5").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!json.as_array().unwrap().is_empty());

        let (status, _) = get_json(create_router(state, false), "/api/v1/sync/events?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
