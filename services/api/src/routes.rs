use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use onboarding::workflows::residency::{
    onboarding_router, ApartmentDirectory, CredentialHasher, ResidentOnboardingService,
    UserRepository,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_onboarding_routes<R, D, H>(
    service: Arc<ResidentOnboardingService<R, D, H>>,
) -> axum::Router
where
    R: UserRepository + 'static,
    D: ApartmentDirectory + 'static,
    H: CredentialHasher + 'static,
{
    onboarding_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Acquire);
    if ready {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "initializing" })),
        )
    }
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::InMemoryUserStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use onboarding::workflows::residency::{
        ApartmentId, BlockSet, CredentialError, DirectoryError, PasswordHash, RegistrationPolicy,
        RoleRegistry,
    };
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    struct OneApartment;

    #[async_trait]
    impl ApartmentDirectory for OneApartment {
        async fn lookup(&self, apartment_id: ApartmentId) -> Result<BlockSet, DirectoryError> {
            if apartment_id == ApartmentId(1) {
                Ok(["Block A".to_string()].into_iter().collect())
            } else {
                Err(DirectoryError::NotFound(apartment_id))
            }
        }
    }

    struct NoopHasher;

    impl CredentialHasher for NoopHasher {
        fn hash(&self, plaintext: &str) -> Result<PasswordHash, CredentialError> {
            Ok(PasswordHash::new(plaintext))
        }

        fn verify(&self, plaintext: &str, hash: &PasswordHash) -> Result<bool, CredentialError> {
            Ok(plaintext == hash.as_str())
        }
    }

    fn app(ready: bool) -> axum::Router {
        let service = Arc::new(ResidentOnboardingService::new(
            Arc::new(InMemoryUserStore::default()),
            Arc::new(OneApartment),
            Arc::new(NoopHasher),
            Arc::new(RoleRegistry::standard()),
            RegistrationPolicy::default(),
        ));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_onboarding_routes(service).layer(Extension(state))
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn readiness_reflects_startup_flag() {
        let (status, body) = get(app(false), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "initializing");

        let (status, body) = get(app(true), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn onboarding_routes_are_mounted_next_to_probes() {
        let (status, _) = get(app(true), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get(app(true), "/api/v1/approvals/pending").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
}
