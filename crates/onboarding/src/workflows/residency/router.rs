use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::credentials::CredentialHasher;
use super::directory::ApartmentDirectory;
use super::domain::{PasswordChangeRequest, RegistrationRequest, StatusUpdateRequest, UserId, UserView};
use super::repository::UserRepository;
use super::service::{OnboardingError, ResidentOnboardingService};

const DEFAULT_PENDING_LIMIT: usize = 50;
const MAX_PENDING_LIMIT: usize = 500;

type SharedService<R, D, H> = Arc<ResidentOnboardingService<R, D, H>>;

/// Router builder exposing registration, approval, and review-queue endpoints.
pub fn onboarding_router<R, D, H>(service: SharedService<R, D, H>) -> Router
where
    R: UserRepository + 'static,
    D: ApartmentDirectory + 'static,
    H: CredentialHasher + 'static,
{
    Router::new()
        .route("/api/v1/users/register", post(register_handler::<R, D, H>))
        .route("/api/v1/users/:user_id", get(user_handler::<R, D, H>))
        .route(
            "/api/v1/users/:user_id/status",
            put(status_handler::<R, D, H>),
        )
        .route(
            "/api/v1/users/:user_id/password",
            put(password_handler::<R, D, H>),
        )
        .route(
            "/api/v1/approvals/pending",
            get(pending_handler::<R, D, H>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PendingQuery {
    pub(crate) limit: Option<usize>,
}

pub(crate) async fn register_handler<R, D, H>(
    State(service): State<SharedService<R, D, H>>,
    Json(request): Json<RegistrationRequest>,
) -> Response
where
    R: UserRepository + 'static,
    D: ApartmentDirectory + 'static,
    H: CredentialHasher + 'static,
{
    match service.register(request).await {
        Ok(user) => (StatusCode::CREATED, Json(user.view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn user_handler<R, D, H>(
    State(service): State<SharedService<R, D, H>>,
    Path(user_id): Path<String>,
) -> Response
where
    R: UserRepository + 'static,
    D: ApartmentDirectory + 'static,
    H: CredentialHasher + 'static,
{
    let Some(id) = UserId::parse(&user_id) else {
        return unknown_user(&user_id);
    };

    match service.get(&id) {
        Ok(user) => (StatusCode::OK, Json(user.view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler<R, D, H>(
    State(service): State<SharedService<R, D, H>>,
    Path(user_id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> Response
where
    R: UserRepository + 'static,
    D: ApartmentDirectory + 'static,
    H: CredentialHasher + 'static,
{
    let Some(id) = UserId::parse(&user_id) else {
        return unknown_user(&user_id);
    };

    match service.transition(&id, request) {
        Ok(user) => (StatusCode::OK, Json(user.view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn password_handler<R, D, H>(
    State(service): State<SharedService<R, D, H>>,
    Path(user_id): Path<String>,
    Json(request): Json<PasswordChangeRequest>,
) -> Response
where
    R: UserRepository + 'static,
    D: ApartmentDirectory + 'static,
    H: CredentialHasher + 'static,
{
    let Some(id) = UserId::parse(&user_id) else {
        return unknown_user(&user_id);
    };

    match service.change_password(&id, request).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn pending_handler<R, D, H>(
    State(service): State<SharedService<R, D, H>>,
    Query(query): Query<PendingQuery>,
) -> Response
where
    R: UserRepository + 'static,
    D: ApartmentDirectory + 'static,
    H: CredentialHasher + 'static,
{
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PENDING_LIMIT)
        .clamp(1, MAX_PENDING_LIMIT);

    match service.pending(limit) {
        Ok(users) => {
            let views: Vec<UserView> = users.iter().map(|user| user.view()).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) fn status_for(err: &OnboardingError) -> StatusCode {
    match err {
        OnboardingError::Validation(_)
        | OnboardingError::InvalidTransition(_)
        | OnboardingError::CredentialMismatch => StatusCode::BAD_REQUEST,
        OnboardingError::ApartmentNotFound { .. }
        | OnboardingError::BlockNotFound { .. }
        | OnboardingError::UserNotFound { .. }
        | OnboardingError::RoleNotFound { .. } => StatusCode::NOT_FOUND,
        OnboardingError::DuplicateEmail { .. } | OnboardingError::ConcurrentUpdate { .. } => {
            StatusCode::CONFLICT
        }
        OnboardingError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        OnboardingError::RoleNotConfigured(_)
        | OnboardingError::Credential(_)
        | OnboardingError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: OnboardingError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "onboarding request failed");
    }

    let payload = json!({
        "error": err.to_string(),
    });
    (status, Json(payload)).into_response()
}

fn unknown_user(raw: &str) -> Response {
    let payload = json!({
        "error": format!("user {raw} not found"),
    });
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}
