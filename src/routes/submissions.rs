use crate::{access::AccessScope, error::Result, middleware::auth::Claims, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

#[axum::debug_handler]
pub async fn start_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let submission = state
        .submission_service
        .start_submission(&scope, assessment_id)
        .await?;
    Ok((StatusCode::OK, Json(submission)))
}

#[axum::debug_handler]
pub async fn submit_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let submission = state
        .submission_service
        .submit_submission(&scope, assessment_id)
        .await?;
    Ok(Json(submission))
}

pub async fn resubmit_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let submission = state
        .submission_service
        .resubmit_submission(&scope, assessment_id)
        .await?;
    Ok(Json(submission))
}

pub async fn cancel_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let submission = state
        .submission_service
        .cancel_submission(&scope, assessment_id)
        .await?;
    Ok(Json(submission))
}

/// The caller's own published result. Unpublished work reads as absent.
pub async fn my_result(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let submission = state
        .submission_service
        .my_result(&scope, assessment_id)
        .await?;
    Ok(Json(submission))
}

pub async fn list_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let results = state
        .submission_service
        .list_results(&scope, assessment_id)
        .await?;
    Ok(Json(results))
}
