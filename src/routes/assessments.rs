use crate::{
    access::AccessScope,
    dto::assessment_dto::{AddQuestionPayload, CreateAssessmentPayload, ScheduleAssessmentPayload},
    dto::submission_dto::AddAnswerPayload,
    error::{Error, Result},
    middleware::auth::Claims,
    services::identity_service::IdentityResult,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

fn caller_id(claims: &Claims) -> Result<Uuid> {
    claims
        .sub
        .parse()
        .map_err(|_| Error::Unauthorized("malformed subject claim".to_string()))
}

#[axum::debug_handler]
pub async fn create_assessment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAssessmentPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let scope = AccessScope::from_claims(&claims)?;
    let assessment = state
        .assessment_service
        .create_assessment(
            &scope,
            caller_id(&claims)?,
            payload.title,
            payload.description,
            payload.class_id,
            payload.sub_subject_id,
            payload.time_limit_minutes,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(assessment)))
}

#[derive(Debug, serde::Deserialize, Default)]
#[serde(default)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn list_assessments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let (assessments, total) = state
        .assessment_service
        .list_assessments(&scope, page, per_page)
        .await?;
    Ok(Json(json!({
        "assessments": assessments,
        "total": total,
        "page": page,
        "per_page": per_page,
    })))
}

pub async fn get_assessment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let assessment = state.assessment_service.get_assessment(&scope, id).await?;
    Ok(Json(assessment))
}

#[axum::debug_handler]
pub async fn schedule_assessment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ScheduleAssessmentPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let scope = AccessScope::from_claims(&claims)?;
    let assessment = state
        .assessment_service
        .schedule_assessment(
            &scope,
            id,
            payload.start_date,
            payload.due_date,
            &payload.timezone,
        )
        .await?;
    Ok(Json(assessment))
}

#[axum::debug_handler]
pub async fn add_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddQuestionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let scope = AccessScope::from_claims(&claims)?;
    let question = state
        .assessment_service
        .add_question(&scope, id, payload.points, payload.ordinal)
        .await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn list_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let questions = state.assessment_service.list_questions(&scope, id).await?;
    Ok(Json(questions))
}

/// Grading-state view for the owning instructor, pre-publication.
pub async fn list_submissions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let submissions = state
        .submission_service
        .list_submissions(&scope, id)
        .await?;
    Ok(Json(submissions))
}

#[axum::debug_handler]
pub async fn add_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assessment_id, submission_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<AddAnswerPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let scope = AccessScope::from_claims(&claims)?;
    let answer = state
        .submission_service
        .add_answer(
            &scope,
            assessment_id,
            submission_id,
            payload.question_id,
            payload.points_awarded,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(answer)))
}

#[axum::debug_handler]
pub async fn grade_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assessment_id, submission_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let submission = state
        .submission_service
        .grade_submission(&scope, assessment_id, submission_id, caller_id(&claims)?)
        .await?;
    Ok(Json(submission))
}

#[axum::debug_handler]
pub async fn publish_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    // Tied to server shutdown so an in-flight batch stops at a chunk
    // boundary instead of being killed mid-write.
    let cancel = state.shutdown.child_token();
    let summary = state
        .submission_service
        .publish_results(&scope, id, &cancel)
        .await?;
    Ok(Json(summary))
}

pub async fn return_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assessment_id, submission_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let submission = state
        .submission_service
        .return_submission(&scope, assessment_id, submission_id)
        .await?;
    Ok(Json(submission))
}

pub async fn reject_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assessment_id, submission_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let submission = state
        .submission_service
        .reject_submission(&scope, assessment_id, submission_id)
        .await?;
    Ok(Json(submission))
}

pub async fn list_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let results = state.submission_service.list_results(&scope, id).await?;
    Ok(Json(results))
}

/// Aggregate report over the roster, enriched with identity profiles. A
/// degraded identity response surfaces as 503, never as an empty roster.
pub async fn roster_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let scope = AccessScope::from_claims(&claims)?;
    let submissions = state
        .submission_service
        .list_submissions(&scope, id)
        .await?;

    let mut by_status: HashMap<&'static str, i64> = HashMap::new();
    for submission in &submissions {
        *by_status.entry(submission.status.as_str()).or_insert(0) += 1;
    }

    let student_ids: Vec<Uuid> = submissions.iter().map(|s| s.student_id).collect();
    let profiles = match state.identity_service.users_by_ids(&student_ids).await? {
        IdentityResult::Available(profiles) => profiles,
        IdentityResult::Degraded => {
            return Err(Error::ServiceUnavailable(
                "identity service unavailable, retry later".to_string(),
            ))
        }
    };
    let names: HashMap<Uuid, &str> = profiles.iter().map(|p| (p.id, p.name.as_str())).collect();

    let rows: Vec<_> = submissions
        .iter()
        .map(|s| {
            json!({
                "submission_id": s.id,
                "student_id": s.student_id,
                "student_name": names.get(&s.student_id),
                "status": s.status,
                "max_score": s.max_score,
                "score_earned": s.score_earned,
                "submitted_at": s.submitted_at,
            })
        })
        .collect();

    Ok(Json(json!({
        "assessment_id": id,
        "total": submissions.len(),
        "by_status": by_status,
        "roster": rows,
    })))
}
