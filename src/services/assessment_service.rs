use crate::access::AccessScope;
use crate::error::{Error, Result};
use crate::models::assessment::{Assessment, AssessmentEvent, AssessmentStatus, Transition};
use crate::models::question::Question;
use crate::store::{LifecycleStore, NewAssessment, ScheduleWindow};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AssessmentService {
    store: Arc<dyn LifecycleStore>,
}

impl AssessmentService {
    pub fn new(store: Arc<dyn LifecycleStore>) -> Self {
        Self { store }
    }

    pub async fn create_assessment(
        &self,
        scope: &AccessScope,
        created_by: Uuid,
        title: String,
        description: Option<String>,
        class_id: Uuid,
        sub_subject_id: Option<Uuid>,
        time_limit_minutes: Option<i32>,
    ) -> Result<Assessment> {
        if scope.is_student() {
            return Err(Error::Forbidden("students cannot create assessments".to_string()));
        }
        self.store
            .insert_assessment(NewAssessment {
                title,
                description,
                class_id,
                sub_subject_id,
                time_limit_minutes,
                created_by,
            })
            .await
    }

    pub async fn get_assessment(&self, scope: &AccessScope, id: Uuid) -> Result<Assessment> {
        self.store
            .assessment_by_id(scope, id)
            .await?
            .ok_or_else(|| Error::NotFound("assessment not found".to_string()))
    }

    pub async fn list_assessments(
        &self,
        scope: &AccessScope,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Assessment>, i64)> {
        self.store.list_assessments(scope, page, per_page).await
    }

    /// Sets the open/close window and registers the trigger pair. Allowed
    /// from DRAFTED or SCHEDULED; re-scheduling replaces the previous pair.
    pub async fn schedule_assessment(
        &self,
        scope: &AccessScope,
        id: Uuid,
        start_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
        timezone: &str,
    ) -> Result<Assessment> {
        if due_date <= start_date {
            return Err(Error::BadRequest(
                "due date must be after start date".to_string(),
            ));
        }
        let assessment = self.get_assessment(scope, id).await?;
        match assessment.status.apply(AssessmentEvent::Schedule) {
            Transition::Allowed(_) => {}
            _ => {
                return Err(Error::BadRequest(format!(
                    "assessment in status {} cannot be scheduled",
                    assessment.status
                )))
            }
        }
        let window = ScheduleWindow {
            start_date,
            due_date,
        };
        let updated = self
            .store
            .apply_schedule(
                id,
                &[AssessmentStatus::Drafted, AssessmentStatus::Scheduled],
                window,
                timezone,
            )
            .await?
            // The guarded write misses only if a trigger fired between our
            // read and the update.
            .ok_or_else(|| {
                Error::Conflict("assessment status changed while scheduling".to_string())
            })?;
        tracing::info!(
            assessment_id = %id,
            start = %start_date,
            due = %due_date,
            "assessment scheduled"
        );
        Ok(updated)
    }

    /// Question setup. The question set freezes as soon as any answer
    /// references it for scoring.
    pub async fn add_question(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
        points: Option<i32>,
        ordinal: i32,
    ) -> Result<Question> {
        self.get_assessment(scope, assessment_id).await?;
        if self.store.assessment_has_answers(assessment_id).await? {
            return Err(Error::Conflict(
                "question set is frozen once answers reference it".to_string(),
            ));
        }
        self.store
            .insert_question(assessment_id, points, ordinal)
            .await
    }

    pub async fn list_questions(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
    ) -> Result<Vec<Question>> {
        self.get_assessment(scope, assessment_id).await?;
        self.store.questions_for(assessment_id).await
    }
}
