pub mod memory;
pub mod pg;

use crate::access::AccessScope;
use crate::error::Result;
use crate::models::assessment::{Assessment, AssessmentStatus};
use crate::models::question::{Answer, Question};
use crate::models::submission::{Submission, SubmissionStatus};
use crate::models::trigger::LifecycleTrigger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub title: String,
    pub description: Option<String>,
    pub class_id: Uuid,
    pub sub_subject_id: Option<Uuid>,
    pub time_limit_minutes: Option<i32>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleWindow {
    pub start_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Timestamp columns to stamp alongside a guarded status write. Columns are
/// append-only: a stamp never overwrites a value that is already set.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusStamp {
    pub submitted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Storage contract for the lifecycle engine. Every finder takes the caller's
/// [`AccessScope`] and applies it inside the query, so a scope miss and a
/// missing row are indistinguishable to callers. Guarded mutations encode
/// their status precondition in the write itself (`WHERE status IN …`,
/// `WHERE version = …`) and report a miss as `None`/`false` instead of
/// failing, which is what makes trigger jobs and grading idempotent and
/// race-safe.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    // --- assessments ---
    async fn insert_assessment(&self, new: NewAssessment) -> Result<Assessment>;
    async fn assessment_by_id(&self, scope: &AccessScope, id: Uuid) -> Result<Option<Assessment>>;
    async fn list_assessments(
        &self,
        scope: &AccessScope,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Assessment>, i64)>;
    /// Writes the schedule window plus SCHEDULED status and replaces the
    /// trigger pair in one transaction. `None` when the current status is not
    /// an allowed predecessor.
    async fn apply_schedule(
        &self,
        id: Uuid,
        from: &[AssessmentStatus],
        window: ScheduleWindow,
        timezone: &str,
    ) -> Result<Option<Assessment>>;
    /// Guarded transition used by trigger jobs. `false` means the guard did
    /// not match (already transitioned).
    async fn transition_assessment(
        &self,
        id: Uuid,
        from: &[AssessmentStatus],
        to: AssessmentStatus,
    ) -> Result<bool>;

    // --- triggers ---
    async fn due_triggers(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<LifecycleTrigger>>;
    async fn pending_triggers_for(&self, assessment_id: Uuid) -> Result<Vec<LifecycleTrigger>>;
    async fn complete_trigger(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    /// Records a failed fire. Terminal failures are completed so they never
    /// retry; transient ones stay pending for the next poll.
    async fn record_trigger_failure(
        &self,
        id: Uuid,
        error: &str,
        terminal: bool,
        at: DateTime<Utc>,
    ) -> Result<()>;

    // --- questions / answers ---
    async fn insert_question(
        &self,
        assessment_id: Uuid,
        points: Option<i32>,
        ordinal: i32,
    ) -> Result<Question>;
    async fn questions_for(&self, assessment_id: Uuid) -> Result<Vec<Question>>;
    async fn insert_answer(
        &self,
        question_id: Uuid,
        submission_id: Uuid,
        points_awarded: Option<i32>,
    ) -> Result<Answer>;
    async fn answers_for(&self, submission_id: Uuid) -> Result<Vec<Answer>>;
    /// True once any answer references a question of this assessment; after
    /// that the question set is frozen.
    async fn assessment_has_answers(&self, assessment_id: Uuid) -> Result<bool>;

    // --- submissions ---
    async fn submission_for_student(
        &self,
        assessment_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<Submission>>;
    async fn insert_submission(
        &self,
        assessment_id: Uuid,
        student_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<Submission>;
    async fn submission_by_id(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
        submission_id: Uuid,
    ) -> Result<Option<Submission>>;
    async fn submissions_for_assessment(&self, assessment_id: Uuid) -> Result<Vec<Submission>>;
    async fn update_submission_status(
        &self,
        id: Uuid,
        from: &[SubmissionStatus],
        to: SubmissionStatus,
        stamp: StatusStamp,
    ) -> Result<Option<Submission>>;
    /// Optimistic grade write: succeeds only against the expected version.
    /// `None` means a concurrent writer got there first.
    async fn apply_grade(
        &self,
        id: Uuid,
        expected_version: i64,
        max_score: i32,
        score_earned: i32,
        graded_by: Uuid,
        graded_at: DateTime<Utc>,
    ) -> Result<Option<Submission>>;
    /// One bounded publish sub-transaction. Only rows still GRADED move.
    async fn publish_chunk(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<u64>;
    async fn count_not_published(&self, assessment_id: Uuid) -> Result<i64>;
    /// Close-time sweep: NOT_SUBMITTED rows become MISSED.
    async fn mark_missed(&self, assessment_id: Uuid, at: DateTime<Utc>) -> Result<u64>;

    // --- enrollment (reference data consumed, not managed, here) ---
    async fn insert_class(&self, name: &str) -> Result<Uuid>;
    async fn insert_enrollment(&self, class_id: Uuid, student_id: Uuid) -> Result<()>;
}

/// Scope predicate for assessments. The memory store evaluates it per row;
/// the Postgres store expresses the same rule in its WHERE clauses.
pub(crate) fn assessment_visible(
    scope: &AccessScope,
    assessment: &Assessment,
    enrolled: bool,
) -> bool {
    match scope {
        AccessScope::Admin => true,
        AccessScope::Instructor(caller) => assessment.created_by == *caller,
        AccessScope::Student(_) => enrolled,
    }
}
