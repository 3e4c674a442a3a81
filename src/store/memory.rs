use crate::access::AccessScope;
use crate::error::Result;
use crate::models::assessment::{Assessment, AssessmentStatus};
use crate::models::question::{Answer, Question};
use crate::models::submission::{Submission, SubmissionStatus};
use crate::models::trigger::{LifecycleTrigger, TriggerKind};
use crate::store::{
    assessment_visible, LifecycleStore, NewAssessment, ScheduleWindow, StatusStamp,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory [`LifecycleStore`] with the same guard and scoping semantics as
/// the Postgres store. The write lock plays the role of a transaction: every
/// guarded mutation is one lock section. Used by the test suite and handy for
/// local runs without a database.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    assessments: HashMap<Uuid, Assessment>,
    submissions: HashMap<Uuid, Submission>,
    questions: HashMap<Uuid, Question>,
    answers: HashMap<Uuid, Answer>,
    triggers: HashMap<Uuid, LifecycleTrigger>,
    classes: HashMap<Uuid, String>,
    // (class_id, student_id) -> active
    enrollments: HashMap<(Uuid, Uuid), bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn enrolled(&self, student_id: Uuid, class_id: Uuid) -> bool {
        self.enrollments
            .get(&(class_id, student_id))
            .copied()
            .unwrap_or(false)
    }

    fn visible_assessment(&self, scope: &AccessScope, id: Uuid) -> Option<&Assessment> {
        let assessment = self.assessments.get(&id)?;
        let enrolled = match scope {
            AccessScope::Student(caller) => self.enrolled(*caller, assessment.class_id),
            _ => false,
        };
        assessment_visible(scope, assessment, enrolled).then_some(assessment)
    }
}

#[async_trait]
impl LifecycleStore for MemoryStore {
    async fn insert_assessment(&self, new: NewAssessment) -> Result<Assessment> {
        let now = Utc::now();
        let assessment = Assessment {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            class_id: new.class_id,
            sub_subject_id: new.sub_subject_id,
            start_date: None,
            due_date: None,
            time_limit_minutes: new.time_limit_minutes,
            timezone: None,
            status: AssessmentStatus::Drafted,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.inner.write().await;
        inner.assessments.insert(assessment.id, assessment.clone());
        Ok(assessment)
    }

    async fn assessment_by_id(&self, scope: &AccessScope, id: Uuid) -> Result<Option<Assessment>> {
        let inner = self.inner.read().await;
        Ok(inner.visible_assessment(scope, id).cloned())
    }

    async fn list_assessments(
        &self,
        scope: &AccessScope,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Assessment>, i64)> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Assessment> = inner
            .assessments
            .values()
            .filter(|a| inner.visible_assessment(scope, a.id).is_some())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = rows.len() as i64;
        let offset = ((page - 1).max(0) * per_page) as usize;
        let rows = rows
            .into_iter()
            .skip(offset)
            .take(per_page.max(0) as usize)
            .collect();
        Ok((rows, total))
    }

    async fn apply_schedule(
        &self,
        id: Uuid,
        from: &[AssessmentStatus],
        window: ScheduleWindow,
        timezone: &str,
    ) -> Result<Option<Assessment>> {
        let mut inner = self.inner.write().await;
        let Some(assessment) = inner.assessments.get(&id) else {
            return Ok(None);
        };
        if !from.contains(&assessment.status) {
            return Ok(None);
        }
        let now = Utc::now();
        // Replace the pending trigger pair along with the status write; one
        // lock section stands in for the transaction.
        inner
            .triggers
            .retain(|_, t| !(t.assessment_id == id && t.completed_at.is_none()));
        for (kind, fire_at) in [
            (TriggerKind::Open, window.start_date),
            (TriggerKind::Close, window.due_date),
        ] {
            let trigger = LifecycleTrigger {
                id: Uuid::new_v4(),
                assessment_id: id,
                kind,
                fire_at,
                completed_at: None,
                attempts: 0,
                last_error: None,
            };
            inner.triggers.insert(trigger.id, trigger);
        }
        let assessment = inner.assessments.get_mut(&id).expect("checked above");
        assessment.start_date = Some(window.start_date);
        assessment.due_date = Some(window.due_date);
        assessment.timezone = Some(timezone.to_string());
        assessment.status = AssessmentStatus::Scheduled;
        assessment.updated_at = now;
        Ok(Some(assessment.clone()))
    }

    async fn transition_assessment(
        &self,
        id: Uuid,
        from: &[AssessmentStatus],
        to: AssessmentStatus,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(assessment) = inner.assessments.get_mut(&id) else {
            return Ok(false);
        };
        if !from.contains(&assessment.status) {
            return Ok(false);
        }
        assessment.status = to;
        assessment.updated_at = Utc::now();
        Ok(true)
    }

    async fn due_triggers(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<LifecycleTrigger>> {
        let inner = self.inner.read().await;
        let mut due: Vec<LifecycleTrigger> = inner
            .triggers
            .values()
            .filter(|t| t.completed_at.is_none() && t.fire_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then(a.id.cmp(&b.id)));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn pending_triggers_for(&self, assessment_id: Uuid) -> Result<Vec<LifecycleTrigger>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<LifecycleTrigger> = inner
            .triggers
            .values()
            .filter(|t| t.assessment_id == assessment_id && t.completed_at.is_none())
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.fire_at);
        Ok(rows)
    }

    async fn complete_trigger(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(trigger) = inner.triggers.get_mut(&id) {
            trigger.completed_at.get_or_insert(at);
        }
        Ok(())
    }

    async fn record_trigger_failure(
        &self,
        id: Uuid,
        error: &str,
        terminal: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(trigger) = inner.triggers.get_mut(&id) {
            trigger.attempts += 1;
            trigger.last_error = Some(error.to_string());
            if terminal {
                trigger.completed_at.get_or_insert(at);
            }
        }
        Ok(())
    }

    async fn insert_question(
        &self,
        assessment_id: Uuid,
        points: Option<i32>,
        ordinal: i32,
    ) -> Result<Question> {
        let question = Question {
            id: Uuid::new_v4(),
            assessment_id,
            points,
            ordinal,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.write().await;
        inner.questions.insert(question.id, question.clone());
        Ok(question)
    }

    async fn questions_for(&self, assessment_id: Uuid) -> Result<Vec<Question>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Question> = inner
            .questions
            .values()
            .filter(|q| q.assessment_id == assessment_id)
            .cloned()
            .collect();
        rows.sort_by_key(|q| q.ordinal);
        Ok(rows)
    }

    async fn insert_answer(
        &self,
        question_id: Uuid,
        submission_id: Uuid,
        points_awarded: Option<i32>,
    ) -> Result<Answer> {
        let answer = Answer {
            id: Uuid::new_v4(),
            question_id,
            submission_id,
            points_awarded,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.write().await;
        inner.answers.insert(answer.id, answer.clone());
        Ok(answer)
    }

    async fn answers_for(&self, submission_id: Uuid) -> Result<Vec<Answer>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Answer> = inner
            .answers
            .values()
            .filter(|a| a.submission_id == submission_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }

    async fn assessment_has_answers(&self, assessment_id: Uuid) -> Result<bool> {
        let inner = self.inner.read().await;
        let has = inner.answers.values().any(|a| {
            inner
                .questions
                .get(&a.question_id)
                .is_some_and(|q| q.assessment_id == assessment_id)
        });
        Ok(has)
    }

    async fn submission_for_student(
        &self,
        assessment_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<Submission>> {
        let inner = self.inner.read().await;
        Ok(inner
            .submissions
            .values()
            .find(|s| s.assessment_id == assessment_id && s.student_id == student_id)
            .cloned())
    }

    async fn insert_submission(
        &self,
        assessment_id: Uuid,
        student_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<Submission> {
        let mut inner = self.inner.write().await;
        // Unique per (assessment, student): a concurrent start gets the
        // existing row back instead of a duplicate.
        if let Some(existing) = inner
            .submissions
            .values()
            .find(|s| s.assessment_id == assessment_id && s.student_id == student_id)
        {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let submission = Submission {
            id: Uuid::new_v4(),
            assessment_id,
            student_id,
            status: SubmissionStatus::NotSubmitted,
            max_score: None,
            score_earned: None,
            started_at: Some(started_at),
            submitted_at: None,
            graded_at: None,
            graded_by: None,
            published_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        inner.submissions.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn submission_by_id(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
        submission_id: Uuid,
    ) -> Result<Option<Submission>> {
        let inner = self.inner.read().await;
        let Some(submission) = inner.submissions.get(&submission_id) else {
            return Ok(None);
        };
        if submission.assessment_id != assessment_id {
            return Ok(None);
        }
        let visible = match scope {
            AccessScope::Admin => true,
            AccessScope::Instructor(caller) => inner
                .assessments
                .get(&assessment_id)
                .is_some_and(|a| a.created_by == *caller),
            AccessScope::Student(caller) => submission.student_id == *caller,
        };
        Ok(visible.then(|| submission.clone()))
    }

    async fn submissions_for_assessment(&self, assessment_id: Uuid) -> Result<Vec<Submission>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Submission> = inner
            .submissions
            .values()
            .filter(|s| s.assessment_id == assessment_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.created_at);
        Ok(rows)
    }

    async fn update_submission_status(
        &self,
        id: Uuid,
        from: &[SubmissionStatus],
        to: SubmissionStatus,
        stamp: StatusStamp,
    ) -> Result<Option<Submission>> {
        let mut inner = self.inner.write().await;
        let Some(submission) = inner.submissions.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&submission.status) {
            return Ok(None);
        }
        submission.status = to;
        if let Some(at) = stamp.submitted_at {
            submission.submitted_at.get_or_insert(at);
        }
        if let Some(at) = stamp.started_at {
            submission.started_at.get_or_insert(at);
        }
        submission.version += 1;
        submission.updated_at = Utc::now();
        Ok(Some(submission.clone()))
    }

    async fn apply_grade(
        &self,
        id: Uuid,
        expected_version: i64,
        max_score: i32,
        score_earned: i32,
        graded_by: Uuid,
        graded_at: DateTime<Utc>,
    ) -> Result<Option<Submission>> {
        let mut inner = self.inner.write().await;
        let Some(submission) = inner.submissions.get_mut(&id) else {
            return Ok(None);
        };
        if submission.version != expected_version
            || submission.status != SubmissionStatus::Submitted
        {
            return Ok(None);
        }
        submission.status = SubmissionStatus::Graded;
        submission.max_score = Some(max_score);
        submission.score_earned = Some(score_earned);
        submission.graded_by = Some(graded_by);
        submission.graded_at = Some(graded_at);
        submission.version += 1;
        submission.updated_at = graded_at;
        Ok(Some(submission.clone()))
    }

    async fn publish_chunk(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let mut moved = 0u64;
        for id in ids {
            if let Some(submission) = inner.submissions.get_mut(id) {
                if submission.status == SubmissionStatus::Graded {
                    submission.status = SubmissionStatus::Published;
                    submission.published_at.get_or_insert(at);
                    submission.version += 1;
                    submission.updated_at = at;
                    moved += 1;
                }
            }
        }
        Ok(moved)
    }

    async fn count_not_published(&self, assessment_id: Uuid) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner
            .submissions
            .values()
            .filter(|s| {
                s.assessment_id == assessment_id && s.status != SubmissionStatus::Published
            })
            .count() as i64)
    }

    async fn mark_missed(&self, assessment_id: Uuid, at: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let mut swept = 0u64;
        for submission in inner.submissions.values_mut() {
            if submission.assessment_id == assessment_id
                && submission.status == SubmissionStatus::NotSubmitted
            {
                submission.status = SubmissionStatus::Missed;
                submission.version += 1;
                submission.updated_at = at;
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn insert_class(&self, name: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let mut inner = self.inner.write().await;
        inner.classes.insert(id, name.to_string());
        Ok(id)
    }

    async fn insert_enrollment(&self, class_id: Uuid, student_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.enrollments.insert((class_id, student_id), true);
        Ok(())
    }
}
