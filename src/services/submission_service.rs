use crate::access::AccessScope;
use crate::error::{Error, Result};
use crate::models::assessment::AssessmentStatus;
use crate::models::question::Answer;
use crate::models::submission::{
    Submission, SubmissionEvent, SubmissionStatus, SubmissionTransition,
};
use crate::services::grading_service::GradingService;
use crate::store::{LifecycleStore, StatusStamp};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct PublishSummary {
    pub assessment_id: Uuid,
    pub published: u64,
    pub total: usize,
}

#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<dyn LifecycleStore>,
    publish_chunk_size: usize,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn LifecycleStore>, publish_chunk_size: usize) -> Self {
        Self {
            store,
            publish_chunk_size: publish_chunk_size.max(1),
        }
    }

    /// Idempotent per (assessment, student): the first call creates the
    /// draft, every later call returns the same row unchanged.
    pub async fn start_submission(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
    ) -> Result<Submission> {
        let AccessScope::Student(student_id) = scope else {
            return Err(Error::Forbidden(
                "only students start submissions".to_string(),
            ));
        };
        // Reachability doubles as the enrollment check: the student-scoped
        // finder only sees assessments of classes the caller is enrolled in.
        self.store
            .assessment_by_id(scope, assessment_id)
            .await?
            .ok_or_else(|| Error::NotFound("assessment not found".to_string()))?;
        if let Some(existing) = self
            .store
            .submission_for_student(assessment_id, *student_id)
            .await?
        {
            return Ok(existing);
        }
        self.store
            .insert_submission(assessment_id, *student_id, Utc::now())
            .await
    }

    /// Turns the student's draft in. Work landing after the window (the
    /// assessment already FINISHED, or the clock past the due date) is
    /// accepted as LATE.
    pub async fn submit_submission(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
    ) -> Result<Submission> {
        let AccessScope::Student(student_id) = scope else {
            return Err(Error::Forbidden("only students submit".to_string()));
        };
        let assessment = self
            .store
            .assessment_by_id(scope, assessment_id)
            .await?
            .ok_or_else(|| Error::NotFound("assessment not found".to_string()))?;
        let submission = self
            .store
            .submission_for_student(assessment_id, *student_id)
            .await?
            .ok_or_else(|| Error::NotFound("submission not found".to_string()))?;

        let now = Utc::now();
        let late = assessment.status == AssessmentStatus::Finished
            || assessment.due_date.is_some_and(|due| now > due);
        let next = self.next_status(&submission, SubmissionEvent::Submit { late })?;
        self.guarded_update(
            &submission,
            next,
            StatusStamp {
                submitted_at: Some(now),
                ..Default::default()
            },
        )
        .await
    }

    /// Grades one submission: aggregate the question/answer graph, then write
    /// scores against the version read here. SUBMITTED only; GRADED and
    /// PUBLISHED conflict, everything else is a bad request.
    pub async fn grade_submission(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
        submission_id: Uuid,
        graded_by: Uuid,
    ) -> Result<Submission> {
        if scope.is_student() {
            return Err(Error::Forbidden("students cannot grade".to_string()));
        }
        let submission = self
            .store
            .submission_by_id(scope, assessment_id, submission_id)
            .await?
            .ok_or_else(|| Error::NotFound("submission not found".to_string()))?;
        self.next_status(&submission, SubmissionEvent::Grade)?;

        let questions = self.store.questions_for(assessment_id).await?;
        let answers = self.store.answers_for(submission_id).await?;
        let totals = GradingService::aggregate(&questions, &answers);

        let graded = self
            .store
            .apply_grade(
                submission_id,
                submission.version,
                totals.max_score,
                totals.score_earned,
                graded_by,
                Utc::now(),
            )
            .await?
            .ok_or_else(|| {
                Error::Conflict("submission was graded concurrently".to_string())
            })?;
        tracing::info!(
            submission_id = %submission_id,
            max = totals.max_score,
            earned = totals.score_earned,
            "submission graded"
        );
        Ok(graded)
    }

    /// All-or-nothing publish across every submission of the assessment. The
    /// precondition (everything GRADED) is checked before any mutation; the
    /// mutation itself runs in bounded chunks guarded by status, with a
    /// verifying pass at the end. Cancellation is honored between chunks, so
    /// an abort never leaves a chunk half-written.
    pub async fn publish_results(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<PublishSummary> {
        if scope.is_student() {
            return Err(Error::Forbidden("students cannot publish".to_string()));
        }
        self.store
            .assessment_by_id(scope, assessment_id)
            .await?
            .ok_or_else(|| Error::NotFound("assessment not found".to_string()))?;

        let submissions = self.store.submissions_for_assessment(assessment_id).await?;
        let ungraded = submissions
            .iter()
            .filter(|s| s.status != SubmissionStatus::Graded)
            .count();
        if ungraded > 0 {
            return Err(Error::BadRequest(format!(
                "cannot publish: {} of {} submissions are not graded",
                ungraded,
                submissions.len()
            )));
        }

        let now = Utc::now();
        let ids: Vec<Uuid> = submissions.iter().map(|s| s.id).collect();
        let mut published: u64 = 0;
        for chunk in ids.chunks(self.publish_chunk_size) {
            if cancel.is_cancelled() {
                tracing::warn!(
                    assessment_id = %assessment_id,
                    published,
                    total = ids.len(),
                    "publish cancelled between chunks"
                );
                return Err(Error::Internal("publish cancelled".to_string()));
            }
            published += self.store.publish_chunk(chunk, now).await?;
        }

        // Verifying pass: a submission that slipped out of GRADED between the
        // precondition and its chunk shows up here.
        let remaining = self.store.count_not_published(assessment_id).await?;
        if remaining > 0 {
            return Err(Error::Conflict(format!(
                "publish incomplete: {} submissions changed state during the batch",
                remaining
            )));
        }
        tracing::info!(assessment_id = %assessment_id, published, "results published");
        Ok(PublishSummary {
            assessment_id,
            published,
            total: ids.len(),
        })
    }

    /// Result reads are published-only for instructors and students alike;
    /// anything not yet published reads as absent rather than hidden.
    pub async fn get_result(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
        submission_id: Uuid,
    ) -> Result<Submission> {
        let submission = self
            .store
            .submission_by_id(scope, assessment_id, submission_id)
            .await?
            .ok_or_else(|| Error::NotFound("submission result not found".to_string()))?;
        if *scope != AccessScope::Admin && submission.status != SubmissionStatus::Published {
            return Err(Error::NotFound("submission result not found".to_string()));
        }
        Ok(submission)
    }

    /// The student's own result, visible only once published.
    pub async fn my_result(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
    ) -> Result<Submission> {
        let submission = self.own_submission(scope, assessment_id).await?;
        if submission.status != SubmissionStatus::Published {
            return Err(Error::NotFound("submission result not found".to_string()));
        }
        Ok(submission)
    }

    pub async fn list_results(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
    ) -> Result<Vec<Submission>> {
        self.store
            .assessment_by_id(scope, assessment_id)
            .await?
            .ok_or_else(|| Error::NotFound("assessment not found".to_string()))?;
        let rows = self.store.submissions_for_assessment(assessment_id).await?;
        let rows = rows
            .into_iter()
            .filter(|s| match scope {
                AccessScope::Admin => true,
                AccessScope::Instructor(_) => s.status == SubmissionStatus::Published,
                AccessScope::Student(caller) => {
                    s.student_id == *caller && s.status == SubmissionStatus::Published
                }
            })
            .collect();
        Ok(rows)
    }

    /// Grading-state view for the owning instructor (pre-publication), used
    /// while marking. Students never reach this.
    pub async fn list_submissions(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
    ) -> Result<Vec<Submission>> {
        if scope.is_student() {
            return Err(Error::Forbidden("instructor surface".to_string()));
        }
        self.store
            .assessment_by_id(scope, assessment_id)
            .await?
            .ok_or_else(|| Error::NotFound("assessment not found".to_string()))?;
        self.store.submissions_for_assessment(assessment_id).await
    }

    /// Instructor enters the marks for one piece of a submission before
    /// grading. The question must belong to the same assessment.
    pub async fn add_answer(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
        submission_id: Uuid,
        question_id: Uuid,
        points_awarded: Option<i32>,
    ) -> Result<Answer> {
        if scope.is_student() {
            return Err(Error::Forbidden("students cannot enter marks".to_string()));
        }
        self.store
            .submission_by_id(scope, assessment_id, submission_id)
            .await?
            .ok_or_else(|| Error::NotFound("submission not found".to_string()))?;
        let questions = self.store.questions_for(assessment_id).await?;
        if !questions.iter().any(|q| q.id == question_id) {
            return Err(Error::BadRequest(
                "question does not belong to this assessment".to_string(),
            ));
        }
        self.store
            .insert_answer(question_id, submission_id, points_awarded)
            .await
    }

    /// Instructor hands published work back for correction.
    pub async fn return_submission(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
        submission_id: Uuid,
    ) -> Result<Submission> {
        if scope.is_student() {
            return Err(Error::Forbidden("instructor surface".to_string()));
        }
        self.apply_event(scope, assessment_id, submission_id, SubmissionEvent::Return)
            .await
    }

    pub async fn reject_submission(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
        submission_id: Uuid,
    ) -> Result<Submission> {
        if scope.is_student() {
            return Err(Error::Forbidden("instructor surface".to_string()));
        }
        self.apply_event(scope, assessment_id, submission_id, SubmissionEvent::Reject)
            .await
    }

    /// Student picks returned work back up.
    pub async fn resubmit_submission(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
    ) -> Result<Submission> {
        let submission = self.own_submission(scope, assessment_id).await?;
        let next = self.next_status(&submission, SubmissionEvent::Resubmit)?;
        self.guarded_update(&submission, next, StatusStamp::default())
            .await
    }

    pub async fn cancel_submission(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
    ) -> Result<Submission> {
        let submission = self.own_submission(scope, assessment_id).await?;
        let next = self.next_status(&submission, SubmissionEvent::Cancel)?;
        self.guarded_update(&submission, next, StatusStamp::default())
            .await
    }

    async fn own_submission(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
    ) -> Result<Submission> {
        let AccessScope::Student(student_id) = scope else {
            return Err(Error::Forbidden("student surface".to_string()));
        };
        self.store
            .assessment_by_id(scope, assessment_id)
            .await?
            .ok_or_else(|| Error::NotFound("assessment not found".to_string()))?;
        self.store
            .submission_for_student(assessment_id, *student_id)
            .await?
            .ok_or_else(|| Error::NotFound("submission not found".to_string()))
    }

    async fn apply_event(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
        submission_id: Uuid,
        event: SubmissionEvent,
    ) -> Result<Submission> {
        let submission = self
            .store
            .submission_by_id(scope, assessment_id, submission_id)
            .await?
            .ok_or_else(|| Error::NotFound("submission not found".to_string()))?;
        let next = self.next_status(&submission, event)?;
        self.guarded_update(&submission, next, StatusStamp::default())
            .await
    }

    /// Consults the transition table and maps its vocabulary onto the error
    /// surface: Conflict for re-grading graded work, BadRequest for any other
    /// rejected transition.
    fn next_status(
        &self,
        submission: &Submission,
        event: SubmissionEvent,
    ) -> Result<SubmissionStatus> {
        match submission.status.apply(event) {
            SubmissionTransition::Allowed(next) => Ok(next),
            SubmissionTransition::NoOp => Ok(submission.status),
            SubmissionTransition::Conflict => Err(Error::Conflict(format!(
                "submission is already {}",
                submission.status
            ))),
            SubmissionTransition::Rejected => Err(Error::BadRequest(format!(
                "submission in status {} does not allow this operation",
                submission.status
            ))),
        }
    }

    async fn guarded_update(
        &self,
        submission: &Submission,
        next: SubmissionStatus,
        stamp: StatusStamp,
    ) -> Result<Submission> {
        self.store
            .update_submission_status(submission.id, &[submission.status], next, stamp)
            .await?
            .ok_or_else(|| {
                Error::Conflict("submission changed state concurrently".to_string())
            })
    }
}
