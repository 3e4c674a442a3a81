use assessment_backend::access::AccessScope;
use assessment_backend::error::{Error, Result};
use assessment_backend::models::assessment::{Assessment, AssessmentStatus};
use assessment_backend::models::question::{Answer, Question};
use assessment_backend::models::submission::{Submission, SubmissionStatus};
use assessment_backend::models::trigger::{LifecycleTrigger, TriggerKind};
use assessment_backend::services::assessment_service::AssessmentService;
use assessment_backend::services::scheduler_service::SchedulerService;
use assessment_backend::services::submission_service::SubmissionService;
use assessment_backend::store::memory::MemoryStore;
use assessment_backend::store::{LifecycleStore, NewAssessment, ScheduleWindow, StatusStamp};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Harness {
    store: Arc<MemoryStore>,
    assessments: AssessmentService,
    submissions: SubmissionService,
    scheduler: SchedulerService,
    class_id: Uuid,
    instructor: AccessScope,
    instructor_id: Uuid,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn LifecycleStore> = store.clone();
    let class_id = store.insert_class("4B").await.expect("class");
    let instructor_id = Uuid::new_v4();
    Harness {
        assessments: AssessmentService::new(dyn_store.clone()),
        submissions: SubmissionService::new(dyn_store.clone(), 100),
        scheduler: SchedulerService::new(dyn_store, Duration::from_secs(1)),
        store,
        class_id,
        instructor: AccessScope::Instructor(instructor_id),
        instructor_id,
    }
}

impl Harness {
    async fn enrolled_student(&self) -> (AccessScope, Uuid) {
        let student_id = Uuid::new_v4();
        self.store
            .insert_enrollment(self.class_id, student_id)
            .await
            .expect("enroll");
        (AccessScope::Student(student_id), student_id)
    }

    async fn create_assessment(&self, title: &str) -> Uuid {
        self.assessments
            .create_assessment(
                &self.instructor,
                self.instructor_id,
                title.to_string(),
                None,
                self.class_id,
                None,
                Some(60),
            )
            .await
            .expect("create assessment")
            .id
    }
}

#[tokio::test]
async fn schedule_then_trigger_opens_and_closes() {
    let h = harness().await;
    let id = h.create_assessment("Algebra quiz").await;

    let now = Utc::now();
    h.assessments
        .schedule_assessment(
            &h.instructor,
            id,
            now - ChronoDuration::hours(2),
            now + ChronoDuration::hours(2),
            "Europe/Amsterdam",
        )
        .await
        .expect("schedule");
    let assessment = h
        .assessments
        .get_assessment(&h.instructor, id)
        .await
        .unwrap();
    assert_eq!(assessment.status, AssessmentStatus::Scheduled);

    // Only the OPEN trigger is due; the CLOSE one stays pending.
    let fired = h.scheduler.run_once().await.expect("reconcile");
    assert_eq!(fired, 1);
    let assessment = h
        .assessments
        .get_assessment(&h.instructor, id)
        .await
        .unwrap();
    assert_eq!(assessment.status, AssessmentStatus::Started);
    assert_eq!(h.store.pending_triggers_for(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_open_fire_is_silent() {
    let h = harness().await;
    let id = h.create_assessment("Geometry quiz").await;
    let now = Utc::now();
    h.assessments
        .schedule_assessment(
            &h.instructor,
            id,
            now - ChronoDuration::minutes(5),
            now + ChronoDuration::hours(1),
            "UTC",
        )
        .await
        .unwrap();

    // Someone else already applied the transition the trigger wants.
    assert!(h
        .store
        .transition_assessment(id, &[AssessmentStatus::Scheduled], AssessmentStatus::Started)
        .await
        .unwrap());

    let fired = h.scheduler.run_once().await.expect("reconcile");
    assert_eq!(fired, 1);
    let assessment = h
        .assessments
        .get_assessment(&h.instructor, id)
        .await
        .unwrap();
    assert_eq!(assessment.status, AssessmentStatus::Started);
}

#[tokio::test]
async fn close_tolerates_missed_open_and_sweeps_missed_submissions() {
    let h = harness().await;
    let (student, _) = h.enrolled_student().await;
    let id = h.create_assessment("History essay").await;

    // Draft exists before the window even opens.
    let submission = h.submissions.start_submission(&student, id).await.unwrap();
    assert_eq!(submission.status, SubmissionStatus::NotSubmitted);

    let now = Utc::now();
    h.assessments
        .schedule_assessment(
            &h.instructor,
            id,
            now - ChronoDuration::hours(2),
            now - ChronoDuration::hours(1),
            "UTC",
        )
        .await
        .unwrap();

    // Both triggers are overdue; one pass fires OPEN then CLOSE.
    let fired = h.scheduler.run_once().await.unwrap();
    assert_eq!(fired, 2);
    let assessment = h
        .assessments
        .get_assessment(&h.instructor, id)
        .await
        .unwrap();
    assert_eq!(assessment.status, AssessmentStatus::Finished);

    let rows = h.store.submissions_for_assessment(id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, SubmissionStatus::Missed);
}

#[tokio::test]
async fn reschedule_replaces_the_trigger_pair() {
    let h = harness().await;
    let id = h.create_assessment("Biology test").await;
    let now = Utc::now();
    h.assessments
        .schedule_assessment(
            &h.instructor,
            id,
            now + ChronoDuration::hours(1),
            now + ChronoDuration::hours(2),
            "UTC",
        )
        .await
        .unwrap();
    let new_start = now + ChronoDuration::hours(3);
    h.assessments
        .schedule_assessment(
            &h.instructor,
            id,
            new_start,
            now + ChronoDuration::hours(4),
            "UTC",
        )
        .await
        .unwrap();

    let pending = h.store.pending_triggers_for(id).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].fire_at, new_start);
}

#[tokio::test]
async fn schedule_rejects_inverted_window() {
    let h = harness().await;
    let id = h.create_assessment("Physics quiz").await;
    let now = Utc::now();
    let err = h
        .assessments
        .schedule_assessment(
            &h.instructor,
            id,
            now + ChronoDuration::hours(2),
            now + ChronoDuration::hours(2),
            "UTC",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn start_submission_is_idempotent() {
    let h = harness().await;
    let (student, _) = h.enrolled_student().await;
    let id = h.create_assessment("Chemistry lab").await;

    let first = h.submissions.start_submission(&student, id).await.unwrap();
    let second = h.submissions.start_submission(&student, id).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(
        h.store.submissions_for_assessment(id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn grading_aggregates_and_clamps() {
    let h = harness().await;
    let (student, _) = h.enrolled_student().await;
    let id = h.create_assessment("Arithmetic").await;
    let q1 = h
        .assessments
        .add_question(&h.instructor, id, Some(5), 0)
        .await
        .unwrap();
    let q2 = h
        .assessments
        .add_question(&h.instructor, id, Some(10), 1)
        .await
        .unwrap();

    let submission = h.submissions.start_submission(&student, id).await.unwrap();
    h.submissions
        .submit_submission(&student, id)
        .await
        .unwrap();
    h.submissions
        .add_answer(&h.instructor, id, submission.id, q1.id, Some(3))
        .await
        .unwrap();
    h.submissions
        .add_answer(&h.instructor, id, submission.id, q2.id, Some(14))
        .await
        .unwrap();

    let graded = h
        .submissions
        .grade_submission(&h.instructor, id, submission.id, h.instructor_id)
        .await
        .unwrap();
    assert_eq!(graded.status, SubmissionStatus::Graded);
    assert_eq!(graded.max_score, Some(15));
    // 3 + 14 = 17, clamped to the maximum.
    assert_eq!(graded.score_earned, Some(15));
    assert_eq!(graded.graded_by, Some(h.instructor_id));
    assert!(graded.graded_at.is_some());
}

#[tokio::test]
async fn regrade_conflicts_and_leaves_state_unchanged() {
    let h = harness().await;
    let (student, _) = h.enrolled_student().await;
    let id = h.create_assessment("Latin vocab").await;
    let q = h
        .assessments
        .add_question(&h.instructor, id, Some(10), 0)
        .await
        .unwrap();
    let submission = h.submissions.start_submission(&student, id).await.unwrap();
    h.submissions.submit_submission(&student, id).await.unwrap();
    h.submissions
        .add_answer(&h.instructor, id, submission.id, q.id, Some(7))
        .await
        .unwrap();
    let graded = h
        .submissions
        .grade_submission(&h.instructor, id, submission.id, h.instructor_id)
        .await
        .unwrap();

    let err = h
        .submissions
        .grade_submission(&h.instructor, id, submission.id, h.instructor_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let after = h
        .store
        .submission_by_id(&AccessScope::Admin, id, submission.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.status, SubmissionStatus::Graded);
    assert_eq!(after.version, graded.version);
    assert_eq!(after.score_earned, Some(7));
}

#[tokio::test]
async fn grading_an_unsubmitted_draft_is_a_bad_request() {
    let h = harness().await;
    let (student, _) = h.enrolled_student().await;
    let id = h.create_assessment("Music theory").await;
    let submission = h.submissions.start_submission(&student, id).await.unwrap();

    let err = h
        .submissions
        .grade_submission(&h.instructor, id, submission.id, h.instructor_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn stale_grade_write_is_rejected_by_version_guard() {
    let h = harness().await;
    let (student, _) = h.enrolled_student().await;
    let id = h.create_assessment("Drawing").await;
    let submission = h.submissions.start_submission(&student, id).await.unwrap();
    let submitted = h.submissions.submit_submission(&student, id).await.unwrap();

    let stale = h
        .store
        .apply_grade(
            submission.id,
            submitted.version + 1,
            10,
            5,
            h.instructor_id,
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(stale.is_none());
    let fresh = h
        .store
        .apply_grade(
            submission.id,
            submitted.version,
            10,
            5,
            h.instructor_id,
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(fresh.is_some());
}

#[tokio::test]
async fn publish_is_all_or_nothing() {
    let h = harness().await;
    let id = h.create_assessment("Final exam").await;
    let q = h
        .assessments
        .add_question(&h.instructor, id, Some(10), 0)
        .await
        .unwrap();

    let mut submission_ids = Vec::new();
    for _ in 0..3 {
        let (student, _) = h.enrolled_student().await;
        let submission = h.submissions.start_submission(&student, id).await.unwrap();
        h.submissions.submit_submission(&student, id).await.unwrap();
        submission_ids.push(submission.id);
    }
    // Grade only the first two.
    for submission_id in &submission_ids[..2] {
        h.submissions
            .add_answer(&h.instructor, id, *submission_id, q.id, Some(8))
            .await
            .unwrap();
        h.submissions
            .grade_submission(&h.instructor, id, *submission_id, h.instructor_id)
            .await
            .unwrap();
    }

    let cancel = CancellationToken::new();
    let err = h
        .submissions
        .publish_results(&h.instructor, id, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));

    // Nothing moved: two still GRADED, one still SUBMITTED.
    let rows = h.store.submissions_for_assessment(id).await.unwrap();
    let graded = rows
        .iter()
        .filter(|s| s.status == SubmissionStatus::Graded)
        .count();
    let submitted = rows
        .iter()
        .filter(|s| s.status == SubmissionStatus::Submitted)
        .count();
    assert_eq!((graded, submitted), (2, 1));

    // After grading the straggler the batch goes through.
    h.submissions
        .grade_submission(&h.instructor, id, submission_ids[2], h.instructor_id)
        .await
        .unwrap();
    let summary = h
        .submissions
        .publish_results(&h.instructor, id, &cancel)
        .await
        .unwrap();
    assert_eq!(summary.published, 3);
    let rows = h.store.submissions_for_assessment(id).await.unwrap();
    assert!(rows
        .iter()
        .all(|s| s.status == SubmissionStatus::Published && s.published_at.is_some()));
}

#[tokio::test]
async fn publish_honors_cancellation_before_mutating() {
    let h = harness().await;
    let (student, _) = h.enrolled_student().await;
    let id = h.create_assessment("Take-home").await;
    let submission = h.submissions.start_submission(&student, id).await.unwrap();
    h.submissions.submit_submission(&student, id).await.unwrap();
    h.submissions
        .grade_submission(&h.instructor, id, submission.id, h.instructor_id)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = h
        .submissions
        .publish_results(&h.instructor, id, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
    let rows = h.store.submissions_for_assessment(id).await.unwrap();
    assert_eq!(rows[0].status, SubmissionStatus::Graded);
}

#[tokio::test]
async fn publish_runs_in_bounded_chunks() {
    let h = harness().await;
    let dyn_store: Arc<dyn LifecycleStore> = h.store.clone();
    let chunked = SubmissionService::new(dyn_store, 2);
    let id = h.create_assessment("Midterm").await;

    for _ in 0..5 {
        let (student, _) = h.enrolled_student().await;
        let submission = chunked.start_submission(&student, id).await.unwrap();
        chunked.submit_submission(&student, id).await.unwrap();
        chunked
            .grade_submission(&h.instructor, id, submission.id, h.instructor_id)
            .await
            .unwrap();
    }

    let summary = chunked
        .publish_results(&h.instructor, id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.published, 5);
    assert_eq!(summary.total, 5);
    assert_eq!(h.store.count_not_published(id).await.unwrap(), 0);
}

#[tokio::test]
async fn late_submission_after_close_is_accepted_as_late() {
    let h = harness().await;
    let (student, _) = h.enrolled_student().await;
    let id = h.create_assessment("Overdue essay").await;
    h.submissions.start_submission(&student, id).await.unwrap();
    h.submissions.submit_submission(&student, id).await.unwrap();

    // A fresh draft from a second student arrives after the window closed.
    let (slow_student, _) = h.enrolled_student().await;
    h.submissions
        .start_submission(&slow_student, id)
        .await
        .unwrap();
    let now = Utc::now();
    h.assessments
        .schedule_assessment(
            &h.instructor,
            id,
            now - ChronoDuration::hours(3),
            now - ChronoDuration::hours(1),
            "UTC",
        )
        .await
        .unwrap();
    h.scheduler.run_once().await.unwrap();
    // The sweep caught the unsubmitted draft; submitting anyway is refused.
    let err = h
        .submissions
        .submit_submission(&slow_student, id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));

    // A third student who starts after close submits LATE.
    let (later_student, _) = h.enrolled_student().await;
    h.submissions
        .start_submission(&later_student, id)
        .await
        .unwrap();
    let late = h
        .submissions
        .submit_submission(&later_student, id)
        .await
        .unwrap();
    assert_eq!(late.status, SubmissionStatus::Late);
    assert!(late.submitted_at.is_some());
}

#[tokio::test]
async fn correction_flow_returns_and_resubmits() {
    let h = harness().await;
    let (student, _) = h.enrolled_student().await;
    let id = h.create_assessment("Corrigible quiz").await;
    let q = h
        .assessments
        .add_question(&h.instructor, id, Some(10), 0)
        .await
        .unwrap();
    let submission = h.submissions.start_submission(&student, id).await.unwrap();
    h.submissions.submit_submission(&student, id).await.unwrap();
    h.submissions
        .add_answer(&h.instructor, id, submission.id, q.id, Some(4))
        .await
        .unwrap();
    h.submissions
        .grade_submission(&h.instructor, id, submission.id, h.instructor_id)
        .await
        .unwrap();
    h.submissions
        .publish_results(&h.instructor, id, &CancellationToken::new())
        .await
        .unwrap();

    let returned = h
        .submissions
        .return_submission(&h.instructor, id, submission.id)
        .await
        .unwrap();
    assert_eq!(returned.status, SubmissionStatus::Returned);

    let resubmitted = h
        .submissions
        .resubmit_submission(&student, id)
        .await
        .unwrap();
    assert_eq!(resubmitted.status, SubmissionStatus::Resubmitted);

    let submitted = h.submissions.submit_submission(&student, id).await.unwrap();
    assert_eq!(submitted.status, SubmissionStatus::Submitted);

    // Correcting the marks and re-grading works from SUBMITTED again.
    h.submissions
        .add_answer(&h.instructor, id, submission.id, q.id, Some(5))
        .await
        .unwrap();
    let regraded = h
        .submissions
        .grade_submission(&h.instructor, id, submission.id, h.instructor_id)
        .await
        .unwrap();
    assert_eq!(regraded.score_earned, Some(9));
    // Publication timestamps survive the round trip untouched.
    assert!(regraded.published_at.is_some());
}

#[tokio::test]
async fn question_set_freezes_once_answers_exist() {
    let h = harness().await;
    let (student, _) = h.enrolled_student().await;
    let id = h.create_assessment("Frozen quiz").await;
    let q = h
        .assessments
        .add_question(&h.instructor, id, Some(5), 0)
        .await
        .unwrap();
    let submission = h.submissions.start_submission(&student, id).await.unwrap();
    h.submissions
        .add_answer(&h.instructor, id, submission.id, q.id, Some(2))
        .await
        .unwrap();

    let err = h
        .assessments
        .add_question(&h.instructor, id, Some(5), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

/// [`MemoryStore`] wrapper that can make one assessment read as absent, or
/// make its lifecycle transitions fail, to drive the reconciler's failure
/// handling.
struct FaultStore {
    inner: Arc<MemoryStore>,
    vanished: Mutex<HashSet<Uuid>>,
    failing: Mutex<HashSet<Uuid>>,
}

impl FaultStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            vanished: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    fn vanish(&self, id: Uuid) {
        self.vanished.lock().unwrap().insert(id);
    }

    fn fail_transitions(&self, id: Uuid) {
        self.failing.lock().unwrap().insert(id);
    }

    fn heal(&self, id: Uuid) {
        self.failing.lock().unwrap().remove(&id);
    }

    fn is_vanished(&self, id: Uuid) -> bool {
        self.vanished.lock().unwrap().contains(&id)
    }

    fn is_failing(&self, id: Uuid) -> bool {
        self.failing.lock().unwrap().contains(&id)
    }
}

#[async_trait]
impl LifecycleStore for FaultStore {
    async fn insert_assessment(&self, new: NewAssessment) -> Result<Assessment> {
        self.inner.insert_assessment(new).await
    }

    async fn assessment_by_id(&self, scope: &AccessScope, id: Uuid) -> Result<Option<Assessment>> {
        if self.is_vanished(id) {
            return Ok(None);
        }
        self.inner.assessment_by_id(scope, id).await
    }

    async fn list_assessments(
        &self,
        scope: &AccessScope,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Assessment>, i64)> {
        self.inner.list_assessments(scope, page, per_page).await
    }

    async fn apply_schedule(
        &self,
        id: Uuid,
        from: &[AssessmentStatus],
        window: ScheduleWindow,
        timezone: &str,
    ) -> Result<Option<Assessment>> {
        self.inner.apply_schedule(id, from, window, timezone).await
    }

    async fn transition_assessment(
        &self,
        id: Uuid,
        from: &[AssessmentStatus],
        to: AssessmentStatus,
    ) -> Result<bool> {
        if self.is_failing(id) {
            return Err(Error::Internal("connection closed".to_string()));
        }
        if self.is_vanished(id) {
            return Ok(false);
        }
        self.inner.transition_assessment(id, from, to).await
    }

    async fn due_triggers(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<LifecycleTrigger>> {
        self.inner.due_triggers(now, limit).await
    }

    async fn pending_triggers_for(&self, assessment_id: Uuid) -> Result<Vec<LifecycleTrigger>> {
        self.inner.pending_triggers_for(assessment_id).await
    }

    async fn complete_trigger(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.inner.complete_trigger(id, at).await
    }

    async fn record_trigger_failure(
        &self,
        id: Uuid,
        error: &str,
        terminal: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.record_trigger_failure(id, error, terminal, at).await
    }

    async fn insert_question(
        &self,
        assessment_id: Uuid,
        points: Option<i32>,
        ordinal: i32,
    ) -> Result<Question> {
        self.inner.insert_question(assessment_id, points, ordinal).await
    }

    async fn questions_for(&self, assessment_id: Uuid) -> Result<Vec<Question>> {
        self.inner.questions_for(assessment_id).await
    }

    async fn insert_answer(
        &self,
        question_id: Uuid,
        submission_id: Uuid,
        points_awarded: Option<i32>,
    ) -> Result<Answer> {
        self.inner
            .insert_answer(question_id, submission_id, points_awarded)
            .await
    }

    async fn answers_for(&self, submission_id: Uuid) -> Result<Vec<Answer>> {
        self.inner.answers_for(submission_id).await
    }

    async fn assessment_has_answers(&self, assessment_id: Uuid) -> Result<bool> {
        self.inner.assessment_has_answers(assessment_id).await
    }

    async fn submission_for_student(
        &self,
        assessment_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<Submission>> {
        self.inner
            .submission_for_student(assessment_id, student_id)
            .await
    }

    async fn insert_submission(
        &self,
        assessment_id: Uuid,
        student_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<Submission> {
        self.inner
            .insert_submission(assessment_id, student_id, started_at)
            .await
    }

    async fn submission_by_id(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
        submission_id: Uuid,
    ) -> Result<Option<Submission>> {
        self.inner
            .submission_by_id(scope, assessment_id, submission_id)
            .await
    }

    async fn submissions_for_assessment(&self, assessment_id: Uuid) -> Result<Vec<Submission>> {
        self.inner.submissions_for_assessment(assessment_id).await
    }

    async fn update_submission_status(
        &self,
        id: Uuid,
        from: &[SubmissionStatus],
        to: SubmissionStatus,
        stamp: StatusStamp,
    ) -> Result<Option<Submission>> {
        self.inner.update_submission_status(id, from, to, stamp).await
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
        self.inner
            .apply_grade(id, expected_version, max_score, score_earned, graded_by, graded_at)
            .await
    }

    async fn publish_chunk(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<u64> {
        self.inner.publish_chunk(ids, at).await
    }

    async fn count_not_published(&self, assessment_id: Uuid) -> Result<i64> {
        self.inner.count_not_published(assessment_id).await
    }

    async fn mark_missed(&self, assessment_id: Uuid, at: DateTime<Utc>) -> Result<u64> {
        self.inner.mark_missed(assessment_id, at).await
    }

    async fn insert_class(&self, name: &str) -> Result<Uuid> {
        self.inner.insert_class(name).await
    }

    async fn insert_enrollment(&self, class_id: Uuid, student_id: Uuid) -> Result<()> {
        self.inner.insert_enrollment(class_id, student_id).await
    }
}

struct FaultHarness {
    inner: Arc<MemoryStore>,
    store: Arc<FaultStore>,
    scheduler: SchedulerService,
    instructor: AccessScope,
    assessment_id: Uuid,
}

/// One scheduled assessment with its OPEN trigger already due.
async fn fault_harness() -> FaultHarness {
    let inner = Arc::new(MemoryStore::new());
    let store = Arc::new(FaultStore::new(inner.clone()));
    let dyn_store: Arc<dyn LifecycleStore> = store.clone();
    let assessments = AssessmentService::new(dyn_store.clone());
    let scheduler = SchedulerService::new(dyn_store, Duration::from_secs(1));

    let class_id = inner.insert_class("3C").await.expect("class");
    let instructor_id = Uuid::new_v4();
    let instructor = AccessScope::Instructor(instructor_id);
    let assessment_id = assessments
        .create_assessment(
            &instructor,
            instructor_id,
            "Flaky quiz".to_string(),
            None,
            class_id,
            None,
            None,
        )
        .await
        .expect("create")
        .id;
    let now = Utc::now();
    assessments
        .schedule_assessment(
            &instructor,
            assessment_id,
            now - ChronoDuration::hours(1),
            now + ChronoDuration::hours(1),
            "UTC",
        )
        .await
        .expect("schedule");

    FaultHarness {
        inner,
        store,
        scheduler,
        instructor,
        assessment_id,
    }
}

#[tokio::test]
async fn trigger_for_vanished_assessment_is_dropped_not_retried() {
    let h = fault_harness().await;
    h.store.vanish(h.assessment_id);

    // The OPEN fire sees no assessment: terminal, completed without effect.
    assert_eq!(h.scheduler.run_once().await.unwrap(), 0);
    let pending = h.inner.pending_triggers_for(h.assessment_id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, TriggerKind::Close);

    // A later pass finds nothing due; the dropped trigger never re-fires.
    assert_eq!(h.scheduler.run_once().await.unwrap(), 0);
    let assessment = h
        .inner
        .assessment_by_id(&AccessScope::Admin, h.assessment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(assessment.status, AssessmentStatus::Scheduled);
}

#[tokio::test]
async fn transient_fire_failure_keeps_trigger_pending_for_retry() {
    let h = fault_harness().await;
    h.store.fail_transitions(h.assessment_id);

    assert_eq!(h.scheduler.run_once().await.unwrap(), 0);
    let pending = h.inner.pending_triggers_for(h.assessment_id).await.unwrap();
    assert_eq!(pending.len(), 2);
    let open = pending
        .iter()
        .find(|t| t.kind == TriggerKind::Open)
        .expect("open trigger still pending");
    assert_eq!(open.attempts, 1);
    assert!(open.last_error.is_some());

    // Once the store recovers, the same trigger fires on the next poll.
    h.store.heal(h.assessment_id);
    assert_eq!(h.scheduler.run_once().await.unwrap(), 1);
    let assessment = h
        .inner
        .assessment_by_id(&h.instructor, h.assessment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(assessment.status, AssessmentStatus::Started);
    assert_eq!(
        h.inner
            .pending_triggers_for(h.assessment_id)
            .await
            .unwrap()
            .len(),
        1
    );
}
