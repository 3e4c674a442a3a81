use assessment_backend::access::AccessScope;
use assessment_backend::error::Error;
use assessment_backend::services::assessment_service::AssessmentService;
use assessment_backend::services::submission_service::SubmissionService;
use assessment_backend::store::memory::MemoryStore;
use assessment_backend::store::LifecycleStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct World {
    store: Arc<MemoryStore>,
    assessments: AssessmentService,
    submissions: SubmissionService,
}

fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn LifecycleStore> = store.clone();
    World {
        assessments: AssessmentService::new(dyn_store.clone()),
        submissions: SubmissionService::new(dyn_store, 100),
        store,
    }
}

impl World {
    async fn assessment_in_class(&self, instructor_id: Uuid, class_id: Uuid, title: &str) -> Uuid {
        self.assessments
            .create_assessment(
                &AccessScope::Instructor(instructor_id),
                instructor_id,
                title.to_string(),
                None,
                class_id,
                None,
                None,
            )
            .await
            .expect("create assessment")
            .id
    }

    async fn enroll(&self, class_id: Uuid) -> (AccessScope, Uuid) {
        let student_id = Uuid::new_v4();
        self.store
            .insert_enrollment(class_id, student_id)
            .await
            .expect("enroll");
        (AccessScope::Student(student_id), student_id)
    }
}

#[tokio::test]
async fn instructor_only_sees_their_own_assessments() {
    let w = world();
    let class_id = w.store.insert_class("5A").await.unwrap();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let alice_assessment = w.assessment_in_class(alice, class_id, "Alice's quiz").await;
    let bob_assessment = w.assessment_in_class(bob, class_id, "Bob's quiz").await;

    let (rows, total) = w
        .assessments
        .list_assessments(&AccessScope::Instructor(alice), 1, 50)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].id, alice_assessment);

    // A foreign assessment reads as absent, not as forbidden.
    let err = w
        .assessments
        .get_assessment(&AccessScope::Instructor(alice), bob_assessment)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn student_only_sees_assessments_of_enrolled_classes() {
    let w = world();
    let class_a = w.store.insert_class("6A").await.unwrap();
    let class_b = w.store.insert_class("6B").await.unwrap();
    let instructor = Uuid::new_v4();
    let in_a = w.assessment_in_class(instructor, class_a, "For 6A").await;
    let in_b = w.assessment_in_class(instructor, class_b, "For 6B").await;

    let (student, _) = w.enroll(class_a).await;
    let (rows, total) = w
        .assessments
        .list_assessments(&student, 1, 50)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].id, in_a);

    let err = w
        .assessments
        .get_assessment(&student, in_b)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn admin_scope_is_unrestricted() {
    let w = world();
    let class_id = w.store.insert_class("7C").await.unwrap();
    for i in 0..3 {
        w.assessment_in_class(Uuid::new_v4(), class_id, &format!("Quiz {i}"))
            .await;
    }
    let (_, total) = w
        .assessments
        .list_assessments(&AccessScope::Admin, 1, 50)
        .await
        .unwrap();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn unenrolled_student_cannot_start_and_learns_nothing() {
    let w = world();
    let class_id = w.store.insert_class("8B").await.unwrap();
    let assessment_id = w
        .assessment_in_class(Uuid::new_v4(), class_id, "Closed club")
        .await;

    let outsider = AccessScope::Student(Uuid::new_v4());
    let err = w
        .submissions
        .start_submission(&outsider, assessment_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn student_scope_is_rejected_on_management_operations() {
    let w = world();
    let class_id = w.store.insert_class("9A").await.unwrap();
    let instructor = Uuid::new_v4();
    let assessment_id = w.assessment_in_class(instructor, class_id, "Quiz").await;
    let (student, student_id) = w.enroll(class_id).await;
    let submission = w
        .submissions
        .start_submission(&student, assessment_id)
        .await
        .unwrap();

    let create = w
        .assessments
        .create_assessment(
            &student,
            student_id,
            "Rogue".to_string(),
            None,
            class_id,
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(create, Error::Forbidden(_)));

    let grade = w
        .submissions
        .grade_submission(&student, assessment_id, submission.id, student_id)
        .await
        .unwrap_err();
    assert!(matches!(grade, Error::Forbidden(_)));

    let publish = w
        .submissions
        .publish_results(&student, assessment_id, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(publish, Error::Forbidden(_)));

    let listing = w
        .submissions
        .list_submissions(&student, assessment_id)
        .await
        .unwrap_err();
    assert!(matches!(listing, Error::Forbidden(_)));
}

#[tokio::test]
async fn results_stay_hidden_until_published() {
    let w = world();
    let class_id = w.store.insert_class("10A").await.unwrap();
    let instructor_id = Uuid::new_v4();
    let instructor = AccessScope::Instructor(instructor_id);
    let assessment_id = w
        .assessment_in_class(instructor_id, class_id, "Exam")
        .await;
    let question = w
        .assessments
        .add_question(&instructor, assessment_id, Some(10), 0)
        .await
        .unwrap();
    let (student, _) = w.enroll(class_id).await;
    let submission = w
        .submissions
        .start_submission(&student, assessment_id)
        .await
        .unwrap();
    w.submissions
        .submit_submission(&student, assessment_id)
        .await
        .unwrap();
    w.submissions
        .add_answer(&instructor, assessment_id, submission.id, question.id, Some(6))
        .await
        .unwrap();
    w.submissions
        .grade_submission(&instructor, assessment_id, submission.id, instructor_id)
        .await
        .unwrap();

    // Graded but unpublished: absent on every result surface except admin's.
    let err = w
        .submissions
        .my_result(&student, assessment_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    let err = w
        .submissions
        .get_result(&instructor, assessment_id, submission.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(w
        .submissions
        .list_results(&instructor, assessment_id)
        .await
        .unwrap()
        .is_empty());
    let admin_view = w
        .submissions
        .get_result(&AccessScope::Admin, assessment_id, submission.id)
        .await
        .unwrap();
    assert_eq!(admin_view.score_earned, Some(6));

    w.submissions
        .publish_results(&instructor, assessment_id, &CancellationToken::new())
        .await
        .unwrap();

    let mine = w
        .submissions
        .my_result(&student, assessment_id)
        .await
        .unwrap();
    assert_eq!(mine.score_earned, Some(6));
    assert_eq!(mine.max_score, Some(10));
    assert_eq!(
        w.submissions
            .list_results(&instructor, assessment_id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn student_result_listing_is_restricted_to_their_own_row() {
    let w = world();
    let class_id = w.store.insert_class("11B").await.unwrap();
    let instructor_id = Uuid::new_v4();
    let instructor = AccessScope::Instructor(instructor_id);
    let assessment_id = w.assessment_in_class(instructor_id, class_id, "Test").await;

    let (first, first_id) = w.enroll(class_id).await;
    let (second, _) = w.enroll(class_id).await;
    for student in [&first, &second] {
        let submission = w
            .submissions
            .start_submission(student, assessment_id)
            .await
            .unwrap();
        w.submissions
            .submit_submission(student, assessment_id)
            .await
            .unwrap();
        w.submissions
            .grade_submission(&instructor, assessment_id, submission.id, instructor_id)
            .await
            .unwrap();
    }
    w.submissions
        .publish_results(&instructor, assessment_id, &CancellationToken::new())
        .await
        .unwrap();

    let rows = w
        .submissions
        .list_results(&first, assessment_id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].student_id, first_id);
}

#[tokio::test]
async fn student_cannot_read_another_students_submission() {
    let w = world();
    let class_id = w.store.insert_class("12C").await.unwrap();
    let assessment_id = w
        .assessment_in_class(Uuid::new_v4(), class_id, "Private work")
        .await;
    let (owner, _) = w.enroll(class_id).await;
    let (peer, _) = w.enroll(class_id).await;
    let submission = w
        .submissions
        .start_submission(&owner, assessment_id)
        .await
        .unwrap();

    let peeked = w
        .store
        .submission_by_id(&peer, assessment_id, submission.id)
        .await
        .unwrap();
    assert!(peeked.is_none());
}
