use crate::access::AccessScope;
use crate::error::{Error, Result};
use crate::models::assessment::{Assessment, AssessmentStatus};
use crate::models::question::{Answer, Question};
use crate::models::submission::{Submission, SubmissionStatus};
use crate::models::trigger::{LifecycleTrigger, TriggerKind};
use crate::store::{LifecycleStore, NewAssessment, ScheduleWindow, StatusStamp};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Postgres-backed [`LifecycleStore`]. Status guards live in the `WHERE`
/// clause of each write, so a guard miss is zero rows affected rather than a
/// read-then-write race. Statuses are stored as their canonical strings and
/// parsed back through the closed enums at the row boundary.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_list(from: &[AssessmentStatus]) -> Vec<String> {
    from.iter().map(|s| s.as_str().to_string()).collect()
}

fn sub_status_list(from: &[SubmissionStatus]) -> Vec<String> {
    from.iter().map(|s| s.as_str().to_string()).collect()
}

fn assessment_from_row(row: &PgRow) -> Result<Assessment> {
    let status: String = row.try_get("status")?;
    Ok(Assessment {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        class_id: row.try_get("class_id")?,
        sub_subject_id: row.try_get("sub_subject_id")?,
        start_date: row.try_get("start_date")?,
        due_date: row.try_get("due_date")?,
        time_limit_minutes: row.try_get("time_limit_minutes")?,
        timezone: row.try_get("timezone")?,
        status: status.parse().map_err(Error::Internal)?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn submission_from_row(row: &PgRow) -> Result<Submission> {
    let status: String = row.try_get("status")?;
    Ok(Submission {
        id: row.try_get("id")?,
        assessment_id: row.try_get("assessment_id")?,
        student_id: row.try_get("student_id")?,
        status: status.parse().map_err(Error::Internal)?,
        max_score: row.try_get("max_score")?,
        score_earned: row.try_get("score_earned")?,
        started_at: row.try_get("started_at")?,
        submitted_at: row.try_get("submitted_at")?,
        graded_at: row.try_get("graded_at")?,
        graded_by: row.try_get("graded_by")?,
        published_at: row.try_get("published_at")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn question_from_row(row: &PgRow) -> Result<Question> {
    Ok(Question {
        id: row.try_get("id")?,
        assessment_id: row.try_get("assessment_id")?,
        points: row.try_get("points")?,
        ordinal: row.try_get("ordinal")?,
        created_at: row.try_get("created_at")?,
    })
}

fn answer_from_row(row: &PgRow) -> Result<Answer> {
    Ok(Answer {
        id: row.try_get("id")?,
        question_id: row.try_get("question_id")?,
        submission_id: row.try_get("submission_id")?,
        points_awarded: row.try_get("points_awarded")?,
        created_at: row.try_get("created_at")?,
    })
}

fn trigger_from_row(row: &PgRow) -> Result<LifecycleTrigger> {
    let kind: String = row.try_get("kind")?;
    Ok(LifecycleTrigger {
        id: row.try_get("id")?,
        assessment_id: row.try_get("assessment_id")?,
        kind: kind.parse().map_err(Error::Internal)?,
        fire_at: row.try_get("fire_at")?,
        completed_at: row.try_get("completed_at")?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
    })
}

#[async_trait]
impl LifecycleStore for PgStore {
    async fn insert_assessment(&self, new: NewAssessment) -> Result<Assessment> {
        let row = sqlx::query(
            r#"
            INSERT INTO assessments (title, description, class_id, sub_subject_id, time_limit_minutes, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.class_id)
        .bind(new.sub_subject_id)
        .bind(new.time_limit_minutes)
        .bind(new.created_by)
        .fetch_one(&self.pool)
        .await?;
        assessment_from_row(&row)
    }

    async fn assessment_by_id(&self, scope: &AccessScope, id: Uuid) -> Result<Option<Assessment>> {
        // One finder variant per role; a scope miss reads exactly like a
        // missing row.
        let row = match scope {
            AccessScope::Admin => {
                sqlx::query(r#"SELECT * FROM assessments WHERE id = $1"#)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            AccessScope::Instructor(caller) => {
                sqlx::query(r#"SELECT * FROM assessments WHERE id = $1 AND created_by = $2"#)
                    .bind(id)
                    .bind(caller)
                    .fetch_optional(&self.pool)
                    .await?
            }
            AccessScope::Student(caller) => {
                sqlx::query(
                    r#"
                    SELECT a.* FROM assessments a
                    JOIN enrollments e ON e.class_id = a.class_id AND e.active
                    WHERE a.id = $1 AND e.student_id = $2
                    "#,
                )
                .bind(id)
                .bind(caller)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        row.as_ref().map(assessment_from_row).transpose()
    }

    async fn list_assessments(
        &self,
        scope: &AccessScope,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Assessment>, i64)> {
        let offset = (page - 1).max(0) * per_page;
        let (rows, total) = match scope {
            AccessScope::Admin => {
                let rows = sqlx::query(
                    r#"SELECT * FROM assessments ORDER BY created_at DESC, id LIMIT $1 OFFSET $2"#,
                )
                .bind(per_page)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                let total: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM assessments"#)
                    .fetch_one(&self.pool)
                    .await?;
                (rows, total)
            }
            AccessScope::Instructor(caller) => {
                let rows = sqlx::query(
                    r#"
                    SELECT * FROM assessments WHERE created_by = $1
                    ORDER BY created_at DESC, id LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(caller)
                .bind(per_page)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                let total: i64 = sqlx::query_scalar(
                    r#"SELECT COUNT(*) FROM assessments WHERE created_by = $1"#,
                )
                .bind(caller)
                .fetch_one(&self.pool)
                .await?;
                (rows, total)
            }
            AccessScope::Student(caller) => {
                let rows = sqlx::query(
                    r#"
                    SELECT a.* FROM assessments a
                    JOIN enrollments e ON e.class_id = a.class_id AND e.active
                    WHERE e.student_id = $1
                    ORDER BY a.created_at DESC, a.id LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(caller)
                .bind(per_page)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                let total: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM assessments a
                    JOIN enrollments e ON e.class_id = a.class_id AND e.active
                    WHERE e.student_id = $1
                    "#,
                )
                .bind(caller)
                .fetch_one(&self.pool)
                .await?;
                (rows, total)
            }
        };
        let rows = rows
            .iter()
            .map(assessment_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((rows, total))
    }

    async fn apply_schedule(
        &self,
        id: Uuid,
        from: &[AssessmentStatus],
        window: ScheduleWindow,
        timezone: &str,
    ) -> Result<Option<Assessment>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            UPDATE assessments
            SET start_date = $1, due_date = $2, timezone = $3,
                status = 'SCHEDULED', updated_at = NOW()
            WHERE id = $4 AND status = ANY($5)
            RETURNING *
            "#,
        )
        .bind(window.start_date)
        .bind(window.due_date)
        .bind(timezone)
        .bind(id)
        .bind(status_list(from))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // The trigger pair is replaced in the same transaction as the status
        // write, so a crash can never leave SCHEDULED without pending
        // triggers or vice versa.
        sqlx::query(
            r#"DELETE FROM lifecycle_triggers WHERE assessment_id = $1 AND completed_at IS NULL"#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        for (kind, fire_at) in [
            (TriggerKind::Open, window.start_date),
            (TriggerKind::Close, window.due_date),
        ] {
            sqlx::query(
                r#"INSERT INTO lifecycle_triggers (assessment_id, kind, fire_at) VALUES ($1, $2, $3)"#,
            )
            .bind(id)
            .bind(kind.as_str())
            .bind(fire_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        assessment_from_row(&row).map(Some)
    }

    async fn transition_assessment(
        &self,
        id: Uuid,
        from: &[AssessmentStatus],
        to: AssessmentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE assessments SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = ANY($3)
            "#,
        )
        .bind(to.as_str())
        .bind(id)
        .bind(status_list(from))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn due_triggers(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<LifecycleTrigger>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM lifecycle_triggers
            WHERE completed_at IS NULL AND fire_at <= $1
            ORDER BY fire_at, id
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(trigger_from_row).collect()
    }

    async fn pending_triggers_for(&self, assessment_id: Uuid) -> Result<Vec<LifecycleTrigger>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM lifecycle_triggers
            WHERE assessment_id = $1 AND completed_at IS NULL
            ORDER BY fire_at
            "#,
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(trigger_from_row).collect()
    }

    async fn complete_trigger(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE lifecycle_triggers
            SET completed_at = COALESCE(completed_at, $1)
            WHERE id = $2
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_trigger_failure(
        &self,
        id: Uuid,
        error: &str,
        terminal: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE lifecycle_triggers
            SET attempts = attempts + 1,
                last_error = $1,
                completed_at = CASE WHEN $2 THEN COALESCE(completed_at, $3) ELSE completed_at END
            WHERE id = $4
            "#,
        )
        .bind(error)
        .bind(terminal)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_question(
        &self,
        assessment_id: Uuid,
        points: Option<i32>,
        ordinal: i32,
    ) -> Result<Question> {
        let row = sqlx::query(
            r#"
            INSERT INTO questions (assessment_id, points, ordinal)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(assessment_id)
        .bind(points)
        .bind(ordinal)
        .fetch_one(&self.pool)
        .await?;
        question_from_row(&row)
    }

    async fn questions_for(&self, assessment_id: Uuid) -> Result<Vec<Question>> {
        let rows = sqlx::query(
            r#"SELECT * FROM questions WHERE assessment_id = $1 ORDER BY ordinal, id"#,
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(question_from_row).collect()
    }

    async fn insert_answer(
        &self,
        question_id: Uuid,
        submission_id: Uuid,
        points_awarded: Option<i32>,
    ) -> Result<Answer> {
        let row = sqlx::query(
            r#"
            INSERT INTO answers (question_id, submission_id, points_awarded)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(question_id)
        .bind(submission_id)
        .bind(points_awarded)
        .fetch_one(&self.pool)
        .await?;
        answer_from_row(&row)
    }

    async fn answers_for(&self, submission_id: Uuid) -> Result<Vec<Answer>> {
        let rows = sqlx::query(
            r#"SELECT * FROM answers WHERE submission_id = $1 ORDER BY created_at, id"#,
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(answer_from_row).collect()
    }

    async fn assessment_has_answers(&self, assessment_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM answers ans
                JOIN questions q ON q.id = ans.question_id
                WHERE q.assessment_id = $1
            )
            "#,
        )
        .bind(assessment_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn submission_for_student(
        &self,
        assessment_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<Submission>> {
        let row = sqlx::query(
            r#"SELECT * FROM submissions WHERE assessment_id = $1 AND student_id = $2"#,
        )
        .bind(assessment_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(submission_from_row).transpose()
    }

    async fn insert_submission(
        &self,
        assessment_id: Uuid,
        student_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<Submission> {
        // The unique pair constraint makes the start idempotent even under a
        // concurrent double-click: the loser of the race reads the winner's
        // row back.
        let row = sqlx::query(
            r#"
            INSERT INTO submissions (assessment_id, student_id, started_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (assessment_id, student_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(assessment_id)
        .bind(student_id)
        .bind(started_at)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => submission_from_row(&row),
            None => self
                .submission_for_student(assessment_id, student_id)
                .await?
                .ok_or_else(|| Error::Internal("submission vanished after conflict".to_string())),
        }
    }

    async fn submission_by_id(
        &self,
        scope: &AccessScope,
        assessment_id: Uuid,
        submission_id: Uuid,
    ) -> Result<Option<Submission>> {
        let row = match scope {
            AccessScope::Admin => {
                sqlx::query(
                    r#"SELECT * FROM submissions WHERE id = $1 AND assessment_id = $2"#,
                )
                .bind(submission_id)
                .bind(assessment_id)
                .fetch_optional(&self.pool)
                .await?
            }
            AccessScope::Instructor(caller) => {
                sqlx::query(
                    r#"
                    SELECT s.* FROM submissions s
                    JOIN assessments a ON a.id = s.assessment_id
                    WHERE s.id = $1 AND s.assessment_id = $2 AND a.created_by = $3
                    "#,
                )
                .bind(submission_id)
                .bind(assessment_id)
                .bind(caller)
                .fetch_optional(&self.pool)
                .await?
            }
            AccessScope::Student(caller) => {
                sqlx::query(
                    r#"
                    SELECT * FROM submissions
                    WHERE id = $1 AND assessment_id = $2 AND student_id = $3
                    "#,
                )
                .bind(submission_id)
                .bind(assessment_id)
                .bind(caller)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        row.as_ref().map(submission_from_row).transpose()
    }

    async fn submissions_for_assessment(&self, assessment_id: Uuid) -> Result<Vec<Submission>> {
        let rows = sqlx::query(
            r#"SELECT * FROM submissions WHERE assessment_id = $1 ORDER BY created_at, id"#,
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(submission_from_row).collect()
    }

    async fn update_submission_status(
        &self,
        id: Uuid,
        from: &[SubmissionStatus],
        to: SubmissionStatus,
        stamp: StatusStamp,
    ) -> Result<Option<Submission>> {
        let row = sqlx::query(
            r#"
            UPDATE submissions
            SET status = $1,
                submitted_at = COALESCE(submitted_at, $2),
                started_at = COALESCE(started_at, $3),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $4 AND status = ANY($5)
            RETURNING *
            "#,
        )
        .bind(to.as_str())
        .bind(stamp.submitted_at)
        .bind(stamp.started_at)
        .bind(id)
        .bind(sub_status_list(from))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(submission_from_row).transpose()
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
        let row = sqlx::query(
            r#"
            UPDATE submissions
            SET status = 'GRADED', max_score = $1, score_earned = $2,
                graded_by = $3, graded_at = $4,
                version = version + 1, updated_at = NOW()
            WHERE id = $5 AND version = $6 AND status = 'SUBMITTED'
            RETURNING *
            "#,
        )
        .bind(max_score)
        .bind(score_earned)
        .bind(graded_by)
        .bind(graded_at)
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(submission_from_row).transpose()
    }

    async fn publish_chunk(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET status = 'PUBLISHED',
                published_at = COALESCE(published_at, $1),
                version = version + 1, updated_at = NOW()
            WHERE id = ANY($2) AND status = 'GRADED'
            "#,
        )
        .bind(at)
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_not_published(&self, assessment_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM submissions WHERE assessment_id = $1 AND status <> 'PUBLISHED'"#,
        )
        .bind(assessment_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_missed(&self, assessment_id: Uuid, at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET status = 'MISSED', version = version + 1, updated_at = $1
            WHERE assessment_id = $2 AND status = 'NOT_SUBMITTED'
            "#,
        )
        .bind(at)
        .bind(assessment_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_class(&self, name: &str) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"INSERT INTO classes (name) VALUES ($1) RETURNING id"#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn insert_enrollment(&self, class_id: Uuid, student_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO enrollments (class_id, student_id, active)
            VALUES ($1, $2, TRUE)
            ON CONFLICT (class_id, student_id) DO UPDATE SET active = TRUE
            "#,
        )
        .bind(class_id)
        .bind(student_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
