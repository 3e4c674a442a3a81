use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One gradable item of an assessment. Questions become immutable once any
/// answer references them for scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub assessment_id: Uuid,
    /// None is treated as zero by the aggregator.
    pub points: Option<i32>,
    pub ordinal: i32,
    pub created_at: DateTime<Utc>,
}

/// Instructor-entered marks for one piece of a submission. Several answers
/// may reference the same question (multi-page responses); the aggregator
/// sums them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub submission_id: Uuid,
    pub points_awarded: Option<i32>,
    pub created_at: DateTime<Utc>,
}
