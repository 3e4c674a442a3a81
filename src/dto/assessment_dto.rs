use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssessmentPayload {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub class_id: Uuid,
    pub sub_subject_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub time_limit_minutes: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ScheduleAssessmentPayload {
    pub start_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    #[validate(length(min = 1))]
    pub timezone: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddQuestionPayload {
    #[validate(range(min = 0))]
    pub points: Option<i32>,
    #[serde(default)]
    pub ordinal: i32,
}
