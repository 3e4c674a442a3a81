use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AddAnswerPayload {
    pub question_id: Uuid,
    /// Instructor-entered marks; negative awards are rejected at the edge.
    #[validate(range(min = 0))]
    pub points_awarded: Option<i32>,
}
