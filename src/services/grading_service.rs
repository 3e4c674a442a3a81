use crate::models::question::{Answer, Question};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeTotals {
    pub max_score: i32,
    pub score_earned: i32,
}

pub struct GradingService;

impl GradingService {
    /// Aggregates a submission's score from the question/answer graph.
    ///
    /// `max = Σ question.points`; awarded points are summed per question
    /// (several answers may reference the same question) and only questions
    /// belonging to the assessment count toward the total. The earned score
    /// is clamped to the max. Missing points on either side count as zero.
    /// The result depends only on the rows passed in, so re-running it before
    /// any answer changes yields the identical totals.
    pub fn aggregate(questions: &[Question], answers: &[Answer]) -> GradeTotals {
        let mut max_score: i32 = 0;
        let mut awarded_by_question: HashMap<Uuid, i32> = HashMap::new();

        for answer in answers {
            *awarded_by_question.entry(answer.question_id).or_insert(0) +=
                answer.points_awarded.unwrap_or(0);
        }

        let mut score_earned: i32 = 0;
        for question in questions {
            max_score += question.points.unwrap_or(0);
            score_earned += awarded_by_question.get(&question.id).copied().unwrap_or(0);
        }

        GradeTotals {
            max_score,
            score_earned: score_earned.min(max_score),
        }
    }
}
