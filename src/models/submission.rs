use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub student_id: Uuid,
    pub status: SubmissionStatus,
    pub max_score: Option<i32>,
    pub score_earned: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub graded_at: Option<DateTime<Utc>>,
    pub graded_by: Option<Uuid>,
    pub published_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    NotSubmitted,
    Submitted,
    Late,
    Missed,
    Graded,
    Published,
    Returned,
    Resubmitted,
    Cancelled,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::NotSubmitted => "NOT_SUBMITTED",
            SubmissionStatus::Submitted => "SUBMITTED",
            SubmissionStatus::Late => "LATE",
            SubmissionStatus::Missed => "MISSED",
            SubmissionStatus::Graded => "GRADED",
            SubmissionStatus::Published => "PUBLISHED",
            SubmissionStatus::Returned => "RETURNED",
            SubmissionStatus::Resubmitted => "RESUBMITTED",
            SubmissionStatus::Cancelled => "CANCELLED",
            SubmissionStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_SUBMITTED" => Ok(SubmissionStatus::NotSubmitted),
            "SUBMITTED" => Ok(SubmissionStatus::Submitted),
            "LATE" => Ok(SubmissionStatus::Late),
            "MISSED" => Ok(SubmissionStatus::Missed),
            "GRADED" => Ok(SubmissionStatus::Graded),
            "PUBLISHED" => Ok(SubmissionStatus::Published),
            "RETURNED" => Ok(SubmissionStatus::Returned),
            "RESUBMITTED" => Ok(SubmissionStatus::Resubmitted),
            "CANCELLED" => Ok(SubmissionStatus::Cancelled),
            "REJECTED" => Ok(SubmissionStatus::Rejected),
            other => Err(format!("unknown submission status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionEvent {
    /// Student turns the work in. `late` is decided by the caller against the
    /// assessment window.
    Submit { late: bool },
    /// Close-time sweep for students who never submitted.
    MarkMissed,
    Grade,
    Publish,
    /// Instructor hands published work back for correction.
    Return,
    Resubmit,
    Cancel,
    Reject,
}

/// Outcome of the submission transition table. `Conflict` is reserved for
/// re-grading work that already carries a grade, which callers surface as
/// HTTP 409 rather than 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionTransition {
    Allowed(SubmissionStatus),
    NoOp,
    Conflict,
    Rejected,
}

impl SubmissionStatus {
    /// Centralized transition table for the whole submission lifecycle.
    pub fn apply(self, event: SubmissionEvent) -> SubmissionTransition {
        use SubmissionEvent::*;
        use SubmissionStatus::*;
        match (self, event) {
            (NotSubmitted, Submit { late: false }) => SubmissionTransition::Allowed(Submitted),
            (NotSubmitted, Submit { late: true }) => SubmissionTransition::Allowed(Late),
            // A resubmission is finalized by submitting again.
            (Resubmitted, Submit { late: _ }) => SubmissionTransition::Allowed(Submitted),

            (NotSubmitted, MarkMissed) => SubmissionTransition::Allowed(Missed),
            (_, MarkMissed) => SubmissionTransition::NoOp,

            (Submitted, Grade) => SubmissionTransition::Allowed(Graded),
            (Graded, Grade) | (Published, Grade) => SubmissionTransition::Conflict,
            (_, Grade) => SubmissionTransition::Rejected,

            (Graded, Publish) => SubmissionTransition::Allowed(Published),
            (_, Publish) => SubmissionTransition::Rejected,

            (Published, Return) => SubmissionTransition::Allowed(Returned),
            (_, Return) => SubmissionTransition::Rejected,

            (Returned, Resubmit) => SubmissionTransition::Allowed(Resubmitted),
            (_, Resubmit) => SubmissionTransition::Rejected,

            (NotSubmitted, Cancel) | (Submitted, Cancel) | (Late, Cancel) => {
                SubmissionTransition::Allowed(Cancelled)
            }
            (_, Cancel) => SubmissionTransition::Rejected,

            (Submitted, Reject) | (Late, Reject) | (Resubmitted, Reject) => {
                SubmissionTransition::Allowed(Rejected)
            }
            (_, Reject) => SubmissionTransition::Rejected,

            (_, Submit { .. }) => SubmissionTransition::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SubmissionEvent::*;
    use super::SubmissionStatus::*;
    use super::*;

    #[test]
    fn grade_requires_submitted() {
        assert_eq!(Submitted.apply(Grade), SubmissionTransition::Allowed(Graded));
        for s in [NotSubmitted, Late, Missed, Returned, Resubmitted, Cancelled, Rejected] {
            assert_eq!(s.apply(Grade), SubmissionTransition::Rejected, "{s:?}");
        }
    }

    #[test]
    fn regrade_is_a_conflict_not_a_bad_request() {
        assert_eq!(Graded.apply(Grade), SubmissionTransition::Conflict);
        assert_eq!(Published.apply(Grade), SubmissionTransition::Conflict);
    }

    #[test]
    fn publish_only_from_graded() {
        assert_eq!(Graded.apply(Publish), SubmissionTransition::Allowed(Published));
        assert_eq!(Submitted.apply(Publish), SubmissionTransition::Rejected);
        assert_eq!(Published.apply(Publish), SubmissionTransition::Rejected);
    }

    #[test]
    fn late_submit_lands_in_late() {
        assert_eq!(
            NotSubmitted.apply(Submit { late: true }),
            SubmissionTransition::Allowed(Late)
        );
        assert_eq!(
            NotSubmitted.apply(Submit { late: false }),
            SubmissionTransition::Allowed(Submitted)
        );
    }

    #[test]
    fn missed_sweep_skips_everything_but_not_submitted() {
        assert_eq!(NotSubmitted.apply(MarkMissed), SubmissionTransition::Allowed(Missed));
        assert_eq!(Submitted.apply(MarkMissed), SubmissionTransition::NoOp);
        assert_eq!(Published.apply(MarkMissed), SubmissionTransition::NoOp);
    }

    #[test]
    fn correction_path_round_trips() {
        assert_eq!(Published.apply(Return), SubmissionTransition::Allowed(Returned));
        assert_eq!(Returned.apply(Resubmit), SubmissionTransition::Allowed(Resubmitted));
        assert_eq!(
            Resubmitted.apply(Submit { late: false }),
            SubmissionTransition::Allowed(Submitted)
        );
    }

    #[test]
    fn storage_form_round_trips() {
        for s in [
            NotSubmitted, Submitted, Late, Missed, Graded, Published, Returned, Resubmitted,
            Cancelled, Rejected,
        ] {
            assert_eq!(s.as_str().parse::<SubmissionStatus>().unwrap(), s);
        }
    }
}
