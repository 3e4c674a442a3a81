use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub class_id: Uuid,
    pub sub_subject_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub time_limit_minutes: Option<i32>,
    pub timezone: Option<String>,
    pub status: AssessmentStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentStatus {
    Drafted,
    Scheduled,
    Started,
    Finished,
}

impl AssessmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentStatus::Drafted => "DRAFTED",
            AssessmentStatus::Scheduled => "SCHEDULED",
            AssessmentStatus::Started => "STARTED",
            AssessmentStatus::Finished => "FINISHED",
        }
    }
}

impl std::fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssessmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFTED" => Ok(AssessmentStatus::Drafted),
            "SCHEDULED" => Ok(AssessmentStatus::Scheduled),
            "STARTED" => Ok(AssessmentStatus::Started),
            "FINISHED" => Ok(AssessmentStatus::Finished),
            other => Err(format!("unknown assessment status '{}'", other)),
        }
    }
}

/// Events that can move an assessment between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentEvent {
    Schedule,
    Open,
    Close,
}

/// Outcome of consulting the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    Allowed(S),
    /// The event has already taken effect (duplicate trigger fire, stale
    /// request). Callers no-op instead of failing.
    NoOp,
    Rejected,
}

impl AssessmentStatus {
    /// The single allowed-transition table. Every lifecycle mutation goes
    /// through here; there are no status checks anywhere else.
    pub fn apply(self, event: AssessmentEvent) -> Transition<AssessmentStatus> {
        use AssessmentEvent::*;
        use AssessmentStatus::*;
        match (self, event) {
            // Re-scheduling before start replaces the trigger pair.
            (Drafted, Schedule) | (Scheduled, Schedule) => Transition::Allowed(Scheduled),
            (Scheduled, Open) => Transition::Allowed(Started),
            // Close tolerates a missed OPEN firing.
            (Scheduled, Close) | (Started, Close) => Transition::Allowed(Finished),
            // Duplicate trigger fires land here once the status has moved on.
            (Started, Open) | (Finished, Open) | (Finished, Close) => Transition::NoOp,
            _ => Transition::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AssessmentEvent::*;
    use AssessmentStatus::*;

    #[test]
    fn schedule_allowed_from_drafted_and_scheduled() {
        assert_eq!(Drafted.apply(Schedule), Transition::Allowed(Scheduled));
        assert_eq!(Scheduled.apply(Schedule), Transition::Allowed(Scheduled));
        assert_eq!(Started.apply(Schedule), Transition::Rejected);
        assert_eq!(Finished.apply(Schedule), Transition::Rejected);
    }

    #[test]
    fn open_only_from_scheduled() {
        assert_eq!(Scheduled.apply(Open), Transition::Allowed(Started));
        assert_eq!(Drafted.apply(Open), Transition::Rejected);
    }

    #[test]
    fn duplicate_open_fire_is_a_noop() {
        assert_eq!(Started.apply(Open), Transition::NoOp);
        assert_eq!(Finished.apply(Open), Transition::NoOp);
    }

    #[test]
    fn close_tolerates_missed_open() {
        assert_eq!(Scheduled.apply(Close), Transition::Allowed(Finished));
        assert_eq!(Started.apply(Close), Transition::Allowed(Finished));
        assert_eq!(Finished.apply(Close), Transition::NoOp);
        assert_eq!(Drafted.apply(Close), Transition::Rejected);
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        for s in [Drafted, Scheduled, Started, Finished] {
            assert_eq!(s.as_str().parse::<AssessmentStatus>().unwrap(), s);
        }
        assert!("ARCHIVED".parse::<AssessmentStatus>().is_err());
    }
}
