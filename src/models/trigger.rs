use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable, time-keyed instruction to fire a lifecycle transition. Rows are
/// the source of truth for pending work: the reconciliation loop re-derives
/// everything due from this table, so triggers survive restarts and a missed
/// fire runs immediately on recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleTrigger {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub kind: TriggerKind,
    pub fire_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    Open,
    Close,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Open => "OPEN",
            TriggerKind::Close => "CLOSE",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(TriggerKind::Open),
            "CLOSE" => Ok(TriggerKind::Close),
            other => Err(format!("unknown trigger kind '{}'", other)),
        }
    }
}
