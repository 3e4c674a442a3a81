use crate::access::AccessScope;
use crate::error::{Error, Result};
use crate::models::assessment::{AssessmentEvent, AssessmentStatus, Transition};
use crate::models::trigger::{LifecycleTrigger, TriggerKind};
use crate::store::LifecycleStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const BATCH_LIMIT: i64 = 100;

/// Reconciliation loop over the durable trigger table. Each poll reads the
/// triggers whose `fire_at` has passed and applies the corresponding
/// lifecycle transition. Because due work is re-derived from the table on
/// every pass, triggers survive restarts for free and anything missed during
/// downtime fires immediately on recovery.
#[derive(Clone)]
pub struct SchedulerService {
    store: Arc<dyn LifecycleStore>,
    poll_interval: Duration,
}

impl SchedulerService {
    pub fn new(store: Arc<dyn LifecycleStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    /// Worker loop. Errors are logged and retried on the next poll; nothing
    /// here ever propagates out of the task.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("trigger reconciler stopping");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            if let Err(e) = self.run_once().await {
                tracing::error!(error = ?e, "trigger reconciler pass failed");
            }
        }
    }

    /// One reconciliation pass. Returns how many triggers completed.
    pub async fn run_once(&self) -> Result<usize> {
        let now = Utc::now();
        let due = self.store.due_triggers(now, BATCH_LIMIT).await?;
        let mut completed = 0usize;
        for trigger in due {
            match self.fire(&trigger).await {
                Ok(()) => {
                    self.store.complete_trigger(trigger.id, now).await?;
                    completed += 1;
                }
                // A vanished assessment is terminal; retrying cannot help.
                Err(Error::NotFound(msg)) => {
                    tracing::warn!(
                        trigger_id = %trigger.id,
                        assessment_id = %trigger.assessment_id,
                        "dropping trigger for missing assessment: {}",
                        msg
                    );
                    self.store
                        .record_trigger_failure(trigger.id, &msg, true, now)
                        .await?;
                }
                // Everything else stays pending and re-fires next poll.
                Err(e) => {
                    tracing::error!(
                        trigger_id = %trigger.id,
                        kind = %trigger.kind,
                        error = ?e,
                        "trigger fire failed, will retry"
                    );
                    self.store
                        .record_trigger_failure(trigger.id, &e.to_string(), false, now)
                        .await?;
                }
            }
        }
        Ok(completed)
    }

    /// Fires one trigger. The transition itself is a guarded write, so a
    /// duplicate fire (or one arriving after a manual change) degrades to a
    /// silent no-op instead of corrupting state.
    async fn fire(&self, trigger: &LifecycleTrigger) -> Result<()> {
        match trigger.kind {
            TriggerKind::Open => {
                let applied = self
                    .store
                    .transition_assessment(
                        trigger.assessment_id,
                        &[AssessmentStatus::Scheduled],
                        AssessmentStatus::Started,
                    )
                    .await?;
                if applied {
                    tracing::info!(assessment_id = %trigger.assessment_id, "assessment opened");
                } else {
                    self.explain_noop(trigger.assessment_id, AssessmentEvent::Open)
                        .await?;
                }
            }
            TriggerKind::Close => {
                let applied = self
                    .store
                    .transition_assessment(
                        trigger.assessment_id,
                        &[AssessmentStatus::Scheduled, AssessmentStatus::Started],
                        AssessmentStatus::Finished,
                    )
                    .await?;
                if applied {
                    // Students who never submitted are swept to MISSED as the
                    // window closes.
                    let swept = self
                        .store
                        .mark_missed(trigger.assessment_id, Utc::now())
                        .await?;
                    tracing::info!(
                        assessment_id = %trigger.assessment_id,
                        missed = swept,
                        "assessment closed"
                    );
                } else {
                    self.explain_noop(trigger.assessment_id, AssessmentEvent::Close)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// A guard miss either means the assessment is gone (terminal) or the
    /// status already moved past this event (no-op).
    async fn explain_noop(&self, assessment_id: Uuid, event: AssessmentEvent) -> Result<()> {
        let assessment = self
            .store
            .assessment_by_id(&AccessScope::Admin, assessment_id)
            .await?
            .ok_or_else(|| Error::NotFound("assessment not found".to_string()))?;
        match assessment.status.apply(event) {
            Transition::NoOp => {
                tracing::debug!(
                    assessment_id = %assessment_id,
                    status = %assessment.status,
                    "duplicate trigger fire, already transitioned"
                );
            }
            _ => {
                tracing::warn!(
                    assessment_id = %assessment_id,
                    status = %assessment.status,
                    event = ?event,
                    "stale trigger for status, skipping"
                );
            }
        }
        Ok(())
    }
}
