use crate::error::{Error, Result};
use crate::models::user::{Profile, Role};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of an identity lookup. `Degraded` means the service is
/// temporarily unreachable (breaker open, timeout, 5xx) and must never be
/// read as "zero results".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityResult<T> {
    Available(T),
    Degraded,
}

impl<T> IdentityResult<T> {
    pub fn available(self) -> Option<T> {
        match self {
            IdentityResult::Available(v) => Some(v),
            IdentityResult::Degraded => None,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Small failure-counting breaker: after `threshold` consecutive failures
/// the circuit opens for `open_for`, during which calls short-circuit to
/// Degraded. The first call after the window acts as the half-open probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    open_for: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, open_for: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            open_for,
            state: Mutex::new(BreakerState {
                consecutive_failures: 0,
                open_until: None,
            }),
        }
    }

    fn allow_at(&self, now: Instant) -> bool {
        let guard = self.state.lock().expect("breaker mutex poisoned");
        match guard.open_until {
            Some(until) => now >= until,
            None => true,
        }
    }

    fn record_success(&self) {
        let mut guard = self.state.lock().expect("breaker mutex poisoned");
        guard.consecutive_failures = 0;
        guard.open_until = None;
    }

    fn record_failure_at(&self, now: Instant) {
        let mut guard = self.state.lock().expect("breaker mutex poisoned");
        guard.consecutive_failures += 1;
        if guard.consecutive_failures >= self.threshold {
            guard.open_until = Some(now + self.open_for);
        }
    }

    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now())
    }
}

/// Client for the external identity/user service. Lookups carry a bounded
/// timeout and run behind the breaker. A missing user is NotFound, an
/// unreachable service is `Degraded`; the two are never conflated.
#[derive(Clone)]
pub struct IdentityService {
    client: Client,
    base_url: Option<String>,
    breaker: Arc<CircuitBreaker>,
}

impl IdentityService {
    pub fn new(base_url: Option<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client for identity service");

        let base_url = base_url
            .filter(|url| !url.trim().is_empty())
            .map(|url| url.trim_end_matches('/').to_string());

        if let Some(ref url) = base_url {
            info!("identity service enabled at {}", url);
        } else {
            info!("identity service disabled (IDENTITY_SERVICE_URL not set)");
        }

        Self {
            client,
            base_url,
            breaker: Arc::new(CircuitBreaker::new(5, Duration::from_secs(30))),
        }
    }

    pub async fn user_by_id(&self, id: Uuid) -> Result<IdentityResult<Profile>> {
        let Some(base) = self.guarded_base() else {
            return Ok(IdentityResult::Degraded);
        };
        let url = format!("{}/api/users/{}", base, id);
        let resp = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => return Ok(self.degrade(&e.to_string())),
        };
        match resp.status() {
            StatusCode::NOT_FOUND => {
                self.breaker.record_success();
                Err(Error::NotFound(format!("user {} not found", id)))
            }
            status if status.is_success() => {
                self.breaker.record_success();
                Ok(IdentityResult::Available(resp.json::<Profile>().await?))
            }
            status => Ok(self.degrade(&format!("identity returned {}", status))),
        }
    }

    pub async fn users_by_ids(&self, ids: &[Uuid]) -> Result<IdentityResult<Vec<Profile>>> {
        if ids.is_empty() {
            return Ok(IdentityResult::Available(Vec::new()));
        }
        let Some(base) = self.guarded_base() else {
            return Ok(IdentityResult::Degraded);
        };
        let url = format!("{}/api/users/batch", base);
        let resp = match self
            .client
            .post(&url)
            .json(&json!({ "ids": ids }))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return Ok(self.degrade(&e.to_string())),
        };
        if resp.status().is_success() {
            self.breaker.record_success();
            Ok(IdentityResult::Available(resp.json::<Vec<Profile>>().await?))
        } else {
            Ok(self.degrade(&format!("identity returned {}", resp.status())))
        }
    }

    pub async fn users_by_role(&self, role: Role) -> Result<IdentityResult<Vec<Profile>>> {
        let Some(base) = self.guarded_base() else {
            return Ok(IdentityResult::Degraded);
        };
        let url = format!("{}/api/users", base);
        let resp = match self
            .client
            .get(&url)
            .query(&[("role", role.as_str())])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return Ok(self.degrade(&e.to_string())),
        };
        if resp.status().is_success() {
            self.breaker.record_success();
            Ok(IdentityResult::Available(resp.json::<Vec<Profile>>().await?))
        } else {
            Ok(self.degrade(&format!("identity returned {}", resp.status())))
        }
    }

    fn guarded_base(&self) -> Option<&str> {
        let base = self.base_url.as_deref()?;
        if self.breaker.allow() {
            Some(base)
        } else {
            warn!("identity circuit open, serving degraded response");
            None
        }
    }

    fn degrade<T>(&self, reason: &str) -> IdentityResult<T> {
        warn!("identity call failed: {}", reason);
        self.breaker.record_failure();
        IdentityResult::Degraded
    }
}
