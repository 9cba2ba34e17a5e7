//! Per-tenant fixed-window rate limiting.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::clock::Clock;
use crate::limits::{Limit, PlanLimits};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

#[derive(Debug)]
struct WindowState {
    window_start: DateTime<Utc>,
    count: u64,
}

/// Point-in-time view of one tenant's window, for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub window_start: DateTime<Utc>,
    pub count: u64,
}

/// Fixed-window request counter, keyed by tenant.
///
/// Each tenant's window lives behind its own mutex inside a concurrent map,
/// so rollover-and-increment is atomic per tenant while unrelated tenants
/// never contend on the same lock. The map shard lock is held only for the
/// lookup itself.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, Arc<Mutex<WindowState>>>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Consume one request slot for `tenant_id` under the tenant's plan
    /// limits.
    pub fn try_consume(&self, tenant_id: &str, limits: &PlanLimits) -> RateDecision {
        let state = self.tenant_state(tenant_id);
        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());

        let now = self.clock.now();
        let window_length = chrono::Duration::from_std(limits.window_length)
            .unwrap_or_else(|_| chrono::Duration::MAX);

        if now - state.window_start >= window_length {
            state.window_start = now;
            state.count = 0;
        }

        match limits.max_requests_per_window {
            Limit::Unlimited => {
                state.count += 1;
                RateDecision::Allowed
            }
            Limit::Max(max) if state.count < max => {
                state.count += 1;
                RateDecision::Allowed
            }
            Limit::Max(_) => {
                let retry_after = state
                    .window_start
                    .checked_add_signed(window_length)
                    .map(|window_end| (window_end - now).to_std().unwrap_or_default())
                    .unwrap_or_default();
                RateDecision::Denied { retry_after }
            }
        }
    }

    /// Current window for a tenant, if one exists yet.
    pub fn window_snapshot(&self, tenant_id: &str) -> Option<WindowSnapshot> {
        let state = self.windows.get(tenant_id)?.clone();
        let state = state.lock().unwrap_or_else(|e| e.into_inner());
        Some(WindowSnapshot {
            window_start: state.window_start,
            count: state.count,
        })
    }

    fn tenant_state(&self, tenant_id: &str) -> Arc<Mutex<WindowState>> {
        if let Some(state) = self.windows.get(tenant_id) {
            return state.clone();
        }
        let now = self.clock.now();
        self.windows
            .entry(tenant_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(WindowState {
                    window_start: now,
                    count: 0,
                }))
            })
            .clone()
    }
}
