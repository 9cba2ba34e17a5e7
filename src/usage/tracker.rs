//! Rolling-month budget enforcement over the usage ledger.

use std::sync::Arc;

use crate::clock::{Clock, month_start};
use crate::error::StoreError;
use crate::limits::{BudgetKind, Limit, PlanLimits};
use crate::usage::{UsageLedger, UsageRecord};

/// Outcome of a budget reservation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    Allowed { current: u64 },
    Denied { current: u64, limit: u64 },
}

impl BudgetDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, BudgetDecision::Allowed { .. })
    }
}

/// Checks reservations against the current calendar month's committed usage
/// and appends commits to the ledger.
///
/// There is no stored monthly counter: the month rolls over implicitly
/// because the check filters ledger records by the current UTC month start.
#[derive(Clone)]
pub struct UsageBudgetTracker {
    ledger: Arc<dyn UsageLedger>,
    clock: Arc<dyn Clock>,
}

impl UsageBudgetTracker {
    pub fn new(ledger: Arc<dyn UsageLedger>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// Check whether one more unit of `budget_kind` fits in this month's
    /// budget. Does not record anything; the increment happens in
    /// [`UsageBudgetTracker::commit`] after the protected operation
    /// succeeds, so failed calls never consume budget.
    pub async fn try_reserve(
        &self,
        tenant_id: &str,
        budget_kind: BudgetKind,
        limits: &PlanLimits,
    ) -> Result<BudgetDecision, StoreError> {
        let limit = limits.usage_limit(budget_kind);
        let current = self.usage_this_month(tenant_id, budget_kind).await?;

        match limit {
            Limit::Unlimited => Ok(BudgetDecision::Allowed { current }),
            Limit::Max(max) if current < max => Ok(BudgetDecision::Allowed { current }),
            Limit::Max(max) => Ok(BudgetDecision::Denied {
                current,
                limit: max,
            }),
        }
    }

    /// Append a committed usage record. Call only after the protected
    /// operation actually succeeded.
    pub async fn commit(
        &self,
        tenant_id: &str,
        budget_kind: BudgetKind,
        amount: u64,
    ) -> Result<(), StoreError> {
        self.ledger
            .append(UsageRecord {
                tenant_id: tenant_id.to_string(),
                budget_kind,
                amount,
                recorded_at: self.clock.now(),
            })
            .await
    }

    /// Committed usage since the start of the current UTC month.
    pub async fn usage_this_month(
        &self,
        tenant_id: &str,
        budget_kind: BudgetKind,
    ) -> Result<u64, StoreError> {
        let since = month_start(self.clock.now());
        self.ledger.sum_since(tenant_id, budget_kind, since).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::usage::InMemoryUsageLedger;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::time::Duration;

    fn limits(max: Limit) -> PlanLimits {
        PlanLimits {
            max_requests_per_window: Limit::Unlimited,
            window_length: Duration::from_secs(3600),
            max_usage_per_month: HashMap::from([(BudgetKind::AiMessage, max)]),
            static_resource_limits: HashMap::new(),
        }
    }

    fn tracker() -> (UsageBudgetTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap(),
        ));
        let ledger = Arc::new(InMemoryUsageLedger::new());
        (UsageBudgetTracker::new(ledger, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_budget_boundary() {
        let (tracker, _clock) = tracker();
        let limits = limits(Limit::Max(20));

        for _ in 0..20 {
            assert!(
                tracker
                    .try_reserve("firm-a", BudgetKind::AiMessage, &limits)
                    .await
                    .unwrap()
                    .is_allowed()
            );
            tracker
                .commit("firm-a", BudgetKind::AiMessage, 1)
                .await
                .unwrap();
        }

        let decision = tracker
            .try_reserve("firm-a", BudgetKind::AiMessage, &limits)
            .await
            .unwrap();
        assert_eq!(
            decision,
            BudgetDecision::Denied {
                current: 20,
                limit: 20
            }
        );
    }

    #[tokio::test]
    async fn test_previous_month_does_not_count() {
        let (tracker, clock) = tracker();
        let limits = limits(Limit::Max(1));

        tracker
            .commit("firm-a", BudgetKind::AiMessage, 1)
            .await
            .unwrap();
        assert!(
            !tracker
                .try_reserve("firm-a", BudgetKind::AiMessage, &limits)
                .await
                .unwrap()
                .is_allowed()
        );

        // Cross into July; June's record drops out of the window but stays
        // in the ledger for audit.
        clock.set(Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap());

        let decision = tracker
            .try_reserve("firm-a", BudgetKind::AiMessage, &limits)
            .await
            .unwrap();
        assert_eq!(decision, BudgetDecision::Allowed { current: 0 });
    }

    #[tokio::test]
    async fn test_unlimited_budget_always_allows() {
        let (tracker, _clock) = tracker();
        let limits = limits(Limit::Unlimited);

        for _ in 0..50 {
            tracker
                .commit("firm-a", BudgetKind::AiMessage, 10)
                .await
                .unwrap();
        }

        assert!(
            tracker
                .try_reserve("firm-a", BudgetKind::AiMessage, &limits)
                .await
                .unwrap()
                .is_allowed()
        );
    }

    #[tokio::test]
    async fn test_budget_kinds_tracked_independently() {
        let (tracker, _clock) = tracker();
        let limits = limits(Limit::Max(2));

        tracker
            .commit("firm-a", BudgetKind::ApiCall, 100)
            .await
            .unwrap();

        let decision = tracker
            .try_reserve("firm-a", BudgetKind::AiMessage, &limits)
            .await
            .unwrap();
        assert_eq!(decision, BudgetDecision::Allowed { current: 0 });
    }

    #[tokio::test]
    async fn test_commit_amount_aggregates() {
        let (tracker, _clock) = tracker();

        tracker
            .commit("firm-a", BudgetKind::ApiCall, 3)
            .await
            .unwrap();
        tracker
            .commit("firm-a", BudgetKind::ApiCall, 4)
            .await
            .unwrap();

        assert_eq!(
            tracker
                .usage_this_month("firm-a", BudgetKind::ApiCall)
                .await
                .unwrap(),
            7
        );
    }
}
