//! Pre-flight quota check for protected operations.
//!
//! The gate runs the cheapest, most restrictive checks first: plan limits
//! resolve, then the static resource cap, then the rate window, then the
//! monthly budget. The first denial short-circuits the rest. Increments
//! made by an earlier passed check are not rolled back on a later denial;
//! a denied request having consumed one rate-limit slot is an accepted,
//! documented trade-off.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{OperationError, StoreError};
use crate::limits::{BudgetKind, Limit, PlanLimitTable, ResourceKind};
use crate::rate::{RateDecision, RateLimiter};
use crate::usage::UsageBudgetTracker;

/// Read access to current per-tenant resource counts, for static-limit
/// checks. Backed by the application's entity store; read-only here.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn count_active(
        &self,
        tenant_id: &str,
        resource: ResourceKind,
    ) -> Result<u64, StoreError>;
}

/// In-process entity counts, for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    counts: DashMap<(String, ResourceKind), u64>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_count(&self, tenant_id: impl Into<String>, resource: ResourceKind, count: u64) {
        self.counts.insert((tenant_id.into(), resource), count);
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn count_active(
        &self,
        tenant_id: &str,
        resource: ResourceKind,
    ) -> Result<u64, StoreError> {
        Ok(self
            .counts
            .get(&(tenant_id.to_string(), resource))
            .map(|c| *c)
            .unwrap_or(0))
    }
}

/// Sink for denial audit events. Denials are policy outcomes, not
/// application errors, so the default sink records them at info level.
pub trait AuditLog: Send + Sync {
    fn denial(&self, tenant_id: &str, plan_tier: &str, reason: &DenialReason);
}

/// Default audit sink that emits a `tracing` event per denial.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn denial(&self, tenant_id: &str, plan_tier: &str, reason: &DenialReason) {
        tracing::info!(tenant_id, plan_tier, reason = %reason.label(), "operation denied by quota gate");
    }
}

/// Why the gate denied an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    RateLimited { retry_after: Duration },
    UsageBudgetExceeded { current: u64, limit: u64 },
    StaticLimitExceeded { resource: ResourceKind, limit: u64 },
}

impl DenialReason {
    pub fn label(&self) -> &'static str {
        match self {
            DenialReason::RateLimited { .. } => "rate-limited",
            DenialReason::UsageBudgetExceeded { .. } => "usage-budget-exceeded",
            DenialReason::StaticLimitExceeded { .. } => "static-limit-exceeded",
        }
    }

    /// Promote the denial into the typed error surfaced to callers.
    pub(crate) fn into_operation_error(
        self,
        plan_tier: &str,
        budget_kind: BudgetKind,
    ) -> OperationError {
        match self {
            DenialReason::RateLimited { retry_after } => {
                OperationError::RateLimited { retry_after }
            }
            DenialReason::UsageBudgetExceeded { current, limit } => {
                OperationError::UsageBudgetExceeded {
                    current,
                    limit,
                    plan_tier: plan_tier.to_string(),
                    budget_kind,
                }
            }
            DenialReason::StaticLimitExceeded { resource, limit } => {
                OperationError::StaticLimitExceeded {
                    resource,
                    limit,
                    plan_tier: plan_tier.to_string(),
                }
            }
        }
    }
}

/// Verdict of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Denied(DenialReason),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            QuotaDecision::Denied(DenialReason::RateLimited { retry_after }) => Some(*retry_after),
            _ => None,
        }
    }
}

/// Orchestrates the plan-limit, rate-limit, and usage-budget checks.
#[derive(Clone)]
pub struct QuotaGate {
    plans: Arc<PlanLimitTable>,
    rate: RateLimiter,
    tracker: UsageBudgetTracker,
    entities: Arc<dyn EntityStore>,
    audit: Arc<dyn AuditLog>,
}

impl QuotaGate {
    pub fn new(
        plans: Arc<PlanLimitTable>,
        rate: RateLimiter,
        tracker: UsageBudgetTracker,
        entities: Arc<dyn EntityStore>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            plans,
            rate,
            tracker,
            entities,
            audit,
        }
    }

    /// Decide whether an operation may proceed. `creates` names the
    /// resource kind the operation would create, if any, for the static
    /// cap check.
    pub async fn check(
        &self,
        tenant_id: &str,
        plan_tier: &str,
        budget_kind: BudgetKind,
        creates: Option<ResourceKind>,
    ) -> Result<QuotaDecision, OperationError> {
        let limits = self.plans.resolve(plan_tier)?;

        if let Some(resource) = creates
            && let Limit::Max(limit) = limits.resource_limit(resource)
        {
            let current = self.entities.count_active(tenant_id, resource).await?;
            if current >= limit {
                return Ok(self.deny(
                    tenant_id,
                    plan_tier,
                    DenialReason::StaticLimitExceeded { resource, limit },
                ));
            }
        }

        if let RateDecision::Denied { retry_after } = self.rate.try_consume(tenant_id, limits) {
            return Ok(self.deny(
                tenant_id,
                plan_tier,
                DenialReason::RateLimited { retry_after },
            ));
        }

        if let crate::usage::BudgetDecision::Denied { current, limit } = self
            .tracker
            .try_reserve(tenant_id, budget_kind, limits)
            .await?
        {
            return Ok(self.deny(
                tenant_id,
                plan_tier,
                DenialReason::UsageBudgetExceeded { current, limit },
            ));
        }

        Ok(QuotaDecision::Allowed)
    }

    fn deny(&self, tenant_id: &str, plan_tier: &str, reason: DenialReason) -> QuotaDecision {
        self.audit.denial(tenant_id, plan_tier, &reason);
        QuotaDecision::Denied(reason)
    }
}
