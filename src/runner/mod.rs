//! Single entry point for business code: quota pre-check, retry-wrapped
//! upstream call, usage commit on success.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::OperationError;
use crate::gate::{AuditLog, EntityStore, InMemoryEntityStore, QuotaDecision, QuotaGate, TracingAuditLog};
use crate::limits::{BudgetKind, PlanLimitTable, ResourceKind};
use crate::rate::RateLimiter;
use crate::resilience::{RetryExecutor, RetryPolicy, UpstreamFuture};
use crate::usage::{InMemoryUsageLedger, UsageBudgetTracker, UsageLedger};

/// Tenant identity plus subscription tier, resolved by the caller before
/// this layer is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
    pub plan_tier: String,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, plan_tier: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            plan_tier: plan_tier.into(),
        }
    }
}

/// Describes one protected operation: its name (for logs), the budget it
/// draws from, the amount committed on success, and optionally the
/// resource kind it creates.
#[derive(Debug, Clone)]
pub struct Operation {
    name: String,
    budget_kind: BudgetKind,
    cost: u64,
    creates: Option<ResourceKind>,
}

impl Operation {
    pub fn new(name: impl Into<String>, budget_kind: BudgetKind) -> Self {
        Self {
            name: name.into(),
            budget_kind,
            cost: 1,
            creates: None,
        }
    }

    /// Amount charged against the budget when the call succeeds.
    pub fn cost(mut self, cost: u64) -> Self {
        self.cost = cost;
        self
    }

    /// Mark the operation as creating a capped resource.
    pub fn creates(mut self, resource: ResourceKind) -> Self {
        self.creates = Some(resource);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn budget_kind(&self) -> BudgetKind {
        self.budget_kind
    }
}

/// Façade wrapping an upstream call with quota enforcement and retries.
///
/// A denied request never reaches the upstream call, and usage is
/// committed only after the call succeeds, never before and never on
/// failure.
#[derive(Clone)]
pub struct ProtectedOperationRunner {
    gate: QuotaGate,
    retry: RetryExecutor,
    tracker: UsageBudgetTracker,
}

impl ProtectedOperationRunner {
    pub fn builder() -> ProtectedOperationRunnerBuilder {
        ProtectedOperationRunnerBuilder::default()
    }

    /// Run `call` for `tenant` under the quota policy described by `op`.
    ///
    /// A [`OperationError::Store`] error can surface after the upstream
    /// call already succeeded, when the usage commit itself fails. The
    /// upstream side effect has taken place in that case, so callers must
    /// not blindly retry; the failure is logged at error level for
    /// reconciliation.
    pub async fn execute<T, F>(
        &self,
        tenant: &TenantContext,
        op: &Operation,
        call: F,
    ) -> Result<T, OperationError>
    where
        F: FnMut() -> UpstreamFuture<T>,
    {
        let decision = self
            .gate
            .check(
                &tenant.tenant_id,
                &tenant.plan_tier,
                op.budget_kind,
                op.creates,
            )
            .await?;

        if let QuotaDecision::Denied(reason) = decision {
            return Err(reason.into_operation_error(&tenant.plan_tier, op.budget_kind));
        }

        let value = self.retry.run(&op.name, call).await?;

        if let Err(err) = self
            .tracker
            .commit(&tenant.tenant_id, op.budget_kind, op.cost)
            .await
        {
            tracing::error!(
                operation = op.name.as_str(),
                tenant_id = tenant.tenant_id.as_str(),
                error = %err,
                "usage commit failed after successful upstream call"
            );
            return Err(err.into());
        }

        Ok(value)
    }

    pub fn gate(&self) -> &QuotaGate {
        &self.gate
    }

    pub fn tracker(&self) -> &UsageBudgetTracker {
        &self.tracker
    }
}

/// Builder assembling the runner from its collaborators. Every collaborator
/// has an in-process default, so `builder().build()` yields a working
/// single-node setup.
pub struct ProtectedOperationRunnerBuilder {
    plans: PlanLimitTable,
    ledger: Option<Arc<dyn UsageLedger>>,
    entities: Option<Arc<dyn EntityStore>>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    audit: Arc<dyn AuditLog>,
}

impl Default for ProtectedOperationRunnerBuilder {
    fn default() -> Self {
        Self {
            plans: PlanLimitTable::default(),
            ledger: None,
            entities: None,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
            audit: Arc::new(TracingAuditLog),
        }
    }
}

impl ProtectedOperationRunnerBuilder {
    pub fn plans(mut self, plans: PlanLimitTable) -> Self {
        self.plans = plans;
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn UsageLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn entities(mut self, entities: Arc<dyn EntityStore>) -> Self {
        self.entities = Some(entities);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn build(self) -> ProtectedOperationRunner {
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(InMemoryUsageLedger::new()));
        let entities = self
            .entities
            .unwrap_or_else(|| Arc::new(InMemoryEntityStore::new()));
        let tracker = UsageBudgetTracker::new(ledger, self.clock.clone());
        let gate = QuotaGate::new(
            Arc::new(self.plans),
            RateLimiter::new(self.clock),
            tracker.clone(),
            entities,
            self.audit,
        );
        ProtectedOperationRunner {
            gate,
            retry: RetryExecutor::new(self.retry),
            tracker,
        }
    }
}
