//! Append-only usage ledger.
//!
//! The ledger is the source of truth for monthly budgets: the running total
//! is always derived by summing records since the month boundary, never
//! kept as a mutable counter. That keeps the check crash-safe and leaves
//! historical records available for audit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::limits::BudgetKind;

/// One committed unit of usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub tenant_id: String,
    pub budget_kind: BudgetKind,
    pub amount: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Durable store of usage records.
///
/// Implementations must support concurrent appends from different tenants
/// without coordination; sums only need to reflect commits that completed
/// before the read started.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn append(&self, record: UsageRecord) -> Result<(), StoreError>;

    /// Total committed amount for a tenant and budget kind with
    /// `recorded_at >= since`.
    async fn sum_since(
        &self,
        tenant_id: &str,
        budget_kind: BudgetKind,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// In-process ledger, keyed by tenant so appends for different tenants
/// never touch the same entry.
#[derive(Debug, Default)]
pub struct InMemoryUsageLedger {
    records: DashMap<String, Vec<UsageRecord>>,
}

impl InMemoryUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self, tenant_id: &str) -> usize {
        self.records.get(tenant_id).map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl UsageLedger for InMemoryUsageLedger {
    async fn append(&self, record: UsageRecord) -> Result<(), StoreError> {
        self.records
            .entry(record.tenant_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn sum_since(
        &self,
        tenant_id: &str,
        budget_kind: BudgetKind,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let total = self
            .records
            .get(tenant_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.budget_kind == budget_kind && r.recorded_at >= since)
                    .map(|r| r.amount)
                    .sum()
            })
            .unwrap_or(0);
        Ok(total)
    }
}
