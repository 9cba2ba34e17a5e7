//! # quotaguard
//!
//! Per-tenant quota enforcement and upstream resilience for multi-tenant
//! SaaS backends.
//!
//! This crate sits between tenant-initiated operations and (a) an
//! unreliable, rate-limited third-party collaboration API and (b) the
//! tenant's subscription-tier limits. It classifies and retries transient
//! upstream failures with exponential backoff, enforces per-tenant
//! request-rate windows, rolling monthly usage budgets derived from a
//! durable ledger, and static plan-tier resource caps, all under concurrent
//! multi-tenant load without blocking unrelated tenants.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quotaguard::{
//!     BudgetKind, Operation, ProtectedOperationRunner, TenantContext, UpstreamError,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), quotaguard::OperationError> {
//!     let runner = ProtectedOperationRunner::builder().build();
//!     let tenant = TenantContext::new("firm-a", "Starter");
//!     let op = Operation::new("relay-message", BudgetKind::AiMessage);
//!
//!     let response = runner
//!         .execute(&tenant, &op, || {
//!             Box::pin(async {
//!                 // Call into the collaboration API here.
//!                 Ok::<_, UpstreamError>("sent")
//!             })
//!         })
//!         .await?;
//!     println!("{}", response);
//!     Ok(())
//! }
//! ```
//!
//! Denials come back as typed errors ([`OperationError::RateLimited`],
//! [`OperationError::UsageBudgetExceeded`],
//! [`OperationError::StaticLimitExceeded`]) carrying the numbers a caller
//! needs for a helpful response; the upstream call is never invoked for a
//! denied request.

#![deny(rustdoc::broken_intra_doc_links)]

pub mod clock;
pub mod error;
pub mod gate;
pub mod limits;
pub mod rate;
pub mod resilience;
pub mod runner;
pub mod upstream;
pub mod usage;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, OperationError, StoreError};
pub use gate::{
    AuditLog, DenialReason, EntityStore, InMemoryEntityStore, QuotaDecision, QuotaGate,
    TracingAuditLog,
};
pub use limits::{
    BudgetKind, Limit, PlanLimitTable, PlanLimitTableBuilder, PlanLimits, ResourceKind,
};
pub use rate::{RateDecision, RateLimiter, WindowSnapshot};
pub use resilience::{
    ErrorKind, ExponentialBackoff, RetryExecutor, RetryPolicy, UpstreamFuture, classify,
};
pub use runner::{
    Operation, ProtectedOperationRunner, ProtectedOperationRunnerBuilder, TenantContext,
};
pub use upstream::{TransportKind, UpstreamError};
pub use usage::{
    BudgetDecision, InMemoryUsageLedger, UsageBudgetTracker, UsageLedger, UsageRecord,
};
