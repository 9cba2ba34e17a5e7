//! Error types for quota-gated operations.
//!
//! Denials (rate limit, usage budget, static resource limit) are expected
//! policy outcomes and carry enough structure for a caller to render a
//! helpful message; upstream failures carry the last classified error, the
//! attempt count, and a correlation id for support diagnosis.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::limits::{BudgetKind, ResourceKind};
use crate::resilience::ErrorKind;
use crate::upstream::UpstreamError;

/// Result of a protected operation.
///
/// All errors include actionable context to help diagnose and resolve issues.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OperationError {
    /// Tenant exhausted its request-rate window.
    #[error("rate limit exceeded, retry in {:.0}s", retry_after.as_secs_f64())]
    RateLimited { retry_after: Duration },

    /// Tenant exhausted its monthly usage budget for one budget kind.
    #[error("monthly limit of {limit} {budget_kind} exceeded for {plan_tier} plan ({current} used)")]
    UsageBudgetExceeded {
        current: u64,
        limit: u64,
        plan_tier: String,
        budget_kind: BudgetKind,
    },

    /// Tenant is at its plan's cap for a countable resource.
    #[error("{resource} limit of {limit} reached for {plan_tier} plan")]
    StaticLimitExceeded {
        resource: ResourceKind,
        limit: u64,
        plan_tier: String,
    },

    /// The upstream call failed (after retries, for transient errors).
    #[error("operation '{operation}' failed after {attempts} attempt(s) [{correlation_id}]: {source}")]
    UpstreamFailed {
        operation: String,
        kind: ErrorKind,
        attempts: u32,
        correlation_id: Uuid,
        #[source]
        source: UpstreamError,
    },

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A backing store (ledger, entity counts) failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl OperationError {
    /// True for policy denials, which callers map to a "limit reached"
    /// response rather than a server error.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            OperationError::RateLimited { .. }
                | OperationError::UsageBudgetExceeded { .. }
                | OperationError::StaticLimitExceeded { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            OperationError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Message safe to show to an end user.
    ///
    /// Denials surface limits and the plan tier (enabling an upgrade
    /// prompt); upstream failures surface only a generic message plus the
    /// correlation id, never raw upstream error codes.
    pub fn user_message(&self) -> String {
        match self {
            OperationError::RateLimited { retry_after } => format!(
                "Too many requests. Please retry in {} seconds.",
                retry_after.as_secs().max(1)
            ),
            OperationError::UsageBudgetExceeded {
                current,
                limit,
                plan_tier,
                budget_kind,
            } => format!(
                "Monthly limit of {limit} {budget_kind} exceeded for {plan_tier} plan \
                 ({current} used). Upgrade your plan to continue."
            ),
            OperationError::StaticLimitExceeded {
                resource,
                limit,
                plan_tier,
            } => format!(
                "Your {plan_tier} plan allows up to {limit} {resource}. \
                 Upgrade your plan to add more."
            ),
            OperationError::UpstreamFailed { correlation_id, .. } => format!(
                "The operation could not be completed. Please try again later \
                 (reference {correlation_id})."
            ),
            _ => "An internal error occurred. Please try again later.".to_string(),
        }
    }
}

/// Plan-limit configuration problems. Fatal at startup validation, never
/// expected at request time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no limits configured for plan tier '{0}'")]
    UnknownTier(String),

    #[error("invalid plan limits: {0}")]
    Invalid(String),
}

/// Failure in a backing store consumed by this layer.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
