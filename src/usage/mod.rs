//! Monthly usage budgets, derived from a durable ledger.

mod ledger;
mod tracker;

pub use ledger::{InMemoryUsageLedger, UsageLedger, UsageRecord};
pub use tracker::{BudgetDecision, UsageBudgetTracker};
