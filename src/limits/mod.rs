//! Plan-tier limit definitions.
//!
//! Limits are static configuration: a [`PlanLimitTable`] is built once at
//! startup (from the built-in defaults, a builder, or a JSON document) and
//! never mutated afterwards. Tier changes create a new table, never an
//! in-place edit.

use std::collections::HashMap;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// A named category of consumable usage, tracked independently per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetKind {
    /// AI assistant messages relayed through the collaboration platform.
    AiMessage,
    /// Plain calls into the collaboration API.
    ApiCall,
}

impl BudgetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetKind::AiMessage => "ai-message",
            BudgetKind::ApiCall => "api-call",
        }
    }
}

impl std::fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A countable resource capped per plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Externally-shared client space.
    ClientSpace,
    /// Document library within a client space.
    DocumentLibrary,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ClientSpace => "client-space",
            ResourceKind::DocumentLibrary => "document-library",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ceiling that is either a positive count or the unlimited sentinel.
///
/// Serializes as a JSON number, or the string `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    Max(u64),
}

impl Limit {
    /// Whether one more unit is allowed given `current` already consumed.
    pub fn allows(&self, current: u64) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::Max(max) => current < *max,
        }
    }

    pub fn value(&self) -> Option<u64> {
        match self {
            Limit::Unlimited => None,
            Limit::Max(max) => Some(*max),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Limit::Unlimited => serializer.serialize_str("unlimited"),
            Limit::Max(max) => serializer.serialize_u64(*max),
        }
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LimitVisitor;

        impl Visitor<'_> for LimitVisitor {
            type Value = Limit;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a positive integer or the string \"unlimited\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Limit, E> {
                Ok(Limit::Max(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Limit, E> {
                u64::try_from(v)
                    .map(Limit::Max)
                    .map_err(|_| E::custom("limit must be non-negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Limit, E> {
                if v.eq_ignore_ascii_case("unlimited") {
                    Ok(Limit::Unlimited)
                } else {
                    Err(E::custom(format!("unrecognized limit '{v}'")))
                }
            }
        }

        deserializer.deserialize_any(LimitVisitor)
    }
}

/// Immutable limits for one plan tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_requests_per_window: Limit,
    pub window_length: Duration,
    /// Monthly usage ceilings per budget kind. Kinds without an entry are
    /// unlimited.
    #[serde(default)]
    pub max_usage_per_month: HashMap<BudgetKind, Limit>,
    /// Static caps per resource kind. Kinds without an entry are unlimited.
    #[serde(default)]
    pub static_resource_limits: HashMap<ResourceKind, Limit>,
}

impl PlanLimits {
    pub fn usage_limit(&self, kind: BudgetKind) -> Limit {
        self.max_usage_per_month
            .get(&kind)
            .copied()
            .unwrap_or(Limit::Unlimited)
    }

    pub fn resource_limit(&self, kind: ResourceKind) -> Limit {
        self.static_resource_limits
            .get(&kind)
            .copied()
            .unwrap_or(Limit::Unlimited)
    }
}

/// Lookup table from plan tier name to its limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanLimitTable {
    tiers: HashMap<String, PlanLimits>,
}

impl PlanLimitTable {
    pub fn builder() -> PlanLimitTableBuilder {
        PlanLimitTableBuilder::new()
    }

    /// Load a table from a JSON object keyed by tier name.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Resolve the limits for a tier. An unknown tier is a configuration
    /// error; [`PlanLimitTable::validate_tiers`] at startup rules it out
    /// before any request-time call.
    pub fn resolve(&self, plan_tier: &str) -> Result<&PlanLimits, ConfigError> {
        self.tiers
            .get(plan_tier)
            .ok_or_else(|| ConfigError::UnknownTier(plan_tier.to_string()))
    }

    /// Verify every tier referenced by a live subscription has a limits
    /// entry. Call during startup; a failure here is fatal.
    pub fn validate_tiers<'a>(
        &self,
        referenced: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        for tier in referenced {
            if !self.tiers.contains_key(tier) {
                return Err(ConfigError::UnknownTier(tier.to_string()));
            }
        }
        Ok(())
    }

    pub fn tier_names(&self) -> impl Iterator<Item = &str> {
        self.tiers.keys().map(String::as_str)
    }
}

impl Default for PlanLimitTable {
    fn default() -> Self {
        PlanLimitTableBuilder::new().with_defaults().build()
    }
}

#[derive(Debug, Default)]
pub struct PlanLimitTableBuilder {
    tiers: HashMap<String, PlanLimits>,
}

impl PlanLimitTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table with the built-in Starter / Professional / Enterprise
    /// tiers.
    pub fn with_defaults(mut self) -> Self {
        self.tiers.insert(
            "Starter".into(),
            PlanLimits {
                max_requests_per_window: Limit::Max(100),
                window_length: Duration::from_secs(3600),
                max_usage_per_month: HashMap::from([
                    (BudgetKind::AiMessage, Limit::Max(20)),
                    (BudgetKind::ApiCall, Limit::Max(2_000)),
                ]),
                static_resource_limits: HashMap::from([
                    (ResourceKind::ClientSpace, Limit::Max(3)),
                    (ResourceKind::DocumentLibrary, Limit::Max(10)),
                ]),
            },
        );
        self.tiers.insert(
            "Professional".into(),
            PlanLimits {
                max_requests_per_window: Limit::Max(1_000),
                window_length: Duration::from_secs(3600),
                max_usage_per_month: HashMap::from([
                    (BudgetKind::AiMessage, Limit::Max(500)),
                    (BudgetKind::ApiCall, Limit::Max(50_000)),
                ]),
                static_resource_limits: HashMap::from([
                    (ResourceKind::ClientSpace, Limit::Max(25)),
                    (ResourceKind::DocumentLibrary, Limit::Max(200)),
                ]),
            },
        );
        self.tiers.insert(
            "Enterprise".into(),
            PlanLimits {
                max_requests_per_window: Limit::Unlimited,
                window_length: Duration::from_secs(3600),
                max_usage_per_month: HashMap::new(),
                static_resource_limits: HashMap::new(),
            },
        );
        self
    }

    pub fn tier(mut self, name: impl Into<String>, limits: PlanLimits) -> Self {
        self.tiers.insert(name.into(), limits);
        self
    }

    pub fn build(self) -> PlanLimitTable {
        PlanLimitTable { tiers: self.tiers }
    }
}
