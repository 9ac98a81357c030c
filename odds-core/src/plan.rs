//! Subscription plan tiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription tier of the calling user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    /// No paid subscription (also used for unset/unknown tiers)
    #[default]
    Free,
    /// Entry-level paid tier
    Basic,
    /// Full access tier
    Premium,
}

/// Entitlement level derived from a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanAccess {
    Restricted,
    Full,
}

impl SubscriptionPlan {
    pub fn access(&self) -> PlanAccess {
        match self {
            SubscriptionPlan::Free | SubscriptionPlan::Basic => PlanAccess::Restricted,
            SubscriptionPlan::Premium => PlanAccess::Full,
        }
    }

    pub fn is_full(&self) -> bool {
        self.access() == PlanAccess::Full
    }

    /// Resolve a plan from an upstream-provided value.
    ///
    /// Missing or unrecognized values resolve to `Free`.
    pub fn from_header(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Free => "free",
            SubscriptionPlan::Basic => "basic",
            SubscriptionPlan::Premium => "premium",
        }
    }
}

impl fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SubscriptionPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(SubscriptionPlan::Free),
            "basic" | "starter" => Ok(SubscriptionPlan::Basic),
            "premium" | "pro" | "full" => Ok(SubscriptionPlan::Premium),
            _ => Err(format!("Unknown subscription plan: {}", s)),
        }
    }
}
