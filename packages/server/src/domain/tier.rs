//! User tiers and the limits they carry (§3 "User/tier", §4.6 tier caps,
//! §4.5 tier floor, §4.10 AI token cap).
//!
//! The core never decides who belongs to which tier; it only reads
//! `userId -> tier` and `tier -> limits` from the store (§6 configuration).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "user_tier", rename_all = "snake_case")]
pub enum Tier {
    Free,
    #[default]
    Pro,
    Enterprise,
}

/// Limits attached to a tier. Values match §4.5 and §4.6's authoritative
/// numbers; the AI token cap isn't pinned by the spec text, so it is a
/// documented Open Question decision (see DESIGN.md).
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub min_interval_ms: i64,
    pub monthly_run_cap: i64,
    pub monthly_ai_token_cap: i64,
    pub max_endpoints: i64,
}

impl Tier {
    pub fn limits(&self) -> TierLimits {
        match self {
            Tier::Free => TierLimits {
                min_interval_ms: 60_000,
                monthly_run_cap: 10_000,
                monthly_ai_token_cap: 50_000,
                max_endpoints: 10,
            },
            Tier::Pro => TierLimits {
                min_interval_ms: 10_000,
                monthly_run_cap: 100_000,
                monthly_ai_token_cap: 500_000,
                max_endpoints: 250,
            },
            Tier::Enterprise => TierLimits {
                min_interval_ms: 1_000,
                monthly_run_cap: 1_000_000,
                monthly_ai_token_cap: 5_000_000,
                max_endpoints: 10_000,
            },
        }
    }

    pub fn min_interval_ms(&self) -> i64 {
        self.limits().min_interval_ms
    }

    pub fn monthly_run_cap(&self) -> i64 {
        self.limits().monthly_run_cap
    }

    pub fn monthly_ai_token_cap(&self) -> i64 {
        self.limits().monthly_ai_token_cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_floors_match_spec() {
        assert_eq!(Tier::Free.min_interval_ms(), 60_000);
        assert_eq!(Tier::Pro.min_interval_ms(), 10_000);
        assert_eq!(Tier::Enterprise.min_interval_ms(), 1_000);
    }

    #[test]
    fn monthly_caps_match_spec() {
        assert_eq!(Tier::Free.monthly_run_cap(), 10_000);
        assert_eq!(Tier::Pro.monthly_run_cap(), 100_000);
        assert_eq!(Tier::Enterprise.monthly_run_cap(), 1_000_000);
    }
}
