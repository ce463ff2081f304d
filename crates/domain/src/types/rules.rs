//! Typed business rules applied to quotes
//!
//! Rules are plain data; the interpreter that applies them lives in
//! `partsource-core`'s quote evaluator.

use serde::{Deserialize, Serialize};

use super::quote::PartCondition;
use crate::impl_domain_status_conversions;

/// One filtering rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QuoteRule {
    /// Reject quotes whose unit price exceeds `max_price`
    PriceCeiling { max_price: f64 },
    /// Reject quotes that arrive later than `max_days`
    LeadTimeCeiling { max_days: u32 },
    /// Only these vendor ids may win
    VendorAllowList { vendor_ids: Vec<String> },
    /// These vendor ids may never win
    VendorDenyList { vendor_ids: Vec<String> },
    RequireConditions { conditions: Vec<PartCondition> },
    /// Reject quotes that report fewer units in stock than requested
    MinimumQuantityAvailable,
}

impl QuoteRule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PriceCeiling { .. } => "price_ceiling",
            Self::LeadTimeCeiling { .. } => "lead_time_ceiling",
            Self::VendorAllowList { .. } => "vendor_allow_list",
            Self::VendorDenyList { .. } => "vendor_deny_list",
            Self::RequireConditions { .. } => "require_conditions",
            Self::MinimumQuantityAvailable => "minimum_quantity_available",
        }
    }
}

/// Primary ranking key; the other keys break ties in the fixed order
/// price, lead time, vendor preference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingKey {
    #[default]
    LowestPrice,
    ShortestLeadTime,
    PreferredVendor,
}

impl_domain_status_conversions!(RankingKey {
    LowestPrice => "lowest_price",
    ShortestLeadTime => "shortest_lead_time",
    PreferredVendor => "preferred_vendor",
});

/// Shop-level rules applied on top of each request's own constraints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationPolicy {
    pub rules: Vec<QuoteRule>,
    pub ranking: RankingKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_deserialize_from_tagged_json() {
        let policy: EvaluationPolicy = serde_json::from_str(
            r#"{
                "rules": [
                    {"op": "price_ceiling", "max_price": 300.0},
                    {"op": "vendor_deny_list", "vendor_ids": ["junkyard"]},
                    {"op": "minimum_quantity_available"}
                ],
                "ranking": "shortest_lead_time"
            }"#,
        )
        .unwrap();

        assert_eq!(policy.ranking, RankingKey::ShortestLeadTime);
        assert_eq!(policy.rules[0], QuoteRule::PriceCeiling { max_price: 300.0 });
        assert_eq!(policy.rules[1].name(), "vendor_deny_list");
        assert_eq!(policy.rules[2], QuoteRule::MinimumQuantityAvailable);
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let result: Result<QuoteRule, _> = serde_json::from_str(r#"{"op": "eval", "code": "1"}"#);
        assert!(result.is_err());
    }
}
