//! Quote evaluation
//!
//! A pure decision over the quotes collected for one request. Filtering is
//! an explicit interpreter over [`QuoteRule`]s: the request's own
//! constraints are translated into rules and applied together with the
//! shop-wide policy. Survivors are ranked and the winner is either approved
//! automatically or left for a human.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use partsource_domain::{
    BrandType, EvaluationPolicy, QuoteRule, RankingKey, SourcingRequest, VendorQuote,
};
use serde::Serialize;
use uuid::Uuid;

/// A quote that failed one or more rules
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedQuote {
    pub quote_id: Uuid,
    pub vendor_id: String,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Winner may be approved without a human
    AutoApprove { quote_id: Uuid },
    /// Winner recommended, human confirmation required
    ManualReview { quote_id: Uuid, reason: String },
    /// Nothing survived filtering; never defaulted to a vendor
    NoViableQuote { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// Surviving quotes, best first
    pub ranked: Vec<VendorQuote>,
    pub rejected: Vec<RejectedQuote>,
    pub decision: Decision,
}

impl Evaluation {
    pub fn winner(&self) -> Option<&VendorQuote> {
        self.ranked.first()
    }

    pub fn is_auto_approved(&self) -> bool {
        matches!(self.decision, Decision::AutoApprove { .. })
    }
}

/// Applies shop policy and request constraints to a quote set
#[derive(Debug, Clone, Default)]
pub struct QuoteEvaluator {
    policy: EvaluationPolicy,
    /// Vendor id to preference rank; lower is preferred
    preferences: HashMap<String, u32>,
}

impl QuoteEvaluator {
    pub fn new(policy: EvaluationPolicy, preferences: HashMap<String, u32>) -> Self {
        Self { policy, preferences }
    }

    pub fn policy(&self) -> &EvaluationPolicy {
        &self.policy
    }

    pub fn set_preferences(&mut self, preferences: HashMap<String, u32>) {
        self.preferences = preferences;
    }

    pub fn evaluate(
        &self,
        request: &SourcingRequest,
        quotes: &[VendorQuote],
        now: DateTime<Utc>,
    ) -> Evaluation {
        let rules = self.effective_rules(request, now);
        let brand_filter = &request.constraints.acceptable_brand_types;

        let mut survivors = Vec::with_capacity(quotes.len());
        let mut rejected = Vec::new();
        for quote in quotes {
            let mut reasons: Vec<String> =
                rules.iter().filter_map(|rule| violation(rule, quote, request)).collect();
            if let Some(reason) = brand_violation(brand_filter, quote.brand_type) {
                reasons.push(reason);
            }
            if reasons.is_empty() {
                survivors.push(quote.clone());
            } else {
                rejected.push(RejectedQuote {
                    quote_id: quote.id,
                    vendor_id: quote.vendor_id.clone(),
                    reasons,
                });
            }
        }

        survivors.sort_by(|a, b| self.compare(a, b));
        let decision = decide(request, survivors.first(), quotes.len(), &rejected);
        Evaluation { ranked: survivors, rejected, decision }
    }

    /// Request constraints expressed as rules, followed by the shop policy
    fn effective_rules(&self, request: &SourcingRequest, now: DateTime<Utc>) -> Vec<QuoteRule> {
        let constraints = &request.constraints;
        let mut rules = Vec::with_capacity(self.policy.rules.len() + 3);
        if let Some(max_price) = constraints.price_ceiling {
            rules.push(QuoteRule::PriceCeiling { max_price });
        }
        if let Some(max_days) = constraints.effective_lead_time_ceiling(now) {
            rules.push(QuoteRule::LeadTimeCeiling { max_days });
        }
        if !constraints.acceptable_conditions.is_empty() {
            rules.push(QuoteRule::RequireConditions {
                conditions: constraints.acceptable_conditions.clone(),
            });
        }
        rules.extend(self.policy.rules.iter().cloned());
        rules
    }

    fn preference(&self, vendor_id: &str) -> u32 {
        self.preferences.get(vendor_id).copied().unwrap_or(u32::MAX)
    }

    fn compare(&self, a: &VendorQuote, b: &VendorQuote) -> Ordering {
        let price = || a.price.total_cmp(&b.price);
        let lead = || a.lead_time_days.cmp(&b.lead_time_days);
        let preference = || self.preference(&a.vendor_id).cmp(&self.preference(&b.vendor_id));

        let ordered = match self.policy.ranking {
            RankingKey::LowestPrice => price().then_with(lead).then_with(preference),
            RankingKey::ShortestLeadTime => lead().then_with(price).then_with(preference),
            RankingKey::PreferredVendor => preference().then_with(price).then_with(lead),
        };
        ordered.then_with(|| a.vendor_id.cmp(&b.vendor_id))
    }
}

fn violation(rule: &QuoteRule, quote: &VendorQuote, request: &SourcingRequest) -> Option<String> {
    match rule {
        QuoteRule::PriceCeiling { max_price } if quote.price > *max_price => Some(format!(
            "price {:.2} exceeds ceiling {:.2}",
            quote.price, max_price
        )),
        QuoteRule::LeadTimeCeiling { max_days } if quote.lead_time_days > *max_days => Some(
            format!("lead time {}d exceeds ceiling {}d", quote.lead_time_days, max_days),
        ),
        QuoteRule::VendorAllowList { vendor_ids }
            if !vendor_ids.iter().any(|id| id == &quote.vendor_id) =>
        {
            Some(format!("vendor {} is not on the allow list", quote.vendor_id))
        }
        QuoteRule::VendorDenyList { vendor_ids }
            if vendor_ids.iter().any(|id| id == &quote.vendor_id) =>
        {
            Some(format!("vendor {} is on the deny list", quote.vendor_id))
        }
        QuoteRule::RequireConditions { conditions } if !conditions.contains(&quote.condition) => {
            Some(format!("condition {} is not acceptable", quote.condition))
        }
        QuoteRule::MinimumQuantityAvailable => match quote.quantity_available {
            Some(available) if available < request.quantity => Some(format!(
                "only {available} available, {} requested",
                request.quantity
            )),
            _ => None,
        },
        _ => None,
    }
}

fn brand_violation(accepted: &[BrandType], brand: Option<BrandType>) -> Option<String> {
    if accepted.is_empty() {
        return None;
    }
    match brand {
        Some(brand) if accepted.contains(&brand) => None,
        Some(brand) => Some(format!("brand type {brand} is not acceptable")),
        None => Some("brand type not reported".to_string()),
    }
}

fn decide(
    request: &SourcingRequest,
    winner: Option<&VendorQuote>,
    received: usize,
    rejected: &[RejectedQuote],
) -> Decision {
    let Some(winner) = winner else {
        let reason = if received == 0 {
            "no quotes received".to_string()
        } else {
            let details: Vec<String> = rejected
                .iter()
                .map(|r| format!("{}: {}", r.vendor_id, r.reasons.join("; ")))
                .collect();
            format!("all {received} quotes rejected ({})", details.join(", "))
        };
        return Decision::NoViableQuote { reason };
    };

    if !request.automation_type.permits_auto_approval() {
        return Decision::ManualReview {
            quote_id: winner.id,
            reason: format!("{} requests require confirmation", request.automation_type),
        };
    }
    if winner.price < request.approval_threshold {
        Decision::AutoApprove { quote_id: winner.id }
    } else {
        Decision::ManualReview {
            quote_id: winner.id,
            reason: format!(
                "price {:.2} is not below approval threshold {:.2}",
                winner.price, request.approval_threshold
            ),
        }
    }
}
