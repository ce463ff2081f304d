//! Normalized estimate line items handed to the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::quote::{BrandType, PartCondition};
use crate::{PartSourceError, Result};

/// Vehicle the part is for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleContext {
    pub vin: Option<String>,
    pub year: Option<u16>,
    pub make: Option<String>,
    pub model: Option<String>,
}

/// Business constraints the winning quote has to satisfy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcingConstraints {
    pub price_ceiling: Option<f64>,
    /// Informational; quotes above target are still eligible
    pub target_price: Option<f64>,
    pub max_lead_time_days: Option<u32>,
    pub required_by: Option<DateTime<Utc>>,
    /// Empty accepts every condition
    pub acceptable_conditions: Vec<PartCondition>,
    /// Empty accepts every brand type
    pub acceptable_brand_types: Vec<BrandType>,
}

impl SourcingConstraints {
    /// Lead-time ceiling in days, tightened by the required-by date
    pub fn effective_lead_time_ceiling(&self, now: DateTime<Utc>) -> Option<u32> {
        let by_date = self.required_by.map(|required_by| {
            let days = (required_by - now).num_days();
            u32::try_from(days.max(0)).unwrap_or(u32::MAX)
        });
        match (self.max_lead_time_days, by_date) {
            (Some(max), Some(by_date)) => Some(max.min(by_date)),
            (max, by_date) => max.or(by_date),
        }
    }
}

/// Line item as produced by the estimate parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub repair_order_id: String,
    /// Human-facing repair-order number, used in PO numbers
    pub repair_order_number: String,
    pub line_id: String,
    #[serde(default)]
    pub part_number: Option<String>,
    #[serde(default)]
    pub oem_part_number: Option<String>,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    pub quantity: u32,
    #[serde(default)]
    pub vehicle_context: VehicleContext,
    #[serde(default)]
    pub constraints: SourcingConstraints,
}

impl LineItem {
    pub fn validate(&self) -> Result<()> {
        if self.repair_order_id.trim().is_empty() || self.line_id.trim().is_empty() {
            return Err(PartSourceError::InvalidInput(
                "line item must reference a repair order and line".into(),
            ));
        }
        if self.repair_order_number.chars().all(|c| !c.is_ascii_alphanumeric()) {
            return Err(PartSourceError::InvalidInput(
                "repair order number must contain letters or digits".into(),
            ));
        }
        let has_part = self.part_number.as_deref().is_some_and(|p| !p.trim().is_empty())
            || self.oem_part_number.as_deref().is_some_and(|p| !p.trim().is_empty());
        if !has_part && self.description.trim().is_empty() {
            return Err(PartSourceError::InvalidInput(
                "line item needs a part number or a description".into(),
            ));
        }
        if self.quantity == 0 {
            return Err(PartSourceError::InvalidInput("quantity must be at least 1".into()));
        }
        if let Some(ceiling) = self.constraints.price_ceiling {
            if !ceiling.is_finite() || ceiling <= 0.0 {
                return Err(PartSourceError::InvalidInput(
                    "price ceiling must be a positive amount".into(),
                ));
            }
        }
        Ok(())
    }

    /// Stable identity of the sourcing request this line produces
    pub fn idempotency_key(&self) -> String {
        let part = self
            .part_number
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .or(self.oem_part_number.as_deref())
            .unwrap_or(self.description.as_str());
        format!(
            "{}:{}:{}",
            self.repair_order_id.trim(),
            self.line_id.trim(),
            part.trim().to_ascii_uppercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn item() -> LineItem {
        LineItem {
            repair_order_id: "ro-1".into(),
            repair_order_number: "RO-1042".into(),
            line_id: "3".into(),
            part_number: Some("52119-0e903".into()),
            oem_part_number: None,
            description: "Front bumper cover".into(),
            category: Some("body".into()),
            quantity: 1,
            vehicle_context: VehicleContext::default(),
            constraints: SourcingConstraints::default(),
        }
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut line = item();
        line.quantity = 0;
        assert!(matches!(line.validate(), Err(PartSourceError::InvalidInput(_))));
    }

    #[test]
    fn description_alone_is_enough() {
        let mut line = item();
        line.part_number = None;
        assert!(line.validate().is_ok());
        line.description = "  ".into();
        assert!(line.validate().is_err());
    }

    #[test]
    fn idempotency_key_normalizes_part_number() {
        assert_eq!(item().idempotency_key(), "ro-1:3:52119-0E903");
    }

    #[test]
    fn required_by_tightens_lead_time_ceiling() {
        let now = Utc::now();
        let constraints = SourcingConstraints {
            max_lead_time_days: Some(5),
            required_by: Some(now + Duration::days(2) + Duration::hours(1)),
            ..SourcingConstraints::default()
        };
        assert_eq!(constraints.effective_lead_time_ceiling(now), Some(2));

        let loose = SourcingConstraints {
            max_lead_time_days: Some(3),
            required_by: Some(now + Duration::days(10)),
            ..SourcingConstraints::default()
        };
        assert_eq!(loose.effective_lead_time_ceiling(now), Some(3));
        assert_eq!(SourcingConstraints::default().effective_lead_time_ceiling(now), None);
    }
}
