//! Quotes returned by vendor adapters and the criteria sent to them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::line_item::VehicleContext;
use crate::impl_domain_status_conversions;

/// Physical condition of an offered part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartCondition {
    New,
    Used,
    Refurbished,
    Remanufactured,
}

impl_domain_status_conversions!(PartCondition {
    New => "new",
    Used => "used",
    Refurbished => "refurbished",
    Remanufactured => "remanufactured",
});

/// Brand classification of an offered part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrandType {
    Oem,
    Aftermarket,
    Used,
    Remanufactured,
}

impl_domain_status_conversions!(BrandType {
    Oem => "oem",
    Aftermarket => "aftermarket",
    Used => "used",
    Remanufactured => "remanufactured",
});

/// What a vendor is asked to quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteCriteria {
    pub sourcing_request_id: Uuid,
    pub part_number: Option<String>,
    pub oem_part_number: Option<String>,
    pub description: String,
    pub category: Option<String>,
    pub quantity: u32,
    #[serde(default)]
    pub vehicle: VehicleContext,
    #[serde(default)]
    pub acceptable_conditions: Vec<PartCondition>,
    #[serde(default)]
    pub acceptable_brand_types: Vec<BrandType>,
}

impl QuoteCriteria {
    /// Cache key for a quote from `vendor_id` answering these criteria
    ///
    /// The request id is not part of the key; repair orders asking for the
    /// same part share cached quotes.
    pub fn cache_key(&self, vendor_id: &str) -> String {
        let part = self
            .part_number
            .as_deref()
            .or(self.oem_part_number.as_deref())
            .unwrap_or(self.description.as_str())
            .trim()
            .to_ascii_uppercase();
        format!("{vendor_id}|{part}|{}", self.quantity)
    }
}

/// Quote as returned by an adapter, before it is attributed to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawQuote {
    /// Unit price
    pub price: f64,
    pub lead_time_days: u32,
    pub condition: PartCondition,
    #[serde(default)]
    pub brand_type: Option<BrandType>,
    #[serde(default)]
    pub quantity_available: Option<u32>,
    #[serde(default)]
    pub vendor_confirmation_id: Option<String>,
    #[serde(default)]
    pub vendor_part_number: Option<String>,
}

impl RawQuote {
    /// Reject quotes that cannot be evaluated
    pub fn validate(&self) -> Result<(), String> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(format!("price must be a positive amount, got {}", self.price));
        }
        if self.quantity_available == Some(0) {
            return Err("quote offers zero available quantity".to_string());
        }
        Ok(())
    }
}

/// A vendor's offer attributed to one sourcing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorQuote {
    pub id: Uuid,
    pub sourcing_request_id: Uuid,
    pub vendor_id: String,
    pub vendor_name: String,
    pub price: f64,
    pub lead_time_days: u32,
    pub condition: PartCondition,
    pub brand_type: Option<BrandType>,
    pub quantity_available: Option<u32>,
    pub vendor_confirmation_id: Option<String>,
    pub vendor_part_number: Option<String>,
    pub response_latency_ms: u64,
    pub received_at: DateTime<Utc>,
    /// Served from the quote cache instead of a live vendor call
    #[serde(default)]
    pub from_cache: bool,
}

impl VendorQuote {
    pub fn from_raw(
        sourcing_request_id: Uuid,
        vendor_id: &str,
        vendor_name: &str,
        raw: RawQuote,
        response_latency_ms: u64,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            sourcing_request_id,
            vendor_id: vendor_id.to_string(),
            vendor_name: vendor_name.to_string(),
            price: raw.price,
            lead_time_days: raw.lead_time_days,
            condition: raw.condition,
            brand_type: raw.brand_type,
            quantity_available: raw.quantity_available,
            vendor_confirmation_id: raw.vendor_confirmation_id,
            vendor_part_number: raw.vendor_part_number,
            response_latency_ms,
            received_at,
            from_cache: false,
        }
    }

    /// Rebuild the adapter view of this quote, used when caching
    pub fn to_raw(&self) -> RawQuote {
        RawQuote {
            price: self.price,
            lead_time_days: self.lead_time_days,
            condition: self.condition,
            brand_type: self.brand_type,
            quantity_available: self.quantity_available,
            vendor_confirmation_id: self.vendor_confirmation_id.clone(),
            vendor_part_number: self.vendor_part_number.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(price: f64) -> RawQuote {
        RawQuote {
            price,
            lead_time_days: 2,
            condition: PartCondition::New,
            brand_type: Some(BrandType::Oem),
            quantity_available: Some(4),
            vendor_confirmation_id: Some("Q-1".into()),
            vendor_part_number: None,
        }
    }

    #[test]
    fn non_positive_or_nan_price_is_invalid() {
        assert!(raw(12.5).validate().is_ok());
        assert!(raw(0.0).validate().is_err());
        assert!(raw(-3.0).validate().is_err());
        assert!(raw(f64::NAN).validate().is_err());
    }

    #[test]
    fn cache_key_prefers_part_number_and_ignores_request() {
        let criteria = |request| QuoteCriteria {
            sourcing_request_id: request,
            part_number: Some(" 12345-abc ".into()),
            oem_part_number: Some("OEM-9".into()),
            description: "Bumper cover".into(),
            category: None,
            quantity: 2,
            vehicle: VehicleContext::default(),
            acceptable_conditions: vec![],
            acceptable_brand_types: vec![],
        };
        let a = criteria(Uuid::now_v7()).cache_key("napa");
        let b = criteria(Uuid::now_v7()).cache_key("napa");
        assert_eq!(a, "napa|12345-ABC|2");
        assert_eq!(a, b);
    }

    #[test]
    fn raw_quote_deserializes_with_optional_fields_missing() {
        let quote: RawQuote =
            serde_json::from_str(r#"{"price": 99.5, "lead_time_days": 1, "condition": "used"}"#)
                .unwrap();
        assert_eq!(quote.condition, PartCondition::Used);
        assert!(quote.brand_type.is_none());
    }
}
