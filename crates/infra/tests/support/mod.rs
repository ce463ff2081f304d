//! Shared helpers for `partsource-infra` integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use partsource_domain::{
    ApiType, LineItem, PartCondition, RawQuote, SourcingConfig, SourcingConstraints,
    SourcingRequest, VehicleContext, VendorConfig, VendorQuote,
};
use partsource_infra::database::DbManager;
use tempfile::TempDir;

/// Temporary database that keeps its directory alive for the test.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        Self::with_pool_size(4)
    }

    pub fn with_pool_size(pool_size: u32) -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("partsource-test.db");
        let manager = DbManager::new(&db_path, pool_size).expect("db manager should be created");
        manager.run_migrations().expect("schema should apply");
        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub fn rest_vendor(id: &str, code: &str, base_url: &str) -> VendorConfig {
    let mut vendor = VendorConfig::new(id, id.to_uppercase(), code, ApiType::Rest);
    vendor.endpoints.base_url = Some(base_url.to_string());
    vendor.call_policy.timeout_ms = 500;
    vendor
}

pub fn line_item(repair_order: &str, line_id: &str, part_number: &str) -> LineItem {
    LineItem {
        repair_order_id: format!("ro-{repair_order}"),
        repair_order_number: repair_order.to_string(),
        line_id: line_id.to_string(),
        part_number: Some(part_number.to_string()),
        oem_part_number: None,
        description: format!("part {part_number}"),
        category: None,
        quantity: 2,
        vehicle_context: VehicleContext::default(),
        constraints: SourcingConstraints::default(),
    }
}

pub fn request(repair_order: &str, line_id: &str) -> SourcingRequest {
    let item = line_item(repair_order, line_id, &format!("P-{line_id}"));
    SourcingRequest::new(&item, &SourcingConfig::default(), Utc::now())
}

pub fn raw_quote(price: f64, lead_time_days: u32) -> RawQuote {
    RawQuote {
        price,
        lead_time_days,
        condition: PartCondition::New,
        brand_type: None,
        quantity_available: None,
        vendor_confirmation_id: None,
        vendor_part_number: None,
    }
}

pub fn vendor_quote(request: &SourcingRequest, vendor_id: &str, price: f64) -> VendorQuote {
    VendorQuote::from_raw(request.id, vendor_id, vendor_id, raw_quote(price, 3), 20, Utc::now())
}
