//! Shared helpers for `partsource-app` integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use partsource_app::AppContext;
use partsource_domain::{
    ApiType, EngineConfig, LineItem, SourcingConstraints, VehicleContext, VendorConfig,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Context over a throwaway database; the directory lives as long as the app
pub struct TestApp {
    pub ctx: AppContext,
    pub dir: TempDir,
}

impl TestApp {
    pub async fn with_vendors(vendors: Vec<VendorConfig>) -> Self {
        let dir = TempDir::new().expect("temp dir should be created");
        let mut config = EngineConfig::default();
        config.database.path = dir.path().join("partsource.db").display().to_string();
        config.database.pool_size = 4;
        config.health.enabled = false;
        config.vendors = vendors;
        let ctx = AppContext::new(config).await.expect("context should start");
        Self { ctx, dir }
    }

    /// Write line items to a JSON file inside the test directory
    pub fn line_item_file(&self, name: &str, body: &serde_json::Value) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body.to_string()).expect("line item file should be written");
        path
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

/// Mock vendor that quotes `price` and confirms every order
pub async fn quoting_vendor(price: f64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/quotes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "price": price,
            "lead_time_days": 2,
            "condition": "new"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "confirmation_number": "CONF-1" })),
        )
        .mount(&server)
        .await;
    server
}
