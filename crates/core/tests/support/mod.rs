//! Shared test helpers for `partsource-core` integration tests.
//!
//! `Engine` wires every core service over in-memory repositories and
//! scripted vendor adapters so tests can drive whole sourcing flows.

#![allow(dead_code)]

pub mod adapters;
pub mod repositories;

use std::sync::Arc;
use std::time::Duration;

use partsource_common::resilience::{Clock, MockClock};
use partsource_core::audit::Auditor;
use partsource_core::procurement::{PurchaseOrderGenerator, ReceivingReconciler};
use partsource_core::sourcing::{QuoteEvaluator, SourcingOrchestrator, SourcingService};
use partsource_core::vendor::{
    bootstrap_vendors, QuoteCache, VendorAdapterRegistry, VendorHealthMonitor, VendorRateLimiter,
    VendorRepository,
};
use partsource_domain::{
    ApiType, AutomationType, CallPolicy, EvaluationPolicy, LineItem, ProcurementConfig,
    RateLimitSettings, SourcingConfig, SourcingConstraints, VehicleContext, VendorConfig,
};

pub use adapters::{quote, Reply, ScriptedAdapter, ScriptedFactory};
pub use repositories::{
    MemoryLedger, MemoryPurchaseOrderRepository, MemorySourcingRepository, MemoryVendorRepository,
    RecordingPublisher,
};

/// REST vendor with no rate limits and a fast call policy
pub fn vendor(id: &str, code: &str, preference_rank: u32) -> VendorConfig {
    let mut vendor = VendorConfig::new(id, id.to_uppercase(), code, ApiType::Rest);
    vendor.endpoints.base_url = Some(format!("https://{id}.example.test"));
    vendor.rate_limits = RateLimitSettings::unlimited();
    vendor.call_policy = CallPolicy {
        timeout_ms: 100,
        max_retries: 1,
        backoff_initial_ms: 5,
        backoff_multiplier: 2.0,
        backoff_max_ms: 20,
    };
    vendor.preference_rank = preference_rank;
    vendor.failure_threshold = 3;
    vendor
}

pub fn line_item(repair_order: &str, line_id: &str, part_number: &str, quantity: u32) -> LineItem {
    LineItem {
        repair_order_id: format!("ro-{repair_order}"),
        repair_order_number: repair_order.to_string(),
        line_id: line_id.to_string(),
        part_number: Some(part_number.to_string()),
        oem_part_number: None,
        description: format!("part {part_number}"),
        category: None,
        quantity,
        vehicle_context: VehicleContext::default(),
        constraints: SourcingConstraints::default(),
    }
}

pub fn automated(threshold: f64) -> SourcingConfig {
    SourcingConfig {
        automation_type: AutomationType::FullyAutomated,
        approval_threshold: threshold,
        max_retries: 1,
        quoting_deadline_secs: 2,
    }
}

pub fn assisted(threshold: f64) -> SourcingConfig {
    SourcingConfig { automation_type: AutomationType::Assisted, ..automated(threshold) }
}

/// Every core service over in-memory adapters
pub struct Engine {
    pub clock: MockClock,
    pub vendors: Arc<MemoryVendorRepository>,
    pub requests: Arc<MemorySourcingRepository>,
    pub orders: Arc<MemoryPurchaseOrderRepository>,
    pub ledger: Arc<MemoryLedger>,
    pub events: Arc<RecordingPublisher>,
    pub registry: Arc<VendorAdapterRegistry>,
    pub limiter: Arc<VendorRateLimiter>,
    pub orchestrator: SourcingOrchestrator,
    pub service: SourcingService,
    pub generator: Arc<PurchaseOrderGenerator>,
    pub reconciler: ReceivingReconciler,
    pub monitor: VendorHealthMonitor,
}

impl Engine {
    pub async fn start(vendors: Vec<(VendorConfig, Arc<ScriptedAdapter>)>) -> Self {
        Self::start_with(vendors, ProcurementConfig::default()).await
    }

    pub async fn start_with(
        vendors: Vec<(VendorConfig, Arc<ScriptedAdapter>)>,
        procurement: ProcurementConfig,
    ) -> Self {
        let clock = MockClock::new();
        let vendor_repo = Arc::new(MemoryVendorRepository::default());
        let factory = Arc::new(ScriptedFactory::default());
        for (config, adapter) in vendors {
            factory.insert(&config.id, adapter);
            vendor_repo.upsert(&config).await.unwrap();
        }

        let ledger = Arc::new(MemoryLedger::default());
        let events = Arc::new(RecordingPublisher::default());
        let auditor = Auditor::new(ledger.clone(), events.clone());

        let registry = Arc::new(VendorAdapterRegistry::new(factory));
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let limiter = Arc::new(VendorRateLimiter::new(vendor_repo.clone(), shared_clock.clone()));
        bootstrap_vendors(vendor_repo.as_ref(), &registry, &limiter).await.unwrap();

        let cache = Arc::new(QuoteCache::with_clock(1_000, shared_clock));
        let orchestrator = SourcingOrchestrator::new(
            registry.clone(),
            limiter.clone(),
            cache,
            auditor.clone(),
            4,
        );

        let requests = Arc::new(MemorySourcingRepository::default());
        let orders = Arc::new(MemoryPurchaseOrderRepository::default());
        let generator = Arc::new(PurchaseOrderGenerator::new(
            orders.clone(),
            registry.clone(),
            auditor.clone(),
            procurement,
        ));
        let service = SourcingService::new(
            requests.clone(),
            orchestrator.clone(),
            QuoteEvaluator::new(EvaluationPolicy::default(), Default::default()),
            registry.clone(),
            generator.clone(),
            auditor.clone(),
        );
        let reconciler = ReceivingReconciler::new(orders.clone(), auditor.clone());
        let monitor = VendorHealthMonitor::new(
            registry.clone(),
            limiter.clone(),
            auditor,
            Duration::from_millis(200),
        );

        Self {
            clock,
            vendors: vendor_repo,
            requests,
            orders,
            ledger,
            events,
            registry,
            limiter,
            orchestrator,
            service,
            generator,
            reconciler,
            monitor,
        }
    }
}
