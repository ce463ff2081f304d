//! Core services wired over SQLite and a mock REST vendor

mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use partsource_common::resilience::{Clock, SystemClock};
use partsource_core::audit::{AuditLedger, Auditor};
use partsource_core::procurement::PurchaseOrderGenerator;
use partsource_core::sourcing::{QuoteEvaluator, SourcingOrchestrator, SourcingService};
use partsource_core::vendor::{
    install_vendor, QuoteCache, VendorAdapterRegistry, VendorHealthMonitor, VendorRateLimiter,
};
use partsource_domain::{
    AutomationType, EngineEvent, EntityType, EvaluationPolicy, PoStatus, ProcurementConfig,
    SourcingConfig, SourcingStatus, VendorConfig,
};
use partsource_infra::database::{
    SqliteAuditLedger, SqlitePurchaseOrderRepository, SqliteSourcingRequestRepository,
    SqliteVendorRepository,
};
use partsource_infra::events::BroadcastEventPublisher;
use partsource_infra::integrations::DefaultAdapterFactory;
use partsource_infra::scheduling::{HealthCheckScheduler, HealthCheckSchedulerConfig};
use serde_json::json;
use support::{line_item, request, rest_vendor, vendor_quote, TestDatabase};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Stack {
    _db: TestDatabase,
    ledger: Arc<SqliteAuditLedger>,
    events: BroadcastEventPublisher,
    service: SourcingService,
    generator: Arc<PurchaseOrderGenerator>,
    monitor: Arc<VendorHealthMonitor>,
}

async fn stack(vendor: VendorConfig) -> Stack {
    let db = TestDatabase::with_pool_size(6);
    let vendors = Arc::new(SqliteVendorRepository::new(db.manager.clone()));
    let requests = Arc::new(SqliteSourcingRequestRepository::new(db.manager.clone()));
    let orders = Arc::new(SqlitePurchaseOrderRepository::new(db.manager.clone()));
    let ledger = Arc::new(SqliteAuditLedger::new(db.manager.clone()));
    let events = BroadcastEventPublisher::default();
    let auditor = Auditor::new(ledger.clone(), Arc::new(events.clone()));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(VendorAdapterRegistry::new(Arc::new(
        DefaultAdapterFactory::new().unwrap(),
    )));
    let limiter = Arc::new(VendorRateLimiter::new(vendors.clone(), clock.clone()));
    install_vendor(vendors.as_ref(), &registry, &limiter, vendor).await.unwrap();

    let orchestrator = SourcingOrchestrator::new(
        registry.clone(),
        limiter.clone(),
        Arc::new(QuoteCache::with_clock(100, clock)),
        auditor.clone(),
        4,
    );
    let generator = Arc::new(PurchaseOrderGenerator::new(
        orders,
        registry.clone(),
        auditor.clone(),
        ProcurementConfig::default(),
    ));
    let service = SourcingService::new(
        requests,
        orchestrator,
        QuoteEvaluator::new(EvaluationPolicy::default(), Default::default()),
        registry.clone(),
        generator.clone(),
        auditor.clone(),
    );
    let monitor = Arc::new(VendorHealthMonitor::new(
        registry,
        limiter,
        auditor,
        Duration::from_millis(500),
    ));

    Stack { _db: db, ledger, events, service, generator, monitor }
}

fn automated(threshold: f64) -> SourcingConfig {
    SourcingConfig {
        automation_type: AutomationType::FullyAutomated,
        approval_threshold: threshold,
        max_retries: 1,
        quoting_deadline_secs: 5,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn automated_line_is_quoted_ordered_and_transmitted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/quotes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "price": 85.0,
            "lead_time_days": 2,
            "condition": "new"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "confirmation_number": "AC-981" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let stack = stack(rest_vendor("acme", "ACM", &server.uri())).await;
    let mut events = stack.events.subscribe();
    let item = line_item("RO-500", "1", "BRK-PAD-7");

    let outcome =
        stack.service.process_sourcing_request(&item, &automated(500.0)).await.unwrap();

    assert_eq!(outcome.request.status, SourcingStatus::Ordered);
    let po = outcome.purchase_order.expect("purchase order generated");
    assert_eq!(po.status, PoStatus::Draft);
    assert!(po.po_number.starts_with("RO500-"));
    assert!(po.po_number.ends_with("-ACM-001"));

    // Below the auto-approve limit, so submission approves it
    let approved = stack.generator.submit_for_approval(po.id).await.unwrap();
    assert_eq!(approved.status, PoStatus::Approved);
    let sent = stack.generator.transmit(po.id).await.unwrap();
    assert_eq!(sent.status, PoStatus::Sent);
    assert_eq!(sent.transmission.confirmation_number.as_deref(), Some("AC-981"));

    // Transmitting again never re-sends
    let again = stack.generator.transmit(po.id).await.unwrap();
    assert_eq!(again.status, PoStatus::Sent);

    let history = stack
        .ledger
        .entries_for(EntityType::SourcingRequest, &outcome.request.id.to_string())
        .await
        .unwrap();
    let statuses: Vec<_> = history.iter().filter_map(|e| e.to_status.clone()).collect();
    assert_eq!(statuses.first().map(String::as_str), Some("requesting_quotes"));
    assert_eq!(statuses.last().map(String::as_str), Some("ordered"));

    let first = events.recv().await.unwrap();
    assert!(matches!(first, EngineEvent::SourcingStatusChanged { .. }));

    // Same line again is a no-op on the stored request
    let replay = stack.service.process_sourcing_request(&item, &automated(500.0)).await.unwrap();
    assert_eq!(replay.request.id, outcome.request.id);
    assert_eq!(replay.request.status, SourcingStatus::Ordered);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_share_one_po_on_sqlite() {
    let vendor = rest_vendor("acme", "ACM", "http://127.0.0.1:9");
    let stack = stack(vendor.clone()).await;
    let pairs: Vec<_> = (0..50)
        .map(|i| {
            let source = request("RO-501", &i.to_string());
            let quote = vendor_quote(&source, "acme", 12.0);
            (source, quote)
        })
        .collect();

    let results = join_all(
        pairs
            .iter()
            .map(|(source, quote)| stack.generator.add_approved_line(source, quote, &vendor)),
    )
    .await;

    let numbers: HashSet<String> =
        results.into_iter().map(|po| po.unwrap().po_number).collect();
    assert_eq!(numbers.len(), 1);
    let number = numbers.into_iter().next().unwrap();
    let po = stack.generator.find_by_number(&number).await.unwrap().unwrap();
    assert_eq!(po.lines.len(), 50);
    assert_eq!(po.total_quantity, 100);
    assert!(po.created_at <= Utc::now());
}

#[tokio::test]
async fn health_scheduler_starts_and_stops() {
    let stack = stack(rest_vendor("acme", "ACM", "http://127.0.0.1:9")).await;
    let config = HealthCheckSchedulerConfig {
        interval: Duration::from_millis(20),
        ..HealthCheckSchedulerConfig::default()
    };
    let mut scheduler = HealthCheckScheduler::new(stack.monitor.clone(), config);

    scheduler.start().await.unwrap();
    assert!(scheduler.is_running());
    assert!(scheduler.start().await.is_err());
    tokio::time::sleep(Duration::from_millis(60)).await;

    scheduler.stop().await.unwrap();
    assert!(!scheduler.is_running());
    assert!(scheduler.stop().await.is_err());
}
