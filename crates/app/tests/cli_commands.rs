//! Command handlers end to end over SQLite and a mock vendor

mod support;

use partsource_app::commands::{procurement, sourcing, vendors};
use partsource_app::{execute, Command};
use partsource_domain::{
    AutomationType, DiscrepancyKind, PartSourceError, PoStatus, ReceiptInput, SourcingStatus,
};
use serde_json::json;
use support::{line_item, quoting_vendor, rest_vendor, TestApp};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn process_file_orders_and_po_runs_to_closed() {
    let server = quoting_vendor(85.0).await;
    let app = TestApp::with_vendors(vec![rest_vendor("acme", "ACM", &server.uri())]).await;
    let file = app.line_item_file(
        "lines.json",
        &json!([serde_json::to_value(line_item("RO-700", "1", "BRK-PAD-7")).unwrap()]),
    );

    let report = execute(
        &app.ctx,
        Command::Process {
            file,
            automation: Some(AutomationType::FullyAutomated),
            threshold: Some(500.0),
        },
    )
    .await
    .unwrap();

    let line = &report[0];
    assert_eq!(line["status"], "ordered");
    assert_eq!(line["selected_vendor_id"], "acme");
    let po_number = line["purchase_order"].as_str().unwrap().to_string();
    assert!(po_number.starts_with("RO700-"));

    let submitted = procurement::submit(&app.ctx, &po_number).await.unwrap();
    assert_eq!(submitted.status, PoStatus::Approved);
    let sent = procurement::transmit(&app.ctx, &po_number).await.unwrap();
    assert_eq!(sent.status, PoStatus::Sent);
    assert_eq!(sent.confirmation_number.as_deref(), Some("CONF-1"));

    let received =
        procurement::receive(&app.ctx, &po_number, ReceiptInput::quantity(2)).await.unwrap();
    assert_eq!(received.status, PoStatus::FullyReceived);
    let closed = procurement::close(&app.ctx, &sent.id.to_string(), "dock").await.unwrap();
    assert_eq!(closed.status, PoStatus::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn assisted_lines_wait_for_manual_approval() {
    let server = quoting_vendor(85.0).await;
    let app = TestApp::with_vendors(vec![rest_vendor("acme", "ACM", &server.uri())]).await;
    let items = vec![line_item("RO-701", "1", "FLT-OIL-2")];

    let reports = sourcing::process(&app.ctx, &items, Some(AutomationType::Assisted), None).await;
    assert_eq!(reports[0].status, Some(SourcingStatus::Analyzed));
    assert!(reports[0].purchase_order.is_none());
    let request_id = reports[0].request_id.unwrap();

    let pending = sourcing::pending(&app.ctx).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request_id, Some(request_id));

    let approved = sourcing::approve(&app.ctx, request_id, None, "advisor").await.unwrap();
    assert_eq!(approved.status, Some(SourcingStatus::Ordered));
    assert!(approved.purchase_order.is_some());
    assert!(sourcing::pending(&app.ctx).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn over_receipt_is_disputed_until_reconciled() {
    let server = quoting_vendor(40.0).await;
    let app = TestApp::with_vendors(vec![rest_vendor("acme", "ACM", &server.uri())]).await;
    let items = vec![line_item("RO-702", "1", "HOSE-9")];
    let reports =
        sourcing::process(&app.ctx, &items, Some(AutomationType::FullyAutomated), None).await;
    let po_number = reports[0].purchase_order.clone().unwrap();
    procurement::submit(&app.ctx, &po_number).await.unwrap();
    procurement::transmit(&app.ctx, &po_number).await.unwrap();

    let disputed =
        procurement::receive(&app.ctx, &po_number, ReceiptInput::quantity(3)).await.unwrap();
    assert_eq!(disputed.status, PoStatus::Disputed);
    assert!(disputed.has_discrepancy);
    let err = procurement::close(&app.ctx, &po_number, "dock").await.unwrap_err();
    assert!(matches!(err, PartSourceError::InvalidTransition(_)));

    let reconciled =
        procurement::reconcile(&app.ctx, &po_number, "extra unit returned", "buyer")
            .await
            .unwrap();
    assert_eq!(reconciled.status, PoStatus::FullyReceived);
    assert!(!reconciled.has_discrepancy);
    let closed = procurement::close(&app.ctx, &po_number, "buyer").await.unwrap();
    assert_eq!(closed.status, PoStatus::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn damaged_receipt_flags_the_po() {
    let server = quoting_vendor(40.0).await;
    let app = TestApp::with_vendors(vec![rest_vendor("acme", "ACM", &server.uri())]).await;
    let items = vec![line_item("RO-703", "1", "MIRROR-L")];
    let reports =
        sourcing::process(&app.ctx, &items, Some(AutomationType::FullyAutomated), None).await;
    let po_number = reports[0].purchase_order.clone().unwrap();
    procurement::submit(&app.ctx, &po_number).await.unwrap();
    procurement::transmit(&app.ctx, &po_number).await.unwrap();

    let input = ReceiptInput {
        quantity: 1,
        received_by: Some("dock".into()),
        discrepancy: Some(DiscrepancyKind::Damaged),
        notes: Some("cracked housing".into()),
    };
    let summary = procurement::receive(&app.ctx, &po_number, input).await.unwrap();

    assert_eq!(summary.status, PoStatus::Disputed);
    assert_eq!(summary.total_received, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_request_cannot_be_approved() {
    let server = quoting_vendor(85.0).await;
    let app = TestApp::with_vendors(vec![rest_vendor("acme", "ACM", &server.uri())]).await;
    let items = vec![line_item("RO-704", "1", "WIPER-22")];
    let reports = sourcing::process(&app.ctx, &items, None, None).await;
    let request_id = reports[0].request_id.unwrap();

    let cancelled = sourcing::cancel(&app.ctx, request_id, "customer declined", "advisor")
        .await
        .unwrap();
    assert_eq!(cancelled.status, Some(SourcingStatus::Cancelled));

    let err = sourcing::approve(&app.ctx, request_id, None, "advisor").await.unwrap_err();
    assert!(matches!(err, PartSourceError::InvalidTransition(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_line_is_reported_without_stopping_the_batch() {
    let server = quoting_vendor(85.0).await;
    let app = TestApp::with_vendors(vec![rest_vendor("acme", "ACM", &server.uri())]).await;
    let mut bad = line_item("RO-705", "1", "X");
    bad.quantity = 0;
    let good = line_item("RO-705", "2", "BULB-H7");

    let reports = sourcing::process(&app.ctx, &[bad, good], None, None).await;

    assert!(reports[0].error.is_some());
    assert!(reports[0].request_id.is_none());
    assert_eq!(reports[1].status, Some(SourcingStatus::Analyzed));
}

#[tokio::test]
async fn single_object_file_is_accepted() {
    let app = TestApp::with_vendors(Vec::new()).await;
    let path = app
        .line_item_file("one.json", &serde_json::to_value(line_item("RO-1", "1", "P")).unwrap());

    let items = sourcing::read_line_items(&path).unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].part_number.as_deref(), Some("P"));
}

#[tokio::test]
async fn malformed_file_is_invalid_input() {
    let app = TestApp::with_vendors(Vec::new()).await;
    let path = app.line_item_file("bad.json", &json!({ "nope": true }));

    let err = sourcing::read_line_items(&path).unwrap_err();

    assert!(matches!(err, PartSourceError::InvalidInput(_)));
}

#[tokio::test]
async fn unknown_po_reference_is_not_found() {
    let app = TestApp::with_vendors(Vec::new()).await;

    let err = procurement::transmit(&app.ctx, "RO1-2501-ACM-001").await.unwrap_err();

    assert!(matches!(err, PartSourceError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn vendors_listing_reflects_call_counters() {
    let server = quoting_vendor(85.0).await;
    let app = TestApp::with_vendors(vec![rest_vendor("acme", "ACM", &server.uri())]).await;
    sourcing::process(&app.ctx, &[line_item("RO-706", "1", "CAP-1")], None, None).await;

    let listing = vendors::list(&app.ctx).await.unwrap();

    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].id, "acme");
    assert_eq!(listing[0].total_requests, 1);
    assert_eq!(listing[0].success_rate, Some(1.0));
    assert!(!listing[0].circuit_open);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_check_targets_a_named_vendor() {
    let server = quoting_vendor(85.0).await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path("/health"))
        .respond_with(wiremock::ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let app = TestApp::with_vendors(vec![rest_vendor("acme", "ACM", &server.uri())]).await;

    let reports = vendors::health_check(&app.ctx, Some("acme")).await.unwrap();

    assert_eq!(reports.len(), 1);
    assert!(reports[0].healthy);
    assert!(vendors::health_check(&app.ctx, None).await.unwrap().is_empty());
}
