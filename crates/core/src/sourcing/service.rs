//! Sourcing request lifecycle
//!
//! `SourcingService` is the trigger entry point for the import pipeline. It
//! owns every status change of a sourcing request: quoting through the
//! orchestrator, the decision through the evaluator, approval (automatic or
//! human) and hand-off to purchase-order generation. Each change is
//! persisted with an optimistic version check, audited and published.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use partsource_domain::{
    constants::SYSTEM_ACTOR, AuditEntry, EngineEvent, EntityType, LineItem, PartSourceError,
    PurchaseOrder, Result, SourcingConfig, SourcingRequest, SourcingStatus, VendorQuote,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::evaluator::{Decision, Evaluation, QuoteEvaluator};
use super::orchestrator::{QuoteCollection, SourcingOrchestrator, VendorCallOutcome};
use super::ports::SourcingRequestRepository;
use crate::audit::Auditor;
use crate::locks::KeyedLocks;
use crate::procurement::PurchaseOrderGenerator;
use crate::vendor::VendorAdapterRegistry;

/// Attempts at a contended status write before giving up
const MAX_WRITE_ATTEMPTS: usize = 3;

/// What a call into the service produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcingOutcome {
    pub request: SourcingRequest,
    /// Present when quotes were collected during this call
    pub collection: Option<QuoteCollection>,
    /// Present when the evaluator ran during this call
    pub evaluation: Option<Evaluation>,
    pub purchase_order: Option<PurchaseOrder>,
}

impl SourcingOutcome {
    fn settled(request: SourcingRequest) -> Self {
        Self { request, collection: None, evaluation: None, purchase_order: None }
    }
}

pub struct SourcingService {
    repository: Arc<dyn SourcingRequestRepository>,
    orchestrator: SourcingOrchestrator,
    evaluator: QuoteEvaluator,
    registry: Arc<VendorAdapterRegistry>,
    purchase_orders: Arc<PurchaseOrderGenerator>,
    auditor: Auditor,
    in_flight: DashMap<Uuid, CancellationToken>,
    /// Serializes ordering against cancellation of the same request
    request_locks: KeyedLocks,
}

impl SourcingService {
    pub fn new(
        repository: Arc<dyn SourcingRequestRepository>,
        orchestrator: SourcingOrchestrator,
        evaluator: QuoteEvaluator,
        registry: Arc<VendorAdapterRegistry>,
        purchase_orders: Arc<PurchaseOrderGenerator>,
        auditor: Auditor,
    ) -> Self {
        Self {
            repository,
            orchestrator,
            evaluator,
            registry,
            purchase_orders,
            auditor,
            in_flight: DashMap::new(),
            request_locks: KeyedLocks::default(),
        }
    }

    /// Source one line item
    ///
    /// Idempotent on the line item's key: a terminal request is returned as
    /// is, an approved request resumes at ordering, and an interrupted one
    /// is quoted again.
    #[instrument(skip_all, fields(key = %item.idempotency_key()))]
    pub async fn process_sourcing_request(
        &self,
        item: &LineItem,
        config: &SourcingConfig,
    ) -> Result<SourcingOutcome> {
        item.validate()?;
        let key = item.idempotency_key();

        let (request, resumed) = match self.repository.find_by_idempotency_key(&key).await? {
            Some(existing) => (existing, true),
            None => {
                let request = SourcingRequest::new(item, config, Utc::now());
                match self.repository.insert(&request).await {
                    Ok(()) => {
                        info!(request_id = %request.id, "sourcing request created");
                        (request, false)
                    }
                    Err(err) if err.is_conflict() => {
                        debug!("sourcing request created concurrently; resuming it");
                        let existing = self
                            .repository
                            .find_by_idempotency_key(&key)
                            .await?
                            .ok_or_else(|| PartSourceError::not_found("sourcing request", &key))?;
                        (existing, true)
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        self.drive(request, resumed).await
    }

    async fn drive(&self, mut request: SourcingRequest, resumed: bool) -> Result<SourcingOutcome> {
        match request.status {
            status if status.is_terminal() => {
                info!(request_id = %request.id, %status, "sourcing request already settled");
                let purchase_order = match request.purchase_order_id {
                    Some(po_id) => self.purchase_orders.find(po_id).await?,
                    None => None,
                };
                Ok(SourcingOutcome { purchase_order, ..SourcingOutcome::settled(request) })
            }
            SourcingStatus::Analyzed => {
                debug!(request_id = %request.id, "awaiting manual approval");
                Ok(SourcingOutcome::settled(request))
            }
            SourcingStatus::Approved => self.order(request, None, None).await,
            SourcingStatus::QuotesReceived => {
                let quotes = self.repository.quotes_for(request.id).await?;
                self.decide(request, quotes, None).await
            }
            _ => {
                if resumed {
                    request.retry_count = request.retry_count.saturating_add(1);
                    if request.retry_count > request.max_retries {
                        let reason = format!(
                            "sourcing interrupted {} times without completing",
                            request.retry_count
                        );
                        let from = request.status;
                        request.fail(SourcingStatus::Failed, reason, Utc::now())?;
                        self.commit(&mut request, from, SYSTEM_ACTOR, Value::Null).await?;
                        return Ok(SourcingOutcome::settled(request));
                    }
                    info!(
                        request_id = %request.id,
                        retry_count = request.retry_count,
                        "re-running interrupted sourcing request"
                    );
                }
                self.quote(request).await
            }
        }
    }

    async fn quote(&self, mut request: SourcingRequest) -> Result<SourcingOutcome> {
        let from = request.status;
        request.transition(SourcingStatus::RequestingQuotes, Utc::now())?;
        self.commit(&mut request, from, SYSTEM_ACTOR, Value::Null).await?;

        let token = CancellationToken::new();
        self.in_flight.insert(request.id, token.clone());
        let collection = self.orchestrator.collect_quotes(&request, token).await;
        self.in_flight.remove(&request.id);

        if collection.cancelled {
            let request = self.load(request.id).await?;
            return Ok(SourcingOutcome {
                collection: Some(collection),
                ..SourcingOutcome::settled(request)
            });
        }

        self.repository.save_quotes(request.id, &collection.quotes).await?;
        let now = Utc::now();
        request.vendor_count = collection.vendor_count;
        request.next_retry_at = collection.next_retry_at;
        request.record_quotes(&collection.quotes);
        for report in &collection.outcomes {
            let error = match &report.outcome {
                VendorCallOutcome::Unavailable { error } => error.clone(),
                VendorCallOutcome::Rejected { error } => error.clone(),
                VendorCallOutcome::Discarded { reason } => reason.clone(),
                _ => continue,
            };
            request.record_error(format!("{}: {error}", report.vendor_id), now);
        }

        let from = request.status;
        if collection.quotes.is_empty() {
            let (status, reason) = if collection.deadline_hit {
                (SourcingStatus::Timeout, "quoting deadline passed with no quotes received")
            } else if collection.vendor_count == 0 {
                (SourcingStatus::Failed, "no eligible vendors")
            } else {
                (SourcingStatus::Failed, "no vendor returned a usable quote")
            };
            warn!(request_id = %request.id, %status, reason, "no quotes received");
            request.fail(status, reason, now)?;
        } else {
            request.transition(SourcingStatus::QuotesReceived, now)?;
        }
        let detail = json!({
            "vendor_count": collection.vendor_count,
            "quotes_received": collection.quotes.len(),
            "deadline_hit": collection.deadline_hit,
        });
        if let Err(err) = self.commit(&mut request, from, SYSTEM_ACTOR, detail).await {
            return self.settle_after_conflict(request.id, err).await;
        }

        if request.status != SourcingStatus::QuotesReceived {
            return Ok(SourcingOutcome {
                collection: Some(collection),
                ..SourcingOutcome::settled(request)
            });
        }
        let quotes = collection.quotes.clone();
        self.decide(request, quotes, Some(collection)).await
    }

    async fn decide(
        &self,
        mut request: SourcingRequest,
        quotes: Vec<VendorQuote>,
        collection: Option<QuoteCollection>,
    ) -> Result<SourcingOutcome> {
        let now = Utc::now();
        let mut evaluator = self.evaluator.clone();
        evaluator.set_preferences(self.vendor_preferences());
        let evaluation = evaluator.evaluate(&request, &quotes, now);
        request.recommended_quote_id = evaluation.winner().map(|quote| quote.id);

        let from = request.status;
        let detail = json!({
            "decision": evaluation.decision,
            "rejected": evaluation.rejected,
        });
        match &evaluation.decision {
            Decision::NoViableQuote { reason } => {
                request.fail(SourcingStatus::Failed, reason.clone(), now)?;
            }
            Decision::AutoApprove { quote_id } => {
                let quote = find_quote(&quotes, *quote_id)?;
                request.approve(quote, SYSTEM_ACTOR, now)?;
            }
            Decision::ManualReview { reason, .. } => {
                info!(request_id = %request.id, reason = %reason, "quote needs manual approval");
                request.transition(SourcingStatus::Analyzed, now)?;
            }
        }
        if let Err(err) = self.commit(&mut request, from, SYSTEM_ACTOR, detail).await {
            return self.settle_after_conflict(request.id, err).await;
        }

        if request.status == SourcingStatus::Approved {
            return self.order(request, collection, Some(evaluation)).await;
        }
        Ok(SourcingOutcome {
            request,
            collection,
            evaluation: Some(evaluation),
            purchase_order: None,
        })
    }

    /// Place the approved quote on a purchase order and mark the request ordered
    async fn order(
        &self,
        mut request: SourcingRequest,
        collection: Option<QuoteCollection>,
        evaluation: Option<Evaluation>,
    ) -> Result<SourcingOutcome> {
        let _guard = self.request_locks.lock(format!("request:{}", request.id)).await;
        let stored = self.load(request.id).await?;
        if stored.status != SourcingStatus::Approved {
            if stored.status.is_terminal() {
                info!(
                    request_id = %request.id,
                    status = %stored.status,
                    "request settled before ordering"
                );
                return Ok(SourcingOutcome::settled(stored));
            }
            return Err(PartSourceError::InvalidTransition(format!(
                "sourcing request {} is {} and cannot be ordered",
                request.id, stored.status
            )));
        }
        request.version = stored.version;

        let quote_id = request.selected_quote_id.ok_or_else(|| {
            PartSourceError::Internal(format!("approved request {} has no quote", request.id))
        })?;
        let quotes = self.repository.quotes_for(request.id).await?;
        let quote = find_quote(&quotes, quote_id)?.clone();
        let vendor = self.registry.config_for(&quote.vendor_id)?;

        let purchase_order =
            match self.purchase_orders.add_approved_line(&request, &quote, &vendor).await {
                Ok(po) => po,
                Err(err) => {
                    warn!(
                        request_id = %request.id,
                        error = %err,
                        "purchase order generation failed"
                    );
                    request.record_error(err.to_string(), Utc::now());
                    let status = request.status;
                    self.commit(&mut request, status, SYSTEM_ACTOR, Value::Null).await?;
                    return Err(err);
                }
            };

        let from = request.status;
        request.mark_ordered(purchase_order.id, Utc::now())?;
        let detail = json!({
            "purchase_order_id": purchase_order.id,
            "po_number": purchase_order.po_number,
        });
        if let Err(err) = self.commit(&mut request, from, SYSTEM_ACTOR, detail).await {
            if err.is_conflict() {
                self.withdraw_if_cancelled(request.id).await?;
            }
            return self.settle_after_conflict(request.id, err).await;
        }
        info!(
            request_id = %request.id,
            po_number = %purchase_order.po_number,
            "sourcing request ordered"
        );
        Ok(SourcingOutcome {
            request,
            collection,
            evaluation,
            purchase_order: Some(purchase_order),
        })
    }

    /// Approve an analyzed request, defaulting to the recommended quote
    #[instrument(skip(self))]
    pub async fn approve_manually(
        &self,
        request_id: Uuid,
        quote_id: Option<Uuid>,
        approver: &str,
    ) -> Result<SourcingOutcome> {
        let mut request = self.load(request_id).await?;
        if !matches!(request.status, SourcingStatus::Analyzed | SourcingStatus::QuotesReceived) {
            return Err(PartSourceError::InvalidTransition(format!(
                "sourcing request {request_id} is {} and cannot be approved",
                request.status
            )));
        }
        let quote_id = quote_id.or(request.recommended_quote_id).ok_or_else(|| {
            PartSourceError::InvalidInput(format!(
                "sourcing request {request_id} has no recommended quote; pick one explicitly"
            ))
        })?;
        let quotes = self.repository.quotes_for(request_id).await?;
        let quote = find_quote(&quotes, quote_id)?;

        let from = request.status;
        request.approve(quote, approver, Utc::now())?;
        let detail = json!({ "quote_id": quote_id, "vendor_id": quote.vendor_id });
        self.commit(&mut request, from, approver, detail).await?;
        self.order(request, None, None).await
    }

    /// Reject every quote; the request fails and goes to manual sourcing
    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        request_id: Uuid,
        reason: &str,
        by: &str,
    ) -> Result<SourcingRequest> {
        let mut request = self.load(request_id).await?;
        if !matches!(request.status, SourcingStatus::Analyzed | SourcingStatus::QuotesReceived) {
            return Err(PartSourceError::InvalidTransition(format!(
                "sourcing request {request_id} is {} and has no quotes awaiting a decision",
                request.status
            )));
        }
        let from = request.status;
        request.fail(SourcingStatus::Failed, format!("rejected by {by}: {reason}"), Utc::now())?;
        self.commit(&mut request, from, by, json!({ "reason": reason })).await?;
        Ok(request)
    }

    /// Cancel a request that has not been ordered, aborting in-flight calls
    ///
    /// An approved request's line is taken back off its purchase order
    /// first; once that PO has been approved the cancel is refused.
    #[instrument(skip(self))]
    pub async fn cancel_request(
        &self,
        request_id: Uuid,
        reason: &str,
        by: &str,
    ) -> Result<SourcingRequest> {
        let _guard = self.request_locks.lock(format!("request:{request_id}")).await;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.load(request_id).await?;
            let from = request.status;
            request.transition(SourcingStatus::Cancelled, Utc::now())?;
            if from == SourcingStatus::Approved {
                self.purchase_orders.withdraw_line(request_id, reason, by).await?;
            }
            request.failure_reason = Some(format!("cancelled by {by}: {reason}"));
            match self.commit(&mut request, from, by, json!({ "reason": reason })).await {
                Ok(()) => {
                    // Stored first, so the collecting task reloads a cancelled request
                    if let Some(token) = self.in_flight.get(&request_id) {
                        token.cancel();
                    }
                    info!(request_id = %request_id, "sourcing request cancelled");
                    return Ok(request);
                }
                Err(err) if err.is_conflict() && attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(request_id = %request_id, "request changed while cancelling; retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn find(&self, request_id: Uuid) -> Result<Option<SourcingRequest>> {
        self.repository.find(request_id).await
    }

    pub async fn quotes_for(&self, request_id: Uuid) -> Result<Vec<VendorQuote>> {
        self.repository.quotes_for(request_id).await
    }

    /// Requests waiting for a human decision
    pub async fn awaiting_approval(&self) -> Result<Vec<SourcingRequest>> {
        self.repository.list_by_status(SourcingStatus::Analyzed).await
    }

    pub fn is_in_flight(&self, request_id: Uuid) -> bool {
        self.in_flight.contains_key(&request_id)
    }

    async fn load(&self, request_id: Uuid) -> Result<SourcingRequest> {
        self.repository
            .find(request_id)
            .await?
            .ok_or_else(|| PartSourceError::not_found("sourcing request", request_id))
    }

    fn vendor_preferences(&self) -> HashMap<String, u32> {
        self.registry.vendors().into_iter().map(|v| (v.id, v.preference_rank)).collect()
    }

    /// Persist `request`; when its status moved away from `from`, audit and
    /// publish the change
    async fn commit(
        &self,
        request: &mut SourcingRequest,
        from: SourcingStatus,
        actor: &str,
        detail: Value,
    ) -> Result<()> {
        request.version = self.repository.update(request).await?;
        if request.status == from {
            return Ok(());
        }

        let now = request.updated_at;
        let mut entry = AuditEntry::status_change(
            EntityType::SourcingRequest,
            request.id,
            from,
            request.status,
            actor,
            now,
        );
        if !detail.is_null() {
            entry = entry.with_detail(detail);
        }
        self.auditor.record(entry).await;
        self.auditor.publish(EngineEvent::SourcingStatusChanged {
            request_id: request.id,
            from,
            status: request.status,
            at: now,
        });
        Ok(())
    }

    /// Pull the line placed for `request_id` back off its PO when the request
    /// was cancelled underneath the ordering step
    async fn withdraw_if_cancelled(&self, request_id: Uuid) -> Result<()> {
        let stored = self.load(request_id).await?;
        if stored.status != SourcingStatus::Cancelled {
            return Ok(());
        }
        let reason = stored.failure_reason.as_deref().unwrap_or("sourcing request cancelled");
        if let Err(err) = self.purchase_orders.withdraw_line(request_id, reason, SYSTEM_ACTOR).await
        {
            warn!(
                request_id = %request_id,
                error = %err,
                "cancelled request is still on a purchase order"
            );
            return Err(err);
        }
        Ok(())
    }

    /// A status write lost to a concurrent change (usually a cancellation):
    /// return what won, or the error when the stored request is still live
    async fn settle_after_conflict(
        &self,
        request_id: Uuid,
        err: PartSourceError,
    ) -> Result<SourcingOutcome> {
        if !err.is_conflict() {
            return Err(err);
        }
        let stored = self.load(request_id).await?;
        if stored.status.is_terminal() {
            info!(
                request_id = %request_id,
                status = %stored.status,
                "request settled concurrently"
            );
            return Ok(SourcingOutcome::settled(stored));
        }
        Err(err)
    }
}

fn find_quote(quotes: &[VendorQuote], quote_id: Uuid) -> Result<&VendorQuote> {
    quotes
        .iter()
        .find(|quote| quote.id == quote_id)
        .ok_or_else(|| PartSourceError::not_found("quote", quote_id))
}
