//! Concurrent quote collection
//!
//! One task per eligible vendor, bounded by a semaphore shared across all
//! sourcing requests in the process. Each task waits for a rate-limit token,
//! calls the adapter under its own timeout and retries transient failures
//! with backoff. Collection ends when every task has settled, the quoting
//! deadline fires, or the request is cancelled; whatever arrived by then is
//! the result.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use partsource_common::error::ErrorClassification;
use partsource_common::resilience::{Jitter, RetryConfig, RetryDecision, RetryExecutor};
use partsource_domain::{
    constants::SYSTEM_ACTOR, AuditAction, AuditEntry, CallOutcome, EntityType, QuoteCriteria,
    RawQuote, SourcingRequest, VendorConfig, VendorQuote,
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::audit::Auditor;
use crate::vendor::{
    AdapterError, Admission, QuoteCache, VendorAdapterRegistry, VendorErrorKind,
    VendorRateLimiter,
};

/// Fallback wait when a vendor answers 429 without a hint
const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);

/// How one vendor's part of the fan-out ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VendorCallOutcome {
    Quoted { quote_id: Uuid, from_cache: bool },
    /// The response could not be evaluated and was dropped
    Discarded { reason: String },
    /// Timeouts or transport failures outlasted the retries
    Unavailable { error: String },
    Rejected { error: String },
    /// Rate limited past the quoting deadline; not a vendor failure
    Deferred { until: DateTime<Utc> },
    /// Still in flight when the quoting deadline fired
    TimedOutByDeadline,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorCallReport {
    pub vendor_id: String,
    pub outcome: VendorCallOutcome,
    pub attempts: u32,
}

/// Everything collected for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuoteCollection {
    /// Vendors the request was sent to
    pub vendor_count: u32,
    pub quotes: Vec<VendorQuote>,
    pub outcomes: Vec<VendorCallReport>,
    pub deadline_hit: bool,
    pub cancelled: bool,
    /// Earliest time a deferred vendor could be asked again
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl QuoteCollection {
    pub fn outcome_for(&self, vendor_id: &str) -> Option<&VendorCallOutcome> {
        self.outcomes.iter().find(|r| r.vendor_id == vendor_id).map(|r| &r.outcome)
    }
}

#[derive(Debug, Clone)]
enum CallError {
    Adapter(AdapterError),
    /// No token before the quoting deadline
    Deferred { retry_in: Duration },
    Internal(String),
}

/// Only unavailable vendors are retried; 429s are waited out per attempt
fn quote_retry_policy(error: &CallError, _attempt: u32) -> RetryDecision {
    match error {
        CallError::Adapter(err) if err.kind() == VendorErrorKind::VendorUnavailable => {
            RetryDecision::Retry
        }
        _ => RetryDecision::Stop,
    }
}

/// Result of a vendor task before it is folded into the collection
struct TaskResult {
    report: VendorCallReport,
    quote: Option<VendorQuote>,
}

/// Fans quote calls out to vendor adapters
#[derive(Clone)]
pub struct SourcingOrchestrator {
    registry: Arc<VendorAdapterRegistry>,
    limiter: Arc<VendorRateLimiter>,
    cache: Arc<QuoteCache>,
    auditor: Auditor,
    permits: Arc<Semaphore>,
}

impl SourcingOrchestrator {
    pub fn new(
        registry: Arc<VendorAdapterRegistry>,
        limiter: Arc<VendorRateLimiter>,
        cache: Arc<QuoteCache>,
        auditor: Auditor,
        max_concurrent_calls: usize,
    ) -> Self {
        Self {
            registry,
            limiter,
            cache,
            auditor,
            permits: Arc::new(Semaphore::new(max_concurrent_calls.max(1))),
        }
    }

    /// Vendors that can price parts and whose breaker is closed
    pub fn eligible_vendors(&self) -> Vec<VendorConfig> {
        self.registry
            .vendors()
            .into_iter()
            .filter(|vendor| vendor.can_quote())
            .filter(|vendor| {
                let open = self.limiter.is_circuit_open(&vendor.id);
                if open {
                    debug!(vendor_id = %vendor.id, "skipping vendor with open breaker");
                }
                !open
            })
            .collect()
    }

    /// Ask every eligible vendor for a quote and gather what arrives
    #[instrument(skip_all, fields(request_id = %request.id))]
    pub async fn collect_quotes(
        &self,
        request: &SourcingRequest,
        cancel: CancellationToken,
    ) -> QuoteCollection {
        let vendors = self.eligible_vendors();
        let deadline = Instant::now() + Duration::from_secs(request.quoting_deadline_secs);
        let criteria = Arc::new(request.criteria());
        let mut collection = QuoteCollection {
            vendor_count: u32::try_from(vendors.len()).unwrap_or(u32::MAX),
            ..QuoteCollection::default()
        };
        if vendors.is_empty() {
            warn!("no eligible vendors");
            return collection;
        }

        let mut pending: BTreeSet<String> = vendors.iter().map(|v| v.id.clone()).collect();
        let mut tasks = JoinSet::new();
        for vendor in vendors {
            let this = self.clone();
            let criteria = Arc::clone(&criteria);
            let max_retries = request.max_retries;
            tasks.spawn(async move {
                this.call_vendor(vendor, criteria, max_retries, deadline).await
            });
        }

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tasks.abort_all();
                    collection.cancelled = true;
                    info!("quote collection cancelled");
                    break;
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(result)) => {
                        pending.remove(&result.report.vendor_id);
                        if let Some(quote) = result.quote {
                            collection.quotes.push(quote);
                        }
                        collection.outcomes.push(result.report);
                    }
                    Some(Err(err)) => warn!(error = %err, "vendor task did not complete"),
                },
                () = tokio::time::sleep_until(deadline) => {
                    tasks.abort_all();
                    collection.deadline_hit = true;
                    info!(pending = pending.len(), "quoting deadline reached");
                    break;
                }
            }
        }

        for vendor_id in pending {
            let outcome = if collection.cancelled {
                VendorCallOutcome::Cancelled
            } else if collection.deadline_hit {
                VendorCallOutcome::TimedOutByDeadline
            } else {
                VendorCallOutcome::Unavailable { error: "vendor task aborted".to_string() }
            };
            collection.outcomes.push(VendorCallReport { vendor_id, outcome, attempts: 0 });
        }

        collection.next_retry_at = collection
            .outcomes
            .iter()
            .filter_map(|r| match r.outcome {
                VendorCallOutcome::Deferred { until } => Some(until),
                _ => None,
            })
            .min();
        collection.outcomes.sort_by(|a, b| a.vendor_id.cmp(&b.vendor_id));

        info!(
            vendors = collection.vendor_count,
            quotes = collection.quotes.len(),
            deadline_hit = collection.deadline_hit,
            "quote collection finished"
        );
        collection
    }

    async fn call_vendor(
        &self,
        vendor: VendorConfig,
        criteria: Arc<QuoteCriteria>,
        request_max_retries: u32,
        deadline: Instant,
    ) -> TaskResult {
        let request_id = criteria.sourcing_request_id;

        if let Some(raw) = self.cache.get(&vendor.id, &vendor.caching, &criteria) {
            debug!(vendor_id = %vendor.id, "answered from quote cache");
            let mut quote =
                VendorQuote::from_raw(request_id, &vendor.id, &vendor.name, raw, 0, Utc::now());
            quote.from_cache = true;
            return TaskResult {
                report: VendorCallReport {
                    vendor_id: vendor.id,
                    outcome: VendorCallOutcome::Quoted { quote_id: quote.id, from_cache: true },
                    attempts: 0,
                },
                quote: Some(quote),
            };
        }

        let policy = &vendor.call_policy;
        let max_retries = request_max_retries.min(policy.max_retries);
        let retry_config = RetryConfig::builder()
            .max_attempts(max_retries.saturating_add(1))
            .exponential_backoff(
                Duration::from_millis(policy.backoff_initial_ms),
                policy.backoff_multiplier,
                Duration::from_millis(policy.backoff_max_ms),
            )
            .jitter(Jitter::Equal)
            .max_total_time(deadline.saturating_duration_since(Instant::now()))
            .build();
        let executor = RetryExecutor::new(retry_config, quote_retry_policy);

        let (vendor_ref, criteria_ref): (&VendorConfig, &QuoteCriteria) = (&vendor, &criteria);
        let outcome = executor
            .execute_with_outcome(move |attempt| {
                self.attempt_quote(vendor_ref, criteria_ref, attempt, deadline)
            })
            .await;
        let attempts = outcome.attempts;
        let now = Utc::now();

        let (vendor_outcome, quote) = match outcome.result {
            Ok((raw, latency_ms)) => {
                self.cache.insert(&vendor.id, &vendor.caching, &criteria, &raw);
                self.record(&vendor.id, CallOutcome::success(latency_ms, now)).await;
                let quote = VendorQuote::from_raw(
                    request_id,
                    &vendor.id,
                    &vendor.name,
                    raw,
                    latency_ms,
                    now,
                );
                (VendorCallOutcome::Quoted { quote_id: quote.id, from_cache: false }, Some(quote))
            }
            Err(err) => {
                let outcome = match err.into_last_error() {
                    Some(error) => self.settle_failure(&vendor, request_id, error, now).await,
                    None => VendorCallOutcome::TimedOutByDeadline,
                };
                (outcome, None)
            }
        };

        TaskResult {
            report: VendorCallReport { vendor_id: vendor.id, outcome: vendor_outcome, attempts },
            quote,
        }
    }

    /// One attempt: wait for a token, take a worker slot, call the adapter
    ///
    /// A vendor-side 429 is waited out inside the attempt and does not count
    /// as a retry; only the quoting deadline bounds it.
    async fn attempt_quote(
        &self,
        vendor: &VendorConfig,
        criteria: &QuoteCriteria,
        attempt: u32,
        deadline: Instant,
    ) -> Result<(RawQuote, u64), CallError> {
        let request_id = criteria.sourcing_request_id;
        let action =
            if attempt == 1 { AuditAction::VendorAttempt } else { AuditAction::VendorRetry };
        let entry = AuditEntry::new(
            EntityType::SourcingRequest,
            request_id,
            action,
            SYSTEM_ACTOR,
            Utc::now(),
        );
        self.auditor
            .record(entry.with_detail(json!({ "vendor_id": vendor.id, "attempt": attempt })))
            .await;

        loop {
            self.wait_for_token(vendor, deadline).await?;
            let (result, latency_ms) = self.call_adapter(vendor, criteria).await?;
            let error = match result {
                Ok(raw) => return Ok((raw, latency_ms)),
                Err(error) => error,
            };

            debug!(vendor_id = %vendor.id, attempt, error = %error, "vendor quote attempt failed");
            if error.kind() != VendorErrorKind::InvalidVendorResponse {
                self.auditor
                    .record(
                        AuditEntry::new(
                            EntityType::SourcingRequest,
                            request_id,
                            AuditAction::VendorError,
                            SYSTEM_ACTOR,
                            Utc::now(),
                        )
                        .with_detail(json!({
                            "vendor_id": vendor.id,
                            "attempt": attempt,
                            "kind": error.kind(),
                            "error": error.to_string(),
                            "latency_ms": latency_ms,
                        })),
                    )
                    .await;
            }

            let AdapterError::RateLimited { retry_after } = error else {
                return Err(CallError::Adapter(error));
            };
            let retry_in = retry_after.unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF);
            if Instant::now() + retry_in >= deadline {
                return Err(CallError::Deferred { retry_in });
            }
            debug!(vendor_id = %vendor.id, ?retry_in, "vendor asked to back off");
            tokio::time::sleep(retry_in).await;
        }
    }

    /// Block until the limiter grants a call, or give up when the wait would
    /// outlast the deadline
    async fn wait_for_token(
        &self,
        vendor: &VendorConfig,
        deadline: Instant,
    ) -> Result<(), CallError> {
        loop {
            let admission = self
                .limiter
                .try_acquire(&vendor.id)
                .map_err(|err| CallError::Internal(err.to_string()))?;
            match admission {
                Admission::Granted => return Ok(()),
                Admission::DeferredUntil { retry_in, window } => {
                    if Instant::now() + retry_in >= deadline {
                        return Err(CallError::Deferred { retry_in });
                    }
                    debug!(
                        vendor_id = %vendor.id,
                        ?window,
                        ?retry_in,
                        "waiting for rate-limit window"
                    );
                    tokio::time::sleep(retry_in).await;
                }
            }
        }
    }

    /// A single adapter call under the vendor's timeout, holding a worker slot
    async fn call_adapter(
        &self,
        vendor: &VendorConfig,
        criteria: &QuoteCriteria,
    ) -> Result<(Result<RawQuote, AdapterError>, u64), CallError> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|err| CallError::Internal(err.to_string()))?;
        let adapter = self
            .registry
            .adapter_for(&vendor.id)
            .map_err(|err| CallError::Internal(err.to_string()))?;

        let call_timeout = Duration::from_millis(vendor.call_policy.timeout_ms);
        let started = Instant::now();
        let call = adapter.quote(criteria, call_timeout);
        let result = match tokio::time::timeout(call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(call_timeout)),
        };
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = result.and_then(|raw| match raw.validate() {
            Ok(()) => Ok(raw),
            Err(reason) => Err(AdapterError::InvalidResponse(reason)),
        });
        Ok((result, latency_ms))
    }

    /// Map the final error of a vendor call onto counters, audit and outcome
    async fn settle_failure(
        &self,
        vendor: &VendorConfig,
        request_id: Uuid,
        error: CallError,
        now: DateTime<Utc>,
    ) -> VendorCallOutcome {
        match error {
            CallError::Deferred { retry_in } => {
                VendorCallOutcome::Deferred { until: now + to_chrono(retry_in) }
            }
            CallError::Internal(message) => {
                warn!(vendor_id = %vendor.id, error = %message, "vendor call could not be made");
                VendorCallOutcome::Unavailable { error: message }
            }
            CallError::Adapter(error) => {
                let message = error.to_string();
                match error.kind() {
                    VendorErrorKind::VendorUnavailable => {
                        warn!(vendor_id = %vendor.id, error = %message, "vendor unavailable");
                        self.record(&vendor.id, CallOutcome::failure(&message, 0, now)).await;
                        VendorCallOutcome::Unavailable { error: message }
                    }
                    VendorErrorKind::InvalidVendorResponse => {
                        warn!(vendor_id = %vendor.id, error = %message, "discarding vendor quote");
                        self.record(&vendor.id, CallOutcome::soft_failure(&message, 0, now))
                            .await;
                        self.auditor
                            .record(
                                AuditEntry::new(
                                    EntityType::SourcingRequest,
                                    request_id,
                                    AuditAction::QuoteDiscarded,
                                    SYSTEM_ACTOR,
                                    now,
                                )
                                .with_detail(json!({ "vendor_id": vendor.id, "reason": message })),
                            )
                            .await;
                        VendorCallOutcome::Discarded { reason: message }
                    }
                    VendorErrorKind::Rejected => {
                        self.record(&vendor.id, CallOutcome::soft_failure(&message, 0, now))
                            .await;
                        VendorCallOutcome::Rejected { error: message }
                    }
                    VendorErrorKind::RateLimitExceeded => {
                        let wait = error.retry_after().unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF);
                        VendorCallOutcome::Deferred { until: now + to_chrono(wait) }
                    }
                }
            }
        }
    }

    async fn record(&self, vendor_id: &str, outcome: CallOutcome) {
        if let Err(err) = self.limiter.record_outcome(vendor_id, &outcome).await {
            warn!(vendor_id, error = %err, "failed to record vendor call outcome");
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(1))
}

impl std::fmt::Debug for SourcingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcingOrchestrator")
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}
