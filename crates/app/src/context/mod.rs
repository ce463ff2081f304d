//! Application context - dependency injection container

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use partsource_common::resilience::{Clock, SystemClock};
use partsource_core::{
    bootstrap_vendors, AuditLedger, Auditor, PurchaseOrderGenerator, QuoteCache, QuoteEvaluator,
    ReceivingReconciler, SourcingOrchestrator, SourcingService, VendorAdapterRegistry,
    VendorHealthMonitor, VendorRateLimiter, VendorRepository,
};
use partsource_domain::{EngineConfig, PartSourceError, PurchaseOrder, Result};
use partsource_infra::{
    BroadcastEventPublisher, DbManager, DefaultAdapterFactory, HealthCheckScheduler,
    HealthCheckSchedulerConfig, SqliteAuditLedger, SqlitePurchaseOrderRepository,
    SqliteSourcingRequestRepository, SqliteVendorRepository,
};
use tracing::{info, warn};
use uuid::Uuid;

/// Entries kept in the in-process quote cache
const QUOTE_CACHE_CAPACITY: u64 = 10_000;

/// Upper bound on a single health check; the scheduler sweep has its own
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: EngineConfig,
    pub db: Arc<DbManager>,
    pub vendors: Arc<dyn VendorRepository>,
    pub ledger: Arc<dyn AuditLedger>,
    pub events: BroadcastEventPublisher,
    pub registry: Arc<VendorAdapterRegistry>,
    pub limiter: Arc<VendorRateLimiter>,
    pub sourcing: Arc<SourcingService>,
    pub purchase_orders: Arc<PurchaseOrderGenerator>,
    pub receiving: Arc<ReceivingReconciler>,
    pub health: Arc<VendorHealthMonitor>,
}

impl AppContext {
    /// Open the store, seed configured vendors and wire every service
    pub async fn new(config: EngineConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Like [`AppContext::new`] with an explicit clock for rate limiting and
    /// cache expiry
    pub async fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let db = Arc::new(DbManager::open(&config.database)?);

        let vendors: Arc<dyn VendorRepository> = Arc::new(SqliteVendorRepository::new(db.clone()));
        let requests = Arc::new(SqliteSourcingRequestRepository::new(db.clone()));
        let orders = Arc::new(SqlitePurchaseOrderRepository::new(db.clone()));
        let ledger: Arc<dyn AuditLedger> = Arc::new(SqliteAuditLedger::new(db.clone()));
        let events = BroadcastEventPublisher::default();
        let auditor = Auditor::new(ledger.clone(), Arc::new(events.clone()));

        let factory = Arc::new(DefaultAdapterFactory::new()?);
        let registry = Arc::new(VendorAdapterRegistry::new(factory));
        let limiter = Arc::new(VendorRateLimiter::new(vendors.clone(), clock.clone()));

        // Configured vendors are upserted first so stored counters survive restarts
        for vendor in &config.vendors {
            if let Err(err) = vendor.validate() {
                warn!(vendor_id = %vendor.id, error = %err, "skipping configured vendor");
                continue;
            }
            vendors.upsert(vendor).await?;
        }
        let registered = bootstrap_vendors(vendors.as_ref(), &registry, &limiter).await?;
        if registered == 0 {
            warn!("no vendor integrations registered; sourcing requests will fail");
        }

        let preferences: HashMap<String, u32> = registry
            .vendors()
            .into_iter()
            .map(|vendor| (vendor.id, vendor.preference_rank))
            .collect();
        let evaluator = QuoteEvaluator::new(config.evaluation.clone(), preferences);

        let orchestrator = SourcingOrchestrator::new(
            registry.clone(),
            limiter.clone(),
            Arc::new(QuoteCache::with_clock(QUOTE_CACHE_CAPACITY, clock)),
            auditor.clone(),
            config.orchestration.max_concurrent_calls,
        );
        let purchase_orders = Arc::new(PurchaseOrderGenerator::new(
            orders.clone(),
            registry.clone(),
            auditor.clone(),
            config.procurement.clone(),
        ));
        let sourcing = Arc::new(SourcingService::new(
            requests,
            orchestrator,
            evaluator,
            registry.clone(),
            purchase_orders.clone(),
            auditor.clone(),
        ));
        let receiving = Arc::new(ReceivingReconciler::new(orders, auditor.clone()));
        let health = Arc::new(VendorHealthMonitor::new(
            registry.clone(),
            limiter.clone(),
            auditor,
            HEALTH_CHECK_TIMEOUT,
        ));

        info!(
            database = %db.path().display(),
            vendors = registered,
            "partsource context initialized"
        );

        Ok(Self {
            config,
            db,
            vendors,
            ledger,
            events,
            registry,
            limiter,
            sourcing,
            purchase_orders,
            receiving,
            health,
        })
    }

    /// Start the periodic vendor health check
    ///
    /// Returns `None` when probing is disabled in configuration.
    pub async fn start_health_scheduler(&self) -> Result<Option<HealthCheckScheduler>> {
        if !self.config.health.enabled {
            info!("vendor health scheduler disabled");
            return Ok(None);
        }
        let config = HealthCheckSchedulerConfig::from(&self.config.health);
        let mut scheduler = HealthCheckScheduler::new(self.health.clone(), config);
        scheduler.start().await?;
        Ok(Some(scheduler))
    }

    /// Resolve a purchase order by id or by PO number
    pub async fn resolve_purchase_order(&self, reference: &str) -> Result<PurchaseOrder> {
        let found = match Uuid::parse_str(reference) {
            Ok(id) => self.purchase_orders.find(id).await?,
            Err(_) => self.purchase_orders.find_by_number(reference).await?,
        };
        found.ok_or_else(|| PartSourceError::NotFound(format!("purchase order {reference}")))
    }
}
