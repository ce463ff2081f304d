//! Scripted vendor adapters

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use partsource_core::vendor::{
    AdapterError, AdapterFactory, OrderConfirmation, OrderRequest, VendorAdapter,
};
use partsource_domain::{
    ApiType, PartCondition, PartSourceError, QuoteCriteria, RawQuote, Result as DomainResult,
    VendorConfig,
};

/// One scripted answer to a quote call
#[derive(Debug, Clone)]
pub enum Reply {
    Quote(RawQuote),
    Fail(AdapterError),
    /// Never answers; the caller's timeout fires
    Hang,
}

pub fn quote(price: f64, lead_time_days: u32) -> RawQuote {
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

/// Adapter answering from a script; the last reply repeats once the
/// script runs out
pub struct ScriptedAdapter {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Reply>,
    quote_calls: AtomicU32,
    orders: Mutex<Vec<OrderRequest>>,
    order_failure: Mutex<Option<AdapterError>>,
    health: Mutex<Option<AdapterError>>,
}

impl ScriptedAdapter {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        let fallback = replies.last().cloned().unwrap_or(Reply::Hang);
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: Mutex::new(fallback),
            quote_calls: AtomicU32::new(0),
            orders: Mutex::new(Vec::new()),
            order_failure: Mutex::new(None),
            health: Mutex::new(None),
        })
    }

    pub fn quoting(price: f64, lead_time_days: u32) -> Arc<Self> {
        Self::new(vec![Reply::Quote(quote(price, lead_time_days))])
    }

    pub fn hanging() -> Arc<Self> {
        Self::new(vec![Reply::Hang])
    }

    pub fn failing(error: AdapterError) -> Arc<Self> {
        Self::new(vec![Reply::Fail(error)])
    }

    /// Replace the script, e.g. when a vendor comes back
    pub fn reply_with(&self, reply: Reply) {
        self.replies.lock().clear();
        *self.fallback.lock() = reply;
    }

    pub fn quote_calls(&self) -> u32 {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().clone()
    }

    pub fn fail_orders_with(&self, error: Option<AdapterError>) {
        *self.order_failure.lock() = error;
    }

    pub fn set_health(&self, error: Option<AdapterError>) {
        *self.health.lock() = error;
    }
}

#[async_trait]
impl VendorAdapter for ScriptedAdapter {
    fn api_type(&self) -> ApiType {
        ApiType::Rest
    }

    async fn quote(
        &self,
        _criteria: &QuoteCriteria,
        _timeout: Duration,
    ) -> Result<RawQuote, AdapterError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let next = self.replies.lock().pop_front();
            next.unwrap_or_else(|| self.fallback.lock().clone())
        };
        match reply {
            Reply::Quote(raw) => Ok(raw),
            Reply::Fail(error) => Err(error),
            Reply::Hang => {
                std::future::pending::<()>().await;
                Err(AdapterError::Connection("unreachable".into()))
            }
        }
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderConfirmation, AdapterError> {
        if let Some(error) = self.order_failure.lock().clone() {
            return Err(error);
        }
        let mut orders = self.orders.lock();
        orders.push(order.clone());
        Ok(OrderConfirmation { confirmation_number: format!("CONF-{}", orders.len()) })
    }

    async fn health_check(&self) -> Result<(), AdapterError> {
        match self.health.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Factory handing out pre-built adapters by vendor id
#[derive(Default)]
pub struct ScriptedFactory {
    adapters: Mutex<HashMap<String, Arc<ScriptedAdapter>>>,
}

impl ScriptedFactory {
    pub fn insert(&self, vendor_id: &str, adapter: Arc<ScriptedAdapter>) {
        self.adapters.lock().insert(vendor_id.to_string(), adapter);
    }
}

impl AdapterFactory for ScriptedFactory {
    fn create(&self, vendor: &VendorConfig) -> DomainResult<Arc<dyn VendorAdapter>> {
        self.adapters
            .lock()
            .get(&vendor.id)
            .map(|adapter| Arc::clone(adapter) as Arc<dyn VendorAdapter>)
            .ok_or_else(|| PartSourceError::Config(format!("no adapter for '{}'", vendor.id)))
    }
}
