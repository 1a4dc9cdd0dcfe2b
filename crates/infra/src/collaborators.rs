//! External collaborators consumed by the engine, with in-memory adapters.
//!
//! Real deployments plug in the ticketing backend (purchases, coupons), the
//! billing service (plans), the template catalog and a delivery provider.
//! The in-memory versions back the dev binary and the tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use eventcrm_campaigns::{DynamicFields, Template};
use eventcrm_core::{
    CampaignId, Channel, CouponId, CustomerId, DeliveryLogId, EventId, OrganizerId, PlanTier,
    Purchase, TemplateId,
};

use crate::error::StoreError;

pub trait PurchaseHistoryProvider: Send + Sync {
    /// A customer's purchases with one organizer, oldest first.
    fn history(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
    ) -> Result<Vec<Purchase>, StoreError>;
}

/// Write side of purchase history, used by ingestion.
pub trait PurchaseSink: Send + Sync {
    fn record(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
        purchase: Purchase,
    ) -> Result<(), StoreError>;
}

pub trait TemplateCatalog: Send + Sync {
    fn template(&self, template_id: TemplateId) -> Result<Option<Template>, StoreError>;
}

pub trait PlanProvider: Send + Sync {
    fn plan(&self, organizer_id: OrganizerId) -> Result<PlanTier, StoreError>;
}

pub trait CouponDirectory: Send + Sync {
    /// The event a coupon belongs to.
    fn event_of(
        &self,
        organizer_id: OrganizerId,
        coupon_id: CouponId,
    ) -> Result<Option<EventId>, StoreError>;
}

/// One message handed to the delivery provider.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRequest<'a> {
    pub organizer_id: OrganizerId,
    pub campaign_id: CampaignId,
    pub delivery_log_id: DeliveryLogId,
    pub customer_id: CustomerId,
    pub channel: Channel,
    pub address: &'a str,
    pub template_code: &'a str,
    pub fields: &'a DynamicFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider could not be reached.
    #[error("provider connection failed: {0}")]
    Connection(String),

    /// The provider refused this particular message.
    #[error("provider rejected message: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// The provider's own message, stored verbatim on the delivery row.
    pub fn message(&self) -> &str {
        match self {
            ProviderError::Connection(msg) | ProviderError::Rejected(msg) => msg,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, ProviderError::Connection(_))
    }
}

pub trait DeliveryProviderClient: Send + Sync {
    /// Hand one message to the provider and return its dispatch id.
    fn send(&self, request: &DeliveryRequest<'_>) -> Result<String, ProviderError>;
}

#[derive(Debug, Default)]
pub struct InMemoryPurchaseHistory {
    histories: RwLock<HashMap<(OrganizerId, CustomerId), Vec<Purchase>>>,
}

impl InMemoryPurchaseHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PurchaseHistoryProvider for InMemoryPurchaseHistory {
    fn history(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
    ) -> Result<Vec<Purchase>, StoreError> {
        let map = self.histories.read()?;
        Ok(map.get(&(organizer_id, customer_id)).cloned().unwrap_or_default())
    }
}

impl PurchaseSink for InMemoryPurchaseHistory {
    fn record(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
        purchase: Purchase,
    ) -> Result<(), StoreError> {
        let mut map = self.histories.write()?;
        let history = map.entry((organizer_id, customer_id)).or_default();
        history.push(purchase);
        history.sort_by_key(|p| p.purchased_at);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTemplateCatalog {
    templates: RwLock<HashMap<TemplateId, Template>>,
}

impl InMemoryTemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, template: Template) -> Result<(), StoreError> {
        self.templates.write()?.insert(template.id, template);
        Ok(())
    }
}

impl TemplateCatalog for InMemoryTemplateCatalog {
    fn template(&self, template_id: TemplateId) -> Result<Option<Template>, StoreError> {
        Ok(self.templates.read()?.get(&template_id).cloned())
    }
}

/// Plans per organizer; organizers never set explicitly are `BASIC`.
#[derive(Debug, Default)]
pub struct InMemoryPlanProvider {
    plans: RwLock<HashMap<OrganizerId, PlanTier>>,
}

impl InMemoryPlanProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, organizer_id: OrganizerId, tier: PlanTier) -> Result<(), StoreError> {
        self.plans.write()?.insert(organizer_id, tier);
        Ok(())
    }
}

impl PlanProvider for InMemoryPlanProvider {
    fn plan(&self, organizer_id: OrganizerId) -> Result<PlanTier, StoreError> {
        Ok(self
            .plans
            .read()?
            .get(&organizer_id)
            .copied()
            .unwrap_or(PlanTier::Basic))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCouponDirectory {
    coupons: RwLock<HashMap<(OrganizerId, CouponId), EventId>>,
}

impl InMemoryCouponDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        organizer_id: OrganizerId,
        coupon_id: CouponId,
        event_id: EventId,
    ) -> Result<(), StoreError> {
        self.coupons.write()?.insert((organizer_id, coupon_id), event_id);
        Ok(())
    }
}

impl CouponDirectory for InMemoryCouponDirectory {
    fn event_of(
        &self,
        organizer_id: OrganizerId,
        coupon_id: CouponId,
    ) -> Result<Option<EventId>, StoreError> {
        Ok(self.coupons.read()?.get(&(organizer_id, coupon_id)).copied())
    }
}

/// A message accepted by [`LoopbackDeliveryProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub dispatch_id: String,
    pub delivery_log_id: DeliveryLogId,
    pub channel: Channel,
    pub address: String,
    pub template_code: String,
}

/// Provider stand-in that accepts messages without sending anything.
///
/// It can be told to refuse connections or to reject specific addresses,
/// which is how the failure paths are exercised.
#[derive(Debug, Default)]
pub struct LoopbackDeliveryProvider {
    sent: Mutex<Vec<SentMessage>>,
    refuse_connections: AtomicBool,
    rejected: RwLock<HashSet<String>>,
}

impl LoopbackDeliveryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub fn reject_address(&self, address: impl Into<String>) -> Result<(), StoreError> {
        self.rejected.write()?.insert(address.into());
        Ok(())
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Dispatch ids keyed by delivery row.
    pub fn dispatch_ids(&self) -> BTreeMap<DeliveryLogId, String> {
        self.sent()
            .into_iter()
            .map(|m| (m.delivery_log_id, m.dispatch_id))
            .collect()
    }
}

impl DeliveryProviderClient for LoopbackDeliveryProvider {
    fn send(&self, request: &DeliveryRequest<'_>) -> Result<String, ProviderError> {
        if self.refuse_connections.load(Ordering::SeqCst) {
            return Err(ProviderError::Connection("connection refused".into()));
        }
        let rejected = self
            .rejected
            .read()
            .map(|r| r.contains(request.address))
            .unwrap_or(false);
        if rejected {
            return Err(ProviderError::Rejected(format!(
                "recipient {} rejected",
                request.address
            )));
        }

        let dispatch_id = format!("loop-{}", DeliveryLogId::new());
        info!(
            campaign_id = %request.campaign_id,
            channel = %request.channel,
            dispatch_id = %dispatch_id,
            "loopback provider accepted message"
        );
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| ProviderError::Connection("provider state poisoned".into()))?;
        sent.push(SentMessage {
            dispatch_id: dispatch_id.clone(),
            delivery_log_id: request.delivery_log_id,
            channel: request.channel,
            address: request.address.to_string(),
            template_code: request.template_code.to_string(),
        });
        Ok(dispatch_id)
    }
}
