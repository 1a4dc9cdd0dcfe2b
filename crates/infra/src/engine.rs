//! Wires the services together over in-memory stores and collaborators.

use std::io;
use std::sync::Arc;

use eventcrm_events::InMemoryEventBus;

use crate::collaborators::{
    InMemoryCouponDirectory, InMemoryPlanProvider, InMemoryPurchaseHistory, InMemoryTemplateCatalog,
    LoopbackDeliveryProvider,
};
use crate::config::EngineConfig;
use crate::dispatcher::{CampaignDispatcher, CampaignMessage};
use crate::ingestion::CustomerService;
use crate::orchestrator::{CampaignOrchestrator, Catalogs};
use crate::quota::{InMemoryQuotaTracker, QuotaTracker};
use crate::reconciler::TagReconciler;
use crate::reporting::ReportService;
use crate::store::{CampaignStore, CustomerStore, InMemoryCampaignStore, TagStore};
use crate::tagging::TagService;
use crate::webhooks::WebhookIngestor;
use crate::workers::{DeliveryWorkerConfig, DeliveryWorkerPool, WorkerHandle};

pub type CampaignBus = Arc<InMemoryEventBus<CampaignMessage>>;

/// In-memory stand-ins for the external systems, kept so callers can seed
/// them (templates, plans, coupons) or inspect them (sent messages).
#[derive(Clone, Default)]
pub struct Collaborators {
    pub templates: Arc<InMemoryTemplateCatalog>,
    pub plans: Arc<InMemoryPlanProvider>,
    pub coupons: Arc<InMemoryCouponDirectory>,
    pub purchases: Arc<InMemoryPurchaseHistory>,
    pub provider: Arc<LoopbackDeliveryProvider>,
}

pub struct Engine {
    pub config: EngineConfig,
    pub collaborators: Collaborators,
    pub customers: CustomerService,
    pub tags: TagService,
    pub campaigns: CampaignOrchestrator<CampaignBus>,
    pub webhooks: WebhookIngestor<CampaignBus>,
    pub reports: ReportService,
    dispatcher: CampaignDispatcher<CampaignBus>,
}

impl Engine {
    pub fn in_memory(config: EngineConfig) -> Self {
        let quota = Arc::new(InMemoryQuotaTracker::new(config.quota_policy()));
        Self::with_quota(config, quota)
    }

    /// Same wiring with a caller-supplied quota tracker (e.g. Postgres).
    pub fn with_quota(config: EngineConfig, quota: Arc<dyn QuotaTracker>) -> Self {
        let collaborators = Collaborators::default();

        let customer_store = Arc::new(CustomerStore::new());
        let tag_store = Arc::new(TagStore::new());
        let campaign_store: Arc<dyn CampaignStore> = Arc::new(InMemoryCampaignStore::new());
        let dispatcher =
            CampaignDispatcher::new(campaign_store.clone(), Arc::new(InMemoryEventBus::new()));

        let reconciler = TagReconciler::new(
            tag_store.clone(),
            customer_store.clone(),
            collaborators.purchases.clone(),
        );
        let customers = CustomerService::new(
            customer_store.clone(),
            collaborators.purchases.clone(),
            reconciler.clone(),
        );
        let tags = TagService::new(tag_store.clone(), customer_store.clone(), reconciler);
        let campaigns = CampaignOrchestrator::new(
            Catalogs {
                templates: collaborators.templates.clone(),
                plans: collaborators.plans.clone(),
                coupons: collaborators.coupons.clone(),
            },
            customer_store.clone(),
            tag_store.clone(),
            quota,
            dispatcher.clone(),
        );
        let webhooks = WebhookIngestor::new(dispatcher.clone());
        let reports = ReportService::new(
            campaign_store,
            customer_store,
            tag_store,
            collaborators.purchases.clone(),
            config.benchmarks(),
        );

        Self {
            config,
            collaborators,
            customers,
            tags,
            campaigns,
            webhooks,
            reports,
            dispatcher,
        }
    }

    /// Start the delivery worker pool against the loopback provider.
    pub fn spawn_delivery_workers(&self) -> io::Result<WorkerHandle> {
        DeliveryWorkerPool::spawn(
            DeliveryWorkerConfig::default().with_workers(self.config.delivery_workers),
            self.dispatcher.clone(),
            self.collaborators.provider.clone(),
        )
    }

    pub fn dispatcher(&self) -> &CampaignDispatcher<CampaignBus> {
        &self.dispatcher
    }
}
