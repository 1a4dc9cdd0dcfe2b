//! Campaign creation: fields, segment, quota, persistence, hand-off.
//!
//! Every rejection (bad fields, empty segment, quota) happens before
//! anything is written. Quota is reserved before the campaign is persisted
//! and released again if persisting fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use eventcrm_campaigns::{
    bind_fields, CampaignCommand, CreateCampaign, DeliveryLog, DeliveryStatus, FieldInput,
    StartSending,
};
use eventcrm_core::{CampaignId, Channel, OrganizerId, TemplateId};
use eventcrm_events::EventBus;
use eventcrm_quota::QuotaStatus;
use eventcrm_segments::{resolve, Recipient, SegmentSelector};

use crate::collaborators::{CouponDirectory, PlanProvider, TemplateCatalog};
use crate::dispatcher::{CampaignDispatcher, CampaignMessage, DispatchError};
use crate::error::{OrchestratorError, QuotaError, StoreError};
use crate::quota::QuotaTracker;
use crate::store::{CampaignRecord, CustomerStore, TagStore};

/// Campaign creation request as submitted by an organizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRequest {
    pub channel: Channel,
    pub template_id: TemplateId,
    #[serde(default)]
    pub name: Option<String>,
    pub segment: SegmentSelector,
    #[serde(default)]
    pub fields: FieldInput,
}

/// A campaign with its delivery rows, for the detail view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignStatusView {
    pub record: CampaignRecord,
    pub deliveries: Vec<DeliveryLog>,
    /// Row count per status; statuses with no rows are absent.
    pub summary: BTreeMap<DeliveryStatus, u32>,
}

/// Read-only collaborators the orchestrator consults.
pub struct Catalogs {
    pub templates: Arc<dyn TemplateCatalog>,
    pub plans: Arc<dyn PlanProvider>,
    pub coupons: Arc<dyn CouponDirectory>,
}

pub struct CampaignOrchestrator<B> {
    catalogs: Catalogs,
    customers: Arc<CustomerStore>,
    tags: Arc<TagStore>,
    quota: Arc<dyn QuotaTracker>,
    dispatcher: CampaignDispatcher<B>,
}

impl<B> CampaignOrchestrator<B>
where
    B: EventBus<CampaignMessage>,
{
    pub fn new(
        catalogs: Catalogs,
        customers: Arc<CustomerStore>,
        tags: Arc<TagStore>,
        quota: Arc<dyn QuotaTracker>,
        dispatcher: CampaignDispatcher<B>,
    ) -> Self {
        Self {
            catalogs,
            customers,
            tags,
            quota,
            dispatcher,
        }
    }

    /// Create a campaign and hand it to the delivery workers.
    ///
    /// Returns the campaign as stored after the hand-off (normally
    /// `SENDING`; `FAILED` when the hand-off itself could not happen).
    #[instrument(
        skip(self, request),
        fields(organizer_id = %organizer_id, channel = %request.channel),
        err
    )]
    pub fn create_campaign(
        &self,
        organizer_id: OrganizerId,
        request: &CampaignRequest,
        now: DateTime<Utc>,
    ) -> Result<CampaignRecord, OrchestratorError> {
        let channel = request.channel;

        let template = self
            .catalogs
            .templates
            .template(request.template_id)?
            .ok_or_else(|| {
                OrchestratorError::Validation(format!(
                    "template {} does not exist",
                    request.template_id
                ))
            })?;
        let plan = self.catalogs.plans.plan(organizer_id)?;
        template.ensure_usable(channel, plan)?;

        let coupon_event = match request.fields.coupon_id {
            Some(coupon) => self.catalogs.coupons.event_of(organizer_id, coupon)?,
            None => None,
        };
        let fields = bind_fields(&template, &request.fields, |_| coupon_event)?;

        let recipients = self.resolve(organizer_id, channel, &request.segment)?;
        if recipients.is_empty() {
            info!("campaign rejected: no recipients in segment");
            return Err(OrchestratorError::NoRecipients);
        }
        let count = u32::try_from(recipients.len())
            .map_err(|_| OrchestratorError::Validation("segment is too large".into()))?;

        let campaign_id = CampaignId::new();
        let grant = match self
            .quota
            .try_reserve(organizer_id, channel, plan, campaign_id, count, now)
        {
            Ok(grant) => grant,
            Err(QuotaError::Exceeded(exceeded)) => {
                warn!(
                    used = exceeded.used,
                    requested = exceeded.requested,
                    limit = exceeded.limit,
                    "campaign rejected: quota exhausted"
                );
                return Err(exceeded.into());
            }
            Err(QuotaError::Store(err)) => return Err(err.into()),
        };

        let rows: Vec<DeliveryLog> = recipients
            .into_iter()
            .map(|r| {
                DeliveryLog::queued(
                    organizer_id,
                    campaign_id,
                    r.customer_id,
                    channel,
                    r.address,
                    now,
                )
            })
            .collect();
        let command = CreateCampaign {
            organizer_id,
            campaign_id,
            channel,
            template_id: template.id,
            name: request
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            fields,
            total_recipients: count,
            occurred_at: now,
        };

        if let Err(err) = self.dispatcher.create(
            command,
            request.segment.clone(),
            template.code.clone(),
            rows,
        ) {
            self.release(organizer_id, channel, campaign_id);
            return Err(err.into());
        }
        info!(
            campaign_id = %campaign_id,
            total_recipients = count,
            quota_remaining = grant.remaining,
            "campaign created"
        );

        self.start_sending(organizer_id, campaign_id, now)?;
        self.record(organizer_id, campaign_id)
    }

    /// Number of recipients `selector` resolves to right now.
    pub fn preview(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        selector: &SegmentSelector,
    ) -> Result<usize, OrchestratorError> {
        Ok(self.resolve(organizer_id, channel, selector)?.len())
    }

    /// Newest first.
    pub fn list_campaigns(
        &self,
        organizer_id: OrganizerId,
    ) -> Result<Vec<CampaignRecord>, OrchestratorError> {
        let mut records = self.dispatcher.store().list(organizer_id)?;
        records.sort_by(|a, b| {
            b.campaign
                .created_at()
                .cmp(&a.campaign.created_at())
                .then(b.campaign.id_typed().cmp(&a.campaign.id_typed()))
        });
        Ok(records)
    }

    pub fn campaign_status(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
    ) -> Result<CampaignStatusView, OrchestratorError> {
        let record = self.record(organizer_id, campaign_id)?;
        let deliveries = self.dispatcher.store().deliveries(organizer_id, campaign_id)?;
        let mut summary = BTreeMap::new();
        for row in &deliveries {
            *summary.entry(row.status).or_insert(0u32) += 1;
        }
        Ok(CampaignStatusView {
            record,
            deliveries,
            summary,
        })
    }

    pub fn quota_status(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, OrchestratorError> {
        let plan = self.catalogs.plans.plan(organizer_id)?;
        Ok(self.quota.status(organizer_id, channel, plan, now)?)
    }

    fn resolve(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        selector: &SegmentSelector,
    ) -> Result<Vec<Recipient>, StoreError> {
        let customers = self.customers.list(organizer_id)?;
        let members = match selector {
            SegmentSelector::All => Default::default(),
            SegmentSelector::Tags(_) => self.tags.member_map(organizer_id)?,
        };
        Ok(resolve(organizer_id, channel, selector, &customers, &members))
    }

    fn record(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
    ) -> Result<CampaignRecord, OrchestratorError> {
        self.dispatcher
            .store()
            .get(organizer_id, campaign_id)?
            .ok_or(OrchestratorError::NotFound)
    }

    fn start_sending(
        &self,
        organizer_id: OrganizerId,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        let started = self.dispatcher.dispatch(
            organizer_id,
            campaign_id,
            CampaignCommand::StartSending(StartSending {
                organizer_id,
                campaign_id,
                occurred_at: now,
            }),
        );

        match started {
            Ok(_) => Ok(()),
            // Saved as SENDING but no worker heard about it.
            Err(DispatchError::Publish(msg)) => {
                let reason = format!("could not enqueue recipients: {msg}");
                self.dispatcher
                    .fail_dispatch(organizer_id, campaign_id, &reason, now)?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn release(&self, organizer_id: OrganizerId, channel: Channel, campaign_id: CampaignId) {
        if let Err(err) = self.quota.release(organizer_id, channel, campaign_id) {
            error!(
                campaign_id = %campaign_id,
                error = %err,
                "failed to release quota for unpersisted campaign"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use eventcrm_campaigns::{CampaignStatus, FieldRequirement, Template};
    use eventcrm_core::{CouponId, CustomerId, EventId, PlanTier, TagId};
    use eventcrm_events::InMemoryEventBus;
    use eventcrm_segments::CustomerSnapshot;
    use eventcrm_tags::AssignmentSource;

    use crate::collaborators::{
        InMemoryCouponDirectory, InMemoryPlanProvider, InMemoryTemplateCatalog,
    };
    use crate::quota::InMemoryQuotaTracker;
    use crate::store::{CampaignStore, InMemoryCampaignStore};

    type Bus = Arc<InMemoryEventBus<CampaignMessage>>;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 14, 18, 30, 0).unwrap()
    }

    struct Fixture {
        org: OrganizerId,
        templates: Arc<InMemoryTemplateCatalog>,
        plans: Arc<InMemoryPlanProvider>,
        coupons: Arc<InMemoryCouponDirectory>,
        customers: Arc<CustomerStore>,
        tags: Arc<TagStore>,
        quota: Arc<InMemoryQuotaTracker>,
        store: Arc<InMemoryCampaignStore>,
        orchestrator: CampaignOrchestrator<Bus>,
    }

    fn fixture() -> Fixture {
        let templates = Arc::new(InMemoryTemplateCatalog::new());
        let plans = Arc::new(InMemoryPlanProvider::new());
        let coupons = Arc::new(InMemoryCouponDirectory::new());
        let customers = Arc::new(CustomerStore::new());
        let tags = Arc::new(TagStore::new());
        let quota = Arc::new(InMemoryQuotaTracker::default());
        let store = Arc::new(InMemoryCampaignStore::new());
        let dispatcher = CampaignDispatcher::new(
            store.clone() as Arc<dyn CampaignStore>,
            Arc::new(InMemoryEventBus::new()),
        );
        let orchestrator = CampaignOrchestrator::new(
            Catalogs {
                templates: templates.clone(),
                plans: plans.clone(),
                coupons: coupons.clone(),
            },
            customers.clone(),
            tags.clone(),
            quota.clone(),
            dispatcher,
        );
        Fixture {
            org: OrganizerId::new(),
            templates,
            plans,
            coupons,
            customers,
            tags,
            quota,
            store,
            orchestrator,
        }
    }

    fn template(f: &Fixture, fields: Vec<FieldRequirement>, tier: PlanTier) -> TemplateId {
        let id = TemplateId::new();
        f.templates
            .insert(Template {
                id,
                channel: Channel::Email,
                code: "promo".into(),
                editable_fields: fields,
                tier,
            })
            .unwrap();
        id
    }

    fn buyer(f: &Fixture, consent: bool) -> CustomerId {
        let mut c = CustomerSnapshot::new(CustomerId::new(), f.org);
        c.email = Some(format!("{}@example.com", c.id));
        c.marketing_consent = consent;
        c.first_purchase_at = Some(test_time());
        f.customers.upsert(c.clone()).unwrap();
        c.id
    }

    fn request(template_id: TemplateId, segment: SegmentSelector) -> CampaignRequest {
        CampaignRequest {
            channel: Channel::Email,
            template_id,
            name: Some("  Spring sale ".into()),
            segment,
            fields: FieldInput::default(),
        }
    }

    #[test]
    fn creates_one_row_per_consenting_recipient() {
        let f = fixture();
        let t = template(&f, vec![], PlanTier::Basic);
        buyer(&f, true);
        buyer(&f, true);
        buyer(&f, false);

        let record = f
            .orchestrator
            .create_campaign(f.org, &request(t, SegmentSelector::All), test_time())
            .unwrap();

        let campaign = &record.campaign;
        assert_eq!(campaign.status(), CampaignStatus::Sending);
        assert_eq!(campaign.total_recipients(), 2);
        assert_eq!(campaign.name(), Some("Spring sale"));
        let rows = f.store.deliveries(f.org, campaign.id_typed()).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status == DeliveryStatus::Queued));
    }

    #[test]
    fn missing_field_is_rejected_before_anything_is_reserved() {
        let f = fixture();
        let t = template(&f, vec![FieldRequirement::Event], PlanTier::Basic);
        buyer(&f, true);

        let err = f
            .orchestrator
            .create_campaign(f.org, &request(t, SegmentSelector::All), test_time())
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Validation(_)));
        let status = f.orchestrator.quota_status(f.org, Channel::Email, test_time()).unwrap();
        assert_eq!(status.used, 0);
    }

    #[test]
    fn pro_templates_need_a_pro_plan() {
        let f = fixture();
        let t = template(&f, vec![], PlanTier::Pro);
        buyer(&f, true);
        let req = request(t, SegmentSelector::All);

        assert!(matches!(
            f.orchestrator.create_campaign(f.org, &req, test_time()),
            Err(OrchestratorError::Validation(_))
        ));

        f.plans.set(f.org, PlanTier::Pro).unwrap();
        assert!(f.orchestrator.create_campaign(f.org, &req, test_time()).is_ok());
    }

    #[test]
    fn coupon_attaches_its_event() {
        let f = fixture();
        let t = template(&f, vec![FieldRequirement::Coupon], PlanTier::Basic);
        buyer(&f, true);
        let (coupon, event) = (CouponId::new(), EventId::new());
        f.coupons.insert(f.org, coupon, event).unwrap();

        let mut req = request(t, SegmentSelector::All);
        req.fields.coupon_id = Some(coupon);
        let record = f.orchestrator.create_campaign(f.org, &req, test_time()).unwrap();
        assert_eq!(record.campaign.fields().event_id, Some(event));

        req.fields.coupon_id = Some(CouponId::new());
        assert!(matches!(
            f.orchestrator.create_campaign(f.org, &req, test_time()),
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[test]
    fn empty_segment_creates_nothing() {
        let f = fixture();
        let t = template(&f, vec![], PlanTier::Basic);
        let empty_tag = TagId::new();

        let err = f
            .orchestrator
            .create_campaign(f.org, &request(t, SegmentSelector::tags([empty_tag])), test_time())
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::NoRecipients));
        assert!(f.orchestrator.list_campaigns(f.org).unwrap().is_empty());
    }

    #[test]
    fn quota_rejection_persists_nothing() {
        let f = fixture();
        let t = template(&f, vec![], PlanTier::Basic);
        let tag = TagId::new();
        for _ in 0..10 {
            let id = buyer(&f, true);
            f.tags
                .assign(f.org, tag, id, AssignmentSource::Manual, test_time())
                .unwrap();
        }
        f.quota
            .try_reserve(f.org, Channel::Email, PlanTier::Basic, CampaignId::new(), 95, test_time())
            .unwrap();

        let err = f
            .orchestrator
            .create_campaign(f.org, &request(t, SegmentSelector::tags([tag])), test_time())
            .unwrap_err();

        match err {
            OrchestratorError::QuotaExceeded { requested, remaining, limit } => {
                assert_eq!((requested, remaining, limit), (10, 5, 100));
            }
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
        assert!(f.orchestrator.list_campaigns(f.org).unwrap().is_empty());
    }

    #[test]
    fn status_summarises_rows_and_unknown_campaigns_are_not_found() {
        let f = fixture();
        let t = template(&f, vec![], PlanTier::Basic);
        buyer(&f, true);
        let record = f
            .orchestrator
            .create_campaign(f.org, &request(t, SegmentSelector::All), test_time())
            .unwrap();

        let view = f
            .orchestrator
            .campaign_status(f.org, record.campaign.id_typed())
            .unwrap();
        assert_eq!(view.summary.get(&DeliveryStatus::Queued), Some(&1));

        assert!(matches!(
            f.orchestrator.campaign_status(OrganizerId::new(), record.campaign.id_typed()),
            Err(OrchestratorError::NotFound)
        ));
    }
}
