//! End-to-end tests over the in-memory engine.
//!
//! customer ingestion -> tag automation -> campaign creation -> delivery
//! worker -> provider webhooks -> report

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use eventcrm_campaigns::{
    CampaignStatus, DeliveryStatus, FieldInput, FieldRequirement, Template, TransitionOutcome,
};
use eventcrm_core::{
    CampaignId, CategoryId, Channel, CustomerId, EventId, OrganizerId, PlanTier, Purchase, TagId,
    TemplateId,
};
use eventcrm_reports::ReportFilters;
use eventcrm_segments::{CustomerSnapshot, SegmentSelector};
use eventcrm_tags::AutomationRule;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::OrchestratorError;
use crate::orchestrator::CampaignRequest;
use crate::quota::{InMemoryQuotaTracker, QuotaTracker};
use crate::webhooks::DeliveryWebhook;
use crate::workers::deliver_campaign;

fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 10, 15, 0, 0).unwrap()
}

fn test_organizer_id() -> OrganizerId {
    OrganizerId::new()
}

fn template(engine: &Engine, channel: Channel, fields: Vec<FieldRequirement>) -> TemplateId {
    let id = TemplateId::new();
    engine
        .collaborators
        .templates
        .insert(Template {
            id,
            channel,
            code: "event-promo".into(),
            editable_fields: fields,
            tier: PlanTier::Basic,
        })
        .unwrap();
    id
}

fn customer(engine: &Engine, org: OrganizerId, email: &str) -> CustomerId {
    let mut snapshot = CustomerSnapshot::new(CustomerId::new(), org);
    snapshot.email = Some(email.to_string());
    snapshot.marketing_consent = true;
    engine.customers.upsert_customer(org, snapshot).unwrap().id
}

fn purchase(event_id: EventId, amount_cents: i64, at: DateTime<Utc>) -> Purchase {
    Purchase {
        event_id,
        category_id: CategoryId::new(),
        amount_cents,
        ticket_count: 1,
        purchased_at: at,
    }
}

fn email_request(template_id: TemplateId, segment: SegmentSelector) -> CampaignRequest {
    CampaignRequest {
        channel: Channel::Email,
        template_id,
        name: Some("Autumn line-up".into()),
        segment,
        fields: FieldInput::default(),
    }
}

fn webhook(dispatch_id: &str, event_type: &str, at: DateTime<Utc>) -> DeliveryWebhook {
    DeliveryWebhook {
        dispatch_id: dispatch_id.to_string(),
        event_type: event_type.to_string(),
        timestamp: at,
        error_message: None,
    }
}

fn deliver(engine: &Engine, org: OrganizerId, campaign_id: CampaignId) {
    deliver_campaign(
        engine.dispatcher(),
        engine.collaborators.provider.as_ref(),
        org,
        campaign_id,
        2,
    )
    .unwrap();
}

#[test]
fn quota_exhaustion_rejects_without_persisting() {
    let quota = Arc::new(InMemoryQuotaTracker::default());
    let engine = Engine::with_quota(EngineConfig::default(), quota.clone());
    let org = test_organizer_id();
    quota
        .try_reserve(
            org,
            Channel::Email,
            PlanTier::Basic,
            CampaignId::new(),
            95,
            test_time() - TimeDelta::days(10),
        )
        .unwrap();

    let tag = engine.tags.create_tag(org, "Locals", "#0A0B0C", None, test_time()).unwrap().tag;
    for i in 0..10 {
        let c = customer(&engine, org, &format!("local{i}@example.com"));
        engine.tags.assign_tag(org, tag.id, c, test_time()).unwrap();
    }
    let t = template(&engine, Channel::Email, vec![]);

    let err = engine
        .campaigns
        .create_campaign(org, &email_request(t, SegmentSelector::tags([tag.id])), test_time())
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::QuotaExceeded { remaining: 5, .. }));
    assert!(engine.campaigns.list_campaigns(org).unwrap().is_empty());
    assert_eq!(
        engine.campaigns.quota_status(org, Channel::Email, test_time()).unwrap().used,
        95
    );
}

#[test]
fn automated_tag_survives_a_refund() {
    let engine = Engine::in_memory(EngineConfig::default());
    let org = test_organizer_id();
    let vip = engine
        .tags
        .create_tag(
            org,
            "VIP",
            "#FFD700",
            Some(AutomationRule { min_total_spent_cents: Some(10_000), ..Default::default() }),
            test_time(),
        )
        .unwrap()
        .tag;
    let c = customer(&engine, org, "big@example.com");
    let event = EventId::new();

    let report = engine
        .customers
        .record_purchase(org, c, purchase(event, 10_000, test_time()), test_time())
        .unwrap();
    assert!(report.added.contains(&vip.id));

    // Refund as a negative adjustment: lifetime spend drops to zero.
    let report = engine
        .customers
        .record_purchase(
            org,
            c,
            purchase(event, -10_000, test_time() + TimeDelta::days(1)),
            test_time(),
        )
        .unwrap();
    assert!(report.added.is_empty());

    let listed = engine.tags.list_tags(org).unwrap();
    assert_eq!(listed[0].members, 1);
}

#[test]
fn overlapping_tags_yield_one_row_per_customer() {
    let engine = Engine::in_memory(EngineConfig::default());
    let org = test_organizer_id();
    let a = engine.tags.create_tag(org, "A", "#111111", None, test_time()).unwrap().tag;
    let b = engine.tags.create_tag(org, "B", "#222222", None, test_time()).unwrap().tag;
    let x = customer(&engine, org, "x@example.com");
    let y = customer(&engine, org, "y@example.com");
    engine.tags.assign_tag(org, a.id, x, test_time()).unwrap();
    engine.tags.assign_tag(org, b.id, x, test_time()).unwrap();
    engine.tags.assign_tag(org, b.id, y, test_time()).unwrap();
    let t = template(&engine, Channel::Email, vec![]);

    let segment = SegmentSelector::tags([a.id, b.id]);
    assert_eq!(engine.campaigns.preview(org, Channel::Email, &segment).unwrap(), 2);
    let record = engine
        .campaigns
        .create_campaign(org, &email_request(t, segment), test_time())
        .unwrap();

    let view = engine.campaigns.campaign_status(org, record.campaign.id_typed()).unwrap();
    let recipients: Vec<_> = view.deliveries.iter().map(|d| d.customer_id).collect();
    assert_eq!(recipients.iter().filter(|c| **c == x).count(), 1);
    assert_eq!(view.deliveries.len() as u32, record.campaign.total_recipients());
}

#[test]
fn late_open_after_click_changes_nothing() {
    let engine = Engine::in_memory(EngineConfig::default());
    let org = test_organizer_id();
    let c = customer(&engine, org, "fan@example.com");
    engine
        .customers
        .record_purchase(org, c, purchase(EventId::new(), 2500, test_time()), test_time())
        .unwrap();
    let t = template(&engine, Channel::Email, vec![]);
    let record = engine
        .campaigns
        .create_campaign(org, &email_request(t, SegmentSelector::All), test_time())
        .unwrap();
    let campaign_id = record.campaign.id_typed();

    deliver(&engine, org, campaign_id);
    let dispatch_id = engine.collaborators.provider.sent()[0].dispatch_id.clone();
    let at = test_time() + TimeDelta::minutes(5);
    engine.webhooks.ingest(&webhook(&dispatch_id, "DELIVERED", at)).unwrap();
    engine.webhooks.ingest(&webhook(&dispatch_id, "CLICKED", at + TimeDelta::minutes(1))).unwrap();

    let receipt = engine
        .webhooks
        .ingest(&webhook(&dispatch_id, "OPENED", at + TimeDelta::minutes(2)))
        .unwrap();

    assert_eq!(receipt.outcome, TransitionOutcome::Ignored { current: DeliveryStatus::Clicked });
    let view = engine.campaigns.campaign_status(org, campaign_id).unwrap();
    assert_eq!(view.deliveries[0].status, DeliveryStatus::Clicked);
    assert_eq!(view.record.campaign.status(), CampaignStatus::Sent);
}

#[test]
fn full_pipeline_reaches_the_report() {
    let engine = Engine::in_memory(EngineConfig::default());
    let org = test_organizer_id();
    let event = EventId::new();
    let earlier = test_time() - TimeDelta::days(60);

    let buyers: Vec<_> = (0..3)
        .map(|i| {
            let c = customer(&engine, org, &format!("buyer{i}@example.com"));
            engine
                .customers
                .record_purchase(org, c, purchase(EventId::new(), 1000, earlier), test_time())
                .unwrap();
            c
        })
        .collect();
    let t = template(&engine, Channel::Email, vec![FieldRequirement::Event]);
    let mut request = email_request(t, SegmentSelector::All);
    request.fields.event_id = Some(event);

    let record = engine.campaigns.create_campaign(org, &request, test_time()).unwrap();
    let campaign_id = record.campaign.id_typed();
    assert_eq!(record.campaign.status(), CampaignStatus::Sending);
    deliver(&engine, org, campaign_id);

    let dispatch_ids = engine.collaborators.provider.dispatch_ids();
    let view = engine.campaigns.campaign_status(org, campaign_id).unwrap();
    let at = test_time() + TimeDelta::hours(1);
    let mut clicker = None;
    for (i, row) in view.deliveries.iter().enumerate() {
        let id = &dispatch_ids[&row.id];
        match i {
            0 => {
                engine.webhooks.ingest(&webhook(id, "CLICKED", at)).unwrap();
                clicker = Some(row.customer_id);
            }
            1 => {
                engine.webhooks.ingest(&webhook(id, "DELIVERED", at)).unwrap();
            }
            _ => {
                let mut bounce = webhook(id, "BOUNCED", at);
                bounce.error_message = Some("no such user".into());
                engine.webhooks.ingest(&bounce).unwrap();
            }
        }
    }
    let clicker = clicker.unwrap();
    assert!(buyers.contains(&clicker));
    engine
        .customers
        .record_purchase(org, clicker, purchase(event, 7500, at + TimeDelta::hours(1)), test_time())
        .unwrap();

    let view = engine.campaigns.campaign_status(org, campaign_id).unwrap();
    assert_eq!(view.record.campaign.status(), CampaignStatus::Sent);
    assert_eq!(view.record.campaign.sent_count(), 2);
    assert_eq!(view.summary.get(&DeliveryStatus::Bounced), Some(&1));

    let report = engine
        .reports
        .report(org, &ReportFilters::unrestricted(test_time()), test_time() + TimeDelta::days(1))
        .unwrap();
    assert_eq!(report.overview.total_campaigns, 1);
    assert_eq!(report.overview.total_recipients, 3);
    assert_eq!(report.overview.attributed_revenue_cents, 7500);
    let funnel = &report.campaigns[0].funnel;
    assert_eq!((funnel.delivered, funnel.opened, funnel.clicked, funnel.bounced), (2, 1, 1, 1));
}

#[test]
fn unreachable_provider_fails_the_campaign() {
    let engine = Engine::in_memory(EngineConfig::default());
    let org = test_organizer_id();
    for i in 0..3 {
        let c = customer(&engine, org, &format!("c{i}@example.com"));
        engine
            .customers
            .record_purchase(org, c, purchase(EventId::new(), 500, test_time()), test_time())
            .unwrap();
    }
    let t = template(&engine, Channel::Email, vec![]);
    let record = engine
        .campaigns
        .create_campaign(org, &email_request(t, SegmentSelector::All), test_time())
        .unwrap();
    engine.collaborators.provider.refuse_connections(true);

    deliver(&engine, org, record.campaign.id_typed());

    let view = engine.campaigns.campaign_status(org, record.campaign.id_typed()).unwrap();
    assert_eq!(view.record.campaign.status(), CampaignStatus::Failed);
    assert_eq!(view.summary.get(&DeliveryStatus::Failed), Some(&3));
    assert!(view
        .deliveries
        .iter()
        .all(|d| d.error_message.as_deref() == Some("connection refused")));
}

#[test]
fn worker_pool_delivers_webpush_campaigns() {
    let engine = Engine::in_memory(EngineConfig::default());
    let handle = engine.spawn_delivery_workers().unwrap();
    let org = test_organizer_id();
    let mut expected = BTreeSet::new();
    for i in 0..4 {
        let mut snapshot = CustomerSnapshot::new(CustomerId::new(), org);
        snapshot.webpush_consent = true;
        snapshot.webpush_endpoint = Some(format!("https://push.example.com/{i}"));
        let c = engine.customers.upsert_customer(org, snapshot).unwrap().id;
        engine
            .customers
            .record_purchase(org, c, purchase(EventId::new(), 900, test_time()), test_time())
            .unwrap();
        expected.insert(c);
    }
    let t = template(&engine, Channel::Webpush, vec![]);
    let mut request = email_request(t, SegmentSelector::All);
    request.channel = Channel::Webpush;

    let record = engine.campaigns.create_campaign(org, &request, test_time()).unwrap();
    let campaign_id = record.campaign.id_typed();

    let mut status = record.campaign.status();
    for _ in 0..300 {
        status = engine
            .campaigns
            .campaign_status(org, campaign_id)
            .unwrap()
            .record
            .campaign
            .status();
        if status == CampaignStatus::Sent {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    handle.shutdown();

    assert_eq!(status, CampaignStatus::Sent);
    let view = engine.campaigns.campaign_status(org, campaign_id).unwrap();
    let recipients: BTreeSet<_> = view.deliveries.iter().map(|d| d.customer_id).collect();
    assert_eq!(recipients, expected);
    assert_eq!(view.record.campaign.sent_count(), 4);
}

#[test]
fn organizers_never_see_each_other() {
    let engine = Engine::in_memory(EngineConfig::default());
    let (org_a, org_b) = (test_organizer_id(), test_organizer_id());
    let c = customer(&engine, org_a, "a@example.com");
    engine
        .customers
        .record_purchase(org_a, c, purchase(EventId::new(), 100, test_time()), test_time())
        .unwrap();
    let t = template(&engine, Channel::Email, vec![]);
    let record = engine
        .campaigns
        .create_campaign(org_a, &email_request(t, SegmentSelector::All), test_time())
        .unwrap();

    assert!(engine.campaigns.list_campaigns(org_b).unwrap().is_empty());
    assert!(matches!(
        engine.campaigns.campaign_status(org_b, record.campaign.id_typed()),
        Err(OrchestratorError::NotFound)
    ));
    assert_eq!(engine.campaigns.preview(org_b, Channel::Email, &SegmentSelector::All).unwrap(), 0);
    assert!(engine.tags.assign_tag(org_b, TagId::new(), c, test_time()).is_err());
}
