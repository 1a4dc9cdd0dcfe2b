use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use eventcrm_core::{Channel, CustomerId, DomainError, EventId, OrganizerId, TagId};
use eventcrm_infra::store::CampaignRecord;
use eventcrm_infra::CampaignStatusView;
use eventcrm_reports::ReportFilters;
use eventcrm_segments::{CustomerSnapshot, SegmentSelector};
use eventcrm_tags::AutomationRule;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct PreviewSegmentRequest {
    pub channel: Channel,
    pub segment: SegmentSelector,
}

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub rule: Option<AutomationRule>,
}

/// `{"rule": null}` clears the rule.
#[derive(Debug, Deserialize)]
pub struct UpdateTagRuleRequest {
    #[serde(default)]
    pub rule: Option<AutomationRule>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpsertCustomerRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub marketing_consent: bool,
    #[serde(default)]
    pub webpush_consent: bool,
    #[serde(default)]
    pub webpush_endpoint: Option<String>,
}

impl UpsertCustomerRequest {
    pub fn into_snapshot(
        self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
    ) -> CustomerSnapshot {
        let mut snapshot = CustomerSnapshot::new(customer_id, organizer_id);
        snapshot.name = self.name;
        snapshot.email = self.email;
        snapshot.phone = self.phone;
        snapshot.document = self.document;
        snapshot.marketing_consent = self.marketing_consent;
        snapshot.webpush_consent = self.webpush_consent;
        snapshot.webpush_endpoint = self.webpush_endpoint;
        snapshot
    }
}

/// Query string of `GET /reports`. Id lists are comma separated.
#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub tag_ids: Option<String>,
    pub event_ids: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

impl ReportQuery {
    pub fn into_filters(self, now: DateTime<Utc>) -> Result<ReportFilters, DomainError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(DomainError::validation("date_from must not be after date_to"));
            }
        }
        let series_month = self.month.unwrap_or_else(|| now.month());
        if !(1..=12).contains(&series_month) {
            return Err(DomainError::validation("month must be between 1 and 12"));
        }

        Ok(ReportFilters {
            date_from: self.date_from,
            date_to: self.date_to,
            tag_ids: parse_id_list::<TagId>(self.tag_ids.as_deref())?,
            event_ids: parse_id_list::<EventId>(self.event_ids.as_deref())?,
            series_month,
            series_year: self.year.unwrap_or_else(|| now.year()),
        })
    }
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_id<T>(raw: &str) -> Result<T, DomainError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse()
}

fn parse_id_list<T>(raw: Option<&str>) -> Result<BTreeSet<T>, DomainError>
where
    T: FromStr<Err = DomainError> + Ord,
{
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

// -------------------------
// Response mapping
// -------------------------

pub fn campaign_to_json(record: &CampaignRecord) -> serde_json::Value {
    let campaign = &record.campaign;
    json!({
        "id": campaign.id_typed().to_string(),
        "channel": campaign.channel(),
        "name": campaign.name(),
        "template_id": campaign.template_id().map(|id| id.to_string()),
        "template_code": record.template_code,
        "segment": record.selector,
        "fields": campaign.fields(),
        "status": campaign.status().as_str(),
        "total_recipients": campaign.total_recipients(),
        "sent_count": campaign.sent_count(),
        "failure_reason": campaign.failure_reason(),
        "created_at": campaign.created_at().map(|t| t.to_rfc3339()),
        "finished_at": campaign.finished_at().map(|t| t.to_rfc3339()),
    })
}

pub fn campaign_status_to_json(view: &CampaignStatusView) -> serde_json::Value {
    let mut body = campaign_to_json(&view.record);
    let summary: serde_json::Map<String, serde_json::Value> = view
        .summary
        .iter()
        .map(|(status, count)| (status.as_str().to_string(), json!(count)))
        .collect();
    body["summary"] = serde_json::Value::Object(summary);
    body["deliveries"] = json!(view.deliveries);
    body
}
