//! Per-tag engagement scoring.
//!
//! score = 10 * (0.3 * open_rate + 0.3 * click_rate + 0.2 * frequency + 0.2 * recency)
//!
//! - open/click rates: opened (clicked) rows over delivered rows sent to the
//!   segment's members
//! - frequency: average purchases per member divided by 5, capped at 1
//! - recency: per member `1 - days_since_last_purchase / 365`, floored at 0,
//!   averaged over members (members who never bought count as 0)

use chrono::{DateTime, Utc};
use serde::Serialize;

use eventcrm_core::TagId;

use crate::funnel::ratio;
use crate::input::{CampaignView, ReportInput, TagView};

const OPEN_WEIGHT: f64 = 0.3;
const CLICK_WEIGHT: f64 = 0.3;
const FREQUENCY_WEIGHT: f64 = 0.2;
const RECENCY_WEIGHT: f64 = 0.2;
const FREQUENCY_CAP: f64 = 5.0;
const RECENCY_HORIZON_DAYS: f64 = 365.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentEngagement {
    pub tag_id: TagId,
    pub name: String,
    pub customers: u32,
    pub open_rate: f64,
    pub click_rate: f64,
    pub average_purchases: f64,
    pub recency: f64,
    pub score: f64,
}

/// Weighted 0-10 score, rounded to one decimal. Inputs are clamped to [0, 1].
pub fn engagement_score(open_rate: f64, click_rate: f64, frequency: f64, recency: f64) -> f64 {
    let c = |v: f64| v.clamp(0.0, 1.0);
    let raw = OPEN_WEIGHT * c(open_rate)
        + CLICK_WEIGHT * c(click_rate)
        + FREQUENCY_WEIGHT * c(frequency)
        + RECENCY_WEIGHT * c(recency);
    (raw * 100.0).round() / 10.0
}

pub(crate) fn segment_engagement(
    input: &ReportInput,
    campaigns: &[&CampaignView],
    tag: &TagView,
    now: DateTime<Utc>,
) -> SegmentEngagement {
    let (mut delivered, mut opened, mut clicked) = (0u32, 0u32, 0u32);
    for campaign in campaigns {
        for row in input.deliveries_of(campaign.id) {
            if !tag.members.contains(&row.customer_id) {
                continue;
            }
            if row.reached_recipient() {
                delivered += 1;
            }
            if row.opened_at.is_some() {
                opened += 1;
            }
            if row.clicked_at.is_some() {
                clicked += 1;
            }
        }
    }

    let members = tag.members.len() as u32;
    let mut purchases = 0usize;
    let mut recency_sum = 0.0;
    for customer in &tag.members {
        let history = input.history_of(*customer);
        purchases += history.len();
        if let Some(last) = history.iter().map(|p| p.purchased_at).max() {
            let days = (now - last).num_days().max(0) as f64;
            recency_sum += (1.0 - days / RECENCY_HORIZON_DAYS).max(0.0);
        }
    }

    let (average_purchases, recency) = if members == 0 {
        (0.0, 0.0)
    } else {
        (
            purchases as f64 / f64::from(members),
            recency_sum / f64::from(members),
        )
    };
    let open_rate = ratio(opened, delivered);
    let click_rate = ratio(clicked, delivered);
    let frequency = (average_purchases / FREQUENCY_CAP).min(1.0);

    SegmentEngagement {
        tag_id: tag.id,
        name: tag.name.clone(),
        customers: members,
        open_rate,
        click_rate,
        average_purchases,
        recency,
        score: engagement_score(open_rate, click_rate, frequency, recency),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use eventcrm_core::{CategoryId, CustomerId, EventId, Purchase};
    use std::collections::BTreeSet;

    #[test]
    fn score_weights_and_rounding() {
        assert_eq!(engagement_score(1.0, 1.0, 1.0, 1.0), 10.0);
        assert_eq!(engagement_score(0.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(engagement_score(0.5, 0.1, 0.4, 0.0), 2.6);
        assert_eq!(engagement_score(3.0, -1.0, 0.0, 0.0), 3.0);
    }

    #[test]
    fn frequent_recent_buyers_score_on_purchases_alone() {
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let member = CustomerId::new();
        let purchases: Vec<Purchase> = (0..5)
            .map(|i| Purchase {
                event_id: EventId::new(),
                category_id: CategoryId::new(),
                amount_cents: 1_000,
                ticket_count: 1,
                purchased_at: now - TimeDelta::days(i),
            })
            .collect();
        let mut input = ReportInput::default();
        input.purchases.insert(member, purchases);
        let tag = TagView {
            id: TagId::new(),
            name: "Regulars".into(),
            members: BTreeSet::from([member]),
        };

        let seg = segment_engagement(&input, &[], &tag, now);

        assert_eq!(seg.customers, 1);
        assert_eq!(seg.average_purchases, 5.0);
        assert_eq!(seg.recency, 1.0);
        assert_eq!(seg.score, 4.0);
    }
}
