use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use eventcrm_core::{EventId, TagId};

use crate::input::CampaignView;

/// Report parameters.
///
/// Empty `tag_ids` / `event_ids` mean "no restriction". The date range
/// bounds campaign creation dates and is inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilters {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub tag_ids: BTreeSet<TagId>,
    pub event_ids: BTreeSet<EventId>,
    /// Month (1-12) for the weekly series.
    pub series_month: u32,
    /// Year for both the weekly and the monthly series.
    pub series_year: i32,
}

impl ReportFilters {
    /// No restrictions; series anchored on the month of `now`.
    pub fn unrestricted(now: DateTime<Utc>) -> Self {
        Self {
            date_from: None,
            date_to: None,
            tag_ids: BTreeSet::new(),
            event_ids: BTreeSet::new(),
            series_month: now.month(),
            series_year: now.year(),
        }
    }

    fn matches_tags_and_events(&self, campaign: &CampaignView) -> bool {
        let tags_ok =
            self.tag_ids.is_empty() || !self.tag_ids.is_disjoint(&campaign.target_tags);
        let event_ok = self.event_ids.is_empty()
            || campaign
                .event_id
                .is_some_and(|event| self.event_ids.contains(&event));
        tags_ok && event_ok
    }

    /// Campaigns counted in the overview, funnels and segments.
    pub fn includes(&self, campaign: &CampaignView) -> bool {
        let day = campaign.created_at.date_naive();
        let from_ok = self.date_from.is_none_or(|from| day >= from);
        let to_ok = self.date_to.is_none_or(|to| day <= to);
        from_ok && to_ok && self.matches_tags_and_events(campaign)
    }

    /// Campaigns counted in the time series. The series carry their own
    /// month/year, so the date range does not apply.
    pub fn includes_in_series(&self, campaign: &CampaignView) -> bool {
        self.matches_tags_and_events(campaign)
    }
}

/// Catalog averages that suggestions compare against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Benchmarks {
    pub open_rate: f64,
    pub click_rate: f64,
}

impl Default for Benchmarks {
    fn default() -> Self {
        Self {
            open_rate: 0.20,
            click_rate: 0.025,
        }
    }
}
