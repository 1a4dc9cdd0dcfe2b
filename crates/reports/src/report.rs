use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engagement::{segment_engagement, SegmentEngagement};
use crate::filters::{Benchmarks, ReportFilters};
use crate::funnel::{CampaignFunnel, Funnel};
use crate::input::{CampaignView, ReportInput};
use crate::overview::Overview;
use crate::series::{monthly_new_customers, weekly, MonthlyPoint, WeeklyPoint};
use crate::suggestions::{suggest, Suggestion};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub filters: ReportFilters,
    pub overview: Overview,
    /// Newest campaign first.
    pub campaigns: Vec<CampaignFunnel>,
    pub weekly: Vec<WeeklyPoint>,
    pub monthly_new_customers: Vec<MonthlyPoint>,
    pub segments: Vec<SegmentEngagement>,
    pub suggestions: Vec<Suggestion>,
    pub generated_at: DateTime<Utc>,
}

/// Build the full report for one organizer.
pub fn build_report(
    input: &ReportInput,
    filters: &ReportFilters,
    benchmarks: &Benchmarks,
    now: DateTime<Utc>,
) -> Report {
    let mut scoped: Vec<&CampaignView> = input
        .campaigns
        .iter()
        .filter(|c| filters.includes(c))
        .collect();
    scoped.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

    let funnels: Vec<CampaignFunnel> = scoped
        .iter()
        .map(|c| CampaignFunnel {
            campaign_id: c.id,
            name: c.name.clone(),
            channel: c.channel,
            status: c.status,
            created_at: c.created_at,
            funnel: Funnel::compute(c.total_recipients, input.deliveries_of(c.id)),
        })
        .collect();

    let overview = Overview::compute(input, &scoped, &funnels);

    let series_rows = input
        .campaigns
        .iter()
        .filter(|c| filters.includes_in_series(c))
        .flat_map(|c| input.deliveries_of(c.id));
    let weekly = weekly(series_rows, filters.series_year, filters.series_month);

    let tags_in_scope: Vec<_> = input
        .tags
        .iter()
        .filter(|t| filters.tag_ids.is_empty() || filters.tag_ids.contains(&t.id))
        .collect();

    let new_customer_histories = input
        .purchases
        .iter()
        .filter(|(customer, _)| {
            filters.tag_ids.is_empty() || tags_in_scope.iter().any(|t| t.members.contains(customer))
        })
        .map(|(_, history)| history.as_slice());
    let monthly_new_customers = monthly_new_customers(new_customer_histories, filters.series_year);

    let segments: Vec<SegmentEngagement> = tags_in_scope
        .iter()
        .map(|tag| segment_engagement(input, &scoped, tag, now))
        .collect();

    let suggestions = suggest(&overview, &funnels, &segments, &input.campaigns, benchmarks, now);

    Report {
        filters: filters.clone(),
        overview,
        campaigns: funnels,
        weekly,
        monthly_new_customers,
        segments,
        suggestions,
        generated_at: now,
    }
}
