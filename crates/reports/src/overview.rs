use std::collections::BTreeSet;

use serde::Serialize;

use eventcrm_core::CustomerId;

use crate::funnel::CampaignFunnel;
use crate::input::{CampaignView, ReportInput};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Overview {
    pub total_campaigns: u32,
    pub total_recipients: u64,
    /// Mean of per-campaign opened/delivered over campaigns that delivered
    /// anything.
    pub average_open_rate: f64,
    pub average_click_rate: f64,
    pub attributed_revenue_cents: i64,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0u32), |(sum, n), v| (sum + v, n + 1));
    if n == 0 { 0.0 } else { sum / f64::from(n) }
}

impl Overview {
    pub fn compute(
        input: &ReportInput,
        campaigns: &[&CampaignView],
        funnels: &[CampaignFunnel],
    ) -> Self {
        Self {
            total_campaigns: funnels.len() as u32,
            total_recipients: funnels.iter().map(|f| u64::from(f.funnel.recipients)).sum(),
            average_open_rate: mean(
                funnels
                    .iter()
                    .filter_map(|f| f.funnel.open_rate_of_delivered()),
            ),
            average_click_rate: mean(
                funnels
                    .iter()
                    .filter_map(|f| f.funnel.click_rate_of_delivered()),
            ),
            attributed_revenue_cents: attributed_revenue(input, campaigns),
        }
    }
}

/// Purchases of a campaign's event by customers who clicked that campaign.
///
/// A purchase is counted once even when several campaigns for the same event
/// were clicked by the same customer.
fn attributed_revenue(input: &ReportInput, campaigns: &[&CampaignView]) -> i64 {
    let mut counted: BTreeSet<(CustomerId, usize)> = BTreeSet::new();
    let mut total = 0i64;

    for campaign in campaigns {
        let Some(event_id) = campaign.event_id else {
            continue;
        };
        let clickers: BTreeSet<CustomerId> = input
            .deliveries_of(campaign.id)
            .filter(|d| d.clicked_at.is_some())
            .map(|d| d.customer_id)
            .collect();

        for customer in clickers {
            for (idx, purchase) in input.history_of(customer).iter().enumerate() {
                if purchase.event_id == event_id && counted.insert((customer, idx)) {
                    total += purchase.amount_cents;
                }
            }
        }
    }

    total
}
