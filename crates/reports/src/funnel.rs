use chrono::{DateTime, Utc};
use serde::Serialize;

use eventcrm_campaigns::{CampaignStatus, DeliveryLog, DeliveryStatus};
use eventcrm_core::{CampaignId, Channel};

/// recipients -> delivered -> accepted -> opened -> clicked.
///
/// Rates are fractions of `recipients`. `accepted` excludes rows that later
/// complained or unsubscribed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Funnel {
    pub recipients: u32,
    pub delivered: u32,
    pub accepted: u32,
    pub opened: u32,
    pub clicked: u32,
    pub bounced: u32,
    pub failed: u32,
    pub delivered_rate: f64,
    pub accepted_rate: f64,
    pub opened_rate: f64,
    pub clicked_rate: f64,
}

pub(crate) fn ratio(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        f64::from(part) / f64::from(whole)
    }
}

impl Funnel {
    pub fn compute<'a>(recipients: u32, rows: impl IntoIterator<Item = &'a DeliveryLog>) -> Self {
        let mut f = Funnel {
            recipients,
            ..Funnel::default()
        };

        for row in rows {
            if row.reached_recipient() {
                f.delivered += 1;
                if !matches!(
                    row.status,
                    DeliveryStatus::Complained | DeliveryStatus::Unsubscribed
                ) {
                    f.accepted += 1;
                }
            }
            if row.opened_at.is_some() {
                f.opened += 1;
            }
            if row.clicked_at.is_some() {
                f.clicked += 1;
            }
            match row.status {
                DeliveryStatus::Bounced => f.bounced += 1,
                DeliveryStatus::Failed => f.failed += 1,
                _ => {}
            }
        }

        f.delivered_rate = ratio(f.delivered, recipients);
        f.accepted_rate = ratio(f.accepted, recipients);
        f.opened_rate = ratio(f.opened, recipients);
        f.clicked_rate = ratio(f.clicked, recipients);
        f
    }

    /// Opens per delivered message; `None` when nothing was delivered.
    pub fn open_rate_of_delivered(&self) -> Option<f64> {
        (self.delivered > 0).then(|| ratio(self.opened, self.delivered))
    }

    pub fn click_rate_of_delivered(&self) -> Option<f64> {
        (self.delivered > 0).then(|| ratio(self.clicked, self.delivered))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignFunnel {
    pub campaign_id: CampaignId,
    pub name: Option<String>,
    pub channel: Channel,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    pub funnel: Funnel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use eventcrm_core::{CustomerId, OrganizerId};
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap()
    }

    fn rows_through(path: &[&[DeliveryStatus]]) -> Vec<DeliveryLog> {
        let campaign = CampaignId::new();
        let org = OrganizerId::new();
        path.iter()
            .map(|steps| {
                let mut row = DeliveryLog::queued(
                    org,
                    campaign,
                    CustomerId::new(),
                    Channel::Email,
                    "x@example.com",
                    test_time(),
                );
                for s in *steps {
                    row.transition(*s, test_time(), None);
                }
                row
            })
            .collect()
    }

    #[test]
    fn funnel_counts_each_stage() {
        use DeliveryStatus::*;
        let rows = rows_through(&[
            &[Processing, Delivered],
            &[Processing, Delivered, Opened],
            &[Processing, Delivered, Opened, Clicked],
            &[Processing, Delivered, Opened, Complained],
            &[Processing, Bounced],
            &[Failed],
        ]);

        let f = Funnel::compute(6, &rows);

        assert_eq!(f.delivered, 4);
        assert_eq!(f.accepted, 3);
        assert_eq!(f.opened, 3);
        assert_eq!(f.clicked, 1);
        assert_eq!(f.bounced, 1);
        assert_eq!(f.failed, 1);
        assert!((f.delivered_rate - 4.0 / 6.0).abs() < 1e-9);
        assert_eq!(f.open_rate_of_delivered(), Some(0.75));
    }

    #[test]
    fn empty_campaign_has_zero_rates() {
        let f = Funnel::compute(0, std::iter::empty());
        assert_eq!(f.delivered_rate, 0.0);
        assert_eq!(f.open_rate_of_delivered(), None);
    }

    const STEPS: [DeliveryStatus; 8] = [
        DeliveryStatus::Processing,
        DeliveryStatus::Delivered,
        DeliveryStatus::Bounced,
        DeliveryStatus::Failed,
        DeliveryStatus::Opened,
        DeliveryStatus::Clicked,
        DeliveryStatus::Complained,
        DeliveryStatus::Unsubscribed,
    ];

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        #[test]
        fn funnel_stages_never_grow(
            paths in prop::collection::vec(prop::collection::vec(0usize..STEPS.len(), 0..6), 0..30),
        ) {
            let statuses: Vec<Vec<DeliveryStatus>> = paths
                .iter()
                .map(|p| p.iter().map(|i| STEPS[*i]).collect())
                .collect();
            let refs: Vec<&[DeliveryStatus]> = statuses.iter().map(Vec::as_slice).collect();
            let rows = rows_through(&refs);

            let f = Funnel::compute(rows.len() as u32, &rows);
            prop_assert!(f.recipients >= f.delivered);
            prop_assert!(f.delivered >= f.accepted);
            prop_assert!(f.delivered >= f.opened);
            prop_assert!(f.opened >= f.clicked);
            prop_assert!(f.clicked_rate <= f.opened_rate);
        }
    }
}
