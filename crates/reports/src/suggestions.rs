use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use eventcrm_core::{Channel, TagId};

use crate::engagement::SegmentEngagement;
use crate::filters::Benchmarks;
use crate::funnel::{ratio, CampaignFunnel};
use crate::input::CampaignView;
use crate::overview::Overview;

const HIGH_BOUNCE_RATE: f64 = 0.05;
const REENGAGE_BELOW: f64 = 3.0;
const ENGAGED_FROM: f64 = 7.0;
const IDLE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    LowOpenRate,
    LowClickRate,
    HighBounceRate,
    ReengageSegment,
    EngagedSegmentIdle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub priority: Priority,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<TagId>,
}

impl Suggestion {
    fn new(kind: SuggestionKind, priority: Priority, message: String) -> Self {
        Self {
            kind,
            priority,
            message,
            tag_id: None,
        }
    }

    fn for_tag(mut self, tag_id: TagId) -> Self {
        self.tag_id = Some(tag_id);
        self
    }
}

/// Threshold heuristics, highest priority first.
///
/// `all_campaigns` is unfiltered: whether a segment was recently targeted
/// does not depend on the report's date range.
pub(crate) fn suggest(
    overview: &Overview,
    funnels: &[CampaignFunnel],
    segments: &[SegmentEngagement],
    all_campaigns: &[CampaignView],
    benchmarks: &Benchmarks,
    now: DateTime<Utc>,
) -> Vec<Suggestion> {
    let mut out = Vec::new();
    let any_delivered = funnels.iter().any(|f| f.funnel.delivered > 0);

    if any_delivered && overview.average_open_rate < benchmarks.open_rate {
        let priority = if overview.average_open_rate < benchmarks.open_rate / 2.0 {
            Priority::High
        } else {
            Priority::Medium
        };
        out.push(Suggestion::new(
            SuggestionKind::LowOpenRate,
            priority,
            format!(
                "Average open rate {:.1}% is below the catalog average of {:.1}%; \
                 try shorter subject lines or a different send time.",
                overview.average_open_rate * 100.0,
                benchmarks.open_rate * 100.0
            ),
        ));
    }

    if any_delivered && overview.average_click_rate < benchmarks.click_rate {
        out.push(Suggestion::new(
            SuggestionKind::LowClickRate,
            Priority::Medium,
            format!(
                "Average click rate {:.1}% is below the catalog average of {:.1}%; \
                 make the call to action more prominent.",
                overview.average_click_rate * 100.0,
                benchmarks.click_rate * 100.0
            ),
        ));
    }

    let (bounced, email_recipients) = funnels
        .iter()
        .filter(|f| f.channel == Channel::Email)
        .fold((0u32, 0u32), |(b, r), f| {
            (b + f.funnel.bounced, r + f.funnel.recipients)
        });
    let bounce_rate = ratio(bounced, email_recipients);
    if bounce_rate > HIGH_BOUNCE_RATE {
        out.push(Suggestion::new(
            SuggestionKind::HighBounceRate,
            Priority::High,
            format!(
                "{:.1}% of emails bounced; clean up invalid addresses before the next campaign.",
                bounce_rate * 100.0
            ),
        ));
    }

    let recent_since = now - TimeDelta::days(IDLE_DAYS);
    for seg in segments.iter().filter(|s| s.customers > 0) {
        if seg.score < REENGAGE_BELOW {
            out.push(
                Suggestion::new(
                    SuggestionKind::ReengageSegment,
                    Priority::Low,
                    format!(
                        "Segment '{}' scores {:.1}/10; consider a re-engagement offer.",
                        seg.name, seg.score
                    ),
                )
                .for_tag(seg.tag_id),
            );
        } else if seg.score >= ENGAGED_FROM {
            let recently_targeted = all_campaigns
                .iter()
                .any(|c| c.created_at >= recent_since && c.target_tags.contains(&seg.tag_id));
            if !recently_targeted {
                out.push(
                    Suggestion::new(
                        SuggestionKind::EngagedSegmentIdle,
                        Priority::Low,
                        format!(
                            "Segment '{}' is highly engaged ({:.1}/10) \
                             but has not been targeted in {IDLE_DAYS} days.",
                            seg.name, seg.score
                        ),
                    )
                    .for_tag(seg.tag_id),
                );
            }
        }
    }

    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out
}
