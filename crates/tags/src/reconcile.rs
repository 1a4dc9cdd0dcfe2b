//! Reconciliation planning: which automated tags a customer should gain.

use std::collections::BTreeSet;

use serde::Serialize;

use eventcrm_core::{OrganizerId, Purchase, TagId};

use crate::rule::RuleDefect;
use crate::tag::Tag;

/// An automated tag that was not evaluated because its rule can never match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRule {
    pub tag_id: TagId,
    pub defect: RuleDefect,
}

/// Outcome of evaluating an organizer's automated tags for one customer.
///
/// `to_add` holds only tags the customer should have but does not; there is
/// no removal list. Membership shrinks only through explicit removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    pub desired: BTreeSet<TagId>,
    pub to_add: BTreeSet<TagId>,
    pub skipped: Vec<SkippedRule>,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty()
    }
}

/// Compute the reconciliation plan for a single customer.
///
/// - `tags`: the organizer's tags; manual-only tags and tags belonging to
///   other organizers are ignored.
/// - `history`: the customer's purchases with this organizer.
/// - `current`: tags the customer currently holds (manual or automated).
pub fn plan_reconciliation<'a>(
    organizer_id: OrganizerId,
    tags: impl IntoIterator<Item = &'a Tag>,
    history: &[Purchase],
    current: &BTreeSet<TagId>,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for tag in tags {
        if tag.organizer_id != organizer_id {
            continue;
        }
        let Some(rule) = &tag.rule else {
            continue;
        };

        if let Some(defect) = rule.defect() {
            plan.skipped.push(SkippedRule {
                tag_id: tag.id,
                defect,
            });
            continue;
        }

        if rule.matches(history) {
            plan.desired.insert(tag.id);
        }
    }

    plan.to_add = plan.desired.difference(current).copied().collect();
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::AutomationRule;
    use crate::tag::{TagColor, TagName};
    use chrono::{DateTime, TimeZone, Utc};
    use eventcrm_core::{CategoryId, EventId};
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn tag(organizer_id: OrganizerId, name: &str, rule: Option<AutomationRule>) -> Tag {
        Tag::new(
            TagId::new(),
            organizer_id,
            TagName::parse(name).unwrap(),
            TagColor::parse("#112233").unwrap(),
            rule,
            test_time(),
        )
    }

    fn spend_rule(min: i64) -> AutomationRule {
        AutomationRule {
            min_total_spent_cents: Some(min),
            ..Default::default()
        }
    }

    fn purchase(amount: i64) -> Purchase {
        Purchase {
            event_id: EventId::new(),
            category_id: CategoryId::new(),
            amount_cents: amount,
            ticket_count: 1,
            purchased_at: test_time(),
        }
    }

    #[test]
    fn vip_rule_is_added_then_kept_after_refund() {
        let org = OrganizerId::new();
        let vip = tag(org, "VIP", Some(spend_rule(10_000)));
        let tags = vec![vip.clone()];

        let history = vec![purchase(10_000)];
        let plan = plan_reconciliation(org, &tags, &history, &BTreeSet::new());
        assert_eq!(plan.to_add, BTreeSet::from([vip.id]));

        // Refund: spend drops to 0. Customer already holds VIP.
        let current = BTreeSet::from([vip.id]);
        let plan = plan_reconciliation(org, &tags, &[], &current);
        assert!(plan.desired.is_empty());
        assert!(plan.is_noop());
    }

    #[test]
    fn manual_and_foreign_tags_are_ignored() {
        let org = OrganizerId::new();
        let manual = tag(org, "Press", None);
        let foreign = tag(OrganizerId::new(), "Foreign", Some(spend_rule(1)));
        let plan =
            plan_reconciliation(org, [&manual, &foreign], &[purchase(500)], &BTreeSet::new());

        assert!(plan.desired.is_empty());
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn defective_rules_are_reported_without_blocking_others() {
        let org = OrganizerId::new();
        let empty = tag(org, "Everyone?", Some(AutomationRule::default()));
        let ok = tag(org, "Buyers", Some(spend_rule(1)));

        let plan = plan_reconciliation(org, [&empty, &ok], &[purchase(10)], &BTreeSet::new());

        assert_eq!(plan.to_add, BTreeSet::from([ok.id]));
        assert_eq!(
            plan.skipped,
            vec![SkippedRule {
                tag_id: empty.id,
                defect: RuleDefect::NoPredicates
            }]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Applying a plan and planning again yields nothing new.
        #[test]
        fn reconcile_is_idempotent(
            amounts in prop::collection::vec(-5_000i64..50_000i64, 0..8),
            thresholds in prop::collection::vec(0i64..100_000i64, 1..6),
        ) {
            let org = OrganizerId::new();
            let tags: Vec<Tag> = thresholds
                .iter()
                .enumerate()
                .map(|(i, min)| tag(org, &format!("tier-{i}"), Some(spend_rule(*min))))
                .collect();
            let history: Vec<Purchase> = amounts.into_iter().map(purchase).collect();

            let mut current = BTreeSet::new();
            let first = plan_reconciliation(org, &tags, &history, &current);
            current.extend(first.to_add.iter().copied());

            let second = plan_reconciliation(org, &tags, &history, &current);
            prop_assert!(second.is_noop());
            prop_assert_eq!(first.desired, second.desired);
        }

        /// A rule without predicates never assigns its tag.
        #[test]
        fn zero_predicate_rule_assigns_nobody(
            amounts in prop::collection::vec(0i64..1_000_000i64, 0..10),
        ) {
            let org = OrganizerId::new();
            let everyone = tag(org, "Everyone", Some(AutomationRule::default()));
            let history: Vec<Purchase> = amounts.into_iter().map(purchase).collect();

            let plan = plan_reconciliation(org, [&everyone], &history, &BTreeSet::new());
            prop_assert!(plan.desired.is_empty());
            prop_assert!(plan.to_add.is_empty());
        }
    }
}
