//! Automation rule predicates.
//!
//! A rule is a conjunction of optional predicates. Record-level predicates
//! (event, category, purchase date) are checked per purchase; spend and ticket
//! thresholds are checked against the customer's lifetime totals with the
//! organizer. A customer matches when at least one purchase satisfies every
//! present predicate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use eventcrm_core::{CategoryId, EventId, LifetimeTotals, Purchase};

/// Predicate set attached to a tag. Absent predicates impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationRule {
    #[serde(default)]
    pub event_id: Option<EventId>,
    #[serde(default)]
    pub event_category_id: Option<CategoryId>,
    #[serde(default)]
    pub min_total_spent_cents: Option<i64>,
    #[serde(default)]
    pub min_ticket_count: Option<i64>,
    /// Inclusive lower bound on the purchase date (UTC).
    #[serde(default)]
    pub purchase_date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the purchase date (UTC).
    #[serde(default)]
    pub purchase_date_to: Option<NaiveDate>,
}

/// Why a rule can never match. Reported, never raised: a defective rule must
/// not block reconciliation of the organizer's other tags.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "defect", rename_all = "snake_case")]
pub enum RuleDefect {
    #[error("rule has no predicates")]
    NoPredicates,

    #[error("purchase date range is inverted ({from} > {to})")]
    InvertedDateRange { from: NaiveDate, to: NaiveDate },
}

impl AutomationRule {
    pub fn predicate_count(&self) -> usize {
        [
            self.event_id.is_some(),
            self.event_category_id.is_some(),
            self.min_total_spent_cents.is_some(),
            self.min_ticket_count.is_some(),
            self.purchase_date_from.is_some(),
            self.purchase_date_to.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    /// Structural defect that makes the rule match nothing, if any.
    pub fn defect(&self) -> Option<RuleDefect> {
        if self.predicate_count() == 0 {
            return Some(RuleDefect::NoPredicates);
        }
        if let (Some(from), Some(to)) = (self.purchase_date_from, self.purchase_date_to) {
            if from > to {
                return Some(RuleDefect::InvertedDateRange { from, to });
            }
        }
        None
    }

    /// Whether a customer with this purchase history satisfies the rule.
    ///
    /// Rules with zero predicates match nothing. References to events or
    /// categories the organizer does not have simply never match.
    pub fn matches(&self, history: &[Purchase]) -> bool {
        if self.defect().is_some() {
            return false;
        }

        let totals = LifetimeTotals::of(history);
        if !self.lifetime_thresholds_met(&totals) {
            return false;
        }

        history.iter().any(|p| self.record_matches(p))
    }

    fn lifetime_thresholds_met(&self, totals: &LifetimeTotals) -> bool {
        let spend_ok = self
            .min_total_spent_cents
            .is_none_or(|min| totals.spent_cents >= min);
        let tickets_ok = self
            .min_ticket_count
            .is_none_or(|min| totals.tickets >= min);
        spend_ok && tickets_ok
    }

    fn record_matches(&self, purchase: &Purchase) -> bool {
        let day = purchase.purchased_at.date_naive();

        self.event_id.is_none_or(|id| purchase.event_id == id)
            && self
                .event_category_id
                .is_none_or(|id| purchase.category_id == id)
            && self.purchase_date_from.is_none_or(|from| day >= from)
            && self.purchase_date_to.is_none_or(|to| day <= to)
    }
}
