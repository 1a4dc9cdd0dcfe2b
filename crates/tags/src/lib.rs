//! Tags and tag automation.
//!
//! Business rules for organizer-owned customer tags and the automation rules
//! that keep tag membership in sync with purchase behavior, implemented as
//! deterministic domain logic (no IO, no storage).
//!
//! Automation is additive: reconciliation only ever proposes new
//! assignments. Removing a tag from a customer is always an explicit action.

pub mod reconcile;
pub mod rule;
pub mod tag;

pub use reconcile::{plan_reconciliation, ReconcilePlan, SkippedRule};
pub use rule::{AutomationRule, RuleDefect};
pub use tag::{AssignmentSource, Tag, TagAssignment, TagColor, TagName};
