//! Read-side report aggregation.
//!
//! Everything is computed on demand from a [`ReportInput`] snapshot (campaigns,
//! delivery rows, purchase histories, tag memberships). Nothing here writes
//! back; building the same report twice from the same input gives the same
//! result.

pub mod engagement;
pub mod filters;
pub mod funnel;
pub mod input;
pub mod overview;
pub mod report;
pub mod series;
pub mod suggestions;

pub use engagement::{engagement_score, SegmentEngagement};
pub use filters::{Benchmarks, ReportFilters};
pub use funnel::{CampaignFunnel, Funnel};
pub use input::{CampaignView, ReportInput, TagView};
pub use overview::Overview;
pub use report::{build_report, Report};
pub use series::{MonthlyPoint, WeeklyPoint};
pub use suggestions::{Priority, Suggestion, SuggestionKind};
