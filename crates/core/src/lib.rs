//! `eventcrm-core`: shared building blocks for the CRM engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, channels and plan tiers, purchase records, the domain error
//! model and the aggregate traits used by stateful models such as campaigns.

pub mod aggregate;
pub mod channel;
pub mod error;
pub mod id;
pub mod purchase;

pub use aggregate::{execute, Aggregate, AggregateRoot, ExpectedVersion};
pub use channel::{Channel, PlanTier};
pub use error::{DomainError, DomainResult};
pub use id::{
    CampaignId, CategoryId, CouponId, CustomerId, DeliveryLogId, EventId, OpinionPollId,
    OrganizerId, TagId, TemplateId,
};
pub use purchase::{LifetimeTotals, Purchase};
