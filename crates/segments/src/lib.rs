//! Segment resolution: turning a selector into a frozen recipient set.
//!
//! Everything here is a pure function of the snapshots passed in. Callers
//! (the orchestrator, the preview endpoint) load customer snapshots and tag
//! memberships for one organizer and hand them over explicitly.

pub mod customer;
pub mod resolver;

pub use customer::CustomerSnapshot;
pub use resolver::{resolve, Recipient, SegmentSelector, TagMembers};
