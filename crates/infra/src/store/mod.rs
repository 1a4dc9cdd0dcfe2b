//! Organizer-isolated state.
//!
//! All stores are in-memory; the quota ledger is the only state with a
//! Postgres backend (see `quota::postgres`).

pub mod campaigns;
pub mod customers;
pub mod organizer_store;
pub mod tags;

pub use campaigns::{CampaignRecord, CampaignStore, InMemoryCampaignStore};
pub use customers::CustomerStore;
pub use organizer_store::{InMemoryOrganizerStore, OrganizerStore};
pub use tags::TagStore;
