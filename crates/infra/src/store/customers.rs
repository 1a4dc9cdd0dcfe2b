use chrono::{DateTime, Utc};

use eventcrm_core::{CustomerId, OrganizerId};
use eventcrm_segments::CustomerSnapshot;

use crate::error::StoreError;
use crate::store::organizer_store::{InMemoryOrganizerStore, OrganizerStore};

/// Customer snapshots, one per (organizer, customer).
#[derive(Debug, Default)]
pub struct CustomerStore {
    customers: InMemoryOrganizerStore<CustomerId, CustomerSnapshot>,
}

impl CustomerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace contact and consent details.
    ///
    /// The first-purchase date is derived from purchases and survives
    /// replacement: the earliest known date wins.
    pub fn upsert(&self, snapshot: CustomerSnapshot) -> Result<CustomerSnapshot, StoreError> {
        self.customers.upsert_with(
            snapshot.organizer_id,
            snapshot.id,
            snapshot,
            |existing, incoming| {
                if let Some(at) = existing.first_purchase_at {
                    incoming.note_purchase(at);
                }
            },
        )
    }

    pub fn get(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerSnapshot>, StoreError> {
        self.customers.get(organizer_id, &customer_id)
    }

    pub fn list(&self, organizer_id: OrganizerId) -> Result<Vec<CustomerSnapshot>, StoreError> {
        let mut out = self.customers.list(organizer_id)?;
        out.sort_by_key(|c| c.id);
        Ok(out)
    }

    pub fn note_purchase(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.customers
            .update(organizer_id, &customer_id, |c| c.note_purchase(at))?
            .ok_or(StoreError::NotFound("customer"))
    }
}
