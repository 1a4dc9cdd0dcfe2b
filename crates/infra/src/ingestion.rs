//! Customer and purchase ingestion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use eventcrm_core::{CustomerId, DomainError, OrganizerId, Purchase};
use eventcrm_segments::CustomerSnapshot;

use crate::collaborators::PurchaseSink;
use crate::error::ServiceError;
use crate::reconciler::{ReconcileReport, TagReconciler};
use crate::store::CustomerStore;

#[derive(Clone)]
pub struct CustomerService {
    customers: Arc<CustomerStore>,
    purchases: Arc<dyn PurchaseSink>,
    reconciler: TagReconciler,
}

impl CustomerService {
    pub fn new(
        customers: Arc<CustomerStore>,
        purchases: Arc<dyn PurchaseSink>,
        reconciler: TagReconciler,
    ) -> Self {
        Self {
            customers,
            purchases,
            reconciler,
        }
    }

    /// Insert or replace a customer's contact and consent details.
    ///
    /// The snapshot is always stored under `organizer_id`, whatever it says.
    pub fn upsert_customer(
        &self,
        organizer_id: OrganizerId,
        mut snapshot: CustomerSnapshot,
    ) -> Result<CustomerSnapshot, ServiceError> {
        snapshot.organizer_id = organizer_id;
        Ok(self.customers.upsert(snapshot)?)
    }

    pub fn customer(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
    ) -> Result<CustomerSnapshot, ServiceError> {
        self.customers
            .get(organizer_id, customer_id)?
            .ok_or_else(|| DomainError::not_found().into())
    }

    /// Record a purchase and bring the customer's automated tags up to date.
    pub fn record_purchase(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
        purchase: Purchase,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, ServiceError> {
        self.customer(organizer_id, customer_id)?;

        let first_purchase = purchase.is_sale().then_some(purchase.purchased_at);
        self.purchases.record(organizer_id, customer_id, purchase)?;
        if let Some(at) = first_purchase {
            self.customers.note_purchase(organizer_id, customer_id, at)?;
        }
        debug!(organizer_id = %organizer_id, customer_id = %customer_id, "purchase recorded");

        Ok(self.reconciler.reconcile_customer(organizer_id, customer_id, now)?)
    }

    pub fn reconcile_customer(
        &self,
        organizer_id: OrganizerId,
        customer_id: CustomerId,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, ServiceError> {
        self.customer(organizer_id, customer_id)?;
        Ok(self.reconciler.reconcile_customer(organizer_id, customer_id, now)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use eventcrm_core::{CategoryId, EventId, TagId};
    use eventcrm_tags::{AutomationRule, Tag, TagColor, TagName};

    use crate::collaborators::InMemoryPurchaseHistory;
    use crate::store::TagStore;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 20, 20, 0, 0).unwrap()
    }

    fn purchase(event: EventId, at: DateTime<Utc>) -> Purchase {
        Purchase {
            event_id: event,
            category_id: CategoryId::new(),
            amount_cents: 4200,
            ticket_count: 1,
            purchased_at: at,
        }
    }

    fn setup() -> (CustomerService, Arc<TagStore>) {
        let tags = Arc::new(TagStore::new());
        let customers = Arc::new(CustomerStore::new());
        let history = Arc::new(InMemoryPurchaseHistory::new());
        let reconciler = TagReconciler::new(tags.clone(), customers.clone(), history.clone());
        (CustomerService::new(customers, history, reconciler), tags)
    }

    #[test]
    fn upsert_pins_the_organizer() {
        let (svc, _) = setup();
        let org = OrganizerId::new();
        let snapshot = CustomerSnapshot::new(CustomerId::new(), OrganizerId::new());

        let stored = svc.upsert_customer(org, snapshot).unwrap();

        assert_eq!(stored.organizer_id, org);
        assert!(svc.customer(org, stored.id).is_ok());
    }

    #[test]
    fn purchase_sets_first_purchase_date_and_reconciles() {
        let (svc, tags) = setup();
        let org = OrganizerId::new();
        let event = EventId::new();
        let tag = Tag::new(
            TagId::new(),
            org,
            TagName::parse("Went to the show").unwrap(),
            TagColor::parse("#123456").unwrap(),
            Some(AutomationRule { event_id: Some(event), ..Default::default() }),
            test_time(),
        );
        tags.put_tag(tag.clone()).unwrap();
        let c = svc
            .upsert_customer(org, CustomerSnapshot::new(CustomerId::new(), org))
            .unwrap();

        let earlier = test_time() - TimeDelta::days(40);
        let report = svc
            .record_purchase(org, c.id, purchase(event, earlier), test_time())
            .unwrap();
        svc.record_purchase(org, c.id, purchase(EventId::new(), test_time()), test_time())
            .unwrap();

        assert!(report.added.contains(&tag.id));
        assert_eq!(svc.customer(org, c.id).unwrap().first_purchase_at, Some(earlier));
    }

    #[test]
    fn refund_does_not_count_as_first_purchase() {
        let (svc, _) = setup();
        let org = OrganizerId::new();
        let c = svc
            .upsert_customer(org, CustomerSnapshot::new(CustomerId::new(), org))
            .unwrap();
        let refund = Purchase {
            amount_cents: -4200,
            ticket_count: -1,
            ..purchase(EventId::new(), test_time() - TimeDelta::days(10))
        };

        svc.record_purchase(org, c.id, refund, test_time()).unwrap();
        assert_eq!(svc.customer(org, c.id).unwrap().first_purchase_at, None);

        svc.record_purchase(org, c.id, purchase(EventId::new(), test_time()), test_time())
            .unwrap();
        assert_eq!(svc.customer(org, c.id).unwrap().first_purchase_at, Some(test_time()));
    }

    #[test]
    fn purchase_for_unknown_customer_is_not_found() {
        let (svc, _) = setup();
        let err = svc
            .record_purchase(
                OrganizerId::new(),
                CustomerId::new(),
                purchase(EventId::new(), test_time()),
                test_time(),
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::NotFound)));
    }
}
