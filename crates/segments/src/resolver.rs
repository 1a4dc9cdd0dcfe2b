use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use eventcrm_core::{Channel, CustomerId, OrganizerId, TagId};

use crate::customer::CustomerSnapshot;

/// Which customers a campaign targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tag_ids", rename_all = "snake_case")]
pub enum SegmentSelector {
    /// Every customer who ever purchased from the organizer.
    All,
    /// Union of the holders of any of these tags.
    Tags(BTreeSet<TagId>),
}

impl SegmentSelector {
    pub fn tags(ids: impl IntoIterator<Item = TagId>) -> Self {
        Self::Tags(ids.into_iter().collect())
    }

    pub fn tag_ids(&self) -> Option<&BTreeSet<TagId>> {
        match self {
            Self::All => None,
            Self::Tags(ids) => Some(ids),
        }
    }
}

/// Members of each tag, as loaded by the caller.
pub type TagMembers = BTreeMap<TagId, BTreeSet<CustomerId>>;

/// One resolved destination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Recipient {
    pub customer_id: CustomerId,
    /// Email address or push endpoint, depending on the channel.
    pub address: String,
}

/// Resolve `selector` into a recipient list.
///
/// The result is deduplicated and ordered by customer id, so resolving the
/// same inputs twice yields an identical list. Customers without consent (or
/// without a destination) for `channel` are dropped silently. Snapshots
/// belonging to another organizer are ignored.
pub fn resolve<'a>(
    organizer_id: OrganizerId,
    channel: Channel,
    selector: &SegmentSelector,
    customers: impl IntoIterator<Item = &'a CustomerSnapshot>,
    members: &TagMembers,
) -> Vec<Recipient> {
    let wanted: Option<BTreeSet<CustomerId>> = selector.tag_ids().map(|tag_ids| {
        tag_ids
            .iter()
            .filter_map(|tag| members.get(tag))
            .flatten()
            .copied()
            .collect()
    });

    let mut out: BTreeMap<CustomerId, String> = BTreeMap::new();
    for customer in customers {
        if customer.organizer_id != organizer_id {
            continue;
        }
        let selected = match &wanted {
            None => customer.has_purchased(),
            Some(ids) => ids.contains(&customer.id),
        };
        if !selected {
            continue;
        }
        if let Some(address) = customer.address_for(channel) {
            out.entry(customer.id).or_insert_with(|| address.to_string());
        }
    }

    out.into_iter()
        .map(|(customer_id, address)| Recipient {
            customer_id,
            address,
        })
        .collect()
}
