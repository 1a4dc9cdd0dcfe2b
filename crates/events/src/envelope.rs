use serde::{Deserialize, Serialize};
use uuid::Uuid;

use eventcrm_core::OrganizerId;

/// Envelope for an event, carrying organizer and stream metadata.
///
/// - `organizer_id` is the isolation boundary: consumers never act on an
///   envelope for an organizer they were not asked to serve.
/// - `sequence_number` increases monotonically per stream (one stream per
///   campaign), so consumers can drop duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    organizer_id: OrganizerId,

    stream_id: Uuid,
    stream_type: String,

    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        organizer_id: OrganizerId,
        stream_id: Uuid,
        stream_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            organizer_id,
            stream_id,
            stream_type: stream_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn organizer_id(&self) -> OrganizerId {
        self.organizer_id
    }

    pub fn stream_id(&self) -> Uuid {
        self.stream_id
    }

    pub fn stream_type(&self) -> &str {
        &self.stream_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
