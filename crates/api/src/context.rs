use axum::http::HeaderMap;
use thiserror::Error;

use eventcrm_core::OrganizerId;

/// Header carrying the organizer a request acts for.
///
/// Authentication happens upstream; by the time a request reaches us the
/// header has been set by a trusted proxy.
pub const ORGANIZER_HEADER: &str = "x-organizer-id";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrganizerHeaderError {
    #[error("missing x-organizer-id header")]
    Missing,

    #[error("x-organizer-id header is not valid text")]
    NotText,

    #[error("x-organizer-id header is not an organizer id: {0}")]
    Invalid(String),
}

/// Organizer context for a request.
///
/// Immutable, and present on every organizer-scoped route.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OrganizerContext {
    organizer_id: OrganizerId,
}

impl OrganizerContext {
    pub fn new(organizer_id: OrganizerId) -> Self {
        Self { organizer_id }
    }

    pub fn organizer_id(&self) -> OrganizerId {
        self.organizer_id
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, OrganizerHeaderError> {
        let raw = headers
            .get(ORGANIZER_HEADER)
            .ok_or(OrganizerHeaderError::Missing)?
            .to_str()
            .map_err(|_| OrganizerHeaderError::NotText)?;

        let organizer_id = raw
            .parse::<OrganizerId>()
            .map_err(|e| OrganizerHeaderError::Invalid(e.to_string()))?;
        Ok(Self::new(organizer_id))
    }
}
