use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventcrm_core::{CustomerId, DomainError, DomainResult, OrganizerId, TagId};

use crate::rule::AutomationRule;

const MAX_NAME_LEN: usize = 50;

/// Tag display name. Trimmed, non-empty, at most 50 characters.
///
/// Uniqueness within an organizer is case-insensitive; use [`TagName::key`]
/// when comparing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagName(String);

impl TagName {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(DomainError::validation("tag name cannot be empty"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::validation(format!(
                "tag name cannot exceed {MAX_NAME_LEN} characters"
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalized key used for per-organizer uniqueness.
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl TryFrom<String> for TagName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TagName> for String {
    fn from(value: TagName) -> Self {
        value.0
    }
}

/// `#RRGGBB` color, stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagColor(String);

impl TagColor {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let raw = raw.trim();
        let valid = raw.len() == 7
            && raw.starts_with('#')
            && raw[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(DomainError::validation(format!(
                "tag color must be #RRGGBB, got '{raw}'"
            )));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TagColor {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TagColor> for String {
    fn from(value: TagColor) -> Self {
        value.0
    }
}

/// A customer tag owned by exactly one organizer.
///
/// A tag without a rule is manual-only: the automation engine never touches
/// its membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub organizer_id: OrganizerId,
    pub name: TagName,
    pub color: TagColor,
    pub rule: Option<AutomationRule>,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(
        id: TagId,
        organizer_id: OrganizerId,
        name: TagName,
        color: TagColor,
        rule: Option<AutomationRule>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            organizer_id,
            name,
            color,
            rule,
            created_at,
        }
    }

    pub fn is_automated(&self) -> bool {
        self.rule.is_some()
    }
}

/// How an assignment came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentSource {
    Manual,
    Automation,
}

/// Join of (tag, customer). The pair is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAssignment {
    pub tag_id: TagId,
    pub customer_id: CustomerId,
    pub source: AssignmentSource,
    pub created_at: DateTime<Utc>,
}
