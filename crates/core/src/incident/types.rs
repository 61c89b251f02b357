//! Incident status and bulk status command types.

use std::fmt;

use incident_shared::types::IncidentId;
use serde::{Deserialize, Serialize};

/// Incident workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Reported, not yet picked up.
    Open,
    /// Being worked on.
    InProgress,
    /// Fixed, awaiting confirmation.
    Resolved,
    /// Done.
    Closed,
}

impl IncidentStatus {
    /// Convert to database string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Parse from database string value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for a bulk status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusRequest {
    /// Incidents to update.
    pub ids: Vec<IncidentId>,
    /// Status to set.
    pub new_status: IncidentStatus,
}

/// Response of a bulk status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusResponse {
    /// Incidents whose status was set.
    pub updated: Vec<IncidentId>,
    /// Requested ids with no incident.
    pub not_found: Vec<IncidentId>,
    /// Key the response is stored under.
    pub idempotency_key: String,
}

/// Repository-level result of a bulk update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkUpdateOutcome {
    /// Incidents whose status was set.
    pub updated: Vec<IncidentId>,
    /// Requested ids with no incident.
    pub not_found: Vec<IncidentId>,
}
