//! Shared types between the coordinator and its clients
//!
//! These types are used by both:
//! - The coordination engine and its document store (native Rust)
//! - Participant agents polling the study over HTTP
//!
//! Serializable with serde for JSON over HTTP and for storage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Study Record
// ============================================================================

/// Orchestration mode in which the coordinator owns participant instances.
pub const SETUP_WEBSITE: &str = "website";

/// Per-participant key holding the GCP project of the participant's instance.
pub const PARAM_GCP_PROJECT: &str = "GCP_PROJECT";

/// Per-participant key selecting delete (`"Yes"`) over stop when the protocol finishes.
pub const PARAM_DELETE_VM: &str = "DELETE_VM";

/// One study document.
///
/// Fields the coordinator does not interpret are kept in `extra` so that a
/// full read-modify-write never drops data written by other services.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StudyRecord {
    /// Canonical study title; the instance name is derived from it.
    #[serde(default)]
    pub title: String,

    /// `"website"` when instances are managed by the coordinator.
    #[serde(default)]
    pub setup_configuration: String,

    /// Ordered participants. The position is the participant's role and
    /// must never change for the lifetime of the study.
    #[serde(default)]
    pub participants: Vec<String>,

    /// participant → latest free-text status (last writer wins)
    #[serde(default)]
    pub status: BTreeMap<String, String>,

    /// participant → append-only phase log
    #[serde(default)]
    pub tasks: BTreeMap<String, Vec<String>>,

    /// Shared configuration keyed by parameter name.
    #[serde(default)]
    pub parameters: BTreeMap<String, Parameter>,

    /// participant → per-participant configuration
    #[serde(default)]
    pub personal_parameters: BTreeMap<String, BTreeMap<String, Parameter>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StudyRecord {
    /// Whether the coordinator is allowed to act on participant instances.
    pub fn is_website_managed(&self) -> bool {
        self.setup_configuration == SETUP_WEBSITE
    }

    /// Per-participant parameter lookup.
    pub fn personal_parameter(&self, participant: &str, name: &str) -> Option<&Parameter> {
        self.personal_parameters.get(participant)?.get(name)
    }
}

/// A configurable value with its human-readable description.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, description: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            value,
            extra: Map::new(),
        }
    }

    /// The value as text, if it is a non-empty string.
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_str().filter(|s| !s.is_empty())
    }
}

// ============================================================================
// API Bodies
// ============================================================================

/// Error body returned by every failing API call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsernameResponse {
    pub username: String,
}
