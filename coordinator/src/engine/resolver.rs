//! Parameter Resolver: role lookup, GCP context, and parameter writes.
//!
//! Roles are recomputed from `participants` on every call; nothing here is
//! cached between requests.

use std::fmt;

use serde_json::Value;
use shared_types::{StudyRecord, PARAM_DELETE_VM, PARAM_GCP_PROJECT};

use super::CoordinationError;

/// A participant's 0-based position in the study's participant list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Role(pub usize);

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn role_of(record: &StudyRecord, participant: &str) -> Option<Role> {
    record
        .participants
        .iter()
        .position(|p| p == participant)
        .map(Role)
}

/// What the engine knows about a participant before dispatching an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantContext {
    pub participant: String,
    pub role: Role,
    pub gcp_project: Option<String>,
    pub delete_on_finish: bool,
}

/// Everything needed to address the participant's instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpContext {
    pub project: String,
    pub role: Role,
    pub delete_on_finish: bool,
}

impl ParticipantContext {
    pub fn resolve(
        record: &StudyRecord,
        study_id: &str,
        participant: &str,
    ) -> Result<Self, CoordinationError> {
        let role =
            role_of(record, participant).ok_or_else(|| CoordinationError::UnknownParticipant {
                study_id: study_id.to_string(),
                participant: participant.to_string(),
            })?;

        let gcp_project = record
            .personal_parameter(participant, PARAM_GCP_PROJECT)
            .and_then(|p| p.value_str())
            .map(str::to_string);

        let delete_on_finish = record
            .personal_parameter(participant, PARAM_DELETE_VM)
            .map(|p| match &p.value {
                Value::String(s) => s.eq_ignore_ascii_case("yes"),
                Value::Bool(b) => *b,
                _ => false,
            })
            .unwrap_or(false);

        Ok(Self {
            participant: participant.to_string(),
            role,
            gcp_project,
            delete_on_finish,
        })
    }

    pub fn gcp(&self) -> Result<GcpContext, CoordinationError> {
        let project =
            self.gcp_project
                .clone()
                .ok_or_else(|| CoordinationError::MissingConfiguration {
                    participant: self.participant.clone(),
                    key: PARAM_GCP_PROJECT,
                })?;
        Ok(GcpContext {
            project,
            role: self.role,
            delete_on_finish: self.delete_on_finish,
        })
    }
}

/// Where a parameter write landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterScope {
    Personal,
    Shared,
}

/// Record mutation for a named parameter write.
///
/// Personal keys shadow shared ones. Unknown participants and unknown names
/// are rejected without touching the record.
pub fn apply_parameter(
    record: &mut StudyRecord,
    study_id: &str,
    participant: &str,
    name: &str,
    raw: &str,
) -> Result<ParameterScope, CoordinationError> {
    if role_of(record, participant).is_none() {
        return Err(CoordinationError::UnknownParticipant {
            study_id: study_id.to_string(),
            participant: participant.to_string(),
        });
    }

    if let Some(param) = record
        .personal_parameters
        .get_mut(participant)
        .and_then(|params| params.get_mut(name))
    {
        param.value = coerce_value(&param.value, raw);
        return Ok(ParameterScope::Personal);
    }

    if let Some(param) = record.parameters.get_mut(name) {
        param.value = coerce_value(&param.value, raw);
        return Ok(ParameterScope::Shared);
    }

    Err(CoordinationError::UnknownParameter {
        study_id: study_id.to_string(),
        name: name.to_string(),
    })
}

/// Keep the stored JSON type when the text parses as that type; otherwise
/// store the text as-is.
fn coerce_value(current: &Value, raw: &str) -> Value {
    let trimmed = raw.trim();
    match current {
        Value::Number(_) => {
            if let Ok(i) = trimmed.parse::<i64>() {
                return Value::from(i);
            }
            if let Some(n) = trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                return Value::Number(n);
            }
        }
        Value::Bool(_) => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => return Value::Bool(true),
            "false" | "0" => return Value::Bool(false),
            _ => {}
        },
        _ => {}
    }
    Value::String(raw.to_string())
}
