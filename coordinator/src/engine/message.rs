//! Inbound update wire format: `"<discriminator>::<key>=<value>"`.
//!
//! The discriminator is an arbitrary tag; only the presence of `::` matters.
//! The key decides the route: a `status` prefix goes to the status map, a
//! `task` prefix to the task log, anything else is a named parameter.

use super::CoordinationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Status(String),
    Task(String),
    Parameter { name: String, value: String },
}

impl Update {
    pub fn parse(message: &str) -> Result<Self, CoordinationError> {
        let (_, operator) = message.split_once("::").ok_or_else(|| {
            CoordinationError::MalformedMessage(format!("missing '::' separator in {message:?}"))
        })?;

        let (key, value) = operator.split_once('=').ok_or_else(|| {
            CoordinationError::MalformedMessage(format!("missing '=' in {operator:?}"))
        })?;

        if key.starts_with("status") {
            Ok(Update::Status(value.to_string()))
        } else if key.starts_with("task") {
            Ok(Update::Task(value.to_string()))
        } else if key.is_empty() {
            Err(CoordinationError::MalformedMessage(
                "empty parameter name".to_string(),
            ))
        } else {
            Ok(Update::Parameter {
                name: key.to_string(),
                value: value.to_string(),
            })
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Update::Status(_) => "status",
            Update::Task(_) => "task",
            Update::Parameter { .. } => "parameter",
        }
    }
}
