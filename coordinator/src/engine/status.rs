//! Status Aggregator: latest free-text status per participant.
//!
//! The stored value is the raw string. [`StatusSignal`] is the typed view the
//! engine reasons about; the `"Finished protocol"` substring stays the wire
//! contract for termination.

use shared_types::StudyRecord;

use super::tasks::COMPLETED_SUFFIX;

pub const FINISHED_PROTOCOL: &str = "Finished protocol";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSignal<'a> {
    Empty,
    Started(&'a str),
    Completed(&'a str),
    /// The participant's protocol run is over.
    Finished,
}

impl<'a> StatusSignal<'a> {
    pub fn parse(status: &'a str) -> Self {
        let status = status.trim();
        if status.contains(FINISHED_PROTOCOL) {
            StatusSignal::Finished
        } else if status.is_empty() {
            StatusSignal::Empty
        } else if let Some(phase) = status.strip_suffix(COMPLETED_SUFFIX) {
            StatusSignal::Completed(phase)
        } else {
            StatusSignal::Started(status)
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusSignal::Finished)
    }
}

/// Record mutation used inside the status transaction.
pub fn record_status(record: &mut StudyRecord, participant: &str, status: &str) {
    record
        .status
        .insert(participant.to_string(), status.to_string());
}

/// Whether this status, as committed, authorizes tearing down the
/// participant's instance.
pub fn authorizes_teardown(record: &StudyRecord, status: &str) -> bool {
    StatusSignal::parse(status).is_terminal() && record.is_website_managed()
}
