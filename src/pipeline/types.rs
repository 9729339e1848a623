//! Shared types for the ticket pipeline.

use serde::Serialize;

use crate::config::AgentSpec;
use crate::error::{Error, ExtractError, StepError};
use crate::extract::decision::DecisionData;

/// One successful extraction: the agent that produced it, the decision it
/// extracted, and a classification note filled in when required info is
/// missing. This is also the record shape the ban API receives.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedRecord {
    pub agent: AgentSpec,
    #[serde(rename = "data")]
    pub decision: DecisionData,
    #[serde(rename = "reason")]
    pub note: String,
}

impl ExtractedRecord {
    pub fn new(agent: AgentSpec, decision: DecisionData) -> Self {
        Self {
            agent,
            decision,
            note: String::new(),
        }
    }
}

/// One failed agent call. Never dropped silently: failures aggregate into
/// the run's recorded error.
#[derive(Debug)]
pub struct ExtractionFailure {
    pub agent: AgentSpec,
    pub cause: ExtractError,
}

impl std::fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "agent {}:{}: {}",
            self.agent.provider, self.agent.model, self.cause
        )
    }
}

/// Per-ticket outcome, built incrementally across the pipeline and handed
/// to the notifier exactly once, win or fail.
#[derive(Debug, Default)]
pub struct TicketOutcome {
    pub ticket_id: String,
    pub subject: String,
    pub banned: Vec<ExtractedRecord>,
    pub not_found: Vec<ExtractedRecord>,
    pub more_info: Vec<ExtractedRecord>,
    pub error: Option<StepError>,
}

impl TicketOutcome {
    pub fn new(ticket_id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// Record an error against the run. Only the first one is kept;
    /// later errors are logged at the call site and dropped here.
    pub fn record_error(&mut self, step: &'static str, source: impl Into<Error>) {
        if self.error.is_none() {
            self.error = Some(StepError {
                step,
                source: source.into(),
            });
        }
    }

    /// True when no bucket received any record.
    pub fn is_empty(&self) -> bool {
        self.banned.is_empty() && self.not_found.is_empty() && self.more_info.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_error_keeps_first() {
        let mut outcome = TicketOutcome::new("1", "subject");
        outcome.record_error("first step", ExtractError::EmptyResponse);
        outcome.record_error("second step", ExtractError::EmptyResponse);

        let err = outcome.error.unwrap();
        assert_eq!(err.step, "first step");
    }

    #[test]
    fn record_serializes_with_wire_names() {
        let record = ExtractedRecord::new(
            AgentSpec {
                provider: "openai".into(),
                model: "gpt-4o".into(),
            },
            DecisionData {
                username: "jdoe".into(),
                agency_name: "BKA".into(),
                ..DecisionData::default()
            },
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["agent"]["provider"], "openai");
        assert_eq!(value["data"]["username"], "jdoe");
        assert_eq!(value["data"]["agencyName"], "BKA");
        assert_eq!(value["reason"], "");
    }
}
