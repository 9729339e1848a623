//! Decision payload parsing and validation.
//!
//! Extractors return free-form text that should contain a JSON object with
//! the five fields a reviewer needs. The text may be wrapped in markdown
//! code fences, which are stripped before parsing. Validation reports every
//! missing field in one error, not just the first.

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// The structured decision extracted from a removal-order document.
///
/// `ticket_id` is not part of the extraction schema; the pipeline back-fills
/// it when the extractor leaves it empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecisionData {
    pub username: String,
    pub email: String,
    pub agency_name: String,
    pub reference_number: String,
    pub date: String,
    pub ticket_id: String,
}

/// Strip leading/trailing markdown fence markers around a JSON payload.
fn strip_fences(raw: &str) -> &str {
    let s = raw.trim();
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s)
}

/// Parse raw extractor output into a validated [`DecisionData`].
///
/// Required fields are checked in fixed order (username, email, agencyName,
/// referenceNumber, date) and every missing one is listed in the error.
pub fn parse_decision(raw: &str) -> Result<DecisionData, ExtractError> {
    let clean = strip_fences(raw);

    let decision: DecisionData =
        serde_json::from_str(clean).map_err(|e| ExtractError::MalformedResponse {
            reason: e.to_string(),
            text: clean.to_string(),
        })?;

    let mut missing = Vec::new();
    if decision.username.is_empty() {
        missing.push("missing username");
    }
    if decision.email.is_empty() {
        missing.push("missing email");
    }
    if decision.agency_name.is_empty() {
        missing.push("missing agencyName");
    }
    if decision.reference_number.is_empty() {
        missing.push("missing referenceNumber");
    }
    if decision.date.is_empty() {
        missing.push("missing date");
    }

    if !missing.is_empty() {
        return Err(ExtractError::InvalidDecision(missing.join(", ")));
    }

    Ok(decision)
}
