//! Record classification: has required info vs needs more info.

use crate::extract::decision::DecisionData;
use crate::pipeline::types::ExtractedRecord;

/// Check whether a decision carries everything needed to attempt a ban.
///
/// Returns `None` when ready, or the reason for the FIRST failing condition:
/// identity beats agency beats reference number.
pub fn check_required_info(decision: &DecisionData) -> Option<&'static str> {
    if decision.email.is_empty() && decision.username.is_empty() {
        return Some("email and username are required");
    }
    if decision.agency_name.is_empty() {
        return Some("agencyName is required");
    }
    if decision.reference_number.is_empty() {
        return Some("referenceNumber is required");
    }
    None
}

/// Split records into (ready, more-info) buckets, preserving input order.
///
/// Records missing required info get their `note` set to the reason. Pure
/// and total: every input record lands in exactly one bucket.
pub fn partition_records(
    records: Vec<ExtractedRecord>,
) -> (Vec<ExtractedRecord>, Vec<ExtractedRecord>) {
    let mut ready = Vec::new();
    let mut more_info = Vec::new();

    for mut record in records {
        match check_required_info(&record.decision) {
            None => ready.push(record),
            Some(reason) => {
                record.note = reason.to_string();
                more_info.push(record);
            }
        }
    }

    (ready, more_info)
}
