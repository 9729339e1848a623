//! Reply templates for the three outcome buckets.
//!
//! Template text tracks the Annex wording of Regulation (EU) 2021/784;
//! parameters fall back to neutral values so a reply never renders with an
//! empty slot.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::DeliveryError;
use crate::extract::decision::DecisionData;
use crate::pipeline::types::ExtractedRecord;

/// Default missing-info line when classification produced no reason.
const DEFAULT_MISSING_INFO: &str =
    "Additional identifiers required under Article 3(4) to locate the content.";

/// Named reply template, one per outcome bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTemplate {
    MoreInfoRequired,
    UserNotFound,
    UserBanned,
}

impl ReplyTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MoreInfoRequired => "more_info_required",
            Self::UserNotFound => "user_not_found",
            Self::UserBanned => "user_banned",
        }
    }
}

impl fmt::Display for ReplyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyTemplate {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "more_info_required" => Ok(Self::MoreInfoRequired),
            "user_not_found" => Ok(Self::UserNotFound),
            "user_banned" => Ok(Self::UserBanned),
            other => Err(DeliveryError::InvalidTemplate(other.to_string())),
        }
    }
}

/// Render the ticket-specific reply for one record.
///
/// `now` is only used by the `user_banned` template (action timestamp);
/// callers pass `Utc::now()` in production and a fixed instant in tests.
pub fn build_message(
    template: ReplyTemplate,
    record: &ExtractedRecord,
    now: DateTime<Utc>,
) -> String {
    let agency = fallback(&record.decision.agency_name, "competent authority");
    let reference = fallback(&record.decision.reference_number, "N/A");

    match template {
        ReplyTemplate::MoreInfoRequired => {
            let order_date = fallback(&record.decision.date, "not provided");
            let missing = fallback(record.note.trim(), DEFAULT_MISSING_INFO);
            format!(
                "Subject: TCO removal order – clarification required (Ref: {reference})\n\
                 \n\
                 Hello {agency},\n\
                 \n\
                 We received your removal order under Regulation (EU) 2021/784 dated {order_date}. \
                 To comply with Article 3, we need more detail before the one-hour deadline can run. \
                 Missing information: {missing}.\n\
                 \n\
                 Please provide:\n\
                 - the exact URL(s) / message ID(s) or copies of the content;\n\
                 - the relevant account identifier(s) (username, email, user ID) or profile link;\n\
                 - the signed removal order (Annex I) including statement of reasons and legal basis;\n\
                 - the order's reference number and contact for follow-up;\n\
                 - whether confidentiality under Article 11(3) applies.\n\
                 \n\
                 Under Article 3(8), the one-hour deadline resumes once we receive the clarification. \
                 We will process the order immediately and confirm via Annex II if requested.\n"
            )
        }
        ReplyTemplate::UserNotFound => {
            let identifiers = format_identifiers(&record.decision);
            format!(
                "Subject: TCO removal order – content not located (Ref: {reference})\n\
                 \n\
                 Hello {agency},\n\
                 \n\
                 We tried to act on your removal order under Article 3 but could not locate the \
                 account/content using the provided identifiers ({identifiers}). To resume the \
                 one-hour deadline (Article 3(8)), please send:\n\
                 \n\
                 - exact URL(s) or message ID(s);\n\
                 - current profile link or user ID and any recent username/email changes;\n\
                 - screenshot or copy of the material with time/timezone captured;\n\
                 - whether confidentiality under Article 11(3) applies.\n\
                 \n\
                 No further action has been taken until we receive the above.\n"
            )
        }
        ReplyTemplate::UserBanned => {
            let identifiers = format_identifiers(&record.decision);
            let action_time = now.to_rfc3339_opts(SecondsFormat::Secs, true);
            format!(
                "Subject: TCO removal order – action completed (Ref: {reference})\n\
                 \n\
                 Hello {agency},\n\
                 \n\
                 We executed the removal order under Article 3 of Regulation (EU) 2021/784. Access \
                 to the reported account/content ({identifiers}) has been disabled across our \
                 service as of {action_time} UTC.\n\
                 \n\
                 We have preserved the removed content and related data for six months in line with \
                 Article 6 and can extend retention on request for ongoing proceedings. If you need \
                 confirmation in the Annex II format, please let us know.\n\
                 \n\
                 Thank you.\n"
            )
        }
    }
}

/// Render the identity the order referenced: present parts only,
/// `" / "`-joined, with a fixed fallback when neither is set.
pub fn format_identifiers(decision: &DecisionData) -> String {
    let mut parts = Vec::new();
    if !decision.username.is_empty() {
        parts.push(format!("username: {}", decision.username));
    }
    if !decision.email.is_empty() {
        parts.push(format!("email: {}", decision.email));
    }
    if parts.is_empty() {
        return "no user identifier provided".to_string();
    }
    parts.join(" / ")
}

fn fallback<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() { default } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentSpec;
    use chrono::TimeZone;

    fn record(username: &str, email: &str, agency: &str, reference: &str) -> ExtractedRecord {
        ExtractedRecord::new(
            AgentSpec {
                provider: "openai".into(),
                model: "gpt-4o".into(),
            },
            DecisionData {
                username: username.into(),
                email: email.into(),
                agency_name: agency.into(),
                reference_number: reference.into(),
                date: "2025-01-08".into(),
                ticket_id: "42".into(),
            },
        )
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn template_names_round_trip() {
        for name in ["more_info_required", "user_not_found", "user_banned"] {
            let template: ReplyTemplate = name.parse().unwrap();
            assert_eq!(template.as_str(), name);
        }
    }

    #[test]
    fn unknown_template_name_is_invalid() {
        let err = "user_suspended".parse::<ReplyTemplate>().unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidTemplate(ref n) if n == "user_suspended"));
    }

    #[test]
    fn more_info_message_includes_reason_and_date() {
        let mut rec = record("", "", "BKA", "REF-9");
        rec.note = "email and username are required".into();

        let message = build_message(ReplyTemplate::MoreInfoRequired, &rec, fixed_now());
        assert!(message.contains("Ref: REF-9"));
        assert!(message.contains("Hello BKA"));
        assert!(message.contains("dated 2025-01-08"));
        assert!(message.contains("Missing information: email and username are required."));
    }

    #[test]
    fn more_info_falls_back_when_reason_empty() {
        let message = build_message(
            ReplyTemplate::MoreInfoRequired,
            &record("", "", "BKA", "REF-9"),
            fixed_now(),
        );
        assert!(message.contains("Article 3(4)"));
    }

    #[test]
    fn empty_agency_and_reference_use_fallbacks() {
        let message = build_message(
            ReplyTemplate::UserNotFound,
            &record("jdoe", "", "", ""),
            fixed_now(),
        );
        assert!(message.contains("Ref: N/A"));
        assert!(message.contains("Hello competent authority"));
    }

    #[test]
    fn banned_message_carries_rfc3339_timestamp() {
        let message = build_message(
            ReplyTemplate::UserBanned,
            &record("jdoe", "j@x.com", "BKA", "R1"),
            fixed_now(),
        );
        assert!(message.contains("as of 2025-06-01T12:30:00Z UTC"));
        assert!(message.contains("username: jdoe / email: j@x.com"));
    }

    #[test]
    fn identifiers_render_present_parts_only() {
        assert_eq!(
            format_identifiers(&record("jdoe", "", "a", "r").decision),
            "username: jdoe"
        );
        assert_eq!(
            format_identifiers(&record("", "j@x.com", "a", "r").decision),
            "email: j@x.com"
        );
        assert_eq!(
            format_identifiers(&record("", "", "a", "r").decision),
            "no user identifier provided"
        );
    }
}
