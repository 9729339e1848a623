//! Reply and tag delivery for one outcome bucket.
//!
//! Replies stop at the first delivery error; earlier replies are not rolled
//! back. Tagging is best-effort: failures are logged and the batch keeps
//! going.

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::DeliveryError;
use crate::messages::{ReplyTemplate, build_message};
use crate::pipeline::types::ExtractedRecord;
use crate::zendesk::TicketGateway;

/// Stable tag marking every ticket the agent touched.
pub const AGENT_TAG: &str = "tco-vo";
pub const TAG_BANNED: &str = "tco-vo-decision-banned";
pub const TAG_NOT_FOUND: &str = "tco-vo-decision-not-found";
pub const TAG_MORE_INFO: &str = "tco-vo-decision-more-info";

/// Deliver one templated reply per record, in list order.
///
/// The first delivery error stops the remainder of the bucket and is
/// returned to the caller.
pub async fn reply_to_bucket(
    gateway: &dyn TicketGateway,
    records: &[ExtractedRecord],
    template: ReplyTemplate,
) -> Result<(), DeliveryError> {
    for record in records {
        let message = build_message(template, record, Utc::now());
        gateway
            .reply(&record.decision.ticket_id, &message)
            .await
            .map_err(|source| DeliveryError::Reply {
                ticket_id: record.decision.ticket_id.clone(),
                source,
            })?;
    }
    Ok(())
}

/// Add the stable agent tag plus one decision tag to each record's ticket.
///
/// Records without a ticket id are skipped and logged; individual tag
/// failures are logged and never abort the batch.
pub async fn tag_bucket(
    gateway: &dyn TicketGateway,
    records: &[ExtractedRecord],
    decision_tag: &str,
) {
    for record in records {
        let ticket_id = &record.decision.ticket_id;
        if ticket_id.is_empty() {
            warn!(
                decision_tag,
                username = %record.decision.username,
                "skipping tag because ticket id is empty"
            );
            continue;
        }

        let tags = vec![AGENT_TAG.to_string(), decision_tag.to_string()];
        match gateway.add_tags(ticket_id, &tags).await {
            Ok(()) => debug!(ticket_id, ?tags, "tagged ticket"),
            Err(e) => warn!(ticket_id, error = %e, "failed to tag ticket"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::AgentSpec;
    use crate::error::TicketError;
    use crate::extract::decision::DecisionData;
    use crate::zendesk::Ticket;

    /// Gateway that records reply/tag calls and fails on request.
    #[derive(Default)]
    struct RecordingGateway {
        replies: Mutex<Vec<String>>,
        tags: Mutex<Vec<(String, Vec<String>)>>,
        fail_reply_to: Option<String>,
        fail_tag_to: Option<String>,
    }

    #[async_trait]
    impl TicketGateway for RecordingGateway {
        async fn fetch_ticket(&self, _id: &str) -> Result<Ticket, TicketError> {
            unimplemented!("not used in dispatch tests")
        }
        async fn fetch_tickets(&self, _ids: &[String]) -> Result<Vec<Ticket>, TicketError> {
            unimplemented!("not used in dispatch tests")
        }
        async fn get_attachments(&self, _id: &str) -> Result<Vec<PathBuf>, TicketError> {
            unimplemented!("not used in dispatch tests")
        }

        async fn reply(&self, ticket_id: &str, _message: &str) -> Result<(), TicketError> {
            self.replies.lock().unwrap().push(ticket_id.to_string());
            if self.fail_reply_to.as_deref() == Some(ticket_id) {
                return Err(TicketError::Api {
                    context: format!("adding comment to ticket {ticket_id}"),
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(())
        }

        async fn add_tags(&self, ticket_id: &str, tags: &[String]) -> Result<(), TicketError> {
            self.tags
                .lock()
                .unwrap()
                .push((ticket_id.to_string(), tags.to_vec()));
            if self.fail_tag_to.as_deref() == Some(ticket_id) {
                return Err(TicketError::Api {
                    context: format!("tagging ticket {ticket_id}"),
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(())
        }
    }

    fn record(ticket_id: &str) -> ExtractedRecord {
        ExtractedRecord::new(
            AgentSpec {
                provider: "openai".into(),
                model: "gpt-4o".into(),
            },
            DecisionData {
                username: "jdoe".into(),
                email: "j@x.com".into(),
                agency_name: "BKA".into(),
                reference_number: "R1".into(),
                date: "2025-01-01".into(),
                ticket_id: ticket_id.into(),
            },
        )
    }

    #[tokio::test]
    async fn second_delivery_failure_stops_the_bucket() {
        let gateway = RecordingGateway {
            fail_reply_to: Some("t2".into()),
            ..RecordingGateway::default()
        };
        let records = vec![record("t1"), record("t2"), record("t3")];

        let err = reply_to_bucket(&gateway, &records, ReplyTemplate::UserBanned)
            .await
            .unwrap_err();

        // Exactly two attempts: the third is never made.
        assert_eq!(*gateway.replies.lock().unwrap(), vec!["t1", "t2"]);
        assert!(matches!(err, DeliveryError::Reply { ref ticket_id, .. } if ticket_id == "t2"));
    }

    #[tokio::test]
    async fn replies_follow_bucket_order() {
        let gateway = RecordingGateway::default();
        let records = vec![record("t3"), record("t1"), record("t2")];

        reply_to_bucket(&gateway, &records, ReplyTemplate::MoreInfoRequired)
            .await
            .unwrap();
        assert_eq!(*gateway.replies.lock().unwrap(), vec!["t3", "t1", "t2"]);
    }

    #[tokio::test]
    async fn tagging_skips_records_without_ticket_id() {
        let gateway = RecordingGateway::default();
        let records = vec![record(""), record("t1")];

        tag_bucket(&gateway, &records, TAG_MORE_INFO).await;

        let tags = gateway.tags.lock().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].0, "t1");
        assert_eq!(tags[0].1, vec![AGENT_TAG, TAG_MORE_INFO]);
    }

    #[tokio::test]
    async fn tag_failure_does_not_abort_the_batch() {
        let gateway = RecordingGateway {
            fail_tag_to: Some("t1".into()),
            ..RecordingGateway::default()
        };
        let records = vec![record("t1"), record("t2")];

        tag_bucket(&gateway, &records, TAG_BANNED).await;

        // Both tickets were attempted despite the first failing.
        assert_eq!(gateway.tags.lock().unwrap().len(), 2);
    }
}
