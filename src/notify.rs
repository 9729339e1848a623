//! Outcome notifications to a Slack-compatible webhook.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::NotifyError;
use crate::messages::format_identifiers;
use crate::pipeline::types::{ExtractedRecord, TicketOutcome};

/// Per-bucket entries shown before the "...and N more" truncation.
const MAX_SUMMARY_ENTRIES: usize = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives exactly one outcome summary per ticket run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, outcome: &TicketOutcome) -> Result<(), NotifyError>;
}

/// Posts a flattened text summary to a Slack incoming webhook.
/// A no-op when no webhook URL is configured.
pub struct SlackNotifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, outcome: &TicketOutcome) -> Result<(), NotifyError> {
        let Some(url) = &self.webhook_url else {
            debug!("no notification webhook configured, skipping");
            return Ok(());
        };

        let text = build_summary_text(outcome);
        let resp = self
            .client
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({"text": text}))
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() >= 300 {
            return Err(NotifyError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Flatten an outcome into the notification text: status line, subject,
/// and one line per bucket.
pub fn build_summary_text(outcome: &TicketOutcome) -> String {
    let mut status = if let Some(err) = &outcome.error {
        format!(":warning: Ticket processing ended with errors: {err}")
    } else if outcome.is_empty() {
        ":information_source: Ticket processed with no actions".to_string()
    } else {
        ":white_check_mark: Ticket processed".to_string()
    };
    if !outcome.ticket_id.is_empty() {
        status = format!("{status} ({})", outcome.ticket_id);
    }

    let mut lines = vec![status];
    let subject = outcome.subject.trim();
    if !subject.is_empty() {
        lines.push(format!("*Subject*: {subject}"));
    }

    lines.push(format!("*Banned*: {}", summarize_bucket(&outcome.banned)));
    lines.push(format!(
        "*Not found*: {}",
        summarize_bucket(&outcome.not_found)
    ));
    lines.push(format!(
        "*Need more info*: {}",
        summarize_bucket(&outcome.more_info)
    ));

    lines.join("\n")
}

fn summarize_bucket(records: &[ExtractedRecord]) -> String {
    if records.is_empty() {
        return "none".to_string();
    }

    let mut entries: Vec<String> = records
        .iter()
        .take(MAX_SUMMARY_ENTRIES)
        .map(|record| {
            let identifiers = format_identifiers(&record.decision);
            let reference = if record.decision.reference_number.trim().is_empty() {
                "N/A"
            } else {
                &record.decision.reference_number
            };
            format!("{identifiers} (ref {reference})")
        })
        .collect();

    if records.len() > MAX_SUMMARY_ENTRIES {
        entries.push(format!("...and {} more", records.len() - MAX_SUMMARY_ENTRIES));
    }

    entries.join("; ")
}
