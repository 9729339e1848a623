//! Per-ticket pipeline orchestration.
//!
//! One run walks a fixed sequence of steps and accumulates a single
//! [`TicketOutcome`]. The first error is recorded and later ones only
//! logged, but the run keeps executing subsequent steps best-effort.
//! The exceptions are attachment retrieval and (under the fatal policy)
//! extraction, which short-circuit straight to the notification. Exactly
//! one outcome notification is emitted per run, win or fail.

use std::sync::Arc;

use tracing::{error, info};

use crate::ban::{self, BanGateway};
use crate::config::{AgentSpec, ExtractionFailurePolicy};
use crate::error::ExtractError;
use crate::extract::ExtractorRegistry;
use crate::messages::ReplyTemplate;
use crate::notify::Notifier;
use crate::pipeline::classify::partition_records;
use crate::pipeline::dispatch::{
    TAG_BANNED, TAG_MORE_INFO, TAG_NOT_FOUND, reply_to_bucket, tag_bucket,
};
use crate::pipeline::types::{ExtractionFailure, TicketOutcome};
use crate::zendesk::{Ticket, TicketGateway};

/// Per-run extraction settings, resolved once at startup.
#[derive(Clone)]
pub struct ProcessorConfig {
    pub agents: Vec<AgentSpec>,
    pub system_prompt: String,
    pub failure_policy: ExtractionFailurePolicy,
}

/// Sequences one ticket through attachment retrieval, extraction,
/// classification, banning, reply/tag delivery and notification.
///
/// All collaborators are injected at construction; runs share no mutable
/// state and may execute concurrently.
pub struct TicketProcessor {
    tickets: Arc<dyn TicketGateway>,
    extractors: ExtractorRegistry,
    ban: Arc<dyn BanGateway>,
    notifier: Arc<dyn Notifier>,
    config: ProcessorConfig,
}

impl TicketProcessor {
    pub fn new(
        tickets: Arc<dyn TicketGateway>,
        extractors: ExtractorRegistry,
        ban: Arc<dyn BanGateway>,
        notifier: Arc<dyn Notifier>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            tickets,
            extractors,
            ban,
            notifier,
            config,
        }
    }

    /// Run the full pipeline for one ticket and emit the outcome
    /// notification. Never fails: every error ends up in the outcome.
    pub async fn process(&self, ticket: Ticket) -> TicketOutcome {
        info!(ticket_id = %ticket.id, subject = %ticket.subject, "processing ticket");

        let mut outcome = TicketOutcome::new(ticket.id.clone(), ticket.subject.clone());
        self.run_steps(&ticket, &mut outcome).await;

        if let Err(e) = self.notifier.notify(&outcome).await {
            error!(ticket_id = %outcome.ticket_id, error = %e, "failed to send outcome notification");
        }

        outcome
    }

    async fn run_steps(&self, ticket: &Ticket, outcome: &mut TicketOutcome) {
        // Attachment retrieval failure is fatal for the run.
        let attachment_paths = match self.tickets.get_attachments(&ticket.id).await {
            Ok(paths) => paths,
            Err(e) => {
                error!(ticket_id = %ticket.id, error = %e, "failed to get attachments");
                outcome.record_error("getting attachments", e);
                return;
            }
        };

        let (mut records, failures) = self
            .extractors
            .run_agents(&self.config.agents, &self.config.system_prompt, &attachment_paths)
            .await;

        if !failures.is_empty() {
            let combined = combine_failures(&failures);
            error!(ticket_id = %ticket.id, failed = failures.len(), "extraction failures: {combined}");
            outcome.record_error("extracting data", ExtractError::Batch(combined));

            match self.config.failure_policy {
                ExtractionFailurePolicy::Fatal => return,
                // Proceed with the agents that succeeded, if any did.
                ExtractionFailurePolicy::Partial if records.is_empty() => return,
                ExtractionFailurePolicy::Partial => {}
            }
        }

        for record in &mut records {
            if record.decision.ticket_id.is_empty() {
                record.decision.ticket_id = ticket.id.clone();
            }
        }

        let (ready, more_info) = partition_records(records);
        outcome.more_info = more_info;

        tag_bucket(&*self.tickets, &outcome.more_info, TAG_MORE_INFO).await;
        if let Err(e) =
            reply_to_bucket(&*self.tickets, &outcome.more_info, ReplyTemplate::MoreInfoRequired)
                .await
        {
            error!(ticket_id = %ticket.id, error = %e, "failed to reply to tickets missing info");
            outcome.record_error("replying to tickets missing info", e);
        }

        // A failed ban call leaves both buckets empty; the run continues.
        let (banned, not_found) = match self.ban.ban(&ready).await {
            Ok(response) => ban::reconcile(&ready, &response),
            Err(e) => {
                error!(ticket_id = %ticket.id, error = %e, "failed to ban users");
                outcome.record_error("banning users", e);
                (Vec::new(), Vec::new())
            }
        };
        outcome.banned = banned;
        outcome.not_found = not_found;

        tag_bucket(&*self.tickets, &outcome.not_found, TAG_NOT_FOUND).await;
        if let Err(e) =
            reply_to_bucket(&*self.tickets, &outcome.not_found, ReplyTemplate::UserNotFound).await
        {
            error!(ticket_id = %ticket.id, error = %e, "failed to reply to not-found tickets");
            outcome.record_error("replying to not-found users", e);
        }

        tag_bucket(&*self.tickets, &outcome.banned, TAG_BANNED).await;
        if let Err(e) =
            reply_to_bucket(&*self.tickets, &outcome.banned, ReplyTemplate::UserBanned).await
        {
            error!(ticket_id = %ticket.id, error = %e, "failed to reply to banned tickets");
            outcome.record_error("replying to banned users", e);
        }
    }
}

fn combine_failures(failures: &[ExtractionFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
