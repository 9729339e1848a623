//! Zendesk transport: tickets, attachments, replies, tags.
//!
//! The pipeline only depends on the [`TicketGateway`] trait; this module
//! provides the reqwest-backed implementation against the Zendesk REST API.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::ZendeskConfig;
use crate::error::TicketError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ticket value as fetched from the ticketing API. Immutable once fetched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ticket {
    /// Webhook payloads carry the id as a string, the REST API as a number.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub recipient: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Attachment metadata returned by the attachments listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content_url: String,
    #[serde(default)]
    pub file_name: String,
}

/// Parse an attachments listing body and keep only PDF attachments.
pub fn parse_pdf_attachments(body: &str) -> Result<Vec<Attachment>, TicketError> {
    #[derive(Deserialize)]
    struct Listing {
        #[serde(default)]
        attachments: Vec<Attachment>,
    }
    let listing: Listing = serde_json::from_str(body)?;
    Ok(listing
        .attachments
        .into_iter()
        .filter(|a| a.content_type == "application/pdf")
        .collect())
}

/// Everything the pipeline needs from the ticketing system.
#[async_trait]
pub trait TicketGateway: Send + Sync {
    async fn fetch_ticket(&self, ticket_id: &str) -> Result<Ticket, TicketError>;
    async fn fetch_tickets(&self, ticket_ids: &[String]) -> Result<Vec<Ticket>, TicketError>;
    /// Download the ticket's PDF attachments to local files and return
    /// their paths.
    async fn get_attachments(&self, ticket_id: &str) -> Result<Vec<PathBuf>, TicketError>;
    async fn reply(&self, ticket_id: &str, message: &str) -> Result<(), TicketError>;
    async fn add_tags(&self, ticket_id: &str, tags: &[String]) -> Result<(), TicketError>;
}

pub struct ZendeskClient {
    config: ZendeskConfig,
    base_url: String,
    client: reqwest::Client,
}

impl ZendeskClient {
    pub fn new(config: ZendeskConfig) -> Self {
        let base_url = format!("https://{}.zendesk.com/api/v2", config.domain);
        Self::with_base_url(config, base_url)
    }

    /// Same as [`new`](Self::new), pointed at a different API base URL.
    pub fn with_base_url(config: ZendeskConfig, base_url: impl Into<String>) -> Self {
        Self {
            config,
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .basic_auth(
                format!("{}/token", self.config.user),
                Some(self.config.api_key.expose_secret()),
            )
    }

    /// Send a request and return the body, mapping non-2xx to an API error.
    async fn expect_success(
        &self,
        builder: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<String, TicketError> {
        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if status.as_u16() >= 300 {
            return Err(TicketError::Api {
                context: context.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl TicketGateway for ZendeskClient {
    async fn fetch_ticket(&self, ticket_id: &str) -> Result<Ticket, TicketError> {
        let body = self
            .expect_success(
                self.request(reqwest::Method::GET, &format!("/tickets/{ticket_id}.json")),
                &format!("fetching ticket {ticket_id}"),
            )
            .await?;

        #[derive(Deserialize)]
        struct Wrapper {
            ticket: Ticket,
        }
        let wrapper: Wrapper = serde_json::from_str(&body)?;
        Ok(wrapper.ticket)
    }

    async fn fetch_tickets(&self, ticket_ids: &[String]) -> Result<Vec<Ticket>, TicketError> {
        let body = self
            .expect_success(
                self.request(
                    reqwest::Method::GET,
                    &format!("/tickets.json?ids={}", ticket_ids.join(",")),
                ),
                "fetching tickets in bulk",
            )
            .await?;

        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(default)]
            tickets: Vec<Ticket>,
        }
        let wrapper: Wrapper = serde_json::from_str(&body)?;
        Ok(wrapper.tickets)
    }

    async fn get_attachments(&self, ticket_id: &str) -> Result<Vec<PathBuf>, TicketError> {
        let body = self
            .expect_success(
                self.request(
                    reqwest::Method::GET,
                    &format!("/tickets/{ticket_id}/attachments.json"),
                ),
                &format!("listing attachments for ticket {ticket_id}"),
            )
            .await?;

        let attachments = parse_pdf_attachments(&body)?;

        let mut paths = Vec::new();
        for attachment in attachments {
            let resp = self
                .client
                .get(&attachment.content_url)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await?;
            let status = resp.status();
            if status.as_u16() >= 300 {
                return Err(TicketError::Api {
                    context: format!("downloading attachment {}", attachment.file_name),
                    status: status.as_u16(),
                    body: resp.text().await.unwrap_or_default(),
                });
            }
            let bytes = resp.bytes().await?;

            let (_, path) = tempfile::Builder::new()
                .prefix(&format!("{ticket_id}-attachment-"))
                .suffix(".pdf")
                .tempfile()?
                .keep()
                .map_err(|e| e.error)?;
            tokio::fs::write(&path, &bytes).await?;
            debug!(path = %path.display(), file = %attachment.file_name, "staged attachment");
            paths.push(path);
        }

        Ok(paths)
    }

    async fn reply(&self, ticket_id: &str, message: &str) -> Result<(), TicketError> {
        let body = json!({
            "ticket": {
                "comment": {"body": message, "public": true}
            }
        });
        self.expect_success(
            self.request(reqwest::Method::PUT, &format!("/tickets/{ticket_id}.json"))
                .json(&body),
            &format!("adding comment to ticket {ticket_id}"),
        )
        .await?;
        info!(ticket_id, "replied to ticket");
        Ok(())
    }

    async fn add_tags(&self, ticket_id: &str, tags: &[String]) -> Result<(), TicketError> {
        if tags.is_empty() {
            return Ok(());
        }
        let body = json!({"ticket": {"tags": tags}});
        self.expect_success(
            self.request(reqwest::Method::PUT, &format!("/tickets/{ticket_id}.json"))
                .json(&body),
            &format!("tagging ticket {ticket_id}"),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_id_accepts_string_and_number() {
        let from_string: Ticket = serde_json::from_str(r#"{"id": "5158"}"#).unwrap();
        assert_eq!(from_string.id, "5158");

        let from_number: Ticket = serde_json::from_str(r#"{"id": 5158}"#).unwrap();
        assert_eq!(from_number.id, "5158");

        let missing: Ticket = serde_json::from_str("{}").unwrap();
        assert!(missing.id.is_empty());
    }

    #[test]
    fn ticket_recipient_is_optional() {
        let ticket: Ticket =
            serde_json::from_str(r#"{"id": 1, "recipient": "tco@example.com"}"#).unwrap();
        assert_eq!(ticket.recipient.as_deref(), Some("tco@example.com"));

        let no_recipient: Ticket = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        assert!(no_recipient.recipient.is_none());
    }

    #[test]
    fn attachment_listing_filters_to_pdf() {
        let body = r#"{
            "attachments": [
                {"content_type": "application/pdf", "content_url": "https://x/a.pdf", "file_name": "a.pdf"},
                {"content_type": "text/plain", "content_url": "https://x/crash.log", "file_name": "crash.log"},
                {"content_type": "application/pdf", "content_url": "https://x/b.pdf", "file_name": "b.pdf"}
            ],
            "body": "Thanks for your help!"
        }"#;

        let pdfs = parse_pdf_attachments(body).unwrap();
        let names: Vec<_> = pdfs.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn empty_listing_is_ok() {
        assert!(parse_pdf_attachments(r#"{"attachments": []}"#).unwrap().is_empty());
        assert!(parse_pdf_attachments(r#"{}"#).unwrap().is_empty());
    }
}
