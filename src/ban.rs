//! Ban API transport and identifier reconciliation.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::BanConfig;
use crate::error::BanError;
use crate::pipeline::types::ExtractedRecord;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which identifiers the ban collaborator acted on. Identifiers are
/// whatever the collaborator matched against, username or email.
#[derive(Debug, Default, Clone)]
pub struct BanOutcome {
    pub banned: Vec<String>,
    pub not_found: Vec<String>,
}

/// The internal user-management API, as far as the pipeline cares.
#[async_trait]
pub trait BanGateway: Send + Sync {
    async fn ban(&self, records: &[ExtractedRecord]) -> Result<BanOutcome, BanError>;
}

pub struct HttpBanClient {
    config: BanConfig,
    client: reqwest::Client,
}

impl HttpBanClient {
    pub fn new(config: BanConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl BanGateway for HttpBanClient {
    async fn ban(&self, records: &[ExtractedRecord]) -> Result<BanOutcome, BanError> {
        let url = self
            .config
            .url
            .as_deref()
            .ok_or(BanError::MissingCredential("BAN_API_URL"))?;
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or(BanError::MissingCredential("BAN_API_KEY"))?;

        let body = json!({"users": records});
        debug!(count = records.len(), "sending ban request");

        let resp = self
            .client
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if status.as_u16() >= 300 {
            return Err(BanError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        #[derive(Deserialize)]
        struct Entry {
            #[serde(rename = "userId", default)]
            user_id: String,
        }
        #[derive(Deserialize, Default)]
        struct Data {
            #[serde(default)]
            banned: Vec<Entry>,
            #[serde(default)]
            not_found: Vec<Entry>,
        }
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            success: bool,
            #[serde(default)]
            data: Option<Data>,
        }

        let response: Response = serde_json::from_str(&text)?;
        if !response.success {
            return Err(BanError::Rejected);
        }

        let data = response.data.unwrap_or_default();
        Ok(BanOutcome {
            banned: data.banned.into_iter().map(|e| e.user_id).collect(),
            not_found: data.not_found.into_iter().map(|e| e.user_id).collect(),
        })
    }
}

/// Match the collaborator's identifier strings back to the records they
/// came from, by exact username OR email equality.
///
/// Linear scan in original order, first match wins. Identifiers that match
/// no local record are dropped silently.
pub fn reconcile(
    records: &[ExtractedRecord],
    outcome: &BanOutcome,
) -> (Vec<ExtractedRecord>, Vec<ExtractedRecord>) {
    let find = |identifier: &str| {
        records
            .iter()
            .find(|r| r.decision.username == identifier || r.decision.email == identifier)
            .cloned()
    };

    let banned = outcome.banned.iter().filter_map(|id| find(id)).collect();
    let not_found = outcome.not_found.iter().filter_map(|id| find(id)).collect();
    (banned, not_found)
}
