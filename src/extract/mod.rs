//! Multi-agent document extraction.
//!
//! One or more configured agents run against the same attachment set and
//! system prompt. Per-agent successes and failures are collected
//! independently: every agent is attempted regardless of earlier failures,
//! and an unregistered provider is a per-agent failure, not an abort.

pub mod decision;
pub mod openai;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::AgentSpec;
use crate::error::ExtractError;
use crate::pipeline::types::{ExtractedRecord, ExtractionFailure};

use decision::DecisionData;

/// Built-in system prompt used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a compliance assistant processing removal orders \
issued under Regulation (EU) 2021/784. Read the attached order document and extract the identity \
of the reported account and the order metadata. Respond with ONLY a JSON object with the fields \
username, email, agencyName, referenceNumber and date (ISO 8601). Use an empty string for a field \
that is genuinely absent from the document.";

/// One extraction strategy, keyed by provider name in the registry.
#[async_trait]
pub trait DecisionExtractor: Send + Sync {
    async fn extract(
        &self,
        system_prompt: &str,
        attachment_paths: &[PathBuf],
        model: &str,
    ) -> Result<DecisionData, ExtractError>;
}

/// Provider name → extraction strategy. Adding a provider is one
/// `register` call, not a change to the dispatch loop.
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    providers: HashMap<String, Arc<dyn DecisionExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: impl Into<String>, extractor: Arc<dyn DecisionExtractor>) {
        self.providers.insert(provider.into(), extractor);
    }

    /// Run every configured agent against the same attachments and prompt.
    ///
    /// Returns successes and failures as independent lists; neither
    /// short-circuits the other.
    pub async fn run_agents(
        &self,
        agents: &[AgentSpec],
        system_prompt: &str,
        attachment_paths: &[PathBuf],
    ) -> (Vec<ExtractedRecord>, Vec<ExtractionFailure>) {
        let mut records = Vec::new();
        let mut failures = Vec::new();

        for agent in agents {
            let Some(extractor) = self.providers.get(&agent.provider) else {
                warn!(provider = %agent.provider, "no extractor registered for provider");
                failures.push(ExtractionFailure {
                    agent: agent.clone(),
                    cause: ExtractError::UnsupportedProvider(agent.provider.clone()),
                });
                continue;
            };

            match extractor
                .extract(system_prompt, attachment_paths, &agent.model)
                .await
            {
                Ok(decision) => records.push(ExtractedRecord {
                    agent: agent.clone(),
                    decision,
                    note: String::new(),
                }),
                Err(e) => {
                    warn!(
                        provider = %agent.provider,
                        model = %agent.model,
                        error = %e,
                        "agent extraction failed"
                    );
                    failures.push(ExtractionFailure {
                        agent: agent.clone(),
                        cause: e,
                    });
                }
            }
        }

        (records, failures)
    }
}
