//! Environment-driven configuration.
//!
//! Everything is read once at startup into typed config structs; secrets are
//! wrapped in [`SecretString`] and only exposed at the call site.

use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Provider assigned to bare `model` tokens in the agent list.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Model used when no agent list and no model override is configured.
pub const DEFAULT_MODEL: &str = "gpt-5-mini";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// One configured extraction agent: a (provider, model) pair.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AgentSpec {
    pub provider: String,
    pub model: String,
}

/// Parse a comma-separated agent list ("provider:model" or bare "model").
///
/// Preserves input order, trims whitespace, drops empty segments, and
/// lower-cases the provider. Bare tokens get the default provider. Never
/// errors; malformed segments degrade to the default provider.
pub fn parse_agent_list(raw: &str) -> Vec<AgentSpec> {
    raw.split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let (provider, model) = match part.split_once(':') {
                Some((provider, model)) => (provider.trim().to_lowercase(), model.trim()),
                None => (String::new(), part),
            };
            let provider = if provider.is_empty() {
                DEFAULT_PROVIDER.to_string()
            } else {
                provider
            };
            Some(AgentSpec {
                provider,
                model: model.to_string(),
            })
        })
        .collect()
}

/// What to do when some configured agents fail extraction.
///
/// `Fatal` discards the whole run even when other agents succeeded (the
/// conservative reference behavior); `Partial` proceeds with whatever agents
/// succeeded, as long as at least one did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractionFailurePolicy {
    #[default]
    Fatal,
    Partial,
}

impl FromStr for ExtractionFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fatal" => Ok(Self::Fatal),
            "partial" => Ok(Self::Partial),
            other => Err(ConfigError::InvalidValue {
                key: "EXTRACTION_FAILURE_POLICY",
                message: format!("expected 'fatal' or 'partial', got '{other}'"),
            }),
        }
    }
}

/// Ticketing API credentials.
#[derive(Clone)]
pub struct ZendeskConfig {
    pub domain: String,
    pub user: String,
    pub api_key: SecretString,
}

/// Extraction provider settings.
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Absent credential fails the openai agents at call time, not startup.
    pub api_key: Option<SecretString>,
    pub default_model: String,
    pub system_prompt: String,
    pub agents: Vec<AgentSpec>,
    pub failure_policy: ExtractionFailurePolicy,
}

/// Ban API settings. Both fields are checked at call time so a missing
/// credential aborts the ban step, not the whole service.
#[derive(Clone)]
pub struct BanConfig {
    pub url: Option<String>,
    pub api_key: Option<SecretString>,
}

/// Inbound webhook server settings.
#[derive(Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub webhook_token: SecretString,
    /// When set, only tickets addressed to this recipient are processed.
    pub expected_recipient: Option<String>,
}

/// Full service configuration.
#[derive(Clone)]
pub struct Config {
    pub zendesk: ZendeskConfig,
    pub extraction: ExtractionConfig,
    pub ban: BanConfig,
    pub server: ServerConfig,
    pub notification_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let zendesk = ZendeskConfig {
            domain: require_env("ZENDESK_DOMAIN")?,
            user: require_env("ZENDESK_USER")?,
            api_key: SecretString::from(require_env("ZENDESK_API_KEY")?),
        };

        let default_model =
            optional_env("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let mut agents = parse_agent_list(&optional_env("AI_MODELS").unwrap_or_default());
        if agents.is_empty() {
            let provider = optional_env("AI_PROVIDER")
                .map(|p| p.to_lowercase())
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
            agents = vec![AgentSpec {
                provider,
                model: default_model.clone(),
            }];
        }
        let extraction = ExtractionConfig {
            api_key: optional_env("OPENAI_API_KEY").map(SecretString::from),
            default_model,
            system_prompt: optional_env("AI_SYSTEM_PROMPT")
                .or_else(|| optional_env("OPENAI_SYSTEM_PROMPT"))
                .unwrap_or_else(|| crate::extract::DEFAULT_SYSTEM_PROMPT.to_string()),
            agents,
            failure_policy: match optional_env("EXTRACTION_FAILURE_POLICY") {
                Some(raw) => raw.parse()?,
                None => ExtractionFailurePolicy::default(),
            },
        };

        let ban = BanConfig {
            url: optional_env("BAN_API_URL"),
            api_key: optional_env("BAN_API_KEY").map(SecretString::from),
        };

        let server = ServerConfig {
            bind_addr: optional_env("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            webhook_token: SecretString::from(require_env("WEBHOOK_TOKEN")?),
            expected_recipient: optional_env("TICKET_RECIPIENT"),
        };

        Ok(Self {
            zendesk,
            extraction,
            ban,
            server,
            notification_webhook_url: optional_env("SLACK_WEBHOOK_URL"),
        })
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    optional_env(name).ok_or(ConfigError::MissingEnvVar(name))
}

/// Read an environment variable, treating unset and blank as absent.
fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
