//! Error types for the removal-order agent.

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ticket API error: {0}")]
    Ticket(#[from] TicketError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Ban API error: {0}")]
    Ban(#[from] BanError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// An error recorded against a pipeline run, tagged with the step that
/// produced it. Only the first one per run is kept.
#[derive(Debug, thiserror::Error)]
#[error("{step}: {source}")]
pub struct StepError {
    pub step: &'static str,
    #[source]
    pub source: Error,
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Ticketing API errors (fetch, attachments, reply, tags).
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("ticket API returned status {status} while {context}: {body}")]
    Api {
        context: String,
        status: u16,
        body: String,
    },

    #[error("ticket {0} not found")]
    NotFound(String),

    #[error("failed to parse ticket API response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extraction provider errors. Per-agent failures are collected, never
/// short-circuit the batch; `Batch` is the aggregate recorded on the run.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported provider {0}")]
    UnsupportedProvider(String),

    #[error("{0} is not set")]
    MissingCredential(&'static str),

    #[error("failed to upload file {path}: {reason}")]
    Upload { path: String, reason: String },

    #[error("extraction API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("no response from extraction API after {attempts} attempts: {reason}")]
    NoResponse { attempts: u32, reason: String },

    #[error("failed to parse extraction API response: {0}")]
    Parse(String),

    #[error("no decision text found in extraction response")]
    EmptyResponse,

    #[error("failed to parse decision JSON: {reason} (text: {text})")]
    MalformedResponse { reason: String, text: String },

    #[error("invalid decision format: {0}")]
    InvalidDecision(String),

    #[error("error extracting data from tickets: {0}")]
    Batch(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Ban API errors. These abort the ban step, not the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum BanError {
    #[error("{0} is not set")]
    MissingCredential(&'static str),

    #[error("ban API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("ban API reported failure")]
    Rejected,

    #[error("failed to parse ban API response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Reply/tag delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid message template: {0}")]
    InvalidTemplate(String),

    #[error("failed to reply to ticket {ticket_id}: {source}")]
    Reply {
        ticket_id: String,
        #[source]
        source: TicketError,
    },
}

/// Outcome notification errors. Logged only, never surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification webhook returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
