use std::sync::Arc;

use tco_agent::ban::{BanGateway, HttpBanClient};
use tco_agent::config::Config;
use tco_agent::extract::ExtractorRegistry;
use tco_agent::extract::openai::OpenAiExtractor;
use tco_agent::notify::{Notifier, SlackNotifier};
use tco_agent::pipeline::processor::{ProcessorConfig, TicketProcessor};
use tco_agent::server::{AppState, router};
use tco_agent::zendesk::{TicketGateway, ZendeskClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    let tickets: Arc<dyn TicketGateway> = Arc::new(ZendeskClient::new(config.zendesk.clone()));

    let mut extractors = ExtractorRegistry::new();
    extractors.register(
        "openai",
        Arc::new(OpenAiExtractor::new(
            config.extraction.api_key.clone(),
            config.extraction.default_model.clone(),
        )),
    );

    let ban: Arc<dyn BanGateway> = Arc::new(HttpBanClient::new(config.ban.clone()));
    let notifier: Arc<dyn Notifier> =
        Arc::new(SlackNotifier::new(config.notification_webhook_url.clone()));

    let processor = Arc::new(TicketProcessor::new(
        Arc::clone(&tickets),
        extractors,
        ban,
        notifier,
        ProcessorConfig {
            agents: config.extraction.agents.clone(),
            system_prompt: config.extraction.system_prompt.clone(),
            failure_policy: config.extraction.failure_policy,
        },
    ));

    let state = AppState {
        processor,
        tickets,
        webhook_token: config.server.webhook_token.clone(),
        expected_recipient: config.server.expected_recipient.clone(),
        completion_hook: None,
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!(addr = %config.server.bind_addr, "removal-order agent listening");
    axum::serve(listener, app).await?;

    Ok(())
}
