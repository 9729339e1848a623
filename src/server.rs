//! Inbound webhook handling.
//!
//! The handler authenticates, resolves the referenced ticket(s), filters by
//! intended recipient, and spawns one detached pipeline run per qualifying
//! ticket. It answers 200 before any run completes; pipeline errors never
//! reach the caller.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::pipeline::processor::TicketProcessor;
use crate::pipeline::types::TicketOutcome;
use crate::zendesk::{Ticket, TicketGateway};

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<TicketProcessor>,
    pub tickets: Arc<dyn TicketGateway>,
    pub webhook_token: SecretString,
    pub expected_recipient: Option<String>,
    /// Test hook: when set, each spawned run reports its outcome here so
    /// tests can await completion instead of sleeping.
    pub completion_hook: Option<mpsc::UnboundedSender<TicketOutcome>>,
}

/// Build the webhook router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health).post(process_webhook))
        .route("/ping", get(health))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn process_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if !authorized(&headers, &state.webhook_token) {
        warn!("rejecting webhook with invalid credentials");
        return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    }

    let ticket_ref = match parse_ticket_ref(&body) {
        Ok(ticket_ref) => ticket_ref,
        Err(reason) => {
            warn!(reason, "rejecting malformed webhook payload");
            return (StatusCode::BAD_REQUEST, "Invalid webhook payload").into_response();
        }
    };

    // Prefer the single-ticket fetch (it may carry more fields, like the
    // recipient); fall back to the bulk endpoint.
    let fetched = match state.tickets.fetch_ticket(&ticket_ref.id).await {
        Ok(ticket) => vec![ticket],
        Err(e) => {
            warn!(ticket_id = %ticket_ref.id, error = %e, "single-ticket fetch failed, trying bulk");
            match state.tickets.fetch_tickets(&[ticket_ref.id.clone()]).await {
                Ok(tickets) => tickets,
                Err(e) => {
                    warn!(ticket_id = %ticket_ref.id, error = %e, "failed to fetch ticket data");
                    return (StatusCode::INTERNAL_SERVER_ERROR, "Error fetching ticket data")
                        .into_response();
                }
            }
        }
    };

    if fetched.is_empty() {
        warn!(ticket_id = %ticket_ref.id, "ticket not found");
        return (StatusCode::NOT_FOUND, "Ticket not found").into_response();
    }

    let matching = filter_by_recipient(fetched, state.expected_recipient.as_deref());
    if matching.is_empty() {
        warn!(ticket_id = %ticket_ref.id, "no tickets matched the recipient filter");
    }

    for ticket in matching {
        info!(ticket_id = %ticket.id, "spawning pipeline run");
        let processor = Arc::clone(&state.processor);
        let hook = state.completion_hook.clone();
        tokio::spawn(async move {
            let outcome = processor.process(ticket).await;
            if let Some(tx) = hook {
                let _ = tx.send(outcome);
            }
        });
    }

    StatusCode::OK.into_response()
}

/// Constant-time credential check against the bearer token or, failing
/// that, the preshared-key headers.
fn authorized(headers: &HeaderMap, token: &SecretString) -> bool {
    let provided = bearer_token(headers)
        .or_else(|| header_value(headers, "x-preshared-key"))
        .or_else(|| header_value(headers, "x-api-key"))
        .unwrap_or("");

    provided
        .as_bytes()
        .ct_eq(token.expose_secret().as_bytes())
        .into()
}

fn bearer_token<'a>(headers: &'a HeaderMap) -> Option<&'a str> {
    header_value(headers, "authorization")?.strip_prefix("Bearer ")
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

/// Parse a flat `{id, subject}` reference or a nested `{detail: {...}}`
/// webhook envelope into a ticket reference.
fn parse_ticket_ref(body: &str) -> Result<Ticket, &'static str> {
    let payload: serde_json::Value =
        serde_json::from_str(body).map_err(|_| "payload is not valid JSON")?;

    let source = match payload.get("detail").cloned() {
        Some(detail) if detail.is_object() => detail,
        Some(_) => return Err("detail field is not an object"),
        None => payload,
    };

    let ticket: Ticket =
        serde_json::from_value(source).map_err(|_| "ticket reference is malformed")?;
    if ticket.id.is_empty() {
        return Err("ticket reference has no id");
    }
    Ok(ticket)
}

/// Keep tickets addressed to the expected recipient.
///
/// Without a configured recipient the filter passes everything. A ticket
/// without recipient metadata passes only when it is the only one fetched
/// (some ticket APIs omit the field on bulk fetches).
fn filter_by_recipient(tickets: Vec<Ticket>, expected: Option<&str>) -> Vec<Ticket> {
    let Some(expected) = expected else {
        return tickets;
    };

    let total = tickets.len();
    tickets
        .into_iter()
        .filter(|ticket| match &ticket.recipient {
            Some(recipient) => {
                let matches = recipient == expected;
                if !matches {
                    warn!(
                        ticket_id = %ticket.id,
                        recipient = %recipient,
                        expected,
                        "ticket recipient does not match"
                    );
                }
                matches
            }
            None if total == 1 => {
                info!(ticket_id = %ticket.id, "no recipient field on single ticket, processing anyway");
                true
            }
            None => {
                warn!(ticket_id = %ticket.id, "ticket has no recipient field, skipping");
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(id: &str, recipient: Option<&str>) -> Ticket {
        Ticket {
            id: id.into(),
            recipient: recipient.map(String::from),
            ..Ticket::default()
        }
    }

    #[test]
    fn parses_flat_payload() {
        let ticket = parse_ticket_ref(r#"{"id": "5158", "subject": "order"}"#).unwrap();
        assert_eq!(ticket.id, "5158");
        assert_eq!(ticket.subject, "order");
    }

    #[test]
    fn parses_nested_webhook_envelope() {
        let body = r#"{
            "account_id": 22129848,
            "detail": {"id": "5158", "subject": "ticketinfo", "status": "OPEN"},
            "type": "zen:event-type:ticket.created"
        }"#;
        let ticket = parse_ticket_ref(body).unwrap();
        assert_eq!(ticket.id, "5158");
        assert_eq!(ticket.subject, "ticketinfo");
    }

    #[test]
    fn parses_numeric_id() {
        let ticket = parse_ticket_ref(r#"{"id": 5158}"#).unwrap();
        assert_eq!(ticket.id, "5158");
    }

    #[test]
    fn rejects_invalid_payloads() {
        assert!(parse_ticket_ref("not json").is_err());
        assert!(parse_ticket_ref(r#"{"subject": "no id"}"#).is_err());
        assert!(parse_ticket_ref(r#"{"detail": "not an object"}"#).is_err());
    }

    #[test]
    fn recipient_filter_passes_everything_when_unconfigured() {
        let tickets = vec![ticket("1", None), ticket("2", Some("other@x.com"))];
        assert_eq!(filter_by_recipient(tickets, None).len(), 2);
    }

    #[test]
    fn recipient_filter_matches_exactly() {
        let tickets = vec![
            ticket("1", Some("tco@x.com")),
            ticket("2", Some("other@x.com")),
        ];
        let kept = filter_by_recipient(tickets, Some("tco@x.com"));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "1");
    }

    #[test]
    fn single_ticket_without_recipient_passes() {
        let kept = filter_by_recipient(vec![ticket("1", None)], Some("tco@x.com"));
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn multiple_tickets_without_recipient_are_dropped() {
        let kept = filter_by_recipient(
            vec![ticket("1", None), ticket("2", None)],
            Some("tco@x.com"),
        );
        assert!(kept.is_empty());
    }

    #[test]
    fn authorization_accepts_any_credential_header() {
        let token = SecretString::from("s3cret".to_string());

        let mut bearer = HeaderMap::new();
        bearer.insert("authorization", "Bearer s3cret".parse().unwrap());
        assert!(authorized(&bearer, &token));

        let mut preshared = HeaderMap::new();
        preshared.insert("x-preshared-key", "s3cret".parse().unwrap());
        assert!(authorized(&preshared, &token));

        let mut api_key = HeaderMap::new();
        api_key.insert("x-api-key", "s3cret".parse().unwrap());
        assert!(authorized(&api_key, &token));
    }

    #[test]
    fn authorization_rejects_wrong_or_missing_credentials() {
        let token = SecretString::from("s3cret".to_string());

        assert!(!authorized(&HeaderMap::new(), &token));

        let mut wrong = HeaderMap::new();
        wrong.insert("authorization", "Bearer nope".parse().unwrap());
        assert!(!authorized(&wrong, &token));

        // Bare token without the Bearer scheme is not accepted.
        let mut bare = HeaderMap::new();
        bare.insert("authorization", "s3cret".parse().unwrap());
        assert!(!authorized(&bare, &token));
    }
}
