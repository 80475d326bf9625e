//! JSON frames exchanged over `/api/v1/ws`.

use firewatch_core::filter::Predicate;
use firewatch_events::Delivery;
use serde::{Deserialize, Serialize};

use crate::services::ChatEvent;

/// A frame sent by the client.
///
/// ```json
/// {"subscribe": "incidents", "status": ["pending"]}
/// {"subscribe": "messages", "incident_id": "…"}
/// {"unsubscribe": 3}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ClientRequest {
    Subscribe(Predicate),
    Unsubscribe { unsubscribe: u64 },
}

/// A frame sent by the server. `subscription` numbers are per connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed {
        subscription: u64,
    },
    Unsubscribed {
        subscription: u64,
    },
    /// A change for an incident subscription.
    Change {
        subscription: u64,
        delivery: Delivery,
    },
    /// A message or lock notice for a chat subscription.
    Chat {
        subscription: u64,
        event: ChatEvent,
    },
    Error {
        error: String,
        code: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use firewatch_core::filter::{IncidentFilter, MessageFilter};
    use firewatch_core::incident::IncidentStatus;

    #[test]
    fn subscribe_requests_parse() {
        let incident_id = uuid::Uuid::new_v4();
        let req: ClientRequest = serde_json::from_value(serde_json::json!({
            "subscribe": "incidents",
            "status": ["pending", "in_progress"],
        }))
        .unwrap();
        assert_eq!(
            req,
            ClientRequest::Subscribe(Predicate::Incidents(
                IncidentFilter::any()
                    .with_status(IncidentStatus::Pending)
                    .with_status(IncidentStatus::InProgress)
            ))
        );

        let req: ClientRequest = serde_json::from_value(serde_json::json!({
            "subscribe": "messages",
            "incident_id": incident_id,
        }))
        .unwrap();
        assert_eq!(
            req,
            ClientRequest::Subscribe(Predicate::Messages(MessageFilter::for_incident(
                incident_id
            )))
        );
    }

    #[test]
    fn unsubscribe_request_parses() {
        let req: ClientRequest =
            serde_json::from_value(serde_json::json!({"unsubscribe": 3})).unwrap();
        assert_eq!(req, ClientRequest::Unsubscribe { unsubscribe: 3 });
    }

    #[test]
    fn unknown_subscription_kind_is_rejected() {
        let res: Result<ClientRequest, _> =
            serde_json::from_value(serde_json::json!({"subscribe": "profiles"}));
        assert!(res.is_err());
    }

    #[test]
    fn error_frame_shape() {
        let json = serde_json::to_value(ServerMessage::Error {
            error: "incident closed".into(),
            code: "FORBIDDEN",
        })
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "FORBIDDEN");
    }
}
