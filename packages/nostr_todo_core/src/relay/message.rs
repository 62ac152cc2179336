//! NIP-01 wire messages
//!
//! Every frame is a JSON array whose first element names the message.

use serde_json::Value;

use crate::record::{Event, Filter};

use super::RelayError;

/// Client to relay.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    Event(Event),
    Close(String),
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, RelayError> {
        let encode = |v: Result<Value, serde_json::Error>| {
            v.map_err(|e| RelayError::Protocol(format!("encode failed: {}", e)))
        };
        let frame = match self {
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                let mut frame = vec![Value::from("REQ"), Value::from(subscription_id.as_str())];
                for filter in filters {
                    frame.push(encode(serde_json::to_value(filter))?);
                }
                Value::Array(frame)
            }
            ClientMessage::Event(event) => {
                Value::Array(vec![Value::from("EVENT"), encode(serde_json::to_value(event))?])
            }
            ClientMessage::Close(subscription_id) => {
                Value::Array(vec![Value::from("CLOSE"), Value::from(subscription_id.as_str())])
            }
        };
        Ok(frame.to_string())
    }
}

/// Relay to client.
#[derive(Clone, Debug, PartialEq)]
pub enum RelayMessage {
    Event {
        subscription_id: String,
        event: Box<Event>,
    },
    EndOfStoredEvents(String),
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Notice(String),
    Closed {
        subscription_id: String,
        message: String,
    },
    Auth(String),
}

impl RelayMessage {
    pub fn from_json(frame: &str) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| RelayError::Protocol(format!("malformed frame: {}", e)))?;
        let items = value
            .as_array()
            .ok_or_else(|| RelayError::Protocol("frame is not an array".into()))?;
        let label = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::Protocol("frame has no label".into()))?;

        let text = |index: usize| -> Result<String, RelayError> {
            items
                .get(index)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| RelayError::Protocol(format!("{} frame missing field {}", label, index)))
        };
        // Trailing messages are optional on OK and CLOSED
        let optional_text = |index: usize| {
            items
                .get(index)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        match label {
            "EVENT" => {
                let raw = items
                    .get(2)
                    .ok_or_else(|| RelayError::Protocol("EVENT frame missing event".into()))?;
                let event: Event = serde_json::from_value(raw.clone())
                    .map_err(|e| RelayError::Protocol(format!("malformed event: {}", e)))?;
                Ok(RelayMessage::Event {
                    subscription_id: text(1)?,
                    event: Box::new(event),
                })
            }
            "EOSE" => Ok(RelayMessage::EndOfStoredEvents(text(1)?)),
            "OK" => {
                let accepted = items
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| RelayError::Protocol("OK frame missing verdict".into()))?;
                Ok(RelayMessage::Ok {
                    event_id: text(1)?,
                    accepted,
                    message: optional_text(3),
                })
            }
            "NOTICE" => Ok(RelayMessage::Notice(text(1)?)),
            "CLOSED" => Ok(RelayMessage::Closed {
                subscription_id: text(1)?,
                message: optional_text(2),
            }),
            "AUTH" => Ok(RelayMessage::Auth(text(1)?)),
            other => Err(RelayError::Protocol(format!("unknown frame {}", other))),
        }
    }
}
