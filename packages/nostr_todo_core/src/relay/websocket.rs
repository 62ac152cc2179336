//! WebSocket relay client
//!
//! One session is one WebSocket connection speaking NIP-01 text frames.
//! Every network step is bounded by a timeout from `TransportConfig`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::record::{Event, Filter};

use super::message::{ClientMessage, RelayMessage};
use super::transport::{RelayConnector, RelaySession};
use super::{RelayError, RelayUrl};

/// Per-operation time limits.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    /// Upper bound for a whole subscription, from `REQ` to `EOSE`
    pub query_timeout: Duration,
    /// Upper bound for waiting on the relay's `OK`
    pub publish_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(10),
        }
    }
}

/// Connects to real relays over `ws://` or `wss://`.
#[derive(Clone, Debug, Default)]
pub struct WebSocketConnector {
    config: TransportConfig,
}

impl WebSocketConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RelayConnector for WebSocketConnector {
    async fn connect(&self, relay: &RelayUrl) -> Result<Box<dyn RelaySession>, RelayError> {
        let (stream, _response) = timeout(self.config.connect_timeout, connect_async(relay.as_str()))
            .await
            .map_err(|_| RelayError::Timeout)?
            .map_err(|e| RelayError::ConnectionFailed(format!("{}: {}", relay, e)))?;

        log::debug!("Connected to {}", relay);
        Ok(Box::new(WebSocketSession {
            relay: relay.clone(),
            stream,
            config: self.config.clone(),
            next_subscription: 0,
        }))
    }
}

struct WebSocketSession {
    relay: RelayUrl,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    config: TransportConfig,
    next_subscription: u64,
}

impl WebSocketSession {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), RelayError> {
        let frame = message.to_json()?;
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| RelayError::ConnectionFailed(format!("send failed: {}", e)))
    }

    /// Next NIP-01 frame. Control frames are skipped; pings are answered
    /// by tungstenite itself.
    async fn recv(&mut self) -> Result<RelayMessage, RelayError> {
        loop {
            let message = self
                .stream
                .next()
                .await
                .ok_or(RelayError::Closed)?
                .map_err(|e| RelayError::ConnectionFailed(format!("receive failed: {}", e)))?;

            match message {
                Message::Text(text) => return RelayMessage::from_json(&text),
                Message::Binary(data) => {
                    let text = String::from_utf8(data)
                        .map_err(|_| RelayError::Protocol("binary frame is not UTF-8".into()))?;
                    return RelayMessage::from_json(&text);
                }
                Message::Close(_) => return Err(RelayError::Closed),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn collect_until_eose(
        &mut self,
        subscription_id: &str,
        events: &mut Vec<Event>,
    ) -> Result<(), RelayError> {
        loop {
            match self.recv().await? {
                RelayMessage::Event {
                    subscription_id: sub,
                    event,
                } if sub == subscription_id => events.push(*event),
                RelayMessage::EndOfStoredEvents(sub) if sub == subscription_id => return Ok(()),
                RelayMessage::Closed {
                    subscription_id: sub,
                    message,
                } if sub == subscription_id => {
                    return Err(RelayError::Protocol(format!("subscription closed: {}", message)))
                }
                RelayMessage::Notice(notice) => log::debug!("{} notice: {}", self.relay, notice),
                other => log::debug!("{} ignored frame: {:?}", self.relay, other),
            }
        }
    }

    async fn await_ok(&mut self, event_id: &str) -> Result<(), RelayError> {
        loop {
            match self.recv().await? {
                RelayMessage::Ok {
                    event_id: id,
                    accepted,
                    message,
                } if id == event_id => {
                    return if accepted {
                        Ok(())
                    } else {
                        Err(RelayError::Rejected(message))
                    };
                }
                RelayMessage::Notice(notice) => log::debug!("{} notice: {}", self.relay, notice),
                other => log::debug!("{} ignored frame: {:?}", self.relay, other),
            }
        }
    }
}

#[async_trait]
impl RelaySession for WebSocketSession {
    fn relay(&self) -> &RelayUrl {
        &self.relay
    }

    async fn query(&mut self, filter: &Filter) -> Result<Vec<Event>, RelayError> {
        self.next_subscription += 1;
        let subscription_id = format!("nostr-todo-{}", self.next_subscription);

        self.send(&ClientMessage::Req {
            subscription_id: subscription_id.clone(),
            filters: vec![filter.clone()],
        })
        .await?;

        let mut events = Vec::new();
        let deadline = self.config.query_timeout;
        let outcome = timeout(deadline, self.collect_until_eose(&subscription_id, &mut events)).await;

        // Best effort; the subscription dies with the connection anyway.
        let _ = self.send(&ClientMessage::Close(subscription_id)).await;

        match outcome {
            Ok(Ok(())) => Ok(events),
            Ok(Err(e)) => Err(e),
            // A relay that never sends EOSE still answered if it sent events.
            Err(_) if !events.is_empty() => Ok(events),
            Err(_) => Err(RelayError::Timeout),
        }
    }

    async fn publish(&mut self, event: &Event) -> Result<(), RelayError> {
        self.send(&ClientMessage::Event(event.clone())).await?;
        timeout(self.config.publish_timeout, self.await_ok(&event.id))
            .await
            .map_err(|_| RelayError::Timeout)?
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| RelayError::ConnectionFailed(format!("close failed: {}", e)))
    }
}
