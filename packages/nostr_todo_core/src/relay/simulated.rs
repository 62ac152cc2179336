//! In-process relay simulator
//!
//! Provides a simulated set of relays that store records in memory and
//! can be told to misbehave. Used for testing the coordinators without
//! touching the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::record::{Event, Filter, Kind};

use super::transport::{RelayConnector, RelaySession};
use super::{RelayError, RelayUrl};

/// How a simulated relay behaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayMode {
    /// Stores and serves records
    Healthy,
    /// Every connection attempt fails
    Unreachable,
    /// Accepts connections and serves queries, answers every publish with `OK false`
    RejectWrites(String),
    /// Connection attempts never complete
    Hang,
}

struct SimRelay {
    mode: Mutex<RelayMode>,
    latency: Mutex<Duration>,
    events: Mutex<Vec<Event>>,
    connect_attempts: AtomicUsize,
    publish_attempts: AtomicUsize,
}

impl SimRelay {
    fn new() -> Self {
        Self {
            mode: Mutex::new(RelayMode::Healthy),
            latency: Mutex::new(Duration::ZERO),
            events: Mutex::new(Vec::new()),
            connect_attempts: AtomicUsize::new(0),
            publish_attempts: AtomicUsize::new(0),
        }
    }

    async fn mode(&self) -> RelayMode {
        self.mode.lock().await.clone()
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().await;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Store with parameterized-replaceable semantics: one record per
    /// (pubkey, kind, `d` tag). The newer record wins; on equal
    /// `created_at` the lowest id is kept.
    async fn store(&self, event: Event) {
        let mut events = self.events.lock().await;
        if event.kind == Kind::ApplicationSpecificData {
            let same_address = |e: &Event| {
                e.pubkey == event.pubkey && e.kind == event.kind && e.namespace() == event.namespace()
            };
            let superseded = events.iter().any(|e| {
                same_address(e)
                    && (e.created_at > event.created_at
                        || (e.created_at == event.created_at && e.id <= event.id))
            });
            if superseded {
                return;
            }
            events.retain(|e| !same_address(e));
        }
        events.push(event);
    }

    async fn query(&self, filter: &Filter) -> Vec<Event> {
        let events = self.events.lock().await;
        let mut matched: Vec<Event> = events.iter().filter(|e| filter.matches(e)).cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// A shared set of simulated relays, keyed by address.
pub struct SimRelayNetwork {
    relays: Mutex<HashMap<RelayUrl, Arc<SimRelay>>>,
}

impl SimRelayNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            relays: Mutex::new(HashMap::new()),
        })
    }

    /// Register a healthy relay at `address` and return its parsed URL.
    ///
    /// Panics on an invalid address; this is a test fixture.
    pub async fn add_relay(&self, address: &str) -> RelayUrl {
        let url = RelayUrl::parse(address).expect("simulated relay address must be valid");
        self.relays
            .lock()
            .await
            .entry(url.clone())
            .or_insert_with(|| Arc::new(SimRelay::new()));
        url
    }

    async fn relay(&self, url: &RelayUrl) -> Option<Arc<SimRelay>> {
        self.relays.lock().await.get(url).cloned()
    }

    pub async fn set_mode(&self, url: &RelayUrl, mode: RelayMode) {
        if let Some(relay) = self.relay(url).await {
            *relay.mode.lock().await = mode;
        }
    }

    /// Delay applied before each connect, query and publish.
    /// Uses tokio time, so paused clocks advance instantly in tests.
    pub async fn set_latency(&self, url: &RelayUrl, latency: Duration) {
        if let Some(relay) = self.relay(url).await {
            *relay.latency.lock().await = latency;
        }
    }

    /// Put a record straight into a relay's store, bypassing verification.
    pub async fn seed(&self, url: &RelayUrl, event: Event) {
        if let Some(relay) = self.relay(url).await {
            relay.events.lock().await.push(event);
        }
    }

    /// Records currently held by a relay.
    pub async fn stored(&self, url: &RelayUrl) -> Vec<Event> {
        match self.relay(url).await {
            Some(relay) => relay.events.lock().await.clone(),
            None => Vec::new(),
        }
    }

    pub async fn connect_attempts(&self, url: &RelayUrl) -> usize {
        self.relay(url)
            .await
            .map(|r| r.connect_attempts.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub async fn publish_attempts(&self, url: &RelayUrl) -> usize {
        self.relay(url)
            .await
            .map(|r| r.publish_attempts.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl RelayConnector for SimRelayNetwork {
    async fn connect(&self, url: &RelayUrl) -> Result<Box<dyn RelaySession>, RelayError> {
        let relay = self
            .relay(url)
            .await
            .ok_or_else(|| RelayError::ConnectionFailed(format!("{}: no such relay", url)))?;
        relay.connect_attempts.fetch_add(1, Ordering::SeqCst);
        relay.delay().await;

        match relay.mode().await {
            RelayMode::Unreachable => Err(RelayError::ConnectionFailed(format!(
                "{}: connection refused",
                url
            ))),
            RelayMode::Hang => {
                std::future::pending::<()>().await;
                Err(RelayError::Timeout)
            }
            RelayMode::Healthy | RelayMode::RejectWrites(_) => Ok(Box::new(SimRelaySession {
                url: url.clone(),
                relay,
                open: true,
            })),
        }
    }
}

struct SimRelaySession {
    url: RelayUrl,
    relay: Arc<SimRelay>,
    open: bool,
}

#[async_trait]
impl RelaySession for SimRelaySession {
    fn relay(&self) -> &RelayUrl {
        &self.url
    }

    async fn query(&mut self, filter: &Filter) -> Result<Vec<Event>, RelayError> {
        if !self.open {
            return Err(RelayError::Closed);
        }
        self.relay.delay().await;
        Ok(self.relay.query(filter).await)
    }

    async fn publish(&mut self, event: &Event) -> Result<(), RelayError> {
        if !self.open {
            return Err(RelayError::Closed);
        }
        self.relay.publish_attempts.fetch_add(1, Ordering::SeqCst);
        self.relay.delay().await;

        if let RelayMode::RejectWrites(reason) = self.relay.mode().await {
            return Err(RelayError::Rejected(reason));
        }
        if let Err(e) = event.verify() {
            return Err(RelayError::Rejected(format!("invalid: {}", e)));
        }
        self.relay.store(event.clone()).await;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        self.open = false;
        Ok(())
    }
}
