//! Fetch coordinator
//!
//! Finds the stored list for a namespace. How relays are consulted is a
//! `FetchStrategy`; the default `FirstResponse` races all relays and takes
//! the first one that returns a matching record, without comparing
//! answers across relays.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::record::{Event, Filter};
use crate::relay::{RelayConnector, RelayError, RelayUrl};
use crate::todo::{NamespaceKey, TodoList};

use super::SyncError;

/// How the stored record is located across relays.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// `Ok(None)` means no relay had a matching record.
    async fn fetch(
        &self,
        relays: &[RelayUrl],
        filter: &Filter,
        cancel: &CancellationToken,
    ) -> Result<Option<Event>, SyncError>;
}

/// Query every relay concurrently; the first relay that answers with a
/// valid matching record wins and the rest are abandoned.
pub struct FirstResponse {
    connector: Arc<dyn RelayConnector>,
}

impl FirstResponse {
    pub fn new(connector: Arc<dyn RelayConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl FetchStrategy for FirstResponse {
    async fn fetch(
        &self,
        relays: &[RelayUrl],
        filter: &Filter,
        cancel: &CancellationToken,
    ) -> Result<Option<Event>, SyncError> {
        let mut queries = JoinSet::new();
        for relay in relays {
            let connector = Arc::clone(&self.connector);
            let relay = relay.clone();
            let filter = filter.clone();
            queries.spawn(async move {
                let result = query_relay(connector.as_ref(), &relay, &filter).await;
                (relay, result)
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    queries.abort_all();
                    return Err(SyncError::Cancelled);
                }
                joined = queries.join_next() => match joined {
                    None => return Ok(None),
                    Some(Ok((relay, Ok(Some(event))))) => {
                        log::debug!("{} answered first with record {}", relay, event.id);
                        queries.abort_all();
                        return Ok(Some(event));
                    }
                    Some(Ok((relay, Ok(None)))) => {
                        log::debug!("{} has no matching record", relay);
                    }
                    Some(Ok((relay, Err(e)))) => {
                        log::warn!("{}: {}", relay, e);
                    }
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => {
                        log::warn!("query task failed: {}", e);
                    }
                },
            }
        }
    }
}

/// Ask one relay. Records that fail verification or do not match the
/// filter are dropped; of the rest, the newest is returned.
async fn query_relay(
    connector: &dyn RelayConnector,
    relay: &RelayUrl,
    filter: &Filter,
) -> Result<Option<Event>, RelayError> {
    let mut session = connector.connect(relay).await?;
    let result = session.query(filter).await;
    if let Err(e) = session.close().await {
        log::debug!("{}: close failed: {}", relay, e);
    }

    let newest = result?
        .into_iter()
        .filter(|event| {
            if !filter.matches(event) {
                log::warn!("{} returned record {} outside the filter", relay, event.id);
                return false;
            }
            match event.verify() {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("{} returned unverifiable record: {}", relay, e);
                    false
                }
            }
        })
        .max_by_key(|event| event.created_at);
    Ok(newest)
}

/// A fetched list and the `created_at` of the record it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredList {
    pub list: TodoList,
    pub created_at: i64,
}

/// Loads the list for a namespace through a `FetchStrategy`.
pub struct FetchCoordinator {
    strategy: Arc<dyn FetchStrategy>,
}

impl FetchCoordinator {
    pub fn new(strategy: Arc<dyn FetchStrategy>) -> Self {
        Self { strategy }
    }

    /// Coordinator using the default first-response strategy.
    pub fn first_response(connector: Arc<dyn RelayConnector>) -> Self {
        Self::new(Arc::new(FirstResponse::new(connector)))
    }

    /// Fetch the list stored under `namespace` by any signer.
    pub async fn fetch(
        &self,
        relays: &[RelayUrl],
        namespace: &NamespaceKey,
        cancel: &CancellationToken,
    ) -> Result<TodoList, SyncError> {
        let stored = self
            .fetch_with(relays, namespace, Filter::for_namespace(namespace), cancel)
            .await?;
        Ok(stored.list)
    }

    /// Fetch the list stored under `namespace` by `author` (hex public key).
    pub async fn fetch_from(
        &self,
        relays: &[RelayUrl],
        namespace: &NamespaceKey,
        author: &str,
        cancel: &CancellationToken,
    ) -> Result<TodoList, SyncError> {
        Ok(self.fetch_stored(relays, namespace, author, cancel).await?.list)
    }

    /// Like [`fetch_from`](Self::fetch_from), keeping the record's timestamp.
    pub async fn fetch_stored(
        &self,
        relays: &[RelayUrl],
        namespace: &NamespaceKey,
        author: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredList, SyncError> {
        let filter = Filter::for_namespace(namespace).author(author).limit(1);
        self.fetch_with(relays, namespace, filter, cancel).await
    }

    async fn fetch_with(
        &self,
        relays: &[RelayUrl],
        namespace: &NamespaceKey,
        filter: Filter,
        cancel: &CancellationToken,
    ) -> Result<StoredList, SyncError> {
        if relays.is_empty() {
            return Err(SyncError::NoRelays);
        }

        let event = self
            .strategy
            .fetch(relays, &filter, cancel)
            .await?
            .ok_or_else(|| SyncError::NotFound(namespace.to_string()))?;

        let list = TodoList::from_json(&event.content).map_err(|e| SyncError::CorruptRecord {
            record_id: event.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(StoredList {
            list,
            created_at: event.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Credential;
    use crate::record::UnsignedEvent;
    use crate::relay::simulated::{RelayMode, SimRelayNetwork};
    use crate::todo::Task;
    use std::time::Duration;

    fn list_record(cred: &Credential, ns: &NamespaceKey, list: &TodoList, created_at: i64) -> Event {
        UnsignedEvent::application_data(ns, list.to_json().unwrap())
            .with_created_at(created_at)
            .sign(cred)
            .unwrap()
    }

    fn sample_list(content: &str) -> TodoList {
        TodoList::from_tasks(vec![Task {
            id: "t1".into(),
            content: content.into(),
            done: false,
            created_at: 100,
        }])
    }

    #[tokio::test]
    async fn test_no_matching_relay_is_not_found() {
        let network = SimRelayNetwork::new();
        let relays = vec![network.add_relay("wss://a.example").await, network.add_relay("wss://b.example").await];
        let fetcher = FetchCoordinator::first_response(network.clone());

        let result = fetcher
            .fetch(&relays, &NamespaceKey::for_list("work"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(SyncError::NotFound(ns)) if ns == "nostr-todo-work"));
    }

    #[tokio::test]
    async fn test_all_relays_down_is_not_found() {
        let network = SimRelayNetwork::new();
        let a = network.add_relay("wss://a.example").await;
        network.set_mode(&a, RelayMode::Unreachable).await;
        let fetcher = FetchCoordinator::first_response(network.clone());

        let result = fetcher
            .fetch(&[a], &NamespaceKey::default(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(SyncError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_relay_set() {
        let network = SimRelayNetwork::new();
        let fetcher = FetchCoordinator::first_response(network);
        let result = fetcher
            .fetch(&[], &NamespaceKey::default(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(SyncError::NoRelays)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_answer_wins() {
        let network = SimRelayNetwork::new();
        let slow = network.add_relay("wss://slow.example").await;
        let fast = network.add_relay("wss://fast.example").await;
        network.set_latency(&slow, Duration::from_millis(500)).await;

        let cred = Credential::generate();
        let ns = NamespaceKey::default();
        network.seed(&slow, list_record(&cred, &ns, &sample_list("from slow"), 200)).await;
        network.seed(&fast, list_record(&cred, &ns, &sample_list("from fast"), 100)).await;

        let fetcher = FetchCoordinator::first_response(network.clone());
        let list = fetcher
            .fetch(&[slow, fast], &ns, &CancellationToken::new())
            .await
            .unwrap();
        // No cross-relay comparison: the older record from the faster relay wins.
        assert_eq!(list.tasks()[0].content, "from fast");
    }

    #[tokio::test]
    async fn test_corrupt_body_is_distinct_from_not_found() {
        let network = SimRelayNetwork::new();
        let relay = network.add_relay("wss://a.example").await;
        let cred = Credential::generate();
        let ns = NamespaceKey::default();
        let garbage = UnsignedEvent::application_data(&ns, "{not a list")
            .sign(&cred)
            .unwrap();
        network.seed(&relay, garbage.clone()).await;

        let fetcher = FetchCoordinator::first_response(network.clone());
        let result = fetcher.fetch(&[relay], &ns, &CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::CorruptRecord { record_id, .. }) if record_id == garbage.id));
    }

    #[tokio::test]
    async fn test_unverifiable_records_are_skipped() {
        let network = SimRelayNetwork::new();
        let liar = network.add_relay("wss://liar.example").await;
        let honest = network.add_relay("wss://honest.example").await;
        let cred = Credential::generate();
        let ns = NamespaceKey::default();

        let mut forged = list_record(&cred, &ns, &sample_list("forged"), 300);
        forged.content = sample_list("tampered").to_json().unwrap();
        network.seed(&liar, forged).await;
        network.seed(&honest, list_record(&cred, &ns, &sample_list("genuine"), 100)).await;

        let fetcher = FetchCoordinator::first_response(network.clone());
        let list = fetcher
            .fetch(&[liar, honest], &ns, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(list.tasks()[0].content, "genuine");
    }

    #[tokio::test]
    async fn test_author_scoping() {
        let network = SimRelayNetwork::new();
        let relay = network.add_relay("wss://a.example").await;
        let me = Credential::generate();
        let stranger = Credential::generate();
        let ns = NamespaceKey::default();
        network.seed(&relay, list_record(&stranger, &ns, &sample_list("theirs"), 500)).await;
        network.seed(&relay, list_record(&me, &ns, &sample_list("mine"), 100)).await;

        let fetcher = FetchCoordinator::first_response(network.clone());
        let list = fetcher
            .fetch_from(&[relay.clone()], &ns, &me.public_key_hex(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(list.tasks()[0].content, "mine");

        let stored = fetcher
            .fetch_stored(&[relay], &ns, &me.public_key_hex(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stored.created_at, 100);
        assert_eq!(stored.list, list);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation() {
        let network = SimRelayNetwork::new();
        let relay = network.add_relay("wss://hang.example").await;
        network.set_mode(&relay, RelayMode::Hang).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let fetcher = FetchCoordinator::first_response(network.clone());
        let result = fetcher.fetch(&[relay], &NamespaceKey::default(), &cancel).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }
}
