//! One command's fetch → mutate → commit cycle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::identity::Credential;
use crate::relay::{RelayConnector, RelayUrl};
use crate::todo::{Mutation, MutationOutcome, NamespaceKey, TodoList};

use super::{
    AcceptancePolicy, CommitCoordinator, CommitReport, FetchCoordinator, FetchStrategy, StoredList, SyncError,
};

/// Result of a committed mutation.
#[derive(Debug)]
pub struct Applied {
    /// The list as it was published
    pub list: TodoList,
    pub outcome: MutationOutcome,
    pub report: CommitReport,
}

/// Everything one command needs to read and write lists: the relay set,
/// the caller's credential and the two coordinators. Built once from
/// configuration and passed explicitly; holds no state between commands.
pub struct SyncSession {
    relays: Vec<RelayUrl>,
    credential: Credential,
    fetch: FetchCoordinator,
    commit: CommitCoordinator,
    cancel: CancellationToken,
}

impl SyncSession {
    pub fn new(connector: Arc<dyn RelayConnector>, relays: Vec<RelayUrl>, credential: Credential) -> Self {
        Self {
            relays,
            credential,
            fetch: FetchCoordinator::first_response(Arc::clone(&connector)),
            commit: CommitCoordinator::new(connector),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: AcceptancePolicy) -> Self {
        self.commit = self.commit.with_policy(policy);
        self
    }

    /// Cancel in-flight relay work when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_fetch_strategy(mut self, strategy: Arc<dyn FetchStrategy>) -> Self {
        self.fetch = FetchCoordinator::new(strategy);
        self
    }

    pub fn relays(&self) -> &[RelayUrl] {
        &self.relays
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Fetch the caller's list for `namespace`.
    pub async fn load(&self, namespace: &NamespaceKey) -> Result<TodoList, SyncError> {
        Ok(self.load_stored(namespace).await?.list)
    }

    /// Fetch the caller's list together with its record timestamp.
    pub async fn load_stored(&self, namespace: &NamespaceKey) -> Result<StoredList, SyncError> {
        let author = self.credential.public_key_hex();
        log::debug!("Loading {} for {}", namespace, author);
        self.fetch
            .fetch_stored(&self.relays, namespace, &author, &self.cancel)
            .await
    }

    /// Publish `list` as the new version of `namespace`.
    pub async fn save(&self, namespace: &NamespaceKey, list: &TodoList) -> Result<CommitReport, SyncError> {
        self.save_after(namespace, list, None).await
    }

    /// Publish `list`, stamped after the record loaded at `previous`.
    pub async fn save_after(
        &self,
        namespace: &NamespaceKey,
        list: &TodoList,
        previous: Option<i64>,
    ) -> Result<CommitReport, SyncError> {
        self.commit
            .commit_after(list, namespace, &self.relays, &self.credential, previous, &self.cancel)
            .await
    }

    /// Fetch, apply `mutation`, commit.
    ///
    /// A namespace with no stored list starts empty for `Add`; every other
    /// mutation fails with `NotFound`.
    pub async fn apply(&self, namespace: &NamespaceKey, mutation: &Mutation) -> Result<Applied, SyncError> {
        let (list, previous) = match self.load_stored(namespace).await {
            Ok(stored) => (stored.list, Some(stored.created_at)),
            Err(SyncError::NotFound(_)) if mutation.tolerates_missing_document() => {
                log::info!("No list stored under {}, starting a new one", namespace);
                (TodoList::new(), None)
            }
            Err(e) => return Err(e),
        };

        let (list, outcome) = mutation.apply(list);
        for id in &outcome.unmatched {
            log::debug!("{}: no task with id {}", namespace, id);
        }

        let report = self.save_after(namespace, &list, previous).await?;
        Ok(Applied { list, outcome, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::simulated::{RelayMode, SimRelayNetwork};
    use std::time::Duration;

    fn session(network: &Arc<SimRelayNetwork>, relays: Vec<RelayUrl>) -> SyncSession {
        SyncSession::new(network.clone(), relays, Credential::generate())
    }

    #[tokio::test]
    async fn test_add_starts_empty_list() {
        let network = SimRelayNetwork::new();
        let relay = network.add_relay("wss://a.example").await;
        let session = session(&network, vec![relay.clone()]);
        let ns = NamespaceKey::default();

        let applied = session
            .apply(&ns, &Mutation::Add { content: "write report".into() })
            .await
            .unwrap();

        assert_eq!(applied.list.len(), 1);
        assert_eq!(applied.outcome.added.as_deref(), Some(applied.list.tasks()[0].id.as_str()));
        assert_eq!(applied.report.accepted(), 1);
        assert_eq!(session.load(&ns).await.unwrap(), applied.list);
    }

    #[tokio::test]
    async fn test_other_mutations_need_existing_list() {
        let network = SimRelayNetwork::new();
        let relay = network.add_relay("wss://a.example").await;
        let session = session(&network, vec![relay.clone()]);

        let result = session
            .apply(&NamespaceKey::default(), &Mutation::MarkDone { ids: vec!["x".into()] })
            .await;
        assert!(matches!(result, Err(SyncError::NotFound(_))));
        assert_eq!(network.publish_attempts(&relay).await, 0);
    }

    #[tokio::test]
    async fn test_unmatched_ids_still_commit() {
        let network = SimRelayNetwork::new();
        let relay = network.add_relay("wss://a.example").await;
        let session = session(&network, vec![relay.clone()]);
        let ns = NamespaceKey::for_list("home");

        session.apply(&ns, &Mutation::Add { content: "water plants".into() }).await.unwrap();
        let applied = session
            .apply(&ns, &Mutation::Edit { id: "nope".into(), content: "x".into() })
            .await
            .unwrap();

        assert_eq!(applied.outcome.unmatched, vec!["nope".to_string()]);
        assert_eq!(applied.list.tasks()[0].content, "water plants");
        assert_eq!(network.publish_attempts(&relay).await, 2);
    }

    #[tokio::test]
    async fn test_lists_of_other_signers_are_invisible() {
        let network = SimRelayNetwork::new();
        let relay = network.add_relay("wss://a.example").await;
        let ns = NamespaceKey::default();

        let someone = session(&network, vec![relay.clone()]);
        someone.apply(&ns, &Mutation::Add { content: "theirs".into() }).await.unwrap();

        let me = session(&network, vec![relay]);
        assert!(matches!(me.load(&ns).await, Err(SyncError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_policy_is_applied() {
        let network = SimRelayNetwork::new();
        let down = network.add_relay("wss://down.example").await;
        network.set_mode(&down, RelayMode::Unreachable).await;

        let session = session(&network, vec![down]).with_policy(AcceptancePolicy::AtLeast(1));
        let result = session
            .apply(&NamespaceKey::default(), &Mutation::Add { content: "x".into() })
            .await;
        assert!(matches!(
            result,
            Err(SyncError::InsufficientAcceptance { accepted: 0, required: 1 })
        ));
    }

    #[tokio::test]
    async fn test_back_to_back_mutations_are_all_kept() {
        let network = SimRelayNetwork::new();
        let relay = network.add_relay("wss://a.example").await;
        let session = session(&network, vec![relay.clone()]);
        let ns = NamespaceKey::default();
        let started = chrono::Utc::now().timestamp();

        for content in ["one", "two", "three"] {
            session.apply(&ns, &Mutation::Add { content: content.into() }).await.unwrap();
        }

        let stored = session.load_stored(&ns).await.unwrap();
        assert_eq!(stored.list.len(), 3);
        assert_eq!(network.stored(&relay).await.len(), 1);
        assert!(stored.created_at >= started + 2);
    }

    #[tokio::test]
    async fn test_cancelled_session() {
        let network = SimRelayNetwork::new();
        let relay = network.add_relay("wss://a.example").await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let session = session(&network, vec![relay.clone()]).with_cancellation(cancel);
        let result = session.load(&NamespaceKey::default()).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));

        let result = session.save(&NamespaceKey::default(), &TodoList::new()).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(network.stored(&relay).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_commit_is_an_error() {
        let network = SimRelayNetwork::new();
        let slow = network.add_relay("wss://slow.example").await;
        let stuck = network.add_relay("wss://stuck.example").await;
        let ns = NamespaceKey::default();

        let cancel = CancellationToken::new();
        let session = session(&network, vec![slow.clone(), stuck.clone()]).with_cancellation(cancel.clone());
        let added = session
            .apply(&ns, &Mutation::Add { content: "pay rent".into() })
            .await
            .unwrap();
        let id = added.list.tasks()[0].id.clone();

        // The fetch answers at 4s; the commit is still connecting when cancelled at 5s.
        network.set_latency(&slow, Duration::from_secs(2)).await;
        network.set_mode(&stuck, RelayMode::Hang).await;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });

        let result = session.apply(&ns, &Mutation::MarkDone { ids: vec![id] }).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(!network.stored(&slow).await[0].content.contains("\"done\":true"));
    }
}
