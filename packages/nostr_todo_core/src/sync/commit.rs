//! Commit coordinator
//!
//! Turns a list into one signed record and publishes it to every relay at
//! once. Each relay gets its own task and connection; a relay that fails
//! never stops the others, and the commit waits for every attempt before
//! returning. Whether the outcome is good enough is decided afterwards by
//! an `AcceptancePolicy`.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::identity::Credential;
use crate::record::{Event, UnsignedEvent};
use crate::relay::{RelayConnector, RelayError, RelayUrl};
use crate::todo::{NamespaceKey, TodoList};

use super::SyncError;

/// How many relays must accept a record for a commit to count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AcceptancePolicy {
    /// Succeed once every attempt has finished, whatever the outcomes
    #[default]
    BestEffort,
    /// Fail unless at least this many relays accepted
    AtLeast(usize),
}

impl AcceptancePolicy {
    /// `None` or `Some(0)` is best effort.
    pub fn from_min_accepted(min_accepted: Option<usize>) -> Self {
        match min_accepted {
            Some(n) if n > 0 => AcceptancePolicy::AtLeast(n),
            _ => AcceptancePolicy::BestEffort,
        }
    }
}

/// Result of one relay's publish attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeOutcome {
    Accepted,
    /// The relay answered `OK false`
    Rejected(String),
    /// Connection or protocol failure
    Failed(RelayError),
    /// The commit was cancelled before this relay finished
    Cancelled,
}

impl NodeOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, NodeOutcome::Accepted)
    }
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeOutcome::Accepted => write!(f, "accepted"),
            NodeOutcome::Rejected(reason) => write!(f, "rejected: {}", reason),
            NodeOutcome::Failed(e) => write!(f, "failed: {}", e),
            NodeOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeReport {
    pub relay: RelayUrl,
    pub outcome: NodeOutcome,
}

/// Per-relay outcomes of one commit, in configuration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReport {
    /// Id of the record that was published
    pub record_id: String,
    pub nodes: Vec<NodeReport>,
}

impl CommitReport {
    pub fn accepted(&self) -> usize {
        self.nodes.iter().filter(|n| n.outcome.is_accepted()).count()
    }

    pub fn attempted(&self) -> usize {
        self.nodes.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|n| !n.outcome.is_accepted())
    }
}

/// Signs and fans out new versions of a list.
pub struct CommitCoordinator {
    connector: Arc<dyn RelayConnector>,
    policy: AcceptancePolicy,
}

impl CommitCoordinator {
    pub fn new(connector: Arc<dyn RelayConnector>) -> Self {
        Self {
            connector,
            policy: AcceptancePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AcceptancePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> AcceptancePolicy {
        self.policy
    }

    /// Build the signed record for `list` under `namespace`.
    pub fn build_record(
        list: &TodoList,
        namespace: &NamespaceKey,
        credential: &Credential,
        created_at: i64,
    ) -> Result<Event, SyncError> {
        let body = list.to_json()?;
        let record = UnsignedEvent::application_data(namespace, body)
            .with_created_at(created_at)
            .sign(credential)?;
        Ok(record)
    }

    /// Sign `list`, stamped now, and publish it to every relay.
    ///
    /// Nothing is sent if serialization or signing fails.
    pub async fn commit(
        &self,
        list: &TodoList,
        namespace: &NamespaceKey,
        relays: &[RelayUrl],
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<CommitReport, SyncError> {
        self.commit_after(list, namespace, relays, credential, None, cancel)
            .await
    }

    /// Like [`commit`](Self::commit), but stamped strictly after
    /// `previous` so relays treat the record as the newer version even
    /// within the same second.
    ///
    /// Fails with `Cancelled` if `cancel` fired before every relay
    /// finished; writes already accepted stay on their relays.
    pub async fn commit_after(
        &self,
        list: &TodoList,
        namespace: &NamespaceKey,
        relays: &[RelayUrl],
        credential: &Credential,
        previous: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<CommitReport, SyncError> {
        if relays.is_empty() {
            return Err(SyncError::NoRelays);
        }
        let record = Self::build_record(list, namespace, credential, next_created_at(previous))?;
        let report = self.publish(Arc::new(record), relays, cancel).await;

        if cancel.is_cancelled()
            && report.nodes.iter().any(|n| n.outcome == NodeOutcome::Cancelled)
        {
            log::warn!(
                "commit of {} cancelled, {}/{} relays accepted",
                report.record_id,
                report.accepted(),
                report.attempted()
            );
            return Err(SyncError::Cancelled);
        }
        self.check(report)
    }

    /// Publish one record to every relay concurrently and wait for all
    /// attempts. Never fails; per-relay problems are in the report.
    pub async fn publish(
        &self,
        record: Arc<Event>,
        relays: &[RelayUrl],
        cancel: &CancellationToken,
    ) -> CommitReport {
        let mut attempts = JoinSet::new();
        for (index, relay) in relays.iter().enumerate() {
            let connector = Arc::clone(&self.connector);
            let relay = relay.clone();
            let record = Arc::clone(&record);
            let cancel = cancel.clone();
            attempts.spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => NodeOutcome::Cancelled,
                    outcome = publish_to(connector.as_ref(), &relay, &record) => outcome,
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<NodeOutcome>> = vec![None; relays.len()];
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => log::warn!("publish task failed: {}", e),
            }
        }

        let nodes: Vec<NodeReport> = relays
            .iter()
            .zip(outcomes)
            .map(|(relay, outcome)| NodeReport {
                relay: relay.clone(),
                outcome: outcome.unwrap_or_else(|| {
                    NodeOutcome::Failed(RelayError::Protocol("publish task aborted".into()))
                }),
            })
            .collect();

        for node in &nodes {
            match &node.outcome {
                NodeOutcome::Accepted => log::debug!("{} accepted {}", node.relay, record.id),
                other => log::warn!("{}: {}", node.relay, other),
            }
        }
        log::info!(
            "record {} accepted by {}/{} relays",
            record.id,
            nodes.iter().filter(|n| n.outcome.is_accepted()).count(),
            nodes.len()
        );

        CommitReport {
            record_id: record.id.clone(),
            nodes,
        }
    }

    fn check(&self, report: CommitReport) -> Result<CommitReport, SyncError> {
        match self.policy {
            AcceptancePolicy::AtLeast(required) if report.accepted() < required => {
                Err(SyncError::InsufficientAcceptance {
                    accepted: report.accepted(),
                    required,
                })
            }
            _ => Ok(report),
        }
    }
}

/// Current time, or one second past `previous` if that is not later.
pub fn next_created_at(previous: Option<i64>) -> i64 {
    let now = chrono::Utc::now().timestamp();
    match previous {
        Some(previous) => now.max(previous + 1),
        None => now,
    }
}

async fn publish_to(connector: &dyn RelayConnector, relay: &RelayUrl, record: &Event) -> NodeOutcome {
    let mut session = match connector.connect(relay).await {
        Ok(session) => session,
        Err(e) => return NodeOutcome::Failed(e),
    };
    let outcome = match session.publish(record).await {
        Ok(()) => NodeOutcome::Accepted,
        Err(RelayError::Rejected(reason)) => NodeOutcome::Rejected(reason),
        Err(e) => NodeOutcome::Failed(e),
    };
    if let Err(e) = session.close().await {
        log::debug!("{}: close failed: {}", relay, e);
    }
    outcome
}
