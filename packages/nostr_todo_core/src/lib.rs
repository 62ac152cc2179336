// nostr-todo - a single user's task list replicated across Nostr relays

pub mod config;
pub mod identity;
pub mod record;
pub mod relay;
pub mod sync;
pub mod todo;

pub use config::Config;
pub use identity::Credential;
pub use relay::RelayUrl;
pub use sync::{AcceptancePolicy, CommitReport, SyncError, SyncSession};
pub use todo::{Mutation, NamespaceKey, Task, TodoList};
