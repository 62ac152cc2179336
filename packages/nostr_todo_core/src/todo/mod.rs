//! The task list document
//!
//! A `TodoList` is the whole replicated value: one JSON array of tasks,
//! stored as the content of a single signed record per namespace.
//! The list is kept sorted by creation time; the order is re-derived on
//! every load and never stored separately.

pub mod namespace;
pub mod ops;

pub use namespace::NamespaceKey;
pub use ops::{Mutation, MutationOutcome};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// One item of the list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Caller-assigned identifier, immutable once created
    pub id: String,
    /// Free-form text
    pub content: String,
    pub done: bool,
    /// Unix seconds; only used for ordering
    pub created_at: i64,
}

impl Task {
    /// Create an open task with a fresh v4 UUID, stamped with the current time.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            done: false,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// An ordered sequence of tasks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoList {
    tasks: Vec<Task>,
}

impl TodoList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from tasks in any order. The result is sorted.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let mut list = Self { tasks };
        list.sort();
        list
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Stable sort ascending by `created_at`; tasks created in the same
    /// second keep their relative order.
    pub fn sort(&mut self) {
        self.tasks.sort_by_key(|t| t.created_at);
    }

    pub(crate) fn tasks_mut(&mut self) -> &mut Vec<Task> {
        &mut self.tasks
    }

    /// Serialize to the record body. Field order follows `Task`'s declaration,
    /// so equal lists always produce identical bytes.
    pub fn to_json(&self) -> Result<String, DocumentError> {
        serde_json::to_string(&self.tasks)
            .map_err(|e| DocumentError::SerializationError(e.to_string()))
    }

    /// Parse a record body. The result is sorted.
    pub fn from_json(body: &str) -> Result<Self, DocumentError> {
        let tasks: Vec<Task> = serde_json::from_str(body)
            .map_err(|e| DocumentError::DeserializationError(e.to_string()))?;
        Ok(Self::from_tasks(tasks))
    }
}

impl<'a> IntoIterator for &'a TodoList {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}
