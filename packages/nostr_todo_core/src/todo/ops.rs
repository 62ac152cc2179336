//! Mutation operations
//!
//! Each operation takes a loaded list by value and returns the changed list.
//! None of them talk to relays; they run between a fetch and a commit.
//! Identifiers that match nothing are not an error: they are reported back
//! in [`MutationOutcome::unmatched`] so the caller can warn about them.

use std::collections::HashSet;

use super::{Task, TodoList};

/// The change one command applies to the list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// Append a new open task
    Add { content: String },
    /// Set `done = true` on every listed id
    MarkDone { ids: Vec<String> },
    /// Set `done = false` on every listed id
    MarkUndone { ids: Vec<String> },
    /// Replace the content of exactly one task
    Edit { id: String, content: String },
    /// Remove every listed id, plus any task with an empty id
    Delete { ids: Vec<String> },
}

impl Mutation {
    /// Whether this mutation may start from an empty list when the
    /// namespace has never been written.
    pub fn tolerates_missing_document(&self) -> bool {
        matches!(self, Mutation::Add { .. })
    }

    pub fn apply(&self, list: TodoList) -> (TodoList, MutationOutcome) {
        match self {
            Mutation::Add { content } => {
                let (list, task) = add(list, content);
                (
                    list,
                    MutationOutcome {
                        added: Some(task.id),
                        unmatched: Vec::new(),
                    },
                )
            }
            Mutation::MarkDone { ids } => set_done(list, ids, true),
            Mutation::MarkUndone { ids } => set_done(list, ids, false),
            Mutation::Edit { id, content } => edit(list, id, content),
            Mutation::Delete { ids } => delete(list, ids),
        }
    }
}

/// What a mutation did besides changing the list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Id of the task created by `Add`
    pub added: Option<String>,
    /// Target ids that matched no task, in the order given
    pub unmatched: Vec<String>,
}

impl MutationOutcome {
    fn unmatched(unmatched: Vec<String>) -> Self {
        Self {
            added: None,
            unmatched,
        }
    }
}

/// Append a new open task with a fresh id and re-sort.
pub fn add(list: TodoList, content: &str) -> (TodoList, Task) {
    let mut task = Task::new(content);
    while list.get(&task.id).is_some() {
        task.id = uuid::Uuid::new_v4().to_string();
    }
    let list = insert(list, task.clone());
    (list, task)
}

/// Append an already-built task and re-sort.
pub fn insert(mut list: TodoList, task: Task) -> TodoList {
    list.tasks_mut().push(task);
    list.sort();
    list
}

pub fn set_done(mut list: TodoList, ids: &[String], done: bool) -> (TodoList, MutationOutcome) {
    let unmatched = missing_ids(&list, ids);
    let targets: HashSet<&str> = ids.iter().map(String::as_str).collect();
    for task in list.tasks_mut().iter_mut() {
        if targets.contains(task.id.as_str()) {
            task.done = done;
        }
    }
    (list, MutationOutcome::unmatched(unmatched))
}

pub fn edit(mut list: TodoList, id: &str, content: &str) -> (TodoList, MutationOutcome) {
    let mut matched = false;
    for task in list.tasks_mut().iter_mut().filter(|t| t.id == id) {
        task.content = content.to_string();
        matched = true;
    }
    let unmatched = if matched { Vec::new() } else { vec![id.to_string()] };
    (list, MutationOutcome::unmatched(unmatched))
}

/// Remove the listed tasks. Tasks with an empty id are always swept,
/// whatever the target set.
pub fn delete(mut list: TodoList, ids: &[String]) -> (TodoList, MutationOutcome) {
    let unmatched = missing_ids(&list, ids);
    let targets: HashSet<&str> = ids.iter().map(String::as_str).collect();
    list.tasks_mut()
        .retain(|t| !t.id.is_empty() && !targets.contains(t.id.as_str()));
    (list, MutationOutcome::unmatched(unmatched))
}

fn missing_ids(list: &TodoList, ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| list.get(id).is_none() && seen.insert(id.as_str()))
        .cloned()
        .collect()
}
