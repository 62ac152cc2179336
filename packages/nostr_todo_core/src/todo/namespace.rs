//! Namespace keys: which stored document a local list name refers to.

use std::fmt;

/// Key used for the default (unnamed) list.
pub const DEFAULT_NAMESPACE: &str = "nostr-todo";

/// Addressing string stored in a record's `d` tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamespaceKey(String);

impl NamespaceKey {
    /// Derive the key for a list name. The empty name maps to
    /// [`DEFAULT_NAMESPACE`]; any other name to `nostr-todo-<name>`.
    pub fn for_list(name: &str) -> Self {
        if name.is_empty() {
            Self(DEFAULT_NAMESPACE.to_string())
        } else {
            Self(format!("{}-{}", DEFAULT_NAMESPACE, name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NamespaceKey {
    fn default() -> Self {
        Self::for_list("")
    }
}

impl fmt::Display for NamespaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NamespaceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name() {
        assert_eq!(NamespaceKey::for_list("").as_str(), "nostr-todo");
        assert_eq!(NamespaceKey::default(), NamespaceKey::for_list(""));
    }

    #[test]
    fn test_named_list() {
        assert_eq!(NamespaceKey::for_list("work").as_str(), "nostr-todo-work");
        assert_eq!(NamespaceKey::for_list("work"), NamespaceKey::for_list("work"));
        assert_ne!(NamespaceKey::for_list("work"), NamespaceKey::for_list("home"));
        assert_ne!(NamespaceKey::for_list("work"), NamespaceKey::default());
    }
}
