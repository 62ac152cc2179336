//! Subscription filters (NIP-01 `REQ` bodies)

use serde::{Deserialize, Serialize};

use crate::todo::NamespaceKey;

use super::{Event, Kind, NAMESPACE_TAG};

/// Query scope sent to relays and applied locally by the simulated relay.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<Kind>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,

    /// Values accepted for the `d` tag
    #[serde(rename = "#d", default, skip_serializing_if = "Vec::is_empty")]
    pub d_tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// Application-data records whose `d` tag equals `namespace` exactly.
    pub fn for_namespace(namespace: &NamespaceKey) -> Self {
        Self {
            kinds: vec![Kind::ApplicationSpecificData],
            d_tags: vec![namespace.as_str().to_string()],
            ..Default::default()
        }
    }

    /// Restrict to records signed by `pubkey` (hex).
    pub fn author(mut self, pubkey: impl Into<String>) -> Self {
        self.authors.push(pubkey.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Local evaluation. `limit` is not applied here.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.iter().any(|a| *a == event.pubkey) {
            return false;
        }
        if !self.d_tags.is_empty() {
            let tagged = event
                .tags
                .iter()
                .filter(|tag| tag.first().map(String::as_str) == Some(NAMESPACE_TAG))
                .filter_map(|tag| tag.get(1))
                .any(|value| self.d_tags.contains(value));
            if !tagged {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Credential;
    use crate::record::UnsignedEvent;

    #[test]
    fn test_wire_shape() {
        let filter = Filter::for_namespace(&NamespaceKey::for_list("")).author("ab").limit(1);
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(
            json,
            r##"{"kinds":[30078],"authors":["ab"],"#d":["nostr-todo"],"limit":1}"##
        );
        assert_eq!(serde_json::from_str::<Filter>(&json).unwrap(), filter);
    }

    #[test]
    fn test_matches_namespace_exactly() {
        let cred = Credential::generate();
        let work = UnsignedEvent::application_data(&NamespaceKey::for_list("work"), "[]")
            .sign(&cred)
            .unwrap();
        let default = UnsignedEvent::application_data(&NamespaceKey::default(), "[]")
            .sign(&cred)
            .unwrap();

        let filter = Filter::for_namespace(&NamespaceKey::for_list("work"));
        assert!(filter.matches(&work));
        assert!(!filter.matches(&default));
    }

    #[test]
    fn test_matches_kind_and_author() {
        let cred = Credential::generate();
        let other_kind = UnsignedEvent::new(Kind::Other(1), "[]")
            .with_tag("d", "nostr-todo")
            .sign(&cred)
            .unwrap();
        let filter = Filter::for_namespace(&NamespaceKey::default());
        assert!(!filter.matches(&other_kind));

        let event = UnsignedEvent::application_data(&NamespaceKey::default(), "[]")
            .sign(&cred)
            .unwrap();
        assert!(filter.clone().author(cred.public_key_hex()).matches(&event));
        assert!(!filter.author(Credential::generate().public_key_hex()).matches(&event));
    }
}
