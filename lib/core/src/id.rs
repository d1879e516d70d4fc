//! Strongly-typed identifiers for flow entities.
//!
//! Identifiers are issued by the external flow authoring system, so they are
//! opaque strings rather than generated values. The newtypes keep an
//! organization id from being passed where a flow id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a strongly-typed string identifier.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from any string-like value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(
    /// Identifier of the organization that owns a flow.
    OrganizationId
);

define_id!(
    /// Identifier embedded in a public webhook URL.
    WebhookId
);

define_id!(
    /// Identifier of a flow graph.
    FlowId
);

define_id!(
    /// Identifier of a node within a flow graph.
    NodeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_raw_value() {
        let id = NodeId::new("node-1");
        assert_eq!(id.to_string(), "node-1");
        assert_eq!(id.as_str(), "node-1");
    }

    #[test]
    fn serializes_transparently() {
        let id = FlowId::from("flow-7");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"flow-7\"");

        let parsed: FlowId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, id);
    }

    #[test]
    fn id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(OrganizationId::new("org-a"));
        set.insert(OrganizationId::new("org-b"));
        set.insert(OrganizationId::new("org-a"));

        assert_eq!(set.len(), 2);
    }
}
