//! Typed identifiers.
//!
//! Agent identities are opaque String wrappers (serde-transparent); the core
//! never interprets them beyond equality. Mapping and observer ids are
//! monotonic counters handed out by their owning tables.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

macro_rules! counter_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> u64 {
                self.0
            }

            /// The id following this one.
            pub const fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

typed_name!(
    /// Identity of an agent on the network, as reported by the transport.
    AgentName
);

counter_id!(
    /// Identifier of a mapping entry. Unique and monotonic within one table.
    MappingId
);
counter_id!(
    /// Handle returned when registering an observer.
    ObserverId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_name_from_str() {
        let name: AgentName = "sensor-1".into();
        assert_eq!(name.as_str(), "sensor-1");
        assert_eq!(name.to_string(), "sensor-1");
    }

    #[test]
    fn agent_name_serializes_transparently() {
        let name = AgentName::new("lidar");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"lidar\"");
    }

    #[test]
    fn counter_ids_advance() {
        let first = MappingId::new(1);
        assert_eq!(first.next().get(), 2);
        assert!(first < first.next());
    }
}
