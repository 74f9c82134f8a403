//! Branded ID newtypes.
//!
//! Room keys and user identities arrive from outside (the document store and
//! the identity provider) and are carried verbatim. Connection IDs are minted
//! here as UUID v7 strings, unique for the process lifetime.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Document-store key of a room; also the live broadcast group key.
    RoomId
}

branded_id! {
    /// Identity-provider UID of a user; the live notification group key.
    UserId
}

branded_id! {
    /// Unique identifier of one live WebSocket connection.
    ConnectionId
}

impl ConnectionId {
    /// Mint a fresh connection ID (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_new_is_uuid_v7() {
        let id = ConnectionId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::default();
        assert_ne!(a, b);
    }

    #[test]
    fn room_id_keeps_store_key_verbatim() {
        let id = RoomId::from("665f1c2e9b1e8a0012345678");
        assert_eq!(id.as_str(), "665f1c2e9b1e8a0012345678");
    }

    #[test]
    fn deref_and_display() {
        let id = UserId::from("uid-42");
        let s: &str = &id;
        assert_eq!(s, "uid-42");
        assert_eq!(format!("{id}"), "uid-42");
    }

    #[test]
    fn into_string() {
        let id = RoomId::from_string("r1".to_owned());
        let s: String = id.into();
        assert_eq!(s, "r1");
    }

    #[test]
    fn serde_is_transparent() {
        let id = UserId::from("u1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"u1\"");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn hash_and_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let _ = set.insert(RoomId::from("same"));
        let _ = set.insert(RoomId::from("same"));
        assert_eq!(set.len(), 1);
    }
}
