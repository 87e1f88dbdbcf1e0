//! Protocol identifiers: `@local:server` users, `!opaque:server` rooms, `$opaque` events.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// A user identity such as `@herald:example.org`.
    UserId
);
string_id!(
    /// A room identity such as `!abc123:example.org`.
    RoomId
);
string_id!(EventId);
string_id!(DeviceId);

impl UserId {
    /// The local part of the identity: `herald` for `@herald:example.org`.
    ///
    /// Identities without a sigil or server part are returned trimmed of
    /// whichever of the two they do have.
    pub fn localpart(&self) -> &str {
        let s = self.0.strip_prefix('@').unwrap_or(&self.0);
        s.split_once(':').map(|(local, _)| local).unwrap_or(s)
    }
}
