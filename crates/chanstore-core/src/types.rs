//! Strong type definitions for the channel store.
//!
//! All identifiers are newtypes to prevent misuse at compile time. They
//! serialize as plain strings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Application-defined key/value fields (transfer state, resolver, meta extras).
pub type EncodedFields = BTreeMap<String, String>;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
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

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// On-chain address of a channel contract. Primary key of a channel.
    ChannelAddress
);

string_id!(
    /// Identifier of a transfer, unique across channels.
    TransferId
);

string_id!(
    /// Client-generated correlation id for an on-chain transaction.
    ///
    /// Distinct from any transaction hash: one logical transaction may be
    /// resubmitted several times with different hashes.
    TransactionId
);

string_id!(
    /// Hash of one submitted transaction.
    TxHash
);

string_id!(
    /// Public identifier of a channel participant.
    PublicIdentifier
);

string_id!(
    /// Correlation id linking the same logical transfer across hops.
    RoutingId
);

string_id!(
    /// Generic on-chain address (participants, assets, definitions).
    Address
);

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_display_and_debug() {
        let addr = ChannelAddress::new("0xabc");
        assert_eq!(addr.to_string(), "0xabc");
        assert_eq!(format!("{:?}", addr), "ChannelAddress(0xabc)");
    }

    #[test]
    fn test_identifier_serializes_as_string() {
        let id = TransferId::from("t1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"t1\"");
        let back: TransferId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_now_millis_is_positive() {
        assert!(now_millis() > 0);
    }
}
