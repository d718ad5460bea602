//! Identifiers shared between the command surface, the gate and playback

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

snowflake!(
    /// Server-like container scoping one voice connection and one queue
    GuildId
);
snowflake!(
    /// Chat platform user
    UserId
);
snowflake!(
    /// Voice channel inside a guild
    ChannelId
);

impl UserId {
    /// Mention markup understood by the chat client
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}
