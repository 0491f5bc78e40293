use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ConversationId);
id_newtype!(MessageId);

/// Denormalized user identity carried on conversation payloads so list rows
/// can render without a user lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: String,
    pub handle: String,
}

impl UserRef {
    /// Placeholder identity for a peer known only by id, e.g. when a message
    /// arrives for a conversation the client has never seen. Display fields
    /// are filled in by the next conversations bootstrap.
    pub fn stub(id: UserId) -> Self {
        Self {
            id,
            display_name: String::new(),
            avatar_url: String::new(),
            handle: String::new(),
        }
    }
}
