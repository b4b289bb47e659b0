//! Identifier types for mailbox entities.
//!
//! Newtype wrappers keep provider identifiers from being mixed up with
//! arbitrary strings (subjects, addresses, folder names).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-assigned identifier of a single message.
///
/// Graph message IDs are opaque base64-ish strings; they are only ever
/// compared and echoed back into request paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Mailbox addressed by Graph requests.
///
/// `Me` is the mailbox-relative form (`/me/...`) which only works for
/// delegated tokens; `User` addresses a specific mailbox by object id or UPN.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mailbox {
    /// The signed-in user (`/me`).
    Me,
    /// An explicit user (`/users/{id}`).
    User(String),
}

impl Mailbox {
    /// Returns the path prefix for this mailbox, without leading slash.
    pub fn path_prefix(&self) -> String {
        match self {
            Self::Me => "me".to_string(),
            Self::User(id) => format!("users/{}", id),
        }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_display_and_conversion() {
        let id = MessageId::from("AAMkAGI2");
        assert_eq!(id.to_string(), "AAMkAGI2");
        assert_eq!(id, MessageId::from("AAMkAGI2".to_string()));
    }

    #[test]
    fn message_id_serializes_transparently() {
        let json = serde_json::to_string(&MessageId::from("m-1")).unwrap();
        assert_eq!(json, "\"m-1\"");
    }

    #[test]
    fn mailbox_path_prefix() {
        assert_eq!(Mailbox::Me.path_prefix(), "me");
        assert_eq!(
            Mailbox::User("alice@contoso.com".to_string()).path_prefix(),
            "users/alice@contoso.com"
        );
    }
}
