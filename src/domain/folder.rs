//! Mail folder selection.
//!
//! The agent exposes four folders; each maps onto a Graph well-known
//! folder name usable directly in `mailFolders/{name}` paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A pollable mail folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailFolder {
    /// Incoming mail.
    Inbox,
    /// Sent items.
    Sent,
    /// Unsent drafts.
    Drafts,
    /// Deleted items.
    Deleted,
}

impl MailFolder {
    /// All selectable folders, in display order.
    pub const ALL: [MailFolder; 4] = [Self::Inbox, Self::Sent, Self::Drafts, Self::Deleted];

    /// Returns the Graph well-known folder name.
    pub fn well_known_name(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sentitems",
            Self::Drafts => "drafts",
            Self::Deleted => "deleteditems",
        }
    }

    /// Returns the option value used in settings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
            Self::Deleted => "deleted",
        }
    }
}

impl Default for MailFolder {
    fn default() -> Self {
        Self::Inbox
    }
}

impl fmt::Display for MailFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailFolder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbox" => Ok(Self::Inbox),
            "sent" => Ok(Self::Sent),
            "drafts" => Ok(Self::Drafts),
            "deleted" => Ok(Self::Deleted),
            _ => Err("Folder must be 'inbox', 'sent', 'drafts', or 'deleted'".to_string()),
        }
    }
}
