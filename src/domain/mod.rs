//! Domain types for the mailbox agent.
//!
//! Plain data shared by the providers and services layers: message and
//! folder types, identifiers, and the normalized inbound/outbound forms.

mod email;
mod folder;
mod types;

pub use email::{normalize_addresses, ContentType, InboundMessage, OutboundMessage};
pub use folder::MailFolder;
pub use types::{Mailbox, MessageId};
