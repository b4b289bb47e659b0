//! Message domain types.
//!
//! [`InboundMessage`] is the normalized form of a polled message, emitted as
//! one synchronization event. [`OutboundMessage`] is the normalized field set
//! handed to the dispatcher for a single send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::MessageId;

/// Body content type understood by the mail API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    /// HTML body.
    #[serde(rename = "HTML")]
    Html,
    /// Plain text body.
    #[serde(rename = "Text")]
    Text,
}

impl ContentType {
    /// Returns the wire value (`HTML` or `Text`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "HTML",
            Self::Text => "Text",
        }
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::Html
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTML" => Ok(Self::Html),
            "Text" => Ok(Self::Text),
            _ => Err("Content type must be 'HTML' or 'Text'".to_string()),
        }
    }
}

/// A message read from a mail folder, flattened for event consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Provider message ID.
    pub id: MessageId,
    /// Subject line (empty when the message has none).
    pub subject: String,
    /// Sender address, if the provider reported one.
    pub from: Option<String>,
    /// Primary recipient addresses.
    pub to: Vec<String>,
    /// Carbon copy addresses.
    pub cc: Vec<String>,
    /// Blind carbon copy addresses (only visible on sent items).
    pub bcc: Vec<String>,
    /// Body content, HTML or text as stored by the provider.
    pub body: String,
    /// Declared type of `body`.
    pub body_content_type: Option<String>,
    /// When the provider received the message.
    pub received_at: DateTime<Utc>,
    /// Read state at poll time.
    pub is_read: bool,
}

/// A message to send, built from already-templated fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Primary recipients.
    pub to: Vec<String>,
    /// Carbon copy recipients.
    pub cc: Vec<String>,
    /// Blind carbon copy recipients.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Body content.
    pub body: String,
    /// Body content type.
    pub content_type: ContentType,
}

impl OutboundMessage {
    /// Creates a message with no cc/bcc recipients.
    ///
    /// Every address is trimmed; blank entries are dropped.
    pub fn new<I, S>(
        subject: impl Into<String>,
        body: impl Into<String>,
        content_type: ContentType,
        to: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            to: normalize_addresses(to),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
            content_type,
        }
    }

    /// Sets the cc recipients.
    pub fn with_cc<I, S>(mut self, cc: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.cc = normalize_addresses(cc);
        self
    }

    /// Sets the bcc recipients.
    pub fn with_bcc<I, S>(mut self, bcc: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.bcc = normalize_addresses(bcc);
        self
    }
}

/// Trims each address and drops the ones left empty.
pub fn normalize_addresses<I, S>(addresses: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    addresses
        .into_iter()
        .map(|a| a.as_ref().trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}
