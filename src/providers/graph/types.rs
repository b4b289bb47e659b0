//! Graph mail resource shapes.
//!
//! Only the fields the agent selects are modelled; everything is optional on
//! the way in because Graph omits null properties.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{InboundMessage, MessageId, OutboundMessage};
use crate::providers::{GraphError, Result};

/// Fields requested by the message list call.
pub const MESSAGE_SELECT: &str =
    "id,subject,from,toRecipients,ccRecipients,bccRecipients,body,receivedDateTime,isRead";

/// One page of `mailFolders/{folder}/messages`.
#[derive(Debug, Default, Deserialize)]
pub struct MessagePage {
    /// Messages, most recent first.
    #[serde(default)]
    pub value: Vec<GraphMessage>,
    /// Link to the next page; present when the page was truncated.
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// A Graph `message` resource.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMessage {
    pub id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<Recipient>,
    pub to_recipients: Option<Vec<Recipient>>,
    pub cc_recipients: Option<Vec<Recipient>>,
    pub bcc_recipients: Option<Vec<Recipient>>,
    pub body: Option<ItemBody>,
    pub received_date_time: Option<String>,
    pub is_read: Option<bool>,
}

impl GraphMessage {
    /// Read state; a message without `isRead` counts as unread.
    pub fn is_read(&self) -> bool {
        self.is_read.unwrap_or(false)
    }

    /// Flattens into the emitted event form.
    ///
    /// Fails when `id` or `receivedDateTime` is missing or unreadable.
    pub fn into_inbound(self) -> Result<InboundMessage> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GraphError::Internal("message without id".to_string()))?;

        let received_at = self
            .received_date_time
            .as_deref()
            .ok_or_else(|| {
                GraphError::Internal(format!("message {} without receivedDateTime", id))
            })
            .and_then(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        GraphError::Internal(format!(
                            "message {} has invalid receivedDateTime '{}': {}",
                            id, raw, e
                        ))
                    })
            })?;

        let is_read = self.is_read.unwrap_or(false);
        let (body, body_content_type) = match self.body {
            Some(body) => (body.content, Some(body.content_type).filter(|t| !t.is_empty())),
            None => (String::new(), None),
        };

        Ok(InboundMessage {
            id: MessageId(id),
            subject: self.subject.unwrap_or_default(),
            from: self.from.and_then(Recipient::into_address),
            to: flatten(self.to_recipients),
            cc: flatten(self.cc_recipients),
            bcc: flatten(self.bcc_recipients),
            body,
            body_content_type,
            received_at,
            is_read,
        })
    }
}

fn flatten(recipients: Option<Vec<Recipient>>) -> Vec<String> {
    recipients
        .unwrap_or_default()
        .into_iter()
        .filter_map(Recipient::into_address)
        .collect()
}

/// `{"emailAddress": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email_address: EmailAddress,
}

impl Recipient {
    /// Wraps a bare address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            email_address: EmailAddress {
                name: None,
                address: address.into(),
            },
        }
    }

    fn into_address(self) -> Option<String> {
        Some(self.email_address.address).filter(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub address: String,
}

/// Message body with its declared content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content: String,
}

/// `POST {mailbox}/sendMail` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendMailRequest {
    pub message: ComposeMessage,
}

/// Message part of [`SendMailRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeMessage {
    pub subject: String,
    pub body: ItemBody,
    pub to_recipients: Vec<Recipient>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cc_recipients: Vec<Recipient>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bcc_recipients: Vec<Recipient>,
}

impl From<&OutboundMessage> for SendMailRequest {
    fn from(message: &OutboundMessage) -> Self {
        let wrap = |addresses: &[String]| -> Vec<Recipient> {
            addresses
                .iter()
                .map(|a| a.trim())
                .filter(|a| !a.is_empty())
                .map(Recipient::new)
                .collect()
        };

        Self {
            message: ComposeMessage {
                subject: message.subject.clone(),
                body: ItemBody {
                    content_type: message.content_type.as_str().to_string(),
                    content: message.body.clone(),
                },
                to_recipients: wrap(&message.to),
                cc_recipients: wrap(&message.cc),
                bcc_recipients: wrap(&message.bcc),
            },
        }
    }
}

/// `PATCH {mailbox}/messages/{id}` body that marks a message read.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRead {
    pub is_read: bool,
}

/// `GET me?$select=id` response.
#[derive(Debug, Deserialize)]
pub struct Identity {
    pub id: Option<String>,
}
