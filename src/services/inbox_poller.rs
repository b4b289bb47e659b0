//! Folder polling.
//!
//! The [`InboxPoller`] reads the first page of a mail folder, decides which
//! messages to emit, hands them to an [`EventSink`] and optionally marks them
//! read. A message the sink rejects is never marked read, so it comes back on
//! the next poll.
//!
//! # Emission policy
//!
//! - With a `since` filter, every message on the page is emitted.
//! - Without one, only unread messages are emitted; read ones are skipped.
//!
//! Each folder has a [`Cursor`] that records the newest `receivedDateTime`
//! seen by an unfiltered poll. It is bookkeeping only: the next poll does not
//! read it back, so progress across polls still rests on read state.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::domain::{InboundMessage, MailFolder, Mailbox, MessageId};
use crate::providers::graph::types::{Identity, MarkRead, MESSAGE_SELECT};
use crate::providers::graph::MessagePage;
use crate::providers::{GraphClient, GraphError, Result};

/// Destination for emitted messages.
pub trait EventSink: Send + Sync {
    /// Takes ownership of one emitted message.
    ///
    /// # Errors
    ///
    /// Returns an error when the message was not accepted; the poller then
    /// leaves it unread.
    fn emit(&self, message: InboundMessage) -> Result<()>;
}

impl EventSink for mpsc::UnboundedSender<InboundMessage> {
    fn emit(&self, message: InboundMessage) -> Result<()> {
        self.send(message).map_err(|rejected| {
            GraphError::Internal(format!(
                "event receiver closed; message {} not delivered",
                rejected.0.id
            ))
        })
    }
}

/// Synchronization progress marker for one folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// `receivedDateTime` of the newest message seen by an unfiltered poll.
    pub last_seen: Option<DateTime<Utc>>,
}

/// Poller behavior switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOptions {
    /// PATCH every emitted message to `isRead: true`.
    pub mark_as_read: bool,
    /// `$top` for the list call; provider default when unset.
    pub page_size: Option<u32>,
}

/// A mark-as-read PATCH that failed after its message was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkReadFailure {
    /// The emitted message.
    pub id: MessageId,
    /// Rendered error.
    pub error: String,
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Folder that was polled.
    pub folder: MailFolder,
    /// Messages accepted by the sink.
    pub emitted: usize,
    /// Read messages skipped by the unfiltered policy.
    pub skipped: usize,
    /// Folder cursor after the poll.
    pub cursor: Cursor,
    /// True when the provider reported more pages than the one read.
    pub truncated: bool,
    /// Mark-as-read failures; they never fail the poll.
    pub mark_read_failures: Vec<MarkReadFailure>,
    /// Messages the sink rejected. They were left unread.
    pub undelivered: Vec<MessageId>,
}

/// Polls mail folders through a [`GraphClient`].
pub struct InboxPoller {
    /// Authenticated API client.
    client: GraphClient,
    /// Behavior switches.
    options: PollOptions,
    /// Explicitly configured mailbox, if any.
    mailbox: Option<Mailbox>,
    /// Mailbox resolved from `/me`, cached after the first success.
    resolved: Mutex<Option<Mailbox>>,
    /// One cursor per folder.
    cursors: RwLock<HashMap<MailFolder, Cursor>>,
}

impl InboxPoller {
    /// Creates a poller that resolves the mailbox from the token's identity.
    pub fn new(client: GraphClient, options: PollOptions) -> Self {
        Self {
            client,
            options,
            mailbox: None,
            resolved: Mutex::new(None),
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Pins the mailbox instead of resolving it.
    pub fn with_mailbox(mut self, mailbox: Mailbox) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    /// Returns the cursor for a folder.
    pub async fn cursor(&self, folder: MailFolder) -> Cursor {
        self.cursors
            .read()
            .await
            .get(&folder)
            .copied()
            .unwrap_or_default()
    }

    /// Polls one folder and emits messages to `sink`.
    ///
    /// `since` is an ISO-8601 lower bound; empty or blank means "no filter".
    ///
    /// # Errors
    ///
    /// - [`GraphError::Configuration`] for an unparsable `since`, before any request.
    /// - Token, transport or API errors from the list call.
    /// - [`GraphError::Internal`] for a message that cannot be normalized;
    ///   messages emitted before it stay emitted.
    pub async fn poll(
        &self,
        folder: MailFolder,
        since: Option<&str>,
        sink: &dyn EventSink,
    ) -> Result<PollReport> {
        let since = since
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_since)
            .transpose()?;

        let mailbox = self.mailbox().await?;
        let path = format!(
            "{}/mailFolders/{}/messages",
            mailbox.path_prefix(),
            folder.well_known_name()
        );

        let mut query = vec![
            ("$select", MESSAGE_SELECT.to_string()),
            ("$orderby", "receivedDateTime desc".to_string()),
        ];
        if let Some(since) = since {
            query.push(("$filter", since_filter(since)));
        }
        if let Some(top) = self.options.page_size {
            query.push(("$top", top.to_string()));
        }

        tracing::debug!(%folder, %mailbox, filtered = since.is_some(), "Polling folder");

        let page: MessagePage = self.client.get(&path, &query).await?.json()?;
        let truncated = page.next_link.is_some();
        if truncated {
            tracing::info!(
                %folder,
                "Folder has more messages than one page; only the first is read"
            );
        }

        let newest = page
            .value
            .first()
            .and_then(|m| m.received_date_time.as_deref())
            .map(|raw| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)));
        let page_was_empty = page.value.is_empty();

        let mut emitted = 0;
        let mut skipped = 0;
        let mut mark_read_failures = Vec::new();
        let mut undelivered = Vec::new();

        for message in page.value {
            if since.is_none() && message.is_read() {
                skipped += 1;
                continue;
            }

            let inbound = message.into_inbound()?;
            let id = inbound.id.clone();
            if let Err(e) = sink.emit(inbound) {
                tracing::warn!(message_id = %id, error = %e, "Message not delivered; left unread");
                undelivered.push(id);
                continue;
            }
            emitted += 1;

            if self.options.mark_as_read {
                if let Err(e) = self.mark_read(&mailbox, &id).await {
                    tracing::warn!(message_id = %id, error = %e, "Failed to mark message as read");
                    mark_read_failures.push(MarkReadFailure {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let cursor = if since.is_none() && !page_was_empty {
            match newest {
                Some(Ok(last_seen)) => {
                    let cursor = Cursor {
                        last_seen: Some(last_seen),
                    };
                    self.cursors.write().await.insert(folder, cursor);
                    cursor
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        %folder,
                        error = %e,
                        "Newest message has unreadable receivedDateTime; cursor unchanged"
                    );
                    self.cursor(folder).await
                }
                None => self.cursor(folder).await,
            }
        } else {
            self.cursor(folder).await
        };

        tracing::info!(
            %folder,
            emitted,
            skipped,
            undelivered = undelivered.len(),
            "Poll complete"
        );

        Ok(PollReport {
            folder,
            emitted,
            skipped,
            cursor,
            truncated,
            mark_read_failures,
            undelivered,
        })
    }

    async fn mark_read(&self, mailbox: &Mailbox, id: &MessageId) -> Result<()> {
        let path = format!("{}/messages/{}", mailbox.path_prefix(), id);
        self.client
            .patch(&path, &MarkRead { is_read: true })
            .await
            .map(|_| ())
    }

    /// Returns the mailbox to poll.
    ///
    /// An API rejection of the identity lookup degrades to [`Mailbox::Me`];
    /// token and transport failures propagate.
    async fn mailbox(&self) -> Result<Mailbox> {
        if let Some(mailbox) = &self.mailbox {
            return Ok(mailbox.clone());
        }

        let mut resolved = self.resolved.lock().await;
        if let Some(mailbox) = resolved.as_ref() {
            return Ok(mailbox.clone());
        }

        let lookup = self
            .client
            .get("me", &[("$select", "id".to_string())])
            .await
            .and_then(|response| response.json::<Identity>());

        match lookup {
            Ok(Identity { id: Some(id) }) if !id.is_empty() => {
                let mailbox = Mailbox::User(id);
                tracing::debug!(%mailbox, "Resolved mailbox");
                *resolved = Some(mailbox.clone());
                Ok(mailbox)
            }
            Ok(_) => {
                tracing::warn!("Identity lookup returned no id; using /me");
                Ok(Mailbox::Me)
            }
            Err(e @ (GraphError::Api { .. } | GraphError::Internal(_))) => {
                tracing::warn!(error = %e, "Could not resolve mailbox identity; using /me");
                Ok(Mailbox::Me)
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for InboxPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxPoller")
            .field("options", &self.options)
            .field("mailbox", &self.mailbox)
            .finish_non_exhaustive()
    }
}

/// Parses a `since` value: RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (UTC) or a
/// bare date (midnight UTC).
pub fn parse_since(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    Err(GraphError::Configuration(format!(
        "since '{}' is not an ISO-8601 timestamp",
        raw
    )))
}

fn since_filter(since: DateTime<Utc>) -> String {
    format!(
        "receivedDateTime ge '{}'",
        since.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    )
}
