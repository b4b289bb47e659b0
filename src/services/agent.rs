//! Host-facing agent.
//!
//! [`OutlookAgent`] is the boundary a scheduler or event bus drives: it is
//! configured once from [`AgentSettings`], ticked with [`check`], fed event
//! batches with [`receive`], and asked whether it is [`healthy`].
//!
//! [`check`]: OutlookAgent::check
//! [`receive`]: OutlookAgent::receive
//! [`healthy`]: OutlookAgent::healthy

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

use super::dispatcher::MessageDispatcher;
use super::inbox_poller::{Cursor, InboxPoller, PollOptions, PollReport};
use crate::config::{split_recipients, AgentSettings, AuthMethod, Mode};
use crate::domain::{ContentType, InboundMessage, MailFolder, Mailbox, OutboundMessage};
use crate::providers::{
    AccessTokenProvider, Credential, GraphClient, GraphError, HttpTransport, ReqwestTransport,
    Result, StaticToken, TokenManager,
};

/// Outcome of the most recent invocation of a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    /// The hook has not run.
    #[default]
    Never,
    /// Last run completed without error.
    Success,
    /// Last run failed.
    Failed,
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    Check,
    Receive,
}

/// Per-hook status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Scheduled check.
    pub last_check: InvocationStatus,
    /// Inbound event batch.
    pub last_receive: InvocationStatus,
}

/// A recipient field that arrives either as one delimited string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    /// `"a@x.com, b@x.com"`
    Delimited(String),
    /// `["a@x.com", "b@x.com"]`
    List(Vec<String>),
}

impl Recipients {
    fn addresses(&self) -> Vec<String> {
        match self {
            Self::Delimited(raw) => split_recipients(raw),
            Self::List(items) => items.iter().flat_map(|i| split_recipients(i)).collect(),
        }
    }
}

/// Already-templated message fields carried by an inbound event.
///
/// Fields left out fall back to the agent's configured values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundFields {
    /// Primary recipients.
    pub to: Option<Recipients>,
    /// Carbon-copy recipients.
    pub cc: Option<Recipients>,
    /// Blind carbon-copy recipients.
    pub bcc: Option<Recipients>,
    /// Subject line.
    pub subject: Option<String>,
    /// Body content.
    pub body: Option<String>,
    /// `HTML` or `Text`.
    pub content_type: Option<String>,
}

impl OutboundFields {
    /// Builds the message to send, filling gaps from `defaults`.
    ///
    /// # Errors
    ///
    /// [`GraphError::Configuration`] when no recipient remains or the content
    /// type is unknown.
    pub fn into_message(self, defaults: &AgentSettings) -> Result<OutboundMessage> {
        let field = |value: Option<Recipients>, fallback: &str| match value {
            Some(recipients) => recipients.addresses(),
            None => split_recipients(fallback),
        };

        let to = field(self.to, &defaults.to);
        if to.is_empty() {
            return Err(GraphError::Configuration(
                "Recipient (to) is required".to_string(),
            ));
        }

        let content_type = match self.content_type.filter(|c| !c.is_empty()) {
            Some(raw) => raw.parse::<ContentType>(),
            None => defaults.content_type(),
        }
        .map_err(GraphError::Configuration)?;

        Ok(OutboundMessage::new(
            self.subject.unwrap_or_else(|| defaults.subject.clone()),
            self.body.unwrap_or_else(|| defaults.body.clone()),
            content_type,
            to,
        )
        .with_cc(field(self.cc, &defaults.cc))
        .with_bcc(field(self.bcc, &defaults.bcc)))
    }
}

/// One configured Outlook agent.
///
/// Owns exactly one token source, one poller (and its cursors) and one
/// dispatcher; nothing is shared between instances.
///
/// # Example
///
/// ```ignore
/// let mut agent = OutlookAgent::configure(AgentSettings::load(&path)?)?;
/// let mut events = agent.take_events().expect("fresh agent");
/// agent.check().await?;
/// while let Ok(message) = events.try_recv() {
///     println!("{}", message.subject);
/// }
/// ```
pub struct OutlookAgent {
    /// Settings this agent was configured with.
    settings: AgentSettings,
    /// Validated mode.
    mode: Mode,
    /// Token source, shared with the API client.
    tokens: Arc<dyn AccessTokenProvider>,
    /// Folder poller.
    poller: InboxPoller,
    /// Message sender.
    dispatcher: MessageDispatcher,
    /// Emitted messages.
    events: mpsc::UnboundedSender<InboundMessage>,
    /// Receiving end of `events` until [`OutlookAgent::take_events`] hands it out.
    receiver: Option<mpsc::UnboundedReceiver<InboundMessage>>,
    /// Hook outcomes for health reporting.
    status: RwLock<AgentStatus>,
}

impl OutlookAgent {
    /// Validates settings and wires the agent over a `reqwest` transport.
    pub fn configure(settings: AgentSettings) -> Result<Self> {
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(
            settings.request_timeout_secs.max(1),
        ))?;
        Self::configure_with_transport(settings, Arc::new(transport))
    }

    /// Validates settings and wires the agent over the given transport.
    ///
    /// # Errors
    ///
    /// [`GraphError::Configuration`] listing every settings problem.
    pub fn configure_with_transport(
        settings: AgentSettings,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        let problems = settings.validate();
        let mode = match settings.mode {
            Some(mode) if problems.is_empty() => mode,
            _ => return Err(GraphError::Configuration(problems.join("; "))),
        };

        let tokens: Arc<dyn AccessTokenProvider> = match settings.auth_method {
            AuthMethod::OAuth => {
                let credential = Credential::new(
                    settings.client_id.trim(),
                    settings.client_secret.trim(),
                    settings.tenant_id.trim(),
                )
                .with_refresh_token(settings.refresh_token.trim());

                if credential.refresh_token.is_none() && settings.mailbox().is_none() {
                    tracing::warn!(
                        "Client-credentials tokens cannot access /me; set `mailbox` to a user id or UPN"
                    );
                }

                Arc::new(
                    TokenManager::new(credential, Arc::clone(&transport))
                        .with_authority(settings.authority_url.clone()),
                )
            }
            AuthMethod::Token => Arc::new(StaticToken::new(settings.access_token.trim())),
        };

        let client = GraphClient::new(transport, Arc::clone(&tokens))
            .with_base_url(settings.graph_base_url.clone());

        let mut poller = InboxPoller::new(
            client.clone(),
            PollOptions {
                mark_as_read: settings.mark_as_read,
                page_size: settings.page_size,
            },
        );
        let mut dispatcher = MessageDispatcher::new(client);
        if let Some(mailbox) = settings.mailbox() {
            let mailbox = Mailbox::User(mailbox.to_string());
            poller = poller.with_mailbox(mailbox.clone());
            dispatcher = dispatcher.with_mailbox(mailbox);
        }

        let (events, receiver) = mpsc::unbounded_channel();

        tracing::info!(%mode, auth_method = ?settings.auth_method, "Outlook agent configured");

        Ok(Self {
            settings,
            mode,
            tokens,
            poller,
            dispatcher,
            events,
            receiver: Some(receiver),
            status: RwLock::new(AgentStatus::default()),
        })
    }

    /// Settings this agent was configured with.
    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Takes the stream of emitted messages; `None` once taken.
    ///
    /// Messages emitted before the stream is taken are buffered. Once the
    /// stream is dropped, polls leave messages unread and report them as
    /// undelivered.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<InboundMessage>> {
        self.receiver.take()
    }

    /// Scheduled tick: polls the configured folder in receive mode.
    ///
    /// Returns `None` in send mode.
    pub async fn check(&self) -> Result<Option<PollReport>> {
        let result = match self.mode {
            Mode::Receive => {
                let folder = self
                    .settings
                    .folder()
                    .map_err(GraphError::Configuration)?;
                self.poll(folder, self.settings.since()).await.map(Some)
            }
            Mode::Send => Ok(None),
        };

        let ok = match &result {
            Ok(Some(report)) if !report.undelivered.is_empty() => {
                tracing::error!(
                    undelivered = report.undelivered.len(),
                    "Check could not deliver every message"
                );
                false
            }
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "Check failed");
                false
            }
        };
        self.record(Hook::Check, ok).await;
        result
    }

    /// Inbound event batch: sends one message per event in send mode.
    ///
    /// Every event is attempted; the outcomes come back in order. In receive
    /// mode the batch is ignored and the result is empty.
    pub async fn receive(&self, batch: Vec<OutboundFields>) -> Vec<Result<()>> {
        if self.mode != Mode::Send {
            tracing::debug!(events = batch.len(), "Ignoring events in receive mode");
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        for fields in batch {
            let outcome = match fields.into_message(&self.settings) {
                Ok(message) => self.dispatch(&message).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &outcome {
                tracing::error!(error = %e, "Failed to send email for event");
            }
            outcomes.push(outcome);
        }

        let all_ok = outcomes.iter().all(|o| o.is_ok());
        self.record(Hook::Receive, all_ok).await;
        outcomes
    }

    /// Polls a folder, sending emitted messages to the event stream.
    pub async fn poll(&self, folder: MailFolder, since: Option<&str>) -> Result<PollReport> {
        self.poller.poll(folder, since, &self.events).await
    }

    /// Sends one message.
    pub async fn dispatch(&self, message: &OutboundMessage) -> Result<()> {
        self.dispatcher.dispatch(message).await
    }

    /// Current cursor of a folder.
    pub async fn cursor(&self, folder: MailFolder) -> Cursor {
        self.poller.cursor(folder).await
    }

    /// Obtains a token without making an API call.
    pub async fn access_token(&self) -> Result<String> {
        self.tokens.access_token().await
    }

    /// True iff the last check or the last event batch completed cleanly.
    pub async fn healthy(&self) -> bool {
        let status = self.status.read().await;
        status.last_check == InvocationStatus::Success
            || status.last_receive == InvocationStatus::Success
    }

    /// Per-hook outcomes.
    pub async fn status(&self) -> AgentStatus {
        *self.status.read().await
    }

    async fn record(&self, hook: Hook, ok: bool) {
        let outcome = if ok {
            InvocationStatus::Success
        } else {
            InvocationStatus::Failed
        };
        let mut status = self.status.write().await;
        match hook {
            Hook::Check => status.last_check = outcome,
            Hook::Receive => status.last_receive = outcome,
        }
    }
}

impl std::fmt::Debug for OutlookAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutlookAgent")
            .field("mode", &self.mode)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{HttpRequest, HttpResponse, MockHttpTransport};
    use pretty_assertions::assert_eq;
    use reqwest::{Method, StatusCode};
    use serde_json::json;

    fn token_settings(mode: Mode) -> AgentSettings {
        AgentSettings {
            mode: Some(mode),
            auth_method: AuthMethod::Token,
            access_token: "T1".to_string(),
            mailbox: Some("u1".to_string()),
            ..Default::default()
        }
    }

    fn send_settings() -> AgentSettings {
        AgentSettings {
            to: "ops@contoso.com".to_string(),
            subject: "Alert".to_string(),
            body: "<p>default</p>".to_string(),
            ..token_settings(Mode::Send)
        }
    }

    fn is_send(req: &HttpRequest) -> bool {
        req.method == Method::POST && req.url.ends_with("/users/u1/sendMail")
    }

    #[test]
    fn invalid_settings_list_every_problem() {
        let settings = AgentSettings {
            mode: Some(Mode::Send),
            ..Default::default()
        };
        let err = OutlookAgent::configure_with_transport(
            settings,
            Arc::new(MockHttpTransport::new()),
        )
        .unwrap_err();

        match err {
            GraphError::Configuration(msg) => {
                assert!(msg.contains("Client ID is required for OAuth"));
                assert!(msg.contains("Subject is required for send mode"));
            }
            other => panic!("Expected Configuration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn check_polls_and_publishes() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|req| req.url.ends_with("/users/u1/mailFolders/inbox/messages"))
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    StatusCode::OK,
                    json!({"value": [
                        {"id": "M1", "receivedDateTime": "2024-03-02T10:00:00Z", "isRead": false},
                        {"id": "M2", "receivedDateTime": "2024-03-01T10:00:00Z", "isRead": true}
                    ]})
                    .to_string(),
                ))
            });

        let mut agent = OutlookAgent::configure_with_transport(
            token_settings(Mode::Receive),
            Arc::new(transport),
        )
        .unwrap();
        let mut events = agent.take_events().unwrap();
        assert!(!agent.healthy().await);

        let report = agent.check().await.unwrap().unwrap();

        assert_eq!(report.emitted, 1);
        assert_eq!(events.recv().await.unwrap().id.0, "M1");
        assert!(agent.take_events().is_none());
        assert!(agent.healthy().await);
        assert_eq!(agent.status().await.last_check, InvocationStatus::Success);
    }

    fn unread_page(count: usize) -> String {
        let messages: Vec<_> = (0..count)
            .map(|i| {
                json!({
                    "id": format!("M{}", i),
                    "receivedDateTime": "2024-03-02T10:00:00Z",
                    "isRead": false
                })
            })
            .collect();
        json!({ "value": messages }).to_string()
    }

    fn marking_settings() -> AgentSettings {
        AgentSettings {
            mark_as_read: true,
            page_size: Some(300),
            ..token_settings(Mode::Receive)
        }
    }

    #[tokio::test]
    async fn large_page_reaches_a_late_reader() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|req| req.method == Method::GET)
            .times(1)
            .returning(|_| Ok(HttpResponse::new(StatusCode::OK, unread_page(300))));
        transport
            .expect_execute()
            .withf(|req| req.method == Method::PATCH)
            .times(300)
            .returning(|_| Ok(HttpResponse::new(StatusCode::OK, "{}")));

        let mut agent =
            OutlookAgent::configure_with_transport(marking_settings(), Arc::new(transport))
                .unwrap();
        let mut events = agent.take_events().unwrap();

        let report = agent.check().await.unwrap().unwrap();

        let mut received = 0;
        while events.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(report.emitted, 300);
        assert_eq!(received, report.emitted);
        assert!(report.undelivered.is_empty());
        assert!(agent.healthy().await);
    }

    #[tokio::test]
    async fn dropped_reader_leaves_messages_unread() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|req| req.method == Method::GET)
            .times(1)
            .returning(|_| Ok(HttpResponse::new(StatusCode::OK, unread_page(2))));
        transport
            .expect_execute()
            .withf(|req| req.method == Method::PATCH)
            .never();

        let mut agent =
            OutlookAgent::configure_with_transport(marking_settings(), Arc::new(transport))
                .unwrap();
        drop(agent.take_events());

        let report = agent.check().await.unwrap().unwrap();

        assert_eq!(report.emitted, 0);
        assert_eq!(report.undelivered.len(), 2);
        assert!(!agent.healthy().await);
        assert_eq!(agent.status().await.last_check, InvocationStatus::Failed);
    }

    #[tokio::test]
    async fn untaken_stream_buffers_messages() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(StatusCode::OK, unread_page(3))));

        let mut agent = OutlookAgent::configure_with_transport(
            token_settings(Mode::Receive),
            Arc::new(transport),
        )
        .unwrap();
        let report = agent.check().await.unwrap().unwrap();
        assert_eq!(report.emitted, 3);

        let mut events = agent.take_events().unwrap();
        assert_eq!(events.recv().await.unwrap().id.0, "M0");
    }

    #[tokio::test]
    async fn failed_check_is_unhealthy() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Err(GraphError::Transport("connection refused".to_string())));

        let agent = OutlookAgent::configure_with_transport(
            token_settings(Mode::Receive),
            Arc::new(transport),
        )
        .unwrap();

        assert!(agent.check().await.is_err());
        assert!(!agent.healthy().await);
        assert_eq!(agent.status().await.last_check, InvocationStatus::Failed);
    }

    #[tokio::test]
    async fn check_is_noop_in_send_mode() {
        let mut transport = MockHttpTransport::new();
        transport.expect_execute().never();

        let agent = OutlookAgent::configure_with_transport(send_settings(), Arc::new(transport))
            .unwrap();
        assert_eq!(agent.check().await.unwrap(), None);
    }

    #[tokio::test]
    async fn receive_ignored_in_receive_mode() {
        let mut transport = MockHttpTransport::new();
        transport.expect_execute().never();

        let agent = OutlookAgent::configure_with_transport(
            token_settings(Mode::Receive),
            Arc::new(transport),
        )
        .unwrap();
        let outcomes = agent.receive(vec![OutboundFields::default()]).await;
        assert!(outcomes.is_empty());
        assert_eq!(agent.status().await.last_receive, InvocationStatus::Never);
    }

    #[tokio::test]
    async fn receive_dispatches_each_event_and_continues_after_failure() {
        let mut transport = MockHttpTransport::new();
        let mut seq = mockall::Sequence::new();
        transport
            .expect_execute()
            .withf(is_send)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(StatusCode::UNAUTHORIZED, "")));
        transport
            .expect_execute()
            .withf(|req| {
                is_send(req)
                    && req.json_body().map(|b| b["message"]["toRecipients"].clone())
                        == Some(json!([
                            {"emailAddress": {"address": "a@x.com"}},
                            {"emailAddress": {"address": "b@x.com"}}
                        ]))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(StatusCode::ACCEPTED, "")));

        let agent = OutlookAgent::configure_with_transport(send_settings(), Arc::new(transport))
            .unwrap();

        let outcomes = agent
            .receive(vec![
                OutboundFields::default(),
                OutboundFields {
                    to: Some(Recipients::Delimited("a@x.com; b@x.com".to_string())),
                    ..Default::default()
                },
            ])
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[0],
            Err(GraphError::Delivery { status: 401, .. })
        ));
        assert!(outcomes[1].is_ok());
        assert_eq!(agent.status().await.last_receive, InvocationStatus::Failed);
    }

    #[test]
    fn outbound_fields_fall_back_to_settings() {
        let message = OutboundFields {
            subject: Some("Override".to_string()),
            cc: Some(Recipients::List(vec![" c@x.com ".to_string()])),
            ..Default::default()
        }
        .into_message(&send_settings())
        .unwrap();

        assert_eq!(message.to, vec!["ops@contoso.com"]);
        assert_eq!(message.cc, vec!["c@x.com"]);
        assert!(message.bcc.is_empty());
        assert_eq!(message.subject, "Override");
        assert_eq!(message.body, "<p>default</p>");
        assert_eq!(message.content_type, ContentType::Html);
    }

    #[test]
    fn outbound_fields_require_recipient() {
        let fields = OutboundFields {
            to: Some(Recipients::List(vec!["  ".to_string()])),
            ..Default::default()
        };
        let err = fields.into_message(&send_settings()).unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }

    #[test]
    fn outbound_fields_reject_unknown_content_type() {
        let fields = OutboundFields {
            content_type: Some("markdown".to_string()),
            ..Default::default()
        };
        assert!(fields.into_message(&send_settings()).is_err());
    }

    #[test]
    fn outbound_fields_deserialize_both_recipient_forms() {
        let fields: OutboundFields = serde_json::from_value(json!({
            "to": "a@x.com, b@x.com",
            "cc": ["c@x.com"],
            "content_type": "Text"
        }))
        .unwrap();

        assert_eq!(
            fields.to,
            Some(Recipients::Delimited("a@x.com, b@x.com".to_string()))
        );
        assert_eq!(fields.cc, Some(Recipients::List(vec!["c@x.com".to_string()])));
    }

    #[tokio::test]
    async fn static_token_exposed_through_agent() {
        let agent = OutlookAgent::configure_with_transport(
            token_settings(Mode::Receive),
            Arc::new(MockHttpTransport::new()),
        )
        .unwrap();
        assert_eq!(agent.access_token().await.unwrap(), "T1");
    }
}
