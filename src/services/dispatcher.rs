//! Outbound mail.

use crate::domain::{Mailbox, OutboundMessage};
use crate::providers::graph::SendMailRequest;
use crate::providers::{GraphClient, Result};

/// Sends one message per call through `sendMail`.
///
/// Fire-and-forget: a 2xx answer is success and nothing is tracked after it.
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    client: GraphClient,
    mailbox: Mailbox,
}

impl MessageDispatcher {
    /// Creates a dispatcher sending as the signed-in user (`/me`).
    pub fn new(client: GraphClient) -> Self {
        Self {
            client,
            mailbox: Mailbox::Me,
        }
    }

    /// Sends as an explicit mailbox instead.
    pub fn with_mailbox(mut self, mailbox: Mailbox) -> Self {
        self.mailbox = mailbox;
        self
    }

    /// Builds the compose payload without sending it.
    pub fn build_payload(message: &OutboundMessage) -> SendMailRequest {
        SendMailRequest::from(message)
    }

    /// Sends a message.
    ///
    /// # Errors
    ///
    /// A non-2xx answer is a [`GraphError::Delivery`](crate::providers::GraphError::Delivery)
    /// carrying status and message; token and transport errors pass through.
    pub async fn dispatch(&self, message: &OutboundMessage) -> Result<()> {
        let payload = Self::build_payload(message);
        let path = format!("{}/sendMail", self.mailbox.path_prefix());

        match self.client.post(&path, &payload).await {
            Ok(response) => {
                tracing::info!(
                    status = response.status,
                    recipients = message.to.len(),
                    "Email sent"
                );
                Ok(())
            }
            Err(e) => {
                let e = e.into_delivery();
                tracing::error!(error = %e, "Failed to send email");
                Err(e)
            }
        }
    }
}
