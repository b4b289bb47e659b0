//! Microsoft Graph mail API.
//!
//! [`GraphClient`] performs single authenticated requests; [`types`] holds
//! the wire shapes for messages, the send payload and mark-read patches.

mod client;
pub mod types;

pub use client::{ApiResponse, GraphClient, GRAPH_API_BASE};
pub use types::{GraphMessage, MessagePage, SendMailRequest};
