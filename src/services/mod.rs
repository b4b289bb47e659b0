//! Services layer.
//!
//! Services orchestrate the providers on behalf of a host:
//!
//! ```text
//! Host (scheduler, event bus, CLI)
//!          |
//!          v
//!    OutlookAgent  <-- configure / check / receive / healthy
//!      |        |
//!      v        v
//! InboxPoller  MessageDispatcher
//!      |        |
//!      v        v
//!     GraphClient --> TokenManager
//! ```
//!
//! - [`InboxPoller`]: Reads a folder and emits messages per the read-state policy
//! - [`MessageDispatcher`]: Sends one composed message per call
//! - [`OutlookAgent`]: Wires both from settings and tracks hook health

mod agent;
mod dispatcher;
mod inbox_poller;

pub use agent::{AgentStatus, InvocationStatus, OutboundFields, OutlookAgent, Recipients};
pub use dispatcher::MessageDispatcher;
pub use inbox_poller::{
    parse_since, Cursor, EventSink, InboxPoller, MarkReadFailure, PollOptions, PollReport,
};
