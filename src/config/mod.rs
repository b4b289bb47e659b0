//! Configuration and settings management.
//!
//! Settings are consumed read-only by the agent and stored as JSON in the
//! user's config directory.

mod settings;

pub use settings::{split_recipients, AgentSettings, AuthMethod, Mode, SettingsError};
