//! outlook-agent - Microsoft Graph mail agent
//!
//! This crate polls Outlook mail folders and sends mail through the Microsoft
//! Graph API on behalf of a host scheduler, handling OAuth2 token acquisition,
//! refresh and caching.

pub mod config;
pub mod domain;
pub mod providers;
pub mod services;

pub use config::AgentSettings;
pub use services::OutlookAgent;
