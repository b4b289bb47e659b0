//! Agent settings.
//!
//! Settings are owned by whatever hosts the agent and read by it as-is. On
//! disk they live in `settings.json` under the platform config directory
//! (`~/.config/outlook-agent/` or the XDG/macOS/Windows equivalent).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{ContentType, MailFolder};
use crate::providers::auth::DEFAULT_AUTHORITY;
use crate::providers::graph::GRAPH_API_BASE;

/// Errors loading, saving or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Reading or writing the settings file failed.
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON for [`AgentSettings`].
    #[error("settings JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every validation problem found.
    #[error("invalid settings: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// The platform has no home or config directory to derive a default path from.
    #[error("no config directory available on this platform")]
    MissingDirectories,
}

/// What the agent does on its hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Poll a folder on every check.
    Receive,
    /// Send a message for every received event.
    Send,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Receive => f.write_str("receive"),
            Self::Send => f.write_str("send"),
        }
    }
}

/// Where access tokens come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Client credentials, optionally with a refresh token.
    #[serde(rename = "oauth")]
    OAuth,
    /// A pre-issued `access_token` used verbatim.
    Token,
}

/// Complete agent configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// `receive` or `send`; missing is a validation error.
    pub mode: Option<Mode>,
    /// Token source.
    pub auth_method: AuthMethod,
    /// Application (client) ID.
    pub client_id: String,
    /// Application secret.
    pub client_secret: String,
    /// Directory (tenant) ID.
    pub tenant_id: String,
    /// Optional delegated refresh token.
    pub refresh_token: String,
    /// Pre-issued token for `auth_method = token`.
    pub access_token: String,
    /// `inbox`, `sent`, `drafts` or `deleted`.
    pub folder: String,
    /// ISO-8601 lower bound for polling; empty means unread-only polling.
    pub since: String,
    /// Mark emitted messages read.
    pub mark_as_read: bool,
    /// Recipients, separated by `,` or `;`.
    pub to: String,
    /// Carbon copy recipients.
    pub cc: String,
    /// Blind carbon copy recipients.
    pub bcc: String,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// `HTML` or `Text`.
    pub content_type: String,
    /// Explicit mailbox (object id or UPN) for `users/{id}` paths.
    pub mailbox: Option<String>,
    /// `$top` for message list calls.
    pub page_size: Option<u32>,
    /// Transport timeout per request.
    pub request_timeout_secs: u64,
    /// Graph API root.
    pub graph_base_url: String,
    /// Identity provider root.
    pub authority_url: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            mode: Some(Mode::Receive),
            auth_method: AuthMethod::OAuth,
            client_id: String::new(),
            client_secret: String::new(),
            tenant_id: String::new(),
            refresh_token: String::new(),
            access_token: String::new(),
            folder: MailFolder::Inbox.as_str().to_string(),
            since: String::new(),
            mark_as_read: false,
            to: String::new(),
            cc: String::new(),
            bcc: String::new(),
            subject: String::new(),
            body: String::new(),
            content_type: ContentType::Html.as_str().to_string(),
            mailbox: None,
            page_size: None,
            request_timeout_secs: 30,
            graph_base_url: GRAPH_API_BASE.to_string(),
            authority_url: DEFAULT_AUTHORITY.to_string(),
        }
    }
}

impl AgentSettings {
    /// Returns every problem with these settings; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.mode.is_none() {
            errors.push("Mode is required".to_string());
        }

        match self.auth_method {
            AuthMethod::OAuth => {
                if is_blank(&self.client_id) {
                    errors.push("Client ID is required for OAuth".to_string());
                }
                if is_blank(&self.client_secret) {
                    errors.push("Client Secret is required for OAuth".to_string());
                }
                if is_blank(&self.tenant_id) {
                    errors.push("Tenant ID is required for OAuth".to_string());
                }
            }
            AuthMethod::Token => {
                if is_blank(&self.access_token) {
                    errors.push("Access token is required".to_string());
                }
            }
        }

        match self.mode {
            Some(Mode::Send) => {
                if is_blank(&self.to) {
                    errors.push("Recipient (to) is required for send mode".to_string());
                }
                if is_blank(&self.subject) {
                    errors.push("Subject is required for send mode".to_string());
                }
                if is_blank(&self.body) {
                    errors.push("Body is required for send mode".to_string());
                }
            }
            Some(Mode::Receive) => {
                if let Err(e) = self.folder() {
                    errors.push(e);
                }
            }
            None => {}
        }

        if !self.content_type.is_empty() {
            if let Err(e) = ContentType::from_str(&self.content_type) {
                errors.push(e);
            }
        }

        for (name, value) in [
            ("Graph base URL", &self.graph_base_url),
            ("Authority URL", &self.authority_url),
        ] {
            if url::Url::parse(value).is_err() {
                errors.push(format!("{} must be an absolute URL", name));
            }
        }

        if self.request_timeout_secs == 0 {
            errors.push("Request timeout must be at least 1 second".to_string());
        }

        errors
    }

    /// Returns `Ok(())` or [`SettingsError::Invalid`] with every problem.
    pub fn ensure_valid(&self) -> Result<(), SettingsError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Invalid(errors))
        }
    }

    /// Parsed polling folder.
    pub fn folder(&self) -> Result<MailFolder, String> {
        self.folder.parse()
    }

    /// Parsed body content type; empty means HTML.
    pub fn content_type(&self) -> Result<ContentType, String> {
        if self.content_type.is_empty() {
            Ok(ContentType::default())
        } else {
            self.content_type.parse()
        }
    }

    /// The `since` filter, or `None` when blank.
    pub fn since(&self) -> Option<&str> {
        Some(self.since.trim()).filter(|s| !s.is_empty())
    }

    /// The explicit mailbox, or `None` when blank.
    pub fn mailbox(&self) -> Option<&str> {
        self.mailbox
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Loads settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// `settings.json` in the platform config directory.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let dirs =
            ProjectDirs::from("", "", "outlook-agent").ok_or(SettingsError::MissingDirectories)?;
        Ok(dirs.config_dir().join("settings.json"))
    }
}

impl fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "" } else { "[REDACTED]" };
        f.debug_struct("AgentSettings")
            .field("mode", &self.mode)
            .field("auth_method", &self.auth_method)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("tenant_id", &self.tenant_id)
            .field("refresh_token", &redact(&self.refresh_token))
            .field("access_token", &redact(&self.access_token))
            .field("folder", &self.folder)
            .field("since", &self.since)
            .field("mark_as_read", &self.mark_as_read)
            .field("to", &self.to)
            .field("subject", &self.subject)
            .field("content_type", &self.content_type)
            .field("mailbox", &self.mailbox)
            .finish_non_exhaustive()
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Splits a recipient field on `,` and `;`, trimming and dropping blanks.
pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn oauth_settings() -> AgentSettings {
        AgentSettings {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            tenant_id: "tenant".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_agent_defaults() {
        let settings = AgentSettings::default();
        assert_eq!(settings.mode, Some(Mode::Receive));
        assert_eq!(settings.auth_method, AuthMethod::OAuth);
        assert_eq!(settings.folder, "inbox");
        assert_eq!(settings.content_type, "HTML");
        assert!(!settings.mark_as_read);
        assert_eq!(settings.since(), None);
        assert_eq!(settings.request_timeout_secs, 30);
        assert_eq!(settings.graph_base_url, "https://graph.microsoft.com/v1.0");
    }

    #[test]
    fn default_oauth_requires_credentials() {
        assert_eq!(
            AgentSettings::default().validate(),
            vec![
                "Client ID is required for OAuth",
                "Client Secret is required for OAuth",
                "Tenant ID is required for OAuth",
            ]
        );
        assert!(oauth_settings().validate().is_empty());
    }

    #[test]
    fn token_auth_requires_access_token() {
        let settings = AgentSettings {
            auth_method: AuthMethod::Token,
            ..Default::default()
        };
        assert_eq!(settings.validate(), vec!["Access token is required"]);
    }

    #[test]
    fn send_mode_requires_message_fields() {
        let settings = AgentSettings {
            mode: Some(Mode::Send),
            folder: "nonsense".to_string(),
            ..oauth_settings()
        };
        assert_eq!(
            settings.validate(),
            vec![
                "Recipient (to) is required for send mode",
                "Subject is required for send mode",
                "Body is required for send mode",
            ]
        );
    }

    #[test]
    fn receive_mode_checks_folder_and_content_type() {
        let settings = AgentSettings {
            folder: "archive".to_string(),
            content_type: "markdown".to_string(),
            ..oauth_settings()
        };
        assert_eq!(
            settings.validate(),
            vec![
                "Folder must be 'inbox', 'sent', 'drafts', or 'deleted'",
                "Content type must be 'HTML' or 'Text'",
            ]
        );
    }

    #[test]
    fn missing_mode_is_reported() {
        let settings: AgentSettings = serde_json::from_str(
            r#"{"mode": null, "client_id": "c", "client_secret": "s", "tenant_id": "t"}"#,
        )
        .unwrap();
        assert_eq!(settings.validate(), vec!["Mode is required"]);
        assert!(matches!(
            settings.ensure_valid(),
            Err(SettingsError::Invalid(errors)) if errors.len() == 1
        ));
    }

    #[test]
    fn partial_json_takes_defaults() {
        let settings: AgentSettings =
            serde_json::from_str(r#"{"mode": "send", "auth_method": "token", "to": "a@x.com"}"#)
                .unwrap();
        assert_eq!(settings.mode, Some(Mode::Send));
        assert_eq!(settings.auth_method, AuthMethod::Token);
        assert_eq!(settings.folder, "inbox");
        assert_eq!(settings.content_type().unwrap(), ContentType::Html);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = AgentSettings {
            mailbox: Some("ops@contoso.com".to_string()),
            since: "2024-03-01".to_string(),
            ..oauth_settings()
        };
        settings.save(&path).unwrap();

        let loaded = AgentSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.mailbox(), Some("ops@contoso.com"));
    }

    #[test]
    fn load_reports_io_and_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            AgentSettings::load(&missing),
            Err(SettingsError::Io(_))
        ));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();
        assert!(matches!(
            AgentSettings::load(&broken),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn debug_redacts_secrets() {
        let settings = AgentSettings {
            client_secret: "hunter2".to_string(),
            access_token: "tok-123".to_string(),
            refresh_token: "ref-456".to_string(),
            ..oauth_settings()
        };
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("tok-123"));
        assert!(!rendered.contains("ref-456"));
    }

    #[test]
    fn recipients_split_on_commas_and_semicolons() {
        assert_eq!(
            split_recipients(" a@x.com, b@x.com;c@x.com ;; "),
            vec!["a@x.com", "b@x.com", "c@x.com"]
        );
        assert!(split_recipients("  ").is_empty());
    }

    #[test]
    fn endpoint_overrides_must_be_urls() {
        let settings = AgentSettings {
            graph_base_url: "localhost".to_string(),
            authority_url: "http://127.0.0.1:9000".to_string(),
            ..oauth_settings()
        };
        assert_eq!(
            settings.validate(),
            vec!["Graph base URL must be an absolute URL"]
        );
    }

    #[test]
    fn blank_mailbox_is_absent() {
        let settings = AgentSettings {
            mailbox: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.mailbox(), None);
    }
}
