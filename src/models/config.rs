//! Application configuration structures.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Minutes to wait between cycles in watch mode
    #[serde(default = "defaults::check_interval")]
    pub check_interval_minutes: u64,

    /// Events page and parsing rules
    #[serde(default)]
    pub source: SourceConfig,

    /// SMTP transport and recipients
    #[serde(default)]
    pub email: EmailConfig,

    /// State file location
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML or JSON file.
    ///
    /// The format is picked from the extension: `.json` is JSON, anything
    /// else is TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("cannot read {}: {e}", path.display())))?;
        let parsed = if is_json(path) {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            toml::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|e| AppError::config(format!("{}: {e}", path.display())))
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Write configuration to a file, in the format its extension implies.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using the given lookup.
    ///
    /// Overrides only take effect when `SENDER_EMAIL` is set. Malformed
    /// values are logged and the file value is kept.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(sender) = lookup("SENDER_EMAIL") else {
            return;
        };
        log::info!("Loading email configuration from environment variables");

        self.email.sender_email = sender;
        if let Some(password) = lookup("SENDER_PASSWORD") {
            self.email.sender_password = password;
        }
        if let Some(server) = lookup("SMTP_SERVER") {
            self.email.smtp_server = server;
        }
        if let Some(port) = lookup("SMTP_PORT") {
            match port.trim().parse() {
                Ok(port) => self.email.smtp_port = port,
                Err(e) => log::error!("Ignoring SMTP_PORT={:?}: {}", port, e),
            }
        }
        if let Some(raw) = lookup("RECIPIENT_EMAILS") {
            match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(list) => self.email.recipients = normalize_recipients(list, None),
                Err(e) => log::error!("Ignoring RECIPIENT_EMAILS: {}", e),
            }
        }
        if let Some(minutes) = lookup("CHECK_INTERVAL_MINUTES") {
            match minutes.trim().parse() {
                Ok(minutes) => self.check_interval_minutes = minutes,
                Err(e) => log::error!("Ignoring CHECK_INTERVAL_MINUTES={:?}: {}", minutes, e),
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.source.url)
            .map_err(|e| AppError::validation(format!("source.url is invalid: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::validation("source.url must be http or https"));
        }
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::validation("source.user_agent is empty"));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        if self.source.date_marker_alt.trim().is_empty() {
            return Err(AppError::validation("source.date_marker_alt is empty"));
        }
        if self.check_interval_minutes == 0 {
            return Err(AppError::validation("check_interval_minutes must be > 0"));
        }
        if self.email.smtp_server.trim().is_empty() {
            return Err(AppError::validation("email.smtp_server is empty"));
        }
        if self.email.smtp_port == 0 {
            return Err(AppError::validation("email.smtp_port must be > 0"));
        }
        if self.email.sender_email.trim().is_empty() {
            return Err(AppError::validation("email.sender_email is empty"));
        }
        if self.storage.events_file.trim().is_empty() {
            return Err(AppError::validation("storage.events_file is empty"));
        }
        Ok(())
    }

    /// Non-fatal problems worth reporting before a run.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.email.recipients.is_empty() {
            warnings.push("No recipient emails configured; notifications will fail".to_string());
        }
        if self.email.sender_email == defaults::SENDER_PLACEHOLDER
            || self.email.sender_password == defaults::PASSWORD_PLACEHOLDER
        {
            warnings.push("Email credentials still hold placeholder values".to_string());
        }
        warnings
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_interval_minutes: defaults::check_interval(),
            source: SourceConfig::default(),
            email: EmailConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Events page location and parsing rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Display name used in notifications
    #[serde(default = "defaults::source_name")]
    pub name: String,

    /// Listing page URL
    #[serde(default = "defaults::source_url")]
    pub url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Headings that are page furniture, not events
    #[serde(default = "defaults::ignored_titles")]
    pub ignored_titles: Vec<String>,

    /// `alt` text of the image that precedes each event date
    #[serde(default = "defaults::date_marker_alt")]
    pub date_marker_alt: String,

    /// Text that opens an event's "details" link; never taken as a date
    #[serde(default = "defaults::details_label")]
    pub details_label: String,

    /// Number of paragraphs joined into the description
    #[serde(default = "defaults::description_paragraphs")]
    pub description_paragraphs: usize,

    /// Description length limit, in grapheme clusters
    #[serde(default = "defaults::description_max_chars")]
    pub description_max_chars: usize,

    /// Date used when an event has none. Such events are skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_placeholder: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: defaults::source_name(),
            url: defaults::source_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            ignored_titles: defaults::ignored_titles(),
            date_marker_alt: defaults::date_marker_alt(),
            details_label: defaults::details_label(),
            description_paragraphs: defaults::description_paragraphs(),
            description_max_chars: defaults::description_max_chars(),
            date_placeholder: None,
        }
    }
}

/// SMTP settings and the normalized recipient list.
///
/// Accepts both `recipient_emails = [...]` and the older
/// `recipient_email = "..."`; only the list form is written back.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "RawEmailConfig", into = "RawEmailConfig")]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender_email: String,
    pub sender_password: String,
    /// Normalized, ordered, duplicate-free recipients
    pub recipients: Vec<String>,
    /// SMTP timeout in seconds
    pub timeout_secs: u64,
    /// Closing lines appended to every message
    pub footer: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        RawEmailConfig::default().into()
    }
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("sender_email", &self.sender_email)
            .field("sender_password", &"<redacted>")
            .field("recipients", &self.recipients)
            .field("timeout_secs", &self.timeout_secs)
            .field("footer", &self.footer)
            .finish()
    }
}

/// On-disk shape of [`EmailConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEmailConfig {
    #[serde(default = "defaults::smtp_server")]
    smtp_server: String,
    #[serde(default = "defaults::smtp_port")]
    smtp_port: u16,
    #[serde(default = "defaults::sender_email")]
    sender_email: String,
    #[serde(default = "defaults::sender_password")]
    sender_password: String,
    #[serde(default)]
    recipient_emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipient_email: Option<String>,
    #[serde(default = "defaults::timeout")]
    timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    footer: Option<String>,
}

impl Default for RawEmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: defaults::smtp_server(),
            smtp_port: defaults::smtp_port(),
            sender_email: defaults::sender_email(),
            sender_password: defaults::sender_password(),
            recipient_emails: Vec::new(),
            recipient_email: None,
            timeout_secs: defaults::timeout(),
            footer: None,
        }
    }
}

impl From<RawEmailConfig> for EmailConfig {
    fn from(raw: RawEmailConfig) -> Self {
        Self {
            smtp_server: raw.smtp_server,
            smtp_port: raw.smtp_port,
            sender_email: raw.sender_email,
            sender_password: raw.sender_password,
            recipients: normalize_recipients(raw.recipient_emails, raw.recipient_email),
            timeout_secs: raw.timeout_secs,
            footer: raw.footer,
        }
    }
}

impl From<EmailConfig> for RawEmailConfig {
    fn from(config: EmailConfig) -> Self {
        Self {
            smtp_server: config.smtp_server,
            smtp_port: config.smtp_port,
            sender_email: config.sender_email,
            sender_password: config.sender_password,
            recipient_emails: config.recipients,
            recipient_email: None,
            timeout_secs: config.timeout_secs,
            footer: config.footer,
        }
    }
}

/// Merge the plural and legacy singular recipient fields into one list.
///
/// The list wins when it has any usable entry. Entries are trimmed, blanks
/// dropped and repeated addresses kept only at their first position.
pub fn normalize_recipients(list: Vec<String>, legacy: Option<String>) -> Vec<String> {
    let mut recipients: Vec<String> = Vec::new();
    for address in list {
        let address = address.trim();
        if !address.is_empty() && !recipients.iter().any(|r| r == address) {
            recipients.push(address.to_string());
        }
    }

    if recipients.is_empty() {
        if let Some(address) = legacy.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            recipients.push(address.to_string());
        }
    } else if legacy.is_some() {
        log::debug!("Both recipient_emails and recipient_email set; using recipient_emails");
    }

    recipients
}

/// State file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the JSON state file
    #[serde(default = "defaults::events_file")]
    pub events_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            events_file: defaults::events_file(),
        }
    }
}

mod defaults {
    pub const SENDER_PLACEHOLDER: &str = "your_email@gmail.com";
    pub const PASSWORD_PLACEHOLDER: &str = "your_app_password";

    pub fn check_interval() -> u64 {
        60
    }

    // Source defaults
    pub fn source_name() -> String {
        "Om Swami Ashram".into()
    }
    pub fn source_url() -> String {
        "https://omswami.org/events".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn ignored_titles() -> Vec<String> {
        vec!["Event Gallery".into(), "Download Pics".into()]
    }
    pub fn date_marker_alt() -> String {
        "Event Date".into()
    }
    pub fn details_label() -> String {
        "Event Details".into()
    }
    pub fn description_paragraphs() -> usize {
        2
    }
    pub fn description_max_chars() -> usize {
        500
    }

    // Email defaults
    pub fn smtp_server() -> String {
        "smtp.gmail.com".into()
    }
    pub fn smtp_port() -> u16 {
        587
    }
    pub fn sender_email() -> String {
        SENDER_PLACEHOLDER.into()
    }
    pub fn sender_password() -> String {
        PASSWORD_PLACEHOLDER.into()
    }

    // Storage defaults
    pub fn events_file() -> String {
        "events_data.json".into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.email.sender_email = "tracker@example.com".to_string();
        config.email.sender_password = "app-password".to_string();
        config.email.recipients = vec!["a@example.com".to_string()];
        config
    }

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_url() {
        let mut config = valid_config();
        config.source.url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.source.url = "ftp://example.com/events".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = valid_config();
        config.check_interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn warnings_flag_missing_recipients_and_placeholders() {
        let config = Config::default();
        assert_eq!(config.warnings().len(), 2);
        assert!(valid_config().warnings().is_empty());
    }

    #[test]
    fn singular_recipient_becomes_list() {
        let config: Config = toml::from_str(
            r#"
            [email]
            recipient_email = "solo@example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.email.recipients, vec!["solo@example.com"]);
    }

    #[test]
    fn plural_recipients_keep_order() {
        let config: Config = toml::from_str(
            r#"
            [email]
            recipient_emails = ["c@example.com", "a@example.com", "b@example.com"]
            "#,
        )
        .unwrap();
        assert_eq!(
            config.email.recipients,
            vec!["c@example.com", "a@example.com", "b@example.com"]
        );
    }

    #[test]
    fn plural_wins_over_singular() {
        let recipients = normalize_recipients(
            vec!["a@example.com".into()],
            Some("legacy@example.com".into()),
        );
        assert_eq!(recipients, vec!["a@example.com"]);
    }

    #[test]
    fn recipients_are_trimmed_and_deduplicated() {
        let recipients = normalize_recipients(
            vec![
                " a@example.com ".into(),
                "".into(),
                "b@example.com".into(),
                "a@example.com".into(),
            ],
            None,
        );
        assert_eq!(recipients, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn no_recipients_is_empty() {
        assert!(normalize_recipients(Vec::new(), None).is_empty());
        assert!(normalize_recipients(vec!["  ".into()], Some(" ".into())).is_empty());
    }

    #[test]
    fn loads_legacy_json_layout() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "email": {
                    "smtp_server": "smtp.example.com",
                    "smtp_port": 465,
                    "sender_email": "me@example.com",
                    "sender_password": "secret",
                    "recipient_email": "you@example.com"
                },
                "check_interval_minutes": 15
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.check_interval_minutes, 15);
        assert_eq!(config.email.smtp_port, 465);
        assert_eq!(config.email.recipients, vec!["you@example.com"]);
        assert_eq!(config.source.url, "https://omswami.org/events");
    }

    #[test]
    fn load_errors_are_config_errors() {
        let dir = TempDir::new().unwrap();

        let missing = Config::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, AppError::Config(_)));

        let path = dir.path().join("broken.toml");
        fs::write(&path, "check_interval_minutes = \"soon\"").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn save_and_reload_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/config.toml");
        let config = valid_config();
        config.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("recipient_emails"));
        assert!(!content.contains("recipient_email ="));

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.email.recipients, config.email.recipients);
        assert_eq!(loaded.source.ignored_titles, config.source.ignored_titles);
    }

    #[test]
    fn env_overrides_require_sender() {
        let mut config = valid_config();
        config.apply_env_with(|key| (key == "SMTP_SERVER").then(|| "ignored".to_string()));
        assert_eq!(config.email.smtp_server, "smtp.gmail.com");
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SENDER_EMAIL", "env@example.com"),
            ("SENDER_PASSWORD", "pw"),
            ("SMTP_PORT", "2525"),
            ("RECIPIENT_EMAILS", r#"["x@example.com", "y@example.com"]"#),
            ("CHECK_INTERVAL_MINUTES", "oops"),
        ]);
        let mut config = valid_config();
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.email.sender_email, "env@example.com");
        assert_eq!(config.email.sender_password, "pw");
        assert_eq!(config.email.smtp_port, 2525);
        assert_eq!(config.email.recipients, vec!["x@example.com", "y@example.com"]);
        // malformed value keeps the file setting
        assert_eq!(config.check_interval_minutes, 60);
    }

    #[test]
    fn debug_redacts_password() {
        let mut config = valid_config();
        config.email.sender_password = "hunter2".to_string();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
    }
}
