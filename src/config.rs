use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::diagnostics::LogLevel;
use crate::models::publication::JournalId;
use crate::registry::{ApiMode, RegistryEndpoints};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub master_key: String,
    pub admin_key: Option<String>,
    /// Global ORCID API selection. Overrides per-journal settings.
    pub api_mode: Option<ApiMode>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Path of the append-only diagnostics log.
    pub log_file: PathBuf,
    /// Log level for journals that do not configure their own.
    pub log_level: LogLevel,
    /// Public base URL of the journal site, used for article links and the
    /// authorization redirect target.
    pub public_base_url: String,
    /// Host endpoint that delivers authorization invitations by email.
    pub mail_webhook_url: Option<String>,
    pub mail_webhook_secret: Option<String>,
    /// Upper bound on a single registry request.
    pub request_timeout_secs: u64,
    pub send_mail_on_publication: bool,
    /// Send registry traffic to these bases instead of the ORCID hosts.
    pub registry_endpoints: Option<RegistryEndpoints>,
}

impl Config {
    /// Returns the admin key for API authentication.
    /// Falls back to master_key if ORCID_SYNC_ADMIN_KEY is not set.
    pub fn admin_key(&self) -> &str {
        self.admin_key.as_deref().unwrap_or(&self.master_key)
    }

    /// True when API url, client id and client secret are all set globally;
    /// journal managers then cannot change them.
    pub fn is_globally_configured(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        self.api_mode.is_some() && set(&self.client_id) && set(&self.client_secret)
    }

    /// Merge a journal's stored settings with the global configuration.
    /// Global values win for the API url and client credentials. Returns
    /// `None` if no client id is available from either source.
    pub fn resolve_settings(&self, journal: Option<&JournalSettings>) -> Option<JournalSettings> {
        let pick = |global: &Option<String>, local: Option<&String>| {
            global
                .as_ref()
                .filter(|v| !v.trim().is_empty())
                .or(local.filter(|v| !v.trim().is_empty()))
                .cloned()
        };

        let client_id = pick(&self.client_id, journal.map(|j| &j.client_id))?;
        let client_secret =
            pick(&self.client_secret, journal.map(|j| &j.client_secret)).unwrap_or_default();
        let api_mode = self
            .api_mode
            .or(journal.map(|j| j.api_mode))
            .unwrap_or_default();

        Some(JournalSettings {
            api_mode,
            client_id,
            client_secret,
            log_level: journal.map(|j| j.log_level).unwrap_or(self.log_level),
            send_mail_on_publication: journal
                .map(|j| j.send_mail_on_publication)
                .unwrap_or(self.send_mail_on_publication),
        })
    }
}

/// ORCID settings of one journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalSettings {
    pub api_mode: ApiMode,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub send_mail_on_publication: bool,
}

/// The journal an operation runs for. Passed explicitly into every call.
#[derive(Debug, Clone)]
pub struct JournalContext {
    pub journal_id: JournalId,
    pub settings: JournalSettings,
}

impl JournalContext {
    pub fn new(journal_id: JournalId, settings: JournalSettings) -> Self {
        Self { journal_id, settings }
    }

    pub fn log_level(&self) -> LogLevel {
        self.settings.log_level
    }

    pub fn api_mode(&self) -> ApiMode {
        self.settings.api_mode
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let master_key = std::env::var("ORCID_SYNC_MASTER_KEY")
        .unwrap_or_else(|_| "CHANGE_ME_32_BYTE_HEX_KEY".into());

    if master_key == "CHANGE_ME_32_BYTE_HEX_KEY" {
        let env_mode = std::env::var("ORCID_SYNC_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "ORCID_SYNC_MASTER_KEY is still the insecure placeholder. \
                 Set a proper 64-char hex key before running in production."
            );
        }
        eprintln!("⚠️  ORCID_SYNC_MASTER_KEY is not set, using insecure placeholder. Set a 64-char hex key for production.");
    }

    let api_mode = match std::env::var("ORCID_API_URL") {
        Ok(v) if !v.trim().is_empty() => Some(v.parse::<ApiMode>()?),
        _ => None,
    };

    let log_level = match std::env::var("ORCID_SYNC_LOG_LEVEL") {
        Ok(v) => v.parse()?,
        Err(_) => LogLevel::Error,
    };

    let registry_endpoints = match (
        std::env::var("ORCID_SYNC_REGISTRY_API_BASE"),
        std::env::var("ORCID_SYNC_REGISTRY_SITE_BASE"),
    ) {
        (Ok(api), Ok(site)) => Some(RegistryEndpoints::new(&api, &site)?),
        _ => None,
    };

    Ok(Config {
        port: std::env::var("ORCID_SYNC_PORT")
            .unwrap_or_else(|_| "8443".into())
            .parse()
            .unwrap_or(8443),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/orcid_sync".into()),
        master_key,
        admin_key: std::env::var("ORCID_SYNC_ADMIN_KEY").ok(),
        api_mode,
        client_id: std::env::var("ORCID_CLIENT_ID").ok(),
        client_secret: std::env::var("ORCID_CLIENT_SECRET").ok(),
        log_file: std::env::var("ORCID_SYNC_LOG_FILE")
            .unwrap_or_else(|_| "orcid.log".into())
            .into(),
        log_level,
        public_base_url: std::env::var("ORCID_SYNC_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".into())
            .trim_end_matches('/')
            .to_string(),
        mail_webhook_url: std::env::var("ORCID_SYNC_MAIL_WEBHOOK_URL").ok(),
        mail_webhook_secret: std::env::var("ORCID_SYNC_MAIL_WEBHOOK_SECRET").ok(),
        request_timeout_secs: std::env::var("ORCID_SYNC_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30),
        send_mail_on_publication: std::env::var("ORCID_SYNC_SEND_MAIL_ON_PUBLICATION")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false),
        registry_endpoints,
    })
}
