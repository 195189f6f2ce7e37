//! orcid-sync: keeps ORCID work records in step with published journal
//! articles.
//!
//! The binary serves the HTTP surface in [`api`]; hosts that embed the
//! library drive [`lifecycle::LifecycleHandler`] directly.

pub mod api;
pub mod config;
pub mod credentials;
pub mod diagnostics;
pub mod errors;
pub mod lifecycle;
pub mod metrics;
pub mod models;
pub mod notification;
pub mod oauth;
pub mod registry;
pub mod store;
pub mod sync;
pub mod vault;

use std::sync::Arc;
use std::time::Duration;

use config::{Config, JournalContext};
use credentials::CredentialStore;
use diagnostics::Diagnostics;
use errors::AppError;
use lifecycle::LifecycleHandler;
use metrics::SyncMetrics;
use models::publication::JournalId;
use notification::AuthorMailer;
use oauth::AuthorizationFlow;
use registry::RegistryClient;
use store::{ContentResolver, CredentialRepository, PublicationSource};
use sync::SyncDispatcher;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: Config,
    pub source: Arc<dyn PublicationSource>,
    pub credentials: CredentialStore,
    pub lifecycle: LifecycleHandler,
    pub metrics: Arc<SyncMetrics>,
    pub diagnostics: Arc<Diagnostics>,
}

impl AppState {
    /// Wire every component from the configuration and the host seams.
    pub fn new(
        config: Config,
        source: Arc<dyn PublicationSource>,
        repo: Arc<dyn CredentialRepository>,
        resolver: Arc<dyn ContentResolver>,
        mailer: Arc<dyn AuthorMailer>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        let mut client = RegistryClient::new(Duration::from_secs(config.request_timeout_secs));
        if let Some(endpoints) = config.registry_endpoints.clone() {
            client = client.with_endpoints(endpoints);
        }
        let credentials = CredentialStore::new(repo);
        let metrics = Arc::new(SyncMetrics::new());

        let dispatcher = SyncDispatcher::new(
            client.clone(),
            source.clone(),
            resolver.clone(),
            credentials.clone(),
            diagnostics.clone(),
            metrics.clone(),
        );
        let flow = AuthorizationFlow::new(
            client,
            credentials.clone(),
            source.clone(),
            resolver.clone(),
            diagnostics.clone(),
        );
        let lifecycle = LifecycleHandler::new(
            dispatcher,
            flow,
            source.clone(),
            resolver,
            credentials.clone(),
            mailer,
            diagnostics.clone(),
        );

        Self {
            config,
            source,
            credentials,
            lifecycle,
            metrics,
            diagnostics,
        }
    }

    /// Effective ORCID settings of a journal, global configuration applied.
    pub async fn journal_context(&self, journal_id: JournalId) -> Result<JournalContext, AppError> {
        let stored = self.source.journal_settings(journal_id).await?;
        self.config
            .resolve_settings(stored.as_ref())
            .map(|settings| JournalContext::new(journal_id, settings))
            .ok_or(AppError::NotConfigured(journal_id))
    }
}
