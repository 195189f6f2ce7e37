//! Shared fixtures: one member journal with a published issue, one article
//! and a handful of contributors, backed by `MemoryStore`.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tempfile::TempDir;
use wiremock::MockServer;

use orcid_sync::config::{JournalContext, JournalSettings};
use orcid_sync::credentials::CredentialStore;
use orcid_sync::diagnostics::{Diagnostics, LogLevel};
use orcid_sync::metrics::SyncMetrics;
use orcid_sync::models::credential::{AccessScope, ContributorCredential};
use orcid_sync::models::publication::{
    Contributor, ContributorId, ContributorRole, Issue, Journal, LocalizedText, PartialDate,
    PubIdScheme, PubIdType, PublishedArticle, Submission,
};
use orcid_sync::oauth::AuthorizationFlow;
use orcid_sync::registry::{ApiMode, RegistryClient, RegistryEndpoints};
use orcid_sync::store::memory::MemoryStore;
use orcid_sync::store::resolver::PublicUrlResolver;
use orcid_sync::sync::SyncDispatcher;

pub const JOURNAL_ID: i64 = 1;
pub const ISSUE_ID: i64 = 10;
pub const SUBMISSION_ID: i64 = 100;

pub const ALICE: ContributorId = 1001;
pub const BOB: ContributorId = 1002;
pub const CAROL: ContributorId = 1003;

pub const ALICE_ORCID: &str = "0000-0002-1825-0097";
pub const BOB_ORCID: &str = "0000-0001-5109-3700";

pub const BASE_URL: &str = "https://journal.example";

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub diagnostics: Arc<Diagnostics>,
    pub metrics: Arc<SyncMetrics>,
    pub log_dir: TempDir,
}

impl Fixture {
    /// Published issue, one article, Alice and Bob with identifiers, Carol
    /// without one. No credentials yet.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store.put_journal(Journal {
            id: JOURNAL_ID,
            name: LocalizedText::new().with("en_US", "Journal of Reproducible Results"),
            online_issn: Some("1234-5678".into()),
            contact_name: Some("Editorial Office".into()),
            contact_email: Some("editors@journal.example".into()),
        });
        store.put_schemes(JOURNAL_ID, vec![PubIdScheme::doi()]);
        store.put_issue(published_issue());
        store.put_article(PublishedArticle {
            submission: submission(),
            issue_id: Some(ISSUE_ID),
        });
        store.put_contributor(contributor(ALICE, "Alice", "Archer", Some(ALICE_ORCID)));
        store.put_contributor(contributor(BOB, "Bob", "Baker", Some(BOB_ORCID)));
        store.put_contributor(contributor(CAROL, "Carol", "Cole", None));

        let log_dir = tempfile::tempdir().expect("tempdir");
        let diagnostics = Arc::new(Diagnostics::new(log_dir.path().join("orcid.log")));

        Self {
            store,
            diagnostics,
            metrics: Arc::new(SyncMetrics::new()),
            log_dir,
        }
    }

    pub fn client(&self, server: &MockServer) -> RegistryClient {
        client_for(&server.uri())
    }

    pub fn credentials(&self) -> CredentialStore {
        CredentialStore::new(self.store.clone())
    }

    pub fn dispatcher(&self, server: &MockServer) -> SyncDispatcher {
        self.dispatcher_for(self.client(server))
    }

    pub fn dispatcher_for(&self, client: RegistryClient) -> SyncDispatcher {
        SyncDispatcher::new(
            client,
            self.store.clone(),
            Arc::new(PublicUrlResolver::new(BASE_URL)),
            self.credentials(),
            self.diagnostics.clone(),
            self.metrics.clone(),
        )
    }

    pub fn flow(&self, server: &MockServer) -> AuthorizationFlow {
        AuthorizationFlow::new(
            self.client(server),
            self.credentials(),
            self.store.clone(),
            Arc::new(PublicUrlResolver::new(BASE_URL)),
            self.diagnostics.clone(),
        )
    }

    pub fn authorize(&self, contributor_id: ContributorId, token: &str) {
        self.store.put_credential(contributor_id, usable_credential(token));
    }

    pub fn log_contents(&self) -> String {
        self.diagnostics.flush();
        std::fs::read_to_string(self.log_dir.path().join("orcid.log")).unwrap_or_default()
    }
}

/// Poll until `server` has seen `count` requests. Invitations are
/// delivered in the background, so callers wait for them here.
pub async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<wiremock::Request> {
    for _ in 0..100 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests.len() >= count {
            return requests;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    panic!("expected {} requests", count);
}

impl Fixture {
    /// Poll the diagnostics log until it contains `needle`.
    pub async fn wait_for_log(&self, needle: &str) -> String {
        for _ in 0..100 {
            let log = self.log_contents();
            if log.contains(needle) {
                return log;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        panic!("log never contained {:?}:\n{}", needle, self.log_contents());
    }
}

pub fn client_for(base: &str) -> RegistryClient {
    RegistryClient::new(StdDuration::from_secs(5))
        .with_endpoints(RegistryEndpoints::new(base, base).expect("endpoints"))
}

pub fn settings(mode: ApiMode) -> JournalSettings {
    JournalSettings {
        api_mode: mode,
        client_id: "APP-TEST".into(),
        client_secret: "test-secret".into(),
        log_level: LogLevel::All,
        send_mail_on_publication: true,
    }
}

pub fn member_context() -> JournalContext {
    JournalContext::new(JOURNAL_ID, settings(ApiMode::MEMBER))
}

pub fn published_issue() -> Issue {
    Issue {
        id: ISSUE_ID,
        journal_id: JOURNAL_ID,
        published: true,
        date_published: Some(PartialDate {
            year: 2024,
            month: Some(3),
            day: Some(15),
        }),
        year: Some(2024),
        pub_ids: BTreeMap::new(),
    }
}

pub fn submission() -> Submission {
    let mut pub_ids = BTreeMap::new();
    pub_ids.insert(PubIdType::Doi, "10.1234/jrr.100".to_string());
    Submission {
        id: SUBMISSION_ID,
        journal_id: JOURNAL_ID,
        locale: "en_US".into(),
        title: LocalizedText::new().with("en_US", "On <i>Repeatable</i> Experiments"),
        subtitle: LocalizedText::new(),
        abstract_text: LocalizedText::new().with("en_US", "<p>We repeat things.</p>"),
        best_id: "100".into(),
        pub_ids,
    }
}

pub fn contributor(
    id: ContributorId,
    given: &str,
    family: &str,
    orcid: Option<&str>,
) -> Contributor {
    Contributor {
        id,
        submission_id: SUBMISSION_ID,
        given_name: given.into(),
        family_name: family.into(),
        email: format!("{}@uni.example", given.to_lowercase()),
        role: ContributorRole::Author,
        orcid: orcid.map(|o| format!("https://orcid.org/{}", o)),
    }
}

pub fn usable_credential(token: &str) -> ContributorCredential {
    ContributorCredential::authorized(
        token.into(),
        Some(format!("{}-refresh", token)),
        AccessScope::Member,
        Duration::days(365),
        false,
        Utc::now(),
    )
}

pub fn expired_credential(token: &str) -> ContributorCredential {
    ContributorCredential::authorized(
        token.into(),
        None,
        AccessScope::Member,
        Duration::hours(1),
        false,
        Utc::now() - Duration::hours(2),
    )
}

pub fn work_path(orcid: &str) -> String {
    format!("/v2.1/{}/work", orcid)
}
