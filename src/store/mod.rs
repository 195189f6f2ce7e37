//! Storage seams.
//!
//! The hosting application owns journals, issues, submissions and authors;
//! the core reads them through [`PublicationSource`] and [`ContentResolver`].
//! Contributor credentials belong to the core and are persisted through
//! [`CredentialRepository`], keyed by contributor id.
//!
//! Implementations: `PgStore` (PostgreSQL), `MemoryStore` (in-process),
//! `PublicUrlResolver` (content links from the public base URL).

pub mod memory;
pub mod postgres;
pub mod resolver;

use async_trait::async_trait;

use crate::config::JournalSettings;
use crate::models::credential::ContributorCredential;
use crate::models::publication::{
    Contributor, ContributorId, Issue, IssueId, Journal, JournalId, PubIdScheme,
    PublishedArticle, Submission, SubmissionId,
};

#[async_trait]
pub trait PublicationSource: Send + Sync {
    /// The published-article record of a submission, if it has one.
    async fn published_article(
        &self,
        submission_id: SubmissionId,
    ) -> anyhow::Result<Option<PublishedArticle>>;

    /// A submission in any state, published or not.
    async fn submission(&self, submission_id: SubmissionId) -> anyhow::Result<Option<Submission>>;

    async fn issue(&self, issue_id: IssueId) -> anyhow::Result<Option<Issue>>;

    async fn journal(&self, journal_id: JournalId) -> anyhow::Result<Option<Journal>>;

    /// Authors of a submission in their display order.
    async fn contributors(&self, submission_id: SubmissionId) -> anyhow::Result<Vec<Contributor>>;

    async fn contributor(&self, contributor_id: ContributorId)
        -> anyhow::Result<Option<Contributor>>;

    /// Submissions published in an issue.
    async fn published_submission_ids(&self, issue_id: IssueId)
        -> anyhow::Result<Vec<SubmissionId>>;

    /// Persistent identifier schemes enabled for a journal.
    async fn pub_id_schemes(&self, journal_id: JournalId) -> anyhow::Result<Vec<PubIdScheme>>;

    /// Stored ORCID settings of a journal.
    async fn journal_settings(&self, journal_id: JournalId)
        -> anyhow::Result<Option<JournalSettings>>;
}

/// Host services that render article-facing strings.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Canonical public URL of an article.
    async fn article_url(&self, submission: &Submission) -> anyhow::Result<String>;

    /// BibTeX citation of an article. May contain markup.
    async fn bibtex_citation(
        &self,
        submission: &Submission,
        journal: &Journal,
        issue: &Issue,
        contributors: &[Contributor],
    ) -> anyhow::Result<String>;

    /// Page explaining the ORCID integration to authors.
    fn about_url(&self) -> String;

    /// Redirect target of the authorization flow.
    fn callback_url(&self, operation: &str, params: &[(&str, String)]) -> String;
}

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn load(&self, contributor_id: ContributorId)
        -> anyhow::Result<Option<ContributorCredential>>;

    async fn save(
        &self,
        contributor_id: ContributorId,
        credential: &ContributorCredential,
    ) -> anyhow::Result<()>;

    /// Contributor holding an outstanding invitation token.
    async fn find_by_email_token(&self, token: &str) -> anyhow::Result<Option<ContributorId>>;
}
