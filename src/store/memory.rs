//! In-process store backed by `DashMap`s. Used by tests and by hosts that
//! embed the library and feed it their own records.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CredentialRepository, PublicationSource};
use crate::config::JournalSettings;
use crate::models::credential::ContributorCredential;
use crate::models::publication::{
    Contributor, ContributorId, Issue, IssueId, Journal, JournalId, PubIdScheme,
    PublishedArticle, Submission, SubmissionId,
};

#[derive(Clone, Default)]
pub struct MemoryStore {
    journals: Arc<DashMap<JournalId, Journal>>,
    settings: Arc<DashMap<JournalId, JournalSettings>>,
    schemes: Arc<DashMap<JournalId, Vec<PubIdScheme>>>,
    issues: Arc<DashMap<IssueId, Issue>>,
    submissions: Arc<DashMap<SubmissionId, Submission>>,
    articles: Arc<DashMap<SubmissionId, PublishedArticle>>,
    contributors: Arc<DashMap<ContributorId, (usize, Contributor)>>,
    credentials: Arc<DashMap<ContributorId, ContributorCredential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_journal(&self, journal: Journal) {
        self.journals.insert(journal.id, journal);
    }

    pub fn put_settings(&self, journal_id: JournalId, settings: JournalSettings) {
        self.settings.insert(journal_id, settings);
    }

    pub fn put_schemes(&self, journal_id: JournalId, schemes: Vec<PubIdScheme>) {
        self.schemes.insert(journal_id, schemes);
    }

    pub fn put_issue(&self, issue: Issue) {
        self.issues.insert(issue.id, issue);
    }

    /// An unpublished submission.
    pub fn put_submission(&self, submission: Submission) {
        self.submissions.insert(submission.id, submission);
    }

    pub fn put_article(&self, article: PublishedArticle) {
        self.put_submission(article.submission.clone());
        self.articles.insert(article.submission.id, article);
    }

    /// Authors keep the order in which they are added.
    pub fn put_contributor(&self, contributor: Contributor) {
        let seq = self
            .contributors
            .get(&contributor.id)
            .map(|entry| entry.0)
            .unwrap_or_else(|| self.contributors.len());
        self.contributors.insert(contributor.id, (seq, contributor));
    }

    pub fn put_credential(&self, contributor_id: ContributorId, credential: ContributorCredential) {
        self.credentials.insert(contributor_id, credential);
    }

    pub fn credential(&self, contributor_id: ContributorId) -> Option<ContributorCredential> {
        self.credentials.get(&contributor_id).map(|c| c.clone())
    }
}

#[async_trait]
impl PublicationSource for MemoryStore {
    async fn published_article(
        &self,
        submission_id: SubmissionId,
    ) -> anyhow::Result<Option<PublishedArticle>> {
        Ok(self.articles.get(&submission_id).map(|a| a.clone()))
    }

    async fn submission(&self, submission_id: SubmissionId) -> anyhow::Result<Option<Submission>> {
        Ok(self.submissions.get(&submission_id).map(|s| s.clone()))
    }

    async fn issue(&self, issue_id: IssueId) -> anyhow::Result<Option<Issue>> {
        Ok(self.issues.get(&issue_id).map(|i| i.clone()))
    }

    async fn journal(&self, journal_id: JournalId) -> anyhow::Result<Option<Journal>> {
        Ok(self.journals.get(&journal_id).map(|j| j.clone()))
    }

    async fn contributors(&self, submission_id: SubmissionId) -> anyhow::Result<Vec<Contributor>> {
        let mut rows: Vec<(usize, Contributor)> = self
            .contributors
            .iter()
            .filter(|entry| entry.1.submission_id == submission_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, c)| c).collect())
    }

    async fn contributor(
        &self,
        contributor_id: ContributorId,
    ) -> anyhow::Result<Option<Contributor>> {
        Ok(self.contributors.get(&contributor_id).map(|c| c.1.clone()))
    }

    async fn published_submission_ids(
        &self,
        issue_id: IssueId,
    ) -> anyhow::Result<Vec<SubmissionId>> {
        let mut ids: Vec<SubmissionId> = self
            .articles
            .iter()
            .filter(|a| a.issue_id == Some(issue_id))
            .map(|a| a.submission.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn pub_id_schemes(&self, journal_id: JournalId) -> anyhow::Result<Vec<PubIdScheme>> {
        Ok(self
            .schemes
            .get(&journal_id)
            .map(|s| s.clone())
            .unwrap_or_default())
    }

    async fn journal_settings(
        &self,
        journal_id: JournalId,
    ) -> anyhow::Result<Option<JournalSettings>> {
        Ok(self.settings.get(&journal_id).map(|s| s.clone()))
    }
}

#[async_trait]
impl CredentialRepository for MemoryStore {
    async fn load(
        &self,
        contributor_id: ContributorId,
    ) -> anyhow::Result<Option<ContributorCredential>> {
        Ok(self.credential(contributor_id))
    }

    async fn save(
        &self,
        contributor_id: ContributorId,
        credential: &ContributorCredential,
    ) -> anyhow::Result<()> {
        self.credentials.insert(contributor_id, credential.clone());
        Ok(())
    }

    async fn find_by_email_token(&self, token: &str) -> anyhow::Result<Option<ContributorId>> {
        Ok(self
            .credentials
            .iter()
            .find(|entry| entry.email_token.as_deref() == Some(token))
            .map(|entry| *entry.key()))
    }
}
