//! Synchronization Dispatcher: sends a published article to the ORCID
//! record of every contributor who authorized write access.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;

use super::builder::{build_work_record, WorkInputs};
use super::{SubmissionLocks, SyncError};
use crate::config::JournalContext;
use crate::credentials::CredentialStore;
use crate::diagnostics::Diagnostics;
use crate::metrics::SyncMetrics;
use crate::models::credential::ContributorCredential;
use crate::models::outcome::{ContributorOutcome, SendMethod, SkipReason, SyncOutcome, SyncReport};
use crate::models::publication::{Contributor, Issue, SubmissionId};
use crate::models::work::WorkRecord;
use crate::registry::{put_code_from_location, RegistryClient};
use crate::store::{ContentResolver, PublicationSource};

/// A contributor that passed the eligibility filter.
struct Target {
    contributor: Contributor,
    orcid: String,
    credential: ContributorCredential,
}

#[derive(Clone)]
pub struct SyncDispatcher {
    client: RegistryClient,
    source: Arc<dyn PublicationSource>,
    resolver: Arc<dyn ContentResolver>,
    credentials: CredentialStore,
    diagnostics: Arc<Diagnostics>,
    metrics: Arc<SyncMetrics>,
    locks: SubmissionLocks,
}

impl SyncDispatcher {
    pub fn new(
        client: RegistryClient,
        source: Arc<dyn PublicationSource>,
        resolver: Arc<dyn ContentResolver>,
        credentials: CredentialStore,
        diagnostics: Arc<Diagnostics>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            client,
            source,
            resolver,
            credentials,
            diagnostics,
            metrics,
            locks: SubmissionLocks::new(),
        }
    }

    /// Push the article behind `submission_id` to every eligible
    /// contributor's record. `issue_hint` saves a lookup when the caller
    /// already holds the issue (issue publication).
    pub async fn sync(
        &self,
        ctx: &JournalContext,
        submission_id: SubmissionId,
        issue_hint: Option<Issue>,
    ) -> Result<SyncReport, SyncError> {
        let _guard = self.locks.acquire(submission_id).await;

        let result = self.run(ctx, submission_id, issue_hint).await;
        match &result {
            Ok(report) => {
                self.metrics.record_run(report);
                tracing::info!(
                    journal_id = ctx.journal_id,
                    submission_id,
                    result = report.label(),
                    "sync finished"
                );
            }
            Err(e) => {
                self.metrics.record_failed_run();
                tracing::warn!(journal_id = ctx.journal_id, submission_id, error = %e, "sync aborted");
            }
        }
        result
    }

    async fn run(
        &self,
        ctx: &JournalContext,
        submission_id: SubmissionId,
        issue_hint: Option<Issue>,
    ) -> Result<SyncReport, SyncError> {
        let level = ctx.log_level();

        let Some(article) = self.source.published_article(submission_id).await? else {
            self.diagnostics
                .error(format!("No published article found for id {}", submission_id));
            return Ok(SyncReport::skipped(SkipReason::NotPublished));
        };

        let issue = match issue_hint {
            Some(issue) => Some(issue),
            None => match article.issue_id {
                Some(issue_id) => self.source.issue(issue_id).await?,
                None => None,
            },
        };
        let Some(issue) = issue.filter(|i| i.published) else {
            return Ok(SyncReport::skipped(SkipReason::IssueNotPublished));
        };

        if !ctx.api_mode().is_member() {
            return Ok(SyncReport::skipped(SkipReason::PublicApiMode));
        }

        let contributors = self.source.contributors(submission_id).await?;
        let now = Utc::now();
        let mut targets = Vec::new();
        let mut sandbox_contributors = HashSet::new();

        for contributor in &contributors {
            let Some(ident) = contributor.registry_identifier() else {
                continue;
            };
            let mut credential = self.credentials.get(contributor.id).await?;
            if !credential.has_token() {
                continue;
            }
            if CredentialStore::is_usable(&credential, now) {
                if credential.sandbox {
                    sandbox_contributors.insert(contributor.id);
                }
                targets.push(Target {
                    contributor: contributor.clone(),
                    orcid: ident.id,
                    credential,
                });
            } else if CredentialStore::is_expired(&credential, now) {
                self.diagnostics.error(format!(
                    "Token expired on {} for author {}, deleting access token",
                    credential
                        .expires_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "unknown".into()),
                    contributor.id
                ));
                self.credentials.clear(contributor.id, &mut credential, true).await?;
            }
        }

        if targets.is_empty() {
            self.diagnostics.info(
                level,
                format!(
                    "No contributor with ORCID id or valid access token for submission {}",
                    submission_id
                ),
            );
            return Ok(SyncReport::skipped(SkipReason::NoEligibleContributors));
        }

        let submission = &article.submission;
        let journal = self
            .source
            .journal(submission.journal_id)
            .await?
            .ok_or_else(|| {
                SyncError::Build(anyhow::anyhow!("journal {} not found", submission.journal_id))
            })?;
        let article_url = self
            .resolver
            .article_url(submission)
            .await
            .map_err(SyncError::Build)?;
        let bibtex_citation = self
            .resolver
            .bibtex_citation(submission, &journal, &issue, &contributors)
            .await
            .map_err(SyncError::Build)?;
        let inputs = WorkInputs {
            article_url,
            bibtex_citation,
            pub_id_schemes: self.source.pub_id_schemes(journal.id).await?,
            sandbox_contributors,
        };

        let work = build_work_record(submission, &journal, &issue, &contributors, &inputs);
        self.diagnostics.info(
            level,
            format!(
                "Request body (without put-code): {}",
                serde_json::to_string(&work).unwrap_or_default()
            ),
        );

        // Every dispatched exchange runs to completion and persists its own
        // state change before a transport failure aborts the batch.
        let exchanges = targets
            .into_iter()
            .map(|target| self.exchange(ctx, &work, target));
        let contributors = join_all(exchanges)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SyncReport::Completed(SyncOutcome { contributors }))
    }

    /// One contributor's request and the state change its status implies.
    async fn exchange(
        &self,
        ctx: &JournalContext,
        work: &WorkRecord,
        target: Target,
    ) -> Result<ContributorOutcome, SyncError> {
        let Target {
            contributor,
            orcid,
            credential,
        } = target;
        let level = ctx.log_level();
        let mode = ctx.api_mode();

        let put_code = credential.work_put_code.clone();
        let method = if put_code.is_some() {
            SendMethod::Put
        } else {
            SendMethod::Post
        };
        let record = work.with_put_code(put_code.as_deref());
        let url = self.client.endpoints(mode).work_url(&orcid, put_code.as_deref());
        self.diagnostics.info(level, format!("{} {}", method.as_str(), url));

        let access_token = credential.access_token.clone().unwrap_or_default();
        let started = Instant::now();
        let resp = match self
            .client
            .send_work(mode, &orcid, &access_token, method, &record)
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                self.metrics
                    .record_request(method, None, started.elapsed().as_secs_f64());
                self.diagnostics
                    .error(format!("Unable to post to ORCID API, transport error: {}", e));
                return Err(e.into());
            }
        };
        self.metrics
            .record_request(method, Some(resp.status), started.elapsed().as_secs_f64());
        self.diagnostics
            .info(level, format!("Response status: {}", resp.status));

        let mut outcome = ContributorOutcome {
            contributor_id: contributor.id,
            orcid,
            method,
            status: resp.status,
            success: false,
            new_put_code: None,
            credential_revoked: false,
            put_code_cleared: false,
        };

        match resp.status {
            200 => {
                self.diagnostics.info(
                    level,
                    format!(
                        "Work updated in profile, putCode: {}",
                        put_code.as_deref().unwrap_or_default()
                    ),
                );
                outcome.success = true;
            }
            201 => match resp.header("location").and_then(put_code_from_location) {
                Some(code) => {
                    self.diagnostics
                        .info(level, format!("Work added to profile, putCode: {}", code));
                    let mut current = self.credentials.get(contributor.id).await?;
                    current.work_put_code = Some(code.clone());
                    self.credentials.save(contributor.id, &current).await?;
                    outcome.new_put_code = Some(code);
                    outcome.success = true;
                }
                None => {
                    self.diagnostics.error(format!(
                        "Work created for author {} but the response has no usable Location header",
                        contributor.id
                    ));
                }
            },
            401 if resp.error_code().as_deref() == Some("invalid_token") => {
                self.diagnostics.error(format!(
                    "{}, deleting access token from author {}",
                    resp.error_description()
                        .unwrap_or_else(|| "invalid_token".into()),
                    contributor.id
                ));
                // a re-authorization that landed meanwhile keeps its token
                let mut current = self.credentials.get(contributor.id).await?;
                if current.access_token == credential.access_token {
                    self.credentials.clear(contributor.id, &mut current, true).await?;
                    outcome.credential_revoked = true;
                }
            }
            404 if method == SendMethod::Put => {
                self.diagnostics.error(format!(
                    "Work deleted from ORCID record, deleting putCode from author {}",
                    contributor.id
                ));
                let mut current = self.credentials.get(contributor.id).await?;
                current.work_put_code = None;
                self.credentials.save(contributor.id, &current).await?;
                outcome.put_code_cleared = true;
            }
            409 => {
                self.diagnostics.error(format!(
                    "Work already added to profile, response body: {}",
                    resp.body
                ));
            }
            status => {
                self.diagnostics.error(format!(
                    "Unexpected status {} response, body: {}",
                    status, resp.body
                ));
            }
        }

        Ok(outcome)
    }
}
