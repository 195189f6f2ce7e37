//! Publication lifecycle events, called explicitly by the host.
//!
//! Every handler completes regardless of registry trouble: sync and mail
//! failures end up in the diagnostics log and in the returned summary,
//! never in an `Err`. Only failures of the local stores propagate.
//! Invitations are delivered in the background; handlers never wait on
//! the mail host.

use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::JournalContext;
use crate::credentials::CredentialStore;
use crate::diagnostics::Diagnostics;
use crate::models::outcome::SyncReport;
use crate::models::publication::{
    Contributor, ContributorId, Issue, RegistryIdentifier, SubmissionId, Submitter,
};
use crate::notification::{AuthorMailer, AuthorizationInvite, MailTemplate};
use crate::oauth::AuthorizationFlow;
use crate::store::{ContentResolver, PublicationSource};
use crate::sync::SyncDispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorDecision {
    Accept,
    SendToProduction,
    RequestRevisions,
    Decline,
}

/// Result of syncing one submission as part of an event.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionSync {
    pub submission_id: SubmissionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthorSaved {
    pub invited: bool,
    pub credential_cleared: bool,
}

#[derive(Clone)]
pub struct LifecycleHandler {
    dispatcher: SyncDispatcher,
    flow: AuthorizationFlow,
    source: Arc<dyn PublicationSource>,
    resolver: Arc<dyn ContentResolver>,
    credentials: CredentialStore,
    mailer: Arc<dyn AuthorMailer>,
    diagnostics: Arc<Diagnostics>,
}

impl LifecycleHandler {
    pub fn new(
        dispatcher: SyncDispatcher,
        flow: AuthorizationFlow,
        source: Arc<dyn PublicationSource>,
        resolver: Arc<dyn ContentResolver>,
        credentials: CredentialStore,
        mailer: Arc<dyn AuthorMailer>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            dispatcher,
            flow,
            source,
            resolver,
            credentials,
            mailer,
            diagnostics,
        }
    }

    pub fn dispatcher(&self) -> &SyncDispatcher {
        &self.dispatcher
    }

    pub fn flow(&self) -> &AuthorizationFlow {
        &self.flow
    }

    /// Sync every article of a newly published issue.
    pub async fn on_issue_published(
        &self,
        ctx: &JournalContext,
        issue: Issue,
    ) -> anyhow::Result<Vec<SubmissionSync>> {
        let submission_ids = self.source.published_submission_ids(issue.id).await?;
        tracing::info!(issue_id = issue.id, count = submission_ids.len(), "issue published");

        let mut results = Vec::with_capacity(submission_ids.len());
        for submission_id in submission_ids {
            results.push(self.sync_absorbing(ctx, submission_id, Some(issue.clone())).await);
        }
        Ok(results)
    }

    /// A single article was scheduled into an (already published) issue.
    pub async fn on_submission_scheduled(
        &self,
        ctx: &JournalContext,
        submission_id: SubmissionId,
    ) -> SubmissionSync {
        self.sync_absorbing(ctx, submission_id, None).await
    }

    /// On promotion to production, invite every contributor that cannot be
    /// synced yet. Returns the contributors whose invitation was queued.
    pub async fn on_editor_decision(
        &self,
        ctx: &JournalContext,
        submission_id: SubmissionId,
        decision: EditorDecision,
    ) -> anyhow::Result<Vec<ContributorId>> {
        if decision != EditorDecision::SendToProduction || !ctx.settings.send_mail_on_publication {
            return Ok(Vec::new());
        }

        let now = chrono::Utc::now();
        let mut invited = Vec::new();
        for contributor in self.source.contributors(submission_id).await? {
            let credential = self.credentials.get(contributor.id).await?;
            if credential.access_denied || CredentialStore::is_usable(&credential, now) {
                continue;
            }
            if self.send_invite(ctx, &contributor).await? {
                invited.push(contributor.id);
            }
        }
        Ok(invited)
    }

    /// The submitting user is usually the first author: if both carry the
    /// same identifier, the author inherits the user's token.
    pub async fn on_submission_submitted(
        &self,
        ctx: &JournalContext,
        submission_id: SubmissionId,
        submitter: &Submitter,
    ) -> anyhow::Result<bool> {
        let contributors = self.source.contributors(submission_id).await?;
        let Some(first) = contributors.first() else {
            return Ok(false);
        };

        let same_identifier = match (
            first.registry_identifier(),
            submitter.orcid.as_deref().and_then(RegistryIdentifier::parse),
        ) {
            (Some(author), Some(user)) => author.id == user.id,
            _ => false,
        };
        if !same_identifier || !submitter.credential.has_token() {
            return Ok(false);
        }

        let mut credential = self.credentials.get(first.id).await?;
        credential.copy_token_from(&submitter.credential);
        self.credentials.save(first.id, &credential).await?;
        self.diagnostics.info(
            ctx.log_level(),
            format!(
                "Copied submitter access token to first author {} of submission {}",
                first.id, submission_id
            ),
        );
        Ok(true)
    }

    /// Author form saved. The host drops the identifier itself when
    /// `delete_orcid` is set; the credential is cleared here.
    pub async fn on_author_saved(
        &self,
        ctx: &JournalContext,
        contributor_id: ContributorId,
        request_authorization: bool,
        delete_orcid: bool,
    ) -> anyhow::Result<AuthorSaved> {
        let Some(contributor) = self.source.contributor(contributor_id).await? else {
            anyhow::bail!("contributor {} not found", contributor_id);
        };

        let mut saved = AuthorSaved::default();
        if request_authorization {
            saved.invited = self.send_invite(ctx, &contributor).await?;
        }
        if delete_orcid {
            let mut credential = self.credentials.get(contributor_id).await?;
            self.credentials.clear(contributor_id, &mut credential, true).await?;
            saved.credential_cleared = true;
        }
        Ok(saved)
    }

    async fn sync_absorbing(
        &self,
        ctx: &JournalContext,
        submission_id: SubmissionId,
        issue: Option<Issue>,
    ) -> SubmissionSync {
        match self.dispatcher.sync(ctx, submission_id, issue).await {
            Ok(report) => SubmissionSync {
                submission_id,
                report: Some(report),
                error: None,
            },
            Err(e) => {
                self.diagnostics
                    .error(format!("Sync of submission {} failed: {}", submission_id, e));
                SubmissionSync {
                    submission_id,
                    report: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Mint a fresh invitation token, store it and hand the invite to the
    /// mailer in the background. Returns false when the contributor has no
    /// email address; delivery failures only reach the diagnostics log.
    async fn send_invite(
        &self,
        ctx: &JournalContext,
        contributor: &Contributor,
    ) -> anyhow::Result<bool> {
        if contributor.email.trim().is_empty() {
            return Ok(false);
        }

        let email_token = new_email_token();
        let mut credential = self.credentials.get(contributor.id).await?;
        credential.email_token = Some(email_token.clone());
        self.credentials.save(contributor.id, &credential).await?;

        let article_title = self
            .source
            .submission(contributor.submission_id)
            .await?
            .map(|s| s.localized_title().to_string())
            .unwrap_or_default();
        let journal = self.source.journal(ctx.journal_id).await?;

        let redirect_uri = self.flow.redirect_uri(&email_token, contributor.submission_id);
        let invite = AuthorizationInvite {
            template: MailTemplate::for_member_api(ctx.api_mode().is_member()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            recipient_name: contributor.full_name(),
            recipient_email: contributor.email.clone(),
            article_title,
            authorization_url: self.flow.authorize_url(ctx, &redirect_uri).to_string(),
            about_url: self.resolver.about_url(),
            from_name: journal.as_ref().and_then(|j| j.contact_name.clone()),
            from_email: journal.as_ref().and_then(|j| j.contact_email.clone()),
        };

        let mailer = self.mailer.clone();
        let diagnostics = self.diagnostics.clone();
        let level = ctx.log_level();
        let contributor_id = contributor.id;
        tokio::spawn(async move {
            let template = invite.template.key();
            match mailer.send_invite(&invite).await {
                Ok(()) => diagnostics.info(
                    level,
                    format!("Sent {} to author {}", template, contributor_id),
                ),
                Err(e) => diagnostics.error(format!(
                    "Could not send {} to author {}: {}",
                    template, contributor_id, e
                )),
            }
        });
        Ok(true)
    }
}

fn new_email_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
