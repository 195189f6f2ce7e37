use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::lifecycle::{AuthorSaved, EditorDecision, SubmissionSync};
use crate::models::credential::AccessScope;
use crate::models::outcome::SyncReport;
use crate::models::publication::{ContributorId, IssueId, JournalId, SubmissionId, Submitter};
use crate::oauth::{AuthorizationState, CallbackOutcome, CallbackParams};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct IssuePublishedRequest {
    pub journal_id: JournalId,
    pub issue_id: IssueId,
}

#[derive(Deserialize)]
pub struct SubmissionEventRequest {
    pub journal_id: JournalId,
    pub submission_id: SubmissionId,
}

#[derive(Deserialize)]
pub struct EditorDecisionRequest {
    pub journal_id: JournalId,
    pub submission_id: SubmissionId,
    pub decision: EditorDecision,
}

#[derive(Deserialize)]
pub struct SubmissionSubmittedRequest {
    pub journal_id: JournalId,
    pub submission_id: SubmissionId,
    pub submitter: Submitter,
}

#[derive(Deserialize)]
pub struct AuthorSavedRequest {
    pub journal_id: JournalId,
    pub contributor_id: ContributorId,
    #[serde(default)]
    pub request_authorization: bool,
    #[serde(default)]
    pub delete_orcid: bool,
}

#[derive(Serialize)]
pub struct InvitedResponse {
    pub invited: Vec<ContributorId>,
}

#[derive(Serialize)]
pub struct CopiedResponse {
    pub copied: bool,
}

#[derive(Deserialize)]
pub struct AuthorizeUrlParams {
    pub journal_id: JournalId,
    pub redirect_uri: String,
}

#[derive(Serialize)]
pub struct AuthorizeUrlResponse {
    pub url: String,
    pub scope: &'static str,
}

/// Credential summary. Tokens never leave the service.
#[derive(Serialize)]
pub struct CredentialView {
    pub contributor_id: ContributorId,
    pub state: AuthorizationState,
    pub scope: Option<AccessScope>,
    pub expires_at: Option<DateTime<Utc>>,
    pub sandbox: bool,
    pub work_put_code: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
}

/// GET /orcidapi/verify: redirect target of the registry authorization page
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<CallbackOutcome>, AppError> {
    let submission_id = params
        .article_id
        .ok_or_else(|| AppError::BadRequest("articleId is required".into()))?;
    let submission = state
        .source
        .submission(submission_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("submission {}", submission_id)))?;
    let ctx = state.journal_context(submission.journal_id).await?;

    let outcome = state.lifecycle.flow().handle_callback(&ctx, &params).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/events/issue-published
pub async fn issue_published(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IssuePublishedRequest>,
) -> Result<Json<Vec<SubmissionSync>>, AppError> {
    let ctx = state.journal_context(req.journal_id).await?;
    let issue = state
        .source
        .issue(req.issue_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("issue {}", req.issue_id)))?;
    let results = state.lifecycle.on_issue_published(&ctx, issue).await?;
    Ok(Json(results))
}

/// POST /api/v1/events/submission-scheduled
pub async fn submission_scheduled(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmissionEventRequest>,
) -> Result<Json<SubmissionSync>, AppError> {
    let ctx = state.journal_context(req.journal_id).await?;
    Ok(Json(
        state
            .lifecycle
            .on_submission_scheduled(&ctx, req.submission_id)
            .await,
    ))
}

/// POST /api/v1/events/editor-decision
pub async fn editor_decision(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EditorDecisionRequest>,
) -> Result<Json<InvitedResponse>, AppError> {
    let ctx = state.journal_context(req.journal_id).await?;
    let invited = state
        .lifecycle
        .on_editor_decision(&ctx, req.submission_id, req.decision)
        .await?;
    Ok(Json(InvitedResponse { invited }))
}

/// POST /api/v1/events/submission-submitted
pub async fn submission_submitted(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmissionSubmittedRequest>,
) -> Result<Json<CopiedResponse>, AppError> {
    let ctx = state.journal_context(req.journal_id).await?;
    let copied = state
        .lifecycle
        .on_submission_submitted(&ctx, req.submission_id, &req.submitter)
        .await?;
    Ok(Json(CopiedResponse { copied }))
}

/// POST /api/v1/events/author-saved
pub async fn author_saved(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuthorSavedRequest>,
) -> Result<Json<AuthorSaved>, AppError> {
    let ctx = state.journal_context(req.journal_id).await?;
    let saved = state
        .lifecycle
        .on_author_saved(&ctx, req.contributor_id, req.request_authorization, req.delete_orcid)
        .await?;
    Ok(Json(saved))
}

/// POST /api/v1/submissions/:id/sync. Manual sync: transport failures
/// surface as 502 here instead of being absorbed.
pub async fn sync_submission(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<SubmissionId>,
) -> Result<Json<SyncReport>, AppError> {
    let submission = state
        .source
        .submission(submission_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("submission {}", submission_id)))?;
    let ctx = state.journal_context(submission.journal_id).await?;
    let report = state
        .lifecycle
        .dispatcher()
        .sync(&ctx, submission_id, None)
        .await?;
    Ok(Json(report))
}

/// GET /api/v1/authorize-url
pub async fn authorize_url(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthorizeUrlParams>,
) -> Result<Json<AuthorizeUrlResponse>, AppError> {
    let ctx = state.journal_context(params.journal_id).await?;
    let url = state
        .lifecycle
        .flow()
        .authorize_url(&ctx, &params.redirect_uri);
    Ok(Json(AuthorizeUrlResponse {
        url: url.to_string(),
        scope: ctx.api_mode().scope().as_wire(),
    }))
}

/// GET /api/v1/contributors/:id/credential
pub async fn get_credential(
    State(state): State<Arc<AppState>>,
    Path(contributor_id): Path<ContributorId>,
) -> Result<Json<CredentialView>, AppError> {
    let credential = state.credentials.get(contributor_id).await?;
    Ok(Json(CredentialView {
        contributor_id,
        state: AuthorizationState::of(&credential),
        scope: credential.scope,
        expires_at: credential.expires_at,
        sandbox: credential.sandbox,
        work_put_code: credential.work_put_code,
    }))
}

/// DELETE /api/v1/contributors/:id/credential
pub async fn clear_credential(
    State(state): State<Arc<AppState>>,
    Path(contributor_id): Path<ContributorId>,
) -> Result<Json<CredentialView>, AppError> {
    let mut credential = state.credentials.get(contributor_id).await?;
    state
        .credentials
        .clear(contributor_id, &mut credential, true)
        .await?;
    tracing::info!(contributor_id, "credential cleared via admin API");
    Ok(Json(CredentialView {
        contributor_id,
        state: AuthorizationState::of(&credential),
        scope: credential.scope,
        expires_at: credential.expires_at,
        sandbox: credential.sandbox,
        work_put_code: credential.work_put_code,
    }))
}

/// GET /orcidapi/about
pub async fn about() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "This journal records published articles on the ORCID profiles of \
         authors who grant it permission. Authors receive an email with a link \
         to the ORCID authorization page; after granting access, each new \
         publication is added to the author's ORCID record automatically. \
         Access can be revoked at any time from the ORCID account settings.",
    )
}
