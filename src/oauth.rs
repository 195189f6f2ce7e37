//! Delegated authorization: the ORCID three-legged OAuth flow.
//!
//! The contributor follows an authorization link (usually from an
//! invitation email), approves or declines on the registry site and is
//! redirected to `/orcidapi/verify`. That callback lands in
//! [`AuthorizationFlow::handle_callback`].

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{JournalContext, JournalSettings};
use crate::credentials::CredentialStore;
use crate::diagnostics::Diagnostics;
use crate::models::credential::{AccessScope, ContributorCredential};
use crate::models::publication::{ContributorId, SubmissionId};
use crate::registry::{ApiMode, RegistryClient, RegistryEndpoints, TransportError};
use crate::store::{ContentResolver, PublicationSource};

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("token exchange rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    #[error("unknown or expired invitation token")]
    InvalidToken,

    #[error("ORCID client is not configured for this journal")]
    NotConfigured,

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Where a contributor stands in the authorization flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    Unauthorized,
    /// Invitation sent, waiting for the contributor.
    Pending,
    Authorized,
    Denied,
}

impl AuthorizationState {
    pub fn of(credential: &ContributorCredential) -> Self {
        if credential.access_denied {
            AuthorizationState::Denied
        } else if credential.is_usable(Utc::now()) {
            AuthorizationState::Authorized
        } else if credential.email_token.is_some() {
            AuthorizationState::Pending
        } else {
            AuthorizationState::Unauthorized
        }
    }
}

pub fn scope_for(mode: ApiMode) -> AccessScope {
    mode.scope()
}

/// `{site}oauth/authorize?client_id=…&response_type=code&scope=…&redirect_uri=…`
pub fn authorize_url(
    settings: &JournalSettings,
    endpoints: &RegistryEndpoints,
    redirect_uri: &str,
) -> Url {
    let mut url = endpoints.site_base.clone();
    let path = format!("{}oauth/authorize", url.path());
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("client_id", &settings.client_id)
        .append_pair("response_type", "code")
        .append_pair("scope", scope_for(settings.api_mode).as_wire())
        .append_pair("redirect_uri", redirect_uri);
    url
}

/// Decline on the registry site. Terminal until the contributor retries.
pub fn record_denial(credential: &mut ContributorCredential) {
    credential.access_denied = true;
    credential.email_token = None;
}

/// Body of a successful `/oauth/token` response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    orcid: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// A freshly exchanged credential plus the identity the registry reported.
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    pub credential: ContributorCredential,
    pub orcid: Option<String>,
    pub name: Option<String>,
}

/// Query of the redirect back from the registry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub token: Option<String>,
    #[serde(rename = "articleId")]
    pub article_id: Option<SubmissionId>,
    pub code: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallbackOutcome {
    Authorized {
        contributor_id: ContributorId,
        orcid: Option<String>,
    },
    Denied {
        contributor_id: ContributorId,
    },
}

#[derive(Clone)]
pub struct AuthorizationFlow {
    client: RegistryClient,
    credentials: CredentialStore,
    source: Arc<dyn PublicationSource>,
    resolver: Arc<dyn ContentResolver>,
    diagnostics: Arc<Diagnostics>,
}

impl AuthorizationFlow {
    pub fn new(
        client: RegistryClient,
        credentials: CredentialStore,
        source: Arc<dyn PublicationSource>,
        resolver: Arc<dyn ContentResolver>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            client,
            credentials,
            source,
            resolver,
            diagnostics,
        }
    }

    pub fn authorize_url(&self, ctx: &JournalContext, redirect_uri: &str) -> Url {
        authorize_url(&ctx.settings, &self.client.endpoints(ctx.api_mode()), redirect_uri)
    }

    /// Redirect target embedded in an invitation link.
    pub fn redirect_uri(&self, email_token: &str, submission_id: SubmissionId) -> String {
        self.resolver.callback_url(
            "verify",
            &[("token", email_token.to_string()), ("articleId", submission_id.to_string())],
        )
    }

    /// Exchange an authorization code for a token. Nothing is stored here;
    /// on any failure the contributor stays unauthorized.
    pub async fn complete_authorization(
        &self,
        ctx: &JournalContext,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AuthorizationGrant, OAuthError> {
        let settings = &ctx.settings;
        if settings.client_id.trim().is_empty() {
            return Err(OAuthError::NotConfigured);
        }
        let mode = settings.api_mode;

        self.diagnostics.info(
            ctx.log_level(),
            format!("POST {}", self.client.endpoints(mode).token_url()),
        );
        let resp = self
            .client
            .exchange_code(mode, &settings.client_id, &settings.client_secret, code, redirect_uri)
            .await?;

        if !(200..300).contains(&resp.status) {
            return Err(OAuthError::Rejected {
                status: resp.status,
                body: resp.body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&resp.body)
            .map_err(|e| OAuthError::InvalidResponse(e.to_string()))?;
        if token.access_token.trim().is_empty() {
            return Err(OAuthError::InvalidResponse("empty access_token".into()));
        }
        if token.expires_in <= 0 {
            return Err(OAuthError::InvalidResponse(format!(
                "non-positive expires_in: {}",
                token.expires_in
            )));
        }

        let scope = token
            .scope
            .as_deref()
            .and_then(AccessScope::from_wire)
            .unwrap_or_else(|| scope_for(mode));
        let credential = ContributorCredential::authorized(
            token.access_token,
            token.refresh_token.filter(|t| !t.is_empty()),
            scope,
            Duration::seconds(token.expires_in),
            mode.is_sandbox(),
            Utc::now(),
        );

        Ok(AuthorizationGrant {
            credential,
            orcid: token.orcid,
            name: token.name,
        })
    }

    /// Redirect endpoint logic: match the invitation token to a
    /// contributor, then record the denial or store the exchanged token.
    pub async fn handle_callback(
        &self,
        ctx: &JournalContext,
        params: &CallbackParams,
    ) -> Result<CallbackOutcome, OAuthError> {
        let email_token = params
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(OAuthError::InvalidToken)?;
        let contributor_id = self
            .credentials
            .find_by_email_token(email_token)
            .await?
            .ok_or(OAuthError::InvalidToken)?;
        let contributor = self
            .source
            .contributor(contributor_id)
            .await?
            .ok_or(OAuthError::InvalidToken)?;
        if params.article_id.is_some_and(|id| id != contributor.submission_id) {
            return Err(OAuthError::InvalidToken);
        }

        let mut credential = self.credentials.get(contributor_id).await?;

        if let Some(error) = params.error.as_deref() {
            if error == "access_denied" {
                record_denial(&mut credential);
                self.credentials.save(contributor_id, &credential).await?;
                self.diagnostics.info(
                    ctx.log_level(),
                    format!("Contributor {} denied ORCID access", contributor_id),
                );
                return Ok(CallbackOutcome::Denied { contributor_id });
            }
            return Err(OAuthError::InvalidResponse(format!("authorization error: {}", error)));
        }

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| OAuthError::InvalidResponse("missing authorization code".into()))?;

        let redirect_uri = self.redirect_uri(email_token, contributor.submission_id);
        let grant = match self.complete_authorization(ctx, code, &redirect_uri).await {
            Ok(grant) => grant,
            Err(e) => {
                self.diagnostics.error(format!(
                    "Authorization code exchange failed for contributor {}: {}",
                    contributor_id, e
                ));
                return Err(e);
            }
        };

        let access_token = grant.credential.access_token.clone();
        credential.apply_grant(grant.credential);
        self.credentials.save(contributor_id, &credential).await?;
        self.diagnostics.info(
            ctx.log_level(),
            format!("Contributor {} authorized ORCID access", contributor_id),
        );

        let orcid = grant.orcid.clone().or_else(|| {
            contributor
                .registry_identifier()
                .map(|ident| ident.id)
        });
        if let (Some(orcid), Some(token)) = (orcid.as_deref(), access_token.as_deref()) {
            match self.client.fetch_emails(ctx.api_mode(), orcid, token).await {
                Ok(emails) => {
                    if !emails.iter().any(|e| e.eq_ignore_ascii_case(&contributor.email)) {
                        self.diagnostics.info(
                            ctx.log_level(),
                            format!(
                                "Author email {} does not match ORCID emails of {}",
                                contributor.email, orcid
                            ),
                        );
                    }
                }
                Err(e) => tracing::debug!(orcid, error = %e, "could not read ORCID emails"),
            }
        }

        Ok(CallbackOutcome::Authorized {
            contributor_id,
            orcid: grant.orcid,
        })
    }
}
