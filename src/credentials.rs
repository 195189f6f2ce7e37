//! Credential Store: per-contributor delegated access state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::credential::ContributorCredential;
use crate::models::publication::ContributorId;
use crate::store::CredentialRepository;

#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<dyn CredentialRepository>,
}

impl CredentialStore {
    pub fn new(repo: Arc<dyn CredentialRepository>) -> Self {
        Self { repo }
    }

    /// Stored credential, or an empty one if the contributor never authorized.
    pub async fn get(&self, contributor_id: ContributorId) -> anyhow::Result<ContributorCredential> {
        Ok(self.repo.load(contributor_id).await?.unwrap_or_default())
    }

    pub async fn save(
        &self,
        contributor_id: ContributorId,
        credential: &ContributorCredential,
    ) -> anyhow::Result<()> {
        self.repo.save(contributor_id, credential).await
    }

    /// Null the token fields of `credential`. Written back only when
    /// `persist` is set; otherwise the caller saves it later.
    pub async fn clear(
        &self,
        contributor_id: ContributorId,
        credential: &mut ContributorCredential,
        persist: bool,
    ) -> anyhow::Result<()> {
        credential.clear_token();
        if persist {
            self.repo.save(contributor_id, credential).await?;
        }
        tracing::debug!(contributor_id, persist, "cleared contributor credential");
        Ok(())
    }

    pub fn is_usable(credential: &ContributorCredential, now: DateTime<Utc>) -> bool {
        credential.is_usable(now)
    }

    pub fn is_expired(credential: &ContributorCredential, now: DateTime<Utc>) -> bool {
        credential.is_expired(now)
    }

    pub async fn find_by_email_token(&self, token: &str) -> anyhow::Result<Option<ContributorId>> {
        if token.trim().is_empty() {
            return Ok(None);
        }
        self.repo.find_by_email_token(token).await
    }
}
