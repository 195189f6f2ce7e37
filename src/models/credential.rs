use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Access level granted by the contributor on the registry site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessScope {
    /// Read-only: `/authenticate`.
    Public,
    /// Read-write: `/activities/update`.
    Member,
}

impl AccessScope {
    pub fn as_wire(&self) -> &'static str {
        match self {
            AccessScope::Public => "/authenticate",
            AccessScope::Member => "/activities/update",
        }
    }

    /// Parse the `scope` value of a token response. The registry may return
    /// several space separated scopes; any write scope makes it a member grant.
    pub fn from_wire(raw: &str) -> Option<Self> {
        let mut scope = None;
        for part in raw.split_whitespace() {
            match part {
                "/activities/update" => return Some(AccessScope::Member),
                "/authenticate" | "/read-limited" => scope = Some(AccessScope::Public),
                _ => {}
            }
        }
        scope
    }
}

/// Per-contributor delegated access state, persisted by a
/// [`CredentialRepository`](crate::store::CredentialRepository) keyed by
/// contributor id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorCredential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<AccessScope>,
    pub expires_at: Option<DateTime<Utc>>,
    pub access_denied: bool,
    pub sandbox: bool,
    /// Registry put-code of this contributor's work record.
    pub work_put_code: Option<String>,
    /// One-time token embedded in the last authorization invitation.
    pub email_token: Option<String>,
}

impl ContributorCredential {
    /// The only way to attach a token: expiry always travels with it.
    pub fn authorized(
        access_token: String,
        refresh_token: Option<String>,
        scope: AccessScope,
        expires_in: Duration,
        sandbox: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token,
            scope: Some(scope),
            expires_at: Some(now + expires_in),
            access_denied: false,
            sandbox,
            work_put_code: None,
            email_token: None,
        }
    }

    /// Replace the token fields with those of a fresh grant, keeping the
    /// put-code so the next sync updates the existing work.
    pub fn apply_grant(&mut self, grant: ContributorCredential) {
        self.access_token = grant.access_token;
        self.refresh_token = grant.refresh_token;
        self.scope = grant.scope;
        self.expires_at = grant.expires_at;
        self.sandbox = grant.sandbox;
        self.access_denied = false;
        self.email_token = None;
    }

    /// Take over the token fields of another holder of the same identifier
    /// (the submitting user). Put-code and invitation state stay.
    pub fn copy_token_from(&mut self, other: &ContributorCredential) {
        self.access_token = other.access_token.clone();
        self.refresh_token = other.refresh_token.clone();
        self.scope = other.scope;
        self.expires_at = other.expires_at;
        self.sandbox = other.sandbox;
    }

    pub fn has_token(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => !self.access_denied && expires_at > now,
            _ => false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => expires_at <= now,
            // a token without expiry breaks the invariant; treat as expired
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Null every field belonging to the access token.
    pub fn clear_token(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.scope = None;
        self.expires_at = None;
        self.sandbox = false;
    }
}
