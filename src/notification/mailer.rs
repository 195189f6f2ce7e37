use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

// ── Invitation payload ───────────────────────────────────────

/// Host email template an invitation is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MailTemplate {
    /// Member API: ask for write access to the contributor's record.
    #[serde(rename = "ORCID_REQUEST_AUTHOR_AUTHORIZATION")]
    RequestAuthorAuthorization,
    /// Public API: only collect the authenticated identifier.
    #[serde(rename = "ORCID_COLLECT_AUTHOR_ID")]
    CollectAuthorId,
}

impl MailTemplate {
    pub fn for_member_api(is_member: bool) -> Self {
        if is_member {
            MailTemplate::RequestAuthorAuthorization
        } else {
            MailTemplate::CollectAuthorId
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            MailTemplate::RequestAuthorAuthorization => "ORCID_REQUEST_AUTHOR_AUTHORIZATION",
            MailTemplate::CollectAuthorId => "ORCID_COLLECT_AUTHOR_ID",
        }
    }
}

/// An authorization invitation, handed to the host for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationInvite {
    pub template: MailTemplate,
    pub timestamp: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub article_title: String,
    /// Registry authorization link the contributor follows.
    pub authorization_url: String,
    pub about_url: String,
    /// Primary journal contact.
    pub from_name: Option<String>,
    pub from_email: Option<String>,
}

/// Delivery of invitations. Failures are reported, never retried by the
/// caller.
#[async_trait]
pub trait AuthorMailer: Send + Sync {
    async fn send_invite(&self, invite: &AuthorizationInvite) -> Result<()>;
}

// ── HMAC Signing ─────────────────────────────────────────────

/// HMAC-SHA256 of `payload`, as `sha256=<hex>`.
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

// ── Webhook Mailer ───────────────────────────────────────────

/// Posts invitations to the host's mail endpoint.
/// - HMAC-SHA256 signature in `x-orcid-sync-signature` when a secret is set
/// - retries with back-off (1s → 5s → 25s by default)
#[derive(Clone)]
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
    signing_secret: Option<String>,
    backoff_secs: Vec<u64>,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>, signing_secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent(concat!("orcid-sync-mailer/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("failed to build mail webhook HTTP client"),
            url: url.into(),
            signing_secret,
            backoff_secs: vec![0, 1, 5, 25],
        }
    }

    /// Delays before each attempt; the first is usually zero.
    pub fn with_backoff(mut self, backoff_secs: Vec<u64>) -> Self {
        self.backoff_secs = backoff_secs;
        self
    }
}

#[async_trait]
impl AuthorMailer for WebhookMailer {
    async fn send_invite(&self, invite: &AuthorizationInvite) -> Result<()> {
        let payload = serde_json::to_vec(invite)
            .map_err(|e| anyhow::anyhow!("invite serialize error: {}", e))?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self
            .signing_secret
            .as_deref()
            .map(|s| hmac_sha256_hex(s, &payload));
        let url = self.url.as_str();
        let template = invite.template.key();

        for (attempt, &delay) in self.backoff_secs.iter().enumerate() {
            if delay > 0 {
                debug!(url, attempt, delay_secs = delay, template, "retrying invite delivery");
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header("x-orcid-sync-delivery-id", &delivery_id)
                .header("x-orcid-sync-timestamp", &timestamp)
                .header("x-orcid-sync-template", template);
            if let Some(ref sig) = signature {
                req = req.header("x-orcid-sync-signature", sig.as_str());
            }

            match req.body(payload.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        url,
                        template,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %resp.status(),
                        "invite delivered"
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    warn!(
                        url,
                        template,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %status,
                        body = %body,
                        "invite delivery failed (non-2xx)"
                    );
                }
                Err(e) => {
                    warn!(
                        url,
                        template,
                        delivery_id = %delivery_id,
                        attempt,
                        error = %e,
                        "invite delivery request error"
                    );
                }
            }
        }

        Err(anyhow::anyhow!(
            "invite delivery failed after {} attempts: {}",
            self.backoff_secs.len(),
            url
        ))
    }
}

/// Used when no mail endpoint is configured: the invitation only reaches
/// the service log.
#[derive(Debug, Clone, Default)]
pub struct LogOnlyMailer;

#[async_trait]
impl AuthorMailer for LogOnlyMailer {
    async fn send_invite(&self, invite: &AuthorizationInvite) -> Result<()> {
        warn!(
            template = invite.template.key(),
            recipient = %invite.recipient_email,
            authorization_url = %invite.authorization_url,
            "no mail webhook configured, invite not delivered"
        );
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invite() -> AuthorizationInvite {
        AuthorizationInvite {
            template: MailTemplate::RequestAuthorAuthorization,
            timestamp: "2019-03-07T12:00:00Z".into(),
            recipient_name: "Josiah Carberry".into(),
            recipient_email: "josiah@example.org".into(),
            article_title: "On Sync".into(),
            authorization_url: "https://orcid.org/oauth/authorize?client_id=APP".into(),
            about_url: "https://journal.example/orcidapi/about".into(),
            from_name: Some("Editor".into()),
            from_email: Some("editor@journal.example".into()),
        }
    }

    #[test]
    fn test_template_selection() {
        assert_eq!(MailTemplate::for_member_api(true).key(), "ORCID_REQUEST_AUTHOR_AUTHORIZATION");
        assert_eq!(MailTemplate::for_member_api(false).key(), "ORCID_COLLECT_AUTHOR_ID");
        let json = serde_json::to_value(invite()).unwrap();
        assert_eq!(json["template"], "ORCID_REQUEST_AUTHOR_AUTHORIZATION");
    }

    #[test]
    fn test_hmac_signature_deterministic() {
        let sig1 = hmac_sha256_hex("secret123", b"payload");
        let sig2 = hmac_sha256_hex("secret123", b"payload");
        assert_eq!(sig1, sig2);
        assert!(sig1.starts_with("sha256="));
        assert_ne!(sig1, hmac_sha256_hex("secret456", b"payload"));
    }

    #[tokio::test]
    async fn test_signed_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mail"))
            .and(header("x-orcid-sync-template", "ORCID_REQUEST_AUTHOR_AUTHORIZATION"))
            .and(header_exists("x-orcid-sync-signature"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = WebhookMailer::new(format!("{}/mail", server.uri()), Some("s".into()));
        mailer.send_invite(&invite()).await.unwrap();
    }

    #[tokio::test]
    async fn test_retries_then_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let mailer = WebhookMailer::new(server.uri(), None).with_backoff(vec![0, 0, 0]);
        assert!(mailer.send_invite(&invite()).await.is_err());
    }
}
