//! HTTP client for the registry API.
//! Every exchange resolves to a [`RegistryResponse`]; only transport-level
//! failures (no response at all) are errors.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;

use super::{ApiMode, RegistryEndpoints, ORCID_CONTENT_TYPE};
use crate::models::outcome::SendMethod;
use crate::models::work::WorkRecord;

#[derive(Debug, thiserror::Error)]
#[error("registry transport error: {0}")]
pub struct TransportError(#[from] reqwest::Error);

/// Status, headers and body of one registry response. Header names are
/// lowercased; repeated headers keep every value in order.
#[derive(Debug, Clone, Default)]
pub struct RegistryResponse {
    pub status: u16,
    pub headers: HashMap<String, Vec<String>>,
    pub body: String,
}

impl RegistryResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// `error` member of a JSON error body, if any.
    pub fn error_code(&self) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()?
            .get("error")?
            .as_str()
            .map(String::from)
    }

    pub fn error_description(&self) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()?
            .get("error_description")?
            .as_str()
            .map(String::from)
    }

    async fn read(resp: reqwest::Response) -> Result<Self, TransportError> {
        let status = resp.status().as_u16();
        let headers = collect_headers(resp.headers());
        let body = resp.text().await?;
        Ok(Self { status, headers, body })
    }
}

fn collect_headers(map: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut headers: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in map.iter() {
        if let Ok(value) = value.to_str() {
            headers
                .entry(name.as_str().to_ascii_lowercase())
                .or_default()
                .push(value.trim().to_string());
        }
    }
    headers
}

#[derive(Debug, Deserialize)]
struct EmailsResponse {
    #[serde(default)]
    email: Vec<EmailEntry>,
}

#[derive(Debug, Deserialize)]
struct EmailEntry {
    email: String,
}

#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    endpoints_override: Option<RegistryEndpoints>,
}

impl RegistryClient {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("orcid-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            endpoints_override: None,
        }
    }

    /// Send every request to `endpoints` regardless of the journal's mode.
    pub fn with_endpoints(mut self, endpoints: RegistryEndpoints) -> Self {
        self.endpoints_override = Some(endpoints);
        self
    }

    pub fn endpoints(&self, mode: ApiMode) -> RegistryEndpoints {
        self.endpoints_override
            .clone()
            .unwrap_or_else(|| RegistryEndpoints::for_mode(mode))
    }

    /// Create (`POST`) or update (`PUT .../{put_code}`) a work record.
    pub async fn send_work(
        &self,
        mode: ApiMode,
        orcid: &str,
        access_token: &str,
        method: SendMethod,
        work: &WorkRecord,
    ) -> Result<RegistryResponse, TransportError> {
        let put_code = match method {
            SendMethod::Put => work.put_code.as_deref(),
            SendMethod::Post => None,
        };
        let url = self.endpoints(mode).work_url(orcid, put_code);
        let body = serde_json::to_vec(work).unwrap_or_default();

        tracing::debug!(method = method.as_str(), url = %url, "sending work record");
        let resp = self
            .http
            .request(method.as_reqwest(), &url)
            .header(CONTENT_TYPE, ORCID_CONTENT_TYPE)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .body(body)
            .send()
            .await?;

        RegistryResponse::read(resp).await
    }

    /// Exchange an authorization code for a token (`POST {site}/oauth/token`).
    pub async fn exchange_code(
        &self,
        mode: ApiMode,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<RegistryResponse, TransportError> {
        let url = self.endpoints(mode).token_url();
        let form = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        tracing::debug!(url = %url, "exchanging authorization code");
        let resp = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        RegistryResponse::read(resp).await
    }

    /// Email addresses on the contributor's registry profile. Private
    /// addresses are only visible with a member token.
    pub async fn fetch_emails(
        &self,
        mode: ApiMode,
        orcid: &str,
        access_token: &str,
    ) -> anyhow::Result<Vec<String>> {
        let url = self.endpoints(mode).email_url(orcid);
        let resp = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("registry returned error: status={}, body={}", status, body);
        }

        let emails: EmailsResponse = resp.json().await?;
        Ok(emails.email.into_iter().map(|e| e.email).collect())
    }
}
