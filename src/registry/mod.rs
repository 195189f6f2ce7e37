//! ORCID registry endpoints and HTTP client.
//!
//! A journal is configured with one of four API bases: production or
//! sandbox, public (read-only) or member (read-write). The authorization
//! site, the requested scope and the identifier host follow
//! from that choice.

pub mod client;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::models::credential::AccessScope;

pub use client::{RegistryClient, RegistryResponse, TransportError};

pub const ORCID_URL: &str = "https://orcid.org/";
pub const ORCID_URL_SANDBOX: &str = "https://sandbox.orcid.org/";
pub const ORCID_API_URL_PUBLIC: &str = "https://pub.orcid.org/";
pub const ORCID_API_URL_PUBLIC_SANDBOX: &str = "https://pub.sandbox.orcid.org/";
pub const ORCID_API_URL_MEMBER: &str = "https://api.orcid.org/";
pub const ORCID_API_URL_MEMBER_SANDBOX: &str = "https://api.sandbox.orcid.org/";
pub const ORCID_API_VERSION: &str = "v2.1";

/// Media type of registry record payloads.
pub const ORCID_CONTENT_TYPE: &str = "application/vnd.orcid+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Production,
    Sandbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiAccess {
    Public,
    Member,
}

/// One of the four configured API bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApiMode {
    pub environment: Environment,
    pub access: ApiAccess,
}

impl ApiMode {
    pub const PUBLIC: ApiMode = ApiMode::new(Environment::Production, ApiAccess::Public);
    pub const PUBLIC_SANDBOX: ApiMode = ApiMode::new(Environment::Sandbox, ApiAccess::Public);
    pub const MEMBER: ApiMode = ApiMode::new(Environment::Production, ApiAccess::Member);
    pub const MEMBER_SANDBOX: ApiMode = ApiMode::new(Environment::Sandbox, ApiAccess::Member);

    pub const fn new(environment: Environment, access: ApiAccess) -> Self {
        Self { environment, access }
    }

    pub fn api_url(&self) -> &'static str {
        match (self.environment, self.access) {
            (Environment::Production, ApiAccess::Public) => ORCID_API_URL_PUBLIC,
            (Environment::Sandbox, ApiAccess::Public) => ORCID_API_URL_PUBLIC_SANDBOX,
            (Environment::Production, ApiAccess::Member) => ORCID_API_URL_MEMBER,
            (Environment::Sandbox, ApiAccess::Member) => ORCID_API_URL_MEMBER_SANDBOX,
        }
    }

    /// Registry website: hosts the authorization pages and identifier URIs.
    pub fn site_url(&self) -> &'static str {
        match self.environment {
            Environment::Production => ORCID_URL,
            Environment::Sandbox => ORCID_URL_SANDBOX,
        }
    }

    pub fn is_member(&self) -> bool {
        self.access == ApiAccess::Member
    }

    pub fn is_sandbox(&self) -> bool {
        self.environment == Environment::Sandbox
    }

    /// Member journals ask for write access, public ones only authenticate.
    pub fn scope(&self) -> AccessScope {
        match self.access {
            ApiAccess::Member => AccessScope::Member,
            ApiAccess::Public => AccessScope::Public,
        }
    }
}

impl Default for ApiMode {
    fn default() -> Self {
        ApiMode::PUBLIC_SANDBOX
    }
}

impl fmt::Display for ApiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_url())
    }
}

impl FromStr for ApiMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = format!("{}/", s.trim().trim_end_matches('/'));
        [
            ApiMode::PUBLIC,
            ApiMode::PUBLIC_SANDBOX,
            ApiMode::MEMBER,
            ApiMode::MEMBER_SANDBOX,
        ]
        .into_iter()
        .find(|mode| mode.api_url() == normalized)
        .ok_or_else(|| anyhow::anyhow!("unknown ORCID API url: {}", s))
    }
}

impl Serialize for ApiMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.api_url())
    }
}

impl<'de> Deserialize<'de> for ApiMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Concrete base URLs used for requests. Normally derived from an
/// [`ApiMode`]; tests and proxied deployments point them elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEndpoints {
    pub api_base: Url,
    pub site_base: Url,
}

impl RegistryEndpoints {
    pub fn for_mode(mode: ApiMode) -> Self {
        Self {
            api_base: Url::parse(mode.api_url()).expect("static ORCID api url"),
            site_base: Url::parse(mode.site_url()).expect("static ORCID site url"),
        }
    }

    pub fn new(api_base: &str, site_base: &str) -> anyhow::Result<Self> {
        Ok(Self {
            api_base: Url::parse(&with_trailing_slash(api_base))?,
            site_base: Url::parse(&with_trailing_slash(site_base))?,
        })
    }

    pub fn work_url(&self, orcid: &str, put_code: Option<&str>) -> String {
        let mut url = format!("{}{}/{}/work", self.api_base, ORCID_API_VERSION, orcid);
        if let Some(code) = put_code {
            url.push('/');
            url.push_str(code);
        }
        url
    }

    pub fn email_url(&self, orcid: &str) -> String {
        format!("{}{}/{}/email", self.api_base, ORCID_API_VERSION, orcid)
    }

    pub fn token_url(&self) -> String {
        format!("{}oauth/token", self.site_base)
    }

    pub fn authorize_url(&self) -> String {
        format!("{}oauth/authorize", self.site_base)
    }
}

fn with_trailing_slash(raw: &str) -> String {
    format!("{}/", raw.trim_end_matches('/'))
}

/// Extract the put-code from a `Location` header: the last path segment of
/// `https://api.orcid.org/v2.1/0000-0002-1825-0097/work/445`.
pub fn put_code_from_location(location: &str) -> Option<String> {
    let path = match Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) => location.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trips_through_url() {
        assert_eq!("https://api.orcid.org/".parse::<ApiMode>().unwrap(), ApiMode::MEMBER);
        assert_eq!(
            "https://api.sandbox.orcid.org".parse::<ApiMode>().unwrap(),
            ApiMode::MEMBER_SANDBOX
        );
        assert!("https://example.org/".parse::<ApiMode>().is_err());
    }

    #[test]
    fn test_mode_derivations() {
        assert!(ApiMode::MEMBER_SANDBOX.is_member());
        assert!(ApiMode::MEMBER_SANDBOX.is_sandbox());
        assert_eq!(ApiMode::MEMBER_SANDBOX.site_url(), ORCID_URL_SANDBOX);
        assert_eq!(ApiMode::PUBLIC.scope(), AccessScope::Public);
        assert_eq!(ApiMode::MEMBER.scope(), AccessScope::Member);
    }

    #[test]
    fn test_work_urls() {
        let endpoints = RegistryEndpoints::for_mode(ApiMode::MEMBER);
        assert_eq!(
            endpoints.work_url("0000-0002-1825-0097", None),
            "https://api.orcid.org/v2.1/0000-0002-1825-0097/work"
        );
        assert_eq!(
            endpoints.work_url("0000-0002-1825-0097", Some("445")),
            "https://api.orcid.org/v2.1/0000-0002-1825-0097/work/445"
        );
        assert_eq!(endpoints.token_url(), "https://orcid.org/oauth/token");
    }

    #[test]
    fn test_put_code_from_location() {
        assert_eq!(
            put_code_from_location("https://api.orcid.org/v2.1/0000-0002-1825-0097/work/445"),
            Some("445".to_string())
        );
        assert_eq!(
            put_code_from_location("/v2.1/0000-0002-1825-0097/work/12/"),
            Some("12".to_string())
        );
        assert_eq!(put_code_from_location(""), None);
    }
}
