//! Host-side publication data as the core sees it.
//!
//! These records are owned and stored by the hosting application and are
//! only read here (see [`crate::store::PublicationSource`]).

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub type JournalId = i64;
pub type IssueId = i64;
pub type SubmissionId = i64;
pub type ContributorId = i64;

/// Locale used for journal titles, abstracts and translated titles.
pub const REFERENCE_LOCALE: &str = "en_US";

/// Locale keyed text (`en_US` → "Title").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(pub BTreeMap<String, String>);

impl LocalizedText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, locale: &str, value: &str) -> Self {
        self.0.insert(locale.to_string(), value.to_string());
        self
    }

    pub fn get(&self, locale: &str) -> Option<&str> {
        self.0
            .get(locale)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// Persistent identifier schemes the host can mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PubIdType {
    Doi,
    Urn,
}

impl PubIdType {
    /// Key the host uses for the scheme.
    pub fn host_key(&self) -> &'static str {
        match self {
            PubIdType::Doi => "doi",
            PubIdType::Urn => "other::urn",
        }
    }

    pub fn from_host_key(key: &str) -> Option<Self> {
        match key {
            "doi" => Some(PubIdType::Doi),
            "other::urn" => Some(PubIdType::Urn),
            _ => None,
        }
    }

    /// Registry external-id type.
    pub fn registry_type(&self) -> &'static str {
        match self {
            PubIdType::Doi => "doi",
            PubIdType::Urn => "urn",
        }
    }
}

/// An identifier scheme enabled for a journal, with the prefix its ids
/// resolve under (`https://doi.org/`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubIdScheme {
    pub kind: PubIdType,
    pub resolver_prefix: String,
}

impl PubIdScheme {
    pub fn doi() -> Self {
        Self {
            kind: PubIdType::Doi,
            resolver_prefix: "https://doi.org/".into(),
        }
    }

    pub fn urn(resolver_prefix: &str) -> Self {
        Self {
            kind: PubIdType::Urn,
            resolver_prefix: resolver_prefix.to_string(),
        }
    }

    pub fn resolving_url(&self, pub_id: &str) -> String {
        format!("{}{}", self.resolver_prefix, pub_id)
    }
}

/// A date with year precision and optional month/day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDate {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl PartialDate {
    pub fn year(year: i32) -> Self {
        Self { year, month: None, day: None }
    }
}

impl From<NaiveDate> for PartialDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: Some(date.month()),
            day: Some(date.day()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub id: JournalId,
    pub name: LocalizedText,
    pub online_issn: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub journal_id: JournalId,
    pub published: bool,
    pub date_published: Option<PartialDate>,
    pub year: Option<i32>,
    #[serde(default)]
    pub pub_ids: BTreeMap<PubIdType, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub journal_id: JournalId,
    /// Primary locale of the submission (`de_DE`).
    pub locale: String,
    pub title: LocalizedText,
    #[serde(default)]
    pub subtitle: LocalizedText,
    #[serde(default)]
    pub abstract_text: LocalizedText,
    /// Public path segment of the article (url path or numeric id).
    pub best_id: String,
    #[serde(default)]
    pub pub_ids: BTreeMap<PubIdType, String>,
}

impl Submission {
    pub fn localized_title(&self) -> &str {
        self.title
            .get(&self.locale)
            .or_else(|| self.title.get(REFERENCE_LOCALE))
            .unwrap_or_default()
    }
}

/// A submission that has been assigned to an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedArticle {
    pub submission: Submission,
    pub issue_id: Option<IssueId>,
}

/// Contributor role, from the user group the author was added under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorRole {
    Author,
    Translator,
    Other(String),
}

impl ContributorRole {
    pub fn from_group_name(name: &str) -> Self {
        match name {
            "Author" => ContributorRole::Author,
            "Translator" => ContributorRole::Translator,
            other => ContributorRole::Other(other.to_string()),
        }
    }
}

/// A submission author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub id: ContributorId,
    pub submission_id: SubmissionId,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub role: ContributorRole,
    /// Registry identifier in URI form, as entered by the contributor.
    pub orcid: Option<String>,
}

impl Contributor {
    pub fn full_name(&self) -> String {
        match (self.given_name.trim(), self.family_name.trim()) {
            (g, "") => g.to_string(),
            ("", f) => f.to_string(),
            (g, f) => format!("{} {}", g, f),
        }
    }

    pub fn registry_identifier(&self) -> Option<RegistryIdentifier> {
        self.orcid.as_deref().and_then(RegistryIdentifier::parse)
    }
}

/// A contributor's public registry identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryIdentifier {
    /// As stored (`https://orcid.org/0000-0002-1825-0097`).
    pub uri: String,
    /// Bare identifier (`0000-0002-1825-0097`).
    pub id: String,
}

impl RegistryIdentifier {
    /// Accepts the URI form or a bare identifier. The id is the last path
    /// segment of the URI.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let path = match url::Url::parse(raw) {
            Ok(url) => url.path().to_string(),
            Err(_) => raw.to_string(),
        };
        let id = path.trim_end_matches('/').rsplit('/').next()?.trim();
        if id.is_empty() {
            return None;
        }
        Some(Self {
            uri: raw.to_string(),
            id: id.to_string(),
        })
    }
}

/// The user who submitted a manuscript, with the credential they hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submitter {
    pub orcid: Option<String>,
    #[serde(default)]
    pub credential: super::credential::ContributorCredential,
}
