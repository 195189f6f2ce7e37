//! ORCID v2.1 work record, as sent to `/{orcid}/work`.
//!
//! Field names follow the registry's kebab-case JSON; optional parts are
//! omitted rather than sent as `null`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value<T = String> {
    pub value: T,
}

impl<T> Value<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put_code: Option<String>,
    pub title: WorkTitle,
    pub journal_title: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(rename = "type")]
    pub work_type: WorkType,
    pub external_ids: ExternalIds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<PublicationDate>,
    pub url: Value,
    pub citation: Citation,
    pub language_code: String,
    pub contributors: Contributors,
}

impl WorkRecord {
    /// Copy of the record addressed at an existing registry entry (or at
    /// none, for a create).
    pub fn with_put_code(&self, put_code: Option<&str>) -> Self {
        let mut record = self.clone();
        record.put_code = put_code.map(str::to_string);
        record
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkType {
    JournalArticle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkTitle {
    pub title: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_title: Option<TranslatedTitle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TranslatedTitle {
    pub value: String,
    pub language_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    #[serde(rename = "external-id")]
    pub external_id: Vec<ExternalId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relationship {
    #[serde(rename = "SELF")]
    SelfId,
    PartOf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExternalId {
    pub external_id_type: String,
    pub external_id_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id_url: Option<Value>,
    pub external_id_relationship: Relationship,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationDate {
    pub year: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Citation {
    pub citation_type: CitationType,
    pub citation_value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CitationType {
    Bibtex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributors {
    pub contributor: Vec<WorkContributor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkContributor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributor_orcid: Option<ContributorOrcid>,
    pub credit_name: Value,
    pub contributor_attributes: ContributorAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorOrcid {
    pub uri: String,
    pub path: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContributorAttributes {
    pub contributor_sequence: Sequence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributor_role: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sequence {
    First,
    Additional,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_wire_values() {
        assert_eq!(serde_json::to_value(Relationship::SelfId).unwrap(), "SELF");
        assert_eq!(serde_json::to_value(Relationship::PartOf).unwrap(), "PART_OF");
        assert_eq!(serde_json::to_value(WorkType::JournalArticle).unwrap(), "JOURNAL_ARTICLE");
        assert_eq!(serde_json::to_value(Sequence::Additional).unwrap(), "ADDITIONAL");
    }

    #[test]
    fn test_external_id_omits_missing_url() {
        let id = ExternalId {
            external_id_type: "issn".into(),
            external_id_value: "1234-5678".into(),
            external_id_url: None,
            external_id_relationship: Relationship::PartOf,
        };
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["external-id-type"], "issn");
        assert_eq!(json["external-id-relationship"], "PART_OF");
        assert!(json.get("external-id-url").is_none());
    }
}
