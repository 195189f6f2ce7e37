//! Work Record Builder: publication metadata → ORCID work JSON.
//!
//! Pure. Everything that needs a collaborator (article URL, citation,
//! enabled identifier schemes, which contributors hold sandbox credentials)
//! arrives pre-resolved in [`WorkInputs`].

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::publication::{
    Contributor, ContributorId, ContributorRole, Issue, Journal, PubIdScheme, Submission,
    REFERENCE_LOCALE,
};
use crate::models::work::{
    Citation, CitationType, ContributorAttributes, ContributorOrcid, Contributors, ExternalId,
    ExternalIds, PublicationDate, Relationship, Sequence, TranslatedTitle, Value,
    WorkContributor, WorkRecord, WorkTitle, WorkType,
};
use crate::registry::{ORCID_URL, ORCID_URL_SANDBOX};

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

#[derive(Debug, Clone, Default)]
pub struct WorkInputs {
    /// Canonical public URL of the article.
    pub article_url: String,
    /// BibTeX citation, possibly with markup.
    pub bibtex_citation: String,
    /// Identifier schemes enabled for the journal, in host order.
    pub pub_id_schemes: Vec<PubIdScheme>,
    /// Contributors whose credential belongs to the sandbox environment.
    pub sandbox_contributors: HashSet<ContributorId>,
}

pub fn strip_html(raw: &str) -> String {
    HTML_TAG.replace_all(raw, "").trim().to_string()
}

pub fn build_work_record(
    submission: &Submission,
    journal: &Journal,
    issue: &Issue,
    contributors: &[Contributor],
    inputs: &WorkInputs,
) -> WorkRecord {
    let locale = submission.locale.as_str();

    let translated_title = if locale != REFERENCE_LOCALE {
        submission
            .title
            .get(REFERENCE_LOCALE)
            .map(|title| TranslatedTitle {
                value: title.to_string(),
                language_code: language_code(REFERENCE_LOCALE),
            })
    } else {
        None
    };

    let title = WorkTitle {
        title: Value::new(submission.localized_title().to_string()),
        subtitle: submission
            .subtitle
            .get(locale)
            .map(|s| Value::new(s.to_string())),
        translated_title,
    };

    let journal_title = journal
        .name
        .get(REFERENCE_LOCALE)
        .or_else(|| journal.name.0.values().find(|v| !v.trim().is_empty()).map(String::as_str))
        .unwrap_or_default()
        .to_string();

    let short_description = submission
        .abstract_text
        .get(REFERENCE_LOCALE)
        .or_else(|| submission.abstract_text.get(locale))
        .map(strip_html)
        .filter(|s| !s.is_empty());

    WorkRecord {
        put_code: None,
        title,
        journal_title: Value::new(journal_title),
        short_description,
        work_type: WorkType::JournalArticle,
        external_ids: ExternalIds {
            external_id: external_ids(submission, journal, issue, inputs),
        },
        publication_date: publication_date(issue),
        url: Value::new(inputs.article_url.clone()),
        citation: Citation {
            citation_type: CitationType::Bibtex,
            citation_value: strip_html(&inputs.bibtex_citation),
        },
        language_code: language_code(locale),
        contributors: Contributors {
            contributor: work_contributors(contributors, &inputs.sandbox_contributors),
        },
    }
}

fn language_code(locale: &str) -> String {
    locale.chars().take(2).collect()
}

fn external_ids(
    submission: &Submission,
    journal: &Journal,
    issue: &Issue,
    inputs: &WorkInputs,
) -> Vec<ExternalId> {
    let mut ids = Vec::new();
    let mut has_own_id = false;

    for scheme in &inputs.pub_id_schemes {
        if let Some(pub_id) = submission.pub_ids.get(&scheme.kind) {
            ids.push(ExternalId {
                external_id_type: scheme.kind.registry_type().to_string(),
                external_id_value: pub_id.clone(),
                external_id_url: Some(Value::new(scheme.resolving_url(pub_id))),
                external_id_relationship: Relationship::SelfId,
            });
            has_own_id = true;
        }
        if let Some(pub_id) = issue.pub_ids.get(&scheme.kind) {
            ids.push(ExternalId {
                external_id_type: scheme.kind.registry_type().to_string(),
                external_id_value: pub_id.clone(),
                external_id_url: Some(Value::new(scheme.resolving_url(pub_id))),
                external_id_relationship: Relationship::PartOf,
            });
        }
    }

    // the registry requires at least one SELF identifier
    if !has_own_id {
        ids.push(ExternalId {
            external_id_type: "uri".into(),
            external_id_value: inputs.article_url.clone(),
            external_id_url: None,
            external_id_relationship: Relationship::SelfId,
        });
    }

    if let Some(issn) = journal.online_issn.as_deref().filter(|v| !v.trim().is_empty()) {
        ids.push(ExternalId {
            external_id_type: "issn".into(),
            external_id_value: issn.to_string(),
            external_id_url: None,
            external_id_relationship: Relationship::PartOf,
        });
    }

    ids
}

fn publication_date(issue: &Issue) -> Option<PublicationDate> {
    match issue.date_published {
        Some(date) => {
            let (month, day) = match (date.month, date.day) {
                (Some(m), Some(d)) => (
                    Some(Value::new(format!("{:02}", m))),
                    Some(Value::new(format!("{:02}", d))),
                ),
                (Some(m), None) => (Some(Value::new(format!("{:02}", m))), None),
                _ => (None, None),
            };
            Some(PublicationDate {
                year: Value::new(date.year.to_string()),
                month,
                day,
            })
        }
        None => issue.year.map(|year| PublicationDate {
            year: Value::new(year.to_string()),
            month: None,
            day: None,
        }),
    }
}

fn registry_role(role: &ContributorRole) -> Option<&'static str> {
    match role {
        ContributorRole::Author => Some("AUTHOR"),
        ContributorRole::Translator => Some("CHAIR_OR_TRANSLATOR"),
        ContributorRole::Other(_) => None,
    }
}

fn work_contributors(
    contributors: &[Contributor],
    sandbox: &HashSet<ContributorId>,
) -> Vec<WorkContributor> {
    contributors
        .iter()
        .enumerate()
        .map(|(i, contributor)| {
            let contributor_orcid = contributor.registry_identifier().map(|ident| {
                if sandbox.contains(&contributor.id) {
                    ContributorOrcid {
                        uri: format!("{}{}", ORCID_URL_SANDBOX, ident.id),
                        path: ident.id,
                        host: host_of(ORCID_URL_SANDBOX),
                    }
                } else {
                    ContributorOrcid {
                        uri: ident.uri,
                        path: ident.id,
                        host: host_of(ORCID_URL),
                    }
                }
            });
            WorkContributor {
                contributor_orcid,
                credit_name: Value::new(contributor.full_name()),
                contributor_attributes: ContributorAttributes {
                    contributor_sequence: if i == 0 {
                        Sequence::First
                    } else {
                        Sequence::Additional
                    },
                    contributor_role: registry_role(&contributor.role).map(String::from),
                },
            }
        })
        .collect()
}

fn host_of(site_url: &str) -> String {
    site_url
        .trim_start_matches("https://")
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::publication::{LocalizedText, PartialDate, PubIdType};
    use std::collections::BTreeMap;

    fn submission(locale: &str) -> Submission {
        Submission {
            id: 7,
            journal_id: 1,
            locale: locale.into(),
            title: LocalizedText::new()
                .with("en_US", "Synchronizing Records")
                .with("de_DE", "Synchronisierung"),
            subtitle: LocalizedText::new(),
            abstract_text: LocalizedText::new().with("en_US", "<p>An <b>abstract</b>.</p> "),
            best_id: "sync".into(),
            pub_ids: BTreeMap::new(),
        }
    }

    fn journal(issn: Option<&str>) -> Journal {
        Journal {
            id: 1,
            name: LocalizedText::new().with("en_US", "Journal of Tests"),
            online_issn: issn.map(String::from),
            contact_name: None,
            contact_email: None,
        }
    }

    fn issue() -> Issue {
        Issue {
            id: 3,
            journal_id: 1,
            published: true,
            date_published: Some(PartialDate {
                year: 2019,
                month: Some(3),
                day: Some(7),
            }),
            year: Some(2019),
            pub_ids: BTreeMap::new(),
        }
    }

    fn author(id: i64, orcid: Option<&str>, role: ContributorRole) -> Contributor {
        Contributor {
            id,
            submission_id: 7,
            given_name: "Given".into(),
            family_name: format!("Family{}", id),
            email: format!("a{}@example.org", id),
            role,
            orcid: orcid.map(String::from),
        }
    }

    fn inputs() -> WorkInputs {
        WorkInputs {
            article_url: "https://journal.example/article/view/sync".into(),
            bibtex_citation: "<div>@article{x}</div>\n".into(),
            pub_id_schemes: vec![PubIdScheme::doi()],
            sandbox_contributors: HashSet::new(),
        }
    }

    #[test]
    fn test_doi_issn_and_contributor_sequence() {
        let mut sub = submission("en_US");
        sub.pub_ids.insert(PubIdType::Doi, "10.1/x".into());
        let authors = vec![
            author(1, None, ContributorRole::Author),
            author(
                2,
                Some("https://orcid.org/0000-0002-1825-0097"),
                ContributorRole::Author,
            ),
        ];

        let work = build_work_record(&sub, &journal(Some("1234-5678")), &issue(), &authors, &inputs());

        let ids = &work.external_ids.external_id;
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].external_id_type, "doi");
        assert_eq!(ids[0].external_id_value, "10.1/x");
        assert_eq!(ids[0].external_id_relationship, Relationship::SelfId);
        assert_eq!(
            ids[0].external_id_url.as_ref().map(|v| v.value.as_str()),
            Some("https://doi.org/10.1/x")
        );
        assert_eq!(ids[1].external_id_type, "issn");
        assert_eq!(ids[1].external_id_value, "1234-5678");
        assert_eq!(ids[1].external_id_relationship, Relationship::PartOf);

        let people = &work.contributors.contributor;
        assert_eq!(people[0].contributor_attributes.contributor_sequence, Sequence::First);
        assert!(people[0].contributor_orcid.is_none());
        assert_eq!(people[1].contributor_attributes.contributor_sequence, Sequence::Additional);
        let orcid = people[1].contributor_orcid.as_ref().unwrap();
        assert_eq!(orcid.host, "orcid.org");
        assert_eq!(orcid.path, "0000-0002-1825-0097");
        assert_eq!(orcid.uri, "https://orcid.org/0000-0002-1825-0097");
    }

    #[test]
    fn test_uri_fallback_without_stored_ids() {
        let mut inp = inputs();
        inp.pub_id_schemes.clear();
        let work = build_work_record(&submission("en_US"), &journal(None), &issue(), &[], &inp);
        let ids = &work.external_ids.external_id;
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].external_id_type, "uri");
        assert_eq!(ids[0].external_id_value, inp.article_url);
        assert_eq!(ids[0].external_id_relationship, Relationship::SelfId);
    }

    #[test]
    fn test_issue_doi_is_part_of() {
        let mut iss = issue();
        iss.pub_ids.insert(PubIdType::Doi, "10.1/issue".into());
        let work = build_work_record(&submission("en_US"), &journal(None), &iss, &[], &inputs());
        let ids = &work.external_ids.external_id;
        // issue id plus the uri fallback, since the article has no DOI
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].external_id_relationship, Relationship::PartOf);
        assert_eq!(ids[0].external_id_value, "10.1/issue");
        assert_eq!(ids[1].external_id_type, "uri");
    }

    #[test]
    fn test_translated_title_only_for_other_locales() {
        let en = build_work_record(&submission("en_US"), &journal(None), &issue(), &[], &inputs());
        assert!(en.title.translated_title.is_none());
        assert_eq!(en.language_code, "en");

        let de = build_work_record(&submission("de_DE"), &journal(None), &issue(), &[], &inputs());
        assert_eq!(de.title.title.value, "Synchronisierung");
        let translated = de.title.translated_title.unwrap();
        assert_eq!(translated.value, "Synchronizing Records");
        assert_eq!(translated.language_code, "en");
        assert_eq!(de.language_code, "de");
    }

    #[test]
    fn test_roles_and_sandbox_host() {
        let authors = vec![
            author(1, Some("https://sandbox.orcid.org/0000-0001-5109-3700"), ContributorRole::Translator),
            author(2, None, ContributorRole::Other("Volume editor".into())),
        ];
        let mut inp = inputs();
        inp.sandbox_contributors.insert(1);
        let work = build_work_record(&submission("en_US"), &journal(None), &issue(), &authors, &inp);
        let people = &work.contributors.contributor;
        assert_eq!(
            people[0].contributor_attributes.contributor_role.as_deref(),
            Some("CHAIR_OR_TRANSLATOR")
        );
        assert_eq!(people[0].contributor_orcid.as_ref().unwrap().host, "sandbox.orcid.org");
        assert!(people[1].contributor_attributes.contributor_role.is_none());
    }

    #[test]
    fn test_date_citation_and_abstract() {
        let work = build_work_record(&submission("en_US"), &journal(None), &issue(), &[], &inputs());
        let date = work.publication_date.unwrap();
        assert_eq!(date.year.value, "2019");
        assert_eq!(date.month.unwrap().value, "03");
        assert_eq!(date.day.unwrap().value, "07");
        assert_eq!(work.citation.citation_value, "@article{x}");
        assert_eq!(work.short_description.as_deref(), Some("An abstract."));
    }

    #[test]
    fn test_year_only_issue() {
        let mut iss = issue();
        iss.date_published = None;
        iss.year = Some(2018);
        let work = build_work_record(&submission("en_US"), &journal(None), &iss, &[], &inputs());
        let json = serde_json::to_value(&work).unwrap();
        assert_eq!(json["publication-date"]["year"]["value"], "2018");
        assert!(json["publication-date"].get("month").is_none());
        assert!(json.get("put-code").is_none());
        assert_eq!(json["type"], "JOURNAL_ARTICLE");
    }
}
