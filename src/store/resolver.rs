use async_trait::async_trait;
use url::Url;

use super::ContentResolver;
use crate::models::publication::{Contributor, Issue, Journal, PubIdType, Submission, REFERENCE_LOCALE};

/// Builds article links and citations from the journal's public base URL.
#[derive(Debug, Clone)]
pub struct PublicUrlResolver {
    base_url: String,
}

impl PublicUrlResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ContentResolver for PublicUrlResolver {
    async fn article_url(&self, submission: &Submission) -> anyhow::Result<String> {
        Ok(format!("{}/article/view/{}", self.base_url, submission.best_id))
    }

    async fn bibtex_citation(
        &self,
        submission: &Submission,
        journal: &Journal,
        issue: &Issue,
        contributors: &[Contributor],
    ) -> anyhow::Result<String> {
        let url = self.article_url(submission).await?;
        Ok(render_bibtex(submission, journal, issue, contributors, &url))
    }

    fn about_url(&self) -> String {
        format!("{}/orcidapi/about", self.base_url)
    }

    fn callback_url(&self, operation: &str, params: &[(&str, String)]) -> String {
        let raw = format!("{}/orcidapi/{}", self.base_url, operation);
        match Url::parse(&raw) {
            Ok(mut url) => {
                if !params.is_empty() {
                    let mut query = url.query_pairs_mut();
                    for (key, value) in params {
                        query.append_pair(key, value);
                    }
                }
                url.to_string()
            }
            Err(_) => raw,
        }
    }
}

/// Minimal BibTeX `@article` entry.
pub fn render_bibtex(
    submission: &Submission,
    journal: &Journal,
    issue: &Issue,
    contributors: &[Contributor],
    url: &str,
) -> String {
    let authors = contributors
        .iter()
        .map(|c| match (c.family_name.trim(), c.given_name.trim()) {
            ("", given) => given.to_string(),
            (family, "") => family.to_string(),
            (family, given) => format!("{}, {}", family, given),
        })
        .collect::<Vec<_>>()
        .join(" and ");
    let key = contributors
        .first()
        .map(|c| c.family_name.to_lowercase().replace(char::is_whitespace, ""))
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| "article".to_string());
    let year = issue
        .date_published
        .map(|d| d.year)
        .or(issue.year);

    let mut fields = vec![
        ("author", authors),
        ("title", submission.localized_title().to_string()),
        (
            "journal",
            journal.name.get(REFERENCE_LOCALE).unwrap_or_default().to_string(),
        ),
    ];
    if let Some(year) = year {
        fields.push(("year", year.to_string()));
    }
    fields.push(("url", url.to_string()));
    if let Some(doi) = submission.pub_ids.get(&PubIdType::Doi) {
        fields.push(("doi", doi.clone()));
    }

    let body = fields
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("\t{} = {{{}}}", k, v))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "@article{{{}{},\n{}\n}}",
        key,
        year.map(|y| y.to_string()).unwrap_or_default(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::publication::{ContributorRole, LocalizedText, PartialDate};
    use std::collections::BTreeMap;

    fn fixtures() -> (Submission, Journal, Issue, Vec<Contributor>) {
        let submission = Submission {
            id: 7,
            journal_id: 1,
            locale: "en_US".into(),
            title: LocalizedText::new().with("en_US", "On Sync"),
            subtitle: LocalizedText::new(),
            abstract_text: LocalizedText::new(),
            best_id: "on-sync".into(),
            pub_ids: BTreeMap::from([(PubIdType::Doi, "10.1/x".to_string())]),
        };
        let journal = Journal {
            id: 1,
            name: LocalizedText::new().with("en_US", "Journal of Tests"),
            online_issn: None,
            contact_name: None,
            contact_email: None,
        };
        let issue = Issue {
            id: 3,
            journal_id: 1,
            published: true,
            date_published: Some(PartialDate::year(2019)),
            year: None,
            pub_ids: BTreeMap::new(),
        };
        let author = Contributor {
            id: 1,
            submission_id: 7,
            given_name: "Ada".into(),
            family_name: "Lovelace".into(),
            email: "ada@example.org".into(),
            role: ContributorRole::Author,
            orcid: None,
        };
        (submission, journal, issue, vec![author])
    }

    #[tokio::test]
    async fn test_article_and_callback_urls() {
        let resolver = PublicUrlResolver::new("https://journal.example/");
        let (submission, ..) = fixtures();
        assert_eq!(
            resolver.article_url(&submission).await.unwrap(),
            "https://journal.example/article/view/on-sync"
        );
        assert_eq!(
            resolver.callback_url("verify", &[("token", "abc".into()), ("articleId", "7".into())]),
            "https://journal.example/orcidapi/verify?token=abc&articleId=7"
        );
    }

    #[test]
    fn test_bibtex_entry() {
        let (submission, journal, issue, authors) = fixtures();
        let bib = render_bibtex(&submission, &journal, &issue, &authors, "https://j/1");
        assert!(bib.starts_with("@article{lovelace2019,"));
        assert!(bib.contains("author = {Lovelace, Ada}"));
        assert!(bib.contains("doi = {10.1/x}"));
        assert!(bib.ends_with('}'));
    }
}
