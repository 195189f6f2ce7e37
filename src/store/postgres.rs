use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use super::{CredentialRepository, PublicationSource};
use crate::config::JournalSettings;
use crate::models::credential::{AccessScope, ContributorCredential};
use crate::models::publication::{
    Contributor, ContributorId, ContributorRole, Issue, IssueId, Journal, JournalId,
    LocalizedText, PartialDate, PubIdScheme, PubIdType, PublishedArticle, Submission,
    SubmissionId,
};
use crate::vault::TokenCipher;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    cipher: Arc<TokenCipher>,
}

impl PgStore {
    pub async fn connect(database_url: &str, master_key: &str) -> anyhow::Result<Self> {
        let cipher = Arc::new(TokenCipher::new(master_key)?);
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool, cipher })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn credential_from_row(&self, row: CredentialRow) -> anyhow::Result<ContributorCredential> {
        Ok(ContributorCredential {
            access_token: self.cipher.open_opt(row.access_token.as_deref())?,
            refresh_token: self.cipher.open_opt(row.refresh_token.as_deref())?,
            scope: row.scope.as_deref().and_then(parse_scope),
            expires_at: row.expires_at,
            access_denied: row.access_denied,
            sandbox: row.sandbox,
            work_put_code: row.work_put_code,
            email_token: row.email_token,
        })
    }
}

fn parse_scope(raw: &str) -> Option<AccessScope> {
    match raw {
        "member" => Some(AccessScope::Member),
        "public" => Some(AccessScope::Public),
        _ => None,
    }
}

fn scope_column(scope: Option<AccessScope>) -> Option<&'static str> {
    scope.map(|s| match s {
        AccessScope::Member => "member",
        AccessScope::Public => "public",
    })
}

fn pub_ids_from_json(raw: BTreeMap<String, String>) -> BTreeMap<PubIdType, String> {
    raw.into_iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .filter_map(|(k, v)| PubIdType::from_host_key(&k).map(|t| (t, v)))
        .collect()
}

// -- Rows --

#[derive(sqlx::FromRow)]
struct JournalRow {
    id: i64,
    name: Json<LocalizedText>,
    online_issn: Option<String>,
    contact_name: Option<String>,
    contact_email: Option<String>,
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    api_url: String,
    client_id: String,
    client_secret: String,
    log_level: String,
    send_mail_on_publication: bool,
}

#[derive(sqlx::FromRow)]
struct SchemeRow {
    pub_id_type: String,
    resolver_prefix: String,
}

#[derive(sqlx::FromRow)]
struct IssueRow {
    id: i64,
    journal_id: i64,
    published: bool,
    date_published: Option<NaiveDate>,
    year: Option<i32>,
    pub_ids: Json<BTreeMap<String, String>>,
}

impl From<IssueRow> for Issue {
    fn from(row: IssueRow) -> Self {
        Issue {
            id: row.id,
            journal_id: row.journal_id,
            published: row.published,
            date_published: row.date_published.map(PartialDate::from),
            year: row.year,
            pub_ids: pub_ids_from_json(row.pub_ids.0),
        }
    }
}

#[derive(sqlx::FromRow)]
struct PublishedSubmissionRow {
    id: i64,
    journal_id: i64,
    locale: String,
    title: Json<LocalizedText>,
    subtitle: Json<LocalizedText>,
    abstract_text: Json<LocalizedText>,
    best_id: String,
    pub_ids: Json<BTreeMap<String, String>>,
    issue_id: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: i64,
    journal_id: i64,
    locale: String,
    title: Json<LocalizedText>,
    subtitle: Json<LocalizedText>,
    abstract_text: Json<LocalizedText>,
    best_id: String,
    pub_ids: Json<BTreeMap<String, String>>,
}

impl From<SubmissionRow> for Submission {
    fn from(r: SubmissionRow) -> Self {
        Submission {
            id: r.id,
            journal_id: r.journal_id,
            locale: r.locale,
            title: r.title.0,
            subtitle: r.subtitle.0,
            abstract_text: r.abstract_text.0,
            best_id: r.best_id,
            pub_ids: pub_ids_from_json(r.pub_ids.0),
        }
    }
}

#[derive(sqlx::FromRow)]
struct AuthorRow {
    id: i64,
    submission_id: i64,
    given_name: String,
    family_name: String,
    email: String,
    user_group: String,
    orcid: Option<String>,
}

impl From<AuthorRow> for Contributor {
    fn from(row: AuthorRow) -> Self {
        Contributor {
            id: row.id,
            submission_id: row.submission_id,
            given_name: row.given_name,
            family_name: row.family_name,
            email: row.email,
            role: ContributorRole::from_group_name(&row.user_group),
            orcid: row.orcid.filter(|o| !o.trim().is_empty()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    access_token: Option<String>,
    refresh_token: Option<String>,
    scope: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    access_denied: bool,
    sandbox: bool,
    work_put_code: Option<String>,
    email_token: Option<String>,
}

const AUTHOR_COLUMNS: &str =
    "id, submission_id, given_name, family_name, email, user_group, orcid";

#[async_trait]
impl PublicationSource for PgStore {
    async fn published_article(
        &self,
        submission_id: SubmissionId,
    ) -> anyhow::Result<Option<PublishedArticle>> {
        let row = sqlx::query_as::<_, PublishedSubmissionRow>(
            r#"SELECT s.id, s.journal_id, s.locale, s.title, s.subtitle, s.abstract AS abstract_text,
                      s.best_id, s.pub_ids, ps.issue_id
               FROM published_submissions ps
               JOIN submissions s ON s.id = ps.submission_id
               WHERE ps.submission_id = $1"#,
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| PublishedArticle {
            submission: Submission {
                id: r.id,
                journal_id: r.journal_id,
                locale: r.locale,
                title: r.title.0,
                subtitle: r.subtitle.0,
                abstract_text: r.abstract_text.0,
                best_id: r.best_id,
                pub_ids: pub_ids_from_json(r.pub_ids.0),
            },
            issue_id: r.issue_id,
        }))
    }

    async fn submission(&self, submission_id: SubmissionId) -> anyhow::Result<Option<Submission>> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"SELECT id, journal_id, locale, title, subtitle, abstract AS abstract_text, best_id, pub_ids
               FROM submissions WHERE id = $1"#,
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Submission::from))
    }

    async fn issue(&self, issue_id: IssueId) -> anyhow::Result<Option<Issue>> {
        let row = sqlx::query_as::<_, IssueRow>(
            "SELECT id, journal_id, published, date_published, year, pub_ids FROM issues WHERE id = $1",
        )
        .bind(issue_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Issue::from))
    }

    async fn journal(&self, journal_id: JournalId) -> anyhow::Result<Option<Journal>> {
        let row = sqlx::query_as::<_, JournalRow>(
            "SELECT id, name, online_issn, contact_name, contact_email FROM journals WHERE id = $1",
        )
        .bind(journal_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Journal {
            id: r.id,
            name: r.name.0,
            online_issn: r.online_issn.filter(|v| !v.trim().is_empty()),
            contact_name: r.contact_name,
            contact_email: r.contact_email,
        }))
    }

    async fn contributors(&self, submission_id: SubmissionId) -> anyhow::Result<Vec<Contributor>> {
        let rows = sqlx::query_as::<_, AuthorRow>(&format!(
            "SELECT {} FROM authors WHERE submission_id = $1 ORDER BY seq ASC, id ASC",
            AUTHOR_COLUMNS
        ))
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Contributor::from).collect())
    }

    async fn contributor(
        &self,
        contributor_id: ContributorId,
    ) -> anyhow::Result<Option<Contributor>> {
        let row = sqlx::query_as::<_, AuthorRow>(&format!(
            "SELECT {} FROM authors WHERE id = $1",
            AUTHOR_COLUMNS
        ))
        .bind(contributor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Contributor::from))
    }

    async fn published_submission_ids(
        &self,
        issue_id: IssueId,
    ) -> anyhow::Result<Vec<SubmissionId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT submission_id FROM published_submissions WHERE issue_id = $1 ORDER BY seq ASC, submission_id ASC",
        )
        .bind(issue_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn pub_id_schemes(&self, journal_id: JournalId) -> anyhow::Result<Vec<PubIdScheme>> {
        let rows = sqlx::query_as::<_, SchemeRow>(
            "SELECT pub_id_type, resolver_prefix FROM journal_pub_id_schemes WHERE journal_id = $1 AND enabled = true ORDER BY pub_id_type",
        )
        .bind(journal_id)
        .fetch_all(&self.pool)
        .await?;

        let mut schemes = Vec::new();
        for row in rows {
            match PubIdType::from_host_key(&row.pub_id_type) {
                Some(kind) => schemes.push(PubIdScheme {
                    kind,
                    resolver_prefix: row.resolver_prefix,
                }),
                None => {
                    tracing::warn!(journal_id, pub_id_type = %row.pub_id_type, "ignoring unsupported pub-id scheme");
                }
            }
        }
        Ok(schemes)
    }

    async fn journal_settings(
        &self,
        journal_id: JournalId,
    ) -> anyhow::Result<Option<JournalSettings>> {
        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT api_url, client_id, client_secret, log_level, send_mail_on_publication FROM journal_orcid_settings WHERE journal_id = $1",
        )
        .bind(journal_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(JournalSettings {
                api_mode: r.api_url.parse()?,
                client_id: r.client_id,
                client_secret: r.client_secret,
                log_level: r.log_level.parse().unwrap_or_default(),
                send_mail_on_publication: r.send_mail_on_publication,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CredentialRepository for PgStore {
    async fn load(
        &self,
        contributor_id: ContributorId,
    ) -> anyhow::Result<Option<ContributorCredential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"SELECT access_token, refresh_token, scope, expires_at, access_denied, sandbox,
                      work_put_code, email_token
               FROM contributor_credentials WHERE contributor_id = $1"#,
        )
        .bind(contributor_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| self.credential_from_row(r)).transpose()
    }

    async fn save(
        &self,
        contributor_id: ContributorId,
        credential: &ContributorCredential,
    ) -> anyhow::Result<()> {
        let access_token = self.cipher.seal_opt(credential.access_token.as_deref())?;
        let refresh_token = self.cipher.seal_opt(credential.refresh_token.as_deref())?;

        sqlx::query(
            r#"INSERT INTO contributor_credentials
                   (contributor_id, access_token, refresh_token, scope, expires_at,
                    access_denied, sandbox, work_put_code, email_token, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
               ON CONFLICT (contributor_id) DO UPDATE SET
                   access_token = EXCLUDED.access_token,
                   refresh_token = EXCLUDED.refresh_token,
                   scope = EXCLUDED.scope,
                   expires_at = EXCLUDED.expires_at,
                   access_denied = EXCLUDED.access_denied,
                   sandbox = EXCLUDED.sandbox,
                   work_put_code = EXCLUDED.work_put_code,
                   email_token = EXCLUDED.email_token,
                   updated_at = NOW()"#,
        )
        .bind(contributor_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(scope_column(credential.scope))
        .bind(credential.expires_at)
        .bind(credential.access_denied)
        .bind(credential.sandbox)
        .bind(&credential.work_put_code)
        .bind(&credential.email_token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_email_token(&self, token: &str) -> anyhow::Result<Option<ContributorId>> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT contributor_id FROM contributor_credentials WHERE email_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }
}
