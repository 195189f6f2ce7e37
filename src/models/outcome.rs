use serde::Serialize;

use super::publication::ContributorId;

/// Why a sync did nothing. None of these are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No published article exists for the submission.
    NotPublished,
    /// The article's issue is unset or not yet published.
    IssueNotPublished,
    /// The journal uses the read-only public API.
    PublicApiMode,
    /// No contributor has both an identifier and a usable credential.
    NoEligibleContributors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SendMethod {
    Post,
    Put,
}

impl SendMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            SendMethod::Post => reqwest::Method::POST,
            SendMethod::Put => reqwest::Method::PUT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SendMethod::Post => "POST",
            SendMethod::Put => "PUT",
        }
    }
}

/// Result of one contributor's exchange with the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributorOutcome {
    pub contributor_id: ContributorId,
    pub orcid: String,
    pub method: SendMethod,
    pub status: u16,
    pub success: bool,
    /// Put-code assigned by the registry on create.
    pub new_put_code: Option<String>,
    /// The registry rejected the token; the credential was cleared.
    pub credential_revoked: bool,
    /// The stored put-code pointed at a deleted record and was cleared.
    pub put_code_cleared: bool,
}

/// Aggregated per-contributor results of one sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub contributors: Vec<ContributorOutcome>,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.contributors.iter().all(|c| c.success)
    }

    /// Contributors that still need attention.
    pub fn failed(&self) -> impl Iterator<Item = &ContributorOutcome> {
        self.contributors.iter().filter(|c| !c.success)
    }

    pub fn get(&self, contributor_id: ContributorId) -> Option<&ContributorOutcome> {
        self.contributors
            .iter()
            .find(|c| c.contributor_id == contributor_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncReport {
    Skipped { reason: SkipReason },
    Completed(SyncOutcome),
}

impl SyncReport {
    pub fn skipped(reason: SkipReason) -> Self {
        SyncReport::Skipped { reason }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            SyncReport::Skipped { reason } => Some(*reason),
            SyncReport::Completed(_) => None,
        }
    }

    pub fn outcome(&self) -> Option<&SyncOutcome> {
        match self {
            SyncReport::Completed(outcome) => Some(outcome),
            SyncReport::Skipped { .. } => None,
        }
    }

    /// Label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            SyncReport::Skipped { .. } => "skipped",
            SyncReport::Completed(o) if o.is_success() => "success",
            SyncReport::Completed(_) => "partial_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: ContributorId, success: bool) -> ContributorOutcome {
        ContributorOutcome {
            contributor_id: id,
            orcid: "0000-0002-1825-0097".into(),
            method: SendMethod::Post,
            status: if success { 201 } else { 409 },
            success,
            new_put_code: None,
            credential_revoked: false,
            put_code_cleared: false,
        }
    }

    #[test]
    fn test_success_requires_every_contributor() {
        let all = SyncOutcome { contributors: vec![outcome(1, true), outcome(2, true)] };
        assert!(all.is_success());

        let partial = SyncOutcome { contributors: vec![outcome(1, true), outcome(2, false)] };
        assert!(!partial.is_success());
        assert_eq!(partial.failed().map(|c| c.contributor_id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(SyncReport::Completed(partial).label(), "partial_failure");
    }

    #[test]
    fn test_report_serializes_tagged() {
        let json = serde_json::to_value(SyncReport::skipped(SkipReason::PublicApiMode)).unwrap();
        assert_eq!(json["result"], "skipped");
        assert_eq!(json["reason"], "public_api_mode");
    }
}
