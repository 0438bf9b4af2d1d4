use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const JOB_VIEW_URL: &str = "https://www.linkedin.com/jobs/view";

pub fn description_url(job_id: &str) -> String {
    format!("{}/{}/", JOB_VIEW_URL, job_id)
}

/// One listing summary as scraped from the results page.
/// `id` is `None` when the card carried no job id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    pub id: Option<String>,
    pub raw_fields: Vec<String>,
}

/// A new posting that survived dedup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub raw_fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteMode {
    Hybrid,
    Remote,
    #[serde(rename = "On-site")]
    OnSite,
}

/// Normalized fields extracted from a listing summary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListingFields {
    pub position_title: String,
    pub employer_name: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub remote: Option<RemoteMode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenedCandidate {
    pub job_id: String,
    pub fields: ListingFields,
    pub relevant: bool,
}

impl ScreenedCandidate {
    pub fn description_url(&self) -> String {
        description_url(&self.job_id)
    }
}

/// Why a posting never reached (or never finished) the deep filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    SeenJob,
    BlocklistedEmployer,
    PreScreenFilteredOut,
    RepostedJob,
    DeepFilterError(String),
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::SeenJob => "SEEN_JOB",
            SkipReason::BlocklistedEmployer => "BLOCKLISTED_EMPLOYER",
            SkipReason::PreScreenFilteredOut => "PRE_SCREEN_FILTERED_OUT",
            SkipReason::RepostedJob => "REPOSTED_JOB",
            SkipReason::DeepFilterError(_) => "DEEP_FILTER_ERROR",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DeepFilterError(detail) => write!(f, "{} - {}", self.code(), detail),
            _ => write!(f, "{}", self.code()),
        }
    }
}

/// Deep-filter rejection rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCode {
    NotFulltime,
    NoSponsorship,
    UsCitizenOnly,
    PhdRequired,
    InternalOnly,
    YearExceedMin,
    PreferenceViolate,
}

impl RejectCode {
    pub const ALL: [RejectCode; 7] = [
        RejectCode::NotFulltime,
        RejectCode::NoSponsorship,
        RejectCode::UsCitizenOnly,
        RejectCode::PhdRequired,
        RejectCode::InternalOnly,
        RejectCode::YearExceedMin,
        RejectCode::PreferenceViolate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::NotFulltime => "NOT_FULLTIME",
            RejectCode::NoSponsorship => "NO_SPONSORSHIP",
            RejectCode::UsCitizenOnly => "US_CITIZEN_ONLY",
            RejectCode::PhdRequired => "PHD_REQUIRED",
            RejectCode::InternalOnly => "INTERNAL_ONLY",
            RejectCode::YearExceedMin => "YEAR_EXCEED_MIN",
            RejectCode::PreferenceViolate => "PREFERENCE_VIOLATE",
        }
    }
}

/// A rejection code plus whatever justification the model wrote after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectReason {
    pub code: RejectCode,
    pub detail: String,
}

impl RejectReason {
    pub fn new(code: RejectCode) -> Self {
        Self {
            code,
            detail: String::new(),
        }
    }

    pub fn with_detail(code: RejectCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.code())
        } else {
            write!(f, "{} - {}", self.code(), self.detail)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IsFit {
    Yes,
    No,
    Skip,
}

/// Outcome attached to every record. A reason exists exactly when the
/// posting is not a fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Fit,
    Reject(RejectReason),
    Skip(SkipReason),
}

impl Decision {
    pub fn is_fit(&self) -> IsFit {
        match self {
            Decision::Fit => IsFit::Yes,
            Decision::Reject(_) => IsFit::No,
            Decision::Skip(_) => IsFit::Skip,
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            Decision::Fit => None,
            Decision::Reject(reason) => Some(reason.to_string()),
            Decision::Skip(reason) => Some(reason.to_string()),
        }
    }

    /// Bare reason code without any appended justification.
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Decision::Fit => None,
            Decision::Reject(reason) => Some(reason.code()),
            Decision::Skip(reason) => Some(reason.code()),
        }
    }
}

/// A finished record from the deep filter or one of the skip buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredResult {
    pub job_id: String,
    pub description_url: String,
    pub add_date: NaiveDateTime,
    pub listing: Option<ListingFields>,
    pub skills: Option<Vec<String>>,
    pub decision: Decision,
}

impl FilteredResult {
    /// Record for a posting already handled in an earlier run.
    pub fn seen(job_id: &str, add_date: NaiveDateTime) -> Self {
        Self {
            job_id: job_id.to_string(),
            description_url: description_url(job_id),
            add_date,
            listing: None,
            skills: None,
            decision: Decision::Skip(SkipReason::SeenJob),
        }
    }

    pub fn skipped(screened: ScreenedCandidate, reason: SkipReason, add_date: NaiveDateTime) -> Self {
        Self {
            description_url: screened.description_url(),
            job_id: screened.job_id,
            add_date,
            listing: Some(screened.fields),
            skills: None,
            decision: Decision::Skip(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_is_absent_only_for_fit() {
        assert_eq!(Decision::Fit.reason(), None);
        assert_eq!(Decision::Fit.is_fit(), IsFit::Yes);

        let reject = Decision::Reject(RejectReason::new(RejectCode::PhdRequired));
        assert_eq!(reject.reason().as_deref(), Some("PHD_REQUIRED"));
        assert_eq!(reject.is_fit(), IsFit::No);

        let skip = Decision::Skip(SkipReason::SeenJob);
        assert_eq!(skip.reason().as_deref(), Some("SEEN_JOB"));
        assert_eq!(skip.is_fit(), IsFit::Skip);
    }

    #[test]
    fn test_reason_with_justification() {
        let reason = RejectReason::with_detail(RejectCode::YearExceedMin, "requires 7+ years");
        assert_eq!(reason.to_string(), "YEAR_EXCEED_MIN - requires 7+ years");

        let bare = RejectReason::new(RejectCode::PreferenceViolate);
        assert_eq!(bare.to_string(), "PREFERENCE_VIOLATE");

        let fixed = RejectReason::with_detail(RejectCode::NotFulltime, "6-month contract");
        assert_eq!(fixed.to_string(), "NOT_FULLTIME - 6-month contract");

        let err = SkipReason::DeepFilterError("unknown reason code".to_string());
        assert_eq!(err.to_string(), "DEEP_FILTER_ERROR - unknown reason code");
        assert_eq!(err.code(), "DEEP_FILTER_ERROR");
    }

    #[test]
    fn test_remote_mode_wire_names() {
        let mode: RemoteMode = serde_json::from_str("\"On-site\"").unwrap();
        assert_eq!(mode, RemoteMode::OnSite);
        assert_eq!(serde_json::to_string(&RemoteMode::OnSite).unwrap(), "\"On-site\"");
        assert!(serde_json::from_str::<RemoteMode>("\"Onsite\"").is_err());
    }

    #[test]
    fn test_seen_record_uses_job_view_url() {
        let now = chrono::Local::now().naive_local();
        let record = FilteredResult::seen("4012345678", now);
        assert_eq!(record.description_url, "https://www.linkedin.com/jobs/view/4012345678/");
        assert_eq!(record.decision.reason_code(), Some("SEEN_JOB"));
        assert!(record.listing.is_none());
    }
}
