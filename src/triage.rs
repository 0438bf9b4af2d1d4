use chrono::NaiveDateTime;

use crate::models::{FilteredResult, ScreenedCandidate, SkipReason};
use crate::store::Blocklist;

/// Screened postings split into deep-filter work and skip records.
#[derive(Debug, Default)]
pub struct Triage {
    pub passed: Vec<ScreenedCandidate>,
    pub skipped: Vec<FilteredResult>,
}

/// First matching rule wins: blocklisted employer, then irrelevance.
pub fn skip_reason(candidate: &ScreenedCandidate, blocklist: &Blocklist) -> Option<SkipReason> {
    let blocked = candidate
        .fields
        .employer_name
        .as_deref()
        .is_some_and(|name| blocklist.contains(name));

    if blocked {
        Some(SkipReason::BlocklistedEmployer)
    } else if !candidate.relevant {
        Some(SkipReason::PreScreenFilteredOut)
    } else {
        None
    }
}

pub fn triage<F>(screened: Vec<ScreenedCandidate>, blocklist: &Blocklist, mut now: F) -> Triage
where
    F: FnMut() -> NaiveDateTime,
{
    let mut result = Triage::default();
    for candidate in screened {
        match skip_reason(&candidate, blocklist) {
            Some(reason) => result.skipped.push(FilteredResult::skipped(candidate, reason, now())),
            None => result.passed.push(candidate),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, ListingFields};

    fn screened(id: &str, employer: Option<&str>, relevant: bool) -> ScreenedCandidate {
        ScreenedCandidate {
            job_id: id.to_string(),
            fields: ListingFields {
                position_title: "Data Analyst".to_string(),
                employer_name: employer.map(str::to_string),
                ..Default::default()
            },
            relevant,
        }
    }

    fn now() -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    #[test]
    fn test_blocklist_takes_precedence_over_relevance() {
        let blocklist = Blocklist::from_names(vec!["Acme".to_string()]);
        let candidate = screened("1", Some("Acme"), false);
        assert_eq!(skip_reason(&candidate, &blocklist), Some(SkipReason::BlocklistedEmployer));
    }

    #[test]
    fn test_each_candidate_resolves_once() {
        let blocklist = Blocklist::from_names(vec!["Acme".to_string()]);
        let result = triage(
            vec![
                screened("1", Some("Acme"), true),
                screened("2", Some("Globex"), false),
                screened("3", Some("Globex"), true),
                screened("4", None, true),
                screened("5", Some("acme"), true),
            ],
            &blocklist,
            now,
        );

        let passed: Vec<_> = result.passed.iter().map(|c| c.job_id.as_str()).collect();
        assert_eq!(passed, vec!["3", "4", "5"]);

        let skipped: Vec<_> = result
            .skipped
            .iter()
            .map(|r| (r.job_id.as_str(), r.decision.clone()))
            .collect();
        assert_eq!(
            skipped,
            vec![
                ("1", Decision::Skip(SkipReason::BlocklistedEmployer)),
                ("2", Decision::Skip(SkipReason::PreScreenFilteredOut)),
            ]
        );
        assert_eq!(result.skipped[0].description_url, "https://www.linkedin.com/jobs/view/1/");
        assert_eq!(
            result.skipped[1].listing.as_ref().and_then(|l| l.employer_name.as_deref()),
            Some("Globex")
        );
    }
}
