use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ai::DeepFilterVerdict;
use crate::errors::JobsiftError;
use crate::models::{RejectCode, RejectReason};
use crate::screening::required_nullable;

const STAGE: &str = "Deep filter";

pub const DESCRIPTION_START: &str = "About the job";
pub const DESCRIPTION_END: &str = "\nSee more\nSet alert for similar jobs\n";

/// True when the page header above the description says "Reposted".
/// Without the description marker there is no header to inspect.
pub fn check_repost(text: &str) -> bool {
    match text.find(DESCRIPTION_START) {
        Some(idx) => text[..idx].to_lowercase().contains("reposted"),
        None => false,
    }
}

/// Crops `text` to the span between the first `start` and the first `end`.
/// A marker that is missing leaves that side uncropped; markers in the wrong
/// order leave the whole text uncropped.
pub fn crop_text<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
    let cropped = match (text.find(start), text.find(end)) {
        (Some(i), Some(j)) if i < j => &text[i..j],
        (Some(_), Some(_)) => text,
        (Some(i), None) => &text[i..],
        (None, Some(j)) => &text[..j],
        (None, None) => text,
    };
    cropped.trim()
}

pub fn crop_description(text: &str) -> &str {
    crop_text(text, DESCRIPTION_START, DESCRIPTION_END)
}

pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["technicalSkills", "isFit", "reason"],
        "properties": {
            "technicalSkills": {
                "type": "array",
                "items": {"type": "string", "minLength": 1}
            },
            "isFit": {"type": "string", "enum": ["yes", "no"]},
            "reason": {"type": ["string", "null"]}
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireFit {
    Yes,
    No,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireDecision {
    #[serde(rename = "technicalSkills")]
    technical_skills: Vec<String>,
    #[serde(rename = "isFit")]
    is_fit: WireFit,
    #[serde(deserialize_with = "required_nullable")]
    reason: Option<String>,
}

/// Reads a known code at the start of `raw`. Whatever follows is kept as the
/// justification, minus leading separators and one pair of wrapping parentheses.
pub fn parse_reason(raw: &str) -> Result<RejectReason> {
    let raw = raw.trim();
    let code = RejectCode::ALL
        .into_iter()
        .find(|code| {
            raw.strip_prefix(code.as_str())
                .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
        })
        .ok_or_else(|| JobsiftError::schema(STAGE, format!("unknown reason code in '{}'", raw)))?;

    let rest = raw[code.as_str().len()..]
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '\u{2013}' | '\u{2014}' | ':'))
        .trim_end();
    let detail = rest
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(rest)
        .trim();

    Ok(RejectReason::with_detail(code, detail))
}

fn dedup_skills(skills: Vec<String>) -> Result<Vec<String>> {
    let mut unique: Vec<String> = Vec::with_capacity(skills.len());
    for skill in skills {
        let skill = skill.trim();
        if skill.is_empty() {
            return Err(JobsiftError::schema(STAGE, "empty skill name").into());
        }
        if !unique.iter().any(|s| s == skill) {
            unique.push(skill.to_string());
        }
    }
    Ok(unique)
}

/// Validates raw service output for a single job description.
pub fn parse_response(text: &str) -> Result<DeepFilterVerdict> {
    let decision: WireDecision =
        serde_json::from_str(text).map_err(|e| JobsiftError::schema(STAGE, e.to_string()))?;

    let skills = dedup_skills(decision.technical_skills)?;
    let reason = decision.reason.filter(|r| !r.trim().is_empty());

    let rejection = match (decision.is_fit, reason) {
        (WireFit::Yes, None) => None,
        (WireFit::Yes, Some(reason)) => {
            return Err(JobsiftError::schema(STAGE, format!("fit decision carries a reason '{}'", reason)).into());
        }
        (WireFit::No, None) => {
            return Err(JobsiftError::schema(STAGE, "rejection without a reason").into());
        }
        (WireFit::No, Some(reason)) => Some(parse_reason(&reason)?),
    };

    Ok(DeepFilterVerdict { skills, rejection })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_both_absent() {
        assert_eq!(crop_description("  plain text \n"), "plain text");
    }

    #[test]
    fn test_crop_only_start() {
        let text = "Header\nAbout the job\nWe need SQL.\n";
        assert_eq!(crop_description(text), "About the job\nWe need SQL.");
    }

    #[test]
    fn test_crop_only_end() {
        let text = "  We need SQL.\nSee more\nSet alert for similar jobs\nFooter";
        assert_eq!(crop_description(text), "We need SQL.");
    }

    #[test]
    fn test_crop_both_in_order() {
        let text = "Nav\nAbout the job\nWe need SQL.\nSee more\nSet alert for similar jobs\nFooter";
        assert_eq!(crop_description(text), "About the job\nWe need SQL.");
    }

    #[test]
    fn test_crop_markers_out_of_order() {
        let text = " x\nSee more\nSet alert for similar jobs\nAbout the job\nbody ";
        assert_eq!(crop_description(text), text.trim());
    }

    #[test]
    fn test_crop_uses_first_occurrences() {
        let text = "About the job\nA\nAbout the job\nB\nSee more\nSet alert for similar jobs\nC\nSee more\nSet alert for similar jobs\n";
        assert_eq!(crop_description(text), "About the job\nA\nAbout the job\nB");
    }

    #[test]
    fn test_check_repost() {
        assert!(check_repost("Analyst\nAcme\nReposted 2 days ago\nAbout the job\nBody"));
        assert!(check_repost("REPOSTED\nAbout the job"));
        assert!(!check_repost("Analyst\nPosted 2 days ago\nAbout the job\nThis role was reposted."));
        assert!(!check_repost("Reposted 2 days ago\nno marker here"));
        assert!(!check_repost(""));
    }

    #[test]
    fn test_parse_fit_response() {
        let verdict =
            parse_response(r#"{"technicalSkills":["Python"," SQL","Python","Excel"],"isFit":"yes","reason":null}"#)
                .unwrap();
        assert_eq!(verdict.skills, vec!["Python", "SQL", "Excel"]);
        assert_eq!(verdict.rejection, None);

        let empty = parse_response(r#"{"technicalSkills":[],"isFit":"yes","reason":""}"#).unwrap();
        assert!(empty.skills.is_empty());
        assert_eq!(empty.rejection, None);
    }

    #[test]
    fn test_parse_rejection_response() {
        let verdict = parse_response(
            r#"{"technicalSkills":["R"],"isFit":"no","reason":"YEAR_EXCEED_MIN - requires 6+ years"}"#,
        )
        .unwrap();
        assert_eq!(
            verdict.rejection,
            Some(RejectReason::with_detail(RejectCode::YearExceedMin, "requires 6+ years"))
        );

        let verdict = parse_response(r#"{"technicalSkills":[],"isFit":"no","reason":"NOT_FULLTIME"}"#).unwrap();
        assert_eq!(verdict.rejection, Some(RejectReason::new(RejectCode::NotFulltime)));

        let verdict = parse_response(
            r#"{"technicalSkills":[],"isFit":"no","reason":"PREFERENCE_VIOLATE (on-site in Dallas)"}"#,
        )
        .unwrap();
        let rejection = verdict.rejection.unwrap();
        assert_eq!(rejection.code, RejectCode::PreferenceViolate);
        assert_eq!(rejection.to_string(), "PREFERENCE_VIOLATE - on-site in Dallas");
    }

    #[test]
    fn test_parse_reason_codes() {
        assert_eq!(parse_reason("NO_SPONSORSHIP").unwrap(), RejectReason::new(RejectCode::NoSponsorship));
        assert_eq!(parse_reason(" US_CITIZEN_ONLY ").unwrap(), RejectReason::new(RejectCode::UsCitizenOnly));
        assert_eq!(parse_reason("PHD_REQUIRED").unwrap(), RejectReason::new(RejectCode::PhdRequired));
        assert_eq!(parse_reason("INTERNAL_ONLY").unwrap(), RejectReason::new(RejectCode::InternalOnly));
        assert!(JobsiftError::is_schema(&parse_reason("TOO_SENIOR").unwrap_err()));
        assert!(JobsiftError::is_schema(&parse_reason("NOT_FULLTIMEISH").unwrap_err()));
        assert!(JobsiftError::is_schema(&parse_reason("").unwrap_err()));
    }

    #[test]
    fn test_parse_reason_keeps_justification() {
        let cases = [
            ("PREFERENCE_VIOLATE - on-site in Dallas", RejectCode::PreferenceViolate, "on-site in Dallas"),
            ("PREFERENCE_VIOLATE \u{2013} on-site in Dallas", RejectCode::PreferenceViolate, "on-site in Dallas"),
            ("PREFERENCE_VIOLATE (on-site in Dallas)", RejectCode::PreferenceViolate, "on-site in Dallas"),
            ("YEAR_EXCEED_MIN: requires 6 years", RejectCode::YearExceedMin, "requires 6 years"),
            ("YEAR_EXCEED_MIN-requires 6-8 years", RejectCode::YearExceedMin, "requires 6-8 years"),
            ("NOT_FULLTIME - 6-month contract", RejectCode::NotFulltime, "6-month contract"),
            ("NO_SPONSORSHIP \u{2014} no H-1B", RejectCode::NoSponsorship, "no H-1B"),
        ];
        for (raw, code, detail) in cases {
            assert_eq!(parse_reason(raw).unwrap(), RejectReason::with_detail(code, detail), "{}", raw);
        }
    }

    #[test]
    fn test_parse_rejects_inconsistent_decisions() {
        let no_reason = r#"{"technicalSkills":[],"isFit":"no","reason":null}"#;
        assert!(JobsiftError::is_schema(&parse_response(no_reason).unwrap_err()));

        let fit_with_reason = r#"{"technicalSkills":[],"isFit":"yes","reason":"NOT_FULLTIME"}"#;
        assert!(JobsiftError::is_schema(&parse_response(fit_with_reason).unwrap_err()));

        let blank_skill = r#"{"technicalSkills":[""],"isFit":"yes","reason":null}"#;
        assert!(JobsiftError::is_schema(&parse_response(blank_skill).unwrap_err()));

        let missing_reason = r#"{"technicalSkills":[],"isFit":"yes"}"#;
        assert!(JobsiftError::is_schema(&parse_response(missing_reason).unwrap_err()));

        let skip = r#"{"technicalSkills":[],"isFit":"skip","reason":null}"#;
        assert!(JobsiftError::is_schema(&parse_response(skip).unwrap_err()));
    }
}
