use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::sync::OnceLock;

use crate::ai::ScreenRecord;
use crate::errors::JobsiftError;
use crate::models::{Candidate, ListingFields, RemoteMode, ScreenedCandidate};

const STAGE: &str = "Pre-screen";

fn work_mode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(Remote|Hybrid|On-?site)\b").expect("valid work-mode regex"))
}

pub fn response_schema() -> Value {
    let item = json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["positionTitle", "pass", "employerName", "location", "salary", "remote"],
        "properties": {
            "positionTitle": {"type": "string"},
            "employerName": {"type": ["string", "null"]},
            "location": {
                "type": ["string", "null"],
                "pattern": r"^(?!.*\b(Remote|Hybrid|On-?site)\b).*$"
            },
            "pass": {"type": "string", "enum": ["yes", "no"]},
            "salary": {"type": ["string", "null"]},
            "remote": {"type": ["string", "null"], "enum": ["Hybrid", "Remote", "On-site", null]}
        }
    });

    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["listings"],
        "properties": {
            "listings": {"type": "array", "items": item}
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Pass {
    Yes,
    No,
}

/// Nullable but required: a missing key is an error, unlike serde's
/// default handling of `Option` fields.
pub(crate) fn required_nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireListing {
    #[serde(rename = "positionTitle")]
    position_title: String,
    #[serde(rename = "employerName", deserialize_with = "required_nullable")]
    employer_name: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    location: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    salary: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    remote: Option<RemoteMode>,
    pass: Pass,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireResponse {
    listings: Vec<WireListing>,
}

/// Validates raw service output against the pre-screen schema.
/// Any violation rejects the whole batch.
pub fn parse_response(text: &str) -> Result<Vec<ScreenRecord>> {
    let response: WireResponse =
        serde_json::from_str(text).map_err(|e| JobsiftError::schema(STAGE, e.to_string()))?;

    response
        .listings
        .into_iter()
        .enumerate()
        .map(|(idx, listing)| {
            if let Some(location) = &listing.location {
                if work_mode_pattern().is_match(location) {
                    return Err(JobsiftError::schema(
                        STAGE,
                        format!("listing {} location '{}' contains a work-mode token", idx, location),
                    )
                    .into());
                }
            }
            Ok(ScreenRecord {
                fields: ListingFields {
                    position_title: listing.position_title,
                    employer_name: listing.employer_name,
                    location: listing.location,
                    salary: listing.salary,
                    remote: listing.remote,
                },
                relevant: matches!(listing.pass, Pass::Yes),
            })
        })
        .collect()
}

/// Attaches each record to the candidate it was produced for.
/// From here on records are keyed by job id.
pub fn join(candidates: &[Candidate], records: Vec<ScreenRecord>) -> Result<Vec<ScreenedCandidate>> {
    if records.len() != candidates.len() {
        return Err(JobsiftError::Cardinality {
            expected: candidates.len(),
            actual: records.len(),
        }
        .into());
    }

    Ok(candidates
        .iter()
        .zip(records)
        .map(|(candidate, record)| record.into_screened(candidate.id.clone()))
        .collect())
}
