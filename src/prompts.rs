use anyhow::{Context, Result};

pub const PRE_SCREEN_SYSTEM: &str = r#"You extract fields from job listings and decide relevance. Use only the provided text. Output valid JSON only, no extra keys, comments, or prose.

# Rules
- Use ONLY the provided data.
- Do not add or infer information beyond the text.
- Return EXACTLY the JSON schema the workflow enforces.
- Return one entry per job listing, in the same order as the input.

# Step 1. field extraction
- `positionTitle`: use the official title as written. If multiple appear, choose the shortest official title.
- `employerName`: use the employer name as written.
- `location`: use only the geographic part from the location information as written, exclude any unrelated context or trailing phrases that denote work mode.
- `salary`: use the exact salary information if explicitly mentioned, exclude any unrelated context or trailing phrases that denote benefits, else null.
- `remote`: only "Hybrid", "Remote", "On-site", or null if not mentioned.

# Step 2. relevance decision
- If the position is obviously unrelated to user's search terms, set `pass` = "no".
- Otherwise, set `pass` = "yes"."#;

pub fn pre_screen_user(listings: &[Vec<String>], target_roles: &[String]) -> Result<String> {
    let listing_json = serde_json::to_string_pretty(listings).context("Failed to encode job listings")?;
    let count = listings.len();
    Ok(format!(
        "Only use the data below. There are {count} job listings. Follow the System prompt exactly and return the required JSON for all {count} entries.\n\n\
        # User's search terms: {}\n\n\
        # Job Listings:\n{listing_json}\n",
        target_roles.join(", ")
    ))
}

pub const DEEP_FILTER_SYSTEM: &str = r#"You are an experienced recruiter. Use only the data provided in the user prompt. Do not infer, guess, or use outside knowledge. Output only what the schema requires.

# Task
1. Extract core technical skills from the job description.
2. Decide fit using the rules below in order; stop at the first rule that applies.

# Skill extraction
- `technicalSkills`:
  - Output an array of unique, concrete hard skills explicitly named in the job description (e.g., ["Python", "R", "SQL"]). Include everything you can find, from requirements and preferred/plus/nice to have sections.
  - Exclude soft skills, domains/subjects, and responsibilities (e.g., "communication", "epidemiology", "stakeholder management").
  - Use canonical names (e.g., "Excel", not "Microsoft Excel (advanced)").
  - If none found, return an empty array [].

# Fit decision (ONLY use these rules)
- If the role is not a full-time position: set `isFit` = "no" and `reason` = "NOT_FULLTIME"
- If the role explicitly states that no visa sponsorship is available: set `isFit` = "no" and `reason` = "NO_SPONSORSHIP"
- If the role explicitly states that require US citizenship or require secret clearance: set `isFit` = "no" and `reason` = "US_CITIZEN_ONLY"
- If the role requires PhD degree: set `isFit` = "no" and `reason` = "PHD_REQUIRED".
- If the role opens to internal applicants only: set `isFit` = "no" and `reason` = "INTERNAL_ONLY".
- If the role requires a minimum years of work experience longer than 4 years and cannot substitute using 2 years of graduate degree: set `isFit` = "no" and `reason` = "YEAR_EXCEED_MIN - " + a brief reason.
- If the role does not match the user's preferences: `isFit` = "no" and `reason` = "PREFERENCE_VIOLATE - " + a brief reason.

If multiple rejection criteria are met, only give the first rejection reason you used. Keep the reason succinct. Otherwise, set `isFit` = "yes" and `reason` = null."#;

pub fn deep_filter_user(description: &str, position_title: &str, preferences: &[String]) -> String {
    let preference_list = preferences
        .iter()
        .map(|p| format!("- {}", p.trim()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Only use the data I provide below. Extract technical skills from the job description. Apply the Fit decision rules from the System Prompt in order. Do not infer or assume anything beyond what is explicitly stated in the job description. Return only the JSON required by the workflow schema.\n\n\
        # User Preferences:\n{preference_list}\n\n\
        # positionTitle: {position_title}\n\n\
        # Job Description:\n{description}"
    )
}
