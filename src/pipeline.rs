use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::ai::{DeepFilterVerdict, ReasoningService};
use crate::browser::Scraper;
use crate::config::UserPreferences;
use crate::dedup;
use crate::deep_filter::{check_repost, crop_description};
use crate::errors::JobsiftError;
use crate::models::{Decision, FilteredResult, ScreenedCandidate, SkipReason};
use crate::pace::Pacer;
use crate::report::{self, ReportRow};
use crate::screening;
use crate::store::{Blocklist, SeenStore};
use crate::triage;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub found: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub seen: usize,
    pub new: usize,
    pub pre_screen_skipped: usize,
    pub deep_filtered: usize,
    pub reposted: usize,
    pub deep_filter_errors: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CostLedger {
    pub pre_screen: f64,
    pub deep_filter: f64,
}

impl CostLedger {
    pub fn total(&self) -> f64 {
        self.pre_screen + self.deep_filter
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub rows: Vec<ReportRow>,
    pub stats: RunStats,
    pub cost: CostLedger,
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Scrape → dedup → pre-screen → triage → deep filter → merged table.
pub struct Pipeline<'a> {
    reasoner: &'a dyn ReasoningService,
    preferences: &'a UserPreferences,
    pacer: Pacer,
}

impl<'a> Pipeline<'a> {
    pub fn new(reasoner: &'a dyn ReasoningService, preferences: &'a UserPreferences, pacer: Pacer) -> Self {
        Self {
            reasoner,
            preferences,
            pacer,
        }
    }

    pub fn run(&self, scraper: &mut dyn Scraper, seen: &mut SeenStore, blocklist: &Blocklist) -> Result<RunOutcome> {
        let mut stats = RunStats::default();
        let mut cost = CostLedger::default();

        let listings = scraper.scrape_listings().context("Failed to scrape job listings")?;
        stats.found = listings.len();

        let classification = dedup::classify(listings, seen);
        stats.invalid = classification.invalid;
        stats.duplicates = classification.duplicates;
        stats.seen = classification.seen.len();
        stats.new = classification.new.len();

        info!("{} total job listings found on the page.", stats.found);
        if stats.invalid > 0 {
            info!("{} listings skipped due to missing job IDs.", stats.invalid);
        }
        if stats.seen > 0 {
            info!("{} listings skipped as they have been seen in a previous run.", stats.seen);
        }
        info!("{} new job listings to be processed.", stats.new);

        // Recorded before any screening so a failed run still remembers what it saw.
        let added = seen
            .record(classification.observed())
            .with_context(|| format!("Failed to update seen ids at {}", seen.path().display()))?;
        debug!("Recorded {} new ids, {} seen in total", added, seen.len());

        let seen_records: Vec<FilteredResult> = classification
            .seen
            .iter()
            .map(|id| FilteredResult::seen(id, now()))
            .collect();

        let screened = if classification.new.is_empty() {
            Vec::new()
        } else {
            info!("Pre-screening {} job listings via LLM...", classification.new.len());
            let raw: Vec<Vec<String>> = classification.new.iter().map(|c| c.raw_fields.clone()).collect();
            let priced = self
                .reasoner
                .pre_screen(&raw, &self.preferences.target_roles)
                .context("Pre-screen stage failed")?;
            cost.pre_screen = priced.cost;
            info!(
                "Estimated cost for job pre-screen call: ${:.6} ({} tokens)",
                priced.cost, priced.usage.total_tokens
            );
            screening::join(&classification.new, priced.value)?
        };

        let triaged = triage::triage(screened, blocklist, now);
        stats.pre_screen_skipped = triaged.skipped.len();
        if !triaged.passed.is_empty() {
            self.pacer.wait(2.0, 5.0);
        }

        info!("Reading through {} pre-screened job descriptions.", triaged.passed.len());
        let mut deep_records = Vec::with_capacity(triaged.passed.len());
        for candidate in triaged.passed {
            let record = self.deep_filter_one(scraper, candidate, &mut cost, &mut stats)?;
            deep_records.push(record);
        }

        info!("Estimated total cost for job description filter calls: ${:.6}", cost.deep_filter);
        info!("Estimated total cost for the entire run: ${:.6}", cost.total());

        let rows = report::assemble(deep_records, seen_records, triaged.skipped);
        Ok(RunOutcome { rows, stats, cost })
    }

    fn deep_filter_one(
        &self,
        scraper: &mut dyn Scraper,
        candidate: ScreenedCandidate,
        cost: &mut CostLedger,
        stats: &mut RunStats,
    ) -> Result<FilteredResult> {
        let title = candidate.fields.position_title.clone();
        let employer = candidate.fields.employer_name.clone().unwrap_or_else(|| "unknown employer".to_string());
        let url = candidate.description_url();

        let page = scraper
            .fetch_description(&url)
            .with_context(|| format!("Failed to fetch job description {}", url))?;

        if check_repost(&page) {
            info!("\tSkipping reposted job {} at {}", title, employer);
            stats.reposted += 1;
            self.pacer.wait(10.0, 20.0);
            return Ok(FilteredResult::skipped(candidate, SkipReason::RepostedJob, now()));
        }

        info!("\tParsing {} at {} via LLM...", title, employer);
        let description = crop_description(&page);
        let outcome = self.reasoner.deep_filter(description, &title, &self.preferences.preferences);

        let record = match outcome {
            Ok(priced) => {
                debug!("\t{} tokens, ${:.6}", priced.usage.total_tokens, priced.cost);
                cost.deep_filter += priced.cost;
                stats.deep_filtered += 1;
                let DeepFilterVerdict { skills, rejection } = priced.value;
                let decision = match rejection {
                    Some(reason) => Decision::Reject(reason),
                    None => Decision::Fit,
                };
                info!("\t{}", decision.reason_code().unwrap_or("FIT"));
                FilteredResult {
                    job_id: candidate.job_id,
                    description_url: url,
                    add_date: now(),
                    listing: Some(candidate.fields),
                    skills: Some(skills),
                    decision,
                }
            }
            Err(err) if JobsiftError::is_schema(&err) => {
                let detail = err
                    .downcast_ref::<JobsiftError>()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| err.to_string());
                warn!("\tDeep filter output rejected for {} at {}: {}", title, employer, detail);
                stats.deep_filter_errors += 1;
                FilteredResult::skipped(candidate, SkipReason::DeepFilterError(detail), now())
            }
            Err(err) => {
                return Err(err.context(format!("Deep filter failed for {} at {}", title, employer)));
            }
        };

        self.pacer.wait(2.0, 5.0);
        Ok(record)
    }
}
