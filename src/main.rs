mod ai;
mod browser;
mod config;
mod dedup;
mod deep_filter;
mod email;
mod errors;
mod models;
mod pace;
mod pipeline;
mod prompts;
mod report;
mod screening;
mod store;
mod triage;

use ai::{LlmReasoner, OpenAIProvider};
use anyhow::{Context, Result};
use browser::LinkedInBrowser;
use clap::{Parser, Subcommand};
use config::{set_env_key, Config, MailSettings, UserPreferences};
use email::ReportMailer;
use errors::JobsiftError;
use pace::Pacer;
use pipeline::Pipeline;
use std::path::PathBuf;
use store::{Blocklist, SeenStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jobsift")]
#[command(about = "Watch a LinkedIn job search and email the postings worth reading")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the saved search, filter new postings and send the report
    Run {
        /// Write the CSV report but do not email it
        #[arg(long)]
        no_email: bool,
    },

    /// Validate configuration, Chrome binary and OpenAI API key
    Check,

    /// Log in to LinkedIn and capture the search to monitor
    Login,

    /// Manage blocked employers
    Blocklist {
        #[command(subcommand)]
        command: BlocklistCommands,
    },
}

#[derive(Subcommand)]
enum BlocklistCommands {
    /// List blocked employers
    List,

    /// Block an employer (exact name as shown on LinkedIn)
    Add {
        /// Employer name
        name: String,
    },

    /// Unblock an employer
    Remove {
        /// Employer name
        name: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { no_email } => run(&Config::from_env()?, no_email)?,

        Commands::Check => {
            let config = Config::from_env()?;
            let preferences = config.load_preferences()?;
            println!("Preferences: {}", config.preferences_path.display());
            println!("  Target roles: {}", preferences.target_roles.len());
            println!("  Preferences:  {}", preferences.preferences.len());

            let chrome = config.browser.require_chrome()?;
            let version = browser::chrome_version(chrome)?;
            println!("Chrome: {} ({})", chrome.display(), version);
            if std::env::var("CHROME_VERSION").is_err() {
                let env_file = env_file_path(&config);
                set_env_key(&env_file, "CHROME_VERSION", &version)?;
                println!("  Saved CHROME_VERSION to {}", env_file.display());
            }

            OpenAIProvider::new(&config.llm)?.verify()?;
            println!("OpenAI API key: ok");

            match &config.mail {
                Some(mail) => println!("Email: {} -> {}", mail.sender, mail.recipient),
                None => println!("Email: not configured (use 'run --no-email')"),
            }
            if config.browser.has_saved_session() {
                println!("Saved search: {}", config.browser.search_url.as_deref().unwrap_or_default());
            } else {
                println!("Saved search: none (run 'jobsift login')");
            }
        }

        Commands::Login => {
            let config = Config::from_env()?;
            let mut browser = LinkedInBrowser::launch(&config.browser, Pacer::new(config.pacing))?;
            let search_url = browser.capture_search_url()?;
            browser.close()?;

            let env_file = env_file_path(&config);
            set_env_key(&env_file, "SEARCH_URL", &search_url)?;
            println!("Saved search to {}:\n  {}", env_file.display(), search_url);
        }

        Commands::Blocklist { command } => {
            config::load_env_file();
            let mut blocklist = Blocklist::open(&config::blocklist_path(|key| std::env::var(key).ok()));
            match command {
                BlocklistCommands::List => {
                    if blocklist.names().is_empty() {
                        println!("No blocked employers.");
                    } else {
                        println!("{:<4} {:<40}", "#", "EMPLOYER");
                        println!("{}", "-".repeat(44));
                        for (i, name) in blocklist.names().iter().enumerate() {
                            println!("{:<4} {:<40}", i + 1, truncate(name, 38));
                        }
                    }
                }

                BlocklistCommands::Add { name } => {
                    if blocklist.add(&name)? {
                        println!("Blocked '{}'.", name);
                    } else {
                        println!("'{}' is already blocked.", name);
                    }
                }

                BlocklistCommands::Remove { name } => {
                    if blocklist.remove(&name)? {
                        println!("Unblocked '{}'.", name);
                    } else {
                        println!("'{}' is not on the blocklist.", name);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Local checks for `run`. Nothing here touches the network.
fn preflight(config: &Config, no_email: bool) -> Result<(UserPreferences, Option<&MailSettings>)> {
    let preferences = config.load_preferences()?;
    let mail = if no_email { None } else { Some(config.require_mail()?) };
    config.browser.require_chrome()?;
    if !config.browser.has_saved_session() {
        return Err(JobsiftError::Config(
            "No saved LinkedIn session or search. Run 'jobsift login' first.".to_string(),
        )
        .into());
    }
    Ok((preferences, mail))
}

fn run(config: &Config, no_email: bool) -> Result<()> {
    let (preferences, mail) = preflight(config, no_email)?;

    let provider = OpenAIProvider::new(&config.llm)?;
    provider.verify()?;
    let reasoner = LlmReasoner::new(&provider, &config.llm);

    let mut seen = SeenStore::open(&config.seen_path);
    if seen.is_empty() {
        info!("No seen job ids at {}; every listing counts as new", config.seen_path.display());
    }
    let blocklist = Blocklist::open(&config.blocklist_path);
    info!(
        "Loaded {} seen job ids and {} blocked employers",
        seen.len(),
        blocklist.names().len()
    );

    let pacer = Pacer::new(config.pacing);
    let mut browser = LinkedInBrowser::launch(&config.browser, pacer)?;
    let outcome = Pipeline::new(&reasoner, &preferences, pacer).run(&mut browser, &mut seen, &blocklist)?;
    if let Err(e) = browser.close() {
        warn!("{:#}", e);
    }

    let timestamp = chrono::Local::now().naive_local();
    let file_name = report::report_file_name(timestamp);
    let csv_bytes = report::render_csv(&outcome.rows)?;
    let path = report::write_report(&config.results_dir, &file_name, &csv_bytes)
        .context("Failed to write report")?;
    info!("Results saved to {}", path.display());

    let summary = report::summarize(&outcome.rows);
    println!("\nResults:");
    println!("  Total parsed jobs: {}", summary.total);
    println!("  Filtered for you:  {}", summary.fit);
    for (code, count) in &summary.by_reason {
        println!("  {:<24} {}", code, count);
    }
    println!("  Estimated cost:    ${:.4}", outcome.cost.total());

    if let Some(mail) = mail {
        let mailer = ReportMailer::new(mail);
        let message = mailer.build_message(timestamp, &summary, &file_name, csv_bytes)?;
        mailer.send(&message)?;
        println!("\nReport emailed to {}", mail.recipient);
    }

    Ok(())
}

fn env_file_path(config: &Config) -> PathBuf {
    config.env_file.clone().unwrap_or_else(|| PathBuf::from(".env"))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
