use anyhow::{Context, Result};
use serde::Deserialize;
#[cfg(test)]
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ai::{resolve_model, ModelSpec};
use crate::errors::JobsiftError;

const DEFAULT_PRESCREEN_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_DEEP_FILTER_MODEL: &str = "gpt-5-mini";
const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const MAX_LLM_RETRIES: u32 = 10;

/// User-authored search preferences (YAML).
#[derive(Debug, Clone, Deserialize)]
pub struct UserPreferences {
    #[serde(rename = "TargetRoles", default)]
    pub target_roles: Vec<String>,
    #[serde(rename = "Preferences", default)]
    pub preferences: Vec<String>,
}

impl UserPreferences {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read preferences file: {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let parsed: UserPreferences = serde_yaml::from_str(raw)
            .map_err(|e| JobsiftError::Config(format!("Invalid preferences file: {}", e)))?;

        let prefs = UserPreferences {
            target_roles: clean_entries(parsed.target_roles),
            preferences: clean_entries(parsed.preferences),
        };

        if prefs.target_roles.is_empty() || prefs.preferences.is_empty() {
            return Err(JobsiftError::Config(
                "User preferences or target roles not specified in config file.".to_string(),
            )
            .into());
        }
        Ok(prefs)
    }
}

fn clean_entries(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    pub sender: String,
    pub recipient: String,
    pub app_password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub chrome_path: Option<PathBuf>,
    pub profile_dir: Option<PathBuf>,
    pub webdriver_url: String,
    pub search_url: Option<String>,
}

impl BrowserSettings {
    /// Chrome binary, checked to exist and be executable.
    pub fn require_chrome(&self) -> Result<&Path> {
        let path = self.chrome_path.as_deref().ok_or_else(|| {
            JobsiftError::Config("CHROME_PATH is not set in the environment or .env file.".to_string())
        })?;
        if !path.exists() {
            return Err(JobsiftError::Config(format!(
                "Chrome executable not found at {}. Please install Chrome for Testing.",
                path.display()
            ))
            .into());
        }
        if !is_executable(path) {
            return Err(JobsiftError::Config(format!(
                "Chrome executable at {} is not executable. Please check the file permissions.",
                path.display()
            ))
            .into());
        }
        Ok(path)
    }

    /// A run needs both a logged-in profile and a saved search.
    pub fn has_saved_session(&self) -> bool {
        let has_profile = self.profile_dir.as_deref().is_some_and(Path::is_dir);
        has_profile && self.search_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub prescreen_model: ModelSpec,
    pub deep_filter_model: ModelSpec,
    pub prescreen_max_output_tokens: u32,
    pub deep_filter_max_output_tokens: u32,
    pub max_retries: u32,
}

/// Everything a run needs, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub env_file: Option<PathBuf>,
    pub preferences_path: PathBuf,
    pub seen_path: PathBuf,
    pub blocklist_path: PathBuf,
    pub results_dir: PathBuf,
    pub llm: LlmSettings,
    pub browser: BrowserSettings,
    pub mail: Option<MailSettings>,
    pub pacing: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let env_file = load_env_file();
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.env_file = env_file;
        Ok(config)
    }

    #[cfg(test)]
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                JobsiftError::Config(format!("{} is not set in the environment or .env file.", key))
            })
        };

        let api_key = require("OPENAI_API_KEY")?;
        let preferences_path = expand_home(&require("CONFIG_PATH")?);

        let prescreen_model =
            resolve_model(&get("PRESCREEN_MODEL").unwrap_or_else(|| DEFAULT_PRESCREEN_MODEL.to_string()))
                .map_err(|e| JobsiftError::Config(e.to_string()))?;
        let deep_filter_model =
            resolve_model(&get("DEEP_FILTER_MODEL").unwrap_or_else(|| DEFAULT_DEEP_FILTER_MODEL.to_string()))
                .map_err(|e| JobsiftError::Config(e.to_string()))?;

        let mail = match (get("SENDER_EMAIL"), get("RECIPIENT_EMAIL"), get("GMAIL_APP_PASSWORD")) {
            (Some(sender), Some(recipient), Some(app_password)) => Some(MailSettings {
                sender,
                recipient,
                app_password,
                smtp_host: get("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                smtp_port: parse_number(get("SMTP_PORT"), "SMTP_PORT", 587)?,
            }),
            (None, None, None) => None,
            _ => {
                return Err(JobsiftError::Config(
                    "Email credentials incomplete: SENDER_EMAIL, RECIPIENT_EMAIL and GMAIL_APP_PASSWORD must all be set."
                        .to_string(),
                )
                .into());
            }
        };

        let pacing = match get("PACING").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("on") | Some("true") | Some("1") => true,
            Some("off") | Some("false") | Some("0") => false,
            Some(other) => {
                return Err(JobsiftError::Config(format!("PACING must be 'on' or 'off', got '{}'", other)).into());
            }
        };

        Ok(Config {
            env_file: None,
            preferences_path,
            seen_path: get("SEEN_PATH")
                .map(|p| expand_home(&p))
                .unwrap_or_else(|| default_data_path("seen_ids.json")),
            blocklist_path: blocklist_path(&lookup),
            results_dir: get("RESULTS_DIR")
                .map(|p| expand_home(&p))
                .unwrap_or_else(|| PathBuf::from("results")),
            llm: LlmSettings {
                api_key,
                prescreen_model,
                deep_filter_model,
                prescreen_max_output_tokens: parse_number(
                    get("PRESCREEN_MAX_OUTPUT_TOKENS"),
                    "PRESCREEN_MAX_OUTPUT_TOKENS",
                    3000,
                )?,
                deep_filter_max_output_tokens: parse_number(
                    get("DEEP_FILTER_MAX_OUTPUT_TOKENS"),
                    "DEEP_FILTER_MAX_OUTPUT_TOKENS",
                    1500,
                )?,
                max_retries: parse_retries(get("LLM_MAX_RETRIES"))?,
            },
            browser: BrowserSettings {
                chrome_path: get("CHROME_PATH").map(|p| expand_home(&p)),
                profile_dir: get("PROFILE_DATA_DIR").map(|p| expand_home(&p)),
                webdriver_url: get("WEBDRIVER_URL").unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string()),
                search_url: get("SEARCH_URL"),
            },
            mail,
            pacing,
        })
    }

    pub fn load_preferences(&self) -> Result<UserPreferences> {
        UserPreferences::load(&self.preferences_path)
    }

    pub fn require_mail(&self) -> Result<&MailSettings> {
        self.mail
            .as_ref()
            .ok_or_else(|| JobsiftError::Config("Email credentials not found in .env file.".to_string()).into())
    }
}

fn parse_number<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| JobsiftError::Config(format!("{} must be a number, got '{}'", key, raw)).into()),
    }
}

fn parse_retries(value: Option<String>) -> Result<u32> {
    let retries = parse_number(value, "LLM_MAX_RETRIES", 2u32)?;
    if retries > MAX_LLM_RETRIES {
        return Err(JobsiftError::Config(format!(
            "LLM_MAX_RETRIES must be at most {}, got {}",
            MAX_LLM_RETRIES, retries
        ))
        .into());
    }
    Ok(retries)
}

/// Loads `.env` into the process environment when present.
pub fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Blocklist location on its own; editing the blocklist needs no other settings.
pub fn blocklist_path<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("BLOCKLIST_PATH")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|p| expand_home(&p))
        .unwrap_or_else(|| default_data_path("blocklist.json"))
}

fn default_data_path(file: &str) -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobsift") {
        proj_dirs.data_dir().join(file)
    } else {
        PathBuf::from(file)
    }
}

pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(base) = directories::BaseDirs::new() {
            return base.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

/// Rewrites (or appends) `key=value` in a dotenv file, keeping other lines.
pub fn set_env_key(path: &Path, key: &str, value: &str) -> Result<()> {
    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    let entry = format!("{}='{}'", key, value);
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let name = line.split('=').next().unwrap_or("").trim();
            let name = name.strip_prefix("export ").unwrap_or(name).trim();
            if name == key && !replaced {
                replaced = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(entry);
    }

    fs::write(path, lines.join("\n") + "\n").with_context(|| format!("Failed to write {}", path.display()))
}
