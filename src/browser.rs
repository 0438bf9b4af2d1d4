use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};
use thirtyfour::{ChromiumLikeCapabilities, DesiredCapabilities, WebDriver, WindowHandle};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::config::BrowserSettings;
use crate::models::RawListing;
use crate::pace::Pacer;

pub const LOGIN_URL: &str = "https://www.linkedin.com/login";
const PROFILE_DIRECTORY: &str = "jobagent-profile";
const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(60);
const PAGE_LOAD_POLL: Duration = Duration::from_secs(2);

/// Source of listing summaries and job description pages.
pub trait Scraper {
    fn scrape_listings(&mut self) -> Result<Vec<RawListing>>;
    fn fetch_description(&mut self, url: &str) -> Result<String>;
}

const FIND_RESULTS_CONTAINER: &str = r#"
const cands = Array.from(document.querySelectorAll('div,section,ul')).filter(el => {
  const s = getComputedStyle(el);
  return (s.overflowY === 'auto' || s.overflowY === 'scroll') &&
         el.scrollHeight > el.clientHeight && el.clientHeight > 200;
});
return cands[0] || document.scrollingElement;
"#;

/// Chrome session driven through a WebDriver server (chromedriver).
pub struct LinkedInBrowser {
    runtime: Runtime,
    driver: Option<WebDriver>,
    search_url: Option<String>,
    pacer: Pacer,
}

impl LinkedInBrowser {
    pub fn launch(settings: &BrowserSettings, pacer: Pacer) -> Result<Self> {
        let chrome = settings.require_chrome()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start browser runtime")?;

        let mut caps = DesiredCapabilities::chrome();
        caps.set_binary(&chrome.to_string_lossy())?;
        if let Some(profile) = &settings.profile_dir {
            caps.add_arg(&format!("--user-data-dir={}", profile.display()))?;
            caps.add_arg(&format!("--profile-directory={}", PROFILE_DIRECTORY))?;
        }

        let driver = runtime
            .block_on(async {
                let driver = WebDriver::new(&settings.webdriver_url, caps).await?;
                driver.set_window_rect(0, 0, 1300, 1000).await?;
                Ok::<_, thirtyfour::error::WebDriverError>(driver)
            })
            .with_context(|| {
                format!(
                    "Failed to start Chrome through WebDriver at {}. Make sure chromedriver is running and the profile is not in use.",
                    settings.webdriver_url
                )
            })?;

        Ok(Self {
            runtime,
            driver: Some(driver),
            search_url: settings.search_url.clone(),
            pacer,
        })
    }

    fn driver(&self) -> Result<&WebDriver> {
        self.driver.as_ref().ok_or_else(|| anyhow!("Browser session already closed"))
    }

    /// Opens the login page and waits for the operator to set up a search.
    /// Returns the cleaned URL of whatever page the browser ends up on.
    pub fn capture_search_url(&mut self) -> Result<String> {
        let driver = self.driver()?;
        self.runtime.block_on(driver.goto(LOGIN_URL)).context("Failed to open LinkedIn login page")?;

        println!(
            "Please log in to LinkedIn in the opened browser window and search for the job title you are interested in. \
             Remember to set up all filters (e.g., location, date posted, experience level, etc.) before proceeding."
        );
        println!("Make sure this is the search results you want to monitor! Press Enter to continue...");
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).context("Failed to read from stdin")?;

        let current = self
            .runtime
            .block_on(driver.current_url())
            .context("Failed to read current browser URL")?;
        clean_search_url(current.as_str())
    }

    fn wait_for_page_load(&self) -> Result<()> {
        let driver = self.driver()?;
        let started = Instant::now();
        loop {
            let state = self
                .runtime
                .block_on(driver.execute("return document.readyState", Vec::new()))
                .context("Failed to query page state")?;
            if state.json().as_str() == Some("complete") {
                return Ok(());
            }
            if started.elapsed() >= PAGE_LOAD_TIMEOUT {
                return Err(anyhow!("Timed out waiting for page to load"));
            }
            std::thread::sleep(PAGE_LOAD_POLL);
        }
    }

    fn scroll_results_to_bottom(&self) -> Result<()> {
        let driver = self.driver()?;
        let container = self
            .runtime
            .block_on(async {
                let ret = driver.execute(FIND_RESULTS_CONTAINER, Vec::new()).await?;
                ret.element()
            })
            .context("Failed to locate the scrollable results container")?;
        let container_json = container.to_json()?;

        let height = self
            .runtime
            .block_on(driver.execute("return arguments[0].scrollHeight", vec![container_json.clone()]))
            .context("Failed to read results height")?;
        let scroll_height = height.json().as_i64().unwrap_or(0);

        // Scroll height includes roughly 1000px of visible area.
        let mut scrolled: i64 = 0;
        while scrolled + 1000 < scroll_height {
            let step = rand::Rng::gen_range(&mut rand::thread_rng(), 200..=500);
            self.runtime
                .block_on(driver.execute(
                    "arguments[0].scrollBy(0, arguments[1]);",
                    vec![container_json.clone(), serde_json::json!(step)],
                ))
                .context("Failed to scroll results")?;
            scrolled += step;
            self.pacer.wait(0.75, 2.0);
        }
        debug!("Scrolled {}px of {}px", scrolled, scroll_height);
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        if let Some(driver) = self.driver.take() {
            self.runtime.block_on(driver.quit()).context("Failed to close browser")?;
        }
        Ok(())
    }
}

impl Scraper for LinkedInBrowser {
    fn scrape_listings(&mut self) -> Result<Vec<RawListing>> {
        let search_url = self
            .search_url
            .clone()
            .ok_or_else(|| anyhow!("SEARCH_URL is not set. Run 'jobsift login' first."))?;

        info!("Opening monitored search: {}", search_url);
        let driver = self.driver()?;
        self.runtime.block_on(driver.goto(search_url.as_str())).context("Failed to open search page")?;

        self.pacer.wait(2.0, 4.0);
        self.scroll_results_to_bottom()?;
        self.pacer.wait(1.5, 3.5);
        self.wait_for_page_load()?;

        let html = self.runtime.block_on(self.driver()?.source()).context("Failed to read page source")?;
        parse_listings(&html)
    }

    fn fetch_description(&mut self, url: &str) -> Result<String> {
        let driver = self.driver()?;
        let main_handle: WindowHandle = self.runtime.block_on(driver.window())?;

        let tab = self.runtime.block_on(driver.new_tab()).context("Failed to create new browser tab")?;
        self.runtime.block_on(driver.switch_to_window(tab))?;
        self.runtime.block_on(driver.goto(url)).context("Failed to navigate to job URL")?;

        let page = self.wait_for_page_load().and_then(|_| {
            self.pacer.wait(2.0, 5.0);
            let html = self.runtime.block_on(self.driver()?.source())?;
            extract_main_text(&html)
        });

        let driver = self.driver()?;
        self.runtime.block_on(driver.close_window())?;
        self.runtime.block_on(driver.switch_to_window(main_handle))?;
        page
    }
}

impl Drop for LinkedInBrowser {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            let _ = self.runtime.block_on(driver.quit());
        }
    }
}

/// Drops the query parameters that pin a single job in the results pane.
pub fn clean_search_url(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw).with_context(|| format!("Invalid search URL: {}", raw))?;
    let keep: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "currentJobId" && k != "origin")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if keep.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(keep);
    }
    Ok(url.to_string())
}

/// Summary cards from the results list. Each card yields its job id and the
/// trimmed text of every span it contains.
pub fn parse_listings(html: &str) -> Result<Vec<RawListing>> {
    let document = Html::parse_document(html);
    let list_selector = Selector::parse("div.authentication-outlet main#main ul")
        .map_err(|e| anyhow!("Invalid selector: {}", e))?;
    let span_selector = Selector::parse("span").map_err(|e| anyhow!("Invalid selector: {}", e))?;

    let list = document
        .select(&list_selector)
        .next()
        .ok_or_else(|| anyhow!("Job results list not found on page"))?;

    let listings = list
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "li")
        .map(|li| {
            let id = li
                .value()
                .attr("data-occludable-job-id")
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty());
            let raw_fields = li
                .select(&span_selector)
                .map(|span| span.text().map(str::trim).collect::<String>())
                .filter(|text| !text.is_empty())
                .collect();
            RawListing { id, raw_fields }
        })
        .collect();

    Ok(listings)
}

/// Text of the page's `<main>` element, one trimmed text node per line.
pub fn extract_main_text(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let main_selector = Selector::parse("main").map_err(|e| anyhow!("Invalid selector: {}", e))?;
    let main = document
        .select(&main_selector)
        .next()
        .ok_or_else(|| anyhow!("No <main> element found on job page"))?;

    let lines: Vec<&str> = main.text().map(str::trim).filter(|t| !t.is_empty()).collect();
    Ok(lines.join("\n"))
}

pub fn chrome_version(chrome: &Path) -> Result<String> {
    let output = Command::new(chrome)
        .arg("--version")
        .output()
        .with_context(|| format!("Failed to run {}", chrome.display()))?;
    if !output.status.success() {
        return Err(anyhow!("{} --version failed", chrome.display()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .split_whitespace()
        .last()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Could not read Chrome version"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_PAGE: &str = r#"
        <html><body><div class="authentication-outlet"><main id="main">
          <ul>
            <li data-occludable-job-id="4012345678">
              <div><span> Data Analyst </span><span>Acme Health</span>
              <span>Boston, MA (Hybrid)</span><span>   </span></div>
            </li>
            <li data-occludable-job-id="">
              <span>Ghost card</span>
            </li>
            <li><span>No id at all</span></li>
            <li data-occludable-job-id="4087654321">
              <span><span>Senior</span> BI Developer</span>
            </li>
          </ul>
          <ul><li data-occludable-job-id="999"><span>pagination</span></li></ul>
        </main></div></body></html>
    "#;

    #[test]
    fn test_parse_listings() {
        let listings = parse_listings(RESULTS_PAGE).unwrap();
        assert_eq!(listings.len(), 4);

        assert_eq!(listings[0].id.as_deref(), Some("4012345678"));
        assert_eq!(listings[0].raw_fields, vec!["Data Analyst", "Acme Health", "Boston, MA (Hybrid)"]);

        assert_eq!(listings[1].id, None);
        assert_eq!(listings[2].id, None);

        assert_eq!(listings[3].id.as_deref(), Some("4087654321"));
        assert_eq!(listings[3].raw_fields, vec!["SeniorBI Developer", "Senior"]);
    }

    #[test]
    fn test_parse_listings_without_results_list() {
        let err = parse_listings("<html><body><main></main></body></html>").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_extract_main_text() {
        let html = r#"<html><body><nav>Home</nav><main>
            <h1>Data Analyst</h1>
            <div>Reposted 3 days ago</div>
            <h2>About the job</h2><p>We use <b>SQL</b> daily.</p>
        </main><footer>x</footer></body></html>"#;
        let text = extract_main_text(html).unwrap();
        assert_eq!(text, "Data Analyst\nReposted 3 days ago\nAbout the job\nWe use\nSQL\ndaily.");
        assert!(extract_main_text("<p>no main</p>").is_err());
    }

    #[test]
    fn test_clean_search_url() {
        let cleaned = clean_search_url(
            "https://www.linkedin.com/jobs/search/?currentJobId=4012345678&f_TPR=r86400&keywords=data%20analyst&origin=JOB_SEARCH_PAGE_JOB_FILTER",
        )
        .unwrap();
        assert_eq!(cleaned, "https://www.linkedin.com/jobs/search/?f_TPR=r86400&keywords=data+analyst");

        let bare = clean_search_url("https://www.linkedin.com/jobs/search/?currentJobId=1").unwrap();
        assert_eq!(bare, "https://www.linkedin.com/jobs/search/");

        assert!(clean_search_url("not a url").is_err());
    }

    #[test]
    #[ignore] // Requires Chrome, chromedriver and a logged-in profile
    fn test_scrape_live_search() {
        let config = crate::config::Config::from_env().expect("config");
        let mut browser = LinkedInBrowser::launch(&config.browser, Pacer::new(true)).expect("browser");
        let listings = browser.scrape_listings().expect("listings");
        assert!(!listings.is_empty());
        browser.close().unwrap();
    }
}
