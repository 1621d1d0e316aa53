use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Render `url` in headless Chrome and return the settled page HTML.
///
/// GitHub builds its file-listing table client-side, so a plain HTTP GET
/// of the listing page never sees the CSV anchors. The Chrome process
/// lives for the duration of this call only; the handle drop kills it
/// before the function returns.
pub fn rendered_html(url: &str) -> Result<String> {
    let browser = launch()?;
    let tab = browser.new_tab().context("opening browser tab")?;
    tab.navigate_to(url)
        .with_context(|| format!("navigating to {}", url))?;
    tab.wait_until_navigated().context("waiting for page to settle")?;
    let html = tab.get_content().context("reading rendered page source")?;
    debug!(bytes = html.len(), "rendered listing page");
    Ok(html)
}

/// Launch headless Chrome, honoring a `CHROME_PATH` override and
/// dropping the sandbox when running inside a container (detected via
/// /.dockerenv or the COVIDSCRAPER_CONTAINER env var).
fn launch() -> Result<Browser> {
    let in_container =
        std::env::var("COVIDSCRAPER_CONTAINER").is_ok() || Path::new("/.dockerenv").exists();
    let chrome_path: Option<PathBuf> = std::env::var("CHROME_PATH").ok().map(PathBuf::from);

    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(!in_container)
        .path(chrome_path)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build Chrome launch options: {}", e))?;
    Browser::new(options).map_err(|e| anyhow::anyhow!("Failed to launch headless Chrome: {}", e))
}
