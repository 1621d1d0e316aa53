// src/fetch/urls.rs
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Anchors naming a CSV file anywhere in the href.
static CSV_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*=".csv"]"#).expect("Invalid CSS selector for .csv links"));

/// One discovered snapshot: the filename date token and the raw URL the
/// CSV downloads from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Snapshot {
    /// `MM-DD-YYYY`, as embedded in the filename.
    pub date: String,
    pub url: String,
}

/// Extract every CSV hyperlink from a rendered listing page, resolved
/// against `listing_url` and deduplicated. Order is not part of the
/// contract; links come back sorted so runs are comparable.
pub fn extract_csv_links(html: &str, listing_url: &str) -> Result<Vec<String>> {
    let base = Url::parse(listing_url)?;
    let doc = Html::parse_document(html);
    let links: HashSet<String> = doc
        .select(&CSV_LINK_SELECTOR)
        .filter_map(|e| e.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .map(|u| u.to_string())
        .collect();

    let mut links: Vec<String> = links.into_iter().collect();
    links.sort();
    Ok(links)
}

/// Slice the ten characters ahead of the `.csv` suffix as a date token.
/// Listing filenames end `.../MM-DD-YYYY.csv`.
pub fn extract_date_token(link: &str) -> Option<String> {
    if link.len() < 14 {
        return None;
    }
    link.get(link.len() - 14..link.len() - 4).map(str::to_string)
}

/// Whether a token names the first day of a month. Tokens that are not
/// real `MM-DD-YYYY` calendar dates never qualify.
pub fn first_of_month(token: &str) -> bool {
    NaiveDate::parse_from_str(token, "%m-%d-%Y")
        .map(|d| d.day() == 1)
        .unwrap_or(false)
}

/// Discover every first-of-month snapshot on a rendered listing page and
/// build its download URL from `base_url`.
pub fn discover_snapshots(html: &str, listing_url: &str, base_url: &str) -> Result<Vec<Snapshot>> {
    let links = extract_csv_links(html, listing_url)?;

    let mut snapshots: Vec<Snapshot> = links
        .iter()
        .filter_map(|link| extract_date_token(link))
        .filter(|token| first_of_month(token))
        .map(|date| Snapshot {
            url: format!("{}{}.csv", base_url, date),
            date,
        })
        .collect();
    snapshots.sort();
    snapshots.dedup();
    Ok(snapshots)
}
