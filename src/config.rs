use anyhow::{Context, Result};

/// GitHub listing page of the JHU CSSE per-state daily report CSVs.
static DEFAULT_GITHUB_URL: &str = "https://github.com/CSSEGISandData/COVID-19/tree/master/csse_covid_19_data/csse_covid_19_daily_reports_us";

/// Raw-content prefix the date token and `.csv` suffix are appended to.
static DEFAULT_BASE_URL: &str = "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_daily_reports_us/";

#[derive(Debug, Clone)]
pub struct Config {
    /// Listing page rendered for link discovery.
    pub github_url: String,
    /// Prefix download URLs are built from.
    pub base_url: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl Config {
    /// Read settings from the environment.
    ///
    /// `TABLE_ID` (`dataset.table`) is required. `BIGQUERY_CREDS` may
    /// name a service-account key file; it is exported as
    /// `GOOGLE_APPLICATION_CREDENTIALS` for the warehouse client and can
    /// be omitted when that variable is already set.
    pub fn from_env() -> Result<Self> {
        if let Ok(creds) = std::env::var("BIGQUERY_CREDS") {
            std::env::set_var("GOOGLE_APPLICATION_CREDENTIALS", creds);
        }

        let table = std::env::var("TABLE_ID").context("Please set env var TABLE_ID (dataset.table)")?;
        let (dataset_id, table_id) = table
            .split_once('.')
            .with_context(|| format!("TABLE_ID {:?} is not of the form dataset.table", table))?;
        if dataset_id.is_empty() || table_id.is_empty() {
            anyhow::bail!("TABLE_ID {:?} is not of the form dataset.table", table);
        }

        Ok(Self {
            github_url: std::env::var("GITHUB_URL").unwrap_or_else(|_| DEFAULT_GITHUB_URL.to_string()),
            base_url: std::env::var("BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            dataset_id: dataset_id.to_string(),
            table_id: table_id.to_string(),
        })
    }
}
