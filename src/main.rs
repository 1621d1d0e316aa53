use anyhow::{Context, Result};
use covidscraper::{
    browser,
    config::Config,
    fetch::{csvs::HttpCsvFetcher, urls},
    load,
    warehouse::bigquery::BigQueryTable,
};
use reqwest::Client;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) configuration ────────────────────────────────────────────
    let cfg = Config::from_env()?;

    // ─── 3) render the listing page & discover snapshots ─────────────
    info!(url = %cfg.github_url, "rendering listing page");
    let listing_url = cfg.github_url.clone();
    let html = tokio::task::spawn_blocking(move || browser::rendered_html(&listing_url))
        .await
        .context("render task panicked")??;

    let snapshots = urls::discover_snapshots(&html, &cfg.github_url, &cfg.base_url)?;
    if snapshots.is_empty() {
        info!("no first-of-month snapshots listed; exit");
        return Ok(());
    }
    info!(count = snapshots.len(), "first-of-month snapshots discovered");

    // ─── 4) fill the warehouse table ─────────────────────────────────
    let table = BigQueryTable::connect(&cfg.dataset_id, &cfg.table_id).await?;
    let fetcher = HttpCsvFetcher::new(Client::new());
    load::fill_table(&table, &fetcher, &snapshots).await?;

    info!("all done");
    Ok(())
}
