use std::collections::HashSet;

use anyhow::Result;
use tracing::info;

use crate::clean;
use crate::fetch::csvs::CsvFetcher;
use crate::fetch::urls::Snapshot;
use crate::warehouse::Warehouse;

/// Bring the warehouse table up to date with the discovered snapshots.
///
/// With an existing table only the dates missing from it are fetched,
/// cleaned and appended; with no table every discovered snapshot is
/// fetched and the result written as a fresh table.
pub async fn fill_table<W, F>(warehouse: &W, fetcher: &F, snapshots: &[Snapshot]) -> Result<()>
where
    W: Warehouse + ?Sized,
    F: CsvFetcher + ?Sized,
{
    if warehouse.table_exists().await? {
        fill_missing(warehouse, fetcher, snapshots).await
    } else {
        create_from_scratch(warehouse, fetcher, snapshots).await
    }
}

/// Existing-table branch: accumulate the stored rows plus every missing
/// snapshot, dropping exact duplicates after each one, then append the
/// tail past the original row count. Accumulation is a Vec, so the tail
/// slice sees rows in exactly the order they were added.
async fn fill_missing<W, F>(warehouse: &W, fetcher: &F, snapshots: &[Snapshot]) -> Result<()>
where
    W: Warehouse + ?Sized,
    F: CsvFetcher + ?Sized,
{
    let existing = warehouse.read_rows().await?;
    let existing_dates: HashSet<String> = existing.iter().map(|r| r.date.clone()).collect();
    let existing_count = existing.len();
    info!(
        rows = existing_count,
        dates = existing_dates.len(),
        "table exists; checking for missing snapshots"
    );

    let mut accumulated = existing;
    for snapshot in snapshots {
        if existing_dates.contains(&snapshot.date) {
            continue;
        }
        info!(date = %snapshot.date, "downloading missing snapshot");
        let body = fetcher.fetch_csv(&snapshot.url).await?;
        accumulated.extend(clean::clean_snapshot(&body, &snapshot.date)?);
        accumulated = clean::drop_exact_duplicates(accumulated)?;
    }

    let tail_start = existing_count.min(accumulated.len());
    let mut fresh = accumulated.split_off(tail_start);
    if fresh.is_empty() {
        info!("no missing snapshots; nothing to append");
        return Ok(());
    }
    clean::annotate_state_codes(&mut fresh);
    warehouse.append_rows(&fresh).await?;
    info!(appended = fresh.len(), "missing records filled");
    Ok(())
}

/// Absent-table branch: same accumulate/dedup loop over every discovered
/// snapshot, then create the table with the result.
async fn create_from_scratch<W, F>(warehouse: &W, fetcher: &F, snapshots: &[Snapshot]) -> Result<()>
where
    W: Warehouse + ?Sized,
    F: CsvFetcher + ?Sized,
{
    info!("table not found; loading all discovered snapshots");

    let mut accumulated = Vec::new();
    for snapshot in snapshots {
        info!(date = %snapshot.date, "downloading snapshot");
        let body = fetcher.fetch_csv(&snapshot.url).await?;
        accumulated.extend(clean::clean_snapshot(&body, &snapshot.date)?);
        accumulated = clean::drop_exact_duplicates(accumulated)?;
    }

    clean::annotate_state_codes(&mut accumulated);
    warehouse.create_with_rows(&accumulated).await?;
    info!(rows = accumulated.len(), "empty table filled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::SnapshotRow;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory stand-in for the BigQuery table.
    struct MemoryWarehouse {
        rows: Mutex<Option<Vec<SnapshotRow>>>,
        appends: Mutex<Vec<Vec<SnapshotRow>>>,
        creates: Mutex<usize>,
    }

    impl MemoryWarehouse {
        fn empty() -> Self {
            Self {
                rows: Mutex::new(None),
                appends: Mutex::new(Vec::new()),
                creates: Mutex::new(0),
            }
        }

        fn with_rows(rows: Vec<SnapshotRow>) -> Self {
            let wh = Self::empty();
            *wh.rows.lock().unwrap() = Some(rows);
            wh
        }

        fn stored(&self) -> Vec<SnapshotRow> {
            self.rows.lock().unwrap().clone().unwrap_or_default()
        }
    }

    #[async_trait]
    impl Warehouse for MemoryWarehouse {
        async fn table_exists(&self) -> Result<bool> {
            Ok(self.rows.lock().unwrap().is_some())
        }

        async fn read_rows(&self) -> Result<Vec<SnapshotRow>> {
            self.rows
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| anyhow!("table does not exist"))
        }

        async fn append_rows(&self, rows: &[SnapshotRow]) -> Result<()> {
            self.appends.lock().unwrap().push(rows.to_vec());
            self.rows
                .lock()
                .unwrap()
                .as_mut()
                .ok_or_else(|| anyhow!("table does not exist"))?
                .extend(rows.to_vec());
            Ok(())
        }

        async fn create_with_rows(&self, rows: &[SnapshotRow]) -> Result<()> {
            *self.creates.lock().unwrap() += 1;
            *self.rows.lock().unwrap() = Some(rows.to_vec());
            Ok(())
        }
    }

    /// Serves canned CSV bodies and records which URLs were hit.
    struct MapFetcher {
        bodies: HashMap<String, String>,
        hits: Mutex<Vec<String>>,
    }

    impl MapFetcher {
        fn new(bodies: &[(&str, &str)]) -> Self {
            Self {
                bodies: bodies
                    .iter()
                    .map(|(u, b)| (u.to_string(), b.to_string()))
                    .collect(),
                hits: Mutex::new(Vec::new()),
            }
        }

        fn hits(&self) -> Vec<String> {
            self.hits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CsvFetcher for MapFetcher {
        async fn fetch_csv(&self, url: &str) -> Result<String> {
            self.hits.lock().unwrap().push(url.to_string());
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("unexpected download: {}", url))
        }
    }

    fn snapshot(date: &str) -> Snapshot {
        Snapshot {
            date: date.to_string(),
            url: format!("https://raw.example/{}.csv", date),
        }
    }

    fn stored_row(date: &str, state: &str, confirmed: i64, code: &str) -> SnapshotRow {
        SnapshotRow {
            date: date.to_string(),
            province_state: state.to_string(),
            confirmed: Some(confirmed),
            state_code: Some(code.to_string()),
            ..SnapshotRow::default()
        }
    }

    const MARCH: &str = "\
Province_State,Confirmed,Deaths
Washington,100,10
Oregon,50,5
";
    const APRIL: &str = "\
Province_State,Confirmed,Deaths
Washington,200,20
Diamond Princess,49,0
";
    const MAY: &str = "\
Province_State,Confirmed,Deaths
Washington,300,30
Oregon,150,15
";

    #[tokio::test]
    async fn only_missing_dates_are_downloaded_and_appended() {
        let warehouse = MemoryWarehouse::with_rows(vec![
            stored_row("03-01-2021", "Washington", 100, "WA"),
            stored_row("03-01-2021", "Oregon", 50, "OR"),
            stored_row("04-01-2021", "Washington", 200, "WA"),
        ]);
        let fetcher = MapFetcher::new(&[("https://raw.example/05-01-2021.csv", MAY)]);
        let discovered = [
            snapshot("03-01-2021"),
            snapshot("04-01-2021"),
            snapshot("05-01-2021"),
        ];

        fill_table(&warehouse, &fetcher, &discovered).await.unwrap();

        assert_eq!(fetcher.hits(), vec!["https://raw.example/05-01-2021.csv"]);
        let appends = warehouse.appends.lock().unwrap().clone();
        assert_eq!(appends.len(), 1);
        let appended = &appends[0];
        assert_eq!(appended.len(), 2);
        assert!(appended.iter().all(|r| r.date == "05-01-2021"));
        assert_eq!(appended[0].province_state, "Washington");
        assert_eq!(appended[0].state_code.as_deref(), Some("WA"));
        assert_eq!(warehouse.stored().len(), 5);
    }

    #[tokio::test]
    async fn nothing_is_appended_when_no_dates_are_missing() {
        let warehouse =
            MemoryWarehouse::with_rows(vec![stored_row("03-01-2021", "Washington", 100, "WA")]);
        let fetcher = MapFetcher::new(&[]);

        fill_table(&warehouse, &fetcher, &[snapshot("03-01-2021")])
            .await
            .unwrap();

        assert!(fetcher.hits().is_empty());
        assert!(warehouse.appends.lock().unwrap().is_empty());
        assert_eq!(warehouse.stored().len(), 1);
    }

    #[tokio::test]
    async fn absent_table_is_created_from_all_snapshots() {
        let warehouse = MemoryWarehouse::empty();
        let fetcher = MapFetcher::new(&[
            ("https://raw.example/03-01-2021.csv", MARCH),
            ("https://raw.example/04-01-2021.csv", APRIL),
        ]);
        let discovered = [snapshot("03-01-2021"), snapshot("04-01-2021")];

        fill_table(&warehouse, &fetcher, &discovered).await.unwrap();

        assert_eq!(*warehouse.creates.lock().unwrap(), 1);
        let stored = warehouse.stored();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|r| r.province_state != "Diamond Princess"));
        assert_eq!(stored[0].date, "03-01-2021");
        assert_eq!(stored[0].state_code.as_deref(), Some("WA"));
        assert_eq!(stored[2].date, "04-01-2021");
        assert_eq!(stored[2].confirmed, Some(200));
    }

    #[tokio::test]
    async fn duplicated_existing_rows_shift_the_tail() {
        // two identical rows already stored: the symmetric dedup removes
        // both, and the tail slice keyed to the pre-loop row count drops
        // everything the removal pulled forward.
        let dup = stored_row("03-01-2021", "Washington", 100, "WA");
        let warehouse = MemoryWarehouse::with_rows(vec![dup.clone(), dup]);
        let fetcher = MapFetcher::new(&[("https://raw.example/05-01-2021.csv", MAY)]);
        let discovered = [snapshot("03-01-2021"), snapshot("05-01-2021")];

        fill_table(&warehouse, &fetcher, &discovered).await.unwrap();

        assert!(warehouse.appends.lock().unwrap().is_empty());
    }
}
