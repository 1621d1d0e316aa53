use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod states;

pub use states::EXCLUDED_STATES;

/// One cleaned snapshot row, field names as stored in the warehouse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    /// `MM-DD-YYYY` token of the snapshot the row came from.
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Province_State")]
    pub province_state: String,
    #[serde(rename = "Confirmed")]
    pub confirmed: Option<i64>,
    #[serde(rename = "Deaths")]
    pub deaths: Option<i64>,
    #[serde(rename = "Recovered")]
    pub recovered: Option<f64>,
    #[serde(rename = "Active")]
    pub active: Option<f64>,
    #[serde(rename = "Incident_Rate")]
    pub incident_rate: Option<f64>,
    #[serde(rename = "Total_Test_Results")]
    pub total_test_results: Option<f64>,
    #[serde(rename = "Case_Fatality_Ratio")]
    pub case_fatality_ratio: Option<f64>,
    /// USPS code mapped from Province_State, set just before a write.
    #[serde(rename = "State_Code")]
    pub state_code: Option<String>,
}

/// Raw per-state record as published in the daily report CSVs. Only the
/// kept columns are declared: everything else (Country_Region,
/// Last_Update, Lat, Long_, FIPS, UID, ISO3, the hospitalization columns
/// and era-specific variants) is dropped by never being read, and a feed
/// revision missing one of the numeric columns loads it as None.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Province_State")]
    province_state: String,
    #[serde(rename = "Confirmed", default)]
    confirmed: Option<i64>,
    #[serde(rename = "Deaths", default)]
    deaths: Option<i64>,
    #[serde(rename = "Recovered", default)]
    recovered: Option<f64>,
    #[serde(rename = "Active", default)]
    active: Option<f64>,
    #[serde(rename = "Incident_Rate", default)]
    incident_rate: Option<f64>,
    #[serde(rename = "Total_Test_Results", default)]
    total_test_results: Option<f64>,
    #[serde(rename = "Case_Fatality_Ratio", default)]
    case_fatality_ratio: Option<f64>,
}

/// Parse one downloaded snapshot, drop excluded regions, and tag every
/// surviving row with the snapshot's date token.
pub fn clean_snapshot(csv_text: &str, date: &str) -> Result<Vec<SnapshotRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let raw: RawRow = record.context("malformed snapshot CSV row")?;
        if states::is_excluded(&raw.province_state) {
            continue;
        }
        rows.push(SnapshotRow {
            date: date.to_string(),
            province_state: raw.province_state,
            confirmed: raw.confirmed,
            deaths: raw.deaths,
            recovered: raw.recovered,
            active: raw.active,
            incident_rate: raw.incident_rate,
            total_test_results: raw.total_test_results,
            case_fatality_ratio: raw.case_fatality_ratio,
            state_code: None,
        });
    }
    Ok(rows)
}

/// Remove every row whose exact contents occur more than once in the
/// sequence, keeping none of the copies. Survivor order is preserved.
pub fn drop_exact_duplicates(rows: Vec<SnapshotRow>) -> Result<Vec<SnapshotRow>> {
    let fingerprints = rows
        .iter()
        .map(|row| serde_json::to_string(row).context("fingerprinting row"))
        .collect::<Result<Vec<String>>>()?;

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for fp in &fingerprints {
        *counts.entry(fp.as_str()).or_insert(0) += 1;
    }

    Ok(rows
        .into_iter()
        .zip(&fingerprints)
        .filter(|(_, fp)| counts[fp.as_str()] == 1)
        .map(|(row, _)| row)
        .collect())
}

/// Map Province_State through the USPS table onto every row.
pub fn annotate_state_codes(rows: &mut [SnapshotRow]) {
    for row in rows {
        row.state_code = states::state_code(&row.province_state).map(str::to_owned);
    }
}
