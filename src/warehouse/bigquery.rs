use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use google_cloud_bigquery::client::{Client, ClientConfig};
use google_cloud_bigquery::http::error::Error as BqError;
use google_cloud_bigquery::http::job::query::QueryRequest;
use google_cloud_bigquery::http::tabledata::insert_all::{InsertAllRequest, Row as InsertRow};
use google_cloud_bigquery::query::row::Row;
use tracing::info;

use crate::clean::SnapshotRow;
use crate::warehouse::Warehouse;

/// BigQuery-backed warehouse table.
pub struct BigQueryTable {
    client: Client,
    project_id: String,
    dataset_id: String,
    table_id: String,
}

impl BigQueryTable {
    /// Authenticate with application-default credentials and bind to
    /// `dataset.table`. The project id comes from `GOOGLE_CLOUD_PROJECT`
    /// or, failing that, the credentials themselves.
    pub async fn connect(dataset_id: &str, table_id: &str) -> Result<Self> {
        let (config, credential_project) = ClientConfig::new_with_auth()
            .await
            .context("authenticating BigQuery client")?;
        let project_id = std::env::var("GOOGLE_CLOUD_PROJECT")
            .ok()
            .or(credential_project)
            .ok_or_else(|| {
                anyhow!("no project id: set GOOGLE_CLOUD_PROJECT or use a service-account key")
            })?;
        let client = Client::new(config).await?;

        Ok(Self {
            client,
            project_id,
            dataset_id: dataset_id.to_string(),
            table_id: table_id.to_string(),
        })
    }

    fn qualified_name(&self) -> String {
        format!("`{}.{}.{}`", self.project_id, self.dataset_id, self.table_id)
    }

    /// Run a statement that returns no interesting rows (DDL), draining
    /// whatever the job yields.
    async fn run_statement(&self, sql: String) -> Result<()> {
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            ..Default::default()
        };
        let mut rows = self.client.query::<Row>(&self.project_id, request).await?;
        while (rows.next().await?).is_some() {}
        Ok(())
    }
}

#[async_trait]
impl Warehouse for BigQueryTable {
    async fn table_exists(&self) -> Result<bool> {
        match self
            .client
            .table()
            .get(&self.project_id, &self.dataset_id, &self.table_id)
            .await
        {
            Ok(_) => Ok(true),
            Err(BqError::Response(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(anyhow!(e).context("probing table existence")),
        }
    }

    async fn read_rows(&self) -> Result<Vec<SnapshotRow>> {
        let request = QueryRequest {
            query: format!(
                "SELECT Date, Province_State, Confirmed, Deaths, Recovered, Active, \
                 Incident_Rate, Total_Test_Results, Case_Fatality_Ratio, State_Code \
                 FROM {}",
                self.qualified_name()
            ),
            use_legacy_sql: false,
            ..Default::default()
        };

        let mut iter = self.client.query::<Row>(&self.project_id, request).await?;
        let mut rows = Vec::new();
        while let Some(row) = iter.next().await? {
            rows.push(SnapshotRow {
                date: row.column::<Option<String>>(0)?.unwrap_or_default(),
                province_state: row.column::<Option<String>>(1)?.unwrap_or_default(),
                confirmed: row.column::<Option<i64>>(2)?,
                deaths: row.column::<Option<i64>>(3)?,
                recovered: row.column::<Option<f64>>(4)?,
                active: row.column::<Option<f64>>(5)?,
                incident_rate: row.column::<Option<f64>>(6)?,
                total_test_results: row.column::<Option<f64>>(7)?,
                case_fatality_ratio: row.column::<Option<f64>>(8)?,
                state_code: row.column::<Option<String>>(9)?,
            });
        }
        info!(rows = rows.len(), "read existing table");
        Ok(rows)
    }

    async fn append_rows(&self, rows: &[SnapshotRow]) -> Result<()> {
        let request = InsertAllRequest {
            rows: rows
                .iter()
                .map(|row| InsertRow {
                    insert_id: None,
                    json: row.clone(),
                })
                .collect(),
            ..Default::default()
        };

        let response = self
            .client
            .tabledata()
            .insert(&self.project_id, &self.dataset_id, &self.table_id, &request)
            .await
            .context("streaming rows into table")?;
        if let Some(errors) = response.insert_errors {
            if !errors.is_empty() {
                return Err(anyhow!(
                    "{} rows rejected by streaming insert: {:?}",
                    errors.len(),
                    errors.first()
                ));
            }
        }
        Ok(())
    }

    async fn create_with_rows(&self, rows: &[SnapshotRow]) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE {} (\n\
             Date STRING,\n\
             Province_State STRING,\n\
             Confirmed INT64,\n\
             Deaths INT64,\n\
             Recovered FLOAT64,\n\
             Active FLOAT64,\n\
             Incident_Rate FLOAT64,\n\
             Total_Test_Results FLOAT64,\n\
             Case_Fatality_Ratio FLOAT64,\n\
             State_Code STRING\n\
             )",
            self.qualified_name()
        );
        self.run_statement(ddl)
            .await
            .context("creating snapshot table")?;
        self.append_rows(rows).await
    }
}
