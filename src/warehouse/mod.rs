use anyhow::Result;
use async_trait::async_trait;

use crate::clean::SnapshotRow;

pub mod bigquery;

/// The analytical table the loader writes to.
///
/// One failure is distinguished across the whole pipeline: a missing
/// table. `table_exists` answers `false` for it instead of erroring, so
/// the loader can take its create branch; every other fault propagates.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn table_exists(&self) -> Result<bool>;

    /// Full contents of the table, in stored row order.
    async fn read_rows(&self) -> Result<Vec<SnapshotRow>>;

    async fn append_rows(&self, rows: &[SnapshotRow]) -> Result<()>;

    /// Create the table with the snapshot schema and load `rows`.
    async fn create_with_rows(&self, rows: &[SnapshotRow]) -> Result<()>;
}
