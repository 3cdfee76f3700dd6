//! The batch-to-warehouse load path: stage the batch as a Parquet artifact,
//! bulk-load it, optionally merge against the target, and clean up the
//! artifact and connection no matter how the attempt ends.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{LoadError, Result};
use crate::frame::Frame;
use crate::io::ObjectStore;
use crate::stage::ParquetStager;
use crate::warehouse::connection::{Connector, WarehouseConn};
use crate::warehouse::{DedupSpec, DuplicateAction, IamRole, Target, sql};

#[derive(Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The batch had no rows; nothing was staged or executed.
    NothingToLoad,
    Loaded {
        rows: usize,
    },
}

pub struct WarehouseLoader {
    store: Arc<dyn ObjectStore>,
    connector: Connector,
    copy_bucket: String,
    iam_role: IamRole,
}

impl WarehouseLoader {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        connector: Connector,
        copy_bucket: impl Into<String>,
        iam_role: IamRole,
    ) -> Self {
        Self {
            store,
            connector,
            copy_bucket: copy_bucket.into(),
            iam_role,
        }
    }

    /// Load one batch into the target table.
    ///
    /// With no dedup spec this is a single bulk-load. With one, the batch
    /// goes through a staging table and the on-duplicate action decides how
    /// it meets existing target rows. The staging artifact is deleted and
    /// the connection closed on every exit path.
    pub async fn load(
        &self,
        mut batch: Frame,
        target: &Target,
        dedup: Option<&DedupSpec>,
    ) -> Result<LoadOutcome> {
        if batch.is_empty() {
            info!("no data to load");
            return Ok(LoadOutcome::NothingToLoad);
        }

        // Configuration problems surface before any storage or warehouse
        // traffic.
        let update_columns = match dedup {
            Some(spec) => {
                let columns = resolve_update_columns(&batch, spec)?;
                let dropped = batch.dedup_by(&spec.key_columns)?;
                if dropped > 0 {
                    info!(dropped, "dropped duplicate rows within the batch");
                }
                columns
            }
            None => Vec::new(),
        };

        let artifact_key = Uuid::new_v4().to_string();
        let stager = ParquetStager::new(self.store.clone());
        stager.stage(&batch, &self.copy_bucket, &artifact_key).await?;

        let rows = batch.num_rows();
        let result = self
            .run_load(&batch, target, dedup, &update_columns, &artifact_key)
            .await;

        // The artifact is single-use; remove it whether or not the load
        // succeeded.
        let deletion = self.store.delete(&self.copy_bucket, &artifact_key).await;
        match (result, deletion) {
            (Ok(()), Ok(())) => {
                info!(
                    schema = %target.schema,
                    table = %target.table,
                    rows,
                    "data loaded"
                );
                Ok(LoadOutcome::Loaded { rows })
            }
            (Ok(()), Err(delete_err)) => Err(delete_err),
            (Err(err), deletion) => {
                if let Err(delete_err) = deletion {
                    warn!(error = %delete_err, "failed to delete staging artifact");
                }
                Err(err)
            }
        }
    }

    /// Connect, run the load statements, then roll back on failure and
    /// close. Rollback and close errors are logged only; the first error
    /// wins.
    async fn run_load(
        &self,
        batch: &Frame,
        target: &Target,
        dedup: Option<&DedupSpec>,
        update_columns: &[String],
        artifact_key: &str,
    ) -> Result<()> {
        let mut conn = self.connector.connect().await?;
        let result = self
            .execute_load(&mut conn, batch, target, dedup, update_columns, artifact_key)
            .await;
        if result.is_err()
            && let Err(rollback_err) = conn.execute("ROLLBACK").await
        {
            warn!(error = %rollback_err, "rollback failed");
        }
        if let Err(close_err) = conn.close().await {
            warn!(error = %close_err, "connection close failed");
        }
        result
    }

    async fn execute_load(
        &self,
        conn: &mut WarehouseConn,
        batch: &Frame,
        target: &Target,
        dedup: Option<&DedupSpec>,
        update_columns: &[String],
        artifact_key: &str,
    ) -> Result<()> {
        let Some(spec) = dedup else {
            return conn
                .execute(&sql::copy_from_s3(
                    &sql::qualified(target),
                    &self.copy_bucket,
                    artifact_key,
                    &self.iam_role,
                ))
                .await;
        };

        let staging = sql::staging_table_name();
        conn.execute(&sql::create_staging_table(&staging, target))
            .await?;
        conn.execute(&sql::copy_from_s3(
            &staging,
            &self.copy_bucket,
            artifact_key,
            &self.iam_role,
        ))
        .await?;

        conn.execute("BEGIN").await?;
        match &spec.action {
            DuplicateAction::Ignore => {
                conn.execute(&sql::delete_matching_keys(
                    &staging,
                    target,
                    &spec.key_columns,
                ))
                .await?;
                conn.execute(&sql::insert_staged_rows(target, &staging))
                    .await?;
            }
            DuplicateAction::Overwrite | DuplicateAction::Merge(_) => {
                let batch_columns: Vec<String> = batch
                    .column_names()
                    .iter()
                    .map(|name| name.to_string())
                    .collect();
                conn.execute(&sql::merge_staged_rows(
                    target,
                    &staging,
                    &spec.key_columns,
                    update_columns,
                    &batch_columns,
                ))
                .await?;
            }
        }
        conn.execute("COMMIT").await
    }
}

/// Columns the MATCHED branch will update. Keys must exist in the batch;
/// an action that resolves to zero update columns is rejected up front.
fn resolve_update_columns(batch: &Frame, spec: &DedupSpec) -> Result<Vec<String>> {
    for key in &spec.key_columns {
        if !batch.has_column(key) {
            return Err(LoadError::configuration(format!(
                "dedup column '{key}' is not in the batch"
            )));
        }
    }

    let update: Vec<String> = match &spec.action {
        DuplicateAction::Ignore => return Ok(Vec::new()),
        DuplicateAction::Overwrite => batch
            .column_names()
            .iter()
            .filter(|name| !spec.key_columns.iter().any(|key| key == *name))
            .map(|name| name.to_string())
            .collect(),
        DuplicateAction::Merge(columns) => {
            for column in columns {
                if !batch.has_column(column) {
                    return Err(LoadError::configuration(format!(
                        "merge column '{column}' is not in the batch"
                    )));
                }
            }
            columns
                .iter()
                .filter(|column| !spec.key_columns.contains(column))
                .cloned()
                .collect()
        }
    };
    if update.is_empty() {
        return Err(LoadError::configuration(
            "on-duplicate action leaves no columns to update",
        ));
    }
    Ok(update)
}
