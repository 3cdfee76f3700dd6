//! SQL construction for the bulk-load and merge paths.
//!
//! Identifiers that originate in user input (schema, table, column names)
//! are always double-quoted. The staging table name is generated from a
//! fixed prefix plus a UUID, contains nothing that needs quoting, and is
//! used bare so the statements stay readable in warehouse logs.

use uuid::Uuid;

use crate::config::STAGING_TABLE_PREFIX;
use crate::warehouse::{IamRole, Target};

/// Double-quote an identifier, doubling any embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `"schema"."table"` for the load target.
pub fn qualified(target: &Target) -> String {
    format!("{}.{}", quote_ident(&target.schema), quote_ident(&target.table))
}

/// A fresh session-unique staging table name.
pub fn staging_table_name() -> String {
    format!("{STAGING_TABLE_PREFIX}{}", Uuid::new_v4().simple())
}

impl IamRole {
    fn clause(&self) -> String {
        match self {
            IamRole::Default => "IAM_ROLE default".to_string(),
            IamRole::Arn(arn) => format!("IAM_ROLE '{}'", arn.replace('\'', "''")),
        }
    }
}

/// Bulk-load a Parquet artifact into `table` (pre-rendered, either the
/// qualified target or a bare staging name).
pub fn copy_from_s3(table: &str, bucket: &str, key: &str, role: &IamRole) -> String {
    format!(
        "COPY {table} FROM 's3://{bucket}/{key}' {} FORMAT AS PARQUET",
        role.clause()
    )
}

/// Temp table mirroring the target's column layout.
pub fn create_staging_table(staging: &str, target: &Target) -> String {
    format!("CREATE TEMP TABLE {staging} (LIKE {})", qualified(target))
}

/// Anti-join delete: drop staged rows whose key tuple already exists in
/// the target.
pub fn delete_matching_keys(staging: &str, target: &Target, keys: &[String]) -> String {
    let conditions = keys
        .iter()
        .map(|key| {
            format!(
                "{}.{} = {staging}.{}",
                qualified(target),
                quote_ident(key),
                quote_ident(key)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "DELETE FROM {staging} USING {} WHERE {conditions}",
        qualified(target)
    )
}

/// Move every remaining staged row into the target.
pub fn insert_staged_rows(target: &Target, staging: &str) -> String {
    format!("INSERT INTO {} SELECT * FROM {staging}", qualified(target))
}

/// Single-statement merge. `update_columns` drives the MATCHED clause;
/// `batch_columns` drives the INSERT VALUES list and must follow the
/// batch's column order, which the staging table mirrors.
pub fn merge_staged_rows(
    target: &Target,
    staging: &str,
    keys: &[String],
    update_columns: &[String],
    batch_columns: &[String],
) -> String {
    let on = keys
        .iter()
        .map(|key| {
            format!(
                "{}.{} = {staging}.{}",
                qualified(target),
                quote_ident(key),
                quote_ident(key)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    let update_set = update_columns
        .iter()
        .map(|column| format!("{} = {staging}.{}", quote_ident(column), quote_ident(column)))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_values = batch_columns
        .iter()
        .map(|column| format!("{staging}.{}", quote_ident(column)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "MERGE INTO {} USING {staging} ON {on} \
         WHEN MATCHED THEN UPDATE SET {update_set} \
         WHEN NOT MATCHED THEN INSERT VALUES ({insert_values})",
        qualified(target)
    )
}
