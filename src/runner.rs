//! High-level runner API for the Redshift loader.
//!
//! This module wires together object listing, per-object reads, batch
//! assembly, and the warehouse load behind one entry point.
//!
//! This is the primary API for external users and for the CLI.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use aws_config::{BehaviorVersion, Region};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::error::LoadError;
use crate::formats::{self, ObjectKind};
use crate::frame::Frame;
use crate::io::{ObjectStore, S3Store};
use crate::mapping::ColumnMapping;
use crate::warehouse::{
    ConnectionParamsBuilder, Connector, DedupSpec, IamRole, LoadOutcome, Target, WarehouseLoader,
};

/// Arguments for one batch load
pub struct LoadArgs {
    // Source objects
    pub bucket: String,
    pub prefix: String,
    pub kind: ObjectKind,

    // Warehouse connection
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,

    // Load target
    pub schema: String,
    pub table: String,

    // Options
    pub iam_role_arn: Option<String>,
    pub copy_bucket: Option<String>,
    pub region: Option<String>,
    pub mapping: Option<ColumnMapping>,
    pub constant_columns: Vec<(String, String)>,
    pub dedup_columns: Vec<String>,
    pub on_duplicate_action: Option<String>,
    pub quiet: bool,

    // Test-only: inject an in-memory store and a scripted connector
    #[cfg(test)]
    pub test_store: Option<Arc<dyn ObjectStore>>,
    #[cfg(test)]
    pub test_connector: Option<Connector>,
}

/// What one invocation touched.
#[derive(Debug)]
pub struct LoadSummary {
    pub objects_listed: usize,
    pub objects_read: usize,
    pub objects_skipped: usize,
    pub rows_loaded: usize,
    pub duration: Duration,
}

/// Run one batch load with the specified arguments.
///
/// Lists `bucket/prefix`, reads each object (skipping unreadable ones),
/// concatenates the results, applies constant columns and the column
/// mapping, then hands the batch to the warehouse loader.
///
/// # Example
///
/// ```no_run
/// use redshift_loader::formats::ObjectKind;
/// use redshift_loader::runner::{LoadArgs, run_load};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = LoadArgs {
///     bucket: "raw-exports".to_string(),
///     prefix: "orders/2024/".to_string(),
///     kind: ObjectKind::Csv,
///     host: "cluster.abc123.us-east-1.redshift.amazonaws.com".to_string(),
///     port: 5439,
///     database: "analytics".to_string(),
///     username: "loader".to_string(),
///     password: "secret".to_string(),
///     schema: "public".to_string(),
///     table: "orders".to_string(),
///     iam_role_arn: None,
///     copy_bucket: None,
///     region: None,
///     mapping: None,
///     constant_columns: Vec::new(),
///     dedup_columns: vec!["order_id".to_string()],
///     on_duplicate_action: Some("ignore".to_string()),
///     quiet: false,
/// };
///
/// let summary = run_load(args).await?;
/// println!("loaded {} rows", summary.rows_loaded);
/// # Ok(())
/// # }
/// ```
pub async fn run_load(args: LoadArgs) -> Result<LoadSummary> {
    let started = Instant::now();

    // Resolve everything configurable before touching the network.
    let dedup = build_dedup_spec(&args)?;
    let copy_bucket = resolve_copy_bucket(args.copy_bucket.as_deref(), &args.bucket);
    let iam_role = IamRole::from_arn(args.iam_role_arn.clone());
    let target = Target::new(&args.schema, &args.table);

    #[cfg(test)]
    let store: Arc<dyn ObjectStore> = if let Some(test_store) = args.test_store.clone() {
        test_store
    } else {
        build_store(args.region.clone()).await
    };

    #[cfg(not(test))]
    let store: Arc<dyn ObjectStore> = build_store(args.region.clone()).await;

    #[cfg(test)]
    let connector = if let Some(test_connector) = args.test_connector {
        test_connector
    } else {
        build_connector(&args)?
    };

    #[cfg(not(test))]
    let connector = build_connector(&args)?;

    let keys = store.list(&args.bucket, &args.prefix).await?;
    if keys.is_empty() {
        info!(bucket = %args.bucket, prefix = %args.prefix, "nothing to process");
        return Ok(LoadSummary {
            objects_listed: 0,
            objects_read: 0,
            objects_skipped: 0,
            rows_loaded: 0,
            duration: started.elapsed(),
        });
    }
    info!(count = keys.len(), "listed source objects");

    let progress = (!args.quiet).then(|| {
        let bar = ProgressBar::new(keys.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[{elapsed_precise}] Objects: [{bar:30.cyan/blue}] {pos}/{len} ({percent}%)",
                )
                .unwrap()
                .progress_chars("=>-"),
        );
        bar
    });

    let mut frames = Vec::new();
    let mut skipped = 0usize;
    for key in &keys {
        match read_one(store.as_ref(), &args.bucket, key, args.kind).await {
            Ok(frame) => frames.push(frame),
            Err(err) if err.is_object_local() => {
                warn!(key = %key, error = %err, "skipping unreadable object");
                skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
        if let Some(bar) = &progress {
            bar.inc(1);
        }
    }
    if let Some(bar) = &progress {
        bar.finish_and_clear();
    }

    let objects_read = frames.len();
    if frames.is_empty() {
        info!("nothing to process");
        return Ok(LoadSummary {
            objects_listed: keys.len(),
            objects_read: 0,
            objects_skipped: skipped,
            rows_loaded: 0,
            duration: started.elapsed(),
        });
    }

    let mut batch = Frame::concat(frames)?;
    for (name, value) in &args.constant_columns {
        batch.push_constant(name, value);
    }
    if let Some(mapping) = &args.mapping {
        batch = mapping.apply(batch)?;
    }

    let loader = WarehouseLoader::new(store, connector, copy_bucket, iam_role);
    let outcome = loader.load(batch, &target, dedup.as_ref()).await?;
    let rows_loaded = match outcome {
        LoadOutcome::Loaded { rows } => rows,
        LoadOutcome::NothingToLoad => 0,
    };

    Ok(LoadSummary {
        objects_listed: keys.len(),
        objects_read,
        objects_skipped: skipped,
        rows_loaded,
        duration: started.elapsed(),
    })
}

async fn read_one(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    kind: ObjectKind,
) -> crate::error::Result<Frame> {
    let body = store.get(bucket, key).await?;
    formats::read_object(key, &body, kind)
}

async fn build_store(region: Option<String>) -> Arc<dyn ObjectStore> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    Arc::new(S3Store::new(&loader.load().await))
}

fn build_dedup_spec(args: &LoadArgs) -> Result<Option<DedupSpec>> {
    if args.dedup_columns.is_empty() {
        if args.on_duplicate_action.is_some() {
            return Err(LoadError::configuration(
                "an on-duplicate action requires deduplication columns",
            )
            .into());
        }
        return Ok(None);
    }
    let spec = DedupSpec::new(
        args.dedup_columns.clone(),
        args.on_duplicate_action.as_deref(),
    )?;
    Ok(Some(spec))
}

fn resolve_copy_bucket(copy_bucket: Option<&str>, source_bucket: &str) -> String {
    match copy_bucket {
        Some(bucket) if !bucket.trim().is_empty() => bucket.to_string(),
        _ => source_bucket.to_string(),
    }
}

fn build_connector(args: &LoadArgs) -> Result<Connector> {
    let params = ConnectionParamsBuilder::default()
        .host(&args.host)
        .port(args.port)
        .database(&args.database)
        .username(&args.username)
        .password(&args.password)
        .build()?;
    Ok(Connector::Redshift(params))
}
