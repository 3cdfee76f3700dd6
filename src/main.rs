use clap::{Parser, Subcommand};
use redshift_loader::formats::ObjectKind;
use redshift_loader::mapping::ColumnMapping;
use redshift_loader::runner::{LoadArgs, run_load};

#[derive(Parser, Clone)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    Load {
        /// S3 bucket containing the source objects
        #[arg(short, long)]
        bucket: String,

        /// Key prefix for the source objects
        #[arg(short, long)]
        prefix: String,

        /// Source object type (csv, excel); .gz objects are decompressed
        #[arg(short, long, default_value = "csv")]
        object_type: String,

        /// Redshift cluster host
        #[arg(long)]
        host: String,

        /// Redshift port
        #[arg(long, default_value = "5439")]
        port: u16,

        /// Redshift database
        #[arg(short, long)]
        database: String,

        /// Redshift username
        #[arg(short, long)]
        username: String,

        /// Redshift password
        #[arg(long)]
        password: String,

        /// Target schema
        #[arg(short, long)]
        schema: String,

        /// Target table
        #[arg(short, long)]
        table: String,

        /// IAM role ARN for the COPY command; the cluster's default role
        /// is used if not specified
        #[arg(long)]
        iam_role_arn: Option<String>,

        /// JSON file with the columns mapping
        #[arg(short, long)]
        mapping_file: Option<String>,

        /// Comma-separated column names that identify a duplicate row
        #[arg(long)]
        dedup_columns: Option<String>,

        /// What to do with duplicates: ignore, overwrite, or merge(col1,col2)
        #[arg(long)]
        on_duplicate: Option<String>,

        /// S3 bucket for the staged COPY artifact; the source bucket is
        /// used if not specified
        #[arg(long)]
        copy_bucket: Option<String>,

        /// AWS region for S3 (optional, inferred from the environment if
        /// not specified)
        #[arg(long)]
        region: Option<String>,

        /// Constant column to append, as name=value (repeatable)
        #[arg(long = "new-column")]
        new_columns: Vec<String>,

        /// Quiet mode - minimal output, only show summary
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Load {
            bucket,
            prefix,
            object_type,
            host,
            port,
            database,
            username,
            password,
            schema,
            table,
            iam_role_arn,
            mapping_file,
            dedup_columns,
            on_duplicate,
            copy_bucket,
            region,
            new_columns,
            quiet,
        } => {
            run_loader(
                bucket,
                prefix,
                object_type,
                host,
                port,
                database,
                username,
                password,
                schema,
                table,
                iam_role_arn,
                mapping_file,
                dedup_columns,
                on_duplicate,
                copy_bucket,
                region,
                new_columns,
                quiet,
            )
            .await?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_loader(
    bucket: String,
    prefix: String,
    object_type: String,
    host: String,
    port: u16,
    database: String,
    username: String,
    password: String,
    schema: String,
    table: String,
    iam_role_arn: Option<String>,
    mapping_file: Option<String>,
    dedup_columns: Option<String>,
    on_duplicate: Option<String>,
    copy_bucket: Option<String>,
    region: Option<String>,
    new_columns: Vec<String>,
    quiet: bool,
) -> anyhow::Result<()> {
    // Initialize tracing based on quiet mode
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if quiet {
        EnvFilter::new(redshift_loader::config::QUIET_LOG_DIRECTIVE)
    } else {
        EnvFilter::new(redshift_loader::config::LOG_DIRECTIVE)
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    if !quiet {
        println!("Redshift Loader");
        println!("===============");
        println!("Source: s3://{}/{}", bucket, prefix);
        println!("Target: {}.{}", schema, table);
        println!();
    }

    let kind = ObjectKind::parse(&object_type)?;

    let mapping = if let Some(ref path) = mapping_file {
        Some(cli::load_mapping_file(path)?)
    } else {
        None
    };

    let dedup_columns = dedup_columns
        .as_deref()
        .map(cli::parse_dedup_columns)
        .unwrap_or_default();

    let constant_columns = new_columns
        .iter()
        .map(|pair| cli::parse_new_column(pair))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let load_args = LoadArgs {
        bucket,
        prefix,
        kind,
        host,
        port,
        database,
        username,
        password,
        schema,
        table,
        iam_role_arn,
        copy_bucket,
        region,
        mapping,
        constant_columns,
        dedup_columns,
        on_duplicate_action: on_duplicate,
        quiet,
    };

    let summary = run_load(load_args).await?;

    println!();
    println!("Load Summary");
    println!("============");
    println!("Objects listed: {}", summary.objects_listed);
    println!("Objects read: {}", summary.objects_read);
    println!("Objects skipped: {}", summary.objects_skipped);
    println!("Rows loaded: {}", summary.rows_loaded);
    println!("Duration: {:.2}s", summary.duration.as_secs_f64());

    Ok(())
}

/// CLI utility functions for parsing command-line arguments
mod cli {
    use super::ColumnMapping;

    /// Split a comma-separated column list, dropping empty entries
    pub fn parse_dedup_columns(list: &str) -> Vec<String> {
        list.split(',')
            .map(|column| column.trim().to_string())
            .filter(|column| !column.is_empty())
            .collect()
    }

    /// Parse a `name=value` constant-column argument
    pub fn parse_new_column(pair: &str) -> anyhow::Result<(String, String)> {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(anyhow::anyhow!(
                "Invalid constant column '{}'. Expected format: name=value",
                pair
            ));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow::anyhow!(
                "Constant column name cannot be empty in '{}'",
                pair
            ));
        }
        Ok((name.to_string(), value.to_string()))
    }

    /// Read and parse a columns-mapping JSON file
    pub fn load_mapping_file(path: &str) -> anyhow::Result<ColumnMapping> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read mapping file '{}': {}", path, e))?;
        Ok(ColumnMapping::from_json(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::cli;
    use std::io::Write;

    #[test]
    fn dedup_columns_split_and_trim() {
        assert_eq!(
            cli::parse_dedup_columns("id, region ,"),
            vec!["id".to_string(), "region".to_string()]
        );
        assert!(cli::parse_dedup_columns("").is_empty());
    }

    #[test]
    fn new_column_requires_name_and_separator() {
        assert_eq!(
            cli::parse_new_column("source=etl").unwrap(),
            ("source".to_string(), "etl".to_string())
        );
        assert_eq!(
            cli::parse_new_column("note=").unwrap(),
            ("note".to_string(), String::new())
        );
        assert!(cli::parse_new_column("no-separator").is_err());
        assert!(cli::parse_new_column("=value").is_err());
    }

    #[test]
    fn mapping_file_round_trips_through_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"Order Id": {{"redshift_column": "order_id", "type": "INT"}}}}"#
        )
        .unwrap();

        let mapping = cli::load_mapping_file(file.path().to_str().unwrap()).unwrap();
        assert!(!mapping.is_empty());
    }

    #[test]
    fn missing_mapping_file_is_an_error() {
        assert!(cli::load_mapping_file("/nonexistent/mapping.json").is_err());
    }
}
