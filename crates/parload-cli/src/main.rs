//! parload CLI - load a SQL query into an Arrow table in parallel partitions

mod config;
mod sink;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use clap::{Args, Parser, Subcommand};
use parload_connectors::query::partition_query;
use parload_connectors::{connect_uri, read, ReadOptions};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "parload")]
#[command(about = "Load a SQL query into an Arrow table using parallel range partitions")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct PartitionArgs {
    /// Integer column to split the read on
    #[arg(long)]
    partition_on: Option<String>,

    /// Inclusive "low,high" range of the partition column (looked up when omitted)
    #[arg(long, value_parser = parse_range, allow_hyphen_values = true)]
    range: Option<(i64, i64)>,

    /// Number of partitions [default: PARLOAD_PARTITIONS or 4]
    #[arg(long)]
    partitions: Option<usize>,

    /// Also fetch rows outside the range and rows with a NULL key
    #[arg(long)]
    include_outside: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and print or save the result
    Read {
        /// SQL query to load
        #[arg(short, long, required_unless_present = "job")]
        query: Option<String>,

        /// Source URI [default: PARLOAD_DATABASE_URL]
        #[arg(long)]
        url: Option<String>,

        #[command(flatten)]
        partition: PartitionArgs,

        /// Column to use as the index of the result
        #[arg(long)]
        index_col: Option<String>,

        /// JSON file with the read options; flags override its fields
        #[arg(long, conflicts_with = "query")]
        job: Option<PathBuf>,

        /// Write the result to this Parquet file instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the partition queries a read would run, without connecting
    Plan {
        /// SQL query to split
        #[arg(short, long)]
        query: String,

        #[command(flatten)]
        partition: PartitionArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::from_env()?;

    // Logs go to stderr so printed tables stay clean on stdout
    let filter =
        EnvFilter::try_new(config.log_directive(cli.verbose)).context("Invalid PARLOAD_LOG")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Read {
            query,
            url,
            partition,
            index_col,
            job,
            output,
        } => {
            let options = build_options(query, job.as_deref(), &partition, index_col, &config)?;
            let url = url
                .or_else(|| config.database_url.clone())
                .context("No source URI: pass --url or set PARLOAD_DATABASE_URL")?;
            run_read(&options, &url, output.as_deref()).await?;
        }
        Commands::Plan { query, partition } => {
            let options = build_options(Some(query), None, &partition, None, &config)?;
            for statement in plan_queries(&options)? {
                println!("{};", statement);
            }
        }
    }

    Ok(())
}

fn parse_range(s: &str) -> std::result::Result<(i64, i64), String> {
    let (low, high) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"low,high\", got \"{}\"", s))?;
    let low = low
        .trim()
        .parse()
        .map_err(|e| format!("invalid range low \"{}\": {}", low.trim(), e))?;
    let high = high
        .trim()
        .parse()
        .map_err(|e| format!("invalid range high \"{}\": {}", high.trim(), e))?;
    Ok((low, high))
}

/// Merge the job file (if any), partition flags and env defaults.
fn build_options(
    query: Option<String>,
    job: Option<&Path>,
    partition: &PartitionArgs,
    index_col: Option<String>,
    config: &CliConfig,
) -> Result<ReadOptions> {
    let mut options = match job {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read job file {:?}", path))?;
            serde_json::from_str::<ReadOptions>(&content)
                .with_context(|| format!("Invalid job file {:?}", path))?
        }
        None => ReadOptions::new(query.unwrap_or_default()),
    };

    match &partition.partition_on {
        Some(column) => {
            let num = partition.partitions.unwrap_or(config.partitions);
            options = options
                .partition_on(column.clone(), partition.range, num)
                .include_outside(partition.include_outside);
        }
        None if partition.range.is_some()
            || partition.partitions.is_some()
            || partition.include_outside =>
        {
            anyhow::bail!("Partition flags require --partition-on");
        }
        None => {}
    }

    if let Some(index) = index_col {
        options = options.index_column(index);
    }

    options.validate()?;
    Ok(options)
}

/// The statements a read with `options` would issue, one per partition.
fn plan_queries(options: &ReadOptions) -> Result<Vec<String>> {
    let specs = options
        .validate()?
        .context("Planning needs --partition-on and --range")?;
    Ok(specs
        .iter()
        .map(|spec| partition_query(&options.query, spec))
        .collect())
}

async fn run_read(options: &ReadOptions, url: &str, output: Option<&Path>) -> Result<()> {
    let connector = connect_uri(url)?;
    let started = Instant::now();

    let table = read(connector, options).await.context("Read failed")?;
    let batch = table.to_record_batch()?;

    match output {
        Some(path) => {
            sink::write_parquet(path, &batch)?;
            println!("Wrote {} rows to {:?}", batch.num_rows(), path);
        }
        None => println!("{}", pretty_format_batches(&[batch])?),
    }
    info!("Done in {:?}", started.elapsed());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parload_connectors::PartitionOptions;
    use parload_core::LoadError;
    use tempfile::TempDir;

    fn config() -> CliConfig {
        CliConfig {
            database_url: None,
            partitions: 4,
            log: "info".to_string(),
        }
    }

    fn partition_args(args: &[&str]) -> PartitionArgs {
        let mut argv = vec!["parload", "plan", "--query", "SELECT * FROM test_table"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Plan { partition, .. } => partition,
            Commands::Read { .. } => unreachable!(),
        }
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("0,2000"), Ok((0, 2000)));
        assert_eq!(parse_range(" -10 , 5 "), Ok((-10, 5)));
        assert!(parse_range("10").is_err());
        assert!(parse_range("a,b").is_err());
    }

    #[test]
    fn test_cli_parses_read() {
        let cli = Cli::try_parse_from([
            "parload",
            "read",
            "--query",
            "SELECT * FROM test_table",
            "--url",
            "postgres://localhost/db",
            "--partition-on",
            "test_int",
            "--range=0,2000",
            "--partitions",
            "3",
            "--index-col",
            "test_bool",
        ])
        .unwrap();
        match cli.command {
            Commands::Read {
                query,
                partition,
                index_col,
                ..
            } => {
                assert_eq!(query.as_deref(), Some("SELECT * FROM test_table"));
                assert_eq!(partition.partition_on.as_deref(), Some("test_int"));
                assert_eq!(partition.range, Some((0, 2000)));
                assert_eq!(partition.partitions, Some(3));
                assert_eq!(index_col.as_deref(), Some("test_bool"));
            }
            Commands::Plan { .. } => panic!("expected read"),
        }
    }

    #[test]
    fn test_cli_read_requires_query_or_job() {
        assert!(Cli::try_parse_from(["parload", "read"]).is_err());
        assert!(Cli::try_parse_from(["parload", "read", "--job", "job.json"]).is_ok());
    }

    #[test]
    fn test_build_options_uses_default_partition_count() {
        let args = partition_args(&["--partition-on", "test_int", "--range=0,2000"]);
        let options =
            build_options(Some("SELECT 1".to_string()), None, &args, None, &config()).unwrap();
        assert_eq!(
            options.partition,
            Some(PartitionOptions {
                column: "test_int".to_string(),
                range: Some((0, 2000)),
                num: 4,
                include_outside: false,
            })
        );
    }

    #[test]
    fn test_build_options_rejects_orphan_partition_flags() {
        let args = partition_args(&["--partitions", "3"]);
        let err = build_options(Some("SELECT 1".to_string()), None, &args, None, &config())
            .unwrap_err();
        assert!(err.to_string().contains("--partition-on"));
    }

    #[test]
    fn test_build_options_surfaces_planner_errors() {
        let args = partition_args(&["--partition-on", "id", "--range=0,10", "--partitions", "0"]);
        let err = build_options(Some("SELECT 1".to_string()), None, &args, None, &config())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::InvalidPartitionCount(0))
        ));
    }

    #[test]
    fn test_build_options_from_job_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(
            &path,
            r#"{
                "query": "SELECT * FROM test_table",
                "partition": {"column": "test_int", "range": [0, 2000], "num": 3}
            }"#,
        )
        .unwrap();

        let options = build_options(
            None,
            Some(&path),
            &PartitionArgs::default(),
            Some("test_bool".to_string()),
            &config(),
        )
        .unwrap();
        assert_eq!(options.query, "SELECT * FROM test_table");
        assert_eq!(options.partition.as_ref().map(|p| p.num), Some(3));
        assert_eq!(options.index_column.as_deref(), Some("test_bool"));
    }

    #[test]
    fn test_build_options_bad_job_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(&path, "{not json").unwrap();
        let result = build_options(None, Some(&path), &PartitionArgs::default(), None, &config());
        assert!(result.is_err());
    }

    #[test]
    fn test_plan_queries() {
        let args = partition_args(&[
            "--partition-on",
            "test_int",
            "--range=0,2000",
            "--partitions",
            "3",
            "--include-outside",
        ]);
        let options = build_options(
            Some("SELECT * FROM test_table;".to_string()),
            None,
            &args,
            None,
            &config(),
        )
        .unwrap();
        let queries = plan_queries(&options).unwrap();
        assert_eq!(queries.len(), 4);
        assert_eq!(
            queries[0],
            "SELECT * FROM (SELECT * FROM test_table\n) AS __parload_part \
             WHERE \"test_int\" >= 0 AND \"test_int\" < 667"
        );
        assert!(queries[2].ends_with("\"test_int\" >= 1334 AND \"test_int\" <= 2000"));
        assert!(queries[3].contains("IS NULL"));
    }

    #[test]
    fn test_plan_queries_requires_range() {
        let args = partition_args(&["--partition-on", "test_int"]);
        let options =
            build_options(Some("SELECT 1".to_string()), None, &args, None, &config()).unwrap();
        assert!(plan_queries(&options).is_err());
    }
}
