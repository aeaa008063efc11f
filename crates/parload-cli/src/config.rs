//! CLI configuration from environment variables.

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// Source URI used when `--url` is not given.
    pub database_url: Option<String>,
    /// Partition count used when `--partition-on` is given without `--partitions`.
    pub partitions: usize,
    /// Log filter directive, e.g. `debug` or `parload_connectors=trace`.
    pub log: String,
}

impl CliConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: std::env::var("PARLOAD_DATABASE_URL").ok(),
            partitions: std::env::var("PARLOAD_PARTITIONS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("Invalid PARLOAD_PARTITIONS")?,
            log: std::env::var("PARLOAD_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// The log directive after applying `--verbose`.
    pub fn log_directive(&self, verbose: bool) -> &str {
        if verbose {
            "debug"
        } else {
            &self.log
        }
    }
}
