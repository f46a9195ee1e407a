use crate::poll::PollPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Process environment captured once at an entry point.
pub type EnvSnapshot = HashMap<String, String>;

pub const DEFAULT_RAW_BUCKET: &str = "seu-bucket-raw-data";
pub const DEFAULT_PROCESSED_BUCKET: &str = "seu-bucket-processed-data";
pub const DEFAULT_CRAWLER_NAME: &str = "meu-crawler-parquet";
pub const DEFAULT_DATABASE: &str = "meu_database";
pub const DEFAULT_RESULTS_LOCATION: &str = "s3://seu-bucket-athena-results/";

/// Loads `.env` from the working directory (if any) and snapshots the environment.
pub fn capture_env() -> EnvSnapshot {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded .env file");
    }
    std::env::vars().collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EtlSettings {
    pub raw_bucket: String,
    pub processed_bucket: String,
    #[serde(rename = "glue_crawler_name")]
    pub crawler_name: String,
    pub crawler_poll_interval_secs: u64,
    pub crawler_max_attempts: u32,
    #[serde(default, rename = "aws_endpoint_url_s3")]
    pub s3_endpoint: Option<String>,
}

/// Values given explicitly on the command line.
#[derive(Debug, Default, Clone)]
pub struct EtlOverrides {
    pub raw_bucket: Option<String>,
    pub processed_bucket: Option<String>,
    pub crawler_name: Option<String>,
}

impl EtlSettings {
    /// Precedence: explicit override > environment > config file > default.
    pub fn resolve(
        env: &EnvSnapshot,
        overrides: &EtlOverrides,
        config_file: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("raw_bucket", DEFAULT_RAW_BUCKET)?
            .set_default("processed_bucket", DEFAULT_PROCESSED_BUCKET)?
            .set_default("glue_crawler_name", DEFAULT_CRAWLER_NAME)?
            .set_default("crawler_poll_interval_secs", 30i64)?
            .set_default("crawler_max_attempts", 20i64)?;

        if let Some(path) = config_file {
            builder = builder.add_source(File::with_name(path));
        }

        let settings: EtlSettings = builder
            .add_source(environment(env))
            .set_override_option("raw_bucket", overrides.raw_bucket.clone())?
            .set_override_option("processed_bucket", overrides.processed_bucket.clone())?
            .set_override_option("glue_crawler_name", overrides.crawler_name.clone())?
            .build()?
            .try_deserialize()?;

        debug!(
            raw_bucket = %settings.raw_bucket,
            processed_bucket = %settings.processed_bucket,
            crawler = %settings.crawler_name,
            "Resolved ETL settings"
        );

        Ok(settings)
    }

    pub fn crawler_poll_policy(&self) -> PollPolicy {
        PollPolicy::from_secs(self.crawler_poll_interval_secs, self.crawler_max_attempts)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuerySettings {
    #[serde(rename = "glue_database")]
    pub database: String,
    #[serde(rename = "athena_results_bucket")]
    pub results_location: String,
    pub query_poll_interval_secs: u64,
    pub query_max_attempts: u32,
    /// Budget for waits in synchronous runs; unset means wait until done.
    #[serde(default)]
    pub query_sync_max_attempts: Option<u32>,
    #[serde(default, rename = "athena_workgroup")]
    pub workgroup: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct QueryOverrides {
    pub database: Option<String>,
    pub results_location: Option<String>,
}

impl QuerySettings {
    /// Same precedence as [`EtlSettings::resolve`]; the results location is
    /// normalized before returning.
    pub fn resolve(
        env: &EnvSnapshot,
        overrides: &QueryOverrides,
        config_file: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("glue_database", DEFAULT_DATABASE)?
            .set_default("athena_results_bucket", DEFAULT_RESULTS_LOCATION)?
            .set_default("query_poll_interval_secs", 1i64)?
            .set_default("query_max_attempts", 100i64)?;

        if let Some(path) = config_file {
            builder = builder.add_source(File::with_name(path));
        }

        let mut settings: QuerySettings = builder
            .add_source(environment(env))
            .set_override_option("glue_database", overrides.database.clone())?
            .set_override_option("athena_results_bucket", overrides.results_location.clone())?
            .build()?
            .try_deserialize()?;

        settings.results_location = normalize_result_location(&settings.results_location);

        debug!(
            database = %settings.database,
            results_location = %settings.results_location,
            "Resolved query settings"
        );

        Ok(settings)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::from_secs(self.query_poll_interval_secs, self.query_max_attempts)
    }

    pub fn sync_poll_policy(&self) -> PollPolicy {
        let interval = Duration::from_secs(self.query_poll_interval_secs);
        match self.query_sync_max_attempts {
            Some(max_attempts) => PollPolicy::new(interval, max_attempts),
            None => PollPolicy::unbounded(interval),
        }
    }
}

fn environment(env: &EnvSnapshot) -> Environment {
    Environment::default()
        .source(Some(env.clone()))
        .ignore_empty(true)
}

/// Ensures a trailing `/` and an `s3://` scheme. Idempotent; empty input is
/// returned as is.
pub fn normalize_result_location(location: &str) -> String {
    if location.is_empty() {
        return String::new();
    }

    let mut normalized = location.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    if !normalized.starts_with("s3://") {
        normalized = format!("s3://{}", normalized);
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> EnvSnapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_etl_defaults_when_nothing_is_set() {
        let settings = EtlSettings::resolve(&EnvSnapshot::new(), &EtlOverrides::default(), None)
            .unwrap();
        assert_eq!(settings.raw_bucket, DEFAULT_RAW_BUCKET);
        assert_eq!(settings.processed_bucket, DEFAULT_PROCESSED_BUCKET);
        assert_eq!(settings.crawler_name, DEFAULT_CRAWLER_NAME);
        assert_eq!(settings.crawler_poll_policy(), PollPolicy::from_secs(30, 20));
        assert!(settings.s3_endpoint.is_none());
    }

    #[test]
    fn test_etl_env_then_override_precedence() {
        let env = env(&[
            ("RAW_BUCKET", "env-raw"),
            ("PROCESSED_BUCKET", "env-processed"),
            ("GLUE_CRAWLER_NAME", "env-crawler"),
            ("CRAWLER_MAX_ATTEMPTS", "5"),
        ]);
        let overrides = EtlOverrides {
            raw_bucket: Some("cli-raw".into()),
            ..Default::default()
        };

        let settings = EtlSettings::resolve(&env, &overrides, None).unwrap();
        assert_eq!(settings.raw_bucket, "cli-raw");
        assert_eq!(settings.processed_bucket, "env-processed");
        assert_eq!(settings.crawler_name, "env-crawler");
        assert_eq!(settings.crawler_max_attempts, 5);
    }

    #[test]
    fn test_empty_env_value_falls_back_to_default() {
        let env = env(&[("RAW_BUCKET", "")]);
        let settings = EtlSettings::resolve(&env, &EtlOverrides::default(), None).unwrap();
        assert_eq!(settings.raw_bucket, DEFAULT_RAW_BUCKET);
    }

    #[test]
    fn test_config_file_sits_below_env() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "raw_bucket = \"file-raw\"\nprocessed_bucket = \"file-processed\"").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let env = env(&[("PROCESSED_BUCKET", "env-processed")]);
        let settings =
            EtlSettings::resolve(&env, &EtlOverrides::default(), Some(&path)).unwrap();
        assert_eq!(settings.raw_bucket, "file-raw");
        assert_eq!(settings.processed_bucket, "env-processed");
    }

    #[test]
    fn test_query_settings_normalize_location() {
        let env = env(&[
            ("GLUE_DATABASE", "vendas_db"),
            ("ATHENA_RESULTS_BUCKET", "my-results/athena"),
        ]);
        let settings = QuerySettings::resolve(&env, &QueryOverrides::default(), None).unwrap();
        assert_eq!(settings.database, "vendas_db");
        assert_eq!(settings.results_location, "s3://my-results/athena/");
        assert_eq!(settings.poll_policy(), PollPolicy::from_secs(1, 100));
        assert_eq!(
            settings.sync_poll_policy(),
            PollPolicy::unbounded(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_sync_budget_can_be_set() {
        let env = env(&[("QUERY_SYNC_MAX_ATTEMPTS", "600")]);
        let settings = QuerySettings::resolve(&env, &QueryOverrides::default(), None).unwrap();
        assert_eq!(settings.sync_poll_policy(), PollPolicy::from_secs(1, 600));
        assert_eq!(settings.poll_policy(), PollPolicy::from_secs(1, 100));
    }

    #[test]
    fn test_query_override_wins() {
        let env = env(&[("GLUE_DATABASE", "env_db")]);
        let overrides = QueryOverrides {
            database: Some("cli_db".into()),
            results_location: Some("s3://cli-bucket".into()),
        };
        let settings = QuerySettings::resolve(&env, &overrides, None).unwrap();
        assert_eq!(settings.database, "cli_db");
        assert_eq!(settings.results_location, "s3://cli-bucket/");
    }

    #[test]
    fn test_normalize_result_location() {
        assert_eq!(normalize_result_location("bucket"), "s3://bucket/");
        assert_eq!(normalize_result_location("bucket/"), "s3://bucket/");
        assert_eq!(normalize_result_location("s3://bucket"), "s3://bucket/");
        assert_eq!(normalize_result_location("s3://bucket/x/"), "s3://bucket/x/");
        assert_eq!(normalize_result_location(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for input in ["bucket", "bucket/prefix", "s3://b", "s3://b/p/", "/leading", ""] {
            let once = normalize_result_location(input);
            assert_eq!(normalize_result_location(&once), once, "input: {input}");
        }
    }
}
