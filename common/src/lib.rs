use arrow::error::ArrowError;
use aws_smithy_runtime_api::client::result::CreateUnhandledError;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use parquet::errors::ParquetError;
use datafusion::error::DataFusionError;
use thiserror::Error;
use url::ParseError;

pub mod config;
pub mod logging;
pub mod poll;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to upload {path} to s3://{bucket}/{key}: {reason}")]
    Transfer {
        path: String,
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Failed to write dataset to {destination}: {reason}")]
    Write { destination: String, reason: String },

    #[error("Crawler {name} finished with status {status}")]
    CrawlFailed { name: String, status: String },

    #[error("Timed out waiting for crawler {name} after {attempts} checks")]
    CrawlTimeout { name: String, attempts: u32 },

    #[error("Query {execution_id} finished with state {state}")]
    QueryFailed { execution_id: String, state: String },

    #[error("Timed out waiting for query {execution_id} after {attempts} checks")]
    QueryTimeout { execution_id: String, attempts: u32 },

    #[error("Invalid date '{0}', expected format YYYY-MM-DD")]
    InvalidDate(String),

    #[error("A SQL query is required via --query or --query-file")]
    MissingQuery,

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

// Covers every AWS SDK operation error (S3, Glue, Athena)
impl<E: std::fmt::Debug + CreateUnhandledError> From<SdkError<E, Response>> for Error {
    fn from(err: SdkError<E, Response>) -> Self {
        Error::AwsSdk(format!("{:?}", err))
    }
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        Error::Other(format!("Object store error: {}", err))
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidInput(format!("URL parse error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_store_failures_keep_their_context() {
        let err: Error = object_store::Error::NotFound {
            path: "processed/vendas".to_string(),
            source: "missing".into(),
        }
        .into();

        assert!(matches!(err, Error::Other(ref msg) if msg.starts_with("Object store error")));
        assert!(err.to_string().contains("processed/vendas"));
    }

    #[test]
    fn test_bad_urls_are_invalid_input() {
        let err: Error = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
