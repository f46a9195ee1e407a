use crate::transform::PARTITION_COLUMNS;
use common::{Error, Result};
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::prelude::*;
use tracing::{error, info, warn};

/// Writes a dataset as hive-partitioned Parquet (`col=value/.../*.parquet`).
#[derive(Default)]
pub struct PartitionedWriter;

impl PartitionedWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn default_partition_columns() -> Vec<String> {
        PARTITION_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    /// Returns the partition columns actually used; requested columns that do
    /// not exist in the dataset are dropped with a warning.
    pub async fn write(
        &self,
        df: DataFrame,
        destination: &str,
        partition_cols: &[String],
    ) -> Result<Vec<String>> {
        if df.schema().fields().is_empty() || df.clone().count().await? == 0 {
            return Err(Error::EmptyInput(format!(
                "nothing to write to {}",
                destination
            )));
        }

        let partition_by = existing_partition_columns(&df, partition_cols);

        // A trailing slash makes the destination a directory
        let destination = if destination.ends_with('/') {
            destination.to_string()
        } else {
            format!("{}/", destination)
        };

        info!(
            destination = %destination,
            partitions = ?partition_by,
            "Writing Parquet dataset"
        );

        let options = DataFrameWriteOptions::new().with_partition_by(partition_by.clone());
        df.write_parquet(&destination, options, None)
            .await
            .map_err(|e| {
                error!(destination = %destination, error = %e, "Parquet write failed");
                Error::Write {
                    destination: destination.clone(),
                    reason: e.to_string(),
                }
            })?;

        info!(destination = %destination, "Dataset written");
        Ok(partition_by)
    }
}

fn existing_partition_columns(df: &DataFrame, requested: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|name| {
            let present = df.schema().has_column_with_unqualified_name(name);
            if !present {
                warn!(column = %name, "Partition column not found in dataset, skipping it");
            }
            present
        })
        .cloned()
        .collect()
}
