use crate::transform::PartitionKey;
use common::{Error, Result};
use std::path::Path;

/// Builds the object-storage layout for one source file and partition date.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    file_stem: String,
    partition: PartitionKey,
}

impl PathBuilder {
    pub fn new(file_stem: &str, partition: &PartitionKey) -> Self {
        Self {
            file_stem: file_stem.to_string(),
            partition: partition.clone(),
        }
    }

    pub fn from_source(source: &Path, partition: &PartitionKey) -> Result<Self> {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Cannot derive a file name from '{}'",
                    source.display()
                ))
            })?;
        Ok(Self::new(stem, partition))
    }

    pub fn file_stem(&self) -> &str {
        &self.file_stem
    }

    /// `raw/<stem>/<year>/<month>/<day>/<stem>.csv`
    pub fn build_raw_key(&self) -> String {
        format!(
            "raw/{stem}/{}/{}/{}/{stem}.csv",
            self.partition.year,
            self.partition.month,
            self.partition.day,
            stem = self.file_stem
        )
    }

    /// `processed/<stem>/`
    pub fn build_processed_prefix(&self) -> String {
        format!("processed/{}/", self.file_stem)
    }

    /// Joins the processed prefix onto a storage root such as `s3://bucket`
    /// or a local directory.
    pub fn build_processed_uri(&self, root: &str) -> String {
        format!(
            "{}/{}",
            root.trim_end_matches('/'),
            self.build_processed_prefix()
        )
    }
}

pub fn bucket_root(bucket: &str) -> String {
    format!("s3://{}", bucket)
}
