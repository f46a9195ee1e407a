use common::{Error, Result};
use datafusion::prelude::*;
use std::path::Path;
use tracing::{error, info};

/// Extracted rows held in memory, so later stages do not reread the file.
pub struct Extracted {
    pub data: DataFrame,
    pub rows: usize,
}

pub struct DataExtractor {
    ctx: SessionContext,
}

impl DataExtractor {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    /// Reads a headered CSV file, inferring the column types.
    pub async fn extract(&self, source: &Path) -> Result<Extracted> {
        let path = source.display().to_string();
        info!(source = %path, "Extracting data");

        let (data, rows) = self.load(source).await.map_err(|e| {
            error!(source = %path, error = %e, "Extraction failed");
            Error::Read {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        info!(source = %path, rows, "Data extracted");

        Ok(Extracted { data, rows })
    }

    /// Scans the file once; the returned frame reads from memory.
    async fn load(&self, source: &Path) -> Result<(DataFrame, usize)> {
        let data = self.read_csv(source).await?.cache().await?;
        let rows = data.clone().count().await?;
        Ok((data, rows))
    }

    async fn read_csv(&self, source: &Path) -> Result<DataFrame> {
        if !source.is_file() {
            return Err(Error::InvalidInput("file not found".to_string()));
        }

        // The listing table filters by extension, so match whatever the file uses
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        let location = source
            .to_str()
            .ok_or_else(|| Error::InvalidInput("path is not valid UTF-8".to_string()))?;

        let options = CsvReadOptions::new()
            .has_header(true)
            .file_extension(&extension);

        Ok(self.ctx.read_csv(location, options).await?)
    }
}
