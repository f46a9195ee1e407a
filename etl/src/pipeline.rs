use crate::crawler::{CrawlerRunner, GlueCrawler, LastCrawlStatus};
use crate::extract::DataExtractor;
use crate::paths::{PathBuilder, bucket_root};
use crate::storage::S3Manager;
use crate::storage::s3::{ObjectStorage, S3Storage};
use crate::transform::{DataTransformer, PartitionKey};
use crate::writer::PartitionedWriter;
use aws_config::BehaviorVersion;
use common::config::EtlSettings;
use common::{Error, Result};
use datafusion::prelude::SessionContext;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub rows_extracted: usize,
    pub rows_written: usize,
    pub raw_key: String,
    pub processed_uri: String,
    pub partition_columns: Vec<String>,
    pub crawl_status: LastCrawlStatus,
}

/// extract -> upload raw -> transform -> write Parquet -> crawl.
/// The first failing stage ends the run; completed stages are not undone.
pub struct EtlPipeline {
    extractor: DataExtractor,
    transformer: DataTransformer,
    writer: PartitionedWriter,
    raw_storage: Arc<dyn ObjectStorage>,
    crawler: CrawlerRunner,
    processed_root: String,
    crawler_name: String,
}

impl EtlPipeline {
    /// `processed_root` is the storage root the `processed/` tree is written
    /// under, e.g. `s3://bucket`; it must be resolvable by `ctx`.
    pub fn new(
        ctx: SessionContext,
        raw_storage: Arc<dyn ObjectStorage>,
        crawler: CrawlerRunner,
        processed_root: &str,
        crawler_name: &str,
    ) -> Self {
        Self {
            extractor: DataExtractor::new(ctx),
            transformer: DataTransformer::new(),
            writer: PartitionedWriter::new(),
            raw_storage,
            crawler,
            processed_root: processed_root.to_string(),
            crawler_name: crawler_name.to_string(),
        }
    }

    /// Wires S3, the processed-bucket object store and Glue from the ambient
    /// AWS configuration.
    pub async fn from_settings(settings: &EtlSettings) -> Result<Self> {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;

        let s3_manager = S3Manager::new(&sdk_config, settings.s3_endpoint.clone());
        let ctx = SessionContext::new();
        s3_manager.register_object_store(&ctx, &settings.processed_bucket)?;

        let raw_storage = Arc::new(S3Storage::new(s3_manager.client(), &settings.raw_bucket));
        let glue = GlueCrawler::new(aws_sdk_glue::Client::new(&sdk_config));
        let crawler = CrawlerRunner::new(Arc::new(glue), settings.crawler_poll_policy());

        Ok(Self::new(
            ctx,
            raw_storage,
            crawler,
            &bucket_root(&settings.processed_bucket),
            &settings.crawler_name,
        ))
    }

    pub async fn run(&self, csv_path: &Path, partition: &PartitionKey) -> Result<PipelineReport> {
        if !csv_path.exists() {
            error!(file = %csv_path.display(), "File not found");
            return Err(Error::Read {
                path: csv_path.display().to_string(),
                reason: "file not found".to_string(),
            });
        }

        let paths = PathBuilder::from_source(csv_path, partition)?;

        info!("1. Extracting data...");
        let extracted = self.extractor.extract(csv_path).await?;
        let rows_extracted = extracted.rows;

        info!("2. Uploading raw data to S3...");
        let raw_key = paths.build_raw_key();
        self.raw_storage.upload_file(csv_path, &raw_key).await?;

        info!("3. Transforming data...");
        let df = self
            .transformer
            .transform(extracted.data, partition)
            .await?
            .cache()
            .await?;
        let rows_written = df.clone().count().await?;

        info!("4. Writing processed data as Parquet...");
        let processed_uri = paths.build_processed_uri(&self.processed_root);
        let partition_columns = self
            .writer
            .write(df, &processed_uri, &PartitionedWriter::default_partition_columns())
            .await?;

        info!("5. Running crawler to update the catalog...");
        let crawl_status = self.crawler.run(&self.crawler_name).await?;

        info!(
            rows_extracted,
            rows_written,
            raw = %format!("s3://{}/{}", self.raw_storage.bucket(), raw_key),
            processed = %processed_uri,
            "ETL pipeline completed"
        );

        Ok(PipelineReport {
            rows_extracted,
            rows_written,
            raw_key,
            processed_uri,
            partition_columns,
            crawl_status,
        })
    }
}
