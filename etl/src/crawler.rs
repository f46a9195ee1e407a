use async_trait::async_trait;
use aws_sdk_glue::Client as GlueClient;
use aws_sdk_glue::types::{CrawlerState, LastCrawlStatus as GlueLastCrawlStatus};
use common::poll::{PollOutcome, PollPolicy, poll_until};
use common::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlState {
    Ready,
    Running,
    Stopping,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastCrawlStatus {
    Succeeded,
    Failed,
    Cancelled,
    Unknown(String),
}

impl fmt::Display for LastCrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastCrawlStatus::Succeeded => write!(f, "SUCCEEDED"),
            LastCrawlStatus::Failed => write!(f, "FAILED"),
            LastCrawlStatus::Cancelled => write!(f, "CANCELLED"),
            LastCrawlStatus::Unknown(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlerSnapshot {
    pub state: CrawlState,
    pub last_crawl: Option<LastCrawlStatus>,
}

impl CrawlerSnapshot {
    pub fn is_running(&self) -> bool {
        self.state == CrawlState::Running
    }
}

/// A metadata-catalog crawl service. The crawler is configured externally;
/// this only observes and starts it.
#[async_trait]
pub trait CatalogCrawler: Send + Sync {
    async fn crawler_status(&self, name: &str) -> Result<CrawlerSnapshot>;
    async fn start_crawler(&self, name: &str) -> Result<()>;
}

pub struct GlueCrawler {
    client: GlueClient,
}

impl GlueCrawler {
    pub fn new(client: GlueClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CatalogCrawler for GlueCrawler {
    async fn crawler_status(&self, name: &str) -> Result<CrawlerSnapshot> {
        let response = self.client.get_crawler().name(name).send().await?;
        let crawler = response
            .crawler()
            .ok_or_else(|| Error::Other(format!("Crawler {} not found", name)))?;

        let state = match crawler.state() {
            Some(CrawlerState::Ready) => CrawlState::Ready,
            Some(CrawlerState::Running) => CrawlState::Running,
            Some(CrawlerState::Stopping) => CrawlState::Stopping,
            Some(other) => CrawlState::Unknown(other.as_str().to_string()),
            None => CrawlState::Unknown("UNKNOWN".to_string()),
        };

        let last_crawl = crawler
            .last_crawl()
            .and_then(|info| info.status())
            .map(|status| match status {
                GlueLastCrawlStatus::Succeeded => LastCrawlStatus::Succeeded,
                GlueLastCrawlStatus::Failed => LastCrawlStatus::Failed,
                GlueLastCrawlStatus::Cancelled => LastCrawlStatus::Cancelled,
                other => LastCrawlStatus::Unknown(other.as_str().to_string()),
            });

        Ok(CrawlerSnapshot { state, last_crawl })
    }

    async fn start_crawler(&self, name: &str) -> Result<()> {
        self.client.start_crawler().name(name).send().await?;
        Ok(())
    }
}

pub struct CrawlerRunner {
    catalog: Arc<dyn CatalogCrawler>,
    policy: PollPolicy,
}

impl CrawlerRunner {
    pub fn new(catalog: Arc<dyn CatalogCrawler>, policy: PollPolicy) -> Self {
        Self { catalog, policy }
    }

    /// Starts the crawler unless it is already running, then waits for it.
    pub async fn run(&self, name: &str) -> Result<LastCrawlStatus> {
        info!(crawler = name, "Running crawler");

        let current = self.catalog.crawler_status(name).await?;
        if current.is_running() {
            info!(crawler = name, "Crawler is already running, waiting for it");
        } else {
            self.catalog.start_crawler(name).await?;
        }

        self.wait_for_completion(name).await
    }

    /// Succeeds only when the crawler stops with a SUCCEEDED last crawl.
    pub async fn wait_for_completion(&self, name: &str) -> Result<LastCrawlStatus> {
        info!(crawler = name, "Waiting for crawler to finish");
        let catalog = self.catalog.as_ref();
        let interval = self.policy.interval;

        let outcome = poll_until(
            self.policy,
            move || async move {
                let snapshot = catalog.crawler_status(name).await?;
                if snapshot.is_running() {
                    info!(crawler = name, wait_secs = interval.as_secs(), "Crawler still running");
                }
                Ok::<_, Error>(snapshot)
            },
            |snapshot| !snapshot.is_running(),
        )
        .await?;

        match outcome {
            PollOutcome::Terminal { status, .. } => match status.last_crawl {
                Some(LastCrawlStatus::Succeeded) => {
                    info!(crawler = name, status = "SUCCEEDED", "Crawler finished");
                    Ok(LastCrawlStatus::Succeeded)
                }
                other => {
                    let status = other
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "UNKNOWN".to_string());
                    warn!(crawler = name, status = %status, "Crawler did not succeed");
                    Err(Error::CrawlFailed {
                        name: name.to_string(),
                        status,
                    })
                }
            },
            PollOutcome::TimedOut { attempts, .. } => {
                warn!(crawler = name, attempts, "Timed out waiting for crawler");
                Err(Error::CrawlTimeout {
                    name: name.to_string(),
                    attempts,
                })
            }
        }
    }
}
