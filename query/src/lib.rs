pub mod cli;
pub mod export;
pub mod results;
pub mod runner;
pub mod service;

use aws_config::BehaviorVersion;
use common::Result;
use common::config::QuerySettings;
use runner::QueryRunner;
use service::AthenaQueryService;
use std::sync::Arc;

/// Builds a runner backed by Athena using the ambient AWS configuration.
pub async fn connect_athena(settings: &QuerySettings) -> Result<QueryRunner> {
    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let service = AthenaQueryService::new(aws_sdk_athena::Client::new(&sdk_config));
    Ok(QueryRunner::new(Arc::new(service), settings.poll_policy())
        .with_sync_policy(settings.sync_poll_policy()))
}
