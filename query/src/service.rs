use crate::results::{ColumnSpec, QueryResults};
use async_trait::async_trait;
use aws_sdk_athena::Client as AthenaClient;
use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration};
use common::{Error, Result};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub sql: String,
    pub database: String,
    pub output_location: String,
    pub workgroup: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Succeeded | QueryState::Failed | QueryState::Cancelled
        )
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Queued => "QUEUED",
            QueryState::Running => "RUNNING",
            QueryState::Succeeded => "SUCCEEDED",
            QueryState::Failed => "FAILED",
            QueryState::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// A managed SQL query service.
#[async_trait]
pub trait QueryService: Send + Sync {
    async fn start_query(&self, request: &QueryRequest) -> Result<String>;
    async fn query_state(&self, execution_id: &str) -> Result<QueryState>;
    async fn fetch_results(&self, execution_id: &str) -> Result<QueryResults>;
}

pub struct AthenaQueryService {
    client: AthenaClient,
}

impl AthenaQueryService {
    pub fn new(client: AthenaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueryService for AthenaQueryService {
    async fn start_query(&self, request: &QueryRequest) -> Result<String> {
        info!(database = %request.database, "Starting query");
        info!(output = %request.output_location, "Query results location");

        let context = QueryExecutionContext::builder()
            .database(&request.database)
            .build();
        let result_configuration = ResultConfiguration::builder()
            .output_location(&request.output_location)
            .build();

        let response = self
            .client
            .start_query_execution()
            .query_string(&request.sql)
            .query_execution_context(context)
            .result_configuration(result_configuration)
            .set_work_group(request.workgroup.clone())
            .send()
            .await?;

        let execution_id = response
            .query_execution_id()
            .map(str::to_string)
            .ok_or_else(|| Error::AwsSdk("StartQueryExecution returned no execution id".into()))?;

        info!(execution_id = %execution_id, "Query started");
        Ok(execution_id)
    }

    async fn query_state(&self, execution_id: &str) -> Result<QueryState> {
        let response = self
            .client
            .get_query_execution()
            .query_execution_id(execution_id)
            .send()
            .await?;

        let status = response.query_execution().and_then(|q| q.status());
        let state = match status.and_then(|s| s.state()) {
            Some(QueryExecutionState::Queued) => QueryState::Queued,
            Some(QueryExecutionState::Succeeded) => QueryState::Succeeded,
            Some(QueryExecutionState::Failed) => QueryState::Failed,
            Some(QueryExecutionState::Cancelled) => QueryState::Cancelled,
            // RUNNING and states this client does not know yet keep polling
            _ => QueryState::Running,
        };

        if let Some(reason) = status.and_then(|s| s.state_change_reason()) {
            if state == QueryState::Failed {
                warn!(execution_id, reason, "Query failed");
            } else {
                debug!(execution_id, reason, "Query state changed");
            }
        }

        Ok(state)
    }

    async fn fetch_results(&self, execution_id: &str) -> Result<QueryResults> {
        let mut columns: Vec<ColumnSpec> = Vec::new();
        let mut rows: Vec<Vec<Option<String>>> = Vec::new();
        let mut next_token: Option<String> = None;
        let mut first_page = true;

        loop {
            let response = self
                .client
                .get_query_results()
                .query_execution_id(execution_id)
                .set_next_token(next_token.take())
                .send()
                .await?;

            if let Some(result_set) = response.result_set() {
                if columns.is_empty() {
                    if let Some(metadata) = result_set.result_set_metadata() {
                        columns = metadata
                            .column_info()
                            .iter()
                            .map(|c| ColumnSpec::new(c.name(), c.r#type()))
                            .collect();
                    }
                }

                for (idx, row) in result_set.rows().iter().enumerate() {
                    let cells: Vec<Option<String>> = row
                        .data()
                        .iter()
                        .map(|d| d.var_char_value().map(str::to_string))
                        .collect();
                    if first_page && idx == 0 && is_header_row(&cells, &columns) {
                        continue;
                    }
                    rows.push(cells);
                }
            }

            first_page = false;
            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        let results = QueryResults::from_rows(&columns, &rows)?;
        info!(execution_id, rows = results.num_rows(), "Query results retrieved");
        Ok(results)
    }
}

/// SELECT results repeat the column labels as the first row of the first page.
fn is_header_row(cells: &[Option<String>], columns: &[ColumnSpec]) -> bool {
    !columns.is_empty()
        && cells.len() == columns.len()
        && cells
            .iter()
            .zip(columns)
            .all(|(cell, column)| cell.as_deref() == Some(column.name.as_str()))
}
