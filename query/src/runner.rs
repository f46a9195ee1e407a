use crate::results::QueryResults;
use crate::service::{QueryRequest, QueryService, QueryState};
use common::poll::{PollOutcome, PollPolicy, poll_until};
use common::{Error, Result};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CompletedQuery {
    pub execution_id: String,
    pub results: QueryResults,
}

pub struct QueryRunner {
    service: Arc<dyn QueryService>,
    policy: PollPolicy,
    sync_policy: PollPolicy,
}

impl QueryRunner {
    /// `policy` bounds waits on existing executions. Synchronous runs wait
    /// without a budget unless [`QueryRunner::with_sync_policy`] sets one.
    pub fn new(service: Arc<dyn QueryService>, policy: PollPolicy) -> Self {
        Self {
            service,
            policy,
            sync_policy: PollPolicy::unbounded(policy.interval),
        }
    }

    pub fn with_sync_policy(mut self, sync_policy: PollPolicy) -> Self {
        self.sync_policy = sync_policy;
        self
    }

    /// Submits, waits until the query finishes and fetches.
    pub async fn run(&self, request: &QueryRequest) -> Result<CompletedQuery> {
        let execution_id = self.submit(request).await?;
        self.wait_with(&execution_id, self.sync_policy).await?;
        let results = self.fetch_results(&execution_id).await?;
        info!(
            execution_id = %execution_id,
            rows = results.num_rows(),
            "Query executed successfully"
        );
        Ok(CompletedQuery {
            execution_id,
            results,
        })
    }

    /// Starts the query without waiting for it.
    pub async fn submit(&self, request: &QueryRequest) -> Result<String> {
        self.service.start_query(request).await
    }

    pub async fn wait_for_completion(&self, execution_id: &str) -> Result<()> {
        self.wait_with(execution_id, self.policy).await
    }

    async fn wait_with(&self, execution_id: &str, policy: PollPolicy) -> Result<()> {
        info!(execution_id, "Waiting for query to complete");
        let service = self.service.as_ref();
        let interval = policy.interval;

        let outcome = poll_until(
            policy,
            move || async move {
                let state = service.query_state(execution_id).await?;
                if !state.is_terminal() {
                    info!(
                        execution_id,
                        state = %state,
                        wait_secs = interval.as_secs_f64(),
                        "Query still running"
                    );
                }
                Ok::<_, Error>(state)
            },
            QueryState::is_terminal,
        )
        .await?;

        match outcome {
            PollOutcome::Terminal {
                status: QueryState::Succeeded,
                ..
            } => {
                info!(execution_id, state = "SUCCEEDED", "Query completed");
                Ok(())
            }
            PollOutcome::Terminal { status, .. } => {
                warn!(execution_id, state = %status, "Query did not succeed");
                Err(Error::QueryFailed {
                    execution_id: execution_id.to_string(),
                    state: status.to_string(),
                })
            }
            PollOutcome::TimedOut { attempts, .. } => {
                warn!(execution_id, attempts, "Timed out waiting for query");
                Err(Error::QueryTimeout {
                    execution_id: execution_id.to_string(),
                    attempts,
                })
            }
        }
    }

    pub async fn fetch_results(&self, execution_id: &str) -> Result<QueryResults> {
        self.service.fetch_results(execution_id).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::results::ColumnSpec;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Replays states in order, repeating the last one once exhausted.
    pub(crate) struct ScriptedService {
        states: Mutex<VecDeque<QueryState>>,
        pub submitted: Mutex<Vec<QueryRequest>>,
        pub state_calls: AtomicU32,
    }

    impl ScriptedService {
        pub(crate) fn new(states: Vec<QueryState>) -> Self {
            Self {
                states: Mutex::new(states.into()),
                submitted: Mutex::new(Vec::new()),
                state_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl QueryService for ScriptedService {
        async fn start_query(&self, request: &QueryRequest) -> Result<String> {
            self.submitted.lock().unwrap().push(request.clone());
            Ok("exec-123".to_string())
        }

        async fn query_state(&self, _execution_id: &str) -> Result<QueryState> {
            self.state_calls.fetch_add(1, Ordering::SeqCst);
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                Ok(states.pop_front().unwrap())
            } else {
                Ok(*states.front().unwrap())
            }
        }

        async fn fetch_results(&self, _execution_id: &str) -> Result<QueryResults> {
            QueryResults::from_rows(
                &[ColumnSpec::new("id", "bigint")],
                &[vec![Some("1".into())], vec![Some("2".into())]],
            )
        }
    }

    fn request() -> QueryRequest {
        QueryRequest {
            sql: "SELECT id FROM vendas".into(),
            database: "meu_database".into(),
            output_location: "s3://results/".into(),
            workgroup: None,
        }
    }

    fn runner(service: Arc<ScriptedService>, max_attempts: u32) -> QueryRunner {
        QueryRunner::new(service, PollPolicy::new(Duration::ZERO, max_attempts))
    }

    #[tokio::test]
    async fn test_run_waits_through_queued_and_running() {
        let service = Arc::new(ScriptedService::new(vec![
            QueryState::Queued,
            QueryState::Running,
            QueryState::Succeeded,
        ]));

        let completed = runner(service.clone(), 100).run(&request()).await.unwrap();

        assert_eq!(completed.execution_id, "exec-123");
        assert_eq!(completed.results.num_rows(), 2);
        assert_eq!(service.state_calls.load(Ordering::SeqCst), 3);
        assert_eq!(service.submitted.lock().unwrap()[0].database, "meu_database");
    }

    #[tokio::test]
    async fn test_sync_run_outlasts_the_wait_budget() {
        let mut states = vec![QueryState::Running; 150];
        states.push(QueryState::Succeeded);
        let service = Arc::new(ScriptedService::new(states));

        let completed = runner(service.clone(), 100).run(&request()).await.unwrap();

        assert_eq!(completed.results.num_rows(), 2);
        assert_eq!(service.state_calls.load(Ordering::SeqCst), 151);
    }

    #[tokio::test]
    async fn test_sync_budget_is_configurable() {
        let service = Arc::new(ScriptedService::new(vec![QueryState::Running]));

        let result = runner(service.clone(), 100)
            .with_sync_policy(PollPolicy::new(Duration::ZERO, 12))
            .run(&request())
            .await;

        assert!(matches!(result, Err(Error::QueryTimeout { attempts: 12, .. })));
        assert_eq!(service.state_calls.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn test_failed_and_cancelled_are_failures() {
        for terminal in [QueryState::Failed, QueryState::Cancelled] {
            let service = Arc::new(ScriptedService::new(vec![QueryState::Running, terminal]));

            let result = runner(service, 100).wait_for_completion("exec-123").await;
            assert!(matches!(
                result,
                Err(Error::QueryFailed { ref state, .. }) if *state == terminal.to_string()
            ));
        }
    }

    #[tokio::test]
    async fn test_times_out_after_budget() {
        let service = Arc::new(ScriptedService::new(vec![QueryState::Running]));

        let result = runner(service.clone(), 7).wait_for_completion("exec-123").await;

        assert!(matches!(result, Err(Error::QueryTimeout { attempts: 7, .. })));
        assert_eq!(service.state_calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_submit_does_not_poll() {
        let service = Arc::new(ScriptedService::new(vec![QueryState::Running]));

        let id = runner(service.clone(), 100).submit(&request()).await.unwrap();

        assert_eq!(id, "exec-123");
        assert_eq!(service.state_calls.load(Ordering::SeqCst), 0);
    }
}
