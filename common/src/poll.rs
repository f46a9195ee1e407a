use crate::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Fixed-interval polling budget. Total wait is bounded by `interval * max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub fn from_secs(interval_secs: u64, max_attempts: u32) -> Self {
        Self::new(Duration::from_secs(interval_secs), max_attempts)
    }

    /// Keeps checking until a terminal status shows up.
    pub fn unbounded(interval: Duration) -> Self {
        Self::new(interval, u32::MAX)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// A terminal status was observed on check number `attempts`.
    Terminal { status: T, attempts: u32 },
    /// The budget ran out; `last` is the status seen on the final check.
    TimedOut { last: Option<T>, attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Terminal { attempts, .. } | PollOutcome::TimedOut { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Calls `check` until `is_terminal` accepts its status or `max_attempts` checks
/// have been made. Sleeps `interval` between checks. A failing check ends the
/// loop with its error.
pub async fn poll_until<T, F, Fut, P>(
    policy: PollPolicy,
    mut check: F,
    is_terminal: P,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let mut last = None;

    for attempt in 1..=policy.max_attempts {
        let status = check().await?;
        if is_terminal(&status) {
            return Ok(PollOutcome::Terminal {
                status,
                attempts: attempt,
            });
        }
        last = Some(status);

        if attempt < policy.max_attempts {
            sleep(policy.interval).await;
        }
    }

    Ok(PollOutcome::TimedOut {
        last,
        attempts: policy.max_attempts,
    })
}
