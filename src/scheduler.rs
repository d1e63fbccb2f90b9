//! Self-rescheduling task runner.
//!
//! Each registered task is a run-to-completion unit that reports how long
//! to wait before its next run. The runner owns the retry policy: on task
//! error the delay doubles from one second up to a minute, and resets on
//! the next success. Reconciliation logic itself stays a pure "run once,
//! return outcome" unit and never computes failure delays.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{error, info};

use crate::error::GiftError;

pub const MIN_ERROR_DELAY: Duration = Duration::from_secs(1);
pub const MAX_ERROR_DELAY: Duration = Duration::from_secs(60);
const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// What a completed task run asks of the scheduler.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Optional human-readable summary, logged under the task's name.
    pub message: Option<String>,
    /// Delay before the next run.
    pub repeat_after: Duration,
}

/// A run-to-completion unit of background work.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self) -> Result<TaskOutcome, GiftError>;
}

/// Next delay after a failed run: exponential, clamped to [1s, 60s].
pub fn next_error_delay(last: Option<Duration>) -> Duration {
    match last {
        None => MIN_ERROR_DELAY,
        Some(d) => (d * 2).clamp(MIN_ERROR_DELAY, MAX_ERROR_DELAY),
    }
}

/// Run every task until shutdown is signalled. In-flight runs are drained,
/// never cancelled mid-transaction; only the waits in between are
/// interruptible.
pub async fn run(tasks: Vec<Arc<dyn Task>>, shutdown: watch::Receiver<bool>) {
    let mut handles = Vec::with_capacity(tasks.len());
    for task in tasks {
        handles.push(tokio::spawn(task_loop(task, shutdown.clone())));
    }
    for handle in handles {
        // A panicking task loop is a bug; surface it instead of hanging.
        if let Err(err) = handle.await {
            error!("task loop terminated abnormally: {err}");
        }
    }
}

async fn task_loop(task: Arc<dyn Task>, mut shutdown: watch::Receiver<bool>) {
    let name = task.name();
    let mut error_delay: Option<Duration> = None;
    let mut successes = 0u64;
    let mut failures = 0u64;
    let mut stats_printed = Instant::now();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let delay = match task.run().await {
            Ok(outcome) => {
                successes += 1;
                error_delay = None;
                if let Some(message) = outcome.message {
                    info!("[{name}]: {message}");
                }
                outcome.repeat_after
            }
            Err(err) => {
                failures += 1;
                let delay = next_error_delay(error_delay);
                error_delay = Some(delay);
                error!("[{name}] failed (next attempt in {delay:?}): {err}");
                delay
            }
        };

        if stats_printed.elapsed() > STATS_INTERVAL {
            info!("[{name}]: {successes} OK, {failures} FAIL");
            successes = 0;
            failures = 0;
            stats_printed = Instant::now();
        }

        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.changed() => {}
        }
    }

    info!("[{name}] stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_error_delay_doubles_and_clamps() {
        let mut delay = None;
        let mut seen = Vec::new();
        for _ in 0..8 {
            let next = next_error_delay(delay);
            seen.push(next.as_secs());
            delay = Some(next);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    struct CountingTask {
        runs: AtomicU32,
        stop_after: u32,
        shutdown_tx: watch::Sender<bool>,
    }

    #[async_trait]
    impl Task for CountingTask {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self) -> Result<TaskOutcome, GiftError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.stop_after {
                let _ = self.shutdown_tx.send(true);
            }
            Ok(TaskOutcome {
                message: None,
                repeat_after: Duration::from_millis(10),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_drains_and_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let task = Arc::new(CountingTask {
            runs: AtomicU32::new(0),
            stop_after: 3,
            shutdown_tx: tx,
        });

        run(vec![task.clone() as Arc<dyn Task>], rx).await;

        // The run that signalled shutdown completed; no further run started.
        assert_eq!(task.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_runner_exits_immediately_when_already_shut_down() {
        let (tx, rx) = watch::channel(true);
        let task = Arc::new(CountingTask {
            runs: AtomicU32::new(0),
            stop_after: u32::MAX,
            shutdown_tx: tx,
        });

        run(vec![task.clone() as Arc<dyn Task>], rx).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);
    }
}
