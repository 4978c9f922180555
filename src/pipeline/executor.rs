//! Stage executor — runs exactly one stage and reports its outcome.
//!
//! The worker runs on a blocking thread bounded by a timeout; transient
//! failures retry with exponential backoff and jitter. Everything below this
//! layer is translated into a single success/failure outcome — nothing a
//! worker does is visible to clients except through run state.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use super::error::WorkerError;
use super::workers::{StageContext, StageWorker};

/// Tunables for stage execution. Defaults are production values; tests
/// shrink them to keep retries fast.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Retries after the first attempt before a transient failure turns fatal.
    pub max_stage_retries: u32,
    /// Base backoff; attempt n waits base * 2^n plus jitter.
    pub backoff_base_ms: u64,
    /// Per-invocation timeout. A timed-out stage counts as retryable.
    pub stage_timeout_secs: u64,
    /// Lease TTL; must comfortably exceed one full stage invocation.
    pub lease_ttl_secs: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_stage_retries: 3,
            backoff_base_ms: 500,
            stage_timeout_secs: 300,
            lease_ttl_secs: 900,
        }
    }
}

/// Final outcome of one stage execution, retries already spent.
#[derive(Debug)]
pub enum StageOutcome {
    Success { summary: serde_json::Value },
    Failed { message: String },
}

pub struct StageExecutor {
    config: PipelineConfig,
}

impl StageExecutor {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Execute one stage to a final outcome. Never returns early on a
    /// retryable failure while budget remains.
    pub async fn execute(&self, worker: Arc<dyn StageWorker>, ctx: StageContext) -> StageOutcome {
        let timeout = Duration::from_secs(self.config.stage_timeout_secs);

        for attempt in 0..=self.config.max_stage_retries {
            let worker = worker.clone();
            let attempt_ctx = ctx.clone();
            let invocation = tokio::task::spawn_blocking(move || worker.execute(&attempt_ctx));

            let result = match tokio::time::timeout(timeout, invocation).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => {
                    // A panicking worker is not retried.
                    return StageOutcome::Failed {
                        message: format!("worker panicked: {join_err}"),
                    };
                }
                Err(_) => Err(WorkerError::Retryable(format!(
                    "timed out after {}s",
                    self.config.stage_timeout_secs
                ))),
            };

            match result {
                Ok(output) => {
                    tracing::debug!(
                        run_id = %ctx.run_id,
                        stage = ctx.stage_id,
                        attempt,
                        summary = %output.summary,
                        "Stage succeeded"
                    );
                    return StageOutcome::Success {
                        summary: output.summary,
                    };
                }
                Err(WorkerError::Fatal(message)) => {
                    tracing::error!(
                        run_id = %ctx.run_id,
                        stage = ctx.stage_id,
                        error = %message,
                        "Stage failed fatally"
                    );
                    return StageOutcome::Failed { message };
                }
                Err(WorkerError::Retryable(message)) => {
                    if attempt == self.config.max_stage_retries {
                        tracing::error!(
                            run_id = %ctx.run_id,
                            stage = ctx.stage_id,
                            error = %message,
                            "Retry budget exhausted"
                        );
                        return StageOutcome::Failed {
                            message: format!(
                                "failed after {} attempts: {message}",
                                self.config.max_stage_retries + 1
                            ),
                        };
                    }
                    let backoff = self.backoff(attempt);
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        stage = ctx.stage_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %message,
                        "Transient stage failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        // The loop always returns from its last iteration.
        unreachable!("retry loop exits via return")
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base_ms.saturating_mul(1u64 << attempt.min(8));
        let jitter = rand::thread_rng().gen_range(0..=self.config.backoff_base_ms / 2 + 1);
        Duration::from_millis(base + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages;
    use crate::pipeline::workers::StageOutput;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            max_stage_retries: 3,
            backoff_base_ms: 1,
            stage_timeout_secs: 2,
            lease_ttl_secs: 60,
        }
    }

    fn test_ctx() -> StageContext {
        StageContext {
            db_path: PathBuf::from("/nonexistent"),
            run_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            stage_id: stages::RISK_ANALYSIS,
        }
    }

    /// Worker that fails `failures` times before succeeding.
    struct FlakyWorker {
        failures: u32,
        calls: AtomicU32,
    }

    impl StageWorker for FlakyWorker {
        fn stage_id(&self) -> &'static str {
            stages::RISK_ANALYSIS
        }
        fn execute(&self, _ctx: &StageContext) -> Result<StageOutput, WorkerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(WorkerError::Retryable("transient I/O".to_string()))
            } else {
                Ok(StageOutput {
                    summary: serde_json::json!({ "attempt": call }),
                })
            }
        }
    }

    struct FatalWorker;
    impl StageWorker for FatalWorker {
        fn stage_id(&self) -> &'static str {
            stages::RISK_ANALYSIS
        }
        fn execute(&self, _ctx: &StageContext) -> Result<StageOutput, WorkerError> {
            Err(WorkerError::Fatal("corrupted input".to_string()))
        }
    }

    struct SlowWorker;
    impl StageWorker for SlowWorker {
        fn stage_id(&self) -> &'static str {
            stages::RISK_ANALYSIS
        }
        fn execute(&self, _ctx: &StageContext) -> Result<StageOutput, WorkerError> {
            std::thread::sleep(Duration::from_secs(3));
            Ok(StageOutput {
                summary: serde_json::json!({}),
            })
        }
    }

    #[tokio::test]
    async fn succeeds_within_retry_budget() {
        // Fails 3 times, succeeds on attempt 4 — inside the default budget.
        let executor = StageExecutor::new(test_config());
        let worker = Arc::new(FlakyWorker {
            failures: 3,
            calls: AtomicU32::new(0),
        });

        let outcome = executor.execute(worker.clone(), test_ctx()).await;
        assert!(matches!(outcome, StageOutcome::Success { .. }));
        assert_eq!(worker.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhausted_retries_become_failure() {
        let executor = StageExecutor::new(test_config());
        let worker = Arc::new(FlakyWorker {
            failures: 10,
            calls: AtomicU32::new(0),
        });

        let outcome = executor.execute(worker.clone(), test_ctx()).await;
        match outcome {
            StageOutcome::Failed { message } => {
                assert!(message.contains("4 attempts"), "got: {message}");
                assert!(message.contains("transient I/O"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(worker.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn fatal_failure_is_not_retried() {
        let executor = StageExecutor::new(test_config());
        let calls = Arc::new(AtomicU32::new(0));

        struct CountingFatal(Arc<AtomicU32>);
        impl StageWorker for CountingFatal {
            fn stage_id(&self) -> &'static str {
                stages::RISK_ANALYSIS
            }
            fn execute(&self, _ctx: &StageContext) -> Result<StageOutput, WorkerError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(WorkerError::Fatal("corrupted input".to_string()))
            }
        }

        let outcome = executor
            .execute(Arc::new(CountingFatal(calls.clone())), test_ctx())
            .await;
        assert!(matches!(outcome, StageOutcome::Failed { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fatal_outcome_carries_worker_message() {
        let executor = StageExecutor::new(test_config());
        let outcome = executor.execute(Arc::new(FatalWorker), test_ctx()).await;
        match outcome {
            StageOutcome::Failed { message } => assert_eq!(message, "corrupted input"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_counts_as_retryable() {
        let config = PipelineConfig {
            max_stage_retries: 1,
            backoff_base_ms: 1,
            stage_timeout_secs: 1,
            lease_ttl_secs: 60,
        };
        let executor = StageExecutor::new(config);

        let started = std::time::Instant::now();
        let outcome = executor.execute(Arc::new(SlowWorker), test_ctx()).await;
        match outcome {
            StageOutcome::Failed { message } => {
                assert!(message.contains("timed out"), "got: {message}");
            }
            other => panic!("expected timeout failure, got {other:?}"),
        }
        // Two 1s attempts plus backoff, not the worker's 30s sleep.
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
