//! The staged-concurrency executor: one worker task per stage, bounded
//! hand-off channels, signal-based shutdown.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::operation::{ChainError, Operation, OperationChain, OperationError, RowStream};
use crate::row::Row;
use crate::signal::CancellationSignal;

use super::config::{ConfigError, PipelineConfig};

/// Errors that can occur while executing a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The chain's shape or lifecycle was invalid.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// The executor configuration was invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A stage faulted; this is the run's first recorded fault.
    #[error(transparent)]
    Operation(#[from] OperationError),
}

/// Final status of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Every stage drained cleanly.
    Completed,
    /// The run was stopped by the cancellation signal; not an error.
    Cancelled,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Unique id of this run, attached to every log line it emits.
    pub run_id: Uuid,
    /// Whether the run completed or was cancelled.
    pub status: ExecutionStatus,
    /// Number of stages in the executed chain.
    pub stages: usize,
    /// Number of rows emitted by the terminal stage.
    pub rows_delivered: u64,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl ExecutionReport {
    /// Returns whether the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.status == ExecutionStatus::Cancelled
    }
}

/// Lifecycle of a stage worker.
///
/// Every path converges on `Terminated`, the only point at which the
/// worker's resources (channel endpoints, the operation and whatever it
/// owns) are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    /// Spawned, not yet pulling.
    Idle,
    /// Pulling, transforming and pushing rows.
    Running,
    /// Upstream closed cleanly; final partial state has been processed.
    Draining,
    /// The stage's operation faulted.
    Faulted,
    /// The cancellation signal stopped the stage early.
    Cancelled,
    /// The worker has returned and released its resources.
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Draining => write!(f, "draining"),
            WorkerState::Faulted => write!(f, "faulted"),
            WorkerState::Cancelled => write!(f, "cancelled"),
            WorkerState::Terminated => write!(f, "terminated"),
        }
    }
}

/// What a stage worker reports back at termination.
struct WorkerReport {
    stage: String,
    rows_emitted: u64,
    state: WorkerState,
}

type FaultList = Arc<Mutex<Vec<OperationError>>>;

/// Executes a frozen chain as a set of concurrently running stage workers
/// connected by bounded hand-off channels.
pub struct PipelineExecutor {
    config: PipelineConfig,
}

impl PipelineExecutor {
    /// Creates an executor with the given configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Returns the executor's configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the chain to completion, cancellation or fault.
    ///
    /// Freezes the chain if the caller has not, spawns one worker per stage,
    /// and joins every worker before returning - resources are released on
    /// every exit path. Rows are delivered to each stage in the exact order
    /// its upstream neighbor produced them.
    ///
    /// # Errors
    ///
    /// Returns the first recorded [`OperationError`] if any stage faulted
    /// (later faults are logged, not propagated), or a chain/config error if
    /// the run could not start. Cancellation is not an error: the report
    /// carries [`ExecutionStatus::Cancelled`].
    pub async fn execute(
        &self,
        mut chain: OperationChain,
        signal: CancellationSignal,
    ) -> Result<ExecutionReport, PipelineError> {
        self.config.validate()?;
        chain.freeze()?;

        let run_id = Uuid::new_v4();
        let stages = chain.len();
        let started = Instant::now();
        debug!(
            run_id = %run_id,
            stages,
            channel_capacity = self.config.channel_capacity,
            "Pipeline starting"
        );

        let faults: FaultList = Arc::new(Mutex::new(Vec::new()));
        let mut handles: Vec<(String, JoinHandle<WorkerReport>)> = Vec::with_capacity(stages);
        let operations: VecDeque<Box<dyn Operation>> = chain.into_operations();
        let last_index = stages - 1;

        let mut next_upstream: Option<mpsc::Receiver<Row>> = None;
        for (index, operation) in operations.into_iter().enumerate() {
            let (downstream_tx, downstream_rx) = if index < last_index {
                let (tx, rx) = mpsc::channel(self.config.channel_capacity);
                (Some(tx), Some(rx))
            } else {
                (None, None)
            };

            let stage = operation.name().to_string();
            let worker = StageWorker {
                stage: stage.clone(),
                operation,
                upstream: next_upstream.take(),
                downstream: downstream_tx,
                signal: signal.clone(),
                faults: Arc::clone(&faults),
            };
            handles.push((stage, tokio::spawn(worker.run())));
            next_upstream = downstream_rx;
        }

        // Join every worker before reporting; Terminated is the only state
        // that releases stage resources.
        let mut rows_delivered = 0;
        for (stage, handle) in handles {
            match handle.await {
                Ok(report) => {
                    debug!(
                        run_id = %run_id,
                        stage = %report.stage,
                        state = %report.state,
                        rows_emitted = report.rows_emitted,
                        "Stage terminated"
                    );
                    rows_delivered = report.rows_emitted;
                }
                Err(join_err) => {
                    // A panicking stage is a fault like any other: record it
                    // and cancel the rest of the chain.
                    signal.cancel();
                    let fault = OperationError::new(
                        &stage,
                        anyhow::anyhow!("stage worker panicked: {join_err}"),
                    );
                    error!(run_id = %run_id, stage = %stage, error = %fault, "Stage worker panicked");
                    faults
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(fault);
                }
            }
        }

        let mut recorded: Vec<OperationError> = {
            let mut guard = faults.lock().unwrap_or_else(PoisonError::into_inner);
            guard.drain(..).collect()
        };
        if !recorded.is_empty() {
            let primary = recorded.remove(0);
            for later in &recorded {
                warn!(
                    run_id = %run_id,
                    stage = %later.stage,
                    error = %later,
                    "Suppressing additional stage fault; first fault wins"
                );
            }
            error!(run_id = %run_id, stage = %primary.stage, error = %primary, "Pipeline faulted");
            return Err(primary.into());
        }

        let status = if signal.is_cancelled() {
            ExecutionStatus::Cancelled
        } else {
            ExecutionStatus::Completed
        };
        let report = ExecutionReport {
            run_id,
            status,
            stages,
            rows_delivered,
            duration: started.elapsed(),
        };
        debug!(
            run_id = %run_id,
            status = %report.status,
            rows_delivered = report.rows_delivered,
            duration_ms = report.duration.as_millis() as u64,
            "Pipeline finished"
        );
        Ok(report)
    }
}

/// One stage's worker: pulls from upstream, drives the operation's lazy
/// output, pushes downstream.
struct StageWorker {
    stage: String,
    operation: Box<dyn Operation>,
    upstream: Option<mpsc::Receiver<Row>>,
    downstream: Option<mpsc::Sender<Row>>,
    signal: CancellationSignal,
    faults: FaultList,
}

impl StageWorker {
    async fn run(self) -> WorkerReport {
        let StageWorker {
            stage,
            operation,
            upstream,
            downstream,
            signal,
            faults,
        } = self;

        let mut state = WorkerState::Idle;
        debug!(stage = %stage, state = %state, "Stage worker spawned");

        let input: RowStream = match upstream {
            Some(receiver) => ReceiverStream::new(receiver).boxed(),
            None => stream::empty::<Row>().boxed(),
        };
        let mut output = operation.execute(input, signal.clone());
        state = WorkerState::Running;
        debug!(stage = %stage, state = %state, "Stage worker running");

        let mut rows_emitted: u64 = 0;
        loop {
            match output.next().await {
                Some(Ok(row)) => {
                    rows_emitted += 1;
                    if let Some(tx) = &downstream {
                        if tx.send(row).await.is_err() {
                            // Downstream terminated early - a sibling fault
                            // or cancellation already closed the channel.
                            // Stop pulling.
                            state = WorkerState::Cancelled;
                            break;
                        }
                    }
                }
                Some(Err(cause)) => {
                    signal.cancel();
                    let fault = OperationError::new(&stage, cause);
                    error!(stage = %stage, error = %fault, "Stage faulted");
                    faults
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(fault);
                    state = WorkerState::Faulted;
                    break;
                }
                None => {
                    state = if signal.is_cancelled() {
                        WorkerState::Cancelled
                    } else {
                        WorkerState::Draining
                    };
                    break;
                }
            }
        }
        debug!(stage = %stage, state = %state, "Stage worker stopping");

        // Dropping the output stream releases the operation and its upstream
        // receiver (unblocking an upstream push); dropping the sender closes
        // the downstream channel (ending the downstream input).
        drop(output);
        drop(downstream);

        debug!(
            stage = %stage,
            state = %WorkerState::Terminated,
            rows_emitted,
            "Stage worker terminated"
        );
        WorkerReport {
            stage,
            rows_emitted,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::operation::RowSink;
    use crate::operation::{SinkOperation, SourceOperation, TransformOperation};

    use super::*;

    fn row(n: i64) -> Row {
        let mut row = Row::new();
        row.set("n", n);
        row
    }

    struct CountingSink {
        written: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl RowSink for CountingSink {
        async fn write(&mut self, _row: &Row) -> anyhow::Result<()> {
            self.written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn executor() -> PipelineExecutor {
        PipelineExecutor::new(PipelineConfig::default())
    }

    #[tokio::test]
    async fn test_rows_flow_through_all_stages() {
        let written = Arc::new(AtomicUsize::new(0));
        let mut chain = OperationChain::new();
        chain
            .register_last(SourceOperation::new("numbers", (0..50).map(row)))
            .expect("register source");
        chain
            .register_last(TransformOperation::new("double", |mut row: Row| {
                let n = row.get("n")?.as_int().unwrap_or(0);
                row.set("n", n * 2);
                Ok(row)
            }))
            .expect("register transform");
        chain
            .register_last(SinkOperation::new(
                "collect",
                CountingSink {
                    written: Arc::clone(&written),
                },
            ))
            .expect("register sink");

        let report = executor()
            .execute(chain, CancellationSignal::new())
            .await
            .expect("pipeline should complete");

        assert_eq!(report.status, ExecutionStatus::Completed);
        assert_eq!(report.stages, 3);
        assert_eq!(report.rows_delivered, 50);
        assert_eq!(written.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn test_empty_chain_is_rejected() {
        let err = executor()
            .execute(OperationChain::new(), CancellationSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Chain(ChainError::Empty)));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let executor = PipelineExecutor::new(PipelineConfig::new().with_channel_capacity(0));
        let mut chain = OperationChain::new();
        chain
            .register_last(SourceOperation::new("numbers", (0..1).map(row)))
            .expect("register source");

        let err = executor
            .execute(chain, CancellationSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn test_fault_is_attributed_to_the_stage() {
        let mut chain = OperationChain::new();
        chain
            .register_last(SourceOperation::new("numbers", (0..10).map(row)))
            .expect("register source");
        chain
            .register_last(TransformOperation::new("explode", |row: Row| {
                if row.get("n")?.as_int() == Some(4) {
                    anyhow::bail!("bad row");
                }
                Ok(row)
            }))
            .expect("register transform");

        let err = executor()
            .execute(chain, CancellationSignal::new())
            .await
            .unwrap_err();
        match err {
            PipelineError::Operation(fault) => {
                assert_eq!(fault.stage, "explode");
                assert!(fault.to_string().contains("bad row"));
            }
            other => panic!("expected an operation fault, got: {other}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_stage_becomes_a_fault() {
        let mut chain = OperationChain::new();
        chain
            .register_last(SourceOperation::new("numbers", (0..10).map(row)))
            .expect("register source");
        chain
            .register_last(TransformOperation::new("panics", |row: Row| {
                if row.get("n")?.as_int() == Some(2) {
                    panic!("stage blew up");
                }
                Ok(row)
            }))
            .expect("register transform");

        let err = executor()
            .execute(chain, CancellationSignal::new())
            .await
            .unwrap_err();
        match err {
            PipelineError::Operation(fault) => assert_eq!(fault.stage, "panics"),
            other => panic!("expected an operation fault, got: {other}"),
        }
    }

    #[tokio::test]
    async fn test_single_stage_chain() {
        let mut chain = OperationChain::new();
        chain
            .register_last(SourceOperation::new("numbers", (0..5).map(row)))
            .expect("register source");

        let report = executor()
            .execute(chain, CancellationSignal::new())
            .await
            .expect("pipeline should complete");
        assert_eq!(report.rows_delivered, 5);
    }

    #[tokio::test]
    async fn test_pre_cancelled_signal_reports_cancelled() {
        let signal = CancellationSignal::new();
        signal.cancel();

        let mut chain = OperationChain::new();
        chain
            .register_last(SourceOperation::new("numbers", (0..100).map(row)))
            .expect("register source");

        let report = executor()
            .execute(chain, signal)
            .await
            .expect("cancellation is not an error");
        assert_eq!(report.status, ExecutionStatus::Cancelled);
        assert_eq!(report.rows_delivered, 0);
    }

    #[tokio::test]
    async fn test_rows_keep_upstream_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observed = Arc::clone(&seen);

        let mut chain = OperationChain::new();
        chain
            .register_last(SourceOperation::new("numbers", (0..100).map(row)))
            .expect("register source");
        chain
            .register_last(TransformOperation::new("observe", move |row: Row| {
                let n = row.get("n")?.as_int().unwrap_or(-1);
                observed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(n);
                Ok(row)
            }))
            .expect("register transform");

        executor()
            .execute(chain, CancellationSignal::new())
            .await
            .expect("pipeline should complete");

        let seen = seen.lock().unwrap_or_else(PoisonError::into_inner);
        let expected: Vec<i64> = (0..100).collect();
        assert_eq!(*seen, expected);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ExecutionStatus::Completed.to_string(), "completed");
        assert_eq!(ExecutionStatus::Cancelled.to_string(), "cancelled");
    }
}
