//! The user-facing ETL process: scoped registration, one-shot execution,
//! guaranteed release.
//!
//! An [`EtlProcess`] owns one operation chain, one cancellation signal and
//! one executor configuration for the duration of one execution:
//!
//! 1. **Register** operations, either directly or inside an
//!    [`initialize`](EtlProcess::initialize) scope.
//! 2. **Execute** once: the chain freezes, the pipeline runs, and every
//!    stage's resources are released before the call returns - on success,
//!    fault and cancellation alike.
//! 3. **Dispose** (explicitly or by drop): idempotent, releases anything
//!    still held.
//!
//! # Example
//!
//! ```rust,ignore
//! use rowflow::operation::{SinkOperation, SourceOperation, TransformOperation};
//! use rowflow::process::EtlProcess;
//!
//! let mut process = EtlProcess::new("load-users");
//! process.initialize(|chain| {
//!     chain.register_last(SourceOperation::new("read-users", reader))?;
//!     chain.register_last(TransformOperation::new("uppercase", uppercase))?;
//!     chain.register_last(SinkOperation::new("write-users", writer))
//! })?;
//!
//! let cancellation = process.cancellation(); // cancel from elsewhere if needed
//! let report = process.execute().await?;
//! println!("{}: {} rows", report.status, report.rows_delivered);
//! ```

use thiserror::Error;
use tracing::{debug, error, info};

use crate::operation::{ChainError, Operation, OperationChain};
use crate::pipeline::{ExecutionReport, PipelineConfig, PipelineError, PipelineExecutor};
use crate::signal::CancellationSignal;

/// Errors that can occur during process operations.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process has already executed; build a new one to run again.
    #[error("Process '{0}' has already executed")]
    AlreadyExecuted(String),

    /// The process has been disposed.
    #[error("Process '{0}' has been disposed")]
    Disposed(String),

    /// Chain construction failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The pipeline run failed; carries the first recorded stage fault.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// One ETL process: a chain of operations executed as a single pipeline.
///
/// Not reentrant: `execute` takes `&mut self`, which statically rules out a
/// second concurrent execution, and the chain is consumed by the run, so a
/// second sequential call fails with [`ProcessError::AlreadyExecuted`].
pub struct EtlProcess {
    name: String,
    chain: Option<OperationChain>,
    config: PipelineConfig,
    signal: CancellationSignal,
    disposed: bool,
}

impl EtlProcess {
    /// Creates a process with the default pipeline configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, PipelineConfig::default())
    }

    /// Creates a process with an explicit pipeline configuration.
    pub fn with_config(name: impl Into<String>, config: PipelineConfig) -> Self {
        Self {
            name: name.into(),
            chain: Some(OperationChain::new()),
            config,
            signal: CancellationSignal::new(),
            disposed: false,
        }
    }

    /// Returns the process name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a handle to this execution's cancellation signal.
    ///
    /// Clone it out before calling [`execute`](Self::execute) to request a
    /// graceful stop mid-flight; a cancelled run reports
    /// `ExecutionStatus::Cancelled` rather than an error.
    pub fn cancellation(&self) -> CancellationSignal {
        self.signal.clone()
    }

    /// Requests graceful cancellation of a running (or future) execution.
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// Scoped registration phase: hands the chain to `register` so the
    /// caller can set up its operations in one place.
    ///
    /// # Errors
    ///
    /// Fails if the process has already executed or been disposed, or with
    /// whatever [`ChainError`] the callback returns.
    pub fn initialize<F>(&mut self, register: F) -> Result<(), ProcessError>
    where
        F: FnOnce(&mut OperationChain) -> Result<(), ChainError>,
    {
        let chain = self.chain_mut()?;
        register(chain)?;
        Ok(())
    }

    /// Registers an operation at the head of the chain.
    pub fn register_first(&mut self, operation: impl Operation) -> Result<(), ProcessError> {
        self.chain_mut()?.register_first(operation)?;
        Ok(())
    }

    /// Registers an operation at the tail of the chain.
    pub fn register_last(&mut self, operation: impl Operation) -> Result<(), ProcessError> {
        self.chain_mut()?.register_last(operation)?;
        Ok(())
    }

    fn chain_mut(&mut self) -> Result<&mut OperationChain, ProcessError> {
        if self.disposed {
            return Err(ProcessError::Disposed(self.name.clone()));
        }
        self.chain
            .as_mut()
            .ok_or_else(|| ProcessError::AlreadyExecuted(self.name.clone()))
    }

    /// Executes the pipeline to completion, cancellation or fault.
    ///
    /// Freezes the chain, drives every stage concurrently, and joins all
    /// workers before returning; operation resources are released on every
    /// exit path.
    ///
    /// # Errors
    ///
    /// Returns the first recorded stage fault if any stage failed.
    /// Cancellation is not an error: the report's status distinguishes a
    /// cancelled run from a completed one.
    pub async fn execute(&mut self) -> Result<ExecutionReport, ProcessError> {
        if self.disposed {
            return Err(ProcessError::Disposed(self.name.clone()));
        }
        let chain = self
            .chain
            .take()
            .ok_or_else(|| ProcessError::AlreadyExecuted(self.name.clone()))?;

        info!(process = %self.name, stages = chain.len(), "Process executing");
        let executor = PipelineExecutor::new(self.config.clone());
        match executor.execute(chain, self.signal.clone()).await {
            Ok(report) => {
                info!(
                    process = %self.name,
                    run_id = %report.run_id,
                    status = %report.status,
                    rows_delivered = report.rows_delivered,
                    duration_ms = report.duration.as_millis() as u64,
                    "Process finished"
                );
                Ok(report)
            }
            Err(err) => {
                error!(process = %self.name, error = %err, "Process failed");
                Err(err.into())
            }
        }
    }

    /// Releases the process's resources: cancels the signal and drops any
    /// unexecuted chain. Safe to call more than once; `Drop` delegates here,
    /// so release happens even without an explicit call.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.signal.cancel();
        if self.chain.take().is_some() {
            debug!(process = %self.name, "Dropped unexecuted chain");
        }
        debug!(process = %self.name, "Process disposed");
    }

    /// Returns whether the process has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for EtlProcess {
    fn drop(&mut self) {
        self.dispose();
    }
}
