//! Pipeline execution: staged concurrency over a frozen operation chain.
//!
//! This module contains the engine that runs a chain: every stage gets its
//! own worker task, adjacent stages are connected by small bounded channels,
//! and rows flow through the chain with back-pressure instead of unbounded
//! buffering.
//!
//! # Architecture
//!
//! ```text
//!   ┌────────┐  bounded   ┌───────────┐  bounded   ┌──────┐
//!   │ source │ ──queue──▶ │ transform │ ──queue──▶ │ sink │
//!   └────────┘            └───────────┘            └──────┘
//!    worker 0               worker 1                worker 2
//! ```
//!
//! - **Back-pressure**: a stage that outruns its downstream neighbor blocks
//!   on a full channel rather than buffering without bound.
//! - **End-of-stream**: a finished worker drops its sender; the downstream
//!   worker drains what is buffered, flushes any final partial state, and
//!   terminates.
//! - **Fault shutdown**: the first fault sets the shared cancellation
//!   signal; every other stage observes it between rows and stops cleanly.
//!   The scheduler joins every worker before reporting, and the first
//!   recorded fault wins.
//!
//! # Example
//!
//! ```rust,ignore
//! use rowflow::pipeline::{PipelineConfig, PipelineExecutor};
//! use rowflow::signal::CancellationSignal;
//!
//! let executor = PipelineExecutor::new(PipelineConfig::new().with_channel_capacity(8));
//! let report = executor.execute(chain, CancellationSignal::new()).await?;
//! println!("{} rows in {:?}", report.rows_delivered, report.duration);
//! ```

pub mod config;
pub mod executor;

// Re-export main types for convenience
pub use config::{ConfigError, PipelineConfig, DEFAULT_CHANNEL_CAPACITY};
pub use executor::{ExecutionReport, ExecutionStatus, PipelineError, PipelineExecutor};
