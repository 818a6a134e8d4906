//! rowflow: embeddable ETL pipeline engine.
//!
//! Streams records ([`Row`]s) through a chain of user-defined operations
//! with bounded memory, back-pressure between stages, and graceful
//! mid-flight cancellation. Each stage runs on its own worker task and hands
//! rows to the next over a small bounded channel, so stages overlap in time
//! and a slow consumer throttles its producer instead of letting a queue
//! grow without bound.
//!
//! # Building blocks
//!
//! - [`row::Row`] / [`row::Value`]: the ordered column/value records that
//!   flow through a pipeline.
//! - [`operation::Operation`]: one stage - sources, transforms, filters,
//!   batchers and sinks, with adapters for each.
//! - [`operation::OperationChain`]: the ordered stages of one pipeline,
//!   built by registration and frozen at run time.
//! - [`pipeline::PipelineExecutor`]: runs a frozen chain with one worker per
//!   stage; [`pipeline::PipelineConfig`] bounds the hand-off channels.
//! - [`process::EtlProcess`]: the user-facing orchestrator - register,
//!   execute once, release everything on every exit path.
//! - [`signal::CancellationSignal`]: the shared stop flag every stage
//!   observes between rows.

// Core modules
pub mod operation;
pub mod pipeline;
pub mod process;
pub mod row;
pub mod signal;

// Re-export the main types for convenience
pub use operation::{
    BatchHandler, BatchOperation, ChainError, FilterOperation, Operation, OperationChain,
    OperationError, OperationKind, OutputStream, RowSink, RowSource, RowStream, SinkOperation,
    SourceOperation, TransformOperation,
};
pub use pipeline::{
    ConfigError, ExecutionReport, ExecutionStatus, PipelineConfig, PipelineError, PipelineExecutor,
};
pub use process::{EtlProcess, ProcessError};
pub use row::{Row, RowError, Value};
pub use signal::CancellationSignal;
