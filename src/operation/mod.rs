//! Pipeline operations: the stages rows flow through.
//!
//! An [`Operation`] is one link in a pipeline: it consumes a lazy stream of
//! input rows and produces a lazy stream of output rows. Laziness is the
//! contract that keeps memory bounded - an operation must never force its
//! whole input before yielding its first output row, no matter how large the
//! dataset is.
//!
//! # Operation kinds
//!
//! - **Source**: head of the chain; ignores its input and pulls rows from an
//!   external producer ([`SourceOperation`]).
//! - **Transform**: row-at-a-time mapping or filtering
//!   ([`TransformOperation`], [`FilterOperation`]).
//! - **Batch**: groups rows and applies one aggregate action per batch
//!   ([`BatchOperation`]).
//! - **Sink**: consumes rows for their side effect ([`SinkOperation`]).
//!
//! # Cancellation
//!
//! Every operation receives a [`CancellationSignal`] and checks it at least
//! once per row. After observing it set, an operation stops pulling input and
//! stops yielding output as soon as practical: finishing the row in hand is
//! acceptable, starting a new one is not.
//!
//! # Errors
//!
//! An operation faults by yielding an `Err` in its output stream. The
//! scheduler wraps the cause into an [`OperationError`] attributed to the
//! stage by name, cancels the rest of the chain, and reports the fault as
//! the run's terminal error.

pub mod batch;
pub mod chain;
pub mod sink;
pub mod source;
pub mod transform;

pub use batch::{BatchHandler, BatchOperation};
pub use chain::{ChainError, OperationChain};
pub use sink::{RowSink, SinkOperation};
pub use source::{RowSource, SourceOperation};
pub use transform::{FilterOperation, TransformOperation};

use std::fmt;

use futures::stream::BoxStream;
use thiserror::Error;

use crate::row::Row;
use crate::signal::CancellationSignal;

/// Lazy, single-pass stream of rows fed into an operation.
pub type RowStream = BoxStream<'static, Row>;

/// Lazy stream an operation produces. A yielded error faults the stage.
pub type OutputStream = BoxStream<'static, Result<Row, anyhow::Error>>;

/// A stage fault: the wrapped cause, attributed to the stage that raised it.
#[derive(Debug, Error)]
#[error("Operation '{stage}' failed: {source}")]
pub struct OperationError {
    /// Name of the stage that faulted.
    pub stage: String,
    /// The underlying fault.
    #[source]
    pub source: anyhow::Error,
}

impl OperationError {
    /// Creates a fault attributed to `stage`.
    pub fn new(stage: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            stage: stage.into(),
            source,
        }
    }
}

/// The role an operation plays in a chain, used for shape validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Produces rows from an external producer; only valid at the head.
    Source,
    /// Maps or filters rows one at a time.
    Transform,
    /// Groups rows and applies one aggregate action per batch.
    Batch,
    /// Consumes rows for their side effect.
    Sink,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Source => write!(f, "source"),
            OperationKind::Transform => write!(f, "transform"),
            OperationKind::Batch => write!(f, "batch"),
            OperationKind::Sink => write!(f, "sink"),
        }
    }
}

/// One stage of a pipeline.
///
/// `execute` is called exactly once, consuming the operation; the returned
/// stream owns the operation's state for the lifetime of the run. The stream
/// must be lazy: rows are produced on demand as the downstream worker pulls.
pub trait Operation: Send + 'static {
    /// The stage's name, used for error attribution and logging.
    fn name(&self) -> &str;

    /// The stage's role in the chain.
    fn kind(&self) -> OperationKind {
        OperationKind::Transform
    }

    /// Transforms the lazy input stream into a lazy output stream.
    fn execute(self: Box<Self>, input: RowStream, signal: CancellationSignal) -> OutputStream;
}
