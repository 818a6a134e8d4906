//! Terminal sinks: consume rows and perform side effects.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;

use crate::row::Row;
use crate::signal::CancellationSignal;

use super::{Operation, OperationKind, OutputStream, RowStream};

/// The side-effecting destination a [`SinkOperation`] writes to.
#[async_trait]
pub trait RowSink: Send + 'static {
    /// Persists or otherwise consumes one row.
    async fn write(&mut self, row: &Row) -> anyhow::Result<()>;

    /// Called exactly once at clean end-of-input so buffering sinks can
    /// finalize. Not called on cancellation or fault.
    async fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes each row to a [`RowSink`], then yields it downstream.
///
/// At the chain tail the forwarded rows are simply discarded by the
/// scheduler; mid-chain, further stages still see every row the sink
/// observed.
pub struct SinkOperation<S> {
    name: String,
    sink: S,
}

impl<S: RowSink> SinkOperation<S> {
    /// Creates a sink stage named `name` writing to `sink`.
    pub fn new(name: impl Into<String>, sink: S) -> Self {
        Self {
            name: name.into(),
            sink,
        }
    }
}

impl<S: RowSink> Operation for SinkOperation<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Sink
    }

    fn execute(self: Box<Self>, input: RowStream, signal: CancellationSignal) -> OutputStream {
        let mut this = *self;
        let mut input = input;
        stream! {
            let mut cancelled = false;

            loop {
                if signal.is_cancelled() {
                    cancelled = true;
                    break;
                }
                let row = match input.next().await {
                    Some(row) => row,
                    None => break,
                };
                match this.sink.write(&row).await {
                    Ok(()) => yield Ok(row),
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }

            if !cancelled && !signal.is_cancelled() {
                if let Err(err) = this.sink.flush().await {
                    yield Err(err);
                }
            }
        }
        .boxed()
    }
}
