//! Batching: group rows and apply one aggregate action per batch.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;

use crate::row::Row;
use crate::signal::CancellationSignal;

use super::{Operation, OperationKind, OutputStream, RowStream};

/// The aggregate action a [`BatchOperation`] applies once per batch - a bulk
/// update, a bulk insert, one round-trip instead of one per row.
#[async_trait]
pub trait BatchHandler: Send + 'static {
    /// Applies one aggregate action to a full batch, or to the final partial
    /// batch at end-of-input. Returned rows are forwarded downstream.
    async fn apply(&mut self, batch: Vec<Row>) -> anyhow::Result<Vec<Row>>;
}

/// Groups incoming rows into fixed-size batches and invokes the handler once
/// per batch.
///
/// The final partial batch (fewer than `batch_size` rows) is still applied at
/// clean end-of-input - it is never dropped. Zero input rows means zero
/// handler invocations. On observed cancellation the partial buffer is
/// abandoned; only clean end-of-input flushes.
pub struct BatchOperation<H> {
    name: String,
    batch_size: usize,
    handler: H,
}

impl<H: BatchHandler> BatchOperation<H> {
    /// Creates a batch stage named `name` grouping rows into `batch_size`
    /// chunks.
    ///
    /// # Panics
    ///
    /// Panics if `batch_size` is zero.
    pub fn new(name: impl Into<String>, batch_size: usize, handler: H) -> Self {
        assert!(batch_size >= 1, "batch size must be at least 1");
        Self {
            name: name.into(),
            batch_size,
            handler,
        }
    }
}

impl<H: BatchHandler> Operation for BatchOperation<H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Batch
    }

    fn execute(self: Box<Self>, input: RowStream, signal: CancellationSignal) -> OutputStream {
        let mut this = *self;
        let mut input = input;
        stream! {
            let mut buffer: Vec<Row> = Vec::with_capacity(this.batch_size);
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
                buffer.push(row);
                if buffer.len() == this.batch_size {
                    let batch = std::mem::replace(&mut buffer, Vec::with_capacity(this.batch_size));
                    match this.handler.apply(batch).await {
                        Ok(rows) => {
                            for row in rows {
                                yield Ok(row);
                            }
                        }
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    }
                }
            }

            // The final partial batch flushes only on clean end-of-input.
            if !cancelled && !signal.is_cancelled() && !buffer.is_empty() {
                match this.handler.apply(buffer).await {
                    Ok(rows) => {
                        for row in rows {
                            yield Ok(row);
                        }
                    }
                    Err(err) => yield Err(err),
                }
            }
        }
        .boxed()
    }
}
