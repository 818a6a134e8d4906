//! Source operations: the head of a chain, pulling rows from an external
//! producer.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;

use crate::row::Row;
use crate::signal::CancellationSignal;

use super::{Operation, OperationKind, OutputStream, RowStream};

/// An external row producer a [`SourceOperation`] pulls from - a query
/// cursor, a file reader, an in-memory fixture.
#[async_trait]
pub trait RowSource: Send + 'static {
    /// Fetches the next row, or `None` when the source is exhausted.
    async fn fetch(&mut self) -> anyhow::Result<Option<Row>>;
}

/// Any plain row iterator is a source; in-memory fixtures need no
/// boilerplate.
#[async_trait]
impl<I> RowSource for I
where
    I: Iterator<Item = Row> + Send + 'static,
{
    async fn fetch(&mut self) -> anyhow::Result<Option<Row>> {
        Ok(self.next())
    }
}

/// Head-of-chain operation that produces rows from a [`RowSource`].
///
/// Ignores its input stream. Before each fetch it consults the cancellation
/// signal and an injectable continue predicate; either one stops the source
/// as if its producer were exhausted. The predicate defaults to always-true
/// and exists so callers (and test doubles) can halt the pull loop
/// deterministically without touching the process-wide signal.
pub struct SourceOperation<S> {
    name: String,
    source: S,
    should_continue: Box<dyn Fn() -> bool + Send + 'static>,
}

impl<S: RowSource> SourceOperation<S> {
    /// Creates a source stage named `name` pulling from `source`.
    pub fn new(name: impl Into<String>, source: S) -> Self {
        Self {
            name: name.into(),
            source,
            should_continue: Box::new(|| true),
        }
    }

    /// Installs the predicate consulted before each fetch; returning `false`
    /// ends the source cleanly.
    pub fn with_continue_predicate(
        mut self,
        predicate: impl Fn() -> bool + Send + 'static,
    ) -> Self {
        self.should_continue = Box::new(predicate);
        self
    }
}

impl<S: RowSource> Operation for SourceOperation<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Source
    }

    fn execute(self: Box<Self>, input: RowStream, signal: CancellationSignal) -> OutputStream {
        // Sources produce rows; the input stream is unused by contract.
        drop(input);
        let mut this = *self;
        stream! {
            loop {
                if signal.is_cancelled() || !(this.should_continue)() {
                    break;
                }
                match this.source.fetch().await {
                    Ok(Some(row)) => yield Ok(row),
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::stream;

    use crate::row::Value;

    use super::*;

    fn row(n: i64) -> Row {
        let mut row = Row::new();
        row.set("n", n);
        row
    }

    async fn drain(op: impl Operation, signal: CancellationSignal) -> Vec<Row> {
        let mut output = Box::new(op).execute(stream::empty().boxed(), signal);
        let mut rows = Vec::new();
        while let Some(item) = output.next().await {
            rows.push(item.expect("source should not fault"));
        }
        rows
    }

    #[tokio::test]
    async fn test_iterator_source_produces_all_rows() {
        let op = SourceOperation::new("numbers", (0..5).map(row));
        let rows = drain(op, CancellationSignal::new()).await;
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[4].get("n"), Ok(&Value::Int(4)));
    }

    #[tokio::test]
    async fn test_continue_predicate_halts_pull() {
        let fetched = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fetched);
        let keep_going = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&keep_going);

        let source = (0..100).map(move |n| {
            counter.fetch_add(1, Ordering::SeqCst);
            row(n)
        });
        let op = SourceOperation::new("numbers", source)
            .with_continue_predicate(move || flag.load(Ordering::SeqCst));

        // Halt after the third fetch by flipping the predicate's flag.
        let mut output = Box::new(op).execute(stream::empty().boxed(), CancellationSignal::new());
        let mut seen = 0;
        while let Some(item) = output.next().await {
            item.expect("source should not fault");
            seen += 1;
            if seen == 3 {
                keep_going.store(false, Ordering::SeqCst);
            }
        }

        assert_eq!(seen, 3);
        assert_eq!(fetched.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_source() {
        let signal = CancellationSignal::new();
        let op = SourceOperation::new("numbers", (0..100).map(row));

        let mut output = Box::new(op).execute(stream::empty().boxed(), signal.clone());
        let mut seen = 0;
        while let Some(item) = output.next().await {
            item.expect("source should not fault");
            seen += 1;
            if seen == 2 {
                signal.cancel();
            }
        }

        assert_eq!(seen, 2);
    }
}
