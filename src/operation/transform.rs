//! Row-at-a-time transforms and filters.

use anyhow::Error;
use async_stream::stream;
use futures::StreamExt;

use crate::row::Row;
use crate::signal::CancellationSignal;

use super::{Operation, OperationKind, OutputStream, RowStream};

/// Maps each input row to one output row.
///
/// A returned error faults the stage and stops the run.
pub struct TransformOperation<F> {
    name: String,
    apply: F,
}

impl<F> TransformOperation<F>
where
    F: FnMut(Row) -> anyhow::Result<Row> + Send + 'static,
{
    /// Creates a transform stage named `name`.
    pub fn new(name: impl Into<String>, apply: F) -> Self {
        Self {
            name: name.into(),
            apply,
        }
    }
}

impl<F> Operation for TransformOperation<F>
where
    F: FnMut(Row) -> anyhow::Result<Row> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(self: Box<Self>, input: RowStream, signal: CancellationSignal) -> OutputStream {
        let mut this = *self;
        let mut input = input;
        stream! {
            loop {
                if signal.is_cancelled() {
                    break;
                }
                let row = match input.next().await {
                    Some(row) => row,
                    None => break,
                };
                match (this.apply)(row) {
                    Ok(row) => yield Ok(row),
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

/// Passes rows matching a predicate and drops the rest.
///
/// Filtered-out rows are the only sanctioned row loss in a pipeline; every
/// other stage conserves row counts.
pub struct FilterOperation<F> {
    name: String,
    predicate: F,
}

impl<F> FilterOperation<F>
where
    F: FnMut(&Row) -> bool + Send + 'static,
{
    /// Creates a filter stage named `name`.
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<F> Operation for FilterOperation<F>
where
    F: FnMut(&Row) -> bool + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(self: Box<Self>, input: RowStream, signal: CancellationSignal) -> OutputStream {
        let mut this = *self;
        let mut input = input;
        stream! {
            loop {
                if signal.is_cancelled() {
                    break;
                }
                let row = match input.next().await {
                    Some(row) => row,
                    None => break,
                };
                if (this.predicate)(&row) {
                    yield Ok::<Row, Error>(row);
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use crate::row::Value;

    use super::*;

    fn row(n: i64) -> Row {
        let mut row = Row::new();
        row.set("n", n);
        row
    }

    fn input(count: i64) -> RowStream {
        stream::iter((0..count).map(row)).boxed()
    }

    #[tokio::test]
    async fn test_transform_maps_each_row() {
        let op = TransformOperation::new("double", |mut row: Row| {
            let n = row.get("n")?.as_int().unwrap_or(0);
            row.set("n", n * 2);
            Ok(row)
        });

        let rows: Vec<Row> = Box::new(op)
            .execute(input(3), CancellationSignal::new())
            .map(|item| item.expect("transform should not fault"))
            .collect()
            .await;

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].get("n"), Ok(&Value::Int(4)));
    }

    #[tokio::test]
    async fn test_transform_fault_ends_the_stream() {
        let op = TransformOperation::new("explode", |row: Row| {
            if row.get("n")?.as_int() == Some(1) {
                anyhow::bail!("boom");
            }
            Ok(row)
        });

        let items: Vec<Result<Row, Error>> = Box::new(op)
            .execute(input(5), CancellationSignal::new())
            .collect()
            .await;

        // One good row, then the fault; nothing after it.
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_filter_drops_non_matching_rows() {
        let op = FilterOperation::new("evens", |row: &Row| {
            row.get_opt("n").and_then(Value::as_int).is_some_and(|n| n % 2 == 0)
        });

        let rows: Vec<Row> = Box::new(op)
            .execute(input(10), CancellationSignal::new())
            .map(|item| item.expect("filter should not fault"))
            .collect()
            .await;

        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn test_cancellation_stops_transform() {
        let signal = CancellationSignal::new();
        let cancel = signal.clone();
        let op = TransformOperation::new("cancel-after-2", move |row: Row| {
            if row.get("n")?.as_int() == Some(1) {
                cancel.cancel();
            }
            Ok(row)
        });

        let rows: Vec<Row> = Box::new(op)
            .execute(input(100), signal)
            .map(|item| item.expect("transform should not fault"))
            .collect()
            .await;

        // Rows 0 and 1 pass; the signal is observed before row 2.
        assert_eq!(rows.len(), 2);
    }
}
