//! Operation chains: ordered stages built by registration, frozen at run
//! time.

use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;
use tracing::debug;

use super::{Operation, OperationKind};

/// Errors raised by chain construction and lifecycle.
#[derive(Debug, Error, PartialEq)]
pub enum ChainError {
    /// Registration was attempted after the chain froze for execution.
    #[error("Operation chain is frozen; stages cannot change once execution has started")]
    Frozen,

    /// A second source operation was registered.
    #[error("Operation chain already has source stage '{0}'")]
    DuplicateSource(String),

    /// A source operation would not sit at the head of the chain.
    #[error("Source stage '{0}' must be the head of the chain")]
    SourceNotFirst(String),

    /// The chain has no stages to execute.
    #[error("Operation chain has no stages")]
    Empty,
}

/// An ordered sequence of operations forming one linear pipeline.
///
/// Mutable while being built via [`register_first`](Self::register_first) and
/// [`register_last`](Self::register_last); immutable once
/// [`freeze`](Self::freeze) runs (the scheduler freezes automatically at the
/// start of execution). A chain holds at most one source operation, and only
/// at the head. Operations are exclusively owned - never shared across
/// chains.
#[derive(Default)]
pub struct OperationChain {
    operations: VecDeque<Box<dyn Operation>>,
    frozen: bool,
}

impl OperationChain {
    /// Creates an empty, unfrozen chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operation at the head of the chain.
    ///
    /// # Errors
    ///
    /// Fails with [`ChainError::Frozen`] after execution has started, or
    /// with a shape error if the registration would displace or duplicate a
    /// source stage.
    pub fn register_first(&mut self, operation: impl Operation) -> Result<(), ChainError> {
        self.register(Box::new(operation), true)
    }

    /// Registers an operation at the tail of the chain.
    ///
    /// # Errors
    ///
    /// Fails with [`ChainError::Frozen`] after execution has started, or
    /// with a shape error if a source stage would land behind other stages.
    pub fn register_last(&mut self, operation: impl Operation) -> Result<(), ChainError> {
        self.register(Box::new(operation), false)
    }

    fn register(&mut self, operation: Box<dyn Operation>, at_head: bool) -> Result<(), ChainError> {
        if self.frozen {
            return Err(ChainError::Frozen);
        }

        if operation.kind() == OperationKind::Source {
            if let Some(existing) = self.find_source() {
                return Err(ChainError::DuplicateSource(existing.to_string()));
            }
            if !at_head && !self.operations.is_empty() {
                return Err(ChainError::SourceNotFirst(operation.name().to_string()));
            }
        } else if at_head {
            // A non-source stage pushed to the head would bury an existing
            // source behind it.
            if let Some(head) = self.operations.front() {
                if head.kind() == OperationKind::Source {
                    return Err(ChainError::SourceNotFirst(head.name().to_string()));
                }
            }
        }

        debug!(
            stage = %operation.name(),
            kind = %operation.kind(),
            at_head,
            "Registered stage"
        );
        if at_head {
            self.operations.push_front(operation);
        } else {
            self.operations.push_back(operation);
        }
        Ok(())
    }

    /// Transitions the chain to immutable. Idempotent.
    ///
    /// Validates the chain's shape: it must be non-empty, hold at most one
    /// source stage, and any source must be at the head. Registration
    /// already fails fast on these; this is the backstop run at the start of
    /// every execution.
    pub fn freeze(&mut self) -> Result<(), ChainError> {
        if self.frozen {
            return Ok(());
        }
        if self.operations.is_empty() {
            return Err(ChainError::Empty);
        }

        let mut sources = self
            .operations
            .iter()
            .enumerate()
            .filter(|(_, op)| op.kind() == OperationKind::Source);
        if let Some((index, op)) = sources.next() {
            if index != 0 {
                return Err(ChainError::SourceNotFirst(op.name().to_string()));
            }
            if let Some((_, duplicate)) = sources.next() {
                return Err(ChainError::DuplicateSource(duplicate.name().to_string()));
            }
        }

        self.frozen = true;
        debug!(stages = self.operations.len(), "Chain frozen");
        Ok(())
    }

    /// Returns whether the chain has frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns the number of registered stages.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns whether the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the stage names in pipeline order.
    pub fn stage_names(&self) -> Vec<String> {
        self.operations
            .iter()
            .map(|op| op.name().to_string())
            .collect()
    }

    fn find_source(&self) -> Option<&str> {
        self.operations
            .iter()
            .find(|op| op.kind() == OperationKind::Source)
            .map(|op| op.name())
    }

    pub(crate) fn into_operations(self) -> VecDeque<Box<dyn Operation>> {
        self.operations
    }
}

impl fmt::Debug for OperationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationChain")
            .field("stages", &self.stage_names())
            .field("frozen", &self.frozen)
            .finish()
    }
}
