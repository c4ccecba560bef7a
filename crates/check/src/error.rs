use lemma_core::{DefinitionId, StoreError};
use thiserror::Error;

/// Failure reported by a typechecking engine for a whole group.
///
/// Unlike type errors, which the engine reports as diagnostics in its
/// verdict, these mean the engine could not produce a verdict at all.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
	#[error("engine failed: {0}")]
	Failed(String),

	#[error("engine returned no verdict for {0:?}")]
	MissingVerdict(DefinitionId),

	#[error("engine panicked: {0}")]
	Panicked(String),
}

/// Faults that abort a background run. Statuses committed before the fault stay.
#[derive(Debug, Error)]
pub enum RunError {
	#[error(transparent)]
	Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, RunError>;
