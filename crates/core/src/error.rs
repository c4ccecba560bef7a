use thiserror::Error;

use crate::clock::ClockValue;
use crate::ids::{DefinitionId, FileId};

/// Faults of the definition store.
///
/// None of these is a user error; a background run that hits one aborts
/// without touching statuses it has not committed yet.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("definition {0:?} is not known to the store")]
	UnknownDefinition(DefinitionId),

	#[error("definition {id:?} is a member of {owner:?} and has no status of its own")]
	NotATypecheckUnit { id: DefinitionId, owner: DefinitionId },

	#[error("install for {file:?} at clock {clock} is older than the installed clock {current}")]
	OutOfOrderInstall { file: FileId, clock: ClockValue, current: ClockValue },

	#[error("definition store corrupted: {0}")]
	Corrupted(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
