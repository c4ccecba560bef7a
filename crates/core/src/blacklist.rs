use std::time::{Duration, SystemTime};

use crate::clock::ClockValue;
use crate::ids::DefinitionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlacklistReason {
	/// Typechecking did not finish within the per-definition budget.
	Timeout { budget: Duration },
}

/// Record of a definition excluded from automatic re-checking.
///
/// Cleared when the definition itself is edited (its concrete form changes)
/// or explicitly through [`crate::DefinitionStore::clear_blacklist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlacklistEntry {
	pub id: DefinitionId,
	pub reason: BlacklistReason,
	/// Wall-clock time, for messages only.
	pub at: SystemTime,
	/// Stamp of the run that blacklisted the definition.
	pub clock: ClockValue,
}
