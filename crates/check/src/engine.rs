use std::sync::Arc;
use std::time::{Duration, Instant};

use lemma_core::{ClockValue, ConcreteDefinition, DefinitionId, Diagnostic, TypecheckStatus};
use lemma_worker::StampedToken;
use smallvec::SmallVec;

use crate::error::EngineError;

/// Definitions handed to the engine as one unit.
#[derive(Debug, Clone)]
pub struct CheckGroup {
	/// In source order.
	pub members: SmallVec<[Arc<ConcreteDefinition>; 2]>,
	pub recursive: bool,
	/// Edit clock of the run the group belongs to.
	pub stamp: ClockValue,
}

impl CheckGroup {
	pub fn ids(&self) -> impl Iterator<Item = DefinitionId> + '_ {
		self.members.iter().map(|m| m.id)
	}

	pub fn len(&self) -> usize {
		self.members.len()
	}

	pub fn is_empty(&self) -> bool {
		self.members.is_empty()
	}
}

/// Wall-clock allowance for one group plus the run's cancellation.
///
/// Engines poll [`Budget::should_stop`] at convenient points and return
/// [`GroupVerdict::Interrupted`] once it fires. An engine that never polls is
/// still abandoned when the budget runs out; its result is then ignored.
#[derive(Debug, Clone)]
pub struct Budget {
	limit: Duration,
	deadline: Instant,
	token: StampedToken,
}

impl Budget {
	pub fn new(limit: Duration, token: StampedToken) -> Self {
		Self {
			limit,
			deadline: Instant::now() + limit,
			token,
		}
	}

	pub fn limit(&self) -> Duration {
		self.limit
	}

	pub fn deadline(&self) -> Instant {
		self.deadline
	}

	pub fn is_exhausted(&self) -> bool {
		Instant::now() >= self.deadline
	}

	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}

	pub fn should_stop(&self) -> bool {
		self.is_cancelled() || self.is_exhausted()
	}
}

/// Result for one member of a checked group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionVerdict {
	pub id: DefinitionId,
	/// Engine diagnostics; any error makes the definition `HasErrors`.
	pub diagnostics: Vec<Diagnostic>,
}

impl DefinitionVerdict {
	pub fn ok(id: DefinitionId) -> Self {
		Self {
			id,
			diagnostics: Vec::new(),
		}
	}

	pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
		self.diagnostics.push(diagnostic);
		self
	}

	pub fn status(&self) -> TypecheckStatus {
		if self.diagnostics.iter().any(Diagnostic::is_error) {
			TypecheckStatus::HasErrors
		} else {
			TypecheckStatus::Ok
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupVerdict {
	Checked(Vec<DefinitionVerdict>),
	/// The engine stopped because its budget said so.
	Interrupted,
}

/// The typechecker proper.
///
/// Called on a blocking worker, one group at a time per file. Implementations
/// must be safe to call concurrently for different files.
pub trait TypecheckEngine: Send + Sync {
	fn typecheck(&self, group: &CheckGroup, budget: &Budget) -> Result<GroupVerdict, EngineError>;
}
