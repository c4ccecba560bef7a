use lemma_core::{ClockValue, DefinitionId, FileId};
use lemma_worker::StampedToken;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::typechecker::RunReport;

/// Where a file's slot is in its run cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
	Idle,
	/// Accepted and waiting for a concurrency permit.
	Queued(ClockValue),
	Running(ClockValue),
}

impl SlotState {
	pub const fn is_idle(self) -> bool {
		matches!(self, Self::Idle)
	}

	pub const fn clock(self) -> Option<ClockValue> {
		match self {
			Self::Idle => None,
			Self::Queued(clock) | Self::Running(clock) => Some(clock),
		}
	}
}

/// How a run left its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
	/// Ran to the end; its commits are in the store.
	Committed,
	/// Replaced by a request with a newer clock.
	Superseded,
	/// Cancelled through [`super::TaskScheduler::cancel`] or shutdown.
	Cancelled,
	/// Aborted by an internal fault.
	Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
	pub file: FileId,
	pub clock: ClockValue,
	/// Definition the edit touched, checked first.
	pub edited: Option<DefinitionId>,
	/// Issued by the scheduler after a run, at that run's clock.
	pub follow_up: bool,
}

impl RunRequest {
	pub fn new(file: FileId, clock: ClockValue) -> Self {
		Self {
			file,
			clock,
			edited: None,
			follow_up: false,
		}
	}

	pub fn with_edited(mut self, edited: Option<DefinitionId>) -> Self {
		self.edited = edited;
		self
	}

	pub fn follow_up(file: FileId, clock: ClockValue) -> Self {
		Self {
			follow_up: true,
			..Self::new(file, clock)
		}
	}
}

pub(super) struct Active {
	pub(super) request: RunRequest,
	pub(super) token: StampedToken,
	pub(super) superseded: bool,
}

/// Per-file scheduling state. At most one run is active per slot.
pub(super) struct FileSlot {
	pub(super) state: watch::Sender<SlotState>,
	/// Newest clock accepted for the file.
	pub(super) latest: Option<ClockValue>,
	pub(super) active: Option<Active>,
	pub(super) pending: Option<RunRequest>,
	pub(super) driver: Option<JoinHandle<()>>,
	pub(super) last: Option<(RunResult, Option<RunReport>)>,
}

impl FileSlot {
	pub(super) fn new() -> Self {
		Self {
			state: watch::channel(SlotState::Idle).0,
			latest: None,
			active: None,
			pending: None,
			driver: None,
			last: None,
		}
	}

	pub(super) fn set_state(&self, state: SlotState) {
		self.state.send_replace(state);
	}

	/// Whether a request at `clock` is still news for this file.
	pub(super) fn accepts(&self, request: &RunRequest) -> bool {
		match self.latest {
			Some(latest) if request.clock < latest => false,
			Some(latest) if request.clock == latest => request.follow_up,
			_ => true,
		}
	}
}
