//! Per-file background run scheduling.
//!
//! Goals:
//! - single-flight per file (one active run, at most one pending request)
//! - newest clock wins (an older queued or running request is superseded)
//! - global concurrency cap across files
//! - bounded waits (idle waits and shutdown use the configured timeout)

mod state;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lemma_config::SchedulerConfig;
use lemma_core::{ClockValue, FileId};
use lemma_worker::{StampedToken, TaskClass};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{Semaphore, broadcast};

pub use self::state::{RunRequest, RunResult, SlotState};
use self::state::{Active, FileSlot};
use crate::typechecker::{BackgroundTypechecker, RunOutcome, RunReport};

const EVENT_CAPACITY: usize = 256;

/// What [`TaskScheduler::request`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
	/// The file was idle; a run was started.
	Started,
	/// Accepted behind the active run.
	Queued,
	/// Accepted, and an older queued or running request was superseded.
	Superseded,
	/// Not newer than what the file already saw, or the scheduler is shut down.
	Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
	Dropped {
		file: FileId,
		clock: ClockValue,
	},
	/// A pending request was replaced before it started.
	Superseded {
		file: FileId,
		clock: ClockValue,
	},
	Started {
		file: FileId,
		clock: ClockValue,
	},
	Finished {
		file: FileId,
		clock: ClockValue,
		result: RunResult,
		planned: usize,
		finished: usize,
	},
}

struct Inner {
	typechecker: BackgroundTypechecker,
	permits: Arc<Semaphore>,
	slots: Mutex<FxHashMap<FileId, FileSlot>>,
	events: broadcast::Sender<RunEvent>,
	root: StampedToken,
	idle_timeout: Duration,
	closed: AtomicBool,
}

/// Cheap to clone; clones share the slots.
#[derive(Clone)]
pub struct TaskScheduler {
	inner: Arc<Inner>,
}

impl TaskScheduler {
	pub fn new(typechecker: BackgroundTypechecker, config: &SchedulerConfig) -> Self {
		Self {
			inner: Arc::new(Inner {
				typechecker,
				permits: Arc::new(Semaphore::new(config.max_concurrent_runs)),
				slots: Mutex::new(FxHashMap::default()),
				events: broadcast::channel(EVENT_CAPACITY).0,
				root: StampedToken::new(0),
				idle_timeout: config.idle_timeout(),
				closed: AtomicBool::new(false),
			}),
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
		self.inner.events.subscribe()
	}

	pub fn typechecker(&self) -> &BackgroundTypechecker {
		&self.inner.typechecker
	}

	/// Fire-and-forget run of the whole file at `clock`.
	pub fn request_background_run(&self, file: FileId, clock: ClockValue) -> RequestOutcome {
		self.request(RunRequest::new(file, clock))
	}

	pub fn request(&self, request: RunRequest) -> RequestOutcome {
		let (file, clock) = (request.file, request.clock);
		// Checked under the lock so a request racing `shutdown` spawns no driver.
		let mut slots = self.inner.slots.lock();
		if self.inner.closed.load(Ordering::Acquire) {
			self.inner.emit(RunEvent::Dropped { file, clock });
			return RequestOutcome::Dropped;
		}
		let slot = slots.entry(file).or_insert_with(FileSlot::new);
		if !slot.accepts(&request) {
			tracing::debug!(?file, %clock, latest = ?slot.latest, "scheduler.dropped");
			self.inner.emit(RunEvent::Dropped { file, clock });
			return RequestOutcome::Dropped;
		}
		slot.latest = Some(clock);

		let mut superseded = false;
		if let Some(pending) = slot.pending.take() {
			tracing::debug!(?file, clock = %pending.clock, newer = %clock, "scheduler.superseded");
			self.inner.emit(RunEvent::Superseded { file, clock: pending.clock });
			superseded = true;
		}
		if let Some(active) = &mut slot.active {
			if active.request.clock < clock && !active.superseded {
				tracing::debug!(?file, clock = %active.request.clock, newer = %clock, "scheduler.superseded");
				active.superseded = true;
				active.token.cancel();
				superseded = true;
			}
			slot.pending = Some(request);
			return if superseded { RequestOutcome::Superseded } else { RequestOutcome::Queued };
		}

		let token = self.inner.activate(slot, request.clone());
		slot.driver = Some(lemma_worker::spawn(TaskClass::Background, drive(self.inner.clone(), request, token)));
		RequestOutcome::Started
	}

	pub fn slot_state(&self, file: FileId) -> SlotState {
		self.inner.slots.lock().get(&file).map_or(SlotState::Idle, |slot| *slot.state.borrow())
	}

	pub fn last_result(&self, file: FileId) -> Option<RunResult> {
		self.inner.slots.lock().get(&file).and_then(|slot| slot.last.as_ref().map(|(result, _)| *result))
	}

	/// Report of the last run of `file` that got as far as running.
	pub fn last_report(&self, file: FileId) -> Option<RunReport> {
		self.inner.slots.lock().get(&file).and_then(|slot| slot.last.as_ref().and_then(|(_, report)| report.clone()))
	}

	/// Waits until `file` has no active or pending run, up to the idle timeout.
	pub async fn wait_idle(&self, file: FileId) -> bool {
		self.wait_idle_for(file, self.inner.idle_timeout).await
	}

	pub async fn wait_idle_for(&self, file: FileId, timeout: Duration) -> bool {
		let mut state = {
			let slots = self.inner.slots.lock();
			match slots.get(&file) {
				Some(slot) => slot.state.subscribe(),
				None => return true,
			}
		};
		matches!(tokio::time::timeout(timeout, state.wait_for(|s| s.is_idle())).await, Ok(Ok(_)))
	}

	/// Cancels the active run of `file` and drops its pending request.
	pub fn cancel(&self, file: FileId) -> bool {
		let mut slots = self.inner.slots.lock();
		let Some(slot) = slots.get_mut(&file) else {
			return false;
		};
		if let Some(pending) = slot.pending.take() {
			self.inner.emit(RunEvent::Superseded { file, clock: pending.clock });
		}
		match &slot.active {
			Some(active) => {
				tracing::debug!(?file, clock = %active.request.clock, "scheduler.cancel");
				active.token.cancel();
				true
			}
			None => false,
		}
	}

	/// Cancels everything and waits for the drivers, up to the idle timeout.
	/// Later requests are dropped.
	pub async fn shutdown(&self) {
		let drivers: Vec<_> = {
			let mut slots = self.inner.slots.lock();
			self.inner.closed.store(true, Ordering::Release);
			self.inner.root.cancel();
			slots
				.values_mut()
				.filter_map(|slot| {
					slot.pending = None;
					slot.driver.take()
				})
				.collect()
		};
		let deadline = tokio::time::Instant::now() + self.inner.idle_timeout;
		for driver in drivers {
			match tokio::time::timeout_at(deadline, driver).await {
				Ok(Ok(())) => {}
				Ok(Err(error)) => tracing::error!(%error, "scheduler.driver_failed"),
				Err(_) => tracing::warn!("scheduler.shutdown_timeout"),
			}
		}
	}
}

impl Inner {
	fn emit(&self, event: RunEvent) {
		// No subscribers is fine.
		let _ = self.events.send(event);
	}

	fn activate(&self, slot: &mut FileSlot, request: RunRequest) -> StampedToken {
		let token = self.root.child_at(request.clock.0);
		slot.set_state(SlotState::Queued(request.clock));
		slot.active = Some(Active {
			request,
			token: token.clone(),
			superseded: false,
		});
		token
	}

	/// Runs one request once a permit is free. `None` when cancelled before starting.
	async fn run_one(&self, request: &RunRequest, token: &StampedToken) -> Option<crate::error::Result<RunReport>> {
		let permit = tokio::select! {
			biased;
			_ = token.cancelled() => None,
			permit = self.permits.clone().acquire_owned() => permit.ok(),
		};
		let _permit = permit?;
		if token.is_cancelled() {
			return None;
		}

		if let Some(slot) = self.slots.lock().get(&request.file) {
			slot.set_state(SlotState::Running(request.clock));
		}
		self.emit(RunEvent::Started {
			file: request.file,
			clock: request.clock,
		});
		tracing::debug!(file = ?request.file, clock = %request.clock, edited = ?request.edited, follow_up = request.follow_up, "scheduler.run");
		Some(self.typechecker.run(request.file, request.edited, token).await)
	}

	/// Records a finished run and picks the next request for the slot.
	fn finish(&self, request: &RunRequest, run: Option<crate::error::Result<RunReport>>) -> Option<(RunRequest, StampedToken)> {
		let mut slots = self.slots.lock();
		let slot = slots.get_mut(&request.file)?;
		let superseded = slot.active.as_ref().is_some_and(|a| a.superseded);

		let (result, report) = match run {
			Some(Ok(report)) if report.outcome != RunOutcome::Cancelled => (RunResult::Committed, Some(report)),
			Some(Ok(report)) => (if superseded { RunResult::Superseded } else { RunResult::Cancelled }, Some(report)),
			None if superseded => (RunResult::Superseded, None),
			None => (RunResult::Cancelled, None),
			Some(Err(error)) => {
				tracing::error!(file = ?request.file, clock = %request.clock, %error, "scheduler.run_failed");
				(RunResult::Failed, None)
			}
		};
		self.emit(RunEvent::Finished {
			file: request.file,
			clock: request.clock,
			result,
			planned: report.as_ref().map_or(0, |r| r.planned),
			finished: report.as_ref().map_or(0, |r| r.finished),
		});

		let wants_more = result == RunResult::Committed && report.as_ref().is_some_and(|r| r.follow_up || r.restart);
		if wants_more && slot.pending.is_none() && slot.latest == Some(request.clock) && !self.closed.load(Ordering::Acquire) {
			tracing::debug!(file = ?request.file, clock = %request.clock, "scheduler.follow_up");
			slot.pending = Some(RunRequest::follow_up(request.file, request.clock));
		}
		slot.last = Some((result, report));

		match slot.pending.take() {
			Some(next) => {
				let token = self.activate(slot, next.clone());
				Some((next, token))
			}
			None => {
				slot.active = None;
				slot.set_state(SlotState::Idle);
				None
			}
		}
	}
}

async fn drive(inner: Arc<Inner>, mut request: RunRequest, mut token: StampedToken) {
	loop {
		let run = inner.run_one(&request, &token).await;
		match inner.finish(&request, run) {
			Some((next, next_token)) => {
				request = next;
				token = next_token;
			}
			None => break,
		}
	}
}

#[cfg(test)]
mod tests;
