use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A reading of an [`EditClock`].
///
/// The only ordering primitive used for correctness decisions: a background
/// run is stamped with one of these and may only write results for
/// definitions whose latest resolution is not newer than the stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClockValue(pub u64);

impl fmt::Display for ClockValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Monotonic logical clock advanced on every semantically relevant edit.
///
/// Cloning shares the counter.
#[derive(Debug, Default, Clone)]
pub struct EditClock {
	value: Arc<AtomicU64>,
}

impl EditClock {
	/// Creates a clock reading 0; the first edit ticks it to 1.
	pub fn new() -> Self {
		Self::default()
	}

	pub fn current(&self) -> ClockValue {
		ClockValue(self.value.load(Ordering::Acquire))
	}

	/// Advances the clock and returns the new value.
	pub fn tick(&self) -> ClockValue {
		ClockValue(self.value.fetch_add(1, Ordering::AcqRel).wrapping_add(1))
	}

	/// Raises the clock to at least `value` (for clocks fed by an external provider).
	pub fn observe(&self, value: ClockValue) -> ClockValue {
		let prev = self.value.fetch_max(value.0, Ordering::AcqRel);
		ClockValue(prev.max(value.0))
	}
}
