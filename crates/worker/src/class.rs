/// Execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Async drivers of background typechecking runs.
	Background,
	/// CPU-heavy engine calls executed on the blocking pool.
	CpuBlocking,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Background => "background",
			Self::CpuBlocking => "cpu_blocking",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn labels_are_stable() {
		assert_eq!(TaskClass::Background.as_str(), "background");
		assert_eq!(TaskClass::CpuBlocking.as_str(), "cpu_blocking");
	}
}
