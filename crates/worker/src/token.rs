use tokio_util::sync::CancellationToken;

/// Cancellation token scoped to the logical stamp of the work it guards.
///
/// The stamp is the edit clock value a background run was requested at. A
/// child token shares the stamp, so group-level tokens can be cancelled on a
/// budget overrun without cancelling the whole run.
#[derive(Debug, Clone)]
pub struct StampedToken {
	stamp: u64,
	cancel: CancellationToken,
}

impl StampedToken {
	/// Creates a fresh token for the given stamp.
	pub fn new(stamp: u64) -> Self {
		Self {
			stamp,
			cancel: CancellationToken::new(),
		}
	}

	/// Returns the stamp this token was created for.
	pub const fn stamp(&self) -> u64 {
		self.stamp
	}

	/// Returns true when cancellation is requested.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Requests cancellation of this token and all its children.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Future resolving when cancellation is requested.
	pub async fn cancelled(&self) {
		self.cancel.cancelled().await;
	}

	/// Creates a child token in the same stamp.
	pub fn child(&self) -> Self {
		self.child_at(self.stamp)
	}

	/// Creates a child token for newer work under the same cancellation scope.
	pub fn child_at(&self, stamp: u64) -> Self {
		Self {
			stamp,
			cancel: self.cancel.child_token(),
		}
	}
}
