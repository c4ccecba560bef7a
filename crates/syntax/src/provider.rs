use std::sync::Arc;

use lemma_core::{ClockValue, DefinitionPath, EditClock, FileId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::tree::SyntaxTree;

/// A parsed file together with the edit clock it was parsed at.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
	pub tree: Arc<SyntaxTree>,
	pub clock: ClockValue,
	/// Declaration the last edit landed in, if the edit was local to one.
	pub edited: Option<DefinitionPath>,
}

/// Source of syntax trees; implemented by the parser host.
pub trait SyntaxProvider: Send + Sync {
	/// Latest tree of `file`, or `None` if the file is unknown.
	fn snapshot(&self, file: FileId) -> Option<TreeSnapshot>;
}

/// Provider holding trees published by the host, ticking the shared clock
/// once per publish.
#[derive(Debug, Default)]
pub struct MemorySyntaxProvider {
	clock: EditClock,
	trees: Mutex<FxHashMap<FileId, TreeSnapshot>>,
}

impl MemorySyntaxProvider {
	pub fn new(clock: EditClock) -> Self {
		Self {
			clock,
			trees: Mutex::default(),
		}
	}

	pub fn clock(&self) -> &EditClock {
		&self.clock
	}

	/// Records a new tree for its file and returns the clock it was stamped with.
	pub fn publish(&self, tree: SyntaxTree, edited: Option<DefinitionPath>) -> ClockValue {
		let clock = self.clock.tick();
		let file = tree.file;
		self.trees.lock().insert(
			file,
			TreeSnapshot {
				tree: Arc::new(tree),
				clock,
				edited,
			},
		);
		clock
	}

	pub fn forget(&self, file: FileId) {
		self.trees.lock().remove(&file);
	}
}

impl SyntaxProvider for MemorySyntaxProvider {
	fn snapshot(&self, file: FileId) -> Option<TreeSnapshot> {
		self.trees.lock().get(&file).cloned()
	}
}
