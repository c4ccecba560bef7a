use std::sync::Arc;

use lemma_core::{
	ClockValue, DefinitionId, DefinitionPath, DefinitionStore, DiagnosticOrigin, DiagnosticSink, FileId, InstallReport, LibraryCache,
	TypecheckStatus,
};
use lemma_syntax::{SyntaxProvider, SyntaxTree};

use crate::error::Result;
use crate::scheduler::{RequestOutcome, RunRequest, TaskScheduler};

/// What one edit did in the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditReport {
	pub file: FileId,
	pub clock: ClockValue,
	/// Declarations seen by resolution, nested ones included.
	pub definitions: usize,
	pub edited: Option<DefinitionId>,
	pub install: InstallReport,
	pub request: RequestOutcome,
	/// Other files whose definitions the edit reset, each with its run request.
	pub dependent_files: Vec<(FileId, RequestOutcome)>,
}

/// Foreground half of the pipeline: resolve, install, report, then hand the
/// file to the scheduler, along with any other file whose definitions the
/// install reset.
pub struct FilePipeline {
	store: DefinitionStore,
	libraries: Arc<dyn LibraryCache>,
	sink: Arc<dyn DiagnosticSink>,
	scheduler: TaskScheduler,
}

impl FilePipeline {
	pub fn new(store: DefinitionStore, libraries: Arc<dyn LibraryCache>, sink: Arc<dyn DiagnosticSink>, scheduler: TaskScheduler) -> Self {
		Self {
			store,
			libraries,
			sink,
			scheduler,
		}
	}

	pub fn store(&self) -> &DefinitionStore {
		&self.store
	}

	pub fn scheduler(&self) -> &TaskScheduler {
		&self.scheduler
	}

	/// Handles a new tree for a file. Returns `None` for a tree older than
	/// what the store already holds.
	pub fn on_edit(&self, tree: &SyntaxTree, clock: ClockValue, edited: Option<&DefinitionPath>) -> Result<Option<EditReport>> {
		let file = tree.file;
		if clock < self.store.file_clock(file) {
			tracing::debug!(?file, %clock, installed = %self.store.file_clock(file), "pipeline.stale_edit");
			return Ok(None);
		}

		let mut resolution = lemma_resolve::resolve(tree, &self.store, self.libraries.as_ref());
		let definitions = resolution.count;
		let edited = edited.and_then(|path| self.store.lookup(file, path)).filter(|id| resolution.definitions.contains_key(id));
		let resolver_diagnostics = std::mem::take(&mut resolution.diagnostics);
		let install = self.store.install(file, clock, resolution.into_definitions())?;

		// Verdicts of removed or reset definitions no longer hold.
		for id in install.removed.iter().chain(&install.changed) {
			self.sink.clear_definition(*id, DiagnosticOrigin::Typechecker);
		}
		self.sink.clear(file, DiagnosticOrigin::Resolver);
		for diagnostic in resolver_diagnostics {
			self.sink.publish(diagnostic);
		}

		let ordering = lemma_order::order(&self.store.file_definitions(file)?, None, &self.store);
		self.sink.clear(file, DiagnosticOrigin::Orderer);
		for diagnostic in ordering.diagnostics {
			self.sink.publish(diagnostic);
		}

		let request = self.scheduler.request(RunRequest::new(file, clock).with_edited(edited));
		let mut others: Vec<FileId> = install
			.invalidated
			.iter()
			.filter_map(|id| self.store.referable(*id))
			.map(|r| r.file)
			.filter(|other| *other != file)
			.collect();
		others.sort();
		others.dedup();
		let dependent_files: Vec<(FileId, RequestOutcome)> =
			others.into_iter().map(|other| (other, self.scheduler.request_background_run(other, clock))).collect();
		tracing::debug!(?file, %clock, definitions, ?edited, ?request, dependent_files = dependent_files.len(), "pipeline.edit");
		Ok(Some(EditReport {
			file,
			clock,
			definitions,
			edited,
			install,
			request,
			dependent_files,
		}))
	}

	/// Pulls the latest tree of `file` from `provider` and handles it.
	pub fn on_snapshot(&self, provider: &dyn SyntaxProvider, file: FileId) -> Result<Option<EditReport>> {
		let Some(snapshot) = provider.snapshot(file) else {
			return Ok(None);
		};
		self.on_edit(&snapshot.tree, snapshot.clock, snapshot.edited.as_ref())
	}

	pub fn status(&self, id: DefinitionId) -> Option<TypecheckStatus> {
		self.store.status(id)
	}
}
