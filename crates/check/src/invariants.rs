//! Test harness (gated mock engine) and end-to-end pipeline invariants.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use lemma_config::{SchedulerConfig, TypecheckingConfig, TypecheckingMode};
use lemma_core::{
	ClockValue, CollectingSink, DefinitionId, DefinitionPath, DefinitionStore, Diagnostic, DiagnosticOrigin, FileId, MessageKey,
	ModulePath, NoLibraries, Severity, TypecheckStatus,
};
use lemma_resolve::Resolution;
use lemma_syntax::build::*;
use lemma_syntax::{SurfaceDecl, SyntaxTree};
use lemma_worker::StampedToken;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::broadcast;

use crate::engine::{Budget, CheckGroup, DefinitionVerdict, GroupVerdict, TypecheckEngine};
use crate::error::EngineError;
use crate::pipeline::FilePipeline;
use crate::scheduler::{RequestOutcome, RunEvent, RunResult, TaskScheduler};
use crate::typechecker::{BackgroundTypechecker, RunOutcome};

/// Engine that records its calls and can be held at a gate.
///
/// A gated engine spins until [`MockEngine::proceed`] or until its budget
/// says stop, so a test decides when a check finishes.
pub(crate) struct MockEngine {
	pub(crate) check_count: AtomicUsize,
	calls: Mutex<Vec<Vec<String>>>,
	gated: AtomicBool,
	slow: FxHashSet<String>,
	type_errors: FxHashSet<String>,
	failures: FxHashSet<String>,
}

impl MockEngine {
	pub(crate) fn new() -> Self {
		Self {
			check_count: AtomicUsize::new(0),
			calls: Mutex::new(Vec::new()),
			gated: AtomicBool::new(false),
			slow: FxHashSet::default(),
			type_errors: FxHashSet::default(),
			failures: FxHashSet::default(),
		}
	}

	pub(crate) fn gated() -> Self {
		let engine = Self::new();
		engine.gated.store(true, Ordering::SeqCst);
		engine
	}

	/// Never finishes `name` within any budget.
	pub(crate) fn with_slow(mut self, name: &str) -> Self {
		self.slow.insert(name.to_owned());
		self
	}

	pub(crate) fn with_type_error(mut self, name: &str) -> Self {
		self.type_errors.insert(name.to_owned());
		self
	}

	pub(crate) fn with_failure(mut self, name: &str) -> Self {
		self.failures.insert(name.to_owned());
		self
	}

	/// Opens the gate for every pending and future check.
	pub(crate) fn proceed(&self) {
		self.gated.store(false, Ordering::SeqCst);
	}

	pub(crate) fn checks(&self) -> usize {
		self.check_count.load(Ordering::SeqCst)
	}

	pub(crate) fn calls(&self) -> Vec<Vec<String>> {
		self.calls.lock().clone()
	}
}

impl TypecheckEngine for MockEngine {
	fn typecheck(&self, group: &CheckGroup, budget: &Budget) -> Result<GroupVerdict, EngineError> {
		self.calls.lock().push(group.members.iter().map(|m| m.name.clone()).collect());
		self.check_count.fetch_add(1, Ordering::SeqCst);

		let slow = group.members.iter().any(|m| self.slow.contains(&m.name));
		while slow || self.gated.load(Ordering::SeqCst) {
			if budget.should_stop() {
				return Ok(GroupVerdict::Interrupted);
			}
			std::thread::sleep(Duration::from_millis(1));
		}
		if let Some(member) = group.members.iter().find(|m| self.failures.contains(&m.name)) {
			return Err(EngineError::Failed(format!("cannot check {}", member.name)));
		}

		let verdicts = group
			.members
			.iter()
			.map(|m| {
				let verdict = DefinitionVerdict::ok(m.id);
				if self.type_errors.contains(&m.name) {
					verdict.with_diagnostic(Diagnostic::on_definition(
						m.file,
						m.id,
						Severity::Error,
						MessageKey::Engine("type_mismatch"),
						DiagnosticOrigin::Typechecker,
					))
				} else {
					verdict
				}
			})
			.collect();
		Ok(GroupVerdict::Checked(verdicts))
	}
}

/// Opens the gate on drop so no blocking thread outlives a failed test.
pub(crate) struct EngineGuard(pub(crate) Arc<MockEngine>);

impl Drop for EngineGuard {
	fn drop(&mut self) {
		self.0.proceed();
	}
}

pub(crate) fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}

pub(crate) fn smart(time_limit_ms: u64) -> TypecheckingConfig {
	TypecheckingConfig {
		mode: TypecheckingMode::Smart,
		time_limit_ms,
		follow_up: true,
	}
}

pub(crate) fn typechecker(store: &DefinitionStore, engine: &Arc<MockEngine>, sink: &Arc<CollectingSink>, config: TypecheckingConfig) -> BackgroundTypechecker {
	BackgroundTypechecker::new(store.clone(), engine.clone(), sink.clone(), config)
}

pub(crate) fn scheduler(typechecker: BackgroundTypechecker, max_concurrent_runs: usize) -> TaskScheduler {
	TaskScheduler::new(
		typechecker,
		&SchedulerConfig {
			max_concurrent_runs,
			idle_timeout_ms: 10_000,
		},
	)
}

pub(crate) fn install(store: &DefinitionStore, tree: &SyntaxTree, clock: ClockValue) -> Resolution {
	let resolution = lemma_resolve::resolve(tree, store, &NoLibraries);
	store.install(tree.file, clock, resolution.clone().into_definitions()).unwrap();
	resolution
}

pub(crate) fn id(store: &DefinitionStore, file: FileId, name: &str) -> DefinitionId {
	store.intern(file, &DefinitionPath::root(name))
}

pub(crate) fn term(name: &str) -> SurfaceDecl {
	SurfaceDecl::function(name).with_term(universe())
}

pub(crate) fn calls_of(name: &str, target: &str) -> SurfaceDecl {
	SurfaceDecl::function(name).with_term(lemma_syntax::build::name(target))
}

/// Polls `done` on the runtime's clock, for at most a few seconds.
pub(crate) async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
	for _ in 0..5000 {
		if done() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(1)).await;
	}
	done()
}

pub(crate) fn drain(events: &mut broadcast::Receiver<RunEvent>) -> Vec<RunEvent> {
	let mut out = Vec::new();
	while let Ok(event) = events.try_recv() {
		out.push(event);
	}
	out
}

fn finished(events: &[RunEvent]) -> Vec<(ClockValue, RunResult)> {
	events
		.iter()
		.filter_map(|e| match e {
			RunEvent::Finished { clock, result, .. } => Some((*clock, *result)),
			_ => None,
		})
		.collect()
}

struct Setup {
	store: DefinitionStore,
	sink: Arc<CollectingSink>,
	engine: Arc<MockEngine>,
	pipeline: FilePipeline,
	file: FileId,
}

fn setup(engine: MockEngine, config: TypecheckingConfig) -> (Setup, EngineGuard) {
	init_tracing();
	let store = DefinitionStore::new();
	let file = store.register_file(None);
	let sink = Arc::new(CollectingSink::new());
	let engine = Arc::new(engine);
	let scheduler = scheduler(typechecker(&store, &engine, &sink, config), 2);
	let pipeline = FilePipeline::new(store.clone(), Arc::new(NoLibraries), sink.clone(), scheduler);
	let guard = EngineGuard(engine.clone());
	(
		Setup {
			store,
			sink,
			engine,
			pipeline,
			file,
		},
		guard,
	)
}

#[tokio::test]
async fn dependencies_are_checked_before_dependents() {
	let (s, _guard) = setup(MockEngine::new(), smart(5000));
	let tree = SyntaxTree::new(s.file).with_decl(calls_of("B", "A")).with_decl(term("A"));

	let report = s.pipeline.on_edit(&tree, ClockValue(1), None).unwrap().unwrap();
	assert_eq!(report.request, RequestOutcome::Started);
	assert!(s.pipeline.scheduler().wait_idle(s.file).await);

	assert_eq!(s.engine.calls(), vec![vec!["A".to_owned()], vec!["B".to_owned()]]);
	assert_eq!(s.pipeline.status(id(&s.store, s.file, "A")), Some(TypecheckStatus::Ok));
	assert_eq!(s.pipeline.status(id(&s.store, s.file, "B")), Some(TypecheckStatus::Ok));
	assert!(s.sink.is_empty());
}

#[tokio::test]
async fn mutual_recursion_is_checked_in_one_engine_call() {
	let (s, _guard) = setup(MockEngine::new(), smart(5000));
	let tree = SyntaxTree::new(s.file).with_decl(calls_of("f", "g")).with_decl(calls_of("g", "f"));

	s.pipeline.on_edit(&tree, ClockValue(1), None).unwrap();
	assert!(s.pipeline.scheduler().wait_idle(s.file).await);

	assert_eq!(s.engine.checks(), 1);
	assert_eq!(s.engine.calls(), vec![vec!["f".to_owned(), "g".to_owned()]]);
	for name in ["f", "g"] {
		assert_eq!(s.pipeline.status(id(&s.store, s.file, name)), Some(TypecheckStatus::Ok));
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn newer_clock_supersedes_a_running_check() {
	let (s, _guard) = setup(MockEngine::gated(), smart(10_000));
	let mut events = s.pipeline.scheduler().subscribe();
	let tree = SyntaxTree::new(s.file).with_decl(term("x")).with_decl(term("y")).with_decl(term("z"));

	s.pipeline.on_edit(&tree, ClockValue(1), None).unwrap();
	assert!(wait_until(|| s.engine.checks() == 1).await);

	let second = s.pipeline.on_edit(&tree, ClockValue(2), None).unwrap().unwrap();
	assert_eq!(second.request, RequestOutcome::Superseded);
	s.engine.proceed();
	assert!(s.pipeline.scheduler().wait_idle(s.file).await);

	assert_eq!(finished(&drain(&mut events)), vec![(ClockValue(1), RunResult::Superseded), (ClockValue(2), RunResult::Committed)]);
	let report = s.pipeline.scheduler().last_report(s.file).unwrap();
	assert_eq!(report.stamp, ClockValue(2));
	assert_eq!(report.committed.len(), 3);
	for name in ["x", "y", "z"] {
		let def = id(&s.store, s.file, name);
		assert_eq!(s.pipeline.status(def), Some(TypecheckStatus::Ok));
		assert_eq!(s.store.writer(def), Some(ClockValue(2)));
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_definition_is_blacklisted_without_stopping_its_sibling() {
	let (s, _guard) = setup(MockEngine::new().with_slow("slow"), smart(50));
	let tree = SyntaxTree::new(s.file).with_decl(term("slow")).with_decl(term("fast"));

	s.pipeline.on_edit(&tree, ClockValue(1), None).unwrap();
	assert!(s.pipeline.scheduler().wait_idle(s.file).await);

	let (slow, fast) = (id(&s.store, s.file, "slow"), id(&s.store, s.file, "fast"));
	assert_eq!(s.pipeline.status(slow), Some(TypecheckStatus::Blacklisted));
	assert_eq!(s.pipeline.status(fast), Some(TypecheckStatus::Ok));
	let interrupted = s.sink.with_key(MessageKey::TypecheckingInterrupted);
	assert_eq!(interrupted.len(), 1);
	assert_eq!(interrupted[0].owner, Some(slow));
	assert_eq!(interrupted[0].severity, Severity::Warning);
	assert_eq!(s.engine.calls().iter().filter(|c| c.as_slice() == ["slow"]).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn only_the_newest_edit_commits() {
	let (s, _guard) = setup(MockEngine::gated(), smart(10_000));
	let mut events = s.pipeline.scheduler().subscribe();
	let tree = SyntaxTree::new(s.file).with_decl(term("a")).with_decl(calls_of("b", "a"));

	assert_eq!(s.pipeline.on_edit(&tree, ClockValue(1), None).unwrap().unwrap().request, RequestOutcome::Started);
	assert!(wait_until(|| s.engine.checks() == 1).await);
	for clock in 2..=5 {
		let report = s.pipeline.on_edit(&tree, ClockValue(clock), None).unwrap().unwrap();
		assert_eq!(report.request, RequestOutcome::Superseded);
	}
	assert!(s.pipeline.on_edit(&tree, ClockValue(3), None).unwrap().is_none());
	s.engine.proceed();
	assert!(s.pipeline.scheduler().wait_idle(s.file).await);

	let finished = finished(&drain(&mut events));
	assert!(finished.iter().all(|(clock, result)| (*result == RunResult::Committed) == (*clock == ClockValue(5))));
	for name in ["a", "b"] {
		assert_eq!(s.store.writer(id(&s.store, s.file, name)), Some(ClockValue(5)));
	}
}

#[tokio::test]
async fn edits_republish_foreground_diagnostics() {
	let (s, _guard) = setup(MockEngine::new(), smart(5000));
	let broken = SyntaxTree::new(s.file).with_decl(calls_of("a", "missing"));
	s.pipeline.on_edit(&broken, ClockValue(1), None).unwrap();
	assert_eq!(s.sink.with_key(MessageKey::UnresolvedName).len(), 1);

	let fixed = SyntaxTree::new(s.file).with_decl(term("a"));
	s.pipeline.on_edit(&fixed, ClockValue(2), None).unwrap();
	assert!(s.sink.with_key(MessageKey::UnresolvedName).is_empty());
	assert!(s.pipeline.scheduler().wait_idle(s.file).await);
	assert_eq!(s.pipeline.status(id(&s.store, s.file, "a")), Some(TypecheckStatus::Ok));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn definition_deleted_mid_run_is_skipped() {
	init_tracing();
	let store = DefinitionStore::new();
	let file = store.register_file(None);
	let sink = Arc::new(CollectingSink::new());
	let engine = Arc::new(MockEngine::gated());
	let _guard = EngineGuard(engine.clone());
	install(&store, &SyntaxTree::new(file).with_decl(term("a")).with_decl(term("b")), ClockValue(1));
	let (a, b) = (id(&store, file, "a"), id(&store, file, "b"));

	let checker = Arc::new(typechecker(&store, &engine, &sink, smart(10_000)));
	let token = StampedToken::new(1);
	let run = tokio::spawn({
		let (checker, token) = (checker.clone(), token.clone());
		async move { checker.run(file, None, &token).await }
	});
	assert!(wait_until(|| engine.checks() == 1).await);
	install(&store, &SyntaxTree::new(file).with_decl(term("a")), ClockValue(2));
	engine.proceed();

	let report = run.await.unwrap().unwrap();
	assert_eq!(report.outcome, RunOutcome::Completed);
	assert_eq!(report.committed, vec![a]);
	assert_eq!(report.discarded, vec![b]);
	assert_eq!(engine.checks(), 1);
	assert_eq!(store.status(a), Some(TypecheckStatus::Ok));
	assert_eq!(store.status(b), None);
}

#[tokio::test]
async fn edits_drop_verdicts_of_removed_and_changed_definitions() {
	let (s, _guard) = setup(MockEngine::new().with_type_error("a").with_type_error("b"), smart(5000));
	let type_errors = || s.sink.with_key(MessageKey::Engine("type_mismatch"));
	let tree = SyntaxTree::new(s.file).with_decl(term("a")).with_decl(term("b")).with_decl(term("c"));
	s.pipeline.on_edit(&tree, ClockValue(1), None).unwrap();
	assert!(s.pipeline.scheduler().wait_idle(s.file).await);
	assert_eq!(type_errors().len(), 2);

	// `a` is gone and `b` changed; the new run has not started yet.
	let edited = SyntaxTree::new(s.file).with_decl(calls_of("b", "c")).with_decl(term("c"));
	let report = s.pipeline.on_edit(&edited, ClockValue(2), None).unwrap().unwrap();
	assert_eq!(report.install.removed.len(), 1);
	assert!(type_errors().is_empty());

	assert!(s.pipeline.scheduler().wait_idle(s.file).await);
	let b = id(&s.store, s.file, "b");
	assert_eq!(s.pipeline.status(b), Some(TypecheckStatus::HasErrors));
	assert_eq!(type_errors().len(), 1);
	assert_eq!(type_errors()[0].owner, Some(b));
}

#[tokio::test]
async fn undeclared_edited_path_allocates_no_id() {
	let (s, _guard) = setup(MockEngine::new(), smart(5000));
	let tree = SyntaxTree::new(s.file).with_decl(term("a"));
	let ghost = DefinitionPath::root("ghost");

	let report = s.pipeline.on_edit(&tree, ClockValue(1), Some(&ghost)).unwrap().unwrap();

	assert_eq!(report.edited, None);
	assert_eq!(s.store.lookup(s.file, &ghost), None);
	assert!(s.pipeline.scheduler().wait_idle(s.file).await);
}

#[tokio::test]
async fn edits_recheck_dependents_in_other_files() {
	let (s, _guard) = setup(MockEngine::new(), smart(5000));
	let lib = s.store.register_file(Some(ModulePath::parse("Lib")));
	s.pipeline.on_edit(&SyntaxTree::new(lib).with_decl(term("helper")), ClockValue(1), None).unwrap();
	assert!(s.pipeline.scheduler().wait_idle(lib).await);
	let user = SyntaxTree::new(s.file).with_import("Lib").with_decl(calls_of("client", "helper"));
	s.pipeline.on_edit(&user, ClockValue(2), None).unwrap();
	assert!(s.pipeline.scheduler().wait_idle(s.file).await);
	let client = id(&s.store, s.file, "client");
	assert_eq!(s.pipeline.status(client), Some(TypecheckStatus::Ok));

	let changed = SyntaxTree::new(lib).with_decl(calls_of("helper", "other")).with_decl(term("other"));
	let report = s.pipeline.on_edit(&changed, ClockValue(3), None).unwrap().unwrap();
	assert_eq!(report.install.invalidated, vec![client]);
	assert_eq!(report.dependent_files, vec![(s.file, RequestOutcome::Started)]);

	assert!(s.pipeline.scheduler().wait_idle(lib).await);
	assert!(s.pipeline.scheduler().wait_idle(s.file).await);
	assert_eq!(s.pipeline.status(client), Some(TypecheckStatus::Ok));
	assert_eq!(s.store.writer(client), Some(ClockValue(3)));
}
