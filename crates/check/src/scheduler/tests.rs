use std::sync::Arc;

use lemma_core::{ClockValue, CollectingSink, DefinitionStore, FileId, TypecheckStatus};
use lemma_syntax::SyntaxTree;
use pretty_assertions::assert_eq;

use super::*;
use crate::invariants::{EngineGuard, MockEngine, calls_of, drain, id, init_tracing, install, scheduler, smart, term, typechecker, wait_until};

fn setup(engine: MockEngine, max_concurrent_runs: usize) -> (DefinitionStore, Arc<MockEngine>, TaskScheduler, EngineGuard) {
	init_tracing();
	let store = DefinitionStore::new();
	let engine = Arc::new(engine);
	let sink = Arc::new(CollectingSink::new());
	let scheduler = scheduler(typechecker(&store, &engine, &sink, smart(10_000)), max_concurrent_runs);
	let guard = EngineGuard(engine.clone());
	(store, engine, scheduler, guard)
}

fn file_with(store: &DefinitionStore, names: &[&str], clock: u64) -> FileId {
	let file = store.register_file(None);
	let tree = names.iter().fold(SyntaxTree::new(file), |tree, name| tree.with_decl(term(name)));
	install(store, &tree, ClockValue(clock));
	file
}

#[tokio::test]
async fn run_commits_and_returns_to_idle() {
	let (store, _engine, scheduler, _guard) = setup(MockEngine::new(), 2);
	let mut events = scheduler.subscribe();
	let file = file_with(&store, &["a"], 1);

	assert_eq!(scheduler.request_background_run(file, ClockValue(1)), RequestOutcome::Started);
	assert!(scheduler.wait_idle(file).await);

	assert_eq!(scheduler.slot_state(file), SlotState::Idle);
	assert_eq!(scheduler.last_result(file), Some(RunResult::Committed));
	assert_eq!(store.status(id(&store, file, "a")), Some(TypecheckStatus::Ok));
	assert_eq!(
		drain(&mut events),
		vec![
			RunEvent::Started { file, clock: ClockValue(1) },
			RunEvent::Finished {
				file,
				clock: ClockValue(1),
				result: RunResult::Committed,
				planned: 1,
				finished: 1,
			},
		]
	);
}

#[tokio::test]
async fn requests_not_newer_than_the_last_are_dropped() {
	let (store, engine, scheduler, _guard) = setup(MockEngine::new(), 2);
	let file = file_with(&store, &["a"], 2);

	assert_eq!(scheduler.request_background_run(file, ClockValue(2)), RequestOutcome::Started);
	assert!(scheduler.wait_idle(file).await);
	assert_eq!(scheduler.request_background_run(file, ClockValue(2)), RequestOutcome::Dropped);
	assert_eq!(scheduler.request_background_run(file, ClockValue(1)), RequestOutcome::Dropped);
	assert!(scheduler.wait_idle(file).await);
	assert_eq!(engine.checks(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn newest_request_wins_over_running_and_queued_ones() {
	let (store, engine, scheduler, _guard) = setup(MockEngine::gated(), 2);
	let mut events = scheduler.subscribe();
	let file = file_with(&store, &["a"], 1);

	scheduler.request_background_run(file, ClockValue(1));
	assert!(wait_until(|| engine.checks() == 1).await);
	assert_eq!(scheduler.slot_state(file), SlotState::Running(ClockValue(1)));
	assert_eq!(scheduler.request_background_run(file, ClockValue(2)), RequestOutcome::Superseded);
	assert_eq!(scheduler.request_background_run(file, ClockValue(3)), RequestOutcome::Superseded);
	engine.proceed();
	assert!(scheduler.wait_idle(file).await);

	// Clock 2 is replaced either while pending or right after it started.
	let committed: Vec<ClockValue> = drain(&mut events)
		.into_iter()
		.filter_map(|e| match e {
			RunEvent::Finished {
				clock,
				result: RunResult::Committed,
				..
			} => Some(clock),
			_ => None,
		})
		.collect();
	assert_eq!(committed, vec![ClockValue(3)]);
	assert_eq!(scheduler.last_report(file).map(|r| r.stamp), Some(ClockValue(3)));
	assert_eq!(scheduler.last_result(file), Some(RunResult::Committed));
}

#[tokio::test]
async fn clean_focused_run_is_followed_by_a_full_pass() {
	let (store, engine, scheduler, _guard) = setup(MockEngine::new(), 2);
	let mut events = scheduler.subscribe();
	let file = store.register_file(None);
	install(
		&store,
		&SyntaxTree::new(file).with_decl(term("a")).with_decl(calls_of("b", "a")).with_decl(term("c")),
		ClockValue(1),
	);
	let b = id(&store, file, "b");

	let outcome = scheduler.request(RunRequest::new(file, ClockValue(1)).with_edited(Some(b)));
	assert_eq!(outcome, RequestOutcome::Started);
	assert!(wait_until(|| store.status(id(&store, file, "c")) == Some(TypecheckStatus::Ok)).await);
	assert!(scheduler.wait_idle(file).await);

	assert_eq!(engine.calls(), vec![vec!["a".to_owned()], vec!["b".to_owned()], vec!["c".to_owned()]]);
	let finished: Vec<ClockValue> = drain(&mut events)
		.into_iter()
		.filter_map(|e| match e {
			RunEvent::Finished { clock, .. } => Some(clock),
			_ => None,
		})
		.collect();
	assert_eq!(finished, vec![ClockValue(1), ClockValue(1)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn follow_up_yields_to_a_newer_edit() {
	let (store, engine, scheduler, _guard) = setup(MockEngine::gated(), 2);
	let file = file_with(&store, &["a", "b"], 1);
	let a = id(&store, file, "a");

	scheduler.request(RunRequest::new(file, ClockValue(1)).with_edited(Some(a)));
	assert!(wait_until(|| engine.checks() == 1).await);
	assert_eq!(scheduler.request(RunRequest::follow_up(file, ClockValue(0))), RequestOutcome::Dropped);
	assert_eq!(scheduler.request_background_run(file, ClockValue(2)), RequestOutcome::Superseded);
	engine.proceed();
	assert!(scheduler.wait_idle(file).await);

	let report = scheduler.last_report(file).unwrap();
	assert_eq!(report.stamp, ClockValue(2));
	assert!(!report.follow_up);
	assert_eq!(store.status(id(&store, file, "b")), Some(TypecheckStatus::Ok));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_stops_the_active_run() {
	let (store, engine, scheduler, _guard) = setup(MockEngine::gated(), 2);
	let file = file_with(&store, &["a"], 1);

	scheduler.request_background_run(file, ClockValue(1));
	assert!(wait_until(|| engine.checks() == 1).await);
	assert!(scheduler.cancel(file));
	assert!(scheduler.wait_idle(file).await);

	assert_eq!(scheduler.last_result(file), Some(RunResult::Cancelled));
	assert_eq!(store.status(id(&store, file, "a")), Some(TypecheckStatus::NotTypechecked));
	assert!(!scheduler.cancel(file));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrency_cap_queues_other_files() {
	let (store, engine, scheduler, _guard) = setup(MockEngine::gated(), 1);
	let first = file_with(&store, &["a"], 1);
	let second = file_with(&store, &["b"], 1);

	assert_eq!(scheduler.request_background_run(first, ClockValue(1)), RequestOutcome::Started);
	assert!(wait_until(|| engine.checks() == 1).await);
	assert_eq!(scheduler.request_background_run(second, ClockValue(1)), RequestOutcome::Started);
	tokio::time::sleep(std::time::Duration::from_millis(20)).await;

	assert_eq!(scheduler.slot_state(first), SlotState::Running(ClockValue(1)));
	assert_eq!(scheduler.slot_state(second), SlotState::Queued(ClockValue(1)));
	assert_eq!(engine.checks(), 1);

	engine.proceed();
	assert!(scheduler.wait_idle(first).await);
	assert!(scheduler.wait_idle(second).await);
	assert_eq!(engine.checks(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_cancels_and_refuses_new_work() {
	let (store, engine, scheduler, _guard) = setup(MockEngine::gated(), 2);
	let file = file_with(&store, &["a"], 1);

	scheduler.request_background_run(file, ClockValue(1));
	assert!(wait_until(|| engine.checks() == 1).await);
	scheduler.shutdown().await;

	assert_eq!(scheduler.slot_state(file), SlotState::Idle);
	assert_eq!(scheduler.last_result(file), Some(RunResult::Cancelled));
	assert_eq!(scheduler.request_background_run(file, ClockValue(2)), RequestOutcome::Dropped);
}

#[tokio::test]
async fn unknown_file_is_idle() {
	let (_store, _engine, scheduler, _guard) = setup(MockEngine::new(), 1);
	assert!(scheduler.wait_idle_for(FileId(42), std::time::Duration::from_millis(1)).await);
	assert_eq!(scheduler.slot_state(FileId(42)), SlotState::Idle);
}

#[tokio::test]
async fn requests_after_shutdown_spawn_nothing() {
	let (store, engine, scheduler, _guard) = setup(MockEngine::new(), 2);
	let mut events = scheduler.subscribe();
	let file = file_with(&store, &["a"], 1);

	scheduler.shutdown().await;
	assert_eq!(scheduler.request_background_run(file, ClockValue(1)), RequestOutcome::Dropped);
	tokio::task::yield_now().await;

	assert_eq!(engine.checks(), 0);
	assert_eq!(scheduler.slot_state(file), SlotState::Idle);
	assert_eq!(store.status(id(&store, file, "a")), Some(TypecheckStatus::NotTypechecked));
	assert_eq!(drain(&mut events), vec![RunEvent::Dropped { file, clock: ClockValue(1) }]);
}
