//! One background run over one file.
//!
//! A run is stamped with the edit clock it was requested at. It plans its
//! targets from the store, orders them into groups, and drives the engine
//! group by group on the blocking pool. Every write goes through the store's
//! conditional commit, so a run that fell behind the clock writes nothing.

use std::sync::Arc;
use std::time::Duration;

use lemma_config::{TypecheckingConfig, TypecheckingMode};
use lemma_core::{
	BlacklistReason, ClockValue, CommitOutcome, ConcreteDefinition, DefinitionId, DefinitionStore, Diagnostic, DiagnosticOrigin,
	DiagnosticSink, FileId, MessageKey, Severity, TypecheckStatus,
};
use lemma_order::{OrderGroup, Ordering};
use lemma_worker::{StampedToken, TaskClass};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::dumb::DumbChecker;
use crate::engine::{Budget, CheckGroup, DefinitionVerdict, GroupVerdict, TypecheckEngine};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
	/// Every planned group was attempted.
	Completed,
	/// The token fired; nothing after that point was written.
	Cancelled,
	/// Mode is off.
	Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
	pub file: FileId,
	pub stamp: ClockValue,
	pub mode: TypecheckingMode,
	pub outcome: RunOutcome,
	/// Definitions the plan selected.
	pub planned: usize,
	/// Planned definitions this run is done with: committed, blacklisted or held.
	pub finished: usize,
	pub committed: Vec<DefinitionId>,
	/// Results dropped because a newer clock owns the definition.
	pub discarded: Vec<DefinitionId>,
	pub blacklisted: Vec<DefinitionId>,
	/// Left untouched because they depend on a blacklisted definition.
	pub held: Vec<DefinitionId>,
	/// The run was focused on one edited definition that came out `Ok`.
	pub follow_up: bool,
	/// A group other than the last one was interrupted.
	pub restart: bool,
}

impl RunReport {
	fn new(file: FileId, stamp: ClockValue, mode: TypecheckingMode) -> Self {
		Self {
			file,
			stamp,
			mode,
			outcome: RunOutcome::Completed,
			planned: 0,
			finished: 0,
			committed: Vec::new(),
			discarded: Vec::new(),
			blacklisted: Vec::new(),
			held: Vec::new(),
			follow_up: false,
			restart: false,
		}
	}
}

/// Targets and order of a smart run.
#[derive(Debug, Clone)]
pub struct RunPlan {
	pub targets: Vec<Arc<ConcreteDefinition>>,
	pub ordering: Ordering,
	/// Planned around the edited definition only.
	pub focus: Option<DefinitionId>,
}

impl RunPlan {
	pub fn len(&self) -> usize {
		self.targets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.targets.is_empty()
	}
}

enum Execution {
	Checked(Vec<DefinitionVerdict>),
	TimedOut,
	Failed(EngineError),
	Cancelled,
}

pub struct BackgroundTypechecker {
	store: DefinitionStore,
	engine: Arc<dyn TypecheckEngine>,
	sink: Arc<dyn DiagnosticSink>,
	config: TypecheckingConfig,
}

impl BackgroundTypechecker {
	pub fn new(store: DefinitionStore, engine: Arc<dyn TypecheckEngine>, sink: Arc<dyn DiagnosticSink>, config: TypecheckingConfig) -> Self {
		Self {
			store,
			engine,
			sink,
			config,
		}
	}

	pub fn config(&self) -> &TypecheckingConfig {
		&self.config
	}

	pub fn store(&self) -> &DefinitionStore {
		&self.store
	}

	/// Selects what a smart run checks.
	///
	/// With an edited definition that still needs checking, the run covers it
	/// and the unchecked part of its dependency closure inside the file.
	/// Otherwise it covers every unchecked definition of the file. Blacklisted
	/// definitions are never selected.
	pub fn plan(&self, file: FileId, edited: Option<DefinitionId>) -> Result<RunPlan> {
		let definitions = self.store.file_definitions(file)?;
		let eligible = |def: &ConcreteDefinition| {
			!self.store.is_blacklisted(def.id) && self.store.status(def.id).is_some_and(TypecheckStatus::needs_typecheck)
		};

		let focus = edited.filter(|id| definitions.iter().any(|d| d.id == *id && eligible(d)));
		let targets: Vec<Arc<ConcreteDefinition>> = match focus {
			Some(root) => {
				let by_id: FxHashMap<DefinitionId, &Arc<ConcreteDefinition>> = definitions.iter().map(|d| (d.id, d)).collect();
				let mut selected = FxHashSet::default();
				let mut stack = vec![root];
				while let Some(id) = stack.pop() {
					let Some(def) = by_id.get(&id) else {
						continue;
					};
					if !eligible(def) || !selected.insert(id) {
						continue;
					}
					stack.extend(def.dependencies.iter().map(|d| d.target));
				}
				definitions.iter().filter(|d| selected.contains(&d.id)).cloned().collect()
			}
			None => definitions.iter().filter(|d| eligible(d)).cloned().collect(),
		};

		let ordering = lemma_order::order(&targets, edited, &self.store);
		Ok(RunPlan { targets, ordering, focus })
	}

	/// Runs the configured mode for `file` at the token's stamp.
	pub async fn run(&self, file: FileId, edited: Option<DefinitionId>, token: &StampedToken) -> Result<RunReport> {
		let stamp = ClockValue(token.stamp());
		let mut report = RunReport::new(file, stamp, self.config.mode);
		match self.config.mode {
			TypecheckingMode::Off => {
				report.outcome = RunOutcome::Skipped;
				Ok(report)
			}
			TypecheckingMode::Dumb => self.run_dumb(file, token, report),
			TypecheckingMode::Smart => self.run_smart(file, edited, token, report).await,
		}
	}

	fn run_dumb(&self, file: FileId, token: &StampedToken, mut report: RunReport) -> Result<RunReport> {
		let definitions = self.store.file_definitions(file)?;
		report.planned = definitions.len();
		let mut diagnostics = Vec::new();
		for definition in &definitions {
			if token.is_cancelled() {
				report.outcome = RunOutcome::Cancelled;
				return Ok(report);
			}
			diagnostics.extend(DumbChecker.check(definition));
			report.finished += 1;
		}
		self.sink.clear(file, DiagnosticOrigin::DumbChecker);
		for diagnostic in diagnostics {
			self.sink.publish(diagnostic);
		}
		Ok(report)
	}

	async fn run_smart(&self, file: FileId, edited: Option<DefinitionId>, token: &StampedToken, mut report: RunReport) -> Result<RunReport> {
		let stamp = report.stamp;
		let plan = self.plan(file, edited)?;
		report.planned = plan.len();
		let by_id: FxHashMap<DefinitionId, Arc<ConcreteDefinition>> = plan.targets.iter().map(|d| (d.id, d.clone())).collect();
		let mut stopped: FxHashSet<DefinitionId> = plan.ordering.held.iter().copied().collect();
		let groups = &plan.ordering.groups;

		tracing::debug!(?file, clock = %stamp, planned = report.planned, groups = groups.len(), focus = ?plan.focus, "typecheck.plan");

		for (index, group) in groups.iter().enumerate() {
			if token.is_cancelled() {
				report.outcome = RunOutcome::Cancelled;
				break;
			}
			if self.is_held(group, &by_id, &stopped) {
				tracing::debug!(?file, clock = %stamp, members = ?group.members, "typecheck.held");
				stopped.extend(group.members.iter().copied());
				report.held.extend(group.members.iter().copied());
				report.finished += group.len();
				continue;
			}

			let claimed = self.store.begin(&group.members, stamp)?;
			if claimed.len() < group.len() {
				tracing::debug!(?file, clock = %stamp, members = ?group.members, "typecheck.stale_discard");
				self.store.release(&claimed, stamp);
				report.discarded.extend(group.members.iter().copied());
				continue;
			}

			let check = CheckGroup {
				members: group.members.iter().filter_map(|id| by_id.get(id).cloned()).collect(),
				recursive: group.recursive,
				stamp,
			};
			let limit = self.config.time_limit() * group.len() as u32;
			match self.execute(check, limit, token).await {
				Execution::Cancelled => {
					self.store.release(&claimed, stamp);
					report.outcome = RunOutcome::Cancelled;
					break;
				}
				// Cancellation may land while the engine finishes.
				_ if token.is_cancelled() => {
					self.store.release(&claimed, stamp);
					report.outcome = RunOutcome::Cancelled;
					break;
				}
				Execution::Checked(verdicts) => self.commit_verdicts(file, group, verdicts, &mut report)?,
				Execution::Failed(error) => {
					tracing::warn!(?file, clock = %stamp, members = ?group.members, %error, "typecheck.engine_failed");
					let verdicts = group
						.members
						.iter()
						.map(|id| {
							DefinitionVerdict::ok(*id).with_diagnostic(
								Diagnostic::on_definition(file, *id, Severity::Error, MessageKey::Engine("engine_failure"), DiagnosticOrigin::Typechecker)
									.with_arg(error.to_string()),
							)
						})
						.collect();
					self.commit_verdicts(file, group, verdicts, &mut report)?;
				}
				Execution::TimedOut => {
					tracing::warn!(?file, clock = %stamp, members = ?group.members, budget_ms = limit.as_millis() as u64, "typecheck.interrupted");
					self.blacklist_group(file, group, limit, &mut report)?;
					stopped.extend(group.members.iter().copied());
					if index + 1 < groups.len() {
						report.restart = true;
					}
				}
			}
		}

		report.follow_up = self.config.follow_up
			&& report.outcome == RunOutcome::Completed
			&& plan.focus.is_some_and(|id| report.committed.contains(&id) && self.store.status(id) == Some(TypecheckStatus::Ok));

		tracing::debug!(
			?file,
			clock = %stamp,
			outcome = ?report.outcome,
			committed = report.committed.len(),
			discarded = report.discarded.len(),
			blacklisted = report.blacklisted.len(),
			held = report.held.len(),
			"typecheck.finished"
		);
		Ok(report)
	}

	/// A group waits when any member depends on a definition stopped in this run.
	fn is_held(&self, group: &OrderGroup, by_id: &FxHashMap<DefinitionId, Arc<ConcreteDefinition>>, stopped: &FxHashSet<DefinitionId>) -> bool {
		group.members.iter().any(|id| {
			stopped.contains(id)
				|| by_id
					.get(id)
					.is_some_and(|def| def.dependencies.iter().any(|d| !group.contains(d.target) && stopped.contains(&d.target)))
		})
	}

	async fn execute(&self, check: CheckGroup, limit: Duration, token: &StampedToken) -> Execution {
		let group_token = token.child();
		let budget = Budget::new(limit, group_token.clone());
		let engine = self.engine.clone();
		let handle = lemma_worker::spawn_blocking(TaskClass::CpuBlocking, move || engine.typecheck(&check, &budget));

		tokio::select! {
			biased;
			_ = token.cancelled() => Execution::Cancelled,
			joined = tokio::time::timeout(limit, handle) => match joined {
				Err(_) => {
					group_token.cancel();
					Execution::TimedOut
				}
				Ok(Err(join)) => {
					tracing::warn!(error = %join, "typecheck.engine_panicked");
					Execution::Failed(EngineError::Panicked(join.to_string()))
				}
				Ok(Ok(Err(error))) => Execution::Failed(error),
				Ok(Ok(Ok(GroupVerdict::Interrupted))) if token.is_cancelled() => Execution::Cancelled,
				Ok(Ok(Ok(GroupVerdict::Interrupted))) => Execution::TimedOut,
				Ok(Ok(Ok(GroupVerdict::Checked(verdicts)))) => Execution::Checked(verdicts),
			},
		}
	}

	fn commit_verdicts(&self, file: FileId, group: &OrderGroup, mut verdicts: Vec<DefinitionVerdict>, report: &mut RunReport) -> Result<()> {
		let stamp = report.stamp;
		if let Some(missing) = group.members.iter().find(|id| !verdicts.iter().any(|v| v.id == **id)) {
			let error = EngineError::MissingVerdict(*missing);
			tracing::warn!(?file, clock = %stamp, %error, "typecheck.engine_failed");
			verdicts.retain(|v| group.contains(v.id));
			for id in &group.members {
				if !verdicts.iter().any(|v| v.id == *id) {
					verdicts.push(DefinitionVerdict::ok(*id).with_diagnostic(
						Diagnostic::on_definition(file, *id, Severity::Error, MessageKey::Engine("missing_verdict"), DiagnosticOrigin::Typechecker)
							.with_arg(error.to_string()),
					));
				}
			}
		}

		for id in &group.members {
			let Some(verdict) = verdicts.iter().find(|v| v.id == *id) else {
				continue;
			};
			match self.store.commit(*id, stamp, verdict.status())? {
				CommitOutcome::Committed => {
					self.sink.clear_definition(*id, DiagnosticOrigin::Typechecker);
					for diagnostic in &verdict.diagnostics {
						self.sink.publish(diagnostic.clone().with_owner(*id));
					}
					report.committed.push(*id);
					report.finished += 1;
				}
				CommitOutcome::Stale => {
					tracing::debug!(?file, clock = %stamp, def = ?id, "typecheck.stale_discard");
					report.discarded.push(*id);
				}
			}
		}
		Ok(())
	}

	fn blacklist_group(&self, file: FileId, group: &OrderGroup, budget: Duration, report: &mut RunReport) -> Result<()> {
		let stamp = report.stamp;
		for id in &group.members {
			match self.store.blacklist(*id, stamp, BlacklistReason::Timeout { budget })? {
				CommitOutcome::Committed => {
					self.sink.clear_definition(*id, DiagnosticOrigin::Typechecker);
					self.sink.publish(
						Diagnostic::on_definition(file, *id, Severity::Warning, MessageKey::TypecheckingInterrupted, DiagnosticOrigin::Typechecker)
							.with_arg(budget.as_millis().to_string()),
					);
					report.blacklisted.push(*id);
					report.finished += 1;
				}
				CommitOutcome::Stale => report.discarded.push(*id),
			}
		}
		Ok(())
	}
}
