//! The definition store: the only state shared between foreground
//! resolution and background typechecking.
//!
//! Writes of typecheck statuses follow a single-writer-per-definition rule:
//! a run stamped with clock `c` may write a definition's status only while
//! `c` is not older than the definition's latest resolution and not older than
//! the stamp of the last run that wrote it. Everything else is discarded as
//! stale.

use std::sync::Arc;
use std::time::SystemTime;

use indexmap::IndexSet;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::blacklist::{BlacklistEntry, BlacklistReason};
use crate::clock::ClockValue;
use crate::concrete::{ConcreteDefinition, DefinitionKind, Precedence};
use crate::error::{Result, StoreError};
use crate::ids::{DefinitionId, DefinitionPath, FileId, ModulePath};
use crate::library::CachedDefinition;
use crate::status::TypecheckStatus;

/// Name-level view of a definition, enough for name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referable {
	pub id: DefinitionId,
	pub file: FileId,
	pub name: String,
	pub kind: DefinitionKind,
	pub precedence: Precedence,
	/// Owning data or class definition of a constructor or field.
	pub owner: Option<DefinitionId>,
}

/// Outcome of a conditional status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
	Committed,
	/// A newer resolution or a newer run owns the definition; nothing was written.
	Stale,
}

/// What an [`DefinitionStore::install`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
	/// New or semantically changed definitions, reset to `NotTypechecked`.
	pub changed: Vec<DefinitionId>,
	/// Definitions whose concrete form is unchanged; statuses kept.
	pub unchanged: Vec<DefinitionId>,
	/// Definitions no longer present in the file; their ids are retired.
	pub removed: Vec<DefinitionId>,
	/// Transitive dependents of changed/removed definitions reset to `NotTypechecked`.
	pub invalidated: Vec<DefinitionId>,
}

struct DefEntry {
	file: FileId,
	kind: DefinitionKind,
	precedence: Precedence,
	owner: Option<DefinitionId>,
	concrete: Option<Arc<ConcreteDefinition>>,
	fingerprint: Option<ConcreteDefinition>,
	status: TypecheckStatus,
	/// Clock of the resolution (or dependency invalidation) that last reset this entry.
	resolved_at: ClockValue,
	/// Stamp of the last run that wrote the status.
	writer: Option<ClockValue>,
	targets: Vec<DefinitionId>,
}

impl DefEntry {
	fn member(file: FileId, kind: DefinitionKind, owner: DefinitionId) -> Self {
		Self {
			file,
			kind,
			precedence: Precedence::default(),
			owner: Some(owner),
			concrete: None,
			fingerprint: None,
			status: TypecheckStatus::NotTypechecked,
			resolved_at: ClockValue::default(),
			writer: None,
			targets: Vec::new(),
		}
	}

	fn may_write(&self, stamp: ClockValue) -> bool {
		stamp >= self.resolved_at && self.writer.is_none_or(|w| w <= stamp)
	}
}

#[derive(Default)]
struct FileEntry {
	module: Option<ModulePath>,
	library: bool,
	clock: ClockValue,
	units: IndexSet<DefinitionId>,
	members: FxHashSet<DefinitionId>,
}

#[derive(Default)]
struct StoreInner {
	next_definition: u32,
	next_file: u32,
	paths: FxHashMap<(FileId, DefinitionPath), DefinitionId>,
	interned: FxHashMap<DefinitionId, (FileId, DefinitionPath)>,
	entries: FxHashMap<DefinitionId, DefEntry>,
	files: FxHashMap<FileId, FileEntry>,
	modules: FxHashMap<ModulePath, FileId>,
	dependents: FxHashMap<DefinitionId, FxHashSet<DefinitionId>>,
	blacklist: FxHashMap<DefinitionId, BlacklistEntry>,
}

impl StoreInner {
	fn intern(&mut self, file: FileId, path: &DefinitionPath) -> DefinitionId {
		if let Some(id) = self.paths.get(&(file, path.clone())) {
			return *id;
		}
		let id = DefinitionId(self.next_definition);
		self.next_definition += 1;
		self.paths.insert((file, path.clone()), id);
		self.interned.insert(id, (file, path.clone()));
		id
	}

	fn retire(&mut self, id: DefinitionId) {
		self.entries.remove(&id);
		self.blacklist.remove(&id);
		if let Some(key) = self.interned.remove(&id) {
			self.paths.remove(&key);
		}
	}

	fn unlink_targets(&mut self, id: DefinitionId, targets: &[DefinitionId]) {
		for target in targets {
			if let Some(set) = self.dependents.get_mut(target) {
				set.remove(&id);
			}
		}
	}

	fn referable(&self, id: DefinitionId) -> Option<Referable> {
		let entry = self.entries.get(&id)?;
		let (_, path) = self.interned.get(&id)?;
		Some(Referable {
			id,
			file: entry.file,
			name: path.name().to_owned(),
			kind: entry.kind,
			precedence: entry.precedence,
			owner: entry.owner,
		})
	}

	fn unit_entry_mut(&mut self, id: DefinitionId) -> Result<&mut DefEntry> {
		let entry = self.entries.get_mut(&id).ok_or(StoreError::UnknownDefinition(id))?;
		if let Some(owner) = entry.owner {
			return Err(StoreError::NotATypecheckUnit { id, owner });
		}
		Ok(entry)
	}
}

/// Shared handle to the definition store. Cloning shares the state.
#[derive(Clone, Default)]
pub struct DefinitionStore {
	inner: Arc<RwLock<StoreInner>>,
}

impl std::fmt::Debug for DefinitionStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = self.inner.read();
		f.debug_struct("DefinitionStore")
			.field("files", &inner.files.len())
			.field("definitions", &inner.entries.len())
			.field("blacklisted", &inner.blacklist.len())
			.finish()
	}
}

impl DefinitionStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a source file, optionally under a module name for imports.
	///
	/// Registering a module name twice returns the existing file.
	pub fn register_file(&self, module: Option<ModulePath>) -> FileId {
		let mut inner = self.inner.write();
		if let Some(module) = &module
			&& let Some(file) = inner.modules.get(module)
		{
			return *file;
		}
		let file = FileId(inner.next_file);
		inner.next_file += 1;
		if let Some(module) = &module {
			inner.modules.insert(module.clone(), file);
		}
		inner.files.insert(file, FileEntry { module, ..FileEntry::default() });
		file
	}

	pub fn module_file(&self, module: &ModulePath) -> Option<FileId> {
		self.inner.read().modules.get(module).copied()
	}

	pub fn file_module(&self, file: FileId) -> Option<ModulePath> {
		self.inner.read().files.get(&file).and_then(|f| f.module.clone())
	}

	/// Returns the stable id for a declaration path, allocating one on first use.
	pub fn intern(&self, file: FileId, path: &DefinitionPath) -> DefinitionId {
		self.inner.write().intern(file, path)
	}

	/// The id of a declaration path, if one was ever interned and not retired.
	pub fn lookup(&self, file: FileId, path: &DefinitionPath) -> Option<DefinitionId> {
		self.inner.read().paths.get(&(file, path.clone())).copied()
	}

	pub fn path(&self, id: DefinitionId) -> Option<DefinitionPath> {
		self.inner.read().interned.get(&id).map(|(_, path)| path.clone())
	}

	/// Installs the concrete definitions of one resolution pass over `file`.
	///
	/// Semantically unchanged definitions keep their status (only the snapshot
	/// is replaced, since spans may have moved). Changed definitions are reset
	/// and un-blacklisted; their transitive dependents are reset and stamped
	/// with `clock` so results computed against the old dependency are
	/// rejected. Definitions missing from the pass are removed.
	pub fn install(&self, file: FileId, clock: ClockValue, definitions: Vec<ConcreteDefinition>) -> Result<InstallReport> {
		let mut inner = self.inner.write();
		let current = inner.files.get(&file).map(|f| f.clock).unwrap_or_default();
		if clock < current {
			return Err(StoreError::OutOfOrderInstall { file, clock, current });
		}
		// Reject the whole pass before touching anything.
		if let Some(unknown) = definitions.iter().map(|d| d.id).find(|id| !inner.interned.contains_key(id)) {
			return Err(StoreError::UnknownDefinition(unknown));
		}

		let file_entry = inner.files.entry(file).or_default();
		file_entry.clock = clock;
		let previous_units = std::mem::take(&mut file_entry.units);
		let previous_members = std::mem::take(&mut file_entry.members);

		let mut report = InstallReport::default();
		let mut units = IndexSet::with_capacity(definitions.len());
		let mut members = FxHashSet::default();
		let mut seeds = Vec::new();

		for def in definitions {
			let id = def.id;
			for (member, _, kind) in def.members() {
				inner.entries.insert(member, DefEntry::member(file, kind, id));
				members.insert(member);
			}

			let fingerprint = def.without_spans();
			let targets: Vec<DefinitionId> = def.dependencies.iter().map(|d| d.target).collect();
			let unchanged = inner
				.entries
				.get(&id)
				.and_then(|e| e.fingerprint.as_ref())
				.is_some_and(|old| *old == fingerprint);

			if unchanged {
				if let Some(entry) = inner.entries.get_mut(&id) {
					entry.concrete = Some(Arc::new(def));
				}
				report.unchanged.push(id);
			} else {
				if let Some(old) = inner.entries.get(&id) {
					let old_targets = old.targets.clone();
					inner.unlink_targets(id, &old_targets);
				}
				for target in &targets {
					inner.dependents.entry(*target).or_default().insert(id);
				}
				inner.blacklist.remove(&id);
				inner.entries.insert(
					id,
					DefEntry {
						file,
						kind: def.kind,
						precedence: def.precedence,
						owner: None,
						concrete: Some(Arc::new(def)),
						fingerprint: Some(fingerprint),
						status: TypecheckStatus::NotTypechecked,
						resolved_at: clock,
						writer: None,
						targets,
					},
				);
				report.changed.push(id);
				seeds.push(id);
			}
			units.insert(id);
		}

		for id in previous_units.iter().filter(|id| !units.contains(*id)) {
			if let Some(old) = inner.entries.get(id) {
				let old_targets = old.targets.clone();
				inner.unlink_targets(*id, &old_targets);
			}
			inner.retire(*id);
			report.removed.push(*id);
			seeds.push(*id);
		}
		for id in previous_members.iter().filter(|id| !members.contains(*id)) {
			inner.retire(*id);
		}

		if let Some(file_entry) = inner.files.get_mut(&file) {
			file_entry.units = units;
			file_entry.members = members;
		}

		let changed: FxHashSet<DefinitionId> = report.changed.iter().copied().collect();
		let mut visited = FxHashSet::default();
		let mut queue = seeds.clone();
		while let Some(seed) = queue.pop() {
			let Some(dependents) = inner.dependents.get(&seed) else {
				continue;
			};
			let mut dependents: Vec<DefinitionId> = dependents.iter().copied().collect();
			dependents.sort();
			for dependent in dependents {
				if changed.contains(&dependent) || !visited.insert(dependent) {
					continue;
				}
				let Some(entry) = inner.entries.get_mut(&dependent) else {
					continue;
				};
				entry.resolved_at = entry.resolved_at.max(clock);
				if !matches!(entry.status, TypecheckStatus::NotTypechecked | TypecheckStatus::Blacklisted) {
					entry.status = TypecheckStatus::NotTypechecked;
					entry.writer = None;
					report.invalidated.push(dependent);
				}
				queue.push(dependent);
			}
		}
		for id in &report.removed {
			inner.dependents.remove(id);
		}

		tracing::debug!(
			?file,
			%clock,
			changed = report.changed.len(),
			unchanged = report.unchanged.len(),
			removed = report.removed.len(),
			invalidated = report.invalidated.len(),
			"store.install"
		);
		Ok(report)
	}

	/// Interns a definition served by the library cache.
	///
	/// Cached definitions carry their committed status and are never
	/// re-typechecked by this store's runs.
	pub fn import_cached(&self, module: &ModulePath, cached: &CachedDefinition) -> DefinitionId {
		let file = self.module_file(module).unwrap_or_else(|| {
			let file = self.register_file(Some(module.clone()));
			if let Some(entry) = self.inner.write().files.get_mut(&file) {
				entry.library = true;
			}
			file
		});

		let mut inner = self.inner.write();
		let path = DefinitionPath::root(cached.name.clone());
		let id = inner.intern(file, &path);
		if inner.entries.contains_key(&id) {
			return id;
		}
		inner.entries.insert(
			id,
			DefEntry {
				file,
				kind: cached.kind,
				precedence: cached.precedence,
				owner: None,
				concrete: None,
				fingerprint: None,
				status: cached.status,
				resolved_at: ClockValue::default(),
				writer: None,
				targets: Vec::new(),
			},
		);
		for member in &cached.members {
			let member_id = inner.intern(file, &path.child(member.name.clone()));
			inner.entries.insert(member_id, DefEntry::member(file, member.kind, id));
		}
		if let Some(entry) = inner.files.get_mut(&file) {
			entry.units.insert(id);
		}
		id
	}

	pub fn is_library_file(&self, file: FileId) -> bool {
		self.inner.read().files.get(&file).is_some_and(|f| f.library)
	}

	pub fn definition(&self, id: DefinitionId) -> Option<Arc<ConcreteDefinition>> {
		self.inner.read().entries.get(&id).and_then(|e| e.concrete.clone())
	}

	pub fn referable(&self, id: DefinitionId) -> Option<Referable> {
		self.inner.read().referable(id)
	}

	/// Status of a definition; members report their owner's status.
	pub fn status(&self, id: DefinitionId) -> Option<TypecheckStatus> {
		let inner = self.inner.read();
		let entry = inner.entries.get(&id)?;
		match entry.owner {
			Some(owner) => inner.entries.get(&owner).map(|e| e.status),
			None => Some(entry.status),
		}
	}

	/// The definition that is typechecked for `id` (its owner for members).
	pub fn typecheck_unit(&self, id: DefinitionId) -> DefinitionId {
		self.inner.read().entries.get(&id).and_then(|e| e.owner).unwrap_or(id)
	}

	pub fn resolved_at(&self, id: DefinitionId) -> Option<ClockValue> {
		self.inner.read().entries.get(&id).map(|e| e.resolved_at)
	}

	pub fn writer(&self, id: DefinitionId) -> Option<ClockValue> {
		self.inner.read().entries.get(&id).and_then(|e| e.writer)
	}

	/// Concrete definitions of a file in source order.
	pub fn file_definitions(&self, file: FileId) -> Result<Vec<Arc<ConcreteDefinition>>> {
		let inner = self.inner.read();
		let Some(entry) = inner.files.get(&file) else {
			return Ok(Vec::new());
		};
		entry
			.units
			.iter()
			.map(|id| {
				inner
					.entries
					.get(id)
					.and_then(|e| e.concrete.clone())
					.ok_or_else(|| StoreError::Corrupted(format!("file {file:?} lists {id:?} without a concrete definition")))
			})
			.collect()
	}

	pub fn file_clock(&self, file: FileId) -> ClockValue {
		self.inner.read().files.get(&file).map(|f| f.clock).unwrap_or_default()
	}

	/// Top-level names a file exports: root declarations plus their constructors and fields.
	pub fn exported(&self, file: FileId) -> Vec<Referable> {
		let inner = self.inner.read();
		let Some(entry) = inner.files.get(&file) else {
			return Vec::new();
		};
		let mut out = Vec::new();
		for id in &entry.units {
			if inner.interned.get(id).is_some_and(|(_, path)| path.depth() == 1) {
				out.extend(inner.referable(*id));
				out.extend(Self::members_of(&inner, *id));
			}
		}
		out
	}

	/// Names reachable as `id.name`: members and `where`-block declarations.
	pub fn children(&self, id: DefinitionId) -> Vec<Referable> {
		let inner = self.inner.read();
		let Some((file, path)) = inner.interned.get(&id) else {
			return Vec::new();
		};
		let mut out: Vec<Referable> = Self::members_of(&inner, id);
		if let Some(entry) = inner.files.get(file) {
			for unit in &entry.units {
				let nested = inner.interned.get(unit).is_some_and(|(_, p)| p.parent().as_ref() == Some(path));
				if nested {
					out.extend(inner.referable(*unit));
				}
			}
		}
		out
	}

	fn members_of(inner: &StoreInner, id: DefinitionId) -> Vec<Referable> {
		let Some(entry) = inner.entries.get(&id) else {
			return Vec::new();
		};
		match &entry.concrete {
			Some(def) => def.members().into_iter().filter_map(|(member, _, _)| inner.referable(member)).collect(),
			None => {
				let mut members: Vec<Referable> = inner
					.entries
					.iter()
					.filter(|(_, e)| e.owner == Some(id))
					.filter_map(|(member, _)| inner.referable(*member))
					.collect();
				members.sort_by_key(|r| r.id);
				members
			}
		}
	}

	pub fn dependents(&self, id: DefinitionId) -> Vec<DefinitionId> {
		let mut out: Vec<DefinitionId> = self.inner.read().dependents.get(&id).map(|s| s.iter().copied().collect()).unwrap_or_default();
		out.sort();
		out
	}

	/// Marks `ids` in progress for the run stamped `stamp`.
	///
	/// Returns the ids actually claimed; stale, blacklisted and deleted ones
	/// are skipped. A member id is an error and claims nothing.
	pub fn begin(&self, ids: &[DefinitionId], stamp: ClockValue) -> Result<Vec<DefinitionId>> {
		let mut inner = self.inner.write();
		for id in ids {
			if inner.entries.contains_key(id) {
				inner.unit_entry_mut(*id)?;
			}
		}
		let mut claimed = Vec::with_capacity(ids.len());
		for id in ids {
			let Some(entry) = inner.entries.get_mut(id) else {
				continue;
			};
			if entry.may_write(stamp) && entry.status.advances_to(TypecheckStatus::InProgress) {
				entry.status = TypecheckStatus::InProgress;
				entry.writer = Some(stamp);
				claimed.push(*id);
			}
		}
		Ok(claimed)
	}

	/// Writes a final status if `stamp` still owns the definition.
	///
	/// A definition deleted since the run was planned is reported stale.
	pub fn commit(&self, id: DefinitionId, stamp: ClockValue, status: TypecheckStatus) -> Result<CommitOutcome> {
		let mut inner = self.inner.write();
		if !inner.entries.contains_key(&id) {
			return Ok(CommitOutcome::Stale);
		}
		let entry = inner.unit_entry_mut(id)?;
		if !entry.may_write(stamp) {
			return Ok(CommitOutcome::Stale);
		}
		if entry.concrete.is_none() {
			return Err(StoreError::Corrupted(format!("{id:?} has a status but no concrete definition")));
		}
		entry.status = status;
		entry.writer = Some(stamp);
		Ok(CommitOutcome::Committed)
	}

	/// Blacklists a definition after a budget overrun, under the same ownership rule as [`Self::commit`].
	pub fn blacklist(&self, id: DefinitionId, stamp: ClockValue, reason: BlacklistReason) -> Result<CommitOutcome> {
		let mut inner = self.inner.write();
		if !inner.entries.contains_key(&id) {
			return Ok(CommitOutcome::Stale);
		}
		let entry = inner.unit_entry_mut(id)?;
		if !entry.may_write(stamp) {
			return Ok(CommitOutcome::Stale);
		}
		entry.status = TypecheckStatus::Blacklisted;
		entry.writer = Some(stamp);
		inner.blacklist.insert(
			id,
			BlacklistEntry {
				id,
				reason,
				at: SystemTime::now(),
				clock: stamp,
			},
		);
		Ok(CommitOutcome::Committed)
	}

	/// Reverts `InProgress` markers left by a cancelled or discarded run.
	pub fn release(&self, ids: &[DefinitionId], stamp: ClockValue) {
		let mut inner = self.inner.write();
		for id in ids {
			if let Some(entry) = inner.entries.get_mut(id)
				&& entry.status == TypecheckStatus::InProgress
				&& entry.writer == Some(stamp)
			{
				entry.status = TypecheckStatus::NotTypechecked;
				entry.writer = None;
			}
		}
	}

	pub fn is_blacklisted(&self, id: DefinitionId) -> bool {
		self.inner.read().blacklist.contains_key(&id)
	}

	pub fn blacklist_entry(&self, id: DefinitionId) -> Option<BlacklistEntry> {
		self.inner.read().blacklist.get(&id).cloned()
	}

	/// Removes a blacklist entry; the definition becomes eligible again.
	pub fn clear_blacklist(&self, id: DefinitionId) -> bool {
		let mut inner = self.inner.write();
		let removed = inner.blacklist.remove(&id).is_some();
		if removed && let Some(entry) = inner.entries.get_mut(&id) {
			entry.status = TypecheckStatus::NotTypechecked;
			entry.writer = None;
		}
		removed
	}
}
