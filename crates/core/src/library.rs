//! Read-only access to previously typechecked definitions of other modules.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::concrete::{DefinitionKind, Precedence};
use crate::ids::ModulePath;
use crate::status::TypecheckStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMember {
	pub name: String,
	pub kind: DefinitionKind,
}

/// A definition as persisted by its own module's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDefinition {
	pub name: String,
	pub kind: DefinitionKind,
	pub precedence: Precedence,
	/// Committed outcome; always final.
	pub status: TypecheckStatus,
	pub members: Vec<CachedMember>,
}

impl CachedDefinition {
	pub fn new(name: impl Into<String>, kind: DefinitionKind) -> Self {
		Self {
			name: name.into(),
			kind,
			precedence: Precedence::default(),
			status: TypecheckStatus::Ok,
			members: Vec::new(),
		}
	}

	pub fn with_precedence(mut self, precedence: Precedence) -> Self {
		self.precedence = precedence;
		self
	}

	pub fn with_status(mut self, status: TypecheckStatus) -> Self {
		self.status = status;
		self
	}

	pub fn with_member(mut self, name: impl Into<String>, kind: DefinitionKind) -> Self {
		self.members.push(CachedMember { name: name.into(), kind });
		self
	}
}

/// Persistent cache of other modules' typechecking results.
///
/// Written only by the owning module's pipeline; this core only reads it.
pub trait LibraryCache: Send + Sync {
	fn has_module(&self, module: &ModulePath) -> bool;

	fn lookup(&self, module: &ModulePath, name: &str) -> Option<CachedDefinition>;

	/// Exported names of a module, in declaration order.
	fn names(&self, module: &ModulePath) -> Vec<String>;
}

/// Cache with no modules.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLibraries;

impl LibraryCache for NoLibraries {
	fn has_module(&self, _module: &ModulePath) -> bool {
		false
	}

	fn lookup(&self, _module: &ModulePath, _name: &str) -> Option<CachedDefinition> {
		None
	}

	fn names(&self, _module: &ModulePath) -> Vec<String> {
		Vec::new()
	}
}

/// In-memory cache built up front (prelude, tests).
#[derive(Debug, Default, Clone)]
pub struct StaticLibraryCache {
	modules: FxHashMap<ModulePath, IndexMap<String, CachedDefinition>>,
}

impl StaticLibraryCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_definition(mut self, module: ModulePath, definition: CachedDefinition) -> Self {
		self.insert(module, definition);
		self
	}

	pub fn insert(&mut self, module: ModulePath, definition: CachedDefinition) {
		self.modules.entry(module).or_default().insert(definition.name.clone(), definition);
	}
}

impl LibraryCache for StaticLibraryCache {
	fn has_module(&self, module: &ModulePath) -> bool {
		self.modules.contains_key(module)
	}

	fn lookup(&self, module: &ModulePath, name: &str) -> Option<CachedDefinition> {
		self.modules.get(module)?.get(name).cloned()
	}

	fn names(&self, module: &ModulePath) -> Vec<String> {
		self.modules.get(module).map(|defs| defs.keys().cloned().collect()).unwrap_or_default()
	}
}
