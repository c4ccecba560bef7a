//! Name resolution: surface trees to concrete definitions.
//!
//! [`resolve`] is total. Every declaration reachable from the root yields a
//! [`ConcreteDefinition`] and every name is bound, either to a target or to
//! an error marker with a diagnostic. Besides the definitions it returns the
//! side-channel events and per-reference lookup reports as plain values.
//! Resolution only interns ids in the store; it never writes statuses.

mod event;
mod resolver;
mod scope;

use indexmap::IndexMap;
use lemma_core::{ConcreteDefinition, DefinitionId, DefinitionStore, Diagnostic, LibraryCache};
use lemma_syntax::SyntaxTree;

pub use crate::event::{EventKind, ReferenceReport, ResolutionEvent, SegmentResult};
use crate::resolver::{Output, ResolveCx, resolve_definition};
use crate::scope::{FileIndex, ImportScope};

/// Everything one resolution pass produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
	/// Source order, enclosing declarations before nested ones.
	pub definitions: IndexMap<DefinitionId, ConcreteDefinition>,
	pub events: Vec<ResolutionEvent>,
	pub references: Vec<ReferenceReport>,
	pub diagnostics: Vec<Diagnostic>,
	/// Declarations resolved, nested ones included.
	pub count: usize,
}

impl Resolution {
	pub fn definition(&self, id: DefinitionId) -> Option<&ConcreteDefinition> {
		self.definitions.get(&id)
	}

	pub fn failed_references(&self) -> impl Iterator<Item = &ReferenceReport> {
		self.references.iter().filter(|r| r.is_error())
	}

	pub fn into_definitions(self) -> Vec<ConcreteDefinition> {
		self.definitions.into_values().collect()
	}
}

/// Resolves every declaration of `tree` against the file itself, the store's
/// other files and the library cache.
pub fn resolve(tree: &SyntaxTree, store: &DefinitionStore, libraries: &dyn LibraryCache) -> Resolution {
	let index = FileIndex::build(tree, store);
	let imports = ImportScope::build(tree, store, libraries);
	let cx = ResolveCx {
		file: tree.file,
		store,
		index: &index,
		imports: &imports,
	};

	let mut out = Output::default();
	out.diagnostics.extend(imports.diagnostics.iter().cloned());
	out.diagnostics.extend(index.diagnostics.iter().cloned());

	let mut definitions = IndexMap::with_capacity(index.planned.len());
	for planned in &index.planned {
		let definition = resolve_definition(&cx, &mut out, planned);
		definitions.insert(definition.id, definition);
	}

	tracing::debug!(
		file = ?tree.file,
		definitions = definitions.len(),
		diagnostics = out.diagnostics.len(),
		"resolve"
	);
	Resolution {
		definitions,
		events: out.events,
		references: out.references,
		diagnostics: out.diagnostics,
		count: index.planned.len(),
	}
}
