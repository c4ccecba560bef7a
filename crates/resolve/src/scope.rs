use indexmap::IndexMap;
use lemma_core::{
	DefinitionId, DefinitionKind, DefinitionPath, DefinitionStore, Diagnostic, DiagnosticOrigin, FileId, LibraryCache, MessageKey,
	ModulePath, Precedence, Severity,
};
use lemma_syntax::{Ident, SurfaceDecl, SurfaceDeclKind, SurfaceGroup, SyntaxTree};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Name-level facts about a definition, from this file or the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeclInfo {
	pub kind: DefinitionKind,
	pub precedence: Precedence,
	pub owner: Option<DefinitionId>,
}

/// A declaration accepted for resolution.
pub(crate) struct Planned<'a> {
	pub id: DefinitionId,
	pub decl: &'a SurfaceDecl,
	pub parent: Option<DefinitionId>,
	/// Enclosing declarations and the declaration itself, outermost first.
	pub chain: Vec<DefinitionId>,
	/// Member ids with their position among the constructors or fields, duplicates dropped.
	pub members: Vec<(DefinitionId, usize)>,
}

impl<'a> Planned<'a> {
	pub fn member_ident(&self, position: usize) -> Option<&'a Ident> {
		match &self.decl.kind {
			SurfaceDeclKind::Data { constructors } => constructors.get(position).map(|c| &c.name),
			SurfaceDeclKind::Class { fields, .. } => fields.get(position).map(|f| &f.name),
			SurfaceDeclKind::Function { .. } | SurfaceDeclKind::Meta { .. } => None,
		}
	}
}

/// Names declared by the file being resolved.
pub(crate) struct FileIndex<'a> {
	pub top: IndexMap<String, DefinitionId>,
	pub children: FxHashMap<DefinitionId, IndexMap<String, DefinitionId>>,
	pub info: FxHashMap<DefinitionId, DeclInfo>,
	pub planned: Vec<Planned<'a>>,
	pub diagnostics: Vec<Diagnostic>,
}

impl<'a> FileIndex<'a> {
	pub fn build(tree: &'a SyntaxTree, store: &DefinitionStore) -> Self {
		let mut index = Self {
			top: IndexMap::new(),
			children: FxHashMap::default(),
			info: FxHashMap::default(),
			planned: Vec::new(),
			diagnostics: Vec::new(),
		};
		let mut roots: IndexMap<String, DefinitionId> = IndexMap::new();
		for group in &tree.root {
			if roots.contains_key(&group.decl.name.name) {
				index.duplicate(tree.file, &group.decl.name, None);
				continue;
			}
			let path = DefinitionPath::root(group.decl.name.name.clone());
			let id = store.intern(tree.file, &path);
			roots.insert(group.decl.name.name.clone(), id);
			index.plan(tree.file, store, group, path, id, None, Vec::new());
		}

		// Root names win over members and aliases with the same spelling.
		for (name, id) in &roots {
			index.top.insert(name.clone(), *id);
		}
		let roots_in_order: Vec<DefinitionId> = roots.values().copied().collect();
		for root in roots_in_order {
			let Some(planned) = index.planned.iter().find(|p| p.id == root) else {
				continue;
			};
			let decl: &'a SurfaceDecl = planned.decl;
			let mut extra: Vec<(&'a Ident, DefinitionId)> = Vec::new();
			if let Some(alias) = &decl.alias {
				extra.push((alias, root));
			}
			extra.extend(planned.members.iter().filter_map(|(id, position)| Some((planned.member_ident(*position)?, *id))));
			for (ident, id) in extra {
				if index.top.contains_key(&ident.name) {
					let owner = index.info.get(&id).and_then(|i| i.owner).unwrap_or(id);
					index.duplicate(tree.file, ident, Some(owner));
				} else {
					index.top.insert(ident.name.clone(), id);
				}
			}
		}
		index
	}

	#[allow(clippy::too_many_arguments)]
	fn plan(
		&mut self,
		file: FileId,
		store: &DefinitionStore,
		group: &'a SurfaceGroup,
		path: DefinitionPath,
		id: DefinitionId,
		parent: Option<DefinitionId>,
		mut chain: Vec<DefinitionId>,
	) {
		chain.push(id);
		let decl = &group.decl;
		let kind = match &decl.kind {
			SurfaceDeclKind::Function { .. } => DefinitionKind::Function,
			SurfaceDeclKind::Data { .. } => DefinitionKind::Data,
			SurfaceDeclKind::Class { record, .. } => DefinitionKind::Class { record: *record },
			SurfaceDeclKind::Meta { .. } => DefinitionKind::Meta,
		};
		self.info.insert(
			id,
			DeclInfo {
				kind,
				precedence: decl.precedence,
				owner: None,
			},
		);

		let member_idents: Vec<(&'a Ident, DefinitionKind)> = match &decl.kind {
			SurfaceDeclKind::Data { constructors } => constructors.iter().map(|c| (&c.name, DefinitionKind::Constructor)).collect(),
			SurfaceDeclKind::Class { fields, .. } => fields.iter().map(|f| (&f.name, DefinitionKind::Field)).collect(),
			SurfaceDeclKind::Function { .. } | SurfaceDeclKind::Meta { .. } => Vec::new(),
		};
		let mut scope: IndexMap<String, DefinitionId> = IndexMap::new();
		let mut members = Vec::new();
		for (position, (ident, member_kind)) in member_idents.into_iter().enumerate() {
			if scope.contains_key(&ident.name) {
				self.duplicate(file, ident, Some(id));
				continue;
			}
			let member = store.intern(file, &path.child(ident.name.clone()));
			self.info.insert(
				member,
				DeclInfo {
					kind: member_kind,
					precedence: Precedence::default(),
					owner: Some(id),
				},
			);
			scope.insert(ident.name.clone(), member);
			members.push((member, position));
		}

		let mut nested = Vec::new();
		for child in group.where_block.iter().chain(&group.dynamic) {
			if scope.contains_key(&child.decl.name.name) {
				self.duplicate(file, &child.decl.name, Some(id));
				continue;
			}
			let child_path = path.child(child.decl.name.name.clone());
			let child_id = store.intern(file, &child_path);
			scope.insert(child.decl.name.name.clone(), child_id);
			nested.push((child, child_path, child_id));
		}
		self.children.insert(id, scope);

		self.planned.push(Planned {
			id,
			decl,
			parent,
			chain: chain.clone(),
			members,
		});
		for (child, child_path, child_id) in nested {
			self.plan(file, store, child, child_path, child_id, Some(id), chain.clone());
		}
	}

	fn duplicate(&mut self, file: FileId, ident: &Ident, owner: Option<DefinitionId>) {
		let mut diagnostic = Diagnostic::at_span(file, ident.span, Severity::Error, MessageKey::DuplicateName, DiagnosticOrigin::Resolver)
			.with_arg(ident.name.clone());
		if let Some(owner) = owner {
			diagnostic = diagnostic.with_owner(owner);
		}
		self.diagnostics.push(diagnostic);
	}
}

/// Names brought in by the file's imports.
#[derive(Default)]
pub(crate) struct ImportScope {
	pub names: IndexMap<String, SmallVec<[DefinitionId; 1]>>,
	pub modules: FxHashMap<ModulePath, IndexMap<String, DefinitionId>>,
	pub diagnostics: Vec<Diagnostic>,
}

impl ImportScope {
	pub fn build(tree: &SyntaxTree, store: &DefinitionStore, libraries: &dyn LibraryCache) -> Self {
		let mut scope = Self::default();
		for import in &tree.imports {
			let Some(exports) = module_exports(store, libraries, &import.module) else {
				scope.diagnostics.push(
					Diagnostic::at_span(tree.file, import.span, Severity::Error, MessageKey::UnresolvedName, DiagnosticOrigin::Resolver)
						.with_arg(import.module.to_string()),
				);
				continue;
			};
			for (name, id) in &exports {
				if !import.exposes(name) {
					continue;
				}
				let ids = scope.names.entry(name.clone()).or_default();
				if !ids.contains(id) {
					ids.push(*id);
				}
			}
			scope.modules.insert(import.module.clone(), exports);
		}
		scope
	}
}

/// Exported names of another module: a source file known to the store
/// first, then the library cache.
fn module_exports(store: &DefinitionStore, libraries: &dyn LibraryCache, module: &ModulePath) -> Option<IndexMap<String, DefinitionId>> {
	if let Some(file) = store.module_file(module)
		&& !store.is_library_file(file)
	{
		let mut exports = IndexMap::new();
		for referable in store.exported(file) {
			exports.entry(referable.name).or_insert(referable.id);
		}
		return Some(exports);
	}
	if !libraries.has_module(module) {
		return None;
	}
	let mut exports = IndexMap::new();
	for name in libraries.names(module) {
		let Some(cached) = libraries.lookup(module, &name) else {
			continue;
		};
		let id = store.import_cached(module, &cached);
		exports.entry(name).or_insert(id);
		for member in store.children(id) {
			exports.entry(member.name).or_insert(member.id);
		}
	}
	Some(exports)
}
