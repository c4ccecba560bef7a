use std::collections::BTreeMap;

use lemma_core::concrete::{
	ConcreteArg, ConcreteClause, ConcreteConstructor, ConcreteField, ConcreteLetClause, ConcreteParam, ConcretePattern, ErrorReference,
	ReferenceErrorKind,
};
use lemma_core::{
	ConcreteBody, ConcreteDefinition, ConcreteExpr, DefinitionId, DefinitionKind, DefinitionStore, Dependency, Diagnostic,
	DiagnosticOrigin, FileId, LocalId, MessageKey, ModulePath, Reference, Severity, Span,
};
use lemma_syntax::{
	Ident, LongName, SurfaceBody, SurfaceClause, SurfaceDeclKind, SurfaceExpr, SurfaceParam, SurfacePattern,
};
use smallvec::SmallVec;

use crate::event::{EventKind, ReferenceReport, ResolutionEvent, SegmentResult};
use crate::scope::{DeclInfo, FileIndex, ImportScope, Planned};

pub(crate) struct ResolveCx<'a> {
	pub file: FileId,
	pub store: &'a DefinitionStore,
	pub index: &'a FileIndex<'a>,
	pub imports: &'a ImportScope,
}

impl ResolveCx<'_> {
	fn info(&self, id: DefinitionId) -> Option<DeclInfo> {
		self.index.info.get(&id).copied().or_else(|| {
			self.store.referable(id).map(|r| DeclInfo {
				kind: r.kind,
				precedence: r.precedence,
				owner: r.owner,
			})
		})
	}

	fn child(&self, parent: DefinitionId, name: &str) -> Lookup {
		let found = match self.index.children.get(&parent) {
			Some(children) => children.get(name).copied(),
			None => self.store.children(parent).into_iter().find(|r| r.name == name).map(|r| r.id),
		};
		found.map_or(Lookup::Missing, Lookup::Found)
	}
}

#[derive(Default)]
pub(crate) struct Output {
	pub events: Vec<ResolutionEvent>,
	pub references: Vec<ReferenceReport>,
	pub diagnostics: Vec<Diagnostic>,
}

enum Lookup {
	Found(DefinitionId),
	Ambiguous(SmallVec<[DefinitionId; 2]>),
	Missing,
}

enum Outcome {
	/// Local head, optionally projected through fields.
	Local { local: LocalId, fields: SmallVec<[DefinitionId; 1]> },
	Global(DefinitionId),
	Error { segment: usize, kind: ReferenceErrorKind },
}

struct PathLookup {
	segments: SmallVec<[SegmentResult; 2]>,
	outcome: Outcome,
}

impl PathLookup {
	fn push(&mut self, result: SegmentResult) -> bool {
		let error = match &result {
			SegmentResult::Unresolved => Some(ReferenceErrorKind::Unresolved),
			SegmentResult::Ambiguous(_) => Some(ReferenceErrorKind::Ambiguous),
			_ => None,
		};
		self.segments.push(result);
		if let Some(kind) = error {
			self.outcome = Outcome::Error {
				segment: self.segments.len() - 1,
				kind,
			};
			return false;
		}
		true
	}

	fn push_lookup(&mut self, lookup: Lookup) -> Option<DefinitionId> {
		match lookup {
			Lookup::Found(id) => {
				self.segments.push(SegmentResult::Global(id));
				Some(id)
			}
			Lookup::Ambiguous(ids) => {
				self.push(SegmentResult::Ambiguous(ids));
				None
			}
			Lookup::Missing => {
				self.push(SegmentResult::Unresolved);
				None
			}
		}
	}
}

/// Resolves one declaration into its concrete form.
pub(crate) struct DefinitionResolver<'r> {
	cx: &'r ResolveCx<'r>,
	out: &'r mut Output,
	owner: DefinitionId,
	chain: &'r [DefinitionId],
	locals: Vec<(String, LocalId)>,
	next_local: u32,
	header: bool,
	dependencies: BTreeMap<DefinitionId, bool>,
}

impl<'r> DefinitionResolver<'r> {
	fn new(cx: &'r ResolveCx<'r>, out: &'r mut Output, owner: DefinitionId, chain: &'r [DefinitionId]) -> Self {
		Self {
			cx,
			out,
			owner,
			chain,
			locals: Vec::new(),
			next_local: 0,
			header: false,
			dependencies: BTreeMap::new(),
		}
	}

	fn event(&mut self, span: Span, kind: EventKind) {
		self.out.events.push(ResolutionEvent { span, kind });
	}

	fn bind(&mut self, ident: &Ident) -> LocalId {
		let id = LocalId(self.next_local);
		self.next_local += 1;
		self.locals.push((ident.name.clone(), id));
		id
	}

	fn local(&self, name: &str) -> Option<LocalId> {
		self.locals.iter().rev().find(|(n, _)| n == name).map(|(_, id)| *id)
	}

	fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
		let mark = self.locals.len();
		let result = f(self);
		self.locals.truncate(mark);
		result
	}

	/// Where-blocks innermost first, then the file, then imports.
	fn lookup_global(&self, name: &str) -> Lookup {
		for parent in self.chain.iter().rev() {
			if let Some(id) = self.cx.index.children.get(parent).and_then(|c| c.get(name)) {
				return Lookup::Found(*id);
			}
		}
		if let Some(id) = self.cx.index.top.get(name) {
			return Lookup::Found(*id);
		}
		match self.cx.imports.names.get(name) {
			Some(ids) if ids.len() == 1 => Lookup::Found(ids[0]),
			Some(ids) if !ids.is_empty() => Lookup::Ambiguous(ids.iter().copied().collect()),
			_ => Lookup::Missing,
		}
	}

	fn lookup_field(&self, name: &str) -> Lookup {
		match self.lookup_global(name) {
			Lookup::Found(id) if self.cx.info(id).is_some_and(|i| i.kind == DefinitionKind::Field) => Lookup::Found(id),
			Lookup::Found(_) => Lookup::Missing,
			other => other,
		}
	}

	/// Longest imported module prefix of `name` and the lookup of the segment after it.
	fn lookup_module_prefix(&self, name: &LongName) -> Option<(usize, Lookup)> {
		(1..name.segments().len()).rev().find_map(|len| {
			let module = ModulePath::new(name.segments()[..len].iter().map(|s| s.name.clone()));
			let exports = self.cx.imports.modules.get(&module)?;
			let found = exports.get(&name.segments()[len].name).copied();
			Some((len, found.map_or(Lookup::Missing, Lookup::Found)))
		})
	}

	fn lookup_path(&self, name: &LongName, allow_locals: bool) -> PathLookup {
		let mut lookup = PathLookup {
			segments: SmallVec::new(),
			outcome: Outcome::Error {
				segment: 0,
				kind: ReferenceErrorKind::Unresolved,
			},
		};
		let head = name.head();

		if allow_locals && let Some(local) = self.local(&head.name) {
			lookup.segments.push(SegmentResult::Local(local));
			let mut fields = SmallVec::new();
			for segment in &name.segments()[1..] {
				match lookup.push_lookup(self.lookup_field(&segment.name)) {
					Some(field) => fields.push(field),
					None => return lookup,
				}
			}
			lookup.outcome = Outcome::Local { local, fields };
			return lookup;
		}

		let (mut current, mut next) = match self.lookup_global(&head.name) {
			Lookup::Missing if name.is_qualified() => match self.lookup_module_prefix(name) {
				Some((len, found)) => {
					lookup.segments.extend((0..len).map(|_| SegmentResult::Module));
					match lookup.push_lookup(found) {
						Some(id) => (id, len + 1),
						None => return lookup,
					}
				}
				None => {
					lookup.push(SegmentResult::Unresolved);
					return lookup;
				}
			},
			found => match lookup.push_lookup(found) {
				Some(id) => (id, 1),
				None => return lookup,
			},
		};
		while next < name.segments().len() {
			match lookup.push_lookup(self.cx.child(current, &name.segments()[next].name)) {
				Some(id) => current = id,
				None => return lookup,
			}
			next += 1;
		}
		lookup.outcome = Outcome::Global(current);
		lookup
	}

	/// Records the report, the long-name event and, on failure, the diagnostic.
	fn report(&mut self, name: &LongName, lookup: &PathLookup) {
		let first_error = match lookup.outcome {
			Outcome::Error { segment, .. } => Some(segment),
			_ => None,
		};
		if name.is_qualified() {
			let resolved = first_error.unwrap_or(lookup.segments.len());
			let targets: SmallVec<[DefinitionId; 2]> = lookup.segments[..resolved]
				.iter()
				.filter_map(|s| match s {
					SegmentResult::Global(id) => Some(*id),
					_ => None,
				})
				.collect();
			if resolved > 0 && !targets.is_empty() {
				let span = name.head().span.cover(name.segments()[resolved - 1].span);
				self.event(span, EventKind::LongName { targets });
			}
		}
		if let Outcome::Error { segment, kind } = lookup.outcome {
			let failing = &name.segments()[segment];
			let key = match kind {
				ReferenceErrorKind::Unresolved => MessageKey::UnresolvedName,
				ReferenceErrorKind::Ambiguous => MessageKey::AmbiguousName,
			};
			self.out.diagnostics.push(
				Diagnostic::at_span(self.cx.file, failing.span, Severity::Error, key, DiagnosticOrigin::Resolver)
					.with_owner(self.owner)
					.with_arg(failing.name.clone())
					.with_arg(name.to_string()),
			);
		}
		self.out.references.push(ReferenceReport {
			owner: self.owner,
			name: name.to_string(),
			span: name.span(),
			segments: lookup.segments.clone(),
			first_error,
		});
	}

	/// Classifies a use of a global and records the dependency on its typecheck unit.
	fn use_global(&mut self, id: DefinitionId, span: Span) {
		let Some(info) = self.cx.info(id) else {
			return;
		};
		if info.precedence.infix {
			self.event(span, EventKind::Operator { target: id });
		}
		if info.kind == DefinitionKind::Meta {
			self.event(span, EventKind::MetaResolved { target: id });
		}
		let header = self.header;
		let unit = info.owner.unwrap_or(id);
		self.dependencies.entry(unit).and_modify(|h| *h |= header).or_insert(header);
	}

	fn reference(&mut self, name: &LongName) -> ConcreteExpr {
		let lookup = self.lookup_path(name, true);
		self.report(name, &lookup);
		let span = name.span();
		match lookup.outcome {
			Outcome::Global(id) => {
				self.use_global(id, name.last().span);
				ConcreteExpr::Reference {
					reference: Reference::Global(id),
					span,
				}
			}
			Outcome::Local { local, fields } => {
				let mut expr = ConcreteExpr::Reference {
					reference: Reference::Local(local),
					span: name.head().span,
				};
				for (field, segment) in fields.into_iter().zip(&name.segments()[1..]) {
					self.use_global(field, segment.span);
					expr = ConcreteExpr::App {
						function: Box::new(ConcreteExpr::Reference {
							reference: Reference::Global(field),
							span: segment.span,
						}),
						args: vec![ConcreteArg { expr, explicit: true }],
					};
				}
				expr
			}
			Outcome::Error { kind, .. } => ConcreteExpr::Reference {
				reference: Reference::Error(ErrorReference {
					name: name.to_string(),
					kind,
				}),
				span,
			},
		}
	}

	fn param(&mut self, param: &SurfaceParam) -> ConcreteParam {
		let ty = param.ty.as_ref().map(|ty| self.expr(ty));
		if let Some(class) = ty.as_ref().and_then(|ty| self.class_head(ty)) {
			self.event(param.span, EventKind::ClassParameter { class });
		}
		let binders = param.names.iter().map(|name| name.as_ref().map(|n| self.bind(n))).collect();
		ConcreteParam {
			binders,
			ty,
			explicit: param.explicit,
			span: param.span,
		}
	}

	fn params(&mut self, params: &[SurfaceParam]) -> Vec<ConcreteParam> {
		params.iter().map(|p| self.param(p)).collect()
	}

	fn class_head(&self, ty: &ConcreteExpr) -> Option<DefinitionId> {
		match ty {
			ConcreteExpr::Reference {
				reference: Reference::Global(id),
				..
			} => self
				.cx
				.info(*id)
				.is_some_and(|i| i.kind == DefinitionKind::Class { record: false })
				.then_some(*id),
			ConcreteExpr::App { function, .. } => self.class_head(function),
			_ => None,
		}
	}

	fn expr(&mut self, expr: &SurfaceExpr) -> ConcreteExpr {
		match expr {
			SurfaceExpr::Name(name) => self.reference(name),
			SurfaceExpr::App { function, args } => ConcreteExpr::App {
				function: Box::new(self.expr(function)),
				args: args
					.iter()
					.map(|arg| ConcreteArg {
						expr: self.expr(&arg.expr),
						explicit: arg.explicit,
					})
					.collect(),
			},
			SurfaceExpr::Lam { params, body } => self.scoped(|this| ConcreteExpr::Lam {
				params: this.params(params),
				body: Box::new(this.expr(body)),
			}),
			SurfaceExpr::Pi { params, codomain } => self.scoped(|this| ConcreteExpr::Pi {
				params: this.params(params),
				codomain: Box::new(this.expr(codomain)),
			}),
			SurfaceExpr::Sigma { params } => self.scoped(|this| ConcreteExpr::Sigma { params: this.params(params) }),
			SurfaceExpr::Tuple { fields, span } => ConcreteExpr::Tuple {
				fields: fields.iter().map(|f| self.expr(f)).collect(),
				span: *span,
			},
			SurfaceExpr::Universe { level, span } => ConcreteExpr::Universe { level: *level, span: *span },
			SurfaceExpr::Hole { span } => ConcreteExpr::Hole { span: *span },
			SurfaceExpr::Goal { name, expr, span } => ConcreteExpr::Goal {
				name: name.clone(),
				expr: expr.as_ref().map(|e| Box::new(self.expr(e))),
				span: *span,
			},
			SurfaceExpr::Number { literal, span } => ConcreteExpr::Number {
				literal: literal.clone(),
				span: *span,
			},
			SurfaceExpr::Case { scrutinees, clauses, span } => ConcreteExpr::Case {
				scrutinees: scrutinees.iter().map(|s| self.expr(s)).collect(),
				clauses: clauses.iter().map(|c| self.clause(c)).collect(),
				span: *span,
			},
			SurfaceExpr::Let { clauses, body } => self.scoped(|this| {
				let mut resolved = Vec::with_capacity(clauses.len());
				for clause in clauses {
					let (params, ty, term) = this.scoped(|this| {
						let params = this.params(&clause.params);
						let ty = clause.ty.as_ref().map(|t| this.expr(t));
						(params, ty, this.expr(&clause.term))
					});
					resolved.push(ConcreteLetClause {
						binder: this.bind(&clause.name),
						params,
						ty,
						term,
					});
				}
				ConcreteExpr::Let {
					clauses: resolved,
					body: Box::new(this.expr(body)),
				}
			}),
		}
	}

	fn clause(&mut self, clause: &SurfaceClause) -> ConcreteClause {
		self.scoped(|this| ConcreteClause {
			patterns: clause.patterns.iter().map(|p| this.pattern(p)).collect(),
			body: clause.body.as_ref().map(|b| this.expr(b)),
			span: clause.span,
		})
	}

	/// Looks `name` up as a constructor, without locals and without reporting.
	fn constructor(&self, name: &LongName) -> (PathLookup, Option<DefinitionId>) {
		let lookup = self.lookup_path(name, false);
		let ctor = match lookup.outcome {
			Outcome::Global(id) if self.cx.info(id).is_some_and(|i| i.kind == DefinitionKind::Constructor) => Some(id),
			_ => None,
		};
		(lookup, ctor)
	}

	fn pattern(&mut self, pattern: &SurfacePattern) -> ConcretePattern {
		match pattern {
			SurfacePattern::Name {
				name,
				args,
				explicit,
				span,
			} => {
				let (lookup, ctor) = self.constructor(name);
				if let Some(ctor) = ctor {
					self.report(name, &lookup);
					self.use_global(ctor, name.last().span);
					self.event(name.span(), EventKind::ConstructorPattern { constructor: ctor });
					return ConcretePattern::Constructor {
						constructor: ctor,
						args: args.iter().map(|p| self.pattern(p)).collect(),
						explicit: *explicit,
						span: *span,
					};
				}
				if !name.is_qualified() && args.is_empty() {
					return ConcretePattern::Binding {
						local: Some(self.bind(name.head())),
						explicit: *explicit,
						span: *span,
					};
				}
				self.out.diagnostics.push(
					Diagnostic::at_span(self.cx.file, *span, Severity::Error, MessageKey::MalformedPattern, DiagnosticOrigin::Resolver)
						.with_owner(self.owner)
						.with_arg(name.to_string()),
				);
				// Arguments still bind their variables so the clause body resolves.
				for arg in args {
					self.pattern(arg);
				}
				ConcretePattern::Error {
					name: name.to_string(),
					span: *span,
				}
			}
			SurfacePattern::Wildcard { explicit, span } => ConcretePattern::Binding {
				local: None,
				explicit: *explicit,
				span: *span,
			},
			SurfacePattern::Tuple { fields, span } => ConcretePattern::Tuple {
				fields: fields.iter().map(|p| self.pattern(p)).collect(),
				span: *span,
			},
			SurfacePattern::Absurd { span } => ConcretePattern::Absurd { span: *span },
		}
	}

	fn finish(self) -> Vec<Dependency> {
		self.dependencies.into_iter().map(|(target, header)| Dependency { target, header }).collect()
	}
}

pub(crate) fn resolve_definition(cx: &ResolveCx<'_>, out: &mut Output, planned: &Planned<'_>) -> ConcreteDefinition {
	let decl = planned.decl;
	let kind = cx.index.info.get(&planned.id).map_or(DefinitionKind::Function, |i| i.kind);
	let mut r = DefinitionResolver::new(cx, out, planned.id, &planned.chain);

	r.event(decl.name.span, EventKind::Declaration { id: planned.id });
	if let Some(alias) = &decl.alias {
		r.event(alias.span, EventKind::Declaration { id: planned.id });
	}

	r.header = true;
	let params = r.params(&decl.params);
	let result_type = decl.result_type.as_ref().map(|ty| r.expr(ty));
	r.header = false;

	let body = match &decl.kind {
		SurfaceDeclKind::Function { body } => match body {
			SurfaceBody::None => ConcreteBody::None,
			SurfaceBody::Term(term) => ConcreteBody::Term(r.expr(term)),
			SurfaceBody::Clauses(clauses) => ConcreteBody::Clauses(clauses.iter().map(|c| r.clause(c)).collect()),
		},
		SurfaceDeclKind::Data { constructors } => ConcreteBody::Constructors(
			planned
				.members
				.iter()
				.filter_map(|(id, position)| Some((*id, constructors.get(*position)?)))
				.map(|(id, ctor)| {
					r.event(ctor.name.span, EventKind::Declaration { id });
					ConcreteConstructor {
						id,
						name: ctor.name.name.clone(),
						params: r.scoped(|this| this.params(&ctor.params)),
						span: ctor.span,
					}
				})
				.collect(),
		),
		SurfaceDeclKind::Class { fields, .. } => ConcreteBody::Fields(
			planned
				.members
				.iter()
				.filter_map(|(id, position)| Some((*id, fields.get(*position)?)))
				.map(|(id, field)| {
					r.event(field.name.span, EventKind::Declaration { id });
					ConcreteField {
						id,
						name: field.name.name.clone(),
						ty: field.ty.as_ref().map(|ty| r.expr(ty)),
						span: field.span,
					}
				})
				.collect(),
		),
		SurfaceDeclKind::Meta { body } => match body {
			Some(term) => ConcreteBody::Term(r.expr(term)),
			None => ConcreteBody::None,
		},
	};

	ConcreteDefinition {
		id: planned.id,
		file: cx.file,
		name: decl.name.name.clone(),
		kind,
		precedence: decl.precedence,
		params,
		result_type,
		body,
		span: decl.span,
		name_span: decl.name.span,
		parent: planned.parent,
		dependencies: r.finish(),
	}
}
