//! Terse constructors for surface trees, used by tests and by hosts that
//! synthesize declarations.

use lemma_core::{FileId, ModulePath, Precedence, Span};

use crate::tree::{
	Ident, Import, LongName, SurfaceArg, SurfaceBody, SurfaceClause, SurfaceConstructor, SurfaceDecl, SurfaceDeclKind, SurfaceExpr,
	SurfaceField, SurfaceGroup, SurfaceParam, SurfacePattern, SyntaxTree,
};

pub fn ident(name: &str) -> Ident {
	Ident::new(name, Span::default())
}

/// Reference to a possibly qualified name.
pub fn name(dotted: &str) -> SurfaceExpr {
	SurfaceExpr::Name(LongName::parse(dotted))
}

pub fn app(function: SurfaceExpr, args: impl IntoIterator<Item = SurfaceExpr>) -> SurfaceExpr {
	SurfaceExpr::App {
		function: Box::new(function),
		args: args.into_iter().map(|expr| SurfaceArg { expr, explicit: true }).collect(),
	}
}

pub fn lam(params: Vec<SurfaceParam>, body: SurfaceExpr) -> SurfaceExpr {
	SurfaceExpr::Lam {
		params,
		body: Box::new(body),
	}
}

pub fn pi(params: Vec<SurfaceParam>, codomain: SurfaceExpr) -> SurfaceExpr {
	SurfaceExpr::Pi {
		params,
		codomain: Box::new(codomain),
	}
}

pub fn universe() -> SurfaceExpr {
	SurfaceExpr::Universe {
		level: None,
		span: Span::default(),
	}
}

pub fn goal() -> SurfaceExpr {
	SurfaceExpr::Goal {
		name: None,
		expr: None,
		span: Span::default(),
	}
}

pub fn number(literal: &str) -> SurfaceExpr {
	SurfaceExpr::Number {
		literal: literal.to_owned(),
		span: Span::default(),
	}
}

pub fn case(scrutinees: Vec<SurfaceExpr>, clauses: Vec<SurfaceClause>) -> SurfaceExpr {
	SurfaceExpr::Case {
		scrutinees,
		clauses,
		span: Span::default(),
	}
}

/// Explicit parameter binding `names` (`_` for an anonymous binder).
pub fn param(names: &[&str], ty: SurfaceExpr) -> SurfaceParam {
	SurfaceParam {
		names: names.iter().map(|n| (*n != "_").then(|| ident(n))).collect(),
		ty: Some(ty),
		explicit: true,
		span: Span::default(),
	}
}

pub fn implicit(names: &[&str], ty: SurfaceExpr) -> SurfaceParam {
	SurfaceParam {
		explicit: false,
		..param(names, ty)
	}
}

/// Variable or nullary constructor pattern; resolution decides which.
pub fn pvar(dotted: &str) -> SurfacePattern {
	pcon(dotted, Vec::new())
}

pub fn pcon(dotted: &str, args: Vec<SurfacePattern>) -> SurfacePattern {
	let name = LongName::parse(dotted);
	let span = name.span();
	SurfacePattern::Name {
		name,
		args,
		explicit: true,
		span,
	}
}

pub fn wildcard() -> SurfacePattern {
	SurfacePattern::Wildcard {
		explicit: true,
		span: Span::default(),
	}
}

pub fn absurd() -> SurfacePattern {
	SurfacePattern::Absurd { span: Span::default() }
}

pub fn clause(patterns: Vec<SurfacePattern>, body: SurfaceExpr) -> SurfaceClause {
	SurfaceClause {
		patterns,
		body: Some(body),
		span: Span::default(),
	}
}

pub fn absurd_clause(patterns: Vec<SurfacePattern>) -> SurfaceClause {
	SurfaceClause {
		patterns,
		body: None,
		span: Span::default(),
	}
}

impl SurfaceDecl {
	fn with_kind(name: &str, kind: SurfaceDeclKind) -> Self {
		Self {
			name: ident(name),
			alias: None,
			precedence: Precedence::default(),
			kind,
			params: Vec::new(),
			result_type: None,
			span: Span::default(),
		}
	}

	pub fn function(name: &str) -> Self {
		Self::with_kind(name, SurfaceDeclKind::Function { body: SurfaceBody::None })
	}

	pub fn data(name: &str) -> Self {
		Self::with_kind(name, SurfaceDeclKind::Data { constructors: Vec::new() })
	}

	pub fn class(name: &str) -> Self {
		Self::with_kind(name, SurfaceDeclKind::Class { record: false, fields: Vec::new() })
	}

	pub fn record(name: &str) -> Self {
		Self::with_kind(name, SurfaceDeclKind::Class { record: true, fields: Vec::new() })
	}

	pub fn meta(name: &str) -> Self {
		Self::with_kind(name, SurfaceDeclKind::Meta { body: None })
	}

	pub fn with_param(mut self, param: SurfaceParam) -> Self {
		self.params.push(param);
		self
	}

	pub fn with_result(mut self, ty: SurfaceExpr) -> Self {
		self.result_type = Some(ty);
		self
	}

	/// Term body of a function, or default of a meta.
	pub fn with_term(mut self, term: SurfaceExpr) -> Self {
		match &mut self.kind {
			SurfaceDeclKind::Function { body } => *body = SurfaceBody::Term(term),
			SurfaceDeclKind::Meta { body } => *body = Some(term),
			SurfaceDeclKind::Data { .. } | SurfaceDeclKind::Class { .. } => {}
		}
		self
	}

	pub fn with_clauses(mut self, clauses: Vec<SurfaceClause>) -> Self {
		if let SurfaceDeclKind::Function { body } = &mut self.kind {
			*body = SurfaceBody::Clauses(clauses);
		}
		self
	}

	pub fn with_constructor(mut self, name: &str, params: Vec<SurfaceParam>) -> Self {
		if let SurfaceDeclKind::Data { constructors } = &mut self.kind {
			constructors.push(SurfaceConstructor {
				name: ident(name),
				params,
				span: Span::default(),
			});
		}
		self
	}

	pub fn with_field(mut self, name: &str, ty: SurfaceExpr) -> Self {
		if let SurfaceDeclKind::Class { fields, .. } = &mut self.kind {
			fields.push(SurfaceField {
				name: ident(name),
				ty: Some(ty),
				span: Span::default(),
			});
		}
		self
	}

	pub fn with_precedence(mut self, precedence: Precedence) -> Self {
		self.precedence = precedence;
		self
	}

	pub fn with_alias(mut self, alias: Ident) -> Self {
		self.alias = Some(alias);
		self
	}

	pub fn with_span(mut self, span: Span) -> Self {
		self.span = span;
		self
	}

	pub fn with_name_span(mut self, span: Span) -> Self {
		self.name.span = span;
		self
	}

	pub fn group(self) -> SurfaceGroup {
		SurfaceGroup::new(self)
	}
}

impl SurfaceGroup {
	pub fn new(decl: SurfaceDecl) -> Self {
		Self {
			decl,
			where_block: Vec::new(),
			dynamic: Vec::new(),
		}
	}

	pub fn with_where(mut self, nested: impl Into<SurfaceGroup>) -> Self {
		self.where_block.push(nested.into());
		self
	}

	pub fn with_dynamic(mut self, nested: impl Into<SurfaceGroup>) -> Self {
		self.dynamic.push(nested.into());
		self
	}
}

impl From<SurfaceDecl> for SurfaceGroup {
	fn from(decl: SurfaceDecl) -> Self {
		Self::new(decl)
	}
}

impl SyntaxTree {
	pub fn new(file: FileId) -> Self {
		Self {
			file,
			module: None,
			imports: Vec::new(),
			root: Vec::new(),
		}
	}

	pub fn with_module(mut self, module: ModulePath) -> Self {
		self.module = Some(module);
		self
	}

	pub fn with_import(mut self, module: &str) -> Self {
		self.imports.push(Import {
			module: ModulePath::parse(module),
			using: None,
			hiding: Vec::new(),
			span: Span::default(),
		});
		self
	}

	pub fn with_decl(mut self, group: impl Into<SurfaceGroup>) -> Self {
		self.root.push(group.into());
		self
	}
}
