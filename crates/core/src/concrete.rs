//! Resolved ("concrete") definition trees.
//!
//! A [`ConcreteDefinition`] is an immutable snapshot produced by one
//! resolution pass. Every name is bound to a [`Reference`]; names that could
//! not be bound carry an [`ErrorReference`] instead of failing the pass.

use crate::ids::{DefinitionId, FileId, LocalId, Span};

/// What kind of declaration a definition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
	Function,
	Data,
	/// Classes and records. Parameters typed by a non-record class are class parameters.
	Class {
		record: bool,
	},
	/// Constructor of a data type; typechecked as part of its owner.
	Constructor,
	/// Field of a class; typechecked as part of its owner.
	Field,
	/// Meta definition with a custom resolver.
	Meta,
}

impl DefinitionKind {
	/// Members are not typechecked on their own.
	pub const fn is_member(self) -> bool {
		matches!(self, Self::Constructor | Self::Field)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Associativity {
	#[default]
	Left,
	Right,
	NonAssoc,
}

/// Operator precedence of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Precedence {
	pub infix: bool,
	pub priority: u8,
	pub associativity: Associativity,
}

impl Precedence {
	pub const fn infix(priority: u8, associativity: Associativity) -> Self {
		Self {
			infix: true,
			priority,
			associativity,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceErrorKind {
	Unresolved,
	Ambiguous,
}

/// Marker bound in place of a name that failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorReference {
	pub name: String,
	pub kind: ReferenceErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
	Global(DefinitionId),
	Local(LocalId),
	Error(ErrorReference),
}

impl Reference {
	pub fn global(&self) -> Option<DefinitionId> {
		match self {
			Self::Global(id) => Some(*id),
			_ => None,
		}
	}

	pub fn is_error(&self) -> bool {
		matches!(self, Self::Error(_))
	}
}

/// A telescope entry: one or more binders sharing a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteParam {
	/// `None` for `_`.
	pub binders: Vec<Option<LocalId>>,
	pub ty: Option<ConcreteExpr>,
	pub explicit: bool,
	pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteArg {
	pub expr: ConcreteExpr,
	pub explicit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcreteExpr {
	Reference {
		reference: Reference,
		span: Span,
	},
	App {
		function: Box<ConcreteExpr>,
		args: Vec<ConcreteArg>,
	},
	Lam {
		params: Vec<ConcreteParam>,
		body: Box<ConcreteExpr>,
	},
	Pi {
		params: Vec<ConcreteParam>,
		codomain: Box<ConcreteExpr>,
	},
	Sigma {
		params: Vec<ConcreteParam>,
	},
	Tuple {
		fields: Vec<ConcreteExpr>,
		span: Span,
	},
	Universe {
		level: Option<u32>,
		span: Span,
	},
	Hole {
		span: Span,
	},
	Goal {
		name: Option<String>,
		expr: Option<Box<ConcreteExpr>>,
		span: Span,
	},
	Number {
		literal: String,
		span: Span,
	},
	Case {
		scrutinees: Vec<ConcreteExpr>,
		clauses: Vec<ConcreteClause>,
		span: Span,
	},
	Let {
		clauses: Vec<ConcreteLetClause>,
		body: Box<ConcreteExpr>,
	},
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteClause {
	pub patterns: Vec<ConcretePattern>,
	/// `None` for absurd clauses.
	pub body: Option<ConcreteExpr>,
	pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteLetClause {
	pub binder: LocalId,
	pub params: Vec<ConcreteParam>,
	pub ty: Option<ConcreteExpr>,
	pub term: ConcreteExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcretePattern {
	/// Variable pattern; `None` for `_`.
	Binding {
		local: Option<LocalId>,
		explicit: bool,
		span: Span,
	},
	Constructor {
		constructor: DefinitionId,
		args: Vec<ConcretePattern>,
		explicit: bool,
		span: Span,
	},
	Tuple {
		fields: Vec<ConcretePattern>,
		span: Span,
	},
	Absurd {
		span: Span,
	},
	/// A pattern whose head did not name a constructor.
	Error {
		name: String,
		span: Span,
	},
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteConstructor {
	pub id: DefinitionId,
	pub name: String,
	pub params: Vec<ConcreteParam>,
	pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteField {
	pub id: DefinitionId,
	pub name: String,
	pub ty: Option<ConcreteExpr>,
	pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcreteBody {
	/// No body (axioms, metas without a default).
	None,
	Term(ConcreteExpr),
	Clauses(Vec<ConcreteClause>),
	Constructors(Vec<ConcreteConstructor>),
	Fields(Vec<ConcreteField>),
}

/// Edge to a definition this one needs typechecked first.
///
/// Members are already mapped to their owning data or class definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dependency {
	pub target: DefinitionId,
	/// Observed in the header (parameters or result type) rather than the body.
	pub header: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteDefinition {
	pub id: DefinitionId,
	pub file: FileId,
	pub name: String,
	pub kind: DefinitionKind,
	pub precedence: Precedence,
	pub params: Vec<ConcreteParam>,
	pub result_type: Option<ConcreteExpr>,
	pub body: ConcreteBody,
	pub span: Span,
	pub name_span: Span,
	/// Enclosing definition for `where`-block and dynamic declarations.
	pub parent: Option<DefinitionId>,
	/// Sorted by target; a target seen in both header and body is recorded once, as header.
	pub dependencies: Vec<Dependency>,
}

impl ConcreteDefinition {
	pub fn depends_on(&self, id: DefinitionId) -> bool {
		self.dependencies.iter().any(|d| d.target == id)
	}

	pub fn header_dependencies(&self) -> impl Iterator<Item = DefinitionId> + '_ {
		self.dependencies.iter().filter(|d| d.header).map(|d| d.target)
	}

	/// Constructor and field ids declared by this definition.
	pub fn members(&self) -> Vec<(DefinitionId, &str, DefinitionKind)> {
		match &self.body {
			ConcreteBody::Constructors(ctors) => ctors.iter().map(|c| (c.id, c.name.as_str(), DefinitionKind::Constructor)).collect(),
			ConcreteBody::Fields(fields) => fields.iter().map(|f| (f.id, f.name.as_str(), DefinitionKind::Field)).collect(),
			_ => Vec::new(),
		}
	}

	/// Visits every expression of the definition (header first), pre-order.
	pub fn walk_exprs(&self, f: &mut impl FnMut(&ConcreteExpr)) {
		walk_params(&self.params, f);
		if let Some(ty) = &self.result_type {
			walk_expr(ty, f);
		}
		match &self.body {
			ConcreteBody::None => {}
			ConcreteBody::Term(expr) => walk_expr(expr, f),
			ConcreteBody::Clauses(clauses) => walk_clauses(clauses, f),
			ConcreteBody::Constructors(ctors) => {
				for ctor in ctors {
					walk_params(&ctor.params, f);
				}
			}
			ConcreteBody::Fields(fields) => {
				for ty in fields.iter().filter_map(|field| field.ty.as_ref()) {
					walk_expr(ty, f);
				}
			}
		}
	}
}

impl ConcreteDefinition {
	/// Copy with every span zeroed, used to tell semantic edits from edits
	/// that only move the definition around.
	pub fn without_spans(&self) -> Self {
		let mut def = self.clone();
		def.span = Span::default();
		def.name_span = Span::default();
		erase_params(&mut def.params);
		if let Some(ty) = &mut def.result_type {
			erase_expr(ty);
		}
		match &mut def.body {
			ConcreteBody::None => {}
			ConcreteBody::Term(expr) => erase_expr(expr),
			ConcreteBody::Clauses(clauses) => erase_clauses(clauses),
			ConcreteBody::Constructors(ctors) => {
				for ctor in ctors {
					ctor.span = Span::default();
					erase_params(&mut ctor.params);
				}
			}
			ConcreteBody::Fields(fields) => {
				for field in fields {
					field.span = Span::default();
					if let Some(ty) = &mut field.ty {
						erase_expr(ty);
					}
				}
			}
		}
		def
	}
}

fn erase_params(params: &mut [ConcreteParam]) {
	for param in params {
		param.span = Span::default();
		if let Some(ty) = &mut param.ty {
			erase_expr(ty);
		}
	}
}

fn erase_clauses(clauses: &mut [ConcreteClause]) {
	for clause in clauses {
		clause.span = Span::default();
		for pattern in &mut clause.patterns {
			erase_pattern(pattern);
		}
		if let Some(body) = &mut clause.body {
			erase_expr(body);
		}
	}
}

fn erase_pattern(pattern: &mut ConcretePattern) {
	match pattern {
		ConcretePattern::Binding { span, .. } | ConcretePattern::Absurd { span } | ConcretePattern::Error { span, .. } => *span = Span::default(),
		ConcretePattern::Constructor { args, span, .. } => {
			*span = Span::default();
			for arg in args {
				erase_pattern(arg);
			}
		}
		ConcretePattern::Tuple { fields, span } => {
			*span = Span::default();
			for field in fields {
				erase_pattern(field);
			}
		}
	}
}

fn erase_expr(expr: &mut ConcreteExpr) {
	match expr {
		ConcreteExpr::Reference { span, .. }
		| ConcreteExpr::Universe { span, .. }
		| ConcreteExpr::Hole { span }
		| ConcreteExpr::Number { span, .. } => *span = Span::default(),
		ConcreteExpr::App { function, args } => {
			erase_expr(function);
			for arg in args {
				erase_expr(&mut arg.expr);
			}
		}
		ConcreteExpr::Lam { params, body } => {
			erase_params(params);
			erase_expr(body);
		}
		ConcreteExpr::Pi { params, codomain } => {
			erase_params(params);
			erase_expr(codomain);
		}
		ConcreteExpr::Sigma { params } => erase_params(params),
		ConcreteExpr::Tuple { fields, span } => {
			*span = Span::default();
			for field in fields {
				erase_expr(field);
			}
		}
		ConcreteExpr::Goal { expr, span, .. } => {
			*span = Span::default();
			if let Some(expr) = expr {
				erase_expr(expr);
			}
		}
		ConcreteExpr::Case { scrutinees, clauses, span } => {
			*span = Span::default();
			for scrutinee in scrutinees {
				erase_expr(scrutinee);
			}
			erase_clauses(clauses);
		}
		ConcreteExpr::Let { clauses, body } => {
			for clause in clauses {
				erase_params(&mut clause.params);
				if let Some(ty) = &mut clause.ty {
					erase_expr(ty);
				}
				erase_expr(&mut clause.term);
			}
			erase_expr(body);
		}
	}
}

/// Pre-order walk over an expression and all nested expressions.
pub fn walk_expr(expr: &ConcreteExpr, f: &mut impl FnMut(&ConcreteExpr)) {
	f(expr);
	match expr {
		ConcreteExpr::Reference { .. }
		| ConcreteExpr::Universe { .. }
		| ConcreteExpr::Hole { .. }
		| ConcreteExpr::Number { .. } => {}
		ConcreteExpr::App { function, args } => {
			walk_expr(function, f);
			for arg in args {
				walk_expr(&arg.expr, f);
			}
		}
		ConcreteExpr::Lam { params, body } => {
			walk_params(params, f);
			walk_expr(body, f);
		}
		ConcreteExpr::Pi { params, codomain } => {
			walk_params(params, f);
			walk_expr(codomain, f);
		}
		ConcreteExpr::Sigma { params } => walk_params(params, f),
		ConcreteExpr::Tuple { fields, .. } => {
			for field in fields {
				walk_expr(field, f);
			}
		}
		ConcreteExpr::Goal { expr, .. } => {
			if let Some(expr) = expr {
				walk_expr(expr, f);
			}
		}
		ConcreteExpr::Case { scrutinees, clauses, .. } => {
			for scrutinee in scrutinees {
				walk_expr(scrutinee, f);
			}
			walk_clauses(clauses, f);
		}
		ConcreteExpr::Let { clauses, body } => {
			for clause in clauses {
				walk_params(&clause.params, f);
				if let Some(ty) = &clause.ty {
					walk_expr(ty, f);
				}
				walk_expr(&clause.term, f);
			}
			walk_expr(body, f);
		}
	}
}

fn walk_params(params: &[ConcreteParam], f: &mut impl FnMut(&ConcreteExpr)) {
	for ty in params.iter().filter_map(|p| p.ty.as_ref()) {
		walk_expr(ty, f);
	}
}

fn walk_clauses(clauses: &[ConcreteClause], f: &mut impl FnMut(&ConcreteExpr)) {
	for body in clauses.iter().filter_map(|c| c.body.as_ref()) {
		walk_expr(body, f);
	}
}
