//! Surface declarations as delivered by the parser.
//!
//! Names are unbound strings here; binding them is the resolver's job.

use std::fmt;

use lemma_core::{DefinitionPath, FileId, ModulePath, Precedence, Span};
use smallvec::SmallVec;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
	pub name: String,
	pub span: Span,
}

impl Ident {
	pub fn new(name: impl Into<String>, span: Span) -> Self {
		Self { name: name.into(), span }
	}
}

/// Possibly qualified name `A.B.c`. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LongName {
	segments: SmallVec<[Ident; 2]>,
}

impl LongName {
	pub fn single(ident: Ident) -> Self {
		Self {
			segments: smallvec::smallvec![ident],
		}
	}

	/// `None` when `segments` is empty.
	pub fn new(segments: impl IntoIterator<Item = Ident>) -> Option<Self> {
		let segments: SmallVec<[Ident; 2]> = segments.into_iter().collect();
		(!segments.is_empty()).then_some(Self { segments })
	}

	/// Splits `dotted` on `.`, giving each segment its offset in the text as span.
	pub fn parse(dotted: &str) -> Self {
		let mut segments = SmallVec::new();
		let mut offset = 0u32;
		for part in dotted.split('.') {
			let len = part.len() as u32;
			segments.push(Ident::new(part, Span::new(offset, offset + len)));
			offset += len + 1;
		}
		Self { segments }
	}

	pub fn segments(&self) -> &[Ident] {
		&self.segments
	}

	pub fn is_qualified(&self) -> bool {
		self.segments.len() > 1
	}

	pub fn head(&self) -> &Ident {
		&self.segments[0]
	}

	pub fn last(&self) -> &Ident {
		&self.segments[self.segments.len() - 1]
	}

	pub fn span(&self) -> Span {
		self.head().span.cover(self.last().span)
	}
}

impl fmt::Display for LongName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, segment) in self.segments.iter().enumerate() {
			if i > 0 {
				f.write_str(".")?;
			}
			f.write_str(&segment.name)?;
		}
		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
	pub module: ModulePath,
	/// `\import M (a, b)`; `None` imports every exported name.
	pub using: Option<Vec<String>>,
	pub hiding: Vec<String>,
	pub span: Span,
}

impl Import {
	pub fn exposes(&self, name: &str) -> bool {
		!self.hiding.iter().any(|h| h == name) && self.using.as_ref().is_none_or(|using| using.iter().any(|u| u == name))
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceParam {
	/// `None` for `_`.
	pub names: Vec<Option<Ident>>,
	pub ty: Option<SurfaceExpr>,
	pub explicit: bool,
	pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceArg {
	pub expr: SurfaceExpr,
	pub explicit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceExpr {
	Name(LongName),
	App {
		function: Box<SurfaceExpr>,
		args: Vec<SurfaceArg>,
	},
	Lam {
		params: Vec<SurfaceParam>,
		body: Box<SurfaceExpr>,
	},
	Pi {
		params: Vec<SurfaceParam>,
		codomain: Box<SurfaceExpr>,
	},
	Sigma {
		params: Vec<SurfaceParam>,
	},
	Tuple {
		fields: Vec<SurfaceExpr>,
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
		expr: Option<Box<SurfaceExpr>>,
		span: Span,
	},
	Number {
		literal: String,
		span: Span,
	},
	Case {
		scrutinees: Vec<SurfaceExpr>,
		clauses: Vec<SurfaceClause>,
		span: Span,
	},
	Let {
		clauses: Vec<SurfaceLetClause>,
		body: Box<SurfaceExpr>,
	},
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceClause {
	pub patterns: Vec<SurfacePattern>,
	/// `None` for absurd clauses.
	pub body: Option<SurfaceExpr>,
	pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceLetClause {
	pub name: Ident,
	pub params: Vec<SurfaceParam>,
	pub ty: Option<SurfaceExpr>,
	pub term: SurfaceExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfacePattern {
	/// A name with optional arguments; whether it is a variable or a
	/// constructor is only known after resolution.
	Name {
		name: LongName,
		args: Vec<SurfacePattern>,
		explicit: bool,
		span: Span,
	},
	Wildcard {
		explicit: bool,
		span: Span,
	},
	Tuple {
		fields: Vec<SurfacePattern>,
		span: Span,
	},
	Absurd {
		span: Span,
	},
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceConstructor {
	pub name: Ident,
	pub params: Vec<SurfaceParam>,
	pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceField {
	pub name: Ident,
	pub ty: Option<SurfaceExpr>,
	pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceBody {
	None,
	Term(SurfaceExpr),
	Clauses(Vec<SurfaceClause>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceDeclKind {
	Function { body: SurfaceBody },
	Data { constructors: Vec<SurfaceConstructor> },
	Class { record: bool, fields: Vec<SurfaceField> },
	Meta { body: Option<SurfaceExpr> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceDecl {
	pub name: Ident,
	/// Secondary name, usually an operator spelling (`\alias`).
	pub alias: Option<Ident>,
	pub precedence: Precedence,
	pub kind: SurfaceDeclKind,
	pub params: Vec<SurfaceParam>,
	pub result_type: Option<SurfaceExpr>,
	pub span: Span,
}

/// A declaration with the declarations nested under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceGroup {
	pub decl: SurfaceDecl,
	pub where_block: Vec<SurfaceGroup>,
	/// Dynamic (instance-level) declarations of a class.
	pub dynamic: Vec<SurfaceGroup>,
}

impl SurfaceGroup {
	fn visit<'a>(&'a self, path: DefinitionPath, f: &mut impl FnMut(&DefinitionPath, &'a SurfaceDecl)) {
		f(&path, &self.decl);
		for nested in self.where_block.iter().chain(&self.dynamic) {
			nested.visit(path.child(nested.decl.name.name.clone()), f);
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
	pub file: FileId,
	pub module: Option<ModulePath>,
	pub imports: Vec<Import>,
	pub root: Vec<SurfaceGroup>,
}

impl SyntaxTree {
	/// Visits every declaration with its path, parents before children, in source order.
	pub fn for_each_decl<'a>(&'a self, mut f: impl FnMut(&DefinitionPath, &'a SurfaceDecl)) {
		for group in &self.root {
			group.visit(DefinitionPath::root(group.decl.name.name.clone()), &mut f);
		}
	}

	/// Number of declarations, nested `where` and dynamic ones included.
	pub fn definition_count(&self) -> usize {
		let mut count = 0;
		self.for_each_decl(|_, _| count += 1);
		count
	}

	/// Path of the innermost declaration whose span contains `offset`.
	pub fn decl_at(&self, offset: u32) -> Option<DefinitionPath> {
		let mut found = None;
		self.for_each_decl(|path, decl| {
			if decl.span.start <= offset && offset < decl.span.end {
				found = Some(path.clone());
			}
		});
		found
	}
}
