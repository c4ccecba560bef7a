//! Diagnostics handed to the presentation collaborator.
//!
//! The core never formats user-facing text: a diagnostic carries a stable
//! [`MessageKey`] plus raw arguments (names, durations) for the presenter.

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::ids::{DefinitionId, FileId, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
	Error,
	Warning,
	Info,
}

/// Stable message identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
	UnresolvedName,
	AmbiguousName,
	DuplicateName,
	MalformedPattern,
	CyclicTypeDependency,
	ForwardReference,
	TypecheckingInterrupted,
	Goal,
	PatternCountMismatch,
	EmptyCase,
	/// Key chosen by the typechecking engine.
	Engine(&'static str),
}

impl MessageKey {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::UnresolvedName => "resolve.unresolved_name",
			Self::AmbiguousName => "resolve.ambiguous_name",
			Self::DuplicateName => "resolve.duplicate_name",
			Self::MalformedPattern => "resolve.malformed_pattern",
			Self::CyclicTypeDependency => "order.cyclic_type_dependency",
			Self::ForwardReference => "order.forward_reference",
			Self::TypecheckingInterrupted => "typecheck.interrupted",
			Self::Goal => "dumb.goal",
			Self::PatternCountMismatch => "dumb.pattern_count_mismatch",
			Self::EmptyCase => "dumb.empty_case",
			Self::Engine(key) => key,
		}
	}
}

/// Which stage produced a diagnostic; sinks clear per origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticOrigin {
	Resolver,
	Orderer,
	Typechecker,
	DumbChecker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticTarget {
	Definition(DefinitionId),
	Span(Span),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
	pub file: FileId,
	pub target: DiagnosticTarget,
	/// Definition the diagnostic belongs to, when known (also for span targets).
	pub owner: Option<DefinitionId>,
	pub severity: Severity,
	pub key: MessageKey,
	pub origin: DiagnosticOrigin,
	pub args: SmallVec<[String; 2]>,
}

impl Diagnostic {
	pub fn new(file: FileId, target: DiagnosticTarget, severity: Severity, key: MessageKey, origin: DiagnosticOrigin) -> Self {
		let owner = match target {
			DiagnosticTarget::Definition(id) => Some(id),
			DiagnosticTarget::Span(_) => None,
		};
		Self {
			file,
			target,
			owner,
			severity,
			key,
			origin,
			args: SmallVec::new(),
		}
	}

	pub fn on_definition(file: FileId, id: DefinitionId, severity: Severity, key: MessageKey, origin: DiagnosticOrigin) -> Self {
		Self::new(file, DiagnosticTarget::Definition(id), severity, key, origin)
	}

	pub fn at_span(file: FileId, span: Span, severity: Severity, key: MessageKey, origin: DiagnosticOrigin) -> Self {
		Self::new(file, DiagnosticTarget::Span(span), severity, key, origin)
	}

	pub fn with_owner(mut self, owner: DefinitionId) -> Self {
		self.owner = Some(owner);
		self
	}

	pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
		self.args.push(arg.into());
		self
	}

	pub fn is_error(&self) -> bool {
		self.severity == Severity::Error
	}
}

/// Receiver of diagnostics (the presentation layer in production).
pub trait DiagnosticSink: Send + Sync {
	fn publish(&self, diagnostic: Diagnostic);

	/// Drops every diagnostic of `origin` previously published for `file`.
	fn clear(&self, file: FileId, origin: DiagnosticOrigin);

	/// Drops diagnostics of `origin` owned by one definition.
	fn clear_definition(&self, id: DefinitionId, origin: DiagnosticOrigin);
}

/// In-memory sink, used by tooling and tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
	diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn snapshot(&self) -> Vec<Diagnostic> {
		self.diagnostics.lock().clone()
	}

	pub fn with_key(&self, key: MessageKey) -> Vec<Diagnostic> {
		self.diagnostics.lock().iter().filter(|d| d.key == key).cloned().collect()
	}

	pub fn for_definition(&self, id: DefinitionId) -> Vec<Diagnostic> {
		self.diagnostics.lock().iter().filter(|d| d.owner == Some(id)).cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.diagnostics.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.diagnostics.lock().is_empty()
	}
}

impl DiagnosticSink for CollectingSink {
	fn publish(&self, diagnostic: Diagnostic) {
		self.diagnostics.lock().push(diagnostic);
	}

	fn clear(&self, file: FileId, origin: DiagnosticOrigin) {
		self.diagnostics.lock().retain(|d| !(d.file == file && d.origin == origin));
	}

	fn clear_definition(&self, id: DefinitionId, origin: DiagnosticOrigin) {
		self.diagnostics.lock().retain(|d| !(d.owner == Some(id) && d.origin == origin));
	}
}
