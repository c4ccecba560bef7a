use lemma_core::{DefinitionId, LocalId, Span};
use smallvec::SmallVec;

/// Side-channel classification of a source range, consumed by presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionEvent {
	pub span: Span,
	pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
	/// Name or alias of a declaration, constructor or field.
	Declaration { id: DefinitionId },
	/// Reference to an infix definition.
	Operator { target: DefinitionId },
	/// Reference to a meta definition.
	MetaResolved { target: DefinitionId },
	/// Resolved prefix of a qualified name, targets in segment order.
	LongName { targets: SmallVec<[DefinitionId; 2]> },
	ConstructorPattern { constructor: DefinitionId },
	/// Parameter typed by a non-record class.
	ClassParameter { class: DefinitionId },
}

/// How one segment of a long name resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentResult {
	/// Part of an imported module name.
	Module,
	Local(LocalId),
	Global(DefinitionId),
	Unresolved,
	Ambiguous(SmallVec<[DefinitionId; 2]>),
}

impl SegmentResult {
	pub fn is_error(&self) -> bool {
		matches!(self, Self::Unresolved | Self::Ambiguous(_))
	}
}

/// Per-segment lookup results of one reference, in lookup order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceReport {
	/// Definition the reference occurs in.
	pub owner: DefinitionId,
	pub name: String,
	pub span: Span,
	/// Segments up to and including the first failing one.
	pub segments: SmallVec<[SegmentResult; 2]>,
	pub first_error: Option<usize>,
}

impl ReferenceReport {
	pub fn is_error(&self) -> bool {
		self.first_error.is_some()
	}
}
