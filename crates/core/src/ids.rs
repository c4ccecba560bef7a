use std::fmt;

/// Identity of a source file (or of a library module served from the cache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u32);

/// Stable identity of a declaration.
///
/// Interned by the [`crate::DefinitionStore`] from the declaring file and the
/// qualified path of the declaration inside that file, so it survives edits
/// that keep the name. Ids are handed out from a monotonic counter and never
/// reused for another declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefinitionId(pub u32);

/// Identity of a local binder inside one concrete definition.
///
/// Numbered in binding order per definition, which keeps resolution output
/// identical across passes over the same tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalId(pub u32);

/// Dotted module name used by imports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
	pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
		Self(segments.into_iter().map(Into::into).collect())
	}

	/// Parses `A.B.C`.
	pub fn parse(dotted: &str) -> Self {
		Self::new(dotted.split('.').filter(|s| !s.is_empty()))
	}

	pub fn segments(&self) -> &[String] {
		&self.0
	}
}

impl fmt::Display for ModulePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0.join("."))
	}
}

/// Qualified path of a declaration inside its file (`outer.inner.name`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefinitionPath(Vec<String>);

impl DefinitionPath {
	pub fn root(name: impl Into<String>) -> Self {
		Self(vec![name.into()])
	}

	pub fn child(&self, name: impl Into<String>) -> Self {
		let mut segments = self.0.clone();
		segments.push(name.into());
		Self(segments)
	}

	/// Last segment.
	pub fn name(&self) -> &str {
		self.0.last().map(String::as_str).unwrap_or_default()
	}

	pub fn parent(&self) -> Option<Self> {
		(self.0.len() > 1).then(|| Self(self.0[..self.0.len() - 1].to_vec()))
	}

	pub fn depth(&self) -> usize {
		self.0.len()
	}
}

impl fmt::Display for DefinitionPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0.join("."))
	}
}

/// Byte range in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Span {
	pub start: u32,
	pub end: u32,
}

impl Span {
	pub const fn new(start: u32, end: u32) -> Self {
		Self { start, end }
	}

	/// Smallest span covering both.
	pub fn cover(self, other: Span) -> Span {
		Span {
			start: self.start.min(other.start),
			end: self.end.max(other.end),
		}
	}
}
