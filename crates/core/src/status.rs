/// Typechecking state of a definition in the store.
///
/// Within one background run a definition only moves forward:
/// `NotTypechecked -> InProgress -> {Ok | HasErrors | Blacklisted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypecheckStatus {
	#[default]
	NotTypechecked,
	InProgress,
	Ok,
	HasErrors,
	/// Interrupted by its time budget; not retried until edited.
	Blacklisted,
}

impl TypecheckStatus {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::NotTypechecked => "not_typechecked",
			Self::InProgress => "in_progress",
			Self::Ok => "ok",
			Self::HasErrors => "has_errors",
			Self::Blacklisted => "blacklisted",
		}
	}

	/// A committed outcome a dependent can rely on.
	pub const fn is_final(self) -> bool {
		matches!(self, Self::Ok | Self::HasErrors | Self::Blacklisted)
	}

	pub const fn without_errors(self) -> bool {
		matches!(self, Self::Ok)
	}

	/// Whether a smart run should pick this definition up.
	pub const fn needs_typecheck(self) -> bool {
		matches!(self, Self::NotTypechecked)
	}

	/// Whether `next` is a legal step within one run.
	pub const fn advances_to(self, next: Self) -> bool {
		match (self, next) {
			(Self::NotTypechecked, Self::InProgress) => true,
			(Self::NotTypechecked | Self::InProgress, Self::Ok | Self::HasErrors | Self::Blacklisted) => true,
			_ => false,
		}
	}
}
