//! Shared data model of the incremental typechecking pipeline.
//!
//! - [`ids`]: stable definition, file and local identities
//! - [`clock`]: the edit clock, the sole ordering primitive for stale-work detection
//! - [`concrete`]: resolved definition snapshots and their dependency edges
//! - [`store`]: the [`DefinitionStore`], shared between resolution and background runs
//! - [`diagnostic`]: message keys, severities and the [`DiagnosticSink`] capability
//! - [`library`]: read-only cache of other modules' results

pub mod blacklist;
pub mod clock;
pub mod concrete;
pub mod diagnostic;
pub mod error;
pub mod ids;
pub mod library;
pub mod status;
pub mod store;

pub use blacklist::{BlacklistEntry, BlacklistReason};
pub use clock::{ClockValue, EditClock};
pub use concrete::{ConcreteBody, ConcreteDefinition, ConcreteExpr, ConcretePattern, Dependency, DefinitionKind, Precedence, Reference};
pub use diagnostic::{CollectingSink, Diagnostic, DiagnosticOrigin, DiagnosticSink, DiagnosticTarget, MessageKey, Severity};
pub use error::{Result, StoreError};
pub use ids::{DefinitionId, DefinitionPath, FileId, LocalId, ModulePath, Span};
pub use library::{CachedDefinition, LibraryCache, NoLibraries, StaticLibraryCache};
pub use status::TypecheckStatus;
pub use store::{CommitOutcome, DefinitionStore, InstallReport, Referable};
