//! Surface syntax handed to the resolver by the parser host.
//!
//! This crate does not parse. It fixes the shape of the tree the host
//! produces and the [`SyntaxProvider`] through which the pipeline pulls
//! trees stamped with the edit clock.

pub mod build;
mod provider;
mod tree;

pub use provider::{MemorySyntaxProvider, SyntaxProvider, TreeSnapshot};
pub use tree::{
	Ident, Import, LongName, SurfaceArg, SurfaceBody, SurfaceClause, SurfaceConstructor, SurfaceDecl, SurfaceDeclKind, SurfaceExpr,
	SurfaceField, SurfaceGroup, SurfaceLetClause, SurfaceParam, SurfacePattern, SyntaxTree,
};
