//! Background typechecking for the incremental pipeline.
//!
//! - [`engine`]: the [`TypecheckEngine`] seam, groups, budgets and verdicts
//! - [`BackgroundTypechecker`]: one stamped run over one file
//! - [`TaskScheduler`]: per-file single-flight runs, newest clock wins
//! - [`FilePipeline`]: foreground glue from a new syntax tree to a run request
//!
//! Only the scheduler spawns. Everything a run writes goes through the
//! store's conditional commits, so a run that lost the race to a newer edit
//! leaves no trace besides its log lines.

mod dumb;
pub mod engine;
mod error;
mod pipeline;
mod scheduler;
mod typechecker;

pub use lemma_config::TypecheckingMode;

pub use crate::dumb::DumbChecker;
pub use crate::engine::{Budget, CheckGroup, DefinitionVerdict, GroupVerdict, TypecheckEngine};
pub use crate::error::{EngineError, Result, RunError};
pub use crate::pipeline::{EditReport, FilePipeline};
pub use crate::scheduler::{RequestOutcome, RunEvent, RunRequest, RunResult, SlotState, TaskScheduler};
pub use crate::typechecker::{BackgroundTypechecker, RunOutcome, RunPlan, RunReport};

#[cfg(test)]
mod invariants;
