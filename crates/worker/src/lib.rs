//! Worker runtime primitives for background typechecking.
//!
//! All background spawns go through [`spawn`] / [`spawn_blocking`] so they are
//! tagged with a [`TaskClass`] and attach to the current tokio runtime when one
//! exists.

mod class;
mod spawn;
mod token;

pub use class::TaskClass;
pub use spawn::{spawn, spawn_blocking};
pub use token::StampedToken;
