//! Configuration for background typechecking.
//!
//! ```toml
//! [typechecking]
//! mode = "smart"
//! time-limit-ms = 5000
//! follow-up = true
//!
//! [scheduler]
//! max-concurrent-runs = 2
//! ```
//!
//! Every key is optional. Nothing here reads the file system unless asked
//! to through [`Config::load`] or [`Config::load_or_default`].

mod error;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

pub use crate::error::{ConfigError, Result};

/// How much background work runs after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TypecheckingMode {
	/// Full typechecking of definitions that are not yet checked.
	#[default]
	Smart,
	/// Structural checks only.
	Dumb,
	Off,
}

impl TypecheckingMode {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Smart => "smart",
			Self::Dumb => "dumb",
			Self::Off => "off",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct TypecheckingConfig {
	pub mode: TypecheckingMode,
	/// Wall-clock budget per definition, in milliseconds.
	pub time_limit_ms: u64,
	/// Run a full-file pass after a clean run over the edited definition alone.
	pub follow_up: bool,
}

impl Default for TypecheckingConfig {
	fn default() -> Self {
		Self {
			mode: TypecheckingMode::Smart,
			time_limit_ms: 5000,
			follow_up: true,
		}
	}
}

impl TypecheckingConfig {
	pub fn time_limit(&self) -> Duration {
		Duration::from_millis(self.time_limit_ms)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SchedulerConfig {
	/// Background runs executing at once, across all files.
	pub max_concurrent_runs: usize,
	/// Upper bound on waiting for a file's slot to go idle, in milliseconds.
	pub idle_timeout_ms: u64,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			max_concurrent_runs: 2,
			idle_timeout_ms: 30_000,
		}
	}
}

impl SchedulerConfig {
	pub fn idle_timeout(&self) -> Duration {
		Duration::from_millis(self.idle_timeout_ms)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	pub typechecking: TypecheckingConfig,
	pub scheduler: SchedulerConfig,
}

impl Config {
	pub fn from_toml_str(text: &str) -> Result<Self> {
		let config: Self = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&text)
	}

	/// Like [`Self::load`], but a missing file yields the defaults.
	pub fn load_or_default(path: &Path) -> Result<Self> {
		match std::fs::read_to_string(path) {
			Ok(text) => Self::from_toml_str(&text),
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
			Err(error) => Err(ConfigError::Io {
				path: path.to_path_buf(),
				error,
			}),
		}
	}

	fn validate(&self) -> Result<()> {
		if self.typechecking.time_limit_ms == 0 {
			return Err(ConfigError::Invalid {
				key: "typechecking.time-limit-ms",
				reason: "must be positive",
			});
		}
		if self.scheduler.max_concurrent_runs == 0 {
			return Err(ConfigError::Invalid {
				key: "scheduler.max-concurrent-runs",
				reason: "must be positive",
			});
		}
		if self.scheduler.idle_timeout_ms == 0 {
			return Err(ConfigError::Invalid {
				key: "scheduler.idle-timeout-ms",
				reason: "must be positive",
			});
		}
		Ok(())
	}
}
