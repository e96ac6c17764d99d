//! Limits applied to a single worker run.

use serde::{Deserialize, Serialize};

/// Environment variable holding the maximum number of jobs per run.
pub const MAX_RUNS_ENV: &str = "QUEUE_WORKER_MAX_RUNS";
/// Environment variable holding the memory ceiling in bytes.
pub const MAX_MEMORY_ENV: &str = "QUEUE_WORKER_MAX_MEMORY";

/// Configuration errors for [`WorkerOptions`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("invalid value {value} for option '{option}': must be greater than zero")]
    InvalidOption { option: &'static str, value: i64 },

    #[error("invalid value '{value}' in environment variable {var}")]
    Env { var: &'static str, value: String },
}

/// Run limits for a worker.
///
/// Both limits default to unbounded, in which case a run only ends when the
/// queue is empty. When both are set the run ends as soon as either is hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWorkerOptions", into = "RawWorkerOptions")]
pub struct WorkerOptions {
    max_runs: Option<u64>,
    max_memory: Option<u64>,
}

impl WorkerOptions {
    /// Options with no limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of jobs per run, `None` when unbounded.
    pub fn max_runs(&self) -> Option<u64> {
        self.max_runs
    }

    /// Memory ceiling in bytes, `None` when unbounded.
    pub fn max_memory(&self) -> Option<u64> {
        self.max_memory
    }

    pub fn set_max_runs(&mut self, max_runs: i64) -> Result<(), OptionsError> {
        self.max_runs = Some(positive("max_runs", max_runs)?);
        Ok(())
    }

    pub fn set_max_memory(&mut self, bytes: i64) -> Result<(), OptionsError> {
        self.max_memory = Some(positive("max_memory", bytes)?);
        Ok(())
    }

    pub fn clear_max_runs(&mut self) {
        self.max_runs = None;
    }

    pub fn clear_max_memory(&mut self) {
        self.max_memory = None;
    }

    /// Set the maximum number of jobs per run.
    pub fn with_max_runs(mut self, max_runs: i64) -> Result<Self, OptionsError> {
        self.set_max_runs(max_runs)?;
        Ok(self)
    }

    /// Set the memory ceiling in bytes.
    pub fn with_max_memory(mut self, bytes: i64) -> Result<Self, OptionsError> {
        self.set_max_memory(bytes)?;
        Ok(self)
    }

    /// Whether `runs` completed jobs exhaust the run limit.
    pub fn is_max_runs_reached(&self, runs: u64) -> bool {
        self.max_runs.is_some_and(|max| runs >= max)
    }

    /// Whether a measured memory usage hits the ceiling.
    pub fn is_max_memory_exceeded(&self, bytes: u64) -> bool {
        self.max_memory.is_some_and(|max| bytes >= max)
    }

    /// Load limits from [`MAX_RUNS_ENV`] and [`MAX_MEMORY_ENV`].
    ///
    /// Unset or empty variables leave the limit unbounded.
    pub fn from_env() -> Result<Self, OptionsError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`WorkerOptions::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OptionsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::new();
        if let Some(max_runs) = read_var(&lookup, MAX_RUNS_ENV)? {
            options.set_max_runs(max_runs)?;
        }
        if let Some(max_memory) = read_var(&lookup, MAX_MEMORY_ENV)? {
            options.set_max_memory(max_memory)?;
        }
        Ok(options)
    }
}

fn positive(option: &'static str, value: i64) -> Result<u64, OptionsError> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or(OptionsError::InvalidOption { option, value })
}

fn read_var<F>(lookup: &F, var: &'static str) -> Result<Option<i64>, OptionsError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| OptionsError::Env { var, value: raw }),
    }
}

/// Unvalidated serde form of [`WorkerOptions`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawWorkerOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_runs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_memory: Option<i64>,
}

impl TryFrom<RawWorkerOptions> for WorkerOptions {
    type Error = OptionsError;

    fn try_from(raw: RawWorkerOptions) -> Result<Self, Self::Error> {
        let mut options = WorkerOptions::new();
        if let Some(max_runs) = raw.max_runs {
            options.set_max_runs(max_runs)?;
        }
        if let Some(max_memory) = raw.max_memory {
            options.set_max_memory(max_memory)?;
        }
        Ok(options)
    }
}

impl From<WorkerOptions> for RawWorkerOptions {
    fn from(options: WorkerOptions) -> Self {
        // Values were validated on the way in, so they fit.
        Self {
            max_runs: options.max_runs.map(|v| v.min(i64::MAX as u64) as i64),
            max_memory: options.max_memory.map(|v| v.min(i64::MAX as u64) as i64),
        }
    }
}
