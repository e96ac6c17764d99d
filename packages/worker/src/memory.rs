//! Process memory measurement for the worker's memory limit.

use sysinfo::{Pid, System};

#[derive(Debug, Clone, thiserror::Error)]
#[error("memory probe failed: {0}")]
pub struct MemoryProbeError(pub String);

/// Source of the current memory usage, in bytes.
///
/// The worker samples it once per loop iteration, and only when a memory
/// limit is configured.
pub trait MemoryProbe: Send {
    fn current_usage(&mut self) -> Result<u64, MemoryProbeError>;
}

/// Resident set size of the current process, read through `sysinfo`.
pub struct ProcessMemory {
    system: System,
    pid: Option<Pid>,
}

impl ProcessMemory {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Cannot determine current pid, memory limit disabled: {}", e);
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemory {
    fn current_usage(&mut self) -> Result<u64, MemoryProbeError> {
        let pid = self
            .pid
            .ok_or_else(|| MemoryProbeError("current pid unknown".into()))?;
        if !self.system.refresh_process(pid) {
            return Err(MemoryProbeError(format!("process {} not found", pid)));
        }
        self.system
            .process(pid)
            .map(|process| process.memory())
            .ok_or_else(|| MemoryProbeError(format!("process {} not found", pid)))
    }
}

impl std::fmt::Debug for ProcessMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessMemory").field("pid", &self.pid).finish()
    }
}
