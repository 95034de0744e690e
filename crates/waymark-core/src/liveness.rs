//! Consumer-liveness probe.
//!
//! The watchdog only depends on a boolean answer plus a stale-for-N-polls
//! threshold, so the probe is a trait; the process-table implementation
//! here covers hosts where the consumer runs as a separate process.

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

/// Answers "is the consumer process still alive?" on each watchdog poll.
pub trait LivenessProbe: Send {
    fn consumer_alive(&mut self) -> bool;
}

/// Probe backed by the OS process table.
///
/// The consumer counts as alive while at least one process whose name
/// contains `process_name` exists (excluding ourselves).
pub struct ProcessLivenessProbe {
    system: System,
    process_name: String,
    own_pid: u32,
}

impl ProcessLivenessProbe {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            system: System::new(),
            process_name: process_name.into(),
            own_pid: std::process::id(),
        }
    }
}

impl LivenessProbe for ProcessLivenessProbe {
    fn consumer_alive(&mut self) -> bool {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            ProcessRefreshKind::new(),
        );

        let needle = self.process_name.as_str();
        let alive = self.system.processes().iter().any(|(pid, process)| {
            pid.as_u32() != self.own_pid
                && process.name().to_string_lossy().contains(needle)
        });

        if !alive {
            log::debug!("liveness probe: no process matching '{needle}'");
        }
        alive
    }
}

/// Probe that always reports alive. Used when the consumer is in-process
/// (queue-only or embedded deployments) and by tests.
pub struct AlwaysAlive;

impl LivenessProbe for AlwaysAlive {
    fn consumer_alive(&mut self) -> bool {
        true
    }
}
