//! Host-side capability implementations for headless deployments.
//!
//! The supervisor treats fix acquisition and the consumer bridge as
//! injected capabilities; these implementations cover a plain Unix host:
//! a configurable command that prints one fix (e.g. `gpspipe`-style
//! tooling), and a JSON-lines file the consumer tails.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{PollError, SinkError};
use crate::provider::{LocationProvider, Position};
use crate::reading::Reading;
use crate::sink::DeliverySink;

/// Provider that shells out to a user-configured command expected to
/// print one `<latitude> <longitude>` pair on stdout.
pub struct CommandProvider {
    command: String,
}

impl CommandProvider {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl LocationProvider for CommandProvider {
    fn is_enabled(&self) -> bool {
        !self.command.trim().is_empty()
    }

    fn permission_granted(&self) -> bool {
        // Permission prompting is the host's concern; a command that is
        // not allowed to run surfaces as a failed fix.
        true
    }

    fn request_fix(&self, deadline: Duration) -> Result<Position, PollError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|_| PollError::ProviderDisabled)?;

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        log::warn!("fix command exited with {status}");
                        return Err(PollError::ProviderDisabled);
                    }
                    let mut output = String::new();
                    child
                        .stdout
                        .take()
                        .and_then(|mut out| out.read_to_string(&mut output).ok())
                        .ok_or(PollError::ProviderDisabled)?;
                    return parse_fix(&output).ok_or(PollError::ProviderDisabled);
                }
                Ok(None) => {
                    if started.elapsed() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(PollError::ProviderTimeout);
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(_) => return Err(PollError::ProviderDisabled),
            }
        }
    }
}

/// Parse `<lat> <lon>` (whitespace- or comma-separated) with range checks.
fn parse_fix(output: &str) -> Option<Position> {
    let mut parts = output
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty());
    let latitude: f64 = parts.next()?.parse().ok()?;
    let longitude: f64 = parts.next()?.parse().ok()?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }
    Some(Position {
        latitude,
        longitude,
    })
}

/// Sink that appends each reading as one JSON line to a file the consumer
/// tails. Attached while the parent directory exists.
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DeliverySink for JsonLinesSink {
    fn is_attached(&self) -> bool {
        self.path.parent().map_or(true, |dir| dir.exists())
    }

    fn deliver(&self, reading: &Reading) -> Result<(), SinkError> {
        use std::io::Write;

        let line = serde_json::to_string(reading).map_err(|_| SinkError::Unavailable)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|_| SinkError::Unavailable)?;
        writeln!(file, "{line}").map_err(|_| SinkError::Unavailable)
    }
}
