//! Scheduler error types
//! Setup failures are fatal; nothing here is retried.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors surfaced by the control process
#[derive(Debug)]
pub enum SchedError {
    /// No quantum on the command line or in the environment
    QuantumMissing,
    /// Quantum present but not a non-negative integer
    InvalidQuantum(String),
    /// Workload source could not be read
    Workload {
        path: Option<PathBuf>,
        source: io::Error,
    },
    /// fork() failed; already-created children have been killed
    Fork(io::Error),
    /// Signal mask or disposition could not be installed
    SignalSetup(io::Error),
    /// Ticker or reaper thread could not be started
    EventSource(io::Error),
    /// An entry reached the scheduler without an OS pid
    NotLaunched(usize),
    /// Every event producer went away while children were still active
    EventChannelClosed,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SchedError::QuantumMissing => write!(
                f,
                "quantum undefined, pass --quantum=<msec> or set RRSCHED_QUANTUM_MSEC"
            ),
            SchedError::InvalidQuantum(raw) => write!(f, "invalid quantum '{}'", raw),
            SchedError::Workload { path: Some(path), source } => {
                write!(f, "failed to read workload {}: {}", path.display(), source)
            }
            SchedError::Workload { path: None, source } => {
                write!(f, "failed to read workload from stdin: {}", source)
            }
            SchedError::Fork(e) => write!(f, "fork failed: {}", e),
            SchedError::SignalSetup(e) => write!(f, "failed to set up signals: {}", e),
            SchedError::EventSource(e) => write!(f, "failed to start event source: {}", e),
            SchedError::NotLaunched(slot) => {
                write!(f, "workload entry {} has no process id", slot)
            }
            SchedError::EventChannelClosed => write!(f, "event sources stopped unexpectedly"),
        }
    }
}

impl Error for SchedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SchedError::Workload { source, .. } => Some(source),
            SchedError::Fork(e) | SchedError::SignalSetup(e) | SchedError::EventSource(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}

pub type SchedResult<T> = Result<T, SchedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_workload_path() {
        let err = SchedError::Workload {
            path: Some(PathBuf::from("/tmp/missing.txt")),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        let text = err.to_string();
        assert!(text.contains("/tmp/missing.txt"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_config_errors_have_no_source() {
        assert!(SchedError::QuantumMissing.source().is_none());
        assert!(SchedError::InvalidQuantum("abc".into()).to_string().contains("abc"));
    }
}
