//! rrsched - user-space round-robin process scheduler
//!
//! Starts every command line of a workload as a child process held at a start
//! barrier, then time-slices the children with `SIGSTOP`/`SIGCONT` in fixed
//! quanta until all of them have exited.

pub mod config;
pub mod error;
pub mod event;
pub mod launch;
pub mod monitor;
pub mod process;
pub mod quantum;
pub mod queue;
pub mod sched;
pub mod sys;
pub mod workload;

pub use config::Config;
pub use error::{SchedError, SchedResult};
pub use event::{Event, EventSources, Exit};
pub use launch::{launch_all, ProcessControl, SignalControl};
pub use monitor::Monitor;
pub use process::{ExitStatus, Pid, ProcessEntry, ProcessState};
pub use quantum::{Clamp, Quantum};
pub use queue::ReadyQueue;
pub use sched::{Finished, RunSummary, Scheduler};
