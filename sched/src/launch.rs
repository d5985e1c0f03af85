//! Launch coordinator
//!
//! Every workload entry is forked up front and parked at a start barrier: the
//! child blocks in `sigwait` for `SIGUSR1` before it execs its program, so no
//! workload code runs until the scheduler picks that entry for the first time.

use std::ffi::CString;
use std::io;
use std::ptr;

use libc::c_char;
use log::{debug, trace, warn};

use crate::error::{SchedError, SchedResult};
use crate::process::{Pid, ProcessEntry};
use crate::quantum::Quantum;
use crate::sys::{self, Fork};

/// Signal releasing a child from its start barrier
pub const START_SIGNAL: libc::c_int = libc::SIGUSR1;

/// Exit status of a child whose program could not be executed
pub const EXEC_FAILURE_STATUS: i32 = 127;

/// Run/stop control over managed children
#[cfg_attr(test, mockall::automock)]
pub trait ProcessControl {
    /// Releases a child from its start barrier
    fn start(&mut self, pid: Pid) -> io::Result<()>;
    fn stop(&mut self, pid: Pid) -> io::Result<()>;
    fn resume(&mut self, pid: Pid) -> io::Result<()>;
    fn kill(&mut self, pid: Pid) -> io::Result<()>;
}

/// `ProcessControl` backed by real signals
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalControl;

impl ProcessControl for SignalControl {
    fn start(&mut self, pid: Pid) -> io::Result<()> {
        sys::send_signal(pid, START_SIGNAL)
    }

    fn stop(&mut self, pid: Pid) -> io::Result<()> {
        sys::send_signal(pid, libc::SIGSTOP)
    }

    fn resume(&mut self, pid: Pid) -> io::Result<()> {
        sys::send_signal(pid, libc::SIGCONT)
    }

    fn kill(&mut self, pid: Pid) -> io::Result<()> {
        sys::send_signal(pid, libc::SIGKILL)
    }
}

/// Everything the child needs, allocated before fork.
struct ExecImage {
    // Owns the strings `argv` points into
    _args: Vec<CString>,
    argv: Vec<*const c_char>,
    failure: Vec<u8>,
    start_set: libc::sigset_t,
    empty_set: libc::sigset_t,
}

impl ExecImage {
    fn prepare(entry: &ProcessEntry) -> io::Result<Self> {
        let args = entry
            .c_argv()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut argv: Vec<*const c_char> = args.iter().map(|a| a.as_ptr()).collect();
        argv.push(ptr::null());
        let failure = format!("rrsched: failed to execute: {}\n", entry.command_line()).into_bytes();

        Ok(Self {
            _args: args,
            argv,
            failure,
            start_set: sys::signal_set(&[START_SIGNAL]),
            empty_set: sys::signal_set(&[]),
        })
    }

    /// Child side of fork. Only async-signal-safe calls from here on.
    fn exec_when_released(&self) -> ! {
        unsafe {
            let mut sig: libc::c_int = 0;
            while libc::sigwait(&self.start_set, &mut sig) != 0 {}
            libc::sigprocmask(libc::SIG_SETMASK, &self.empty_set, ptr::null_mut());
            libc::execvp(self.argv[0], self.argv.as_ptr());
            libc::write(
                libc::STDERR_FILENO,
                self.failure.as_ptr() as *const libc::c_void,
                self.failure.len(),
            );
            libc::_exit(EXEC_FAILURE_STATUS)
        }
    }
}

/// Forks every entry, records its pid and assigns the quantum.
///
/// `SIGUSR1` and `SIGCHLD` are blocked on the calling thread first, so each
/// child is born with the start signal pending-only and exits are left for
/// the reaper. Call this before spawning any other thread.
pub fn launch_all(entries: &mut [ProcessEntry], quantum: Quantum) -> SchedResult<()> {
    sys::block_signals(&[START_SIGNAL, libc::SIGCHLD]).map_err(SchedError::SignalSetup)?;

    let images = entries
        .iter()
        .map(ExecImage::prepare)
        .collect::<io::Result<Vec<_>>>()
        .map_err(|source| SchedError::Workload { path: None, source })?;

    for slot in 0..entries.len() {
        match unsafe { sys::fork() } {
            Ok(Fork::Child) => images[slot].exec_when_released(),
            Ok(Fork::Parent(pid)) => {
                let entry = &mut entries[slot];
                entry.assign_pid(pid);
                entry.assign_quantum(quantum.ticks());
                debug!("launched pid {} (held): {}", pid, entry.command_line());
            }
            Err(e) => {
                warn!("fork failed after {} of {} processes, killing them", slot, entries.len());
                kill_all(&entries[..slot], &mut SignalControl);
                return Err(SchedError::Fork(e));
            }
        }
    }
    Ok(())
}

/// SIGKILLs and reaps every launched, not yet dead entry.
pub fn kill_all<'a, C, I>(entries: I, control: &mut C)
where
    C: ProcessControl,
    I: IntoIterator<Item = &'a ProcessEntry>,
{
    let live = entries
        .into_iter()
        .filter(|e| !e.is_dead())
        .filter_map(ProcessEntry::pid);
    kill_pids(live, control);
}

/// SIGKILLs and reaps each pid in turn.
pub fn kill_pids<C, I>(pids: I, control: &mut C)
where
    C: ProcessControl,
    I: IntoIterator<Item = Pid>,
{
    for pid in pids {
        if let Err(e) = control.kill(pid) {
            trace!("kill {}: {}", pid, e);
        }
        match sys::wait(pid) {
            Ok(status) => debug!("pid {} killed ({:?})", pid, status),
            Err(e) => trace!("wait {}: {}", pid, e),
        }
    }
}
