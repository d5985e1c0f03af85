//! Thin wrappers over the libc process and signal calls the scheduler uses.

use std::io;
use std::mem::MaybeUninit;
use std::ptr;
use std::time::Duration;

use libc::c_int;

use crate::process::{ExitStatus, Pid};

/// Builds a signal set. Only async-signal-safe calls are made.
pub fn signal_set(signals: &[c_int]) -> libc::sigset_t {
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    unsafe {
        libc::sigemptyset(set.as_mut_ptr());
        for &sig in signals {
            libc::sigaddset(set.as_mut_ptr(), sig);
        }
        set.assume_init()
    }
}

/// Blocks `signals` on the calling thread. Threads spawned afterwards and
/// children forked afterwards inherit the mask.
pub fn block_signals(signals: &[c_int]) -> io::Result<()> {
    let set = signal_set(signals);
    let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok(())
}

/// Waits up to `timeout` for one of `set`. `None` on timeout or interruption.
pub fn timed_wait(set: &libc::sigset_t, timeout: Duration) -> Option<c_int> {
    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as libc::c_long,
    };
    let sig = unsafe { libc::sigtimedwait(set, ptr::null_mut(), &ts) };
    if sig < 0 {
        None
    } else {
        Some(sig)
    }
}

pub fn send_signal(pid: Pid, sig: c_int) -> io::Result<()> {
    if unsafe { libc::kill(pid.as_raw(), sig) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub enum Fork {
    Parent(Pid),
    Child,
}

/// # Safety
///
/// In the child only async-signal-safe functions may be called before exec
/// or `_exit`, since other threads' locks are copied in an unknown state.
pub unsafe fn fork() -> io::Result<Fork> {
    match libc::fork() {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(Fork::Child),
        pid => Ok(Fork::Parent(Pid::from_raw(pid))),
    }
}

fn decode(status: c_int) -> Option<ExitStatus> {
    if libc::WIFEXITED(status) {
        Some(ExitStatus::Exited(libc::WEXITSTATUS(status)))
    } else if libc::WIFSIGNALED(status) {
        Some(ExitStatus::Signaled(libc::WTERMSIG(status)))
    } else {
        None
    }
}

/// Non-blocking reap of one child. `Ok(None)` while it is still alive.
pub fn try_wait(pid: Pid) -> io::Result<Option<ExitStatus>> {
    let mut status: c_int = 0;
    match unsafe { libc::waitpid(pid.as_raw(), &mut status, libc::WNOHANG) } {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(None),
        _ => Ok(decode(status)),
    }
}

/// Blocking reap, used after SIGKILL during teardown.
pub fn wait(pid: Pid) -> io::Result<Option<ExitStatus>> {
    let mut status: c_int = 0;
    loop {
        match unsafe { libc::waitpid(pid.as_raw(), &mut status, 0) } {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            _ => return Ok(decode(status)),
        }
    }
}

fn sysconf(name: c_int, fallback: u64) -> u64 {
    let value = unsafe { libc::sysconf(name) };
    if value > 0 {
        value as u64
    } else {
        fallback
    }
}

pub fn clock_ticks_per_second() -> u64 {
    sysconf(libc::_SC_CLK_TCK, 100)
}

pub fn page_size() -> u64 {
    sysconf(libc::_SC_PAGESIZE, 4096)
}
