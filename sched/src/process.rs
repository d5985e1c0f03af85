//! Workload process entries
//! One entry per workload line: launch arguments, OS pid, lifecycle state and
//! quantum bookkeeping.

use std::ffi::CString;
use std::fmt;

/// OS process identifier of a managed child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(libc::pid_t);

impl Pid {
    pub const fn from_raw(raw: libc::pid_t) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> libc::pid_t {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Honours width and alignment so pids line up in table columns
        fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle of a workload process. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Forked and held at the start barrier
    Waiting,
    /// Released at least once; may currently be stopped
    Running,
    /// Termination observed; waiting to be evicted from the ready queue
    Dead,
}

/// How a child finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(i32),
    /// Gone, but reaped by someone else
    Lost,
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit {}", code),
            ExitStatus::Signaled(sig) => write!(f, "signal {}", sig),
            ExitStatus::Lost => write!(f, "status lost"),
        }
    }
}

#[derive(Debug)]
pub struct ProcessEntry {
    argv: Vec<String>,
    pid: Option<Pid>,
    state: ProcessState,
    ticks_remaining: u32,
    ticks_per_quantum: u32,
    grants: u64,
    exit_status: Option<ExitStatus>,
    // Monitoring samples, only used for the utilisation estimate
    prev_jiffies: u64,
    curr_jiffies: u64,
    prev_util: u64,
    curr_util: u64,
}

impl ProcessEntry {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            pid: None,
            state: ProcessState::Waiting,
            ticks_remaining: 0,
            ticks_per_quantum: 0,
            grants: 0,
            exit_status: None,
            prev_jiffies: 0,
            curr_jiffies: 0,
            prev_util: 0,
            curr_util: 0,
        }
    }

    /// Builds an entry from a command line, splitting on whitespace.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let argv: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
        if argv.is_empty() {
            None
        } else {
            Some(Self::new(argv))
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    /// argv as C strings for execvp. Interior NULs cannot come from a
    /// whitespace-split text line but are rejected rather than truncated.
    pub fn c_argv(&self) -> Result<Vec<CString>, std::ffi::NulError> {
        self.argv.iter().map(|arg| CString::new(arg.as_bytes())).collect()
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub fn assign_pid(&mut self, pid: Pid) {
        debug_assert!(self.pid.is_none(), "pid assigned twice");
        self.pid = Some(pid);
    }

    pub fn assign_quantum(&mut self, ticks: u32) {
        debug_assert!(ticks > 0);
        self.ticks_per_quantum = ticks;
        self.ticks_remaining = ticks;
    }

    pub fn ticks_per_quantum(&self) -> u32 {
        self.ticks_per_quantum
    }

    pub fn ticks_remaining(&self) -> u32 {
        self.ticks_remaining
    }

    /// Consumes one tick and returns what is left. Zero means the quantum
    /// expired; the counter is already refilled for the next grant.
    pub fn decrement_tick(&mut self) -> u32 {
        let left = self.ticks_remaining.saturating_sub(1);
        self.ticks_remaining = if left == 0 { self.ticks_per_quantum } else { left };
        left
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_dead(&self) -> bool {
        self.state == ProcessState::Dead
    }

    pub fn mark_running(&mut self) {
        debug_assert_eq!(self.state, ProcessState::Waiting);
        self.state = ProcessState::Running;
    }

    pub fn mark_dead(&mut self, status: ExitStatus) {
        self.state = ProcessState::Dead;
        self.exit_status = Some(status);
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    pub(crate) fn record_grant(&mut self) {
        self.grants += 1;
    }

    /// Number of times this process was started or resumed.
    pub fn grants(&self) -> u64 {
        self.grants
    }

    pub fn record_sample(&mut self, total_jiffies: u64, process_ticks: u64) {
        self.prev_jiffies = self.curr_jiffies;
        self.curr_jiffies = total_jiffies;
        self.prev_util = self.curr_util;
        self.curr_util = process_ticks;
    }

    /// CPU share between the last two samples, capped at 100.
    pub fn cpu_percent(&self) -> u32 {
        let jiffies = self.curr_jiffies.saturating_sub(self.prev_jiffies);
        if jiffies == 0 {
            return 0;
        }
        let util = self.curr_util.saturating_sub(self.prev_util);
        ((util.saturating_mul(100)) / jiffies).min(100) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(ticks: u32) -> ProcessEntry {
        let mut pr = ProcessEntry::from_command_line("sleep 5").unwrap();
        pr.assign_pid(Pid::from_raw(42));
        pr.assign_quantum(ticks);
        pr
    }

    #[test]
    fn test_pid_display_respects_width() {
        assert_eq!(format!("{:<8}|", Pid::from_raw(42)), "42      |");
        assert_eq!(format!("{:>6}", Pid::from_raw(7204)), "  7204");
        assert_eq!(Pid::from_raw(7204).to_string(), "7204");
    }

    #[test]
    fn test_command_line_is_split_on_whitespace() {
        let pr = ProcessEntry::from_command_line("  ls   -l\t/tmp ").unwrap();
        assert_eq!(pr.argv(), ["ls", "-l", "/tmp"]);
        assert_eq!(pr.state(), ProcessState::Waiting);
        assert_eq!(pr.pid(), None);
        assert!(ProcessEntry::from_command_line("   ").is_none());
    }

    #[test]
    fn test_c_argv_matches_argv() {
        let pr = ProcessEntry::from_command_line("echo hello world").unwrap();
        let c = pr.c_argv().unwrap();
        assert_eq!(c.len(), 3);
        assert_eq!(c[1].to_str().unwrap(), "hello");
    }

    #[test]
    fn test_quantum_expires_after_exactly_its_length() {
        let mut pr = entry(5);
        let left: Vec<u32> = (0..5).map(|_| pr.decrement_tick()).collect();
        assert_eq!(left, vec![4, 3, 2, 1, 0]);
        assert_eq!(pr.ticks_remaining(), 5);
    }

    #[test]
    fn test_single_tick_quantum_always_expires() {
        let mut pr = entry(1);
        assert_eq!(pr.decrement_tick(), 0);
        assert_eq!(pr.decrement_tick(), 0);
        assert_eq!(pr.ticks_remaining(), 1);
    }

    #[test]
    fn test_state_moves_forward_only() {
        let mut pr = entry(5);
        pr.mark_running();
        assert_eq!(pr.state(), ProcessState::Running);
        pr.mark_dead(ExitStatus::Exited(0));
        assert!(pr.is_dead());
        assert_eq!(pr.exit_status(), Some(ExitStatus::Exited(0)));
    }

    #[test]
    fn test_cpu_percent_uses_last_two_samples() {
        let mut pr = entry(5);
        assert_eq!(pr.cpu_percent(), 0);
        pr.record_sample(1_000, 10);
        pr.record_sample(1_200, 60);
        assert_eq!(pr.cpu_percent(), 25);
        pr.record_sample(1_300, 400);
        assert_eq!(pr.cpu_percent(), 100);
    }

    proptest! {
        #[test]
        fn prop_every_grant_lasts_ticks_per_quantum(ticks in 1u32..64, cycles in 1usize..20) {
            let mut pr = entry(ticks);
            for _ in 0..cycles {
                for n in 1..ticks {
                    prop_assert_eq!(pr.decrement_tick(), ticks - n);
                }
                prop_assert_eq!(pr.decrement_tick(), 0);
                prop_assert_eq!(pr.ticks_remaining(), ticks);
            }
        }
    }
}
