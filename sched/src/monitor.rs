//! Runtime monitor
//!
//! Samples `/proc/<pid>/{cmdline,io,stat}` for a process that has just been
//! stopped and prints one fixed-width table row. Any unreadable file skips
//! the row; the process may already be gone.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::process::{Pid, ProcessEntry};
use crate::sys;

/// Rows printed between header repeats
pub const HEADER_EVERY: u64 = 20;

/// Longest wait for a just-stopped process to report a stopped state
pub const STOP_SETTLE: Duration = Duration::from_millis(10);
const SETTLE_POLL: Duration = Duration::from_millis(1);

pub const HEADER: &str =
    "PID     SysReads  SysWrites State Faults  UserTime SysTime VMSize  RSSSize Cmd";

/// Fields of interest from `/proc/<pid>/stat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFields {
    pub state: String,
    pub major_faults: u64,
    pub utime: u64,
    pub stime: u64,
    pub vsize: u64,
    pub rss_pages: u64,
}

/// One consistent snapshot of a stopped process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStats {
    pub pid: Pid,
    pub cmd: String,
    pub syscr: u64,
    pub syscw: u64,
    pub stat: StatFields,
}

/// Parses a stat line. Fields are counted after the last `)` so a command
/// name containing spaces or parentheses does not shift them.
pub fn parse_stat(text: &str) -> Option<StatFields> {
    let rest = &text[text.rfind(')')? + 1..];
    // rest[0] is field 3 (state)
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let num = |field: usize| -> Option<u64> { fields.get(field - 3)?.parse().ok() };

    Some(StatFields {
        state: fields.first()?.to_string(),
        major_faults: num(12)?,
        utime: num(14)?,
        stime: num(15)?,
        vsize: num(23)?,
        rss_pages: num(24)?,
    })
}

/// Stopped, traced, or already gone: nothing will change before the sample.
fn is_settled(state: &str) -> bool {
    matches!(state, "T" | "t" | "Z" | "X" | "x")
}

/// Extracts `(syscr, syscw)` from an io file.
pub fn parse_io(text: &str) -> Option<(u64, u64)> {
    let mut syscr = None;
    let mut syscw = None;
    for line in text.lines() {
        let (key, value) = match line.split_once(':') {
            Some(kv) => kv,
            None => continue,
        };
        match key.trim() {
            "syscr" => syscr = value.trim().parse().ok(),
            "syscw" => syscw = value.trim().parse().ok(),
            _ => {}
        }
    }
    Some((syscr?, syscw?))
}

pub fn parse_cmdline(raw: &[u8]) -> String {
    raw.split(|&b| b == 0)
        .filter(|arg| !arg.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sum of the aggregate `cpu` line of `/proc/stat`.
pub fn parse_total_jiffies(text: &str) -> Option<u64> {
    let line = text.lines().find(|l| l.starts_with("cpu "))?;
    Some(line.split_whitespace().skip(1).filter_map(|v| v.parse::<u64>().ok()).sum())
}

/// Abbreviates a count: 1234 -> "1K", 12345678 -> "12M".
pub fn compact_count(n: u64) -> String {
    const UNITS: [(u64, &str); 5] = [
        (1_000_000_000_000_000, "Q"),
        (1_000_000_000_000, "T"),
        (1_000_000_000, "B"),
        (1_000_000, "M"),
        (1_000, "K"),
    ];
    for (scale, suffix) in UNITS {
        if n >= scale {
            return format!("{}{}", n / scale, suffix);
        }
    }
    n.to_string()
}

/// Abbreviates a byte size: 4096 -> "4 Kb", 12000000 -> "12 Mb".
pub fn compact_bytes(n: u64) -> String {
    const UNITS: [(u64, &str); 4] = [
        (1_000_000_000_000, "Tb"),
        (1_000_000_000, "Gb"),
        (1_000_000, "Mb"),
        (1_000, "Kb"),
    ];
    for (scale, suffix) in UNITS {
        if n >= scale {
            return format!("{} {}", n / scale, suffix);
        }
    }
    n.to_string()
}

pub struct Monitor<W: Write> {
    root: PathBuf,
    out: W,
    rows: u64,
    clock_ticks: u64,
    page_size: u64,
}

impl Monitor<io::Stdout> {
    pub fn stdout() -> Self {
        Self::with_root("/proc", io::stdout())
    }
}

impl<W: Write> Monitor<W> {
    pub fn with_root(root: impl Into<PathBuf>, out: W) -> Self {
        Self {
            root: root.into(),
            out,
            rows: 0,
            clock_ticks: sys::clock_ticks_per_second(),
            page_size: sys::page_size(),
        }
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn sample(&self, pid: Pid) -> Option<ProcStats> {
        let dir = self.root.join(pid.to_string());
        let cmd = parse_cmdline(&fs::read(dir.join("cmdline")).ok()?);
        let (syscr, syscw) = parse_io(&fs::read_to_string(dir.join("io")).ok()?)?;
        let stat = parse_stat(&fs::read_to_string(dir.join("stat")).ok()?)?;
        Some(ProcStats { pid, cmd, syscr, syscw, stat })
    }

    /// `SIGSTOP` is asynchronous, so the target may still show `R` for a
    /// moment. Polls its state until it settles or `STOP_SETTLE` passes.
    pub fn wait_stopped(&self, pid: Pid) -> bool {
        let path = self.root.join(pid.to_string()).join("stat");
        let started = Instant::now();
        loop {
            let state = match fs::read_to_string(&path).ok().as_deref().and_then(parse_stat) {
                Some(stat) => stat.state,
                None => return false,
            };
            if is_settled(&state) {
                return true;
            }
            if started.elapsed() >= STOP_SETTLE {
                trace!("pid {} still in state {} after {:?}", pid, state, STOP_SETTLE);
                return false;
            }
            thread::sleep(SETTLE_POLL);
        }
    }

    fn total_jiffies(&self) -> Option<u64> {
        parse_total_jiffies(&fs::read_to_string(self.root.join("stat")).ok()?)
    }

    pub fn format_row(&self, stats: &ProcStats) -> String {
        let secs = |ticks: u64| compact_count(ticks / self.clock_ticks);
        format!(
            "{:<8}{:<10}{:<10}{:<6}{:<8}{:<9}{:<8}{:<8}{:<8}{}",
            stats.pid,
            compact_count(stats.syscr),
            compact_count(stats.syscw),
            stats.stat.state,
            compact_count(stats.stat.major_faults),
            secs(stats.stat.utime),
            secs(stats.stat.stime),
            compact_bytes(stats.stat.vsize),
            compact_bytes(stats.stat.rss_pages.saturating_mul(self.page_size)),
            stats.cmd,
        )
    }

    /// Writes one row, preceded by the header every `HEADER_EVERY` rows.
    pub fn report(&mut self, stats: &ProcStats) -> io::Result<()> {
        if self.rows % HEADER_EVERY == 0 {
            writeln!(self.out, "{}", HEADER)?;
        }
        let row = self.format_row(stats);
        writeln!(self.out, "{}", row)?;
        self.rows += 1;
        self.out.flush()
    }

    /// Samples a freshly stopped entry, updates its utilisation counters and
    /// prints its row. Returns false when the sample was skipped.
    pub fn observe(&mut self, entry: &mut ProcessEntry) -> bool {
        if let Some(pid) = entry.pid() {
            self.wait_stopped(pid);
        }
        let stats = match entry.pid().and_then(|pid| self.sample(pid)) {
            Some(stats) => stats,
            None => {
                trace!("no /proc sample for {:?}", entry.pid());
                return false;
            }
        };
        if let Some(jiffies) = self.total_jiffies() {
            entry.record_sample(jiffies, stats.stat.utime + stats.stat.stime);
            debug!("pid {} cpu {}%", stats.pid, entry.cpu_percent());
        }
        if let Err(e) = self.report(&stats) {
            debug!("monitor output failed: {}", e);
            return false;
        }
        true
    }
}
