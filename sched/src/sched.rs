//! Round-robin preemption controller
//!
//! The scheduler owns the process table, the ready ring and the active count.
//! Timer ticks and termination batches are applied one at a time from a
//! single event channel, so the two handlers never interleave.
//!
//! Dead entries are not unlinked when their exit is observed. They stay in the
//! ring until the dispatch sweep reaches them, and are evicted there without
//! ever being signalled again.

use std::io::{self, Write};
use std::sync::mpsc::Receiver;

use log::{debug, info, trace, warn};

use crate::error::{SchedError, SchedResult};
use crate::event::{Event, Exit};
use crate::launch::{self, ProcessControl};
use crate::monitor::Monitor;
use crate::process::{ExitStatus, Pid, ProcessEntry, ProcessState};
use crate::queue::ReadyQueue;

/// Final record of one workload entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub pid: Pid,
    pub command: String,
    pub grants: u64,
    pub status: Option<ExitStatus>,
}

/// Per-entry outcome of a run, in workload order
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub processes: Vec<Finished>,
}

impl RunSummary {
    pub fn total_grants(&self) -> u64 {
        self.processes.iter().map(|p| p.grants).sum()
    }
}

pub struct Scheduler<C: ProcessControl, W: Write = io::Stdout> {
    // Slot-indexed; a slot is emptied when its entry is evicted from the ring
    table: Vec<Option<ProcessEntry>>,
    pids: Vec<Pid>,
    finished: Vec<Option<Finished>>,
    queue: ReadyQueue<usize>,
    active: usize,
    control: C,
    monitor: Option<Monitor<W>>,
}

impl<C: ProcessControl> Scheduler<C> {
    /// Takes ownership of launched entries. The ring starts in workload order.
    pub fn new(entries: Vec<ProcessEntry>, control: C) -> SchedResult<Self> {
        let mut pids = Vec::with_capacity(entries.len());
        for (slot, entry) in entries.iter().enumerate() {
            pids.push(entry.pid().ok_or(SchedError::NotLaunched(slot))?);
        }
        let active = entries.iter().filter(|e| !e.is_dead()).count();

        Ok(Self {
            queue: (0..entries.len()).collect(),
            finished: vec![None; entries.len()],
            table: entries.into_iter().map(Some).collect(),
            pids,
            active,
            control,
            monitor: None,
        })
    }
}

impl<C: ProcessControl, W: Write> Scheduler<C, W> {
    pub fn with_monitor<M: Write>(self, monitor: Monitor<M>) -> Scheduler<C, M> {
        Scheduler {
            table: self.table,
            pids: self.pids,
            finished: self.finished,
            queue: self.queue,
            active: self.active,
            control: self.control,
            monitor: Some(monitor),
        }
    }

    /// Processes not yet seen to terminate
    pub fn active(&self) -> usize {
        self.active
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Entry at the head of the ring, if it has not been evicted
    pub fn head(&self) -> Option<&ProcessEntry> {
        self.queue.head().and_then(|&slot| self.table[slot].as_ref())
    }

    /// Live (not yet evicted) entry owning `pid`
    pub fn entry(&self, pid: Pid) -> Option<&ProcessEntry> {
        let slot = self.pids.iter().position(|&p| p == pid)?;
        self.table[slot].as_ref()
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn monitor(&self) -> Option<&Monitor<W>> {
        self.monitor.as_ref()
    }

    /// First scheduling decision, made by hand before any tick arrives. The
    /// ring is turned so that the decision's own rotation lands on the first
    /// workload entry.
    pub fn prime(&mut self) {
        self.queue.rotate_by(self.queue.len().saturating_sub(1));
        self.on_tick();
    }

    /// Timer handler: charge one tick to the running head and, once its
    /// quantum is spent, stop it and hand the CPU to the next live entry.
    pub fn on_tick(&mut self) {
        let slot = match self.queue.head() {
            Some(&slot) => slot,
            None => return,
        };

        if let Some(entry) = self.table[slot].as_mut() {
            if entry.state() == ProcessState::Running {
                if entry.decrement_tick() > 0 {
                    return;
                }
                let pid = self.pids[slot];
                trace!("quantum expired, stopping {}", pid);
                if let Err(e) = self.control.stop(pid) {
                    debug!("stop {}: {}", pid, e);
                }
                if let Some(monitor) = self.monitor.as_mut() {
                    monitor.observe(entry);
                }
            }
        }

        self.queue.rotate();
        self.dispatch_head();
    }

    /// Starts or resumes the head, evicting dead entries on the way.
    fn dispatch_head(&mut self) {
        while let Some(&slot) = self.queue.head() {
            let pid = self.pids[slot];
            let entry = match self.table[slot].as_mut() {
                Some(entry) => entry,
                None => {
                    self.queue.remove_head();
                    continue;
                }
            };

            match entry.state() {
                ProcessState::Waiting => {
                    entry.mark_running();
                    entry.record_grant();
                    trace!("starting {}", pid);
                    if let Err(e) = self.control.start(pid) {
                        debug!("start {}: {}", pid, e);
                    }
                    return;
                }
                ProcessState::Running => {
                    entry.record_grant();
                    trace!("resuming {}", pid);
                    if let Err(e) = self.control.resume(pid) {
                        debug!("resume {}: {}", pid, e);
                    }
                    return;
                }
                ProcessState::Dead => {
                    self.queue.remove_head();
                    self.evict(slot);
                }
            }
        }
        trace!("ready queue empty");
    }

    fn evict(&mut self, slot: usize) {
        if let Some(entry) = self.table[slot].take() {
            debug!("evicting {} ({})", self.pids[slot], entry.command_line());
            let done = self.finish(slot, &entry);
            self.finished[slot] = Some(done);
        }
    }

    fn finish(&self, slot: usize, entry: &ProcessEntry) -> Finished {
        Finished {
            pid: self.pids[slot],
            command: entry.command_line(),
            grants: entry.grants(),
            status: entry.exit_status(),
        }
    }

    /// Termination handler: mark each reaped child dead. Ring removal is
    /// left to the dispatch sweep.
    pub fn on_exit(&mut self, batch: &[Exit]) {
        for exit in batch {
            let slot = match self.pids.iter().position(|&p| p == exit.pid) {
                Some(slot) => slot,
                None => {
                    debug!("ignoring exit of unmanaged pid {}", exit.pid);
                    continue;
                }
            };
            if let Some(entry) = self.table[slot].as_mut() {
                if !entry.is_dead() {
                    entry.mark_dead(exit.status);
                    self.active -= 1;
                    info!(
                        "pid {} finished ({}): {} [{} active]",
                        exit.pid,
                        exit.status,
                        entry.command_line(),
                        self.active
                    );
                }
            }
        }
    }

    /// Control loop: prime, then apply events until every child is dead.
    pub fn run(&mut self, events: &Receiver<Event>) -> SchedResult<RunSummary> {
        self.prime();
        while self.active > 0 {
            match events.recv() {
                Ok(Event::Tick) => self.on_tick(),
                Ok(Event::Exited(batch)) => self.on_exit(&batch),
                Err(_) => {
                    warn!("event channel closed with {} processes active", self.active);
                    self.abort();
                    return Err(SchedError::EventChannelClosed);
                }
            }
        }
        info!("all {} processes finished", self.table.len());
        Ok(self.summary())
    }

    /// Kills every child not yet seen to terminate.
    pub fn abort(&mut self) {
        let live = self.table.iter().flatten();
        launch::kill_all(live, &mut self.control);
    }

    pub fn summary(&self) -> RunSummary {
        let processes = self
            .finished
            .iter()
            .enumerate()
            .filter_map(|(slot, finished)| match (finished, &self.table[slot]) {
                (Some(done), _) => Some(done.clone()),
                (None, Some(entry)) => Some(self.finish(slot, entry)),
                (None, None) => None,
            })
            .collect();
        RunSummary { processes }
    }
}
