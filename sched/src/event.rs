//! Event sources feeding the control loop
//!
//! A ticker thread and a reaper thread post into one channel. The control
//! loop is the only consumer, so timer and termination handling never overlap.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::process::{ExitStatus, Pid};
use crate::sys;

/// A reaped child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exit {
    pub pid: Pid,
    pub status: ExitStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One scheduler timer period elapsed
    Tick,
    /// Children that terminated since the last sweep
    Exited(Vec<Exit>),
}

/// Running producers. Dropping this stops and joins them.
pub struct EventSources {
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl EventSources {
    /// Starts the ticker and the reaper for `pids`. `SIGCHLD` must already
    /// be blocked on the calling thread (see `launch::launch_all`).
    pub fn spawn(period: Duration, pids: Vec<Pid>) -> io::Result<(Self, Receiver<Event>)> {
        let (tx, rx) = mpsc::channel();
        let mut sources = Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            threads: Vec::with_capacity(2),
        };

        let ticker = Ticker {
            period,
            tx: tx.clone(),
            shutdown: Arc::clone(&sources.shutdown),
        };
        sources.threads.push(
            thread::Builder::new()
                .name("rrsched-ticker".into())
                .spawn(move || ticker.run())?,
        );

        let reaper = Reaper {
            live: pids,
            poll: period,
            tx,
            shutdown: Arc::clone(&sources.shutdown),
        };
        sources.threads.push(
            thread::Builder::new()
                .name("rrsched-reaper".into())
                .spawn(move || reaper.run())?,
        );

        Ok((sources, rx))
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("event source thread panicked");
            }
        }
    }
}

impl Drop for EventSources {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Ticker {
    period: Duration,
    tx: Sender<Event>,
    shutdown: Arc<AtomicBool>,
}

impl Ticker {
    fn run(self) {
        let mut deadline = Instant::now();
        loop {
            deadline = next_deadline(deadline, self.period, Instant::now());
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
            if self.shutdown.load(Ordering::SeqCst) || self.tx.send(Event::Tick).is_err() {
                break;
            }
        }
        trace!("ticker stopped");
    }
}

/// One period after `prev`. A ticker more than a period behind restarts from
/// `now`, so missed periods collapse into one tick instead of a burst.
fn next_deadline(prev: Instant, period: Duration, now: Instant) -> Instant {
    let next = prev + period;
    if next + period <= now {
        now
    } else {
        next
    }
}

struct Reaper {
    live: Vec<Pid>,
    poll: Duration,
    tx: Sender<Event>,
    shutdown: Arc<AtomicBool>,
}

impl Reaper {
    fn run(mut self) {
        let chld = sys::signal_set(&[libc::SIGCHLD]);
        while !self.live.is_empty() && !self.shutdown.load(Ordering::SeqCst) {
            // The timeout bounds how long a missed SIGCHLD can delay a sweep
            sys::timed_wait(&chld, self.poll);
            let batch = self.sweep();
            if !batch.is_empty() && self.tx.send(Event::Exited(batch)).is_err() {
                break;
            }
        }
        trace!("reaper stopped");
    }

    /// Collects every managed child that has terminated.
    fn sweep(&mut self) -> Vec<Exit> {
        let mut batch = Vec::new();
        self.live.retain(|&pid| match sys::try_wait(pid) {
            Ok(None) => true,
            Ok(Some(status)) => {
                batch.push(Exit { pid, status });
                false
            }
            Err(e) => {
                debug!("waitpid {}: {}", pid, e);
                batch.push(Exit { pid, status: ExitStatus::Lost });
                false
            }
        });
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_posts_ticks_until_receiver_drops() {
        let (tx, rx) = mpsc::channel();
        let ticker = Ticker {
            period: Duration::from_millis(1),
            tx,
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        let handle = thread::spawn(move || ticker.run());
        for _ in 0..3 {
            assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(Event::Tick));
        }
        drop(rx);
        handle.join().unwrap();
    }

    #[test]
    fn test_deadlines_stay_on_the_period_grid() {
        let period = Duration::from_millis(20);
        let t0 = Instant::now();
        assert_eq!(next_deadline(t0, period, t0), t0 + period);
        // A slightly late wake-up keeps the grid
        assert_eq!(next_deadline(t0, period, t0 + Duration::from_millis(25)), t0 + period);
    }

    #[test]
    fn test_late_ticker_does_not_burst() {
        let period = Duration::from_millis(20);
        let t0 = Instant::now();
        let now = t0 + Duration::from_millis(200);
        let first = next_deadline(t0, period, now);
        assert_eq!(first, now);
        // After the coalesced tick the next one is a full period away
        assert_eq!(next_deadline(first, period, now), now + period);
    }

    #[test]
    fn test_ticker_honours_shutdown_flag() {
        let (tx, rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(true));
        let ticker = Ticker {
            period: Duration::from_millis(1),
            tx,
            shutdown,
        };
        thread::spawn(move || ticker.run()).join().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sweep_reports_unknown_children_as_lost() {
        let (tx, _rx) = mpsc::channel();
        let mut reaper = Reaper {
            live: vec![Pid::from_raw(libc::pid_t::MAX)],
            poll: Duration::from_millis(1),
            tx,
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        let batch = reaper.sweep();
        assert_eq!(batch, vec![Exit { pid: Pid::from_raw(libc::pid_t::MAX), status: ExitStatus::Lost }]);
        assert!(reaper.live.is_empty());
    }
}
