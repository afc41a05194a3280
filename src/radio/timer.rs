//! # Timing Engine
//!
//! One-shot, individually cancellable timers standing in for the hardware
//! timeout peripherals of the real driver (TX timeout, RX timeout, sync-word
//! timeout, TX done, plus the simulated CAD window and FHSS hop tick). Any
//! number of timers may be outstanding at once; expirations fire in deadline
//! order with FIFO tie-breaking, each exactly once unless cancelled first.
//! Cancelling a timer that already fired is a no-op.
//!
//! The engine runs as a single tokio task multiplexing `sleep_until` over a
//! binary heap; commands arrive on an unbounded channel so scheduling and
//! cancellation never block the caller. Rescheduling a timer kind supersedes
//! the previous instance (stale heap entries are dropped lazily via a
//! sequence check).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::error::RadioSimError;

/// Identity of a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Transmission watchdog.
    TxTimeout,
    /// Single-shot reception window.
    RxTimeout,
    /// FSK sync-word acquisition window.
    SyncTimeout,
    /// Simulated end of transmission (airtime elapsed).
    TxDone,
    /// Simulated CAD listen window.
    CadDone,
    /// Intra-packet frequency hop tick.
    FhssHop,
}

/// Notification passed to the engine's fire callback.
#[derive(Debug, Clone, Copy)]
pub struct TimerFired {
    pub kind: TimerKind,
    /// State-machine generation captured when the timer was armed; lets the
    /// handler discard expirations that raced a preempting mode change.
    pub generation: u64,
}

enum TimerCmd {
    Schedule {
        kind: TimerKind,
        delay: Duration,
        generation: u64,
    },
    Cancel {
        kind: TimerKind,
    },
    CancelAll,
}

struct Entry {
    deadline: Instant,
    seq: u64,
    kind: TimerKind,
    generation: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    // BinaryHeap is a max-heap; reverse so the earliest deadline pops first,
    // with the scheduling sequence breaking ties FIFO.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Handle to the timing engine task.
///
/// Cloning shares the underlying task; dropping all handles shuts it down.
#[derive(Clone)]
pub struct TimerEngine {
    cmd_tx: mpsc::UnboundedSender<TimerCmd>,
}

impl TimerEngine {
    /// Spawns the engine task. Must be called within a tokio runtime.
    ///
    /// `on_fire` is invoked from the engine task once per expiration, in
    /// deadline order.
    pub fn spawn<F>(on_fire: F) -> Self
    where
        F: FnMut(TimerFired) + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_engine(cmd_rx, on_fire));
        Self { cmd_tx }
    }

    /// Arms (or re-arms) a timer of the given kind.
    pub fn schedule(
        &self,
        kind: TimerKind,
        delay: Duration,
        generation: u64,
    ) -> Result<(), RadioSimError> {
        self.cmd_tx
            .send(TimerCmd::Schedule {
                kind,
                delay,
                generation,
            })
            .map_err(|_| RadioSimError::TimerEngineStopped)
    }

    /// Cancels a pending timer. No-op if it already fired or was never armed.
    pub fn cancel(&self, kind: TimerKind) -> Result<(), RadioSimError> {
        self.cmd_tx
            .send(TimerCmd::Cancel { kind })
            .map_err(|_| RadioSimError::TimerEngineStopped)
    }

    /// Cancels every pending timer.
    pub fn cancel_all(&self) -> Result<(), RadioSimError> {
        self.cmd_tx
            .send(TimerCmd::CancelAll)
            .map_err(|_| RadioSimError::TimerEngineStopped)
    }
}

async fn run_engine<F>(mut cmd_rx: mpsc::UnboundedReceiver<TimerCmd>, mut on_fire: F)
where
    F: FnMut(TimerFired) + Send + 'static,
{
    let mut heap: BinaryHeap<Entry> = BinaryHeap::new();
    // kind -> sequence number of its live instance; heap entries that lost
    // their slot (cancelled or superseded) are skipped when popped.
    let mut active: HashMap<TimerKind, u64> = HashMap::new();
    let mut next_seq: u64 = 0;

    loop {
        let next_deadline = heap.peek().map(|entry| entry.deadline);

        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None => break,
                Some(TimerCmd::Schedule { kind, delay, generation }) => {
                    next_seq += 1;
                    active.insert(kind, next_seq);
                    heap.push(Entry {
                        deadline: Instant::now() + delay,
                        seq: next_seq,
                        kind,
                        generation,
                    });
                    log::debug!("timer {kind:?} armed for {delay:?}");
                }
                Some(TimerCmd::Cancel { kind }) => {
                    if active.remove(&kind).is_some() {
                        log::debug!("timer {kind:?} cancelled");
                    }
                }
                Some(TimerCmd::CancelAll) => {
                    active.clear();
                }
            },
            _ = wait_until(next_deadline) => {
                let now = Instant::now();
                while let Some(entry) = heap.peek() {
                    if entry.deadline > now {
                        break;
                    }
                    let entry = heap.pop().expect("peeked entry");
                    if active.get(&entry.kind) == Some(&entry.seq) {
                        active.remove(&entry.kind);
                        log::debug!("timer {:?} fired", entry.kind);
                        on_fire(TimerFired {
                            kind: entry.kind,
                            generation: entry.generation,
                        });
                    }
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
