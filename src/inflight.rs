//! Single-slot backpressure for outbound frames.
//!
//! At most one frame may await a response at any time. The slot is busy
//! from the moment a frame is transmitted until the matching result arrives
//! or the watchdog deadline passes, at which point the next acquisition
//! force-reclaims it — liveness is preferred over exactly-once accounting,
//! and a late response simply updates state again.
//!
//! Only the frame pacer acquires the slot; the demultiplexer clears it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of a slot acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAcquire {
    /// Slot was free; a frame may be sent.
    Acquired,
    /// Slot was busy past its watchdog deadline and has been reclaimed;
    /// a frame may be sent, and the lost response is written off.
    Reclaimed,
    /// Slot is busy within its deadline; skip this tick.
    Busy,
}

impl SlotAcquire {
    /// Whether the caller now owns the slot.
    pub fn granted(self) -> bool {
        !matches!(self, SlotAcquire::Busy)
    }
}

/// The in-flight flag plus its watchdog deadline.
///
/// Deadlines are millisecond offsets from the slot's creation instant, so
/// the watchdog is a stored value superseded atomically rather than a timer
/// needing cancellation. Offsets come from the tokio clock so they follow
/// the same time base as every interval and sleep in the client.
#[derive(Debug)]
pub struct InFlightSlot {
    busy: AtomicBool,
    deadline_ms: AtomicU64,
    epoch: Instant,
    forced_reclaims: AtomicU64,
}

impl InFlightSlot {
    pub fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            deadline_ms: AtomicU64::new(0),
            epoch: Instant::now(),
            forced_reclaims: AtomicU64::new(0),
        }
    }

    /// Try to take the slot for a new send, arming the watchdog.
    pub fn try_begin(&self, watchdog: Duration) -> SlotAcquire {
        self.try_begin_at(self.now_ms(), watchdog)
    }

    fn try_begin_at(&self, now_ms: u64, watchdog: Duration) -> SlotAcquire {
        let deadline = now_ms.saturating_add(watchdog.as_millis() as u64);

        if self.busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok() {
            self.deadline_ms.store(deadline, Ordering::Release);
            return SlotAcquire::Acquired;
        }

        if now_ms >= self.deadline_ms.load(Ordering::Acquire) {
            // Watchdog fired: the previous response never arrived. The slot
            // stays busy but is reassigned to this send.
            self.forced_reclaims.fetch_add(1, Ordering::Relaxed);
            self.deadline_ms.store(deadline, Ordering::Release);
            return SlotAcquire::Reclaimed;
        }

        SlotAcquire::Busy
    }

    /// Release the slot. Idempotent; late responses may call this after a
    /// reclaim without harm.
    pub fn clear(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// Reset on reconnect; in-flight accounting does not survive a session.
    pub fn reset(&self) {
        self.clear();
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Number of watchdog expirations observed so far.
    pub fn forced_reclaims(&self) -> u64 {
        self.forced_reclaims.load(Ordering::Relaxed)
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

impl Default for InFlightSlot {
    fn default() -> Self {
        Self::new()
    }
}
