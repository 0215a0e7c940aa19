//! Rate- and backpressure-gated frame emission.

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, interval};
use tracing::warn;

use crate::inflight::{InFlightSlot, SlotAcquire};

/// Extension trait to add pacing to any Stream.
pub trait PacedExt: Stream {
    /// Gate the stream on a fixed interval and the in-flight slot.
    ///
    /// Uses "latest-wins" semantics - items arriving between ticks replace
    /// each other, so at most one is held and nothing queues. A tick where
    /// the slot is busy emits nothing; emission acquires the slot and arms
    /// its watchdog, so the caller owns the slot for each emitted item.
    fn paced(self, tick: Duration, slot: Arc<InFlightSlot>, watchdog: Duration) -> Paced<Self>
    where
        Self: Sized,
    {
        Paced::new(self, tick, slot, watchdog)
    }
}

impl<T: Stream> PacedExt for T {}

pin_project! {
    /// A stream combinator applying single-slot backpressure at a bounded rate.
    pub struct Paced<S: Stream> {
        #[pin]
        stream: S,
        interval: Interval,
        slot: Arc<InFlightSlot>,
        watchdog: Duration,
        pending: Option<S::Item>,
        done: bool,
    }
}

impl<S: Stream> Paced<S> {
    /// Create a new paced stream.
    pub fn new(stream: S, tick: Duration, slot: Arc<InFlightSlot>, watchdog: Duration) -> Self {
        let mut interval = interval(tick);
        // Set missed tick behavior to delay (don't burst)
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        Self { stream, interval, slot, watchdog, pending: None, done: false }
    }
}

impl<S: Stream> Stream for Paced<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            // Drain all available items, keeping only the latest.
            while !*this.done {
                match this.stream.as_mut().poll_next(cx) {
                    Poll::Ready(Some(item)) => *this.pending = Some(item),
                    Poll::Ready(None) => *this.done = true,
                    Poll::Pending => break,
                }
            }

            if *this.done && this.pending.is_none() {
                return Poll::Ready(None);
            }

            // Wait for the interval tick.
            ready!(this.interval.poll_tick(cx));

            if this.pending.is_none() {
                // Nothing captured since the last emission; next tick.
                continue;
            }

            match this.slot.try_begin(*this.watchdog) {
                SlotAcquire::Acquired => return Poll::Ready(this.pending.take()),
                SlotAcquire::Reclaimed => {
                    warn!("Frame watchdog fired; reclaiming in-flight slot");
                    return Poll::Ready(this.pending.take());
                }
                SlotAcquire::Busy => {
                    // A frame is still awaiting its response: skip this tick.
                    // The held frame stays pending and may be replaced by a
                    // newer one before the next tick.
                    continue;
                }
            }
        }
    }
}
