// src/detection/collector.rs
//
// Owns one bounded collection window: the watch subscription on the
// positioning source, the progress ticker, and the sample buffer.
// Fixes are quality-gated at ingestion so later stages only ever see
// samples worth considering.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tracing::debug;

use crate::positioning::{
    CapabilityError, PositionError, PositionEvent, PositionSource, WatchId, WatchOptions,
};
use crate::types::{CollectorConfig, Sample};

#[derive(Debug)]
pub enum CollectorEvent {
    /// A fix passed the accuracy gate and was buffered.
    Accepted,
    /// A fix was dropped at ingestion.
    Rejected,
    /// Progress tick; percent of the window elapsed so far.
    Tick { progress_percent: u32 },
    /// Elapsed time reached the configured window duration.
    WindowElapsed,
    /// The source pushed a failure; the caller decides what to do,
    /// but must still call `stop`.
    SourceError(PositionError),
    /// The source stopped delivering events (channel closed).
    Closed,
    /// `next_event` was called without an active window.
    Inactive,
}

pub struct SampleCollector<S: PositionSource> {
    source: S,
    config: CollectorConfig,
    tick: Duration,

    watch: Option<WatchId>,
    events: Option<mpsc::UnboundedReceiver<PositionEvent>>,
    ticker: Option<Interval>,

    samples: Vec<Sample>,
    rejected: u64,
    elapsed_ticks: u32,
    window: Duration,
}

impl<S: PositionSource> SampleCollector<S> {
    pub fn new(source: S, config: CollectorConfig, tick: Duration) -> Self {
        Self {
            source,
            config,
            tick,
            watch: None,
            events: None,
            ticker: None,
            samples: Vec::new(),
            rejected: 0,
            elapsed_ticks: 0,
            window: Duration::ZERO,
        }
    }

    /// Open the watch and arm the ticker for one window. A prior window,
    /// if any, is torn down first; the buffer always starts empty. At
    /// most one window is active per collector.
    pub fn start(
        &mut self,
        window: Duration,
        options: WatchOptions,
    ) -> Result<(), CapabilityError> {
        self.release();
        self.samples.clear();
        self.rejected = 0;
        self.elapsed_ticks = 0;
        self.window = window;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.source.watch(options, tx)?;
        self.watch = Some(id);
        self.events = Some(rx);
        // First tick one full period in, not immediately.
        self.ticker = Some(tokio::time::interval_at(Instant::now() + self.tick, self.tick));
        Ok(())
    }

    /// Wait for the next thing to happen in this window: a fix, a tick,
    /// or a source failure. Fixes and ticks interleave in whatever order
    /// the runtime delivers them.
    pub async fn next_event(&mut self) -> CollectorEvent {
        // Resolve the race first, then mutate; the select borrows the
        // ticker and the receiver for its whole duration.
        enum Raced {
            Position(Option<PositionEvent>),
            Tick,
        }

        let raced = {
            let Some(ticker) = self.ticker.as_mut() else {
                return CollectorEvent::Inactive;
            };
            match self.events.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        ev = rx.recv() => Raced::Position(ev),
                        _ = ticker.tick() => Raced::Tick,
                    }
                }
                None => {
                    ticker.tick().await;
                    Raced::Tick
                }
            }
        };

        match raced {
            Raced::Position(Some(PositionEvent::Fix(fix))) => self.ingest(fix.into_sample()),
            Raced::Position(Some(PositionEvent::Error(err))) => CollectorEvent::SourceError(err),
            Raced::Position(None) => {
                // Producer gone; keep ticking toward window expiry.
                self.events = None;
                CollectorEvent::Closed
            }
            Raced::Tick => self.advance_tick(),
        }
    }

    fn ingest(&mut self, sample: Sample) -> CollectorEvent {
        if let Some(acc) = sample.accuracy_m {
            if acc > self.config.max_accuracy_m {
                self.rejected += 1;
                debug!(
                    "fix rejected: accuracy {:.0} m above {:.0} m gate",
                    acc, self.config.max_accuracy_m
                );
                return CollectorEvent::Rejected;
            }
        }
        self.samples.push(sample);
        CollectorEvent::Accepted
    }

    fn advance_tick(&mut self) -> CollectorEvent {
        self.elapsed_ticks += 1;
        if self.elapsed() >= self.window {
            CollectorEvent::WindowElapsed
        } else {
            CollectorEvent::Tick {
                progress_percent: self.progress_percent(),
            }
        }
    }

    fn elapsed(&self) -> Duration {
        self.tick * self.elapsed_ticks
    }

    pub fn progress_percent(&self) -> u32 {
        if self.window.is_zero() {
            return 0;
        }
        let pct = self.elapsed().as_secs_f64() / self.window.as_secs_f64() * 100.0;
        (pct.round() as u32).min(100)
    }

    /// Release the watch and the ticker. Safe to call on every exit
    /// path; releasing one resource but not the other would leak a live
    /// location subscription.
    pub fn stop(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.watch.take() {
            debug!("releasing watch #{}", id.0);
            self.source.clear(id);
        }
        self.ticker = None;
        self.events = None;
    }

    pub fn is_active(&self) -> bool {
        self.watch.is_some()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    /// Freeze the window: hand the buffer to finalization and leave the
    /// collector empty.
    pub fn take_samples(&mut self) -> Vec<Sample> {
        std::mem::take(&mut self.samples)
    }
}

impl<S: PositionSource> Drop for SampleCollector<S> {
    fn drop(&mut self) {
        self.release();
    }
}
