//! Progress events and their delivery.
//!
//! Downloads report through one event type, [`ProgressEvent`]. A sink is
//! anything implementing [`DownloadProgress`]: a closure taking the event,
//! [`NoProgress`], or [`LineProgress`] which hands preformatted lines to a
//! closure. Sinks run on the download path; a panicking sink is logged and
//! otherwise ignored.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use crate::format::format_line;
use crate::stats::FileStats;

/// Source tag carried by every event this crate emits.
pub const SOURCE: &str = "mega";

/// Lifecycle stage of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Emitted once before the first byte.
    Starting,
    /// Periodic, throttled.
    Downloading,
    /// Emitted once after the last byte was written.
    Done,
    /// Emitted once when the transfer fails.
    Error,
}

impl Stage {
    /// Lower-case name of the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Downloading => "downloading",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// `true` for [`Stage::Done`] and [`Stage::Error`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Which downloader produced the event.
    pub source: String,
    /// Lifecycle stage.
    pub stage: Stage,
    /// Bytes written so far.
    pub downloaded: u64,
    /// Declared size, if known.
    pub total: Option<u64>,
    /// `downloaded / total` as a percentage; `None` when the total is unknown.
    pub percent: Option<f64>,
    /// Bytes per second over the last reporting interval.
    pub speed: Option<f64>,
    /// Estimated time remaining.
    pub eta: Option<Duration>,
    /// File name or relative path.
    pub name: String,
    /// One-based position and count within a batch.
    pub item: Option<(usize, usize)>,
    /// Free-text detail, e.g. an error message.
    pub message: Option<String>,
}

/// Receives progress events.
///
/// Implemented for any `Fn(&ProgressEvent) + Send + Sync`.
pub trait DownloadProgress: Send + Sync {
    /// Called for every event, synchronously, on the download path.
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> DownloadProgress for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event);
    }
}

/// A progress sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Feeds [`format_line`] output to a line consumer.
#[derive(Debug, Clone, Copy)]
pub struct LineProgress<F>(pub F);

impl<F> DownloadProgress for LineProgress<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        (self.0)(&format_line(event));
    }
}

/// Delivers an event, swallowing a panic from the sink.
pub fn deliver(sink: &dyn DownloadProgress, event: &ProgressEvent) {
    if catch_unwind(AssertUnwindSafe(|| sink.on_event(event))).is_err() {
        log::warn!("progress sink panicked on {} event; ignored", event.stage);
    }
}

/// Per-file progress state: throttling, speed and ETA.
///
/// One meter belongs to one transfer. It emits `starting` on
/// [`TransferMeter::start`], throttled `downloading` events from
/// [`TransferMeter::advance`], and exactly one of `done`
/// ([`TransferMeter::finish`]) or `error` ([`TransferMeter::fail`]).
pub struct TransferMeter<'a> {
    sink: &'a dyn DownloadProgress,
    name: String,
    item: Option<(usize, usize)>,
    total: Option<u64>,
    interval: Duration,
    started: Instant,
    last_emit: Instant,
    last_bytes: u64,
    downloaded: u64,
    peak_speed: f64,
}

impl<'a> TransferMeter<'a> {
    /// Creates a meter. A declared size of zero counts as unknown.
    #[must_use]
    pub fn new(
        sink: &'a dyn DownloadProgress,
        name: impl Into<String>,
        total: Option<u64>,
        interval: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            sink,
            name: name.into(),
            item: None,
            total: total.filter(|&t| t > 0),
            interval,
            started: now,
            last_emit: now,
            last_bytes: 0,
            downloaded: 0,
            peak_speed: 0.0,
        }
    }

    /// Tags events with a one-based batch position.
    #[must_use]
    pub const fn with_item(mut self, index: usize, count: usize) -> Self {
        self.item = Some((index, count));
        self
    }

    /// Bytes counted so far.
    #[must_use]
    pub const fn downloaded(&self) -> u64 {
        self.downloaded
    }

    /// Emits `starting` and resets the clocks.
    pub fn start(&mut self) {
        let now = Instant::now();
        self.started = now;
        self.last_emit = now;
        self.emit(Stage::Starting, None, None, None);
    }

    /// Counts `bytes` more and emits `downloading` if the interval has
    /// elapsed since the last emitted event.
    pub fn advance(&mut self, bytes: u64) {
        self.downloaded += bytes;
        let now = Instant::now();
        let window = now.duration_since(self.last_emit);
        if window < self.interval {
            return;
        }

        let speed = rate(self.downloaded - self.last_bytes, window);
        if let Some(s) = speed {
            self.peak_speed = self.peak_speed.max(s);
        }
        let eta = match (speed, self.total) {
            (Some(s), Some(total)) if s > 0.0 => {
                #[allow(clippy::cast_precision_loss)]
                let remaining = total.saturating_sub(self.downloaded) as f64;
                Some(Duration::from_secs_f64(remaining / s))
            }
            _ => None,
        };

        self.last_emit = now;
        self.last_bytes = self.downloaded;
        self.emit(Stage::Downloading, speed, eta, None);
    }

    /// Emits `done` and returns the file's statistics.
    pub fn finish(self) -> FileStats {
        let elapsed = self.started.elapsed();
        let average = rate(self.downloaded, elapsed);
        self.emit(Stage::Done, average, None, None);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let peak = self.peak_speed as u64;
        FileStats::new(self.downloaded, elapsed, peak)
    }

    /// Emits `error` carrying `message`.
    pub fn fail(self, message: &str) {
        self.emit(Stage::Error, None, None, Some(message.to_string()));
    }

    fn emit(&self, stage: Stage, speed: Option<f64>, eta: Option<Duration>, message: Option<String>) {
        #[allow(clippy::cast_precision_loss)]
        let percent = self
            .total
            .map(|total| self.downloaded as f64 / total as f64 * 100.0);
        let event = ProgressEvent {
            source: SOURCE.to_string(),
            stage,
            downloaded: self.downloaded,
            total: self.total,
            percent,
            speed,
            eta,
            name: self.name.clone(),
            item: self.item,
            message,
        };
        deliver(self.sink, &event);
    }
}

#[allow(clippy::cast_precision_loss)]
fn rate(bytes: u64, window: Duration) -> Option<f64> {
    let secs = window.as_secs_f64();
    (secs > 0.0).then(|| bytes as f64 / secs)
}
