//! Transfer progress: a counting writer and a decoupled progress renderer.
//!
//! The copy loop and the renderer share exactly one value, an atomic byte
//! counter. The renderer samples it on its own tick and derives smoothed speed
//! and ETA figures from successive samples.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use humansize::{BINARY, format_size};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Smoothing window (in samples) for the speed estimate.
pub const SPEED_WINDOW: u32 = 60;
/// Smoothing window (in samples) for the ETA estimate.
pub const ETA_WINDOW: u32 = 90;

const SIZED_TEMPLATE: &str =
    "{prefix:>5} {bytes:>10} / {total_bytes:<10} {percent:>3}% [{bar:40.cyan/blue}] {msg}";
const UNSIZED_TEMPLATE: &str = "{prefix:>5} {spinner:.yellow} {bytes:>10} {msg}";

/// Wraps the destination of a copy and counts every byte it accepts.
///
/// Writes are forwarded as-is; the counter only advances by what the inner
/// writer reports as written.
#[derive(Debug)]
pub struct ProgressWriter<W> {
    inner: W,
    counter: Arc<AtomicU64>,
}

impl<W> ProgressWriter<W> {
    pub fn new(inner: W, counter: Arc<AtomicU64>) -> Self {
        Self { inner, counter }
    }

    pub fn bytes_written(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(written)) = &poll {
            this.counter.fetch_add(*written as u64, Ordering::Relaxed);
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Exponentially weighted moving average over roughly `window` samples.
#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    value: Option<f64>,
}

impl Ewma {
    pub fn new(window: u32) -> Self {
        Self {
            alpha: 2.0 / (f64::from(window.max(1)) + 1.0),
            value: None,
        }
    }

    pub fn add(&mut self, sample: f64) {
        self.value = Some(match self.value {
            Some(current) => current + self.alpha * (sample - current),
            None => sample,
        });
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// Point-in-time view of a transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    pub bytes: u64,
    /// Declared total, 0 when unknown.
    pub total: u64,
    /// Smoothed speed in bytes per second.
    pub speed: Option<f64>,
    /// Smoothed time remaining.
    pub eta: Option<Duration>,
}

impl TransferProgress {
    /// Completion percentage, `None` when the total is unknown.
    pub fn percentage(&self) -> Option<f64> {
        (self.total > 0).then(|| (self.bytes as f64 * 100.0 / self.total as f64).min(100.0))
    }

    /// The `ETA ... ] speed` suffix shown after the bar.
    pub fn message(&self) -> String {
        let speed = self
            .speed
            .map(|s| format!("{}/s", format_size(s.max(0.0) as u64, BINARY)))
            .unwrap_or_else(|| "-".to_string());
        match (self.total > 0, self.eta) {
            (true, Some(eta)) => format!("ETA {} ] {}", format_eta(eta), speed),
            (true, None) => format!("ETA - ] {speed}"),
            (false, _) => speed,
        }
    }
}

/// Turns successive counter samples into smoothed speed and ETA.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    total: u64,
    last_bytes: u64,
    last_elapsed: Duration,
    speed: Ewma,
    eta: Ewma,
}

impl RateEstimator {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            last_bytes: 0,
            last_elapsed: Duration::ZERO,
            speed: Ewma::new(SPEED_WINDOW),
            eta: Ewma::new(ETA_WINDOW),
        }
    }

    /// Record `bytes` transferred after `elapsed` since the transfer started.
    pub fn sample(&mut self, bytes: u64, elapsed: Duration) -> TransferProgress {
        let dt = elapsed.saturating_sub(self.last_elapsed).as_secs_f64();
        if dt > 0.0 {
            let delta = bytes.saturating_sub(self.last_bytes) as f64;
            self.speed.add(delta / dt);
            self.last_bytes = bytes;
            self.last_elapsed = elapsed;

            if self.total > 0
                && let Some(speed) = self.speed.value()
                && speed > 0.0
            {
                let remaining = self.total.saturating_sub(bytes) as f64;
                self.eta.add(remaining / speed);
            }
        }

        TransferProgress {
            bytes,
            total: self.total,
            speed: self.speed.value(),
            eta: self
                .eta
                .value()
                .filter(|secs| secs.is_finite())
                .map(|secs| Duration::from_secs_f64(secs.max(0.0))),
        }
    }
}

/// Go-style duration rendering: `1h2m3s`, `4m5s`, `6s`.
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

fn bar_for(total: u64) -> ProgressBar {
    if total > 0 {
        let style = ProgressStyle::with_template(SIZED_TEMPLATE)
            .map(|s| s.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(total).with_style(style)
    } else {
        let style = ProgressStyle::with_template(UNSIZED_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        ProgressBar::new_spinner().with_style(style)
    }
}

fn draw(bar: &ProgressBar, progress: &TransferProgress) {
    bar.set_position(progress.bytes);
    bar.set_message(progress.message());
}

/// Periodically redraws a progress bar from a shared byte counter.
///
/// Dropping the renderer stops the ticker and leaves the bar as it was.
pub struct ProgressRenderer {
    bar: ProgressBar,
    stop: CancellationToken,
    task: Option<JoinHandle<TransferProgress>>,
}

impl ProgressRenderer {
    /// Attach a bar for a transfer of `total` bytes (0 = unknown) to `multi`
    /// and start sampling `counter` every `tick`.
    pub fn start(
        multi: &MultiProgress,
        label: impl Into<String>,
        counter: Arc<AtomicU64>,
        total: u64,
        tick: Duration,
    ) -> Self {
        let bar = multi.add(bar_for(total));
        bar.set_prefix(label.into());
        let stop = CancellationToken::new();

        let task = {
            let bar = bar.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let mut estimator = RateEstimator::new(total);
                let mut interval = tokio::time::interval(tick.max(Duration::from_millis(10)));
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = interval.tick() => {}
                    }
                    let progress =
                        estimator.sample(counter.load(Ordering::Relaxed), started.elapsed());
                    draw(&bar, &progress);
                }

                let last = estimator.sample(counter.load(Ordering::Relaxed), started.elapsed());
                draw(&bar, &last);
                last
            })
        };

        Self {
            bar,
            stop,
            task: Some(task),
        }
    }

    /// Stop sampling, draw the final state and leave the bar on screen.
    pub async fn finish(mut self) -> Option<TransferProgress> {
        let last = self.stop_ticker().await;
        self.bar.finish();
        last
    }

    /// Stop sampling and remove the bar.
    pub async fn abandon(mut self) {
        self.stop_ticker().await;
        self.bar.finish_and_clear();
    }

    async fn stop_ticker(&mut self) -> Option<TransferProgress> {
        self.stop.cancel();
        match self.task.take() {
            Some(task) => task.await.ok(),
            None => None,
        }
    }
}

impl Drop for ProgressRenderer {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
