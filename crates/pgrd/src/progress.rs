//! Synchronous build progress notifications.

use std::time::{Duration, Instant};

use log::info;

/// Called from the build loop after each line; never affects control flow.
pub trait BuildObserver {
    fn on_start(&mut self, _total_lines: usize) {}

    fn on_line_complete(&mut self, _lines_done: usize, _total_lines: usize) {}

    fn on_finish(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BuildObserver for NoopObserver {}

/// Adapts a plain `FnMut(lines_done, total_lines)` into an observer.
pub struct ProgressFn<F>(pub F);

impl<F: FnMut(usize, usize)> BuildObserver for ProgressFn<F> {
    fn on_line_complete(&mut self, lines_done: usize, total_lines: usize) {
        (self.0)(lines_done, total_lines)
    }
}

/// Logs "N of M lines complete" every `every` lines, at most every 200 ms.
#[derive(Debug, Clone)]
pub struct LogProgress {
    label: &'static str,
    every: usize,
    start: Instant,
    last: Instant,
}

impl LogProgress {
    const MIN_INTERVAL: Duration = Duration::from_millis(200);

    pub fn new(label: &'static str, every: usize) -> Self {
        let now = Instant::now();
        Self {
            label,
            every: every.max(1),
            start: now,
            last: now,
        }
    }

    #[inline]
    fn should(&self, count: usize) -> bool {
        count % self.every == 0 && self.last.elapsed() >= Self::MIN_INTERVAL
    }

    #[inline]
    fn rate(&self, count: usize) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64().max(1e-9);
        count as f64 / elapsed
    }
}

impl BuildObserver for LogProgress {
    fn on_start(&mut self, total_lines: usize) {
        self.start = Instant::now();
        self.last = self.start;
        info!("{}: starting, {} lines", self.label, total_lines);
    }

    fn on_line_complete(&mut self, lines_done: usize, total_lines: usize) {
        if self.should(lines_done) {
            info!(
                "{}: {:>8} of {} lines complete, {:8.1} lines/s",
                self.label,
                lines_done,
                total_lines,
                self.rate(lines_done)
            );
            self.last = Instant::now();
        }
    }

    fn on_finish(&mut self) {
        info!(
            "{}: complete in {:.2}s",
            self.label,
            self.start.elapsed().as_secs_f64()
        );
    }
}
