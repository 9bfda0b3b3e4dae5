use std::collections::HashMap;
use std::time::Instant;

/// Cross-cutting logger for session events.
///
/// Decouples the session loop from specific output mechanisms so callers
/// can observe per-stage behavior without changing the orchestration code.
pub trait SessionLogger: Send {
    /// Record one acquired frame and whether the throttle admitted it.
    fn frame(&mut self, index: usize, admitted: bool);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. detection count).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events. Used by tests.
pub struct NullSessionLogger;

impl SessionLogger for NullSessionLogger {
    fn frame(&mut self, _index: usize, _admitted: bool) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running count and sum of a timing or metric series.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningStat {
    pub count: usize,
    pub total: f64,
}

impl RunningStat {
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// CLI-oriented logger that tracks per-stage timing and metrics and prints
/// a throughput report when the session closes.
///
/// Only running totals are kept, so memory stays flat for sessions of any
/// length. The clock starts at the first acquired frame. Progress output is
/// throttled to every `throttle_frames` frames.
pub struct StdoutSessionLogger {
    throttle_frames: usize,
    timings: HashMap<String, RunningStat>,
    metrics: HashMap<String, RunningStat>,
    start_time: Option<Instant>,
    acquired: usize,
    admitted: usize,
}

impl StdoutSessionLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: None,
            acquired: 0,
            admitted: 0,
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map_or(0.0, |start| start.elapsed().as_secs_f64())
    }

    /// Returns the formatted summary string, or `None` if no frame was seen.
    pub fn summary_string(&self) -> Option<String> {
        if self.acquired == 0 {
            return None;
        }

        let elapsed_ms = self.elapsed_secs() * 1000.0;
        let mut lines = vec![format!(
            "Session summary ({} frames acquired, {} processed, {:.1}s total):",
            self.acquired,
            self.admitted,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, stat) in stages {
            let total_ms = stat.total;
            let avg_ms = stat.average();
            let pct = if elapsed_ms > 0.0 {
                total_ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({pct:4.1}%)"
            ));
        }

        let mut metrics: Vec<_> = self.metrics.iter().collect();
        metrics.sort_by(|a, b| a.0.cmp(b.0));
        for (name, stat) in metrics {
            lines.push(format!("  {name}: avg {:.1}", stat.average()));
        }

        if elapsed_ms > 0.0 {
            let seconds = elapsed_ms / 1000.0;
            lines.push(format!(
                "Processed {} frames in {seconds:.2} seconds. Avg FPS: {:.2}",
                self.acquired,
                self.acquired as f64 / seconds
            ));
        }

        Some(lines.join("\n"))
    }

    pub fn timing_stat(&self, stage: &str) -> Option<RunningStat> {
        self.timings.get(stage).copied()
    }

    pub fn metric_stat(&self, name: &str) -> Option<RunningStat> {
        self.metrics.get(name).copied()
    }
}

impl Default for StdoutSessionLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl SessionLogger for StdoutSessionLogger {
    fn frame(&mut self, index: usize, admitted: bool) {
        self.start_time.get_or_insert_with(Instant::now);
        self.acquired += 1;
        if admitted {
            self.admitted += 1;
        }
        if (index + 1) % self.throttle_frames == 0 {
            let elapsed = self.elapsed_secs();
            if elapsed > 0.0 {
                log::debug!(
                    "{} frames acquired ({:.1} fps)",
                    self.acquired,
                    self.acquired as f64 / elapsed
                );
            }
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .record(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            println!("{text}");
        }
    }
}
