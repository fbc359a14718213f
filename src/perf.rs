//! Lightweight performance aggregation for encode runs.
//!
//! Timings and counters are collected process-wide and printed as an
//! end-of-run summary when `--verbose` is passed.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Duration,
    Counter,
}

/// Named metrics tracked by the perf collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Metric {
    ModelLoad,
    AudioDecode,
    AudioResample,
    AudioLoudness,
    EncoderForward,
    QuantizerForward,
    DacFileWrite,
    FilesEncoded,
    FramesEncoded,
    SamplesEncoded,
}

impl Metric {
    const COUNT: usize = 10;
    const ALL: [Metric; Metric::COUNT] = [
        Metric::ModelLoad,
        Metric::AudioDecode,
        Metric::AudioResample,
        Metric::AudioLoudness,
        Metric::EncoderForward,
        Metric::QuantizerForward,
        Metric::DacFileWrite,
        Metric::FilesEncoded,
        Metric::FramesEncoded,
        Metric::SamplesEncoded,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            Metric::ModelLoad => "codec.load",
            Metric::AudioDecode => "audio.decode",
            Metric::AudioResample => "audio.resample",
            Metric::AudioLoudness => "audio.loudness",
            Metric::EncoderForward => "codec.encoder",
            Metric::QuantizerForward => "codec.quantizer",
            Metric::DacFileWrite => "dac_file.write",
            Metric::FilesEncoded => "codec.files",
            Metric::FramesEncoded => "codec.frames",
            Metric::SamplesEncoded => "codec.samples",
        }
    }

    fn kind(self) -> MetricKind {
        match self {
            Metric::FilesEncoded | Metric::FramesEncoded | Metric::SamplesEncoded => {
                MetricKind::Counter
            }
            _ => MetricKind::Duration,
        }
    }
}

struct PerfCollector {
    start: Instant,
    totals_us: [AtomicU64; Metric::COUNT],
    counts: [AtomicU64; Metric::COUNT],
}

impl PerfCollector {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            totals_us: std::array::from_fn(|_| AtomicU64::new(0)),
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    fn add_duration(&self, metric: Metric, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        let index = metric.index();
        self.totals_us[index].fetch_add(micros, Ordering::Relaxed);
        self.counts[index].fetch_add(1, Ordering::Relaxed);
    }

    fn add_count(&self, metric: Metric, delta: u64) {
        self.counts[metric.index()].fetch_add(delta, Ordering::Relaxed);
    }
}

static COLLECTOR: OnceLock<PerfCollector> = OnceLock::new();

fn collector() -> &'static PerfCollector {
    COLLECTOR.get_or_init(PerfCollector::new)
}

/// A RAII timer that records its duration when dropped.
pub struct PerfSpan {
    metric: Metric,
    start: Instant,
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        collector().add_duration(self.metric, self.start.elapsed());
    }
}

/// Begin a named timing span.
pub fn span(metric: Metric) -> PerfSpan {
    PerfSpan {
        metric,
        start: Instant::now(),
    }
}

/// Record a counter delta for a named metric.
pub fn add_count(metric: Metric, delta: u64) {
    collector().add_count(metric, delta);
}

/// Format a report of all collected metrics.
pub fn report() -> String {
    let collector = collector();
    let mut durations = Vec::new();
    let mut counters = Vec::new();
    for metric in Metric::ALL {
        let total_us = collector.totals_us[metric.index()].load(Ordering::Relaxed);
        let count = collector.counts[metric.index()].load(Ordering::Relaxed);
        match metric.kind() {
            MetricKind::Duration if count > 0 => durations.push((metric, total_us, count)),
            MetricKind::Counter if count > 0 => counters.push((metric, count)),
            _ => {}
        }
    }
    durations.sort_by(|a, b| b.1.cmp(&a.1));

    let mut output = String::new();
    let _ = writeln!(
        &mut output,
        "Performance summary (uptime: {:.3}s)",
        collector.start.elapsed().as_secs_f64()
    );
    if durations.is_empty() && counters.is_empty() {
        let _ = writeln!(&mut output, "No performance data recorded.");
        return output;
    }
    if !durations.is_empty() {
        let _ = writeln!(&mut output, "Durations:");
        let _ = writeln!(
            &mut output,
            "  {:<24} {:>10} {:>8} {:>10}",
            "name", "total", "count", "avg"
        );
        for (metric, total_us, count) in durations {
            let avg_ms = total_us as f64 / count as f64 / 1000.0;
            let _ = writeln!(
                &mut output,
                "  {:<24} {:>10.3}s {:>8} {:>10.3}ms",
                metric.name(),
                total_us as f64 / 1_000_000.0,
                count,
                avg_ms
            );
        }
    }
    if !counters.is_empty() {
        let _ = writeln!(&mut output, "Counters:");
        for (metric, value) in counters {
            let _ = writeln!(&mut output, "  {:<24} {}", metric.name(), value);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::{add_count, report, span, Metric};

    #[test]
    fn report_lists_recorded_metrics() {
        {
            let _span = span(Metric::DacFileWrite);
        }
        add_count(Metric::FilesEncoded, 2);
        let text = report();
        assert!(text.contains("dac_file.write"));
        assert!(text.contains("codec.files"));
    }

    #[test]
    fn metric_table_covers_every_variant() {
        for (idx, metric) in Metric::ALL.iter().enumerate() {
            assert_eq!(metric.index(), idx);
        }
    }
}
