use std::fmt::Display;
use std::path::Path;
use std::time::Duration;

/// Monitoring snapshot of the burst being acquired
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BurstStatus {
    pub run_id: u32,
    pub spill_id: u32,
    pub triggers_in_burst: u64,
    pub triggers_in_run: u64,
    pub triggers_per_file: u64,
    pub events_per_board: Vec<u64>,
}

impl BurstStatus {
    /// Fraction of the rotation threshold reached by this burst, clamped to 1
    pub fn progress(&self) -> f32 {
        if self.triggers_per_file == 0 {
            return 0.0;
        }
        (self.triggers_in_burst as f32 / self.triggers_per_file as f32).min(1.0)
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatistics {
    pub run_id: u32,
    pub events_per_board: Vec<u64>,
    pub files_written: u64,
    pub total_triggers: u64,
    pub elapsed: Duration,
    pub bytes_written: u64,
}

impl RunStatistics {
    pub fn total_events(&self) -> u64 {
        self.events_per_board.iter().sum()
    }

    /// Average trigger rate over the run, in Hz
    pub fn trigger_rate(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.total_triggers as f64 / seconds
        } else {
            0.0
        }
    }
}

impl Display for RunStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Run {} statistics:", self.run_id)?;
        for (board, events) in self.events_per_board.iter().enumerate() {
            writeln!(f, "  board {board}: {events} events")?;
        }
        writeln!(f, "  files written: {}", self.files_written)?;
        writeln!(
            f,
            "  triggers: {} ({:.2} Hz)",
            self.total_triggers,
            self.trigger_rate()
        )?;
        writeln!(
            f,
            "  data written: {}",
            human_bytes::human_bytes(self.bytes_written as f64)
        )?;
        write!(f, "  elapsed time: {:.1} s", self.elapsed.as_secs_f64())
    }
}

/// Receiver of the status produced by the acquisition.
///
/// Every method defaults to doing nothing, so a sink only implements what it displays.
pub trait StatusSink {
    /// Called regularly from the acquisition loop to handle pending requests
    fn service(&mut self) {}
    fn new_burst(&mut self, _run_id: u32, _spill_id: u32) {}
    fn trigger_rate(&mut self, _rate_hz: f64) {}
    fn monitor(&mut self, _status: &BurstStatus) {}
    fn output_file(&mut self, _path: &Path) {}
    fn run_statistics(&mut self, _stats: &RunStatistics) {}
    fn exception(&mut self, _message: &str) {}
}

/// A sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StatusSink for NullSink {}

/// Forward to the sink if there is one
impl<S: StatusSink> StatusSink for Option<S> {
    fn service(&mut self) {
        if let Some(sink) = self {
            sink.service();
        }
    }

    fn new_burst(&mut self, run_id: u32, spill_id: u32) {
        if let Some(sink) = self {
            sink.new_burst(run_id, spill_id);
        }
    }

    fn trigger_rate(&mut self, rate_hz: f64) {
        if let Some(sink) = self {
            sink.trigger_rate(rate_hz);
        }
    }

    fn monitor(&mut self, status: &BurstStatus) {
        if let Some(sink) = self {
            sink.monitor(status);
        }
    }

    fn output_file(&mut self, path: &Path) {
        if let Some(sink) = self {
            sink.output_file(path);
        }
    }

    fn run_statistics(&mut self, stats: &RunStatistics) {
        if let Some(sink) = self {
            sink.run_statistics(stats);
        }
    }

    fn exception(&mut self, message: &str) {
        if let Some(sink) = self {
            sink.exception(message);
        }
    }
}

/// Forward every status to both sinks
impl<A: StatusSink, B: StatusSink> StatusSink for (A, B) {
    fn service(&mut self) {
        self.0.service();
        self.1.service();
    }

    fn new_burst(&mut self, run_id: u32, spill_id: u32) {
        self.0.new_burst(run_id, spill_id);
        self.1.new_burst(run_id, spill_id);
    }

    fn trigger_rate(&mut self, rate_hz: f64) {
        self.0.trigger_rate(rate_hz);
        self.1.trigger_rate(rate_hz);
    }

    fn monitor(&mut self, status: &BurstStatus) {
        self.0.monitor(status);
        self.1.monitor(status);
    }

    fn output_file(&mut self, path: &Path) {
        self.0.output_file(path);
        self.1.output_file(path);
    }

    fn run_statistics(&mut self, stats: &RunStatistics) {
        self.0.run_statistics(stats);
        self.1.run_statistics(stats);
    }

    fn exception(&mut self, message: &str) {
        self.0.exception(message);
        self.1.exception(message);
    }
}
