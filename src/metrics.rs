//! Per-episode training metrics and logging backends.
//!
//! The trainer hands an [`EpisodeSnapshot`] to a [`MetricsLogger`] at the
//! end of every episode. Backends can be composed with [`MultiLogger`].
//! The evaluation phase additionally appends one elapsed-time line per
//! episode to a plain text file ([`ElapsedTimeLog`]) — no structure, no
//! versioning, one float per line.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Phase of the run an episode belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Noise-driven exploration with learning enabled.
    Training,
    /// Noise-free rollouts with learning disabled.
    Evaluation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Training => write!(f, "train"),
            Phase::Evaluation => write!(f, "eval"),
        }
    }
}

/// Summary of one completed episode.
#[derive(Debug, Clone)]
pub struct EpisodeSnapshot {
    /// Episode index (0-based).
    pub episode: usize,
    /// Phase the episode ran in.
    pub phase: Phase,
    /// Cumulative shaped reward.
    pub reward: f32,
    /// Environment ticks in the episode.
    pub ticks: u64,
    /// Noise scale used for the episode (0.0 in evaluation).
    pub noise_scale: f32,
    /// Mean TD loss over the episode's updates (0.0 if none ran).
    pub mean_loss: f32,
    /// Wall-clock episode duration in seconds.
    pub elapsed_secs: f32,
}

/// Logging backend for episode summaries.
pub trait MetricsLogger: Send {
    /// Record one episode.
    fn log(&mut self, snapshot: &EpisodeSnapshot);

    /// Flush buffered output.
    fn flush(&mut self);
}

// ============================================================================
// Console
// ============================================================================

/// Table-style console logger.
pub struct ConsoleLogger {
    show_header: bool,
}

impl ConsoleLogger {
    /// Create a console logger.
    pub fn new() -> Self {
        Self { show_header: true }
    }

    fn print_header(&self) {
        println!(
            "{:>8} {:>6} {:>10} {:>7} {:>7} {:>10} {:>9}",
            "Episode", "Phase", "Reward", "Ticks", "Noise", "Loss", "Elapsed"
        );
        println!("{}", "-".repeat(64));
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, snapshot: &EpisodeSnapshot) {
        if self.show_header {
            self.print_header();
            self.show_header = false;
        }
        println!(
            "{:>8} {:>6} {:>10.2} {:>7} {:>7.3} {:>10.4} {:>8.1}s",
            snapshot.episode,
            snapshot.phase,
            snapshot.reward,
            snapshot.ticks,
            snapshot.noise_scale,
            snapshot.mean_loss,
            snapshot.elapsed_secs
        );
    }

    fn flush(&mut self) {}
}

// ============================================================================
// Evaluation elapsed-time file
// ============================================================================

/// Appends one elapsed-seconds line per evaluation episode.
pub struct ElapsedTimeLog {
    writer: BufWriter<File>,
}

impl ElapsedTimeLog {
    /// Open (or create) the log for appending.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Append one elapsed-time record.
    pub fn record(&mut self, elapsed_secs: f32) -> std::io::Result<()> {
        writeln!(self.writer, "{}", elapsed_secs)
    }
}

impl MetricsLogger for ElapsedTimeLog {
    fn log(&mut self, snapshot: &EpisodeSnapshot) {
        if snapshot.phase == Phase::Evaluation {
            let _ = self.record(snapshot.elapsed_secs);
        }
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for ElapsedTimeLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

// ============================================================================
// Composition
// ============================================================================

/// Fans snapshots out to multiple backends.
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    /// Create an empty multi-logger.
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
        }
    }

    /// Add a backend.
    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, snapshot: &EpisodeSnapshot) {
        for logger in &mut self.loggers {
            logger.log(snapshot);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}

/// Logger that drops everything (for headless tests).
#[derive(Debug, Default)]
pub struct NullLogger;

impl MetricsLogger for NullLogger {
    fn log(&mut self, _snapshot: &EpisodeSnapshot) {}
    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(phase: Phase, elapsed: f32) -> EpisodeSnapshot {
        EpisodeSnapshot {
            episode: 3,
            phase,
            reward: 12.5,
            ticks: 40,
            noise_scale: 0.2,
            mean_loss: 0.01,
            elapsed_secs: elapsed,
        }
    }

    #[test]
    fn console_logger_accepts_snapshots() {
        let mut logger = ConsoleLogger::new();
        logger.log(&snapshot(Phase::Training, 1.0));
        logger.log(&snapshot(Phase::Evaluation, 2.0));
        logger.flush();
    }

    #[test]
    fn elapsed_log_records_eval_episodes_only() {
        let dir = std::env::temp_dir().join("mptcp_tuner_times_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("times.txt");
        let _ = std::fs::remove_file(&path);

        {
            let mut logger = ElapsedTimeLog::open(&path).unwrap();
            logger.log(&snapshot(Phase::Training, 1.5));
            logger.log(&snapshot(Phase::Evaluation, 2.5));
            logger.log(&snapshot(Phase::Evaluation, 3.5));
            logger.flush();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "2.5");
        assert_eq!(lines[1], "3.5");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn multi_logger_fans_out() {
        let mut logger = MultiLogger::new().add(NullLogger).add(ConsoleLogger::new());
        logger.log(&snapshot(Phase::Training, 1.0));
        logger.flush();
    }
}
