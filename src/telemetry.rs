//! Telemetry capability for multipath transport connections.
//!
//! The kernel-side extraction of per-subflow statistics is an opaque,
//! platform-specific primitive. This module models it as an injected
//! capability so the windowed aggregator can be driven by the real
//! extractor in production and by a synthetic source in tests.
//!
//! Two kinds of counters are exposed:
//! - per-subflow samples (cumulative segments-out, smoothed RTT,
//!   congestion window), one entry per currently active subflow
//! - connection-level counters (receive-buffer occupancy, cumulative
//!   retransmissions)
//!
//! An **empty subflow list** is the teardown signal: the transfer that
//! was feeding the connection has ended. There is no separate
//! graceful/abnormal distinction.

use std::io;

/// One telemetry tick for one subflow.
///
/// `segs_out` is a cumulative counter; consumers derive per-tick
/// throughput from differences of consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubflowSample {
    /// Cumulative segments sent on this subflow.
    pub segs_out: u64,
    /// Smoothed round-trip time in microseconds.
    pub rtt_us: u64,
    /// Congestion window in segments.
    pub cwnd: u64,
}

impl SubflowSample {
    /// Create a new sample.
    pub fn new(segs_out: u64, rtt_us: u64, cwnd: u64) -> Self {
        Self {
            segs_out,
            rtt_us,
            cwnd,
        }
    }
}

/// Connection-level counters shared by all subflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnMeta {
    /// Receive-buffer occupancy reported by the peer side.
    pub recv_buffer: u64,
    /// Cumulative retransmission count. Assumed monotonic; a decrease
    /// means the kernel counter was reset.
    pub retransmits: u64,
}

/// Capability for polling a connection's transport statistics.
///
/// Implementations either succeed or eventually return an empty subflow
/// list; errors propagate unhandled across the training loop.
pub trait TelemetrySource {
    /// Enable continuous retention of telemetry for the connection.
    /// Idempotent; called once per episode before sampling starts.
    fn persist_state(&mut self) -> io::Result<()>;

    /// Poll per-subflow statistics, ordered by subflow index.
    ///
    /// An empty vector signals that the connection has torn down.
    fn subflow_stats(&mut self) -> io::Result<Vec<SubflowSample>>;

    /// Poll connection-level counters.
    fn meta_stats(&mut self) -> io::Result<ConnMeta>;
}

/// Per-subflow control directives, reserved for a scheduler actuator.
///
/// Directives are small integers in `[1, 4]` (one per subflow). The
/// control action produced by the policy is not wired to any transport
/// behavior in this crate; [`NullActuator`] is the only implementation.
pub trait Actuator {
    /// Apply per-subflow directives to the connection.
    fn apply(&mut self, directives: &[u8]) -> io::Result<()>;
}

/// Actuator that discards every directive.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullActuator;

impl Actuator for NullActuator {
    fn apply(&mut self, _directives: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Scripted Source
// ============================================================================

/// Deterministic telemetry source with linear counter growth.
///
/// Emits `ticks` rounds of subflow samples, then an empty list (the
/// teardown signal). `persist_state` restarts the script, so a single
/// source can drive many episodes. Useful for exercising the aggregator
/// and trainer without a live connection.
#[derive(Debug, Clone)]
pub struct ScriptedTelemetry {
    subflows: usize,
    ticks: u64,
    polled: u64,
    /// Segments-out increment per poll, per subflow.
    pub segs_step: u64,
    /// RTT reported on every poll.
    pub rtt_us: u64,
    /// Congestion window reported on every poll.
    pub cwnd: u64,
    /// Receive-buffer occupancy reported on every poll.
    pub recv_buffer: u64,
    /// Retransmission-counter increment per meta poll.
    pub retrans_step: u64,
    retransmits: u64,
}

impl ScriptedTelemetry {
    /// Create a source that stays alive for `ticks` subflow polls.
    pub fn new(subflows: usize, ticks: u64) -> Self {
        Self {
            subflows,
            ticks,
            polled: 0,
            segs_step: 50,
            rtt_us: 20_000,
            cwnd: 10,
            recv_buffer: 200,
            retrans_step: 0,
            retransmits: 0,
        }
    }

    /// Number of subflow polls served so far.
    pub fn polls(&self) -> u64 {
        self.polled
    }
}

impl TelemetrySource for ScriptedTelemetry {
    fn persist_state(&mut self) -> io::Result<()> {
        self.polled = 0;
        Ok(())
    }

    fn subflow_stats(&mut self) -> io::Result<Vec<SubflowSample>> {
        if self.polled >= self.ticks {
            return Ok(Vec::new());
        }
        self.polled += 1;
        let segs = self.polled * self.segs_step;
        Ok((0..self.subflows)
            .map(|_| SubflowSample::new(segs, self.rtt_us, self.cwnd))
            .collect())
    }

    fn meta_stats(&mut self) -> io::Result<ConnMeta> {
        self.retransmits += self.retrans_step;
        Ok(ConnMeta {
            recv_buffer: self.recv_buffer,
            retransmits: self.retransmits,
        })
    }
}
