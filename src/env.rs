//! Windowed state aggregation and reward shaping.
//!
//! [`TransportEnv`] turns raw per-subflow telemetry into fixed-length
//! observation vectors and a shaped scalar reward. Per subflow it keeps
//! three ordered windows of the last `k` ticks (throughput deltas, RTT,
//! congestion window), slid by drop-oldest/append-newest, plus two
//! connection-level scalars (receive-buffer occupancy and the
//! retransmission delta since the previous tick).
//!
//! The environment is generic over [`TelemetrySource`] so it can be
//! driven by the kernel extractor in production and a scripted source in
//! tests. Telemetry failures propagate unchanged; the only recognized
//! termination is an empty subflow list from the source.

use std::collections::VecDeque;
use std::io;
use std::thread;

use crate::config::{ConfigError, EnvConfig};
use crate::telemetry::{SubflowSample, TelemetrySource};

/// Fixed-length feature windows for one subflow.
#[derive(Debug, Clone, Default)]
pub struct SubflowWindow {
    tp: VecDeque<f32>,
    rtt: VecDeque<f32>,
    cwnd: VecDeque<f32>,
}

impl SubflowWindow {
    fn with_capacity(k: usize) -> Self {
        Self {
            tp: VecDeque::with_capacity(k),
            rtt: VecDeque::with_capacity(k),
            cwnd: VecDeque::with_capacity(k),
        }
    }

    /// Append a tick during warm-up, growing the window towards `k`.
    fn fill(&mut self, tp: f32, rtt: f32, cwnd: f32) {
        self.tp.push_back(tp);
        self.rtt.push_back(rtt);
        self.cwnd.push_back(cwnd);
    }

    /// Pop the oldest tick and append the newest. Length is unchanged.
    fn slide(&mut self, tp: f32, rtt: f32, cwnd: f32) {
        self.tp.pop_front();
        self.rtt.pop_front();
        self.cwnd.pop_front();
        self.fill(tp, rtt, cwnd);
    }

    /// Entries currently held per sequence.
    pub fn len(&self) -> usize {
        self.tp.len()
    }

    /// Whether the window holds no ticks yet.
    pub fn is_empty(&self) -> bool {
        self.tp.is_empty()
    }

    /// Sum of the throughput-delta window.
    pub fn throughput_sum(&self) -> f32 {
        self.tp.iter().sum()
    }

    fn flatten_into(&self, out: &mut Vec<f32>) {
        out.extend(self.tp.iter());
        out.extend(self.rtt.iter());
        out.extend(self.cwnd.iter());
    }
}

/// Result of one environment tick.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Observation after the tick (unchanged when `done`).
    pub state: Vec<f32>,
    /// Shaped reward (0.0 when `done`).
    pub reward: f32,
    /// Ticks elapsed since the last reset.
    pub tick: u64,
    /// Receive-buffer occupancy at the tick.
    pub recv_buffer: u64,
    /// Whether the connection tore down.
    pub done: bool,
}

/// Windowed telemetry aggregator for one multipath connection.
pub struct TransportEnv<T: TelemetrySource> {
    source: T,
    config: EnvConfig,
    windows: Vec<SubflowWindow>,
    last: Vec<SubflowSample>,
    recv_buffer: u64,
    last_retrans: u64,
    retrans_delta: u64,
    tick: u64,
}

impl<T: TelemetrySource> TransportEnv<T> {
    /// Create an environment over an injected telemetry source.
    ///
    /// Rejects configurations the aggregator cannot run with.
    pub fn new(source: T, config: EnvConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let windows = (0..config.subflows)
            .map(|_| SubflowWindow::with_capacity(config.window))
            .collect();
        Ok(Self {
            source,
            config,
            windows,
            last: Vec::new(),
            recv_buffer: 0,
            last_retrans: 0,
            retrans_delta: 0,
            tick: 0,
        })
    }

    /// Configured parameters.
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Windows for inspection (one per subflow).
    pub fn windows(&self) -> &[SubflowWindow] {
        &self.windows
    }

    /// Ticks since the last reset.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Enable telemetry retention, warm up, and prime the windows with
    /// `k` ticks of deltas. Returns the initial observation.
    ///
    /// A teardown during warm-up surfaces as `UnexpectedEof`: the windows
    /// cannot be primed to full length without a live connection.
    pub fn reset(&mut self) -> io::Result<Vec<f32>> {
        self.source.persist_state()?;
        thread::sleep(self.config.warmup);

        for w in self.windows.iter_mut() {
            *w = SubflowWindow::with_capacity(self.config.window);
        }
        self.tick = 0;

        self.last = self.source.subflow_stats()?;
        if self.last.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before warm-up sampling",
            ));
        }

        for _ in 0..self.config.window {
            thread::sleep(self.config.interval);
            let samples = self.source.subflow_stats()?;
            if samples.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed during warm-up sampling",
                ));
            }
            self.append_deltas(&samples, false);
            self.last = samples;
        }

        let meta = self.source.meta_stats()?;
        self.recv_buffer = meta.recv_buffer;
        self.last_retrans = meta.retransmits;
        self.retrans_delta = 0;

        Ok(self.observation())
    }

    /// Sleep one sampling period, poll once, slide the windows and score
    /// the tick.
    ///
    /// The `action` argument is accepted but not forwarded anywhere: the
    /// scheduler actuator is reserved (see [`crate::telemetry::Actuator`])
    /// and the control signal is output-only in this crate.
    pub fn step(&mut self, action: &[f32]) -> io::Result<StepOutcome> {
        let _ = action;
        thread::sleep(self.config.interval);
        let samples = self.source.subflow_stats()?;
        self.tick += 1;

        if samples.is_empty() {
            return Ok(StepOutcome {
                state: self.observation(),
                reward: 0.0,
                tick: self.tick,
                recv_buffer: self.recv_buffer,
                done: true,
            });
        }

        self.adjust(&samples)?;
        Ok(StepOutcome {
            state: self.observation(),
            reward: self.reward(),
            tick: self.tick,
            recv_buffer: self.recv_buffer,
            done: false,
        })
    }

    /// Slide every window by one tick and refresh connection counters.
    fn adjust(&mut self, samples: &[SubflowSample]) -> io::Result<()> {
        if samples.len() != self.windows.len() {
            log::warn!(
                "telemetry reported {} subflows, expected {}",
                samples.len(),
                self.windows.len()
            );
        }
        self.append_deltas(samples, true);
        self.last = samples.to_vec();

        let meta = self.source.meta_stats()?;
        self.recv_buffer = meta.recv_buffer;
        if meta.retransmits < self.last_retrans {
            // Kernel counter reset; clamp rather than reward the drop.
            log::warn!(
                "retransmission counter moved backwards ({} -> {})",
                self.last_retrans,
                meta.retransmits
            );
            self.retrans_delta = 0;
        } else {
            self.retrans_delta = meta.retransmits - self.last_retrans;
        }
        self.last_retrans = meta.retransmits;
        Ok(())
    }

    fn append_deltas(&mut self, samples: &[SubflowSample], slide: bool) {
        for (j, (window, sample)) in self.windows.iter_mut().zip(samples.iter()).enumerate() {
            let prev = self.last.get(j).copied().unwrap_or(*sample);
            let tp = sample.segs_out.saturating_sub(prev.segs_out) as f32;
            let rtt = if self.config.rtt_as_delta {
                sample.rtt_us as f32 - prev.rtt_us as f32
            } else {
                sample.rtt_us as f32
            };
            let cwnd = sample.cwnd as f32;
            if slide {
                window.slide(tp, rtt, cwnd);
            } else {
                window.fill(tp, rtt, cwnd);
            }
        }
    }

    /// Shaped reward: throughput across all windows is rewarded, so is
    /// receive-buffer occupancy; retransmissions are penalized. The whole
    /// window is re-summed each tick, so the magnitude scales with `k`.
    pub fn reward(&self) -> f32 {
        let throughput: f32 = self.windows.iter().map(|w| w.throughput_sum()).sum();
        self.config.throughput_gain * throughput + self.config.buffer_gain * self.recv_buffer as f32
            - self.config.retrans_penalty * self.retrans_delta as f32
    }

    /// Flatten all windows into the fixed-length observation vector:
    /// per subflow `[tp x k, rtt x k, cwnd x k, recv_buffer,
    /// retrans_delta]`, subflows concatenated in order.
    pub fn observation(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.config.observation_len());
        for window in &self.windows {
            window.flatten_into(&mut out);
            out.push(self.recv_buffer as f32);
            out.push(self.retrans_delta as f32);
        }
        out
    }

    /// Consume the environment, returning the telemetry source.
    pub fn into_source(self) -> T {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{ConnMeta, ScriptedTelemetry};
    use std::time::Duration;

    fn fast_config(subflows: usize, window: usize) -> EnvConfig {
        EnvConfig::new(subflows, window)
            .with_interval(Duration::ZERO)
            .with_warmup(Duration::ZERO)
    }

    #[test]
    fn reset_primes_windows_to_exactly_k() {
        let source = ScriptedTelemetry::new(2, 100);
        let mut env = TransportEnv::new(source, fast_config(2, 8)).unwrap();
        let state = env.reset().unwrap();

        assert_eq!(state.len(), 52);
        for w in env.windows() {
            assert_eq!(w.len(), 8);
        }
    }

    #[test]
    fn window_length_invariant_over_many_steps() {
        let source = ScriptedTelemetry::new(2, 500);
        let mut env = TransportEnv::new(source, fast_config(2, 4)).unwrap();
        env.reset().unwrap();

        for _ in 0..100 {
            let outcome = env.step(&[1.0, 1.0]).unwrap();
            assert!(!outcome.done);
            for w in env.windows() {
                assert_eq!(w.len(), 4, "window length drifted");
            }
        }
    }

    #[test]
    fn empty_subflow_list_is_the_termination_signal() {
        // 1 baseline + k warm-up polls + 2 live steps, then teardown.
        let source = ScriptedTelemetry::new(2, 1 + 4 + 2);
        let mut env = TransportEnv::new(source, fast_config(2, 4)).unwrap();
        let state = env.reset().unwrap();

        let first = env.step(&[1.0, 1.0]).unwrap();
        assert!(!first.done);
        let second = env.step(&[1.0, 1.0]).unwrap();
        assert!(!second.done);

        let last = env.step(&[1.0, 1.0]).unwrap();
        assert!(last.done);
        assert_eq!(last.reward, 0.0);
        // Windows are untouched on the terminal tick.
        assert_eq!(last.state.len(), state.len());
        for w in env.windows() {
            assert_eq!(w.len(), 4);
        }
    }

    #[test]
    fn teardown_during_warmup_is_an_error() {
        let source = ScriptedTelemetry::new(2, 3);
        let mut env = TransportEnv::new(source, fast_config(2, 8)).unwrap();
        let err = env.reset().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn reward_matches_shaping_formula() {
        // k=2, two subflows, constant per-tick throughput delta of 50 on
        // both, recv_buffer=200, one retransmission per tick:
        // 0.01*(2*50*2) + 0.03*200 - 0.05*1 = 7.95
        let mut source = ScriptedTelemetry::new(2, 100);
        source.segs_step = 50;
        source.recv_buffer = 200;
        source.retrans_step = 1;
        let mut env = TransportEnv::new(source, fast_config(2, 2)).unwrap();
        env.reset().unwrap();

        let outcome = env.step(&[1.0, 1.0]).unwrap();
        assert!((outcome.reward - 7.95).abs() < 1e-5, "got {}", outcome.reward);

        // Constant increments keep the reward constant across ticks.
        let outcome = env.step(&[1.0, 1.0]).unwrap();
        assert!((outcome.reward - 7.95).abs() < 1e-5);
    }

    #[test]
    fn observation_layout_carries_shared_scalars_per_subflow() {
        let mut source = ScriptedTelemetry::new(2, 100);
        source.recv_buffer = 321;
        let mut env = TransportEnv::new(source, fast_config(2, 2)).unwrap();
        env.reset().unwrap();
        let outcome = env.step(&[1.0, 1.0]).unwrap();

        let per_subflow = 3 * 2 + 2;
        assert_eq!(outcome.state.len(), 2 * per_subflow);
        // recv_buffer sits second-to-last in each subflow block.
        assert_eq!(outcome.state[per_subflow - 2], 321.0);
        assert_eq!(outcome.state[2 * per_subflow - 2], 321.0);
    }

    #[test]
    fn rtt_mode_switches_between_absolute_and_delta() {
        let source = ScriptedTelemetry::new(1, 100);
        let mut env = TransportEnv::new(source, fast_config(1, 2)).unwrap();
        env.reset().unwrap();
        env.step(&[1.0]).unwrap();
        // Absolute mode reports the scripted RTT directly.
        let obs = env.observation();
        assert_eq!(obs[2], 20_000.0);

        let source = ScriptedTelemetry::new(1, 100);
        let cfg = fast_config(1, 2).with_rtt_as_delta(true);
        let mut env = TransportEnv::new(source, cfg).unwrap();
        env.reset().unwrap();
        env.step(&[1.0]).unwrap();
        // Constant scripted RTT means a zero delta.
        let obs = env.observation();
        assert_eq!(obs[2], 0.0);
    }

    /// Source whose retransmission counter jumps backwards once.
    struct ResettingMeta {
        inner: ScriptedTelemetry,
        polls: u64,
    }

    impl TelemetrySource for ResettingMeta {
        fn persist_state(&mut self) -> io::Result<()> {
            self.inner.persist_state()
        }
        fn subflow_stats(&mut self) -> io::Result<Vec<SubflowSample>> {
            self.inner.subflow_stats()
        }
        fn meta_stats(&mut self) -> io::Result<ConnMeta> {
            self.polls += 1;
            Ok(ConnMeta {
                recv_buffer: 100,
                // 40, then the counter resets to 3 and grows again.
                retransmits: if self.polls == 1 { 40 } else { 2 + self.polls },
            })
        }
    }

    #[test]
    fn retransmission_counter_reset_clamps_to_zero() {
        let source = ResettingMeta {
            inner: ScriptedTelemetry::new(2, 100),
            polls: 0,
        };
        let mut env = TransportEnv::new(source, fast_config(2, 2)).unwrap();
        env.reset().unwrap(); // baseline retransmits = 40

        // Counter dropped 40 -> 4: clamped, not a negative penalty.
        env.step(&[1.0, 1.0]).unwrap();
        let obs = env.observation();
        assert_eq!(*obs.last().unwrap(), 0.0);

        // Next tick resumes normal deltas from the new baseline.
        env.step(&[1.0, 1.0]).unwrap();
        let obs = env.observation();
        assert_eq!(*obs.last().unwrap(), 1.0);
    }

    #[test]
    fn tick_counts_steps_since_reset() {
        let source = ScriptedTelemetry::new(2, 100);
        let mut env = TransportEnv::new(source, fast_config(2, 2)).unwrap();
        env.reset().unwrap();
        assert_eq!(env.tick(), 0);
        env.step(&[1.0, 1.0]).unwrap();
        env.step(&[1.0, 1.0]).unwrap();
        assert_eq!(env.tick(), 2);
    }
}
