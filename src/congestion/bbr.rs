//! `BBR`-style congestion control.
//!
//! The core signal is `ratio = mean(recent RTT) / rtprop`. Near 1.0 the path
//! is idle; well above 1.0 a queue has formed and the last window increase
//! overshot.
//!
//! | State       | Condition                         | Action                         |
//! |-------------|-----------------------------------|--------------------------------|
//! | `STARTUP`   | ratio < 1.25                      | grow window                    |
//! | `STARTUP`   | ratio >= 1.25                     | -> `DRAIN`                     |
//! | `CRUISE`    | rtprop older than 10s             | window = 4, -> `PROBE_RTT`     |
//! | `CRUISE`    | in state > 5s                     | -> `PROBE`                     |
//! | `PROBE`     | ratio < 1.25                      | grow window                    |
//! | `PROBE`     | ratio >= 1.25                     | -> `DRAIN`                     |
//! | `DRAIN`     | ratio < 1.10                      | -> `CRUISE`                    |
//! | `DRAIN`     | in state > 5s                     | rtprop = recent min, flag it   |
//! | `DRAIN`     | otherwise                         | window - 1 (floor 1)           |
//! | `PROBE_RTT` | in state > 0.2s                   | restore window, -> `CRUISE`    |
//!
//! Window growth is +1 below 10, x1.25 above.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::core::{
    BBR_ADDITIVE_LIMIT, BBR_CRUISE_DURATION, BBR_DRAIN_EXIT, BBR_DRAIN_TIMEOUT, BBR_MIN_SAMPLES,
    BBR_PROBE_RTT_CWND, BBR_PROBE_RTT_DURATION, BBR_PROBE_RTT_INTERVAL, BBR_RTT_THRESHOLD,
    BBR_RTT_WINDOW, BBR_UPDATE_INTERVAL,
};

use super::{BbrState, CongestionController, CongestionDecision};

/// Floor for `rtprop` when used as a divisor.
const MIN_RTPROP: Duration = Duration::from_micros(1);

/// `BBR`-style controller over a window of recent RTT samples.
#[derive(Debug, Clone)]
pub struct Bbr {
    samples: VecDeque<Duration>,
    rtprop: Option<Duration>,
    rtprop_updated: Option<Instant>,
    cwnd: u32,
    state: BbrState,
    state_start: Option<Instant>,
    last_update: Option<Instant>,
    pre_probe_rtt_cwnd: Option<u32>,
}

impl Bbr {
    /// Controller in `STARTUP` with a window of 1.
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(BBR_RTT_WINDOW),
            rtprop: None,
            rtprop_updated: None,
            cwnd: 1,
            state: BbrState::Startup,
            state_start: None,
            last_update: None,
            pre_probe_rtt_cwnd: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> BbrState {
        self.state
    }

    /// Minimum RTT estimate, once one exists.
    pub fn rtprop(&self) -> Option<Duration> {
        self.rtprop
    }

    /// Number of samples currently held (at most 50).
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn mean_rtt(&self) -> Duration {
        match self.samples.len() {
            0 => Duration::ZERO,
            n => self.samples.iter().sum::<Duration>() / n as u32,
        }
    }

    fn grow(&mut self) {
        self.cwnd = if self.cwnd < BBR_ADDITIVE_LIMIT {
            self.cwnd + 1
        } else {
            self.cwnd.saturating_add(self.cwnd / 4)
        };
    }

    fn enter(&mut self, state: BbrState, now: Instant, ratio: f64) {
        tracing::info!(
            from = %self.state,
            to = %state,
            cwnd = self.cwnd,
            ratio = format_args!("{ratio:.3}"),
            "bbr state transition"
        );
        self.state = state;
        self.state_start = Some(now);
    }

    fn in_state_for(&self, now: Instant) -> Duration {
        self.state_start
            .map_or(Duration::ZERO, |start| now.saturating_duration_since(start))
    }

    /// One pass of the state machine. Returns whether `rtprop` was reset.
    fn run_state_machine(&mut self, now: Instant) -> bool {
        let avg = self.mean_rtt();
        let Some(min) = self.samples.iter().min().copied() else {
            return false;
        };

        if self.rtprop.is_none_or(|rtprop| min < rtprop) {
            self.rtprop = Some(min);
            self.rtprop_updated = Some(now);
        }
        let rtprop = self.rtprop.unwrap_or(min).max(MIN_RTPROP);
        let ratio = avg.as_secs_f64() / rtprop.as_secs_f64();

        match self.state {
            BbrState::Startup | BbrState::Probe => {
                if ratio < BBR_RTT_THRESHOLD {
                    self.grow();
                } else {
                    self.enter(BbrState::Drain, now, ratio);
                }
            }
            BbrState::Cruise => {
                let since_rtprop = self
                    .rtprop_updated
                    .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
                if since_rtprop > BBR_PROBE_RTT_INTERVAL {
                    self.pre_probe_rtt_cwnd = Some(self.cwnd);
                    self.cwnd = BBR_PROBE_RTT_CWND;
                    self.enter(BbrState::ProbeRtt, now, ratio);
                } else if self.in_state_for(now) > BBR_CRUISE_DURATION {
                    self.enter(BbrState::Probe, now, ratio);
                }
            }
            BbrState::Drain => {
                if ratio < BBR_DRAIN_EXIT {
                    self.enter(BbrState::Cruise, now, ratio);
                } else if self.in_state_for(now) > BBR_DRAIN_TIMEOUT {
                    tracing::trace!(
                        old_ms = rtprop.as_secs_f64() * 1e3,
                        new_ms = min.as_secs_f64() * 1e3,
                        "rtprop reset after drain timeout"
                    );
                    self.rtprop = Some(min);
                    self.rtprop_updated = Some(now);
                    return true;
                } else {
                    self.cwnd = self.cwnd.saturating_sub(1).max(1);
                }
            }
            BbrState::ProbeRtt => {
                if self.in_state_for(now) > BBR_PROBE_RTT_DURATION {
                    self.cwnd = self.pre_probe_rtt_cwnd.take().unwrap_or(self.cwnd);
                    self.rtprop_updated = Some(now);
                    self.enter(BbrState::Cruise, now, ratio);
                }
            }
        }
        false
    }
}

impl Default for Bbr {
    fn default() -> Self {
        Self::new()
    }
}

impl CongestionController for Bbr {
    fn on_rtt_sample(&mut self, rtt: Duration) {
        if self.samples.len() == BBR_RTT_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(rtt);
    }

    fn update(&mut self, now: Instant) -> CongestionDecision {
        let mut rtprop_reset = false;

        if self.samples.len() >= BBR_MIN_SAMPLES {
            let due = self
                .last_update
                .is_none_or(|last| now.saturating_duration_since(last) >= BBR_UPDATE_INTERVAL);
            if due {
                rtprop_reset = self.run_state_machine(now);
                self.last_update = Some(now);
            }
        }

        let rtprop = self.rtprop.unwrap_or(Duration::ZERO);
        let pacing_interval = if self.cwnd > 0 {
            rtprop / self.cwnd
        } else {
            Duration::ZERO
        };

        CongestionDecision {
            cwnd: self.cwnd,
            pacing_interval,
            state: self.state,
            avg_rtt: self.mean_rtt(),
            rtprop,
            rtprop_reset,
        }
    }

    fn cwnd(&self) -> u32 {
        self.cwnd
    }
}
