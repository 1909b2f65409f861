//! QUAY Protocol - Congestion control
//!
//! A controller consumes RTT samples and, when asked, returns a
//! [`CongestionDecision`]: how many sends may be in flight and how far apart
//! to space them. The sender engine owns exactly one controller and consults
//! it every loop iteration.

mod bbr;

use std::fmt;
use std::time::{Duration, Instant};

pub use bbr::Bbr;

/// Congestion controller interface.
pub trait CongestionController {
    /// Record one round-trip time measurement.
    fn on_rtt_sample(&mut self, rtt: Duration);

    /// Re-evaluate at `now` and return the current decision.
    fn update(&mut self, now: Instant) -> CongestionDecision;

    /// Current congestion window, in sends.
    fn cwnd(&self) -> u32;
}

/// Controller state, as exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BbrState {
    /// Growing the window until queuing delay appears.
    #[default]
    Startup,
    /// Shrinking the window to drain the queue built in startup or probe.
    Drain,
    /// Holding the window steady.
    Cruise,
    /// Growing the window again to look for new capacity.
    Probe,
    /// Briefly shrinking the window to re-measure the minimum RTT.
    ProbeRtt,
}

impl BbrState {
    /// Upper-case label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            BbrState::Startup => "STARTUP",
            BbrState::Drain => "DRAIN",
            BbrState::Cruise => "CRUISE",
            BbrState::Probe => "PROBE",
            BbrState::ProbeRtt => "PROBE_RTT",
        }
    }
}

impl fmt::Display for BbrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one [`CongestionController::update`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CongestionDecision {
    /// Maximum sends in flight.
    pub cwnd: u32,
    /// Minimum spacing between sends (`rtprop / cwnd`, zero until known).
    pub pacing_interval: Duration,
    /// Current state.
    pub state: BbrState,
    /// Mean of the recent RTT samples.
    pub avg_rtt: Duration,
    /// Minimum RTT estimate (zero until known).
    pub rtprop: Duration,
    /// Set only on the call during which the drain timeout reset `rtprop`.
    pub rtprop_reset: bool,
}
