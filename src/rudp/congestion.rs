use time::Duration;

use crate::rudp::params::RudpParameters;

/// The congestion controller (C7 in spec.md §2) is an external
/// collaborator, mirroring the original's `RudpCongestionControl`: the
/// receiver only ever asks it for sizing/timing decisions and reports
/// observed events back to it.
pub trait CongestionControl {
    fn window_size(&self) -> u32;
    fn ack_interval(&self) -> u32;
    fn ack_delay(&self) -> Duration;
    fn ack_timeout(&self) -> Duration;
    fn on_data_packet_received(&mut self, sequence_number: u32);
    fn on_ack_of_ack(&mut self, round_trip_time_us: u32);
}

/// Default `CongestionControl`: an additive-increase window with an
/// exponentially-smoothed RTT estimate, in the spirit of the original's
/// slow-growth AIMD-ish controller but simplified to what this crate's
/// receiver actually consults.
pub struct DefaultCongestionControl {
    params: RudpParameters,
    window_size: u32,
    packets_since_growth: u32,
    smoothed_rtt_us: Option<u32>,
}

impl DefaultCongestionControl {
    pub fn new(params: RudpParameters) -> Self {
        DefaultCongestionControl {
            window_size: params.default_window_size,
            params,
            packets_since_growth: 0,
            smoothed_rtt_us: None,
        }
    }

    pub fn smoothed_rtt_us(&self) -> Option<u32> {
        self.smoothed_rtt_us
    }
}

impl CongestionControl for DefaultCongestionControl {
    fn window_size(&self) -> u32 {
        self.window_size
    }

    fn ack_interval(&self) -> u32 {
        self.params.ack_interval
    }

    fn ack_delay(&self) -> Duration {
        self.params.ack_delay
    }

    fn ack_timeout(&self) -> Duration {
        self.params.ack_timeout
    }

    fn on_data_packet_received(&mut self, _sequence_number: u32) {
        self.packets_since_growth += 1;
        if self.packets_since_growth >= self.window_size && self.window_size < self.params.maximum_window_size {
            self.window_size += 1;
            self.packets_since_growth = 0;
        }
    }

    fn on_ack_of_ack(&mut self, round_trip_time_us: u32) {
        self.smoothed_rtt_us = Some(match self.smoothed_rtt_us {
            Some(previous) => (previous * 7 + round_trip_time_us) / 8,
            None => round_trip_time_us,
        });
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;

    /// A `CongestionControl` with fixed, caller-chosen values, used so
    /// receiver tests can drive `HandleData`/`HandleTick` without timing
    /// noise from a real controller's growth curve.
    pub struct FixedCongestionControl {
        pub window_size: u32,
        pub ack_interval: u32,
        pub ack_delay: Duration,
        pub ack_timeout: Duration,
        pub last_rtt_us: Option<u32>,
    }

    impl Default for FixedCongestionControl {
        fn default() -> Self {
            FixedCongestionControl {
                window_size: 16,
                ack_interval: 16,
                ack_delay: Duration::milliseconds(100),
                ack_timeout: Duration::milliseconds(1_000),
                last_rtt_us: None,
            }
        }
    }

    impl CongestionControl for FixedCongestionControl {
        fn window_size(&self) -> u32 {
            self.window_size
        }

        fn ack_interval(&self) -> u32 {
            self.ack_interval
        }

        fn ack_delay(&self) -> Duration {
            self.ack_delay
        }

        fn ack_timeout(&self) -> Duration {
            self.ack_timeout
        }

        fn on_data_packet_received(&mut self, _sequence_number: u32) {}

        fn on_ack_of_ack(&mut self, round_trip_time_us: u32) {
            self.last_rtt_us = Some(round_trip_time_us);
        }
    }
}
