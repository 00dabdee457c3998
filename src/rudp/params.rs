use time::Duration;

/// Connection types named in the original implementation's
/// `RudpParameters::ConnectionType` (`kWireless`/`kT1`/`kE1`/`k10MEthernet`/
/// `k100MEthernet`/`k1GEthernet`), used to pick a delay profile appropriate
/// to the link's bandwidth. The receive path only consults the timing
/// fields these select (`send_delay`/`receive_delay`/`ack_delay`); nothing
/// in this crate inspects the variant itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionType {
    Wireless,
    T1,
    E1,
    TenMegabitEthernet,
    HundredMegabitEthernet,
    GigabitEthernet,
}

/// Traffic-shaping constants for the RUDP receive pipeline (C6-C9 in
/// spec.md §2), ported from the original implementation's
/// `RudpParameters` static table. Unlike the original these are grouped
/// instance fields rather than process-wide statics, so a test can run
/// several receivers with different parameters in the same process.
#[derive(Clone, Copy, Debug)]
pub struct RudpParameters {
    /// Window size a fresh connection starts at.
    pub default_window_size: u32,
    /// Hard ceiling the congestion controller will never grow past.
    pub maximum_window_size: u32,
    /// Largest UDP datagram this transport will ever emit, bounded by the
    /// practical single-datagram UDP payload limit (`kUDPPayload`).
    pub udp_payload: usize,
    /// Default application data carried per packet.
    pub default_data_size: usize,
    /// Largest application data carried per packet.
    pub max_data_size: usize,
    /// Timeout before a data packet that went unacknowledged is resent by
    /// the sender (`kDefaultSendTimeOut`). Carried for completeness of the
    /// external-interface contract; the receive path named in spec.md §4.3
    /// never consults it directly since retransmission is the sender's job.
    pub send_timeout: Duration,
    /// Timeout before a negative-ack requesting resend of an observed
    /// missing packet is itself resent (`kDefaultReceiveTimeOut`).
    pub receive_timeout: Duration,
    /// Machine-dependent send-side pacing delay (`kDefaultSendDelay`).
    pub send_delay: Duration,
    /// Machine-dependent receive-side pacing delay (`kDefaultReceiveDelay`).
    pub receive_delay: Duration,
    /// How often (every Nth sequence number) an ACK is sent unconditionally
    /// rather than merely scheduled (`kAckInterval`).
    pub ack_interval: u32,
    /// Delay before a scheduled (non-immediate) ACK is actually sent.
    pub ack_delay: Duration,
    /// How long an unacknowledged ACK is kept before it is resent
    /// (`kDefaultAckTimeOut`).
    pub ack_timeout: Duration,
    /// Link type this profile was tuned for (`kConnectionType`).
    pub connection_type: ConnectionType,
}

impl Default for RudpParameters {
    fn default() -> Self {
        RudpParameters::for_connection_type(ConnectionType::HundredMegabitEthernet)
    }
}

impl RudpParameters {
    /// Builds a parameter set scaled to the given link's bandwidth: slower
    /// links get longer send/receive/ack delays, mirroring the original's
    /// per-`ConnectionType` static overrides.
    pub fn for_connection_type(connection_type: ConnectionType) -> Self {
        let (send_delay_ms, receive_delay_ms, ack_delay_ms) = match connection_type {
            ConnectionType::Wireless => (40, 40, 200),
            ConnectionType::T1 => (20, 20, 150),
            ConnectionType::E1 => (15, 15, 120),
            ConnectionType::TenMegabitEthernet => (10, 10, 100),
            ConnectionType::HundredMegabitEthernet => (2, 2, 100),
            ConnectionType::GigabitEthernet => (1, 1, 50),
        };

        RudpParameters {
            default_window_size: 16,
            maximum_window_size: 256,
            udp_payload: 65_500,
            default_data_size: 1_024,
            max_data_size: 65_000,
            send_timeout: Duration::milliseconds(3_000),
            receive_timeout: Duration::milliseconds(3_000),
            send_delay: Duration::milliseconds(send_delay_ms),
            receive_delay: Duration::milliseconds(receive_delay_ms),
            ack_interval: 16,
            ack_delay: Duration::milliseconds(ack_delay_ms),
            ack_timeout: Duration::milliseconds(1_000),
            connection_type,
        }
    }
}
