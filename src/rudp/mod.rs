//! The reliable-UDP receive pipeline (C6-C9 in spec.md §2): a sliding
//! window of unread packets, selective ACK/NAK loss recovery, RTT sampling
//! via ACK-of-ACK, and congestion-control-driven window sizing. Ported
//! from the original implementation's `RudpReceiver` and friends.

pub mod congestion;
pub mod error;
pub mod packet;
pub mod params;
pub mod receiver;
pub mod timer;
pub mod window;

pub use self::congestion::{CongestionControl, DefaultCongestionControl};
pub use self::error::RudpError;
pub use self::packet::{AckOfAckPacket, AckPacket, DataPacket, NegativeAckPacket, RudpPacket};
pub use self::params::{ConnectionType, RudpParameters};
pub use self::receiver::{PacketSink, RudpReceiver, UdpSocketPacketSink};
pub use self::timer::{DefaultTickTimer, TickTimer};
pub use self::window::PacketWindow;
