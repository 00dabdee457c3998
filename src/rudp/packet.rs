//! Wire packets for the RUDP receive pipeline, ported from the original
//! implementation's `RudpDataPacket`/`RudpAckPacket`/`RudpAckOfAckPacket`/
//! `RudpNegativeAckPacket`, using this crate's bincode/serde framing
//! (spec.md's ambient serialization stack) rather than hand-rolled
//! bit-packing.

use bincode;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataPacket {
    pub sequence_number: u32,
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct AckPacket {
    pub destination_socket_id: u32,
    pub ack_sequence_number: u32,
    pub packet_sequence_number: u32,
    pub has_optional_fields: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AckOfAckPacket {
    pub destination_socket_id: u32,
    pub ack_sequence_number: u32,
}

/// Requests retransmission of one or more ranges of lost sequence numbers.
/// Ranges are stored as `(begin, end)` inclusive pairs, same shape as the
/// original's `AddSequenceNumbers(begin, end)`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NegativeAckPacket {
    pub destination_socket_id: u32,
    ranges: Vec<(u32, u32)>,
}

impl NegativeAckPacket {
    pub fn new(destination_socket_id: u32) -> Self {
        NegativeAckPacket {
            destination_socket_id,
            ranges: Vec::new(),
        }
    }

    pub fn add_sequence_number(&mut self, seqnum: u32) {
        self.ranges.push((seqnum, seqnum));
    }

    pub fn add_sequence_numbers(&mut self, begin: u32, end: u32) {
        self.ranges.push((begin, end));
    }

    pub fn has_sequence_numbers(&self) -> bool {
        !self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[(u32, u32)] {
        &self.ranges
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum RudpPacket {
    Data(DataPacket),
    Ack(AckPacket),
    AckOfAck(AckOfAckPacket),
    NegativeAck(NegativeAckPacket),
}

impl RudpPacket {
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self, bincode::Infinite).expect("RudpPacket serialization is infallible")
    }
}

/// Decodes a datagram into a `RudpPacket`, or `None` if the bytes are
/// malformed -- the decode boundary spec.md §7 places in front of
/// `RudpReceiver::handle_data`/`handle_ack_of_ack` so the receiver itself
/// never has to reason about a decode failure, only about packets it
/// understands.
pub fn decode(bytes: &[u8]) -> Option<RudpPacket> {
    bincode::deserialize(bytes).ok()
}
