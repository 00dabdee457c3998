use std::net::UdpSocket;

use time::SteadyTime;

use crate::rudp::congestion::CongestionControl;
use crate::rudp::error::RudpError;
use crate::rudp::packet::{AckOfAckPacket, AckPacket, DataPacket, NegativeAckPacket, RudpPacket};
use crate::rudp::timer::TickTimer;
use crate::rudp::window::PacketWindow;

/// Where a `RudpReceiver` sends the ACK/NAK packets it generates. An
/// external collaborator, same pattern as `RpcClient`/`RoutingTable`; the
/// original's equivalent is `RudpPeer::Send`.
pub trait PacketSink {
    fn socket_id(&self) -> u32;
    fn send_ack(&mut self, packet: AckPacket);
    fn send_negative_ack(&mut self, packet: NegativeAckPacket);
}

/// Default `PacketSink`: writes ACK/NAK packets to a fixed peer address over
/// a real `UdpSocket`, in the spirit of `rpc::UdpRpcClient`. A send failure
/// is logged and swallowed rather than propagated, matching spec.md §7's
/// "never panic on RPC failure" philosophy -- the next tick will simply
/// retry with a fresh ACK/NAK once the underlying condition clears.
pub struct UdpSocketPacketSink {
    socket: UdpSocket,
    peer: std::net::SocketAddr,
    socket_id: u32,
}

impl UdpSocketPacketSink {
    pub fn new(socket: UdpSocket, peer: std::net::SocketAddr, socket_id: u32) -> Self {
        UdpSocketPacketSink { socket, peer, socket_id }
    }

    fn send(&self, packet: RudpPacket) {
        let encoded = packet.encode();
        if let Err(err) = self.socket.send_to(&encoded, self.peer) {
            warn!("UdpSocketPacketSink: failed to send packet to {}: {}", self.peer, RudpError::Send(err));
        }
    }
}

impl PacketSink for UdpSocketPacketSink {
    fn socket_id(&self) -> u32 {
        self.socket_id
    }

    fn send_ack(&mut self, packet: AckPacket) {
        self.send(RudpPacket::Ack(packet));
    }

    fn send_negative_ack(&mut self, packet: NegativeAckPacket) {
        self.send(RudpPacket::NegativeAck(packet));
    }
}

struct UnreadPacket {
    packet: Option<DataPacket>,
    lost: bool,
    bytes_read: usize,
}

/// Default-constructed slots start out "lost" (spec.md: a hole in the window
/// is lost until proven otherwise), exactly as the original's comment on
/// `Append()` in `HandleData` -- so this cannot be `#[derive(Default)]`,
/// which would give `lost: false` and leave freshly grown slots looking
/// already-filled.
impl Default for UnreadPacket {
    fn default() -> Self {
        UnreadPacket {
            packet: None,
            lost: true,
            bytes_read: 0,
        }
    }
}

struct Ack {
    packet: AckPacket,
    send_time: SteadyTime,
}

impl Default for Ack {
    fn default() -> Self {
        Ack {
            packet: AckPacket::default(),
            send_time: SteadyTime::now(),
        }
    }
}

/// The RUDP receive pipeline (C9 in spec.md §2), ported directly from the
/// original's `RudpReceiver`: a sliding window of not-yet-fully-delivered
/// packets, a parallel window of outstanding ACKs used to sample RTT from
/// their ACK-of-ACK, and a selective NAK scheme for loss recovery.
pub struct RudpReceiver<C: CongestionControl, T: TickTimer, P: PacketSink> {
    peer: P,
    tick_timer: T,
    congestion_control: C,
    unread_packets: PacketWindow<UnreadPacket>,
    acks: PacketWindow<Ack>,
    last_ack_packet_sequence_number: u32,
}

impl<C: CongestionControl, T: TickTimer, P: PacketSink> RudpReceiver<C, T, P> {
    pub fn new(peer: P, tick_timer: T, congestion_control: C) -> Self {
        RudpReceiver {
            peer,
            tick_timer,
            congestion_control,
            unread_packets: PacketWindow::new(0),
            acks: PacketWindow::new(0),
            last_ack_packet_sequence_number: 0,
        }
    }

    pub fn reset(&mut self, initial_sequence_number: u32) {
        self.unread_packets.reset(initial_sequence_number);
        self.last_ack_packet_sequence_number = initial_sequence_number;
    }

    /// The next time a driver loop should call `handle_tick`, if any tick is
    /// currently scheduled.
    pub fn next_tick(&self) -> Option<SteadyTime> {
        self.tick_timer.next_tick()
    }

    /// Clears the scheduled tick once a driver loop has fired it, so the
    /// same deadline is not acted on twice.
    pub fn clear_tick(&mut self) {
        self.tick_timer.clear();
    }

    /// True once every packet received so far has been fully handed to the
    /// application and there is no unacknowledged ACK outstanding.
    pub fn flushed(&self) -> bool {
        self.acks.is_empty() && self.ack_packet_sequence_number() == self.last_ack_packet_sequence_number
    }

    /// Copies as much contiguous, already-arrived application data into
    /// `data` as will fit, returning the number of bytes written. Returns
    /// `0` if the next packet due to the application is lost (not yet
    /// arrived) or the window is empty.
    pub fn read_data(&mut self, data: &mut [u8]) -> usize {
        let mut n = self.unread_packets.begin();
        while n != self.unread_packets.end() {
            let remove_front;
            let result;
            {
                let p = match self.unread_packets.get_mut(n) {
                    Some(p) => p,
                    None => break,
                };
                if p.lost {
                    return 0;
                }
                let available = p.packet.as_ref().map(|pkt| pkt.data.len()).unwrap_or(0);
                if available > p.bytes_read {
                    let length = data.len().min(available - p.bytes_read);
                    let src = &p.packet.as_ref().unwrap().data[p.bytes_read..p.bytes_read + length];
                    data[..length].copy_from_slice(src);
                    p.bytes_read += length;
                    remove_front = available == p.bytes_read;
                    result = Some(length);
                } else {
                    remove_front = true;
                    result = None;
                }
            }
            if remove_front {
                self.unread_packets.remove();
            }
            if let Some(length) = result {
                return length;
            }
            n = self.unread_packets.next(n);
        }
        0
    }

    /// Accepts an inbound data packet: grows the window to make room for
    /// it if it is within reach, records it if it lands inside the window,
    /// and schedules (or sends immediately) an acknowledgement.
    pub fn handle_data(&mut self, packet: DataPacket) {
        self.unread_packets.set_maximum_size(self.congestion_control.window_size() as usize);

        let seqnum = packet.sequence_number;

        while self.unread_packets.is_coming_soon(seqnum) && !self.unread_packets.is_full() {
            self.unread_packets.append();
        }

        if self.unread_packets.contains(seqnum) {
            let mut was_lost = false;
            if let Some(p) = self.unread_packets.get_mut(seqnum) {
                if p.lost {
                    was_lost = true;
                    p.packet = Some(packet);
                    p.lost = false;
                    p.bytes_read = 0;
                }
            }
            if was_lost {
                self.congestion_control.on_data_packet_received(seqnum);
            }
        }

        if self.congestion_control.ack_interval() > 0 && seqnum % self.congestion_control.ack_interval() == 0 {
            self.handle_tick();
        } else {
            let delay = self.congestion_control.ack_delay();
            self.tick_timer.tick_after(delay);
        }
    }

    /// Samples RTT from an ACK-of-ACK and forgets every outstanding ACK up
    /// to and including the acknowledged one.
    pub fn handle_ack_of_ack(&mut self, packet: AckOfAckPacket) {
        let ack_seqnum = packet.ack_sequence_number;

        if let Some(ack) = self.acks.get(ack_seqnum) {
            let rtt = self.tick_timer.now() - ack.send_time;
            if let Some(rtt_us) = rtt.num_microseconds() {
                if rtt_us >= 0 && rtt_us < u32::MAX as i64 {
                    self.congestion_control.on_ack_of_ack(rtt_us as u32);
                }
            }
        }

        while self.acks.contains(ack_seqnum) {
            self.acks.remove();
        }
    }

    /// Emits an ACK if the acknowledgeable sequence number has advanced (or
    /// the previous ACK has gone unanswered too long), and a NAK for every
    /// contiguous run of lost slots currently in the window.
    pub fn handle_tick(&mut self) {
        self.tick_timer.clear();
        let now = self.tick_timer.now();

        let ack_packet_seqnum = self.ack_packet_sequence_number();
        let resend_due = self
            .acks
            .back()
            .map(|a| a.send_time + self.congestion_control.ack_timeout() <= now)
            .unwrap_or(false);

        if ack_packet_seqnum != self.last_ack_packet_sequence_number || (!self.acks.is_empty() && resend_due) {
            if self.acks.is_full() {
                self.acks.remove();
            }
            let n = self.acks.append();
            let socket_id = self.peer.socket_id();
            if let Some(a) = self.acks.get_mut(n) {
                a.packet.destination_socket_id = socket_id;
                a.packet.ack_sequence_number = n;
                a.packet.packet_sequence_number = ack_packet_seqnum;
                a.packet.has_optional_fields = false;
                a.send_time = now;
            }
            if let Some(a) = self.acks.get(n) {
                self.peer.send_ack(a.packet);
            }
            self.last_ack_packet_sequence_number = ack_packet_seqnum;
            self.tick_timer.tick_at(now + self.congestion_control.ack_timeout());
        }

        let mut negative_ack = NegativeAckPacket::new(self.peer.socket_id());
        let mut n = self.unread_packets.begin();
        while n != self.unread_packets.end() {
            let lost = self.unread_packets.get(n).map(|p| p.lost).unwrap_or(false);
            if lost {
                let begin = n;
                let mut end;
                loop {
                    end = n;
                    n = self.unread_packets.next(n);
                    if n == self.unread_packets.end() || !self.unread_packets.get(n).map(|p| p.lost).unwrap_or(false) {
                        break;
                    }
                }
                if begin == end {
                    negative_ack.add_sequence_number(begin);
                } else {
                    negative_ack.add_sequence_numbers(begin, end);
                }
            } else {
                n = self.unread_packets.next(n);
            }
        }
        if negative_ack.has_sequence_numbers() {
            self.peer.send_negative_ack(negative_ack);
            self.tick_timer.tick_at(now + self.congestion_control.ack_timeout());
        }
    }

    /// The sequence number up to (but not including) which every packet has
    /// arrived -- the cursor a selective ACK acknowledges.
    fn ack_packet_sequence_number(&self) -> u32 {
        let mut n = self.unread_packets.begin();
        while n != self.unread_packets.end() && !self.unread_packets.get(n).map(|p| p.lost).unwrap_or(true) {
            n = self.unread_packets.next(n);
        }
        n
    }
}
