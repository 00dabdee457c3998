use std::fmt;
use std::io;

/// Errors this crate's own RUDP plumbing can raise -- socket setup/I/O
/// around the receive pipeline, as opposed to the malformed-packet and
/// window-overflow cases spec.md §7 requires the receiver itself to
/// absorb silently rather than raise.
#[derive(Debug)]
pub enum RudpError {
    /// A `PacketSink` failed to send an ACK or NAK over its socket.
    Send(io::Error),
    /// Binding or cloning the demo driver's `UdpSocket` failed.
    Socket(io::Error),
}

impl fmt::Display for RudpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RudpError::Send(err) => write!(f, "failed to send RUDP packet: {}", err),
            RudpError::Socket(err) => write!(f, "RUDP socket error: {}", err),
        }
    }
}

impl std::error::Error for RudpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RudpError::Send(err) | RudpError::Socket(err) => Some(err),
        }
    }
}
