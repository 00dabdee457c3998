use std::collections::HashMap;
use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::thread;

use bincode;

use crate::contact::{Contact, Credentials, RankInfo, TransportType};
use crate::id::Id;
use crate::protocol::{FindNodesRequest, FindNodesResponse, FindNodesResult, Message};
use crate::MESSAGE_LENGTH;

/// The RPC client (C3 in spec.md §2) is an external collaborator. The
/// lookup engine only depends on this trait's `find_nodes`; the callback's
/// `result_size` follows spec.md §6: negative means failure, non-negative
/// means success (and, for `find_nodes`, doubles as the returned contact
/// count).
pub trait RpcClient {
    fn find_nodes(
        &self,
        key: &Id,
        credentials: &Credentials,
        peer: &Contact,
        transport_type: TransportType,
        callback: Box<dyn FnOnce(RankInfo, i32, Vec<Contact>) + Send>,
    );
}

/// Default `RpcClient`: fires `FindNodes` over a UDP socket and bincode
/// framing, in the spirit of the teacher's `Protocol`. A background thread
/// demultiplexes inbound datagrams by request token and invokes whichever
/// callback is still pending; stale tokens (already timed out, or a
/// duplicate response) are dropped with a warning, matching spec.md §7's
/// "stale ACK-of-ACK"-style tolerance for the lookup layer too.
pub struct UdpRpcClient {
    socket: Arc<UdpSocket>,
    sender: Contact,
    pending: Arc<Mutex<HashMap<Id, Box<dyn FnOnce(RankInfo, i32, Vec<Contact>) + Send>>>>,
}

impl UdpRpcClient {
    pub fn new(socket: UdpSocket, sender: Contact) -> Self {
        let socket = Arc::new(socket);
        let pending = Arc::new(Mutex::new(HashMap::new()));

        let listener_socket = Arc::clone(&socket);
        let listener_pending = Arc::clone(&pending);
        thread::spawn(move || Self::listen(listener_socket, listener_pending));

        UdpRpcClient {
            socket,
            sender,
            pending,
        }
    }

    fn listen(
        socket: Arc<UdpSocket>,
        pending: Arc<Mutex<HashMap<Id, Box<dyn FnOnce(RankInfo, i32, Vec<Contact>) + Send>>>>,
    ) {
        let mut buffer = [0u8; MESSAGE_LENGTH];
        loop {
            let len = match socket.recv_from(&mut buffer) {
                Ok((len, _addr)) => len,
                Err(_) => {
                    warn!("UdpRpcClient: socket closed, stopping listener");
                    break;
                },
            };

            let message: Message = match bincode::deserialize(&buffer[..len]) {
                Ok(message) => message,
                Err(_) => {
                    warn!("UdpRpcClient: dropping malformed datagram");
                    continue;
                },
            };

            if let Message::Response(FindNodesResponse {
                token,
                rank_info,
                result,
                ..
            }) = message
            {
                let callback = {
                    let mut pending = pending.lock().unwrap();
                    pending.remove(&token)
                };
                match callback {
                    Some(callback) => match result {
                        FindNodesResult::Ok(contacts) => {
                            let n = contacts.len() as i32;
                            callback(rank_info, n, contacts);
                        },
                        FindNodesResult::Err(code) => callback(rank_info, code, Vec::new()),
                    },
                    None => warn!("UdpRpcClient: response for unknown or expired token"),
                }
            }
        }
    }
}

impl RpcClient for UdpRpcClient {
    fn find_nodes(
        &self,
        key: &Id,
        credentials: &Credentials,
        peer: &Contact,
        _transport_type: TransportType,
        callback: Box<dyn FnOnce(RankInfo, i32, Vec<Contact>) + Send>,
    ) {
        let mut token = Id::rand();
        {
            let mut pending = self.pending.lock().unwrap();
            while pending.contains_key(&token) {
                token = Id::rand();
            }
            pending.insert(token, callback);
        }

        let request = Message::Request(FindNodesRequest {
            token,
            sender: self.sender.clone(),
            target: *key,
            credentials: credentials.clone(),
        });

        let encoded = match bincode::serialize(&request, bincode::Bounded(MESSAGE_LENGTH as u64)) {
            Ok(bytes) => bytes,
            Err(_) => {
                warn!("UdpRpcClient: request exceeds message length budget");
                if let Some(callback) = self.pending.lock().unwrap().remove(&token) {
                    callback(RankInfo::default(), -1, Vec::new());
                }
                return;
            },
        };

        if self.socket.send_to(&encoded, peer.endpoint).is_err() {
            if let Some(callback) = self.pending.lock().unwrap().remove(&token) {
                callback(RankInfo::default(), -1, Vec::new());
            }
        }
    }
}
