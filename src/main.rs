#[macro_use]
extern crate log;
extern crate bincode;
extern crate kademlia_rudp;
extern crate simplelog;
extern crate time;

use std::io;
use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration as StdDuration;

use simplelog::{CombinedLogger, Config, Level, LevelFilter, TermLogger};

use kademlia_rudp::contact::{Contact, Credentials, RankInfo};
use kademlia_rudp::id::{Id, IdProvider, Sha3IdProvider};
use kademlia_rudp::protocol::{FindNodesRequest, FindNodesResponse, FindNodesResult, Message};
use kademlia_rudp::routing::{InMemoryRoutingTable, RoutingTable};
use kademlia_rudp::rpc::UdpRpcClient;
use kademlia_rudp::rudp::packet::{self, DataPacket, RudpPacket};
use kademlia_rudp::rudp::{DefaultCongestionControl, DefaultTickTimer, RudpParameters, RudpReceiver, UdpSocketPacketSink};
use kademlia_rudp::{LookupEngine, MESSAGE_LENGTH};
use kademlia_rudp::{CONCURRENCY_PARAM, PROGRESS_PARAM, REPLICATION_PARAM};

fn id_for(label: &str) -> Id {
    Sha3IdProvider.id_for(label.as_bytes())
}

/// Services inbound `FindNodes` requests against a node's own routing
/// table. Spawned as a background thread per node, in the teacher's
/// `start_message_handler` style -- a minimal request/response loop rather
/// than a full node, since request servicing sits outside this crate's
/// C1-C9 scope (spec.md §1's RPC client is the outbound half only).
fn spawn_responder(socket: UdpSocket, self_contact: Contact, table: Arc<Mutex<InMemoryRoutingTable>>) {
    thread::spawn(move || {
        let mut buffer = [0u8; MESSAGE_LENGTH];
        loop {
            let (len, from) = match socket.recv_from(&mut buffer) {
                Ok(pair) => pair,
                Err(_) => break,
            };
            let message: Message = match bincode::deserialize(&buffer[..len]) {
                Ok(m) => m,
                Err(_) => continue,
            };
            if let Message::Request(FindNodesRequest { token, sender, target, .. }) = message {
                {
                    let mut table = table.lock().unwrap();
                    table.add_contact(sender, RankInfo::default());
                }
                let contacts = {
                    let table = table.lock().unwrap();
                    table.get_close_contacts(&target, REPLICATION_PARAM, &[self_contact.id])
                };
                let response = Message::Response(FindNodesResponse {
                    token,
                    receiver: self_contact.clone(),
                    rank_info: RankInfo::default(),
                    result: FindNodesResult::Ok(contacts),
                });
                if let Ok(bytes) = bincode::serialize(&response, bincode::Bounded(MESSAGE_LENGTH as u64)) {
                    let _ = socket.send_to(&bytes, from);
                }
            }
        }
    });
}

type DemoReceiver = RudpReceiver<DefaultCongestionControl, DefaultTickTimer, UdpSocketPacketSink>;

/// Wires a `RudpReceiver` to a real pair of loopback `UdpSocket`s: one
/// socket owned by the receiver (fed by a background reader thread plus a
/// tick-driver thread), and a second, separate socket the REPL's `send`
/// command uses to play the role of the remote sender. This is demo
/// plumbing only -- the sender side of RUDP (retransmission, pacing) is
/// out of this crate's scope (spec.md §1).
fn spawn_rudp_demo() -> (UdpSocket, Arc<Mutex<DemoReceiver>>, Arc<Mutex<u32>>) {
    let receiver_socket = UdpSocket::bind("127.0.0.1:0").expect("failed to bind rudp demo socket");
    let reader_socket = receiver_socket.try_clone().expect("failed to clone rudp demo socket");
    let sink_socket = receiver_socket.try_clone().expect("failed to clone rudp demo socket");

    let sender_socket = UdpSocket::bind("127.0.0.1:0").expect("failed to bind rudp demo peer socket");
    let sender_addr = sender_socket.local_addr().expect("rudp demo peer socket has no local address");

    let sink = UdpSocketPacketSink::new(sink_socket, sender_addr, 1);
    let receiver = Arc::new(Mutex::new(RudpReceiver::new(
        sink,
        DefaultTickTimer::new(),
        DefaultCongestionControl::new(RudpParameters::default()),
    )));
    let next_sequence_number = Arc::new(Mutex::new(0u32));

    let reader_receiver = Arc::clone(&receiver);
    thread::spawn(move || {
        let mut buffer = [0u8; 65_536];
        loop {
            let len = match reader_socket.recv(&mut buffer) {
                Ok(len) => len,
                Err(_) => break,
            };
            match packet::decode(&buffer[..len]) {
                Some(RudpPacket::Data(data)) => reader_receiver.lock().unwrap().handle_data(data),
                Some(RudpPacket::AckOfAck(ack_of_ack)) => reader_receiver.lock().unwrap().handle_ack_of_ack(ack_of_ack),
                _ => warn!("rudp demo: dropping unrecognized or malformed packet"),
            }

            let mut buf = [0u8; 4096];
            loop {
                let n = reader_receiver.lock().unwrap().read_data(&mut buf);
                if n == 0 {
                    break;
                }
                info!("rudp demo: delivered {:?}", String::from_utf8_lossy(&buf[..n]));
            }
        }
    });

    let ticker_receiver = Arc::clone(&receiver);
    thread::spawn(move || loop {
        let next = ticker_receiver.lock().unwrap().next_tick();
        match next {
            Some(at) => {
                let now = time::SteadyTime::now();
                if at > now {
                    if let Ok(delay) = (at - now).to_std() {
                        thread::sleep(delay);
                    }
                }
                let mut r = ticker_receiver.lock().unwrap();
                r.handle_tick();
                r.clear_tick();
            },
            None => thread::sleep(StdDuration::from_millis(20)),
        }
    });

    (sender_socket, receiver, next_sequence_number)
}

fn main() {
    let logger_config = Config {
        time: Some(Level::Error),
        level: Some(Level::Error),
        target: None,
        location: None,
        time_format: None,
    };
    CombinedLogger::init(vec![TermLogger::new(LevelFilter::Info, logger_config).unwrap()]).unwrap();

    // A small bootstrap network: node 0 is seeded into every other node's
    // routing table, so a lookup from node N can walk outward from it.
    let mut contacts = Vec::new();
    let mut tables = Vec::new();
    let mut sockets = Vec::new();

    for i in 0..8 {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("failed to bind demo socket");
        let addr = socket.local_addr().unwrap();
        let contact = Contact::new(id_for(&format!("demo-node-{}", i)), addr);
        let table = Arc::new(Mutex::new(InMemoryRoutingTable::new(contact.id)));
        contacts.push(contact);
        tables.push(table);
        sockets.push(socket);
    }

    for i in 0..contacts.len() {
        for j in 0..contacts.len() {
            if i != j {
                tables[i].lock().unwrap().add_contact(contacts[j].clone(), RankInfo::default());
            }
        }
    }

    let querying_node = 1;

    for i in 0..contacts.len() {
        if i == querying_node {
            // This node only acts as a lookup client below; its socket is
            // owned exclusively by the `UdpRpcClient` listener so inbound
            // responses are never raced against a responder thread reading
            // the same underlying file descriptor.
            continue;
        }
        let socket = sockets[i].try_clone().expect("failed to clone demo socket");
        spawn_responder(socket, contacts[i].clone(), Arc::clone(&tables[i]));
    }

    let rpc_socket = sockets[querying_node].try_clone().expect("failed to clone demo socket");
    let rpc = Arc::new(UdpRpcClient::new(rpc_socket, contacts[querying_node].clone()));
    let engine = LookupEngine::new(
        contacts[querying_node].id,
        CONCURRENCY_PARAM,
        PROGRESS_PARAM,
        REPLICATION_PARAM,
        Credentials::default(),
        rpc,
    )
    .expect("demo alpha/beta parameters are valid by construction");

    let (rudp_sender_socket, rudp_receiver, rudp_sequence_number) = spawn_rudp_demo();
    let rudp_receiver_addr = rudp_sender_socket.local_addr().unwrap();
    info!("rudp demo sender bound at {}, feeding a receiver behind it", rudp_receiver_addr);

    let stdin = io::stdin();
    loop {
        let mut buffer = String::new();
        println!("Ready for input!");
        if stdin.read_line(&mut buffer).is_err() || buffer.is_empty() {
            break;
        }
        let args: Vec<&str> = buffer.trim_end().split(' ').collect();
        match args[0] {
            "lookup" => {
                if args.len() < 2 {
                    error!("usage: lookup <label>");
                    continue;
                }
                let target = id_for(args[1]);
                let table = tables[querying_node].lock().unwrap().clone();
                let (tx, rx) = std::sync::mpsc::channel();
                engine.find_nodes(target, &table, move |_rank_info, result_size, contacts| {
                    let _ = tx.send((result_size, contacts));
                });
                match rx.recv() {
                    Ok((result_size, contacts)) => {
                        info!("lookup converged with {} contacts (result_size={})", contacts.len(), result_size);
                        for contact in contacts {
                            info!("  {:?} @ {}", contact.id, contact.endpoint);
                        }
                    },
                    Err(_) => error!("lookup callback channel closed unexpectedly"),
                }
            },
            "send" => {
                if args.len() < 2 {
                    error!("usage: send <text>");
                    continue;
                }
                let text = args[1..].join(" ");
                let mut seqnum = rudp_sequence_number.lock().unwrap();
                let packet = RudpPacket::Data(DataPacket {
                    sequence_number: *seqnum,
                    data: text.into_bytes(),
                });
                *seqnum += 1;
                drop(seqnum);
                let _ = rudp_sender_socket.send_to(&packet.encode(), rudp_receiver_addr);
            },
            "flushed" => {
                info!("rudp demo receiver flushed: {}", rudp_receiver.lock().unwrap().flushed());
            },
            "quit" => break,
            _ => error!("commands: lookup <label>, send <text>, flushed, quit"),
        }
    }
}
