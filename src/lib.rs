#![cfg_attr(feature = "clippy", feature(plugin))]
#![cfg_attr(feature = "clippy", plugin(clippy))]

extern crate bincode;
#[macro_use]
extern crate log;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate sha3;
extern crate time;

pub mod contact;
pub mod id;
pub mod lookup;
pub mod protocol;
pub mod routing;
pub mod rpc;
pub mod rudp;

pub use self::contact::{Contact, Credentials, RankInfo, TransportType};
pub use self::id::Id;
pub use self::lookup::{LookupEngine, LookupError, LookupHandle};
pub use self::routing::{InMemoryRoutingTable, RoutingTable, RoutingError};
pub use self::rpc::{RpcClient, UdpRpcClient};
pub use self::rudp::{
    ConnectionType, DefaultCongestionControl, DefaultTickTimer, RudpError, RudpParameters, RudpPacket, RudpReceiver,
    UdpSocketPacketSink,
};

/// Length, in bytes, of a Kademlia identifier (spec.md's `Id`: 160 bits).
pub const ID_LENGTH: usize = 20;

/// Upper bound on the size of a bincode-framed `FindNodes` request or
/// response. Unrelated to `RudpParameters::udp_payload`, which bounds RUDP
/// data packets instead.
pub const MESSAGE_LENGTH: usize = 8192;

pub const ROUTING_TABLE_SIZE: usize = ID_LENGTH * 8;

/// Bucket capacity, i.e. Kademlia's `k`. Default value matches the
/// original implementation's test fixture (`test::k = 8`).
pub const REPLICATION_PARAM: usize = 8;

/// Lookup concurrency, i.e. Kademlia's `alpha`.
pub const CONCURRENCY_PARAM: usize = 3;

/// Lookup progress threshold, i.e. Kademlia's `beta`: how many of a
/// round's `alpha` probes must return before the next round may begin.
pub const PROGRESS_PARAM: usize = 2;

/// How long a node's bucket may go unrefreshed before it is considered
/// stale, in seconds.
pub const BUCKET_REFRESH_INTERVAL: u64 = 3600;
