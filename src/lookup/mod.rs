//! The iterative Kademlia lookup (C4/C5 in spec.md §2): a bounded-concurrency
//! shortlist walk over the `RoutingTable`/`RpcClient` collaborators.

pub mod engine;
pub mod error;
pub mod shortlist;

pub use self::engine::{LookupEngine, LookupHandle};
pub use self::error::LookupError;
pub use self::shortlist::{ContactState, Shortlist};
