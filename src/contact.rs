use std::net::SocketAddr;

use crate::id::Id;

/// Opaque credential blob attached to a contact. Validating it is the job
/// of a pluggable credential validator living outside this crate (spec.md
/// §1 Non-goals); the lookup engine and routing table never inspect it.
#[derive(PartialEq, Eq, Clone, Debug, Default, Serialize, Deserialize)]
pub struct Credentials(pub Vec<u8>);

/// A known peer in the overlay.
///
/// Two contacts are equal iff their ids are equal (spec.md §3), regardless
/// of any other field -- a peer can change endpoint without losing its
/// identity in a shortlist or routing bucket.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contact {
    pub id: Id,
    pub endpoint: SocketAddr,
    pub local_endpoints: Vec<SocketAddr>,
    pub rendezvous_endpoint: Option<SocketAddr>,
    pub directly_connected: bool,
    pub nat_restricted: bool,
    pub credentials: Credentials,
}

impl Contact {
    pub fn new(id: Id, endpoint: SocketAddr) -> Self {
        Contact {
            id,
            endpoint,
            local_endpoints: Vec::new(),
            rendezvous_endpoint: None,
            directly_connected: false,
            nat_restricted: false,
            credentials: Credentials::default(),
        }
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Contact) -> bool {
        self.id == other.id
    }
}

impl Eq for Contact {}

/// Transport-layer quality metadata attached to an RPC result. Opaque to
/// every collaborator in this crate (spec.md §3); it is only ever stored
/// and handed back to the caller.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RankInfo(pub Vec<u8>);

/// Which underlying transport an RPC should be issued over. Carried through
/// unchanged from the RPC client interface (spec.md §6); this crate does
/// not interpret it beyond passing it to the collaborator.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TransportType {
    Tcp,
    Udp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_endpoint() {
        let id = Id::rand();
        let a = Contact::new(id, "127.0.0.1:1".parse().unwrap());
        let mut b = Contact::new(id, "127.0.0.1:2".parse().unwrap());
        b.directly_connected = true;
        assert_eq!(a, b);
    }

    #[test]
    fn inequality_on_different_ids() {
        let a = Contact::new(Id::rand(), "127.0.0.1:1".parse().unwrap());
        let b = Contact::new(Id::rand(), "127.0.0.1:1".parse().unwrap());
        assert_ne!(a, b);
    }
}
