//! Wire messages for the `FindNodes` RPC (C3's default transport), adapted
//! from the teacher's `protocol.rs`. Everything but `FindNode` request/
//! response is out of scope here: PUT/GET/DELETE-style value-store RPCs are
//! a Non-goal (spec.md §1), so `Ping`/`Store`/`FindValue` are not carried
//! over.

use crate::contact::{Contact, Credentials, RankInfo};
use crate::id::Id;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FindNodesRequest {
    pub token: Id,
    pub sender: Contact,
    pub target: Id,
    pub credentials: Credentials,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FindNodesResponse {
    pub token: Id,
    pub receiver: Contact,
    pub rank_info: RankInfo,
    pub result: FindNodesResult,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum FindNodesResult {
    Ok(Vec<Contact>),
    Err(i32),
}

#[derive(Serialize, Deserialize, Debug)]
pub enum Message {
    Request(FindNodesRequest),
    Response(FindNodesResponse),
}
