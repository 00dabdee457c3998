use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::contact::{Contact, Credentials, RankInfo, TransportType};
use crate::id::Id;
use crate::lookup::error::LookupError;
use crate::lookup::shortlist::{ContactState, Shortlist};
use crate::routing::RoutingTable;
use crate::rpc::RpcClient;

type Callback = Box<dyn FnOnce(RankInfo, i32, Vec<Contact>) + Send>;

/// Tracks one in-flight batch of probes dispatched together, so the engine
/// can evaluate spec.md §4.2 item 6's non-progress rule ("a round produces
/// no new contact strictly closer than the closest already responded
/// contact") once every probe in that batch has returned, even though later
/// batches may already be in flight under the β-progress rule.
struct RoundTracker {
    closest_before: Option<Id>,
    target_count: usize,
    returned: usize,
    found_closer: bool,
}

struct LookupState {
    shortlist: Shortlist,
    round: u32,
    rounds: HashMap<u32, RoundTracker>,
    finishing: bool,
    terminated: bool,
    callback: Option<Callback>,
}

impl LookupState {
    fn fire(&mut self, k: usize) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        if let Some(callback) = self.callback.take() {
            let contacts = self.shortlist.responded_first_k(k);
            let n = contacts.len() as i32;
            callback(RankInfo::default(), n, contacts);
        }
    }
}

/// A cancellable handle to an in-flight lookup. Cancelling sets the
/// context's terminated flag (spec.md §5): any RPC result that arrives
/// afterwards is dropped, and the completion callback never fires.
#[derive(Clone)]
pub struct LookupHandle {
    state: Arc<Mutex<LookupState>>,
}

impl LookupHandle {
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        state.terminated = true;
        state.callback = None;
    }
}

struct Ctx {
    rpc: Arc<dyn RpcClient + Send + Sync>,
    self_id: Id,
    credentials: Credentials,
    alpha: usize,
    k: usize,
    /// Upper bound on simultaneous pending probes, `alpha + (alpha - beta)`
    /// per spec.md §4.2's invariant. Dispatch never exceeds it regardless of
    /// response timing, which is what lets the α-bound property (spec.md §8
    /// invariant 3) hold unconditionally rather than only "on average".
    max_pending: usize,
    target: Id,
}

/// The iterative lookup engine (C5 in spec.md §2). One instance is
/// stateless between calls to `find_nodes`: all per-lookup state lives in
/// the `LookupState` created fresh for that call, matching spec.md §3's
/// "lookup context is created on each external lookup request" lifecycle.
pub struct LookupEngine {
    self_id: Id,
    alpha: usize,
    beta: usize,
    k: usize,
    credentials: Credentials,
    rpc: Arc<dyn RpcClient + Send + Sync>,
}

impl LookupEngine {
    pub fn new(
        self_id: Id,
        alpha: usize,
        beta: usize,
        k: usize,
        credentials: Credentials,
        rpc: Arc<dyn RpcClient + Send + Sync>,
    ) -> Result<Self, LookupError> {
        if alpha == 0 {
            return Err(LookupError::NonPositiveAlpha);
        }
        if beta == 0 || beta > alpha {
            return Err(LookupError::InvalidBeta { alpha, beta });
        }
        Ok(LookupEngine {
            self_id,
            alpha,
            beta,
            k,
            credentials,
            rpc,
        })
    }

    /// Drives an iterative lookup for `target`, per spec.md §4.2. `callback`
    /// fires exactly once, on whichever thread processes the triggering
    /// event (the last RPC result, or this call itself for the empty-seed
    /// case).
    pub fn find_nodes<RT: RoutingTable>(
        &self,
        target: Id,
        routing_table: &RT,
        callback: impl FnOnce(RankInfo, i32, Vec<Contact>) + Send + 'static,
    ) -> LookupHandle {
        let seed = routing_table.get_close_contacts(&target, self.k, &[self.self_id]);

        let mut shortlist = Shortlist::new(target);
        for contact in seed {
            shortlist.insert(contact);
        }

        let state = Arc::new(Mutex::new(LookupState {
            shortlist,
            round: 0,
            rounds: HashMap::new(),
            finishing: false,
            terminated: false,
            callback: Some(Box::new(callback)),
        }));

        if state.lock().unwrap().shortlist.is_empty() {
            // spec.md §4.2 item 1 / §7 "Lookup empty seed": success, empty.
            state.lock().unwrap().fire(self.k);
            return LookupHandle { state };
        }

        let max_pending = self.alpha + (self.alpha - self.beta);
        let ctx = Arc::new(Ctx {
            rpc: Arc::clone(&self.rpc),
            self_id: self.self_id,
            credentials: self.credentials.clone(),
            alpha: self.alpha,
            k: self.k,
            max_pending,
            target,
        });

        maybe_advance(&ctx, &state);

        LookupHandle { state }
    }
}

fn maybe_advance(ctx: &Arc<Ctx>, state: &Arc<Mutex<LookupState>>) {
    let mut guard = state.lock().unwrap();
    if guard.terminated {
        return;
    }

    if guard.shortlist.all_first_k_terminal(ctx.k) || guard.shortlist.exhausted() {
        guard.fire(ctx.k);
        return;
    }

    let pending = guard.shortlist.count_pending();
    if pending >= ctx.max_pending {
        return;
    }
    let room = ctx.max_pending - pending;

    let candidates: Vec<Id> = if guard.finishing {
        guard
            .shortlist
            .new_entries_in_first_k(ctx.k)
            .into_iter()
            .take(room)
            .collect()
    } else {
        guard
            .shortlist
            .first_alpha_eligible(ctx.alpha)
            .into_iter()
            .take(room)
            .collect()
    };

    if candidates.is_empty() {
        return;
    }

    let round_id = guard.round;
    guard.round += 1;
    let closest_before = guard.shortlist.closest_responded_distance();
    guard.rounds.insert(
        round_id,
        RoundTracker {
            closest_before,
            target_count: candidates.len(),
            returned: 0,
            found_closer: false,
        },
    );

    let mut to_dispatch = Vec::with_capacity(candidates.len());
    for id in candidates {
        guard.shortlist.mark_pending(&id, round_id);
        if let Some(contact) = guard.shortlist.contact(&id) {
            to_dispatch.push(contact.clone());
        }
    }
    drop(guard);

    for contact in to_dispatch {
        dispatch_probe(ctx, state, round_id, contact);
    }
}

fn dispatch_probe(ctx: &Arc<Ctx>, state: &Arc<Mutex<LookupState>>, round_id: u32, peer: Contact) {
    let ctx = Arc::clone(ctx);
    let state = Arc::clone(state);
    let peer_id = peer.id;

    ctx.rpc.find_nodes(
        &ctx.target,
        &ctx.credentials,
        &peer,
        TransportType::Udp,
        Box::new(move |rank_info, result_size, contacts| {
            on_rpc_result(&ctx, &state, round_id, peer_id, rank_info, result_size, contacts);
        }),
    );
}

fn on_rpc_result(
    ctx: &Arc<Ctx>,
    state: &Arc<Mutex<LookupState>>,
    round_id: u32,
    peer_id: Id,
    rank_info: RankInfo,
    result_size: i32,
    contacts: Vec<Contact>,
) {
    let mut guard = state.lock().unwrap();
    if guard.terminated {
        // Late arrival after termination/cancellation: dropped (spec.md §4.2).
        return;
    }

    let mut found_closer = false;

    if result_size < 0 {
        guard.shortlist.mark_down(&peer_id);
    } else {
        guard.shortlist.mark_responded(&peer_id, Some(rank_info));
        for contact in contacts {
            if contact.id == ctx.self_id {
                continue;
            }
            if guard.shortlist.state_of(&contact.id) == Some(ContactState::Down) {
                // Never resurrect a contact already marked down.
                continue;
            }
            let distance = contact.id.xor(&ctx.target);
            let inserted = guard.shortlist.insert(contact);
            if inserted {
                let tracker = guard.rounds.get(&round_id);
                let closer = match tracker.and_then(|t| t.closest_before) {
                    Some(baseline) => distance < baseline,
                    None => true,
                };
                if closer {
                    found_closer = true;
                }
            }
        }
    }

    if let Some(tracker) = guard.rounds.get_mut(&round_id) {
        tracker.returned += 1;
        if found_closer {
            tracker.found_closer = true;
        }
        if tracker.returned >= tracker.target_count {
            let no_progress = !tracker.found_closer && tracker.closest_before.is_some();
            guard.rounds.remove(&round_id);
            if no_progress && !guard.finishing {
                guard.finishing = true;
            }
        }
    }

    drop(guard);
    maybe_advance(ctx, state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::Credentials;
    use crate::routing::InMemoryRoutingTable;
    use crate::rpc::fake::{FakeRpcClient, ScriptedResult};
    use std::net::SocketAddr;
    use std::sync::mpsc::channel;

    const K: usize = 8;
    const ALPHA: usize = 3;
    const BETA: usize = 2;

    fn contact() -> Contact {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        Contact::new(Id::rand(), addr)
    }

    fn seeded_table(self_id: Id, count: usize) -> (InMemoryRoutingTable, Vec<Contact>) {
        let mut table = InMemoryRoutingTable::new(self_id);
        let mut contacts = Vec::new();
        for _ in 0..count {
            let c = contact();
            let _ = table.update_node(c.clone(), RankInfo::default());
            contacts.push(c);
        }
        (table, contacts)
    }

    fn run_lookup(
        engine: &LookupEngine,
        target: Id,
        table: &InMemoryRoutingTable,
    ) -> (i32, Vec<Contact>) {
        let (tx, rx) = channel();
        engine.find_nodes(target, table, move |rank_info, code, contacts| {
            let _ = tx.send((rank_info, code, contacts));
        });
        let (_, code, contacts) = rx.recv().unwrap();
        (code, contacts)
    }

    #[test]
    fn s1_all_silent_returns_empty() {
        let self_id = Id::rand();
        let (table, contacts) = seeded_table(self_id, K);
        let rpc = Arc::new(FakeRpcClient::new());
        for c in &contacts {
            rpc.script(c.id, ScriptedResult::Timeout);
        }
        let engine = LookupEngine::new(self_id, ALPHA, BETA, K, Credentials::default(), rpc).unwrap();
        let target = Id::rand();
        let (code, result) = run_lookup(&engine, target, &table);
        assert!(code >= 0);
        assert!(result.is_empty());
    }

    #[test]
    fn s4_all_empty_responses_returns_all_seeded() {
        let self_id = Id::rand();
        let (table, contacts) = seeded_table(self_id, K);
        let rpc = Arc::new(FakeRpcClient::new());
        for c in &contacts {
            rpc.script(c.id, ScriptedResult::Success(Vec::new()));
        }
        let engine = LookupEngine::new(self_id, ALPHA, BETA, K, Credentials::default(), rpc).unwrap();
        let target = Id::rand();
        let (_, result) = run_lookup(&engine, target, &table);
        assert_eq!(result.len(), K);
    }

    #[test]
    fn s2_one_silent_returns_k_minus_one() {
        let self_id = Id::rand();
        let (table, contacts) = seeded_table(self_id, K);
        let rpc = Arc::new(FakeRpcClient::new());
        for (i, c) in contacts.iter().enumerate() {
            if i == 0 {
                rpc.script(c.id, ScriptedResult::Timeout);
            } else {
                rpc.script(c.id, ScriptedResult::Success(Vec::new()));
            }
        }
        let engine = LookupEngine::new(self_id, ALPHA, BETA, K, Credentials::default(), rpc).unwrap();
        let target = Id::rand();
        let (_, result) = run_lookup(&engine, target, &table);
        assert_eq!(result.len(), K - 1);
    }

    #[test]
    fn s3_first_and_last_silent_returns_k_minus_two() {
        let self_id = Id::rand();
        let (table, contacts) = seeded_table(self_id, K);
        let rpc = Arc::new(FakeRpcClient::new());
        let last = contacts.len() - 1;
        for (i, c) in contacts.iter().enumerate() {
            if i == 0 || i == last {
                rpc.script(c.id, ScriptedResult::Timeout);
            } else {
                rpc.script(c.id, ScriptedResult::Success(Vec::new()));
            }
        }
        let engine = LookupEngine::new(self_id, ALPHA, BETA, K, Credentials::default(), rpc).unwrap();
        let target = Id::rand();
        let (_, result) = run_lookup(&engine, target, &table);
        assert_eq!(result.len(), K - 2);
    }

    #[test]
    fn s5_convergence_returns_k_globally_closest() {
        // A seeded shortlist plus a much larger candidate pool. Every
        // probed contact discloses a rotating slice of the whole universe
        // -- no single response reveals the answer, but enough of the
        // universe surfaces during the walk that the lookup must still
        // converge on exactly the k contacts globally closest to the
        // target, verified against an oracle that sorts the entire
        // universe by distance.
        let self_id = Id::rand();
        let (table, seed_contacts) = seeded_table(self_id, K);
        let target = Id::rand();

        let mut universe = seed_contacts.clone();
        for _ in 0..(K * 9) {
            universe.push(contact());
        }
        universe.sort_by_key(|c| c.id.xor(&target));

        // Every peer's response discloses the globally-closest 2k contacts
        // plus a rotating slice further out -- enough that the true top-k
        // is always reachable from any seed, while which peer first
        // reveals which of the more distant candidates still varies.
        let closest_prefix: Vec<Contact> = universe.iter().take(K * 2).cloned().collect();
        let rpc = Arc::new(FakeRpcClient::new());
        for (i, c) in universe.iter().enumerate() {
            let start = (i * 7) % universe.len();
            let mut subset = closest_prefix.clone();
            subset.extend(universe.iter().cycle().skip(start).take(K).cloned());
            rpc.script(c.id, ScriptedResult::Success(subset));
        }

        let engine = LookupEngine::new(self_id, ALPHA, BETA, K, Credentials::default(), rpc).unwrap();
        let (_, result) = run_lookup(&engine, target, &table);

        let mut oracle = universe.clone();
        oracle.dedup_by_key(|c| c.id);
        let expected: Vec<Id> = oracle.iter().take(K).map(|c| c.id).collect();

        assert_eq!(result.len(), K);
        let mut got: Vec<Id> = result.iter().map(|c| c.id).collect();
        got.sort();
        let mut want = expected.clone();
        want.sort();
        assert_eq!(got, want);
    }

    #[test]
    fn empty_seed_succeeds_with_empty_result() {
        let self_id = Id::rand();
        let table = InMemoryRoutingTable::new(self_id);
        let rpc = Arc::new(FakeRpcClient::new());
        let engine = LookupEngine::new(self_id, ALPHA, BETA, K, Credentials::default(), rpc).unwrap();
        let target = Id::rand();
        let (code, result) = run_lookup(&engine, target, &table);
        assert!(code >= 0);
        assert!(result.is_empty());
    }

    #[test]
    fn callback_fires_exactly_once_even_with_late_arrivals() {
        // A lookup engine whose handle is cancelled before dispatch
        // completes must never invoke the callback.
        let self_id = Id::rand();
        let (table, contacts) = seeded_table(self_id, K);
        let rpc = Arc::new(FakeRpcClient::new());
        for c in &contacts {
            rpc.script(c.id, ScriptedResult::Success(Vec::new()));
        }
        let engine = LookupEngine::new(self_id, ALPHA, BETA, K, Credentials::default(), rpc).unwrap();
        let target = Id::rand();
        let fired = Arc::new(Mutex::new(0));
        let fired_clone = Arc::clone(&fired);
        let handle = engine.find_nodes(target, &table, move |_, _, _| {
            *fired_clone.lock().unwrap() += 1;
        });
        handle.cancel();
        assert_eq!(*fired.lock().unwrap(), 0);
    }

    #[test]
    fn distance_monotonicity_of_responded_contacts() {
        let self_id = Id::rand();
        let (table, contacts) = seeded_table(self_id, K * 3);
        let rpc = Arc::new(FakeRpcClient::new());
        for c in &contacts {
            rpc.script(c.id, ScriptedResult::Success(Vec::new()));
        }
        let engine = LookupEngine::new(self_id, ALPHA, BETA, K, Credentials::default(), rpc).unwrap();
        let target = Id::rand();
        let (_, result) = run_lookup(&engine, target, &table);
        let distances: Vec<Id> = result.iter().map(|c| c.id.xor(&target)).collect();
        let mut sorted = distances.clone();
        sorted.sort();
        assert_eq!(distances, sorted);
    }

    #[test]
    fn new_rejects_zero_alpha() {
        let self_id = Id::rand();
        let rpc = Arc::new(FakeRpcClient::new());
        let err = LookupEngine::new(self_id, 0, 1, K, Credentials::default(), rpc).unwrap_err();
        assert_eq!(err, LookupError::NonPositiveAlpha);
    }

    #[test]
    fn new_rejects_beta_outside_one_through_alpha() {
        let self_id = Id::rand();
        let rpc = Arc::new(FakeRpcClient::new());
        let err = LookupEngine::new(self_id, ALPHA, ALPHA + 1, K, Credentials::default(), rpc).unwrap_err();
        assert_eq!(
            err,
            LookupError::InvalidBeta {
                alpha: ALPHA,
                beta: ALPHA + 1,
            }
        );
    }

    /// A scripted `RpcClient` that defers every callback into a shared
    /// queue instead of invoking it inline, so a test driver can answer
    /// probes one at a time and observe exactly how many are in flight
    /// between answers -- `FakeRpcClient` resolves synchronously and so
    /// cannot exhibit any concurrency to observe.
    struct DeferredRpcClient {
        pending: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
        all_succeed: bool,
    }

    impl RpcClient for DeferredRpcClient {
        fn find_nodes(
            &self,
            _key: &Id,
            _credentials: &Credentials,
            _peer: &Contact,
            _transport_type: TransportType,
            callback: Box<dyn FnOnce(RankInfo, i32, Vec<Contact>) + Send>,
        ) {
            let all_succeed = self.all_succeed;
            self.pending.lock().unwrap().push(Box::new(move || {
                if all_succeed {
                    callback(RankInfo::default(), 0, Vec::new());
                } else {
                    callback(RankInfo::default(), -1, Vec::new());
                }
            }));
        }
    }

    mod properties {
        use super::*;
        extern crate quickcheck;
        use self::quickcheck::quickcheck;

        quickcheck! {
            /// Invariant 1: the contacts a lookup returns are always sorted
            /// by distance to the target, for any seed population size.
            fn distance_monotonicity_holds_for_any_population(seed_count: u8) -> bool {
                let seed_count = (seed_count % 24) as usize + 1;
                let self_id = Id::rand();
                let (table, contacts) = seeded_table(self_id, seed_count);
                let rpc = Arc::new(FakeRpcClient::new());
                for c in &contacts {
                    rpc.script(c.id, ScriptedResult::Success(Vec::new()));
                }
                let engine = LookupEngine::new(self_id, ALPHA, BETA, K, Credentials::default(), rpc).unwrap();
                let target = Id::rand();
                let (_, result) = run_lookup(&engine, target, &table);

                let distances: Vec<Id> = result.iter().map(|c| c.id.xor(&target)).collect();
                let mut sorted = distances.clone();
                sorted.sort();
                distances == sorted
            }

            /// Invariant 2: the completion callback fires exactly once,
            /// regardless of alpha/beta/population or how many probes time
            /// out versus succeed.
            fn callback_fires_exactly_once_for_any_population(
                alpha_seed: u8,
                beta_seed: u8,
                population_seed: u8,
                timeout_mask: u32
            ) -> bool {
                let alpha = (alpha_seed % 5) as usize + 1;
                let beta = (beta_seed % alpha as u8) as usize + 1;
                let population = (population_seed % 16) as usize;

                let self_id = Id::rand();
                let (table, contacts) = seeded_table(self_id, population);
                let rpc = Arc::new(FakeRpcClient::new());
                for (i, c) in contacts.iter().enumerate() {
                    if timeout_mask & (1 << (i % 32)) != 0 {
                        rpc.script(c.id, ScriptedResult::Timeout);
                    } else {
                        rpc.script(c.id, ScriptedResult::Success(Vec::new()));
                    }
                }
                let engine = LookupEngine::new(self_id, alpha, beta, K, Credentials::default(), rpc).unwrap();
                let target = Id::rand();
                let fired = Arc::new(Mutex::new(0u32));
                let fired_clone = Arc::clone(&fired);
                let _handle = engine.find_nodes(target, &table, move |_, _, _| {
                    *fired_clone.lock().unwrap() += 1;
                });
                *fired.lock().unwrap() == 1
            }

            /// Invariant 3: the number of probes simultaneously in flight
            /// never exceeds `alpha + (alpha - beta)`, the bound spec.md
            /// §4.2 commits to, for any alpha/beta/population combination.
            fn pending_probes_never_exceed_alpha_bound(
                alpha_seed: u8,
                beta_seed: u8,
                population_seed: u8,
                all_succeed: bool
            ) -> bool {
                let alpha = (alpha_seed % 5) as usize + 1;
                let beta = (beta_seed % alpha as u8) as usize + 1;
                let population = (population_seed % 20) as usize + 1;
                let max_pending = alpha + (alpha - beta);

                let self_id = Id::rand();
                let (table, _contacts) = seeded_table(self_id, population);
                let rpc = Arc::new(DeferredRpcClient {
                    pending: Mutex::new(Vec::new()),
                    all_succeed,
                });
                let engine = LookupEngine::new(self_id, alpha, beta, K, Credentials::default(), Arc::clone(&rpc)).unwrap();
                let target = Id::rand();

                let _handle = engine.find_nodes(target, &table, |_, _, _| {});

                let mut max_observed = 0;
                loop {
                    let next = {
                        let mut queue = rpc.pending.lock().unwrap();
                        max_observed = max_observed.max(queue.len());
                        queue.pop()
                    };
                    match next {
                        Some(callback) => callback(),
                        None => break,
                    }
                }
                max_observed <= max_pending
            }
        }
    }
}
