//! Discovery node state machine.
//!
//! A `DiscoveryNode` owns everything one ring member knows: its router and
//! finger table, the registrants it is responsible for, the correlator for
//! requests it has forwarded, and whether the system has reached its
//! readiness quorum. It is driven entirely by events (an inbound request, a
//! peer reply, a peer failure, a closed connection) and answers each with a
//! list of [`Action`]s. The daemon runs one per process inside its event loop;
//! tests run several side by side.

use std::sync::Arc;

use serde::Serialize;

use chordcast_core::config::{CapacityConfig, ChordcastConfig, QuorumConfig};
use chordcast_core::message::{
    CensusRequest, CensusResponse, Dissemination, IsReadyResponse, LookupByTopicsRequest,
    LookupResponse, RegisterRequest, RegisterResponse, Request, Response, Role, Tally,
};
use chordcast_core::topology::RingNode;

use crate::correlator::{
    Aggregate, CensusPurpose, Completed, Correlator, Handle, JobId, Origin, OriginId, Progress,
};
use crate::finger::{FingerEntry, FingerTable};
use crate::handler::{dispatch, Action, RequestContext, RequestHandler};
use crate::lookup::{LookupEngine, TopicAnswer};
use crate::registry::{RegistrantRecord, RegistrationStore};
use crate::ring::{Ring, RingError};
use crate::router::{Router, TopicHashFn};

/// The parts of the configuration a node consults while answering.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub quorum: QuorumConfig,
    pub capacity: CapacityConfig,
    pub dissemination: Dissemination,
    pub max_hops: u8,
}

impl NodeSettings {
    pub fn from_config(config: &ChordcastConfig) -> Self {
        Self {
            quorum: config.quorum.clone(),
            capacity: config.capacity.clone(),
            dissemination: config.dissemination,
            max_hops: u8::try_from(config.effective_max_hops()).unwrap_or(u8::MAX),
        }
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self::from_config(&ChordcastConfig::default())
    }
}

/// Point-in-time view of a node, published for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub node: RingNode,
    pub address_bits: u32,
    pub dissemination: Dissemination,
    /// Global readiness, latched once a census met the quorum.
    pub ready: bool,
    /// Whether this node's own tables alone meet the quorum.
    pub local_quorum_met: bool,
    pub publishers: usize,
    pub subscribers: usize,
    pub brokers: usize,
    pub pending_forwards: usize,
    pub fingers: Vec<FingerEntry>,
    pub registrations: Vec<RegistrantRecord>,
}

pub struct DiscoveryNode {
    router: Router,
    store: RegistrationStore,
    correlator: Correlator,
    settings: NodeSettings,
    ready: bool,
}

impl DiscoveryNode {
    pub fn new(node_id: &str, ring: Arc<Ring>, settings: NodeSettings) -> Result<Self, RingError> {
        let fingers = FingerTable::build(node_id, &ring)?;
        Ok(Self {
            router: Router::new(ring, fingers, settings.max_hops),
            store: RegistrationStore::new(settings.capacity.clone()),
            correlator: Correlator::new(),
            settings,
            ready: false,
        })
    }

    pub fn with_topic_hasher(mut self, hasher: TopicHashFn) -> Self {
        self.router = self.router.with_topic_hasher(hasher);
        self
    }

    pub fn id(&self) -> &str {
        &self.router.local().id
    }

    pub fn local(&self) -> &RingNode {
        self.router.local()
    }

    pub fn fingers(&self) -> &FingerTable {
        self.router.fingers()
    }

    /// Nodes this node may forward to.
    pub fn peers(&self) -> Vec<RingNode> {
        let me = self.id().to_string();
        self.fingers()
            .distinct_nodes()
            .into_iter()
            .filter(|n| n.id != me)
            .collect()
    }

    pub fn store(&self) -> &RegistrationStore {
        &self.store
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn pending_forwards(&self) -> usize {
        self.correlator.pending()
    }

    // ── Events ────────────────────────────────────────────────────────────────

    pub fn handle_request(&mut self, ctx: RequestContext, request: Request) -> Vec<Action> {
        let mut out = Vec::new();
        if let Err(e) = self.check_hops(&ctx, &request) {
            tracing::warn!(node = %self.id(), error = %e, "dropping request");
            out.push(Action::reply(ctx.reply_to(), failure_response(request, &e.to_string())));
            return out;
        }
        dispatch(self, &ctx, request, &mut out);
        out
    }

    pub fn handle_peer_reply(&mut self, handle: Handle, response: Response) -> Vec<Action> {
        let progress = self.correlator.on_response(handle, response);
        self.progress(progress)
    }

    pub fn handle_peer_unreachable(&mut self, handle: Handle, reason: &str) -> Vec<Action> {
        if let Some(pending) = self.correlator.pending_forward(handle) {
            tracing::warn!(node = %self.id(), peer = %pending.peer.id, reason, "peer unreachable");
        }
        let progress = self.correlator.on_failure(handle, reason);
        self.progress(progress)
    }

    /// The inbound connection `origin` is gone; nothing more can be sent on it.
    pub fn connection_closed(&mut self, origin: OriginId) {
        let dropped = self.correlator.drop_origin(origin);
        if dropped > 0 {
            tracing::debug!(node = %self.id(), origin, dropped, "abandoned requests of closed connection");
        }
    }

    /// Moves whenever a fresh [`snapshot`](Self::snapshot) would differ.
    pub fn state_version(&self) -> (u64, bool, usize) {
        (self.store.revision(), self.ready, self.correlator.pending())
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let quorum = &self.settings.quorum;
        NodeSnapshot {
            node: self.local().clone(),
            address_bits: self.router.ring().address_bits(),
            dissemination: self.settings.dissemination,
            ready: self.ready,
            local_quorum_met: self.store.is_ready(quorum.publishers, quorum.subscribers),
            publishers: self.store.count(Role::Publisher),
            subscribers: self.store.count(Role::Subscriber),
            brokers: self.store.count(Role::Broker),
            pending_forwards: self.correlator.pending(),
            fingers: self.fingers().entries().to_vec(),
            registrations: self.store.records(),
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn check_hops(&self, ctx: &RequestContext, request: &Request) -> Result<(), RingError> {
        match request {
            // A census legitimately visits every node once.
            Request::Census(_) => {
                let max = u8::try_from(self.router.ring().len()).unwrap_or(u8::MAX);
                if ctx.hops > max {
                    return Err(RingError::RoutingLoop { hops: ctx.hops, max });
                }
                Ok(())
            }
            _ => self.router.check_hops(ctx.hops),
        }
    }

    fn progress(&mut self, progress: Progress) -> Vec<Action> {
        let mut out = Vec::new();
        if let Progress::Complete(done) = progress {
            self.complete(done, &mut out);
        }
        out
    }

    fn complete(&mut self, done: Completed, out: &mut Vec<Action>) {
        let Completed { origin, aggregate } = done;
        match aggregate {
            Aggregate::Register { failure } => {
                let response = match failure {
                    None => RegisterResponse::success(),
                    Some(reason) => RegisterResponse::failure(reason),
                };
                out.push(Action::reply(origin, Response::Register(response)));
            }
            Aggregate::Lookup {
                publishers,
                check_again,
            } => {
                let response = if check_again {
                    LookupResponse::check_again()
                } else {
                    LookupResponse::success(publishers.into_values().collect())
                };
                out.push(Action::reply(origin, Response::LookupByTopics(response)));
            }
            Aggregate::Census {
                purpose,
                tally,
                complete,
            } => self.finish_census(origin, purpose, tally, complete, out),
        }
    }

    fn forward(&mut self, job: JobId, peer: RingNode, hops: u8, request: Request, out: &mut Vec<Action>) {
        let handle = self.correlator.forward(job, &peer);
        tracing::debug!(
            node = %self.id(),
            peer = %peer.id,
            handle,
            hops,
            kind = ?request.kind(),
            "forwarding"
        );
        out.push(Action::Forward {
            peer,
            handle,
            hops,
            request,
        });
    }

    fn quorum_met(&self, tally: &Tally) -> bool {
        let q = &self.settings.quorum;
        let brokers_ok = match self.settings.dissemination {
            Dissemination::Direct => true,
            Dissemination::Broker => tally.brokers.len() >= q.brokers,
        };
        tally.publishers.len() >= q.publishers && tally.subscribers.len() >= q.subscribers && brokers_ok
    }

    /// Walk the ring collecting every node's registrants, then act on the
    /// result according to `purpose`.
    fn start_census(&mut self, origin: Origin, purpose: CensusPurpose, out: &mut Vec<Action>) {
        let tally = self.store.tally();
        let next = self.fingers().successor().clone();
        if next.id == self.id() {
            self.finish_census(origin, purpose, tally, true, out);
            return;
        }
        let job = self.correlator.open(
            origin,
            Aggregate::Census {
                purpose,
                tally: tally.clone(),
                complete: true,
            },
        );
        let request = Request::Census(CensusRequest {
            origin: self.id().to_string(),
            tally,
        });
        self.forward(job, next, origin.hops.saturating_add(1), request, out);
    }

    fn finish_census(
        &mut self,
        origin: Origin,
        purpose: CensusPurpose,
        tally: Tally,
        complete: bool,
        out: &mut Vec<Action>,
    ) {
        if purpose == CensusPurpose::Relay {
            out.push(Action::reply(origin, Response::Census(CensusResponse { tally, complete })));
            return;
        }

        if !complete {
            tracing::warn!(node = %self.id(), "census did not reach every node");
        }
        let ready = self.quorum_met(&tally);
        if ready && !self.ready {
            tracing::info!(
                node = %self.id(),
                publishers = tally.publishers.len(),
                subscribers = tally.subscribers.len(),
                brokers = tally.brokers.len(),
                "readiness quorum reached"
            );
            self.ready = true;
        }

        let engine = LookupEngine::new(&tally, self.ready, self.settings.dissemination);
        match purpose {
            CensusPurpose::IsReady => {
                out.push(Action::reply(
                    origin,
                    Response::IsReady(IsReadyResponse { ready: self.ready }),
                ));
            }
            CensusPurpose::LookupAll => {
                out.push(Action::reply(origin, Response::LookupAllPublishers(engine.all())));
            }
            CensusPurpose::LookupTopics(topics) => match engine.by_topics() {
                TopicAnswer::Reply(response) => {
                    out.push(Action::reply(origin, Response::LookupByTopics(response)));
                }
                TopicAnswer::AskOwners => self.lookup_fanout(origin, &topics, out),
            },
            CensusPurpose::Relay => {}
        }
    }

    /// Answer the topics this node owns and ask the owners of the rest.
    fn lookup_fanout(&mut self, origin: Origin, topics: &[String], out: &mut Vec<Action>) {
        let plan = self.router.plan(topics);
        let local = LookupResponse::success(self.store.publishers_for_topics(&plan.local));
        if plan.is_local_only() {
            out.push(Action::reply(origin, Response::LookupByTopics(local)));
            return;
        }
        let job = self.correlator.open(origin, Aggregate::lookup(local.publishers));
        for hop in plan.forwards {
            let request = Request::LookupByTopics(LookupByTopicsRequest { topics: hop.topics });
            self.forward(job, hop.node, origin.hops.saturating_add(1), request, out);
        }
    }
}

impl RequestHandler for DiscoveryNode {
    fn on_register(&mut self, ctx: &RequestContext, req: RegisterRequest, out: &mut Vec<Action>) {
        let role = match req.role() {
            Ok(role) => role,
            Err(e) => {
                tracing::warn!(node = %self.id(), id = %req.info.id, error = %e, "rejecting registration");
                out.push(Action::reply(
                    ctx.reply_to(),
                    Response::Register(RegisterResponse::failure(e.to_string())),
                ));
                return;
            }
        };

        let plan = self.router.plan(&req.topics);
        let mut failure = None;
        // Registrants without topics are kept where they arrived.
        if !plan.local.is_empty() || plan.forwards.is_empty() {
            let record = RegistrantRecord::new(role, req.info.clone(), plan.local.clone());
            match self.store.register(record) {
                Ok(()) => tracing::info!(
                    node = %self.id(),
                    id = %req.info.id,
                    ?role,
                    topics = ?plan.local,
                    "registered"
                ),
                Err(e) => {
                    tracing::warn!(node = %self.id(), id = %req.info.id, error = %e, "registration refused");
                    failure = Some(e.to_string());
                }
            }
        }

        if plan.forwards.is_empty() {
            let response = match failure {
                None => RegisterResponse::success(),
                Some(reason) => RegisterResponse::failure(reason),
            };
            out.push(Action::reply(ctx.reply_to(), Response::Register(response)));
            return;
        }

        let job = self.correlator.open(ctx.reply_to(), Aggregate::Register { failure });
        for hop in plan.forwards {
            let request = Request::Register(req.narrowed(hop.topics));
            self.forward(job, hop.node, ctx.hops.saturating_add(1), request, out);
        }
    }

    fn on_is_ready(&mut self, ctx: &RequestContext, out: &mut Vec<Action>) {
        if self.ready {
            out.push(Action::reply(
                ctx.reply_to(),
                Response::IsReady(IsReadyResponse { ready: true }),
            ));
            return;
        }
        self.start_census(ctx.reply_to(), CensusPurpose::IsReady, out);
    }

    fn on_lookup_by_topics(
        &mut self,
        ctx: &RequestContext,
        req: LookupByTopicsRequest,
        out: &mut Vec<Action>,
    ) {
        // The node that accepted the lookup already established readiness.
        if ctx.forwarded {
            self.lookup_fanout(ctx.reply_to(), &req.topics, out);
            return;
        }
        if self.ready && self.settings.dissemination == Dissemination::Direct {
            self.lookup_fanout(ctx.reply_to(), &req.topics, out);
            return;
        }
        self.start_census(ctx.reply_to(), CensusPurpose::LookupTopics(req.topics), out);
    }

    fn on_lookup_all(&mut self, ctx: &RequestContext, out: &mut Vec<Action>) {
        self.start_census(ctx.reply_to(), CensusPurpose::LookupAll, out);
    }

    fn on_census(&mut self, ctx: &RequestContext, req: CensusRequest, out: &mut Vec<Action>) {
        let CensusRequest { origin, mut tally } = req;
        tally.merge(self.store.tally());

        let next = self.fingers().successor().clone();
        if next.id == origin || next.id == self.id() {
            out.push(Action::reply(
                ctx.reply_to(),
                Response::Census(CensusResponse {
                    tally,
                    complete: true,
                }),
            ));
            return;
        }

        let job = self.correlator.open(
            ctx.reply_to(),
            Aggregate::Census {
                purpose: CensusPurpose::Relay,
                tally: tally.clone(),
                complete: true,
            },
        );
        let request = Request::Census(CensusRequest { origin, tally });
        self.forward(job, next, ctx.hops.saturating_add(1), request, out);
    }
}

/// The reply sent when a request cannot be processed at all.
fn failure_response(request: Request, reason: &str) -> Response {
    match request {
        Request::Register(_) => Response::Register(RegisterResponse::failure(reason)),
        Request::IsReady => Response::IsReady(IsReadyResponse { ready: false }),
        Request::LookupByTopics(_) => Response::LookupByTopics(LookupResponse::check_again()),
        Request::LookupAllPublishers => Response::LookupAllPublishers(LookupResponse::check_again()),
        Request::Census(req) => Response::Census(CensusResponse {
            tally: req.tally,
            complete: false,
        }),
    }
}
