//! Request dispatch.
//!
//! Decoded requests are matched exhaustively here and handed to a
//! [`RequestHandler`]. Handlers never perform I/O; they describe what should
//! happen as [`Action`]s which the transport carries out.

use chordcast_core::message::{
    CensusRequest, LookupByTopicsRequest, RegisterRequest, Request, Response,
};
use chordcast_core::topology::RingNode;

use crate::correlator::{Handle, Origin, OriginId};

/// Where a request came from and how far it has travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub origin: OriginId,
    pub request_id: u64,
    pub hops: u8,
    /// Sent by another ring node on behalf of a registrant.
    pub forwarded: bool,
}

impl RequestContext {
    /// A request straight from a registrant.
    pub fn client(origin: OriginId, request_id: u64) -> Self {
        Self {
            origin,
            request_id,
            hops: 0,
            forwarded: false,
        }
    }

    pub fn reply_to(&self) -> Origin {
        Origin {
            conn: self.origin,
            request_id: self.request_id,
            hops: self.hops,
        }
    }
}

/// Side effects requested by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Answer a request on the connection it arrived on.
    Reply {
        origin: OriginId,
        request_id: u64,
        hops: u8,
        response: Response,
    },
    /// Send a sub-request to another ring node. Its reply or failure must be
    /// fed back with `handle`.
    Forward {
        peer: RingNode,
        handle: Handle,
        hops: u8,
        request: Request,
    },
}

impl Action {
    pub fn reply(to: Origin, response: Response) -> Self {
        Action::Reply {
            origin: to.conn,
            request_id: to.request_id,
            hops: to.hops,
            response,
        }
    }
}

/// One method per request kind.
pub trait RequestHandler {
    fn on_register(&mut self, ctx: &RequestContext, req: RegisterRequest, out: &mut Vec<Action>);

    fn on_is_ready(&mut self, ctx: &RequestContext, out: &mut Vec<Action>);

    fn on_lookup_by_topics(
        &mut self,
        ctx: &RequestContext,
        req: LookupByTopicsRequest,
        out: &mut Vec<Action>,
    );

    fn on_lookup_all(&mut self, ctx: &RequestContext, out: &mut Vec<Action>);

    fn on_census(&mut self, ctx: &RequestContext, req: CensusRequest, out: &mut Vec<Action>);
}

pub fn dispatch<H: RequestHandler + ?Sized>(
    handler: &mut H,
    ctx: &RequestContext,
    request: Request,
    out: &mut Vec<Action>,
) {
    match request {
        Request::Register(req) => handler.on_register(ctx, req, out),
        Request::IsReady => handler.on_is_ready(ctx, out),
        Request::LookupByTopics(req) => handler.on_lookup_by_topics(ctx, req, out),
        Request::LookupAllPublishers => handler.on_lookup_all(ctx, out),
        Request::Census(req) => handler.on_census(ctx, req, out),
    }
}
