//! Messages flowing into the node's event loop.

use tokio::sync::mpsc;

use chordcast_core::message::{Request, Response};
use chordcast_core::wire::Frame;
use chordcast_services::{Handle, OriginId, RequestContext};

#[derive(Debug)]
pub enum Event {
    /// A registrant or peer node connected. Replies for `origin` go to
    /// `replies`.
    Opened {
        origin: OriginId,
        replies: mpsc::UnboundedSender<Frame>,
    },
    Request {
        ctx: RequestContext,
        request: Request,
    },
    Closed {
        origin: OriginId,
    },
    PeerReply {
        handle: Handle,
        response: Response,
    },
    PeerFailed {
        handle: Handle,
        reason: String,
    },
}

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;
