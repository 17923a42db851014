//! Single owner of the node state.
//!
//! Listener tasks and peer links feed [`Event`]s in; the loop hands each to
//! the `DiscoveryNode` and carries out the resulting actions. Nothing else
//! touches the registration tables, so no locking is needed.

use std::collections::{HashMap, VecDeque};

use tokio::sync::{broadcast, mpsc, watch};

use chordcast_core::message::Response;
use chordcast_core::wire::Frame;
use chordcast_services::{Action, DiscoveryNode, NodeSnapshot, OriginId};

use crate::event::{Event, EventReceiver};
use crate::peer::PeerJob;

pub type PeerSenders = HashMap<String, mpsc::UnboundedSender<PeerJob>>;

pub struct EventLoop {
    node: DiscoveryNode,
    events: EventReceiver,
    connections: HashMap<OriginId, mpsc::UnboundedSender<Frame>>,
    peers: PeerSenders,
    snapshots: watch::Sender<NodeSnapshot>,
    published: (u64, bool, usize),
    shutdown: broadcast::Receiver<()>,
}

impl EventLoop {
    pub fn new(
        node: DiscoveryNode,
        events: EventReceiver,
        peers: PeerSenders,
        snapshots: watch::Sender<NodeSnapshot>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            published: node.state_version(),
            node,
            events,
            connections: HashMap::new(),
            peers,
            snapshots,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(node = %self.node.id(), peers = self.peers.len(), "event loop started");
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!(node = %self.node.id(), "event loop shutting down");
                    return;
                }

                event = self.events.recv() => {
                    let Some(event) = event else { return };
                    self.handle(event);
                    self.publish_if_changed();
                }
            }
        }
    }

    fn handle(&mut self, event: Event) {
        let actions = match event {
            Event::Opened { origin, replies } => {
                self.connections.insert(origin, replies);
                return;
            }
            Event::Closed { origin } => {
                self.connections.remove(&origin);
                self.node.connection_closed(origin);
                return;
            }
            Event::Request { ctx, request } => self.node.handle_request(ctx, request),
            Event::PeerReply { handle, response } => self.node.handle_peer_reply(handle, response),
            Event::PeerFailed { handle, reason } => self.node.handle_peer_unreachable(handle, &reason),
        };
        self.apply(actions);
    }

    /// Push a new snapshot to status readers only when the node changed.
    fn publish_if_changed(&mut self) {
        let version = self.node.state_version();
        if version != self.published {
            self.published = version;
            self.snapshots.send_replace(self.node.snapshot());
        }
    }

    fn apply(&mut self, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Reply {
                    origin,
                    request_id,
                    hops,
                    response,
                } => self.reply(origin, request_id, hops, &response),
                Action::Forward {
                    peer,
                    handle,
                    hops,
                    request,
                } => {
                    let sent = match self.peers.get(&peer.id) {
                        Some(link) => link.send(PeerJob { handle, hops, request }).is_ok(),
                        None => false,
                    };
                    if !sent {
                        let reason = format!("no link to {}", peer.id);
                        queue.extend(self.node.handle_peer_unreachable(handle, &reason));
                    }
                }
            }
        }
    }

    fn reply(&mut self, origin: OriginId, request_id: u64, hops: u8, response: &Response) {
        let mut frame = match response.to_frame(request_id) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(origin, error = %e, "failed to encode reply");
                return;
            }
        };
        frame.hops = hops;
        match self.connections.get(&origin) {
            Some(conn) => {
                if conn.send(frame).is_err() {
                    self.connections.remove(&origin);
                }
            }
            None => tracing::debug!(origin, request_id, "reply for closed connection dropped"),
        }
    }
}
