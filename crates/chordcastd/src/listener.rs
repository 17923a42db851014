//! Inbound discovery connections.
//!
//! Every accepted TCP connection gets an origin id, a reader task that
//! decodes requests into events, and a writer task that drains the replies
//! the event loop addresses to that origin.

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use chordcast_core::message::Request;
use chordcast_core::wire::Frame;
use chordcast_services::{read_frame, write_frame, OriginId, RequestContext};

use crate::event::{Event, EventSender};

pub struct DiscoveryListener {
    listener: TcpListener,
    events: EventSender,
    next_origin: OriginId,
    shutdown: broadcast::Receiver<()>,
}

impl DiscoveryListener {
    pub fn new(listener: TcpListener, events: EventSender, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            listener,
            events,
            next_origin: 0,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("listener shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let _ = stream.set_nodelay(true);
                    self.next_origin += 1;
                    let origin = self.next_origin;
                    tracing::debug!(origin, %peer, "connection accepted");

                    let (reader, writer) = stream.into_split();
                    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
                    if self.events.send(Event::Opened { origin, replies: reply_tx }).is_err() {
                        return Ok(());
                    }
                    tokio::spawn(write_replies(origin, writer, reply_rx));
                    tokio::spawn(read_requests(origin, reader, self.events.clone()));
                }
            }
        }
    }
}

/// Decode requests until the peer hangs up or sends something invalid.
async fn read_requests<R: AsyncRead + Unpin>(origin: OriginId, mut reader: R, events: EventSender) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(origin, error = %e, "closing connection after bad frame");
                break;
            }
        };
        if !frame.kind.is_request() {
            tracing::warn!(origin, kind = ?frame.kind, "closing connection after unsolicited reply");
            break;
        }
        let request = match Request::from_frame(&frame) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(origin, error = %e, "closing connection after malformed request");
                break;
            }
        };
        let ctx = RequestContext {
            origin,
            request_id: frame.request_id,
            hops: frame.hops,
            forwarded: frame.is_forwarded(),
        };
        if events.send(Event::Request { ctx, request }).is_err() {
            return;
        }
    }
    let _ = events.send(Event::Closed { origin });
}

async fn write_replies<W: AsyncWrite + Unpin>(
    origin: OriginId,
    mut writer: W,
    mut replies: mpsc::UnboundedReceiver<Frame>,
) {
    while let Some(frame) = replies.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            tracing::warn!(origin, error = %e, "failed to write reply");
            break;
        }
    }
}
