//! Outbound links to other ring nodes.
//!
//! One task per finger node. Forwards are written over a lazily opened
//! connection as soon as they arrive, without waiting for earlier replies;
//! a reader task hands replies back and they are matched to forwards by
//! handle, in whatever order the peer answers. Each forward waits at most
//! the configured peer timeout. A write failure or a lost connection fails
//! every forward still waiting on it, and the next forward reconnects.
//! Forwards are never retried here.

use std::collections::HashMap;
use std::future::pending;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use chordcast_core::message::{Request, Response};
use chordcast_core::topology::RingNode;
use chordcast_core::wire::Frame;
use chordcast_services::{read_frame, write_frame, CodecError, Handle};

use crate::event::{Event, EventSender};

#[derive(Debug)]
pub struct PeerJob {
    pub handle: Handle,
    pub hops: u8,
    pub request: Request,
}

type Incoming = Result<Frame, CodecError>;

struct Connection {
    writer: OwnedWriteHalf,
    replies: mpsc::UnboundedReceiver<Incoming>,
    reader: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub struct PeerLink {
    peer: RingNode,
    timeout: Duration,
    jobs: mpsc::UnboundedReceiver<PeerJob>,
    events: EventSender,
    shutdown: broadcast::Receiver<()>,
    conn: Option<Connection>,
    /// Forwards written and not yet answered, with their deadlines.
    outstanding: HashMap<Handle, Instant>,
}

impl PeerLink {
    pub fn new(
        peer: RingNode,
        timeout: Duration,
        jobs: mpsc::UnboundedReceiver<PeerJob>,
        events: EventSender,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            peer,
            timeout,
            jobs,
            events,
            shutdown,
            conn: None,
            outstanding: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        loop {
            if self.events.is_closed() {
                return;
            }
            let deadline = self.outstanding.values().min().copied();

            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::debug!(peer = %self.peer.id, "peer link shutting down");
                    return;
                }

                job = self.jobs.recv() => {
                    let Some(job) = job else { return };
                    self.send(job).await;
                }

                incoming = next_reply(&mut self.conn) => match incoming {
                    Some(Ok(frame)) => self.deliver(frame),
                    Some(Err(e)) => self.drop_connection(&format!("{e}")),
                    None => self.drop_connection("connection closed"),
                },

                _ = expiry(deadline) => self.expire(),
            }
        }
    }

    async fn send(&mut self, job: PeerJob) {
        let handle = job.handle;
        match self.write(job).await {
            Ok(()) => {
                self.outstanding.insert(handle, Instant::now() + self.timeout);
            }
            Err(e) => {
                let reason = format!("{e:#}");
                self.fail(handle, &reason);
                self.drop_connection(&reason);
            }
        }
    }

    async fn write(&mut self, job: PeerJob) -> Result<()> {
        let frame = job.request.to_frame(job.handle)?.forwarded(job.hops);
        let timeout = self.timeout;
        let conn = self.connect().await?;
        tokio::time::timeout(timeout, write_frame(&mut conn.writer, &frame))
            .await
            .map_err(|_| anyhow!("write timed out after {timeout:?}"))??;
        Ok(())
    }

    async fn connect(&mut self) -> Result<&mut Connection> {
        if self.conn.is_none() {
            let endpoint = self.peer.endpoint();
            let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&endpoint))
                .await
                .map_err(|_| anyhow!("connect to {endpoint} timed out"))?
                .with_context(|| format!("connect to {endpoint}"))?;
            stream.set_nodelay(true)?;
            tracing::debug!(peer = %self.peer.id, %endpoint, "peer link connected");

            let (read_half, writer) = stream.into_split();
            let (tx, replies) = mpsc::unbounded_channel();
            let reader = tokio::spawn(read_replies(read_half, tx));
            self.conn = Some(Connection {
                writer,
                replies,
                reader,
            });
        }
        self.conn
            .as_mut()
            .ok_or_else(|| anyhow!("peer connection unavailable"))
    }

    fn deliver(&mut self, frame: Frame) {
        let handle = frame.request_id;
        if self.outstanding.remove(&handle).is_none() {
            tracing::debug!(peer = %self.peer.id, handle, "reply after deadline dropped");
            return;
        }
        match Response::from_frame(&frame) {
            Ok(response) => {
                let _ = self.events.send(Event::PeerReply { handle, response });
            }
            Err(e) => self.fail(handle, &format!("bad reply: {e}")),
        }
    }

    /// Fail every forward whose deadline has passed. The connection stays
    /// up; a reply that turns up later is dropped.
    fn expire(&mut self) {
        let now = Instant::now();
        let overdue: Vec<Handle> = self
            .outstanding
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(handle, _)| *handle)
            .collect();
        let reason = format!("no reply within {:?}", self.timeout);
        for handle in overdue {
            self.outstanding.remove(&handle);
            self.fail(handle, &reason);
        }
    }

    fn drop_connection(&mut self, reason: &str) {
        if self.conn.take().is_some() {
            tracing::debug!(peer = %self.peer.id, reason, "peer link dropped");
        }
        for (handle, _) in std::mem::take(&mut self.outstanding) {
            self.fail(handle, reason);
        }
    }

    fn fail(&self, handle: Handle, reason: &str) {
        let _ = self.events.send(Event::PeerFailed {
            handle,
            reason: format!("{}: {reason}", self.peer.id),
        });
    }
}

async fn read_replies(mut reader: OwnedReadHalf, replies: mpsc::UnboundedSender<Incoming>) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if replies.send(Ok(frame)).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                let _ = replies.send(Err(e));
                return;
            }
        }
    }
}

/// Next reply on the current connection; never resolves without one.
async fn next_reply(conn: &mut Option<Connection>) -> Option<Incoming> {
    match conn {
        Some(conn) => conn.replies.recv().await,
        None => pending().await,
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}
