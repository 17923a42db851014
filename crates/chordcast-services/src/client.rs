//! Client side of the discovery protocol.
//!
//! Publishers, subscribers and brokers talk to any ring node through a
//! `DiscoveryClient`. One request is in flight at a time; replies are matched
//! by request id. A request that fails or times out drops the connection, so
//! a reply that shows up late can never be taken for the answer to a later
//! request. The next request reconnects.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::net::TcpStream;

use chordcast_core::message::{
    LookupByTopicsRequest, LookupResponse, RegisterRequest, RegisterResponse, RegistrantInfo,
    Request, Response, Role, Status,
};
use chordcast_core::wire::{Frame, CHECK_AGAIN_RETRY_MS, DEFAULT_PEER_TIMEOUT_MS};

use crate::codec::{read_frame, write_frame};

async fn open(addr: &str) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to discovery node {addr}"))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

pub struct DiscoveryClient {
    addr: String,
    stream: Option<TcpStream>,
    next_id: u64,
    timeout: Duration,
    retry: Duration,
}

impl DiscoveryClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = open(addr).await?;
        Ok(Self {
            addr: addr.to_string(),
            stream: Some(stream),
            next_id: 0,
            timeout: Duration::from_millis(DEFAULT_PEER_TIMEOUT_MS * 5),
            retry: Duration::from_millis(CHECK_AGAIN_RETRY_MS),
        })
    }

    /// How long to wait for each reply.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay between polls while the system is not ready.
    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = retry;
        self
    }

    pub async fn request(&mut self, request: Request) -> Result<Response> {
        self.next_id += 1;
        let id = self.next_id;
        let frame = request.to_frame(id)?;
        let reply = match self.exchange(&frame).await {
            Ok(reply) => reply,
            Err(e) => {
                self.stream = None;
                return Err(e);
            }
        };
        let response = Response::from_frame(&reply)?;
        if response.kind() as u8 != request.kind() as u8 + 1 {
            bail!("{:?} does not answer {:?}", response.kind(), request.kind());
        }
        Ok(response)
    }

    async fn exchange(&mut self, frame: &Frame) -> Result<Frame> {
        let timeout = self.timeout;
        if self.stream.is_none() {
            self.stream = Some(open(&self.addr).await?);
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("discovery connection unavailable"))?;
        write_frame(stream, frame).await?;

        let reply = tokio::time::timeout(timeout, read_frame(stream))
            .await
            .map_err(|_| anyhow!("no reply within {timeout:?}"))??
            .ok_or_else(|| anyhow!("discovery node closed the connection"))?;
        if reply.request_id != frame.request_id {
            bail!("reply for request {} while waiting for {}", reply.request_id, frame.request_id);
        }
        Ok(reply)
    }

    pub async fn register(
        &mut self,
        role: Role,
        info: RegistrantInfo,
        topics: Vec<String>,
    ) -> Result<RegisterResponse> {
        match self
            .request(Request::Register(RegisterRequest::new(role, info, topics)))
            .await?
        {
            Response::Register(r) => Ok(r),
            other => bail!("unexpected reply {:?}", other.kind()),
        }
    }

    pub async fn is_ready(&mut self) -> Result<bool> {
        match self.request(Request::IsReady).await? {
            Response::IsReady(r) => Ok(r.ready),
            other => bail!("unexpected reply {:?}", other.kind()),
        }
    }

    pub async fn lookup(&mut self, topics: Vec<String>) -> Result<LookupResponse> {
        match self
            .request(Request::LookupByTopics(LookupByTopicsRequest { topics }))
            .await?
        {
            Response::LookupByTopics(r) => Ok(r),
            other => bail!("unexpected reply {:?}", other.kind()),
        }
    }

    pub async fn lookup_all(&mut self) -> Result<LookupResponse> {
        match self.request(Request::LookupAllPublishers).await? {
            Response::LookupAllPublishers(r) => Ok(r),
            other => bail!("unexpected reply {:?}", other.kind()),
        }
    }

    /// Poll readiness until it holds or `attempts` polls have been made.
    pub async fn wait_ready(&mut self, attempts: u32) -> Result<bool> {
        for _ in 0..attempts {
            if self.is_ready().await? {
                return Ok(true);
            }
            tokio::time::sleep(self.retry).await;
        }
        Ok(false)
    }

    /// Repeat a lookup while the node answers `CheckAgain`.
    pub async fn lookup_when_ready(&mut self, topics: Vec<String>, attempts: u32) -> Result<LookupResponse> {
        let mut last = LookupResponse::check_again();
        for _ in 0..attempts {
            last = self.lookup(topics.clone()).await?;
            if last.status != Status::CheckAgain {
                break;
            }
            tokio::time::sleep(self.retry).await;
        }
        Ok(last)
    }
}
