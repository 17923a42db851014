//! Discovery messages carried inside frames.
//!
//! Payloads are JSON. The frame kind decides which type a payload decodes
//! into; `Request` and `Response` are the closed sets a node accepts and
//! produces.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::wire::{Frame, FrameKind, WireError};

// ── Roles and statuses ────────────────────────────────────────────────────────

/// What a registrant does in the pub/sub system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Role {
    Publisher = 0x01,
    Subscriber = 0x02,
    /// Publishes and subscribes on behalf of everyone else.
    Broker = 0x03,
}

impl TryFrom<u8> for Role {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Role::Publisher),
            0x02 => Ok(Role::Subscriber),
            0x03 => Ok(Role::Broker),
            other => Err(WireError::UnknownRole(other)),
        }
    }
}

impl From<Role> for u8 {
    fn from(r: Role) -> u8 {
        r as u8
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "publisher" | "pub" => Ok(Role::Publisher),
            "subscriber" | "sub" => Ok(Role::Subscriber),
            "broker" => Ok(Role::Broker),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Outcome carried by register and lookup replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Failure,
    /// Not ready yet. Back off and ask again.
    CheckAgain,
}

/// How subscribers reach publishers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dissemination {
    /// Subscribers connect straight to matching publishers.
    #[default]
    Direct,
    /// All traffic goes through the registered broker.
    Broker,
}

impl std::str::FromStr for Dissemination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(Dissemination::Direct),
            "broker" => Ok(Dissemination::Broker),
            other => Err(format!("unknown dissemination strategy: {other}")),
        }
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────────

/// Where a registrant can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrantInfo {
    pub id: String,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Raw role byte. Validated by the receiving node so a bad role is
    /// answered with a failure instead of a decode error.
    pub role: u8,
    pub info: RegistrantInfo,
    pub topics: Vec<String>,
}

impl RegisterRequest {
    pub fn new(role: Role, info: RegistrantInfo, topics: Vec<String>) -> Self {
        Self {
            role: role.into(),
            info,
            topics,
        }
    }

    pub fn role(&self) -> Result<Role, WireError> {
        Role::try_from(self.role)
    }

    /// Same registrant, restricted to `topics`.
    pub fn narrowed(&self, topics: Vec<String>) -> Self {
        Self {
            role: self.role,
            info: self.info.clone(),
            topics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RegisterResponse {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Failure,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsReadyResponse {
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupByTopicsRequest {
    pub topics: Vec<String>,
}

/// Reply to both lookup variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResponse {
    pub status: Status,
    #[serde(default)]
    pub publishers: Vec<RegistrantInfo>,
}

impl LookupResponse {
    pub fn success(publishers: Vec<RegistrantInfo>) -> Self {
        Self {
            status: Status::Success,
            publishers,
        }
    }

    pub fn check_again() -> Self {
        Self {
            status: Status::CheckAgain,
            publishers: Vec::new(),
        }
    }
}

/// Registrants seen so far by a census, keyed by id so a registrant split
/// across several owning nodes is counted once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    #[serde(default)]
    pub publishers: BTreeMap<String, RegistrantInfo>,
    #[serde(default)]
    pub subscribers: BTreeSet<String>,
    #[serde(default)]
    pub brokers: BTreeMap<String, RegistrantInfo>,
}

impl Tally {
    pub fn merge(&mut self, other: Tally) {
        self.publishers.extend(other.publishers);
        self.subscribers.extend(other.subscribers);
        self.brokers.extend(other.brokers);
    }
}

/// Walks the ring via successors, collecting every node's registrants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusRequest {
    /// Ring id of the node that started the walk.
    pub origin: String,
    pub tally: Tally,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusResponse {
    pub tally: Tally,
    /// False when some node on the walk could not be reached.
    pub complete: bool,
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register(RegisterRequest),
    IsReady,
    LookupByTopics(LookupByTopicsRequest),
    LookupAllPublishers,
    Census(CensusRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Register(RegisterResponse),
    IsReady(IsReadyResponse),
    LookupByTopics(LookupResponse),
    LookupAllPublishers(LookupResponse),
    Census(CensusResponse),
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(value).map_err(|e| WireError::Malformed(e.to_string()))
}

fn from_json<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, WireError> {
    serde_json::from_slice(bytes).map_err(|e| WireError::Malformed(e.to_string()))
}

impl Request {
    pub fn kind(&self) -> FrameKind {
        match self {
            Request::Register(_) => FrameKind::RegisterRequest,
            Request::IsReady => FrameKind::IsReadyRequest,
            Request::LookupByTopics(_) => FrameKind::LookupByTopicsRequest,
            Request::LookupAllPublishers => FrameKind::LookupAllRequest,
            Request::Census(_) => FrameKind::CensusRequest,
        }
    }

    pub fn to_frame(&self, request_id: u64) -> Result<Frame, WireError> {
        let payload = match self {
            Request::Register(r) => to_json(r)?,
            Request::IsReady | Request::LookupAllPublishers => b"{}".to_vec(),
            Request::LookupByTopics(r) => to_json(r)?,
            Request::Census(r) => to_json(r)?,
        };
        Ok(Frame::new(self.kind(), request_id, payload))
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, WireError> {
        match frame.kind {
            FrameKind::RegisterRequest => Ok(Request::Register(from_json(&frame.payload)?)),
            FrameKind::IsReadyRequest => Ok(Request::IsReady),
            FrameKind::LookupByTopicsRequest => {
                Ok(Request::LookupByTopics(from_json(&frame.payload)?))
            }
            FrameKind::LookupAllRequest => Ok(Request::LookupAllPublishers),
            FrameKind::CensusRequest => Ok(Request::Census(from_json(&frame.payload)?)),
            other => Err(WireError::UnexpectedKind(other)),
        }
    }
}

impl Response {
    pub fn kind(&self) -> FrameKind {
        match self {
            Response::Register(_) => FrameKind::RegisterResponse,
            Response::IsReady(_) => FrameKind::IsReadyResponse,
            Response::LookupByTopics(_) => FrameKind::LookupByTopicsResponse,
            Response::LookupAllPublishers(_) => FrameKind::LookupAllResponse,
            Response::Census(_) => FrameKind::CensusResponse,
        }
    }

    pub fn to_frame(&self, request_id: u64) -> Result<Frame, WireError> {
        let payload = match self {
            Response::Register(r) => to_json(r)?,
            Response::IsReady(r) => to_json(r)?,
            Response::LookupByTopics(r) | Response::LookupAllPublishers(r) => to_json(r)?,
            Response::Census(r) => to_json(r)?,
        };
        Ok(Frame::new(self.kind(), request_id, payload))
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, WireError> {
        match frame.kind {
            FrameKind::RegisterResponse => Ok(Response::Register(from_json(&frame.payload)?)),
            FrameKind::IsReadyResponse => Ok(Response::IsReady(from_json(&frame.payload)?)),
            FrameKind::LookupByTopicsResponse => {
                Ok(Response::LookupByTopics(from_json(&frame.payload)?))
            }
            FrameKind::LookupAllResponse => {
                Ok(Response::LookupAllPublishers(from_json(&frame.payload)?))
            }
            FrameKind::CensusResponse => Ok(Response::Census(from_json(&frame.payload)?)),
            other => Err(WireError::UnexpectedKind(other)),
        }
    }
}
