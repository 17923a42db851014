//! chordcast wire format: the envelope every discovery request and reply
//! travels in.
//!
//! A frame is a fixed 16-byte header followed by `length` bytes of JSON
//! payload. The header is enough to route and correlate a frame without
//! touching the payload: the kind says which message follows, the request id
//! pairs a reply with its request, and the hop counter bounds forwarding
//! chains between ring nodes.
//!
//! All multi-byte header fields are big-endian. There is no unsafe code in
//! this module.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Frame Header ─────────────────────────────────────────────────────────────

/// Precedes every payload on a discovery connection.
///
/// Wire size: 16 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    /// Wire format version. Currently 0x01.
    pub version: u8,

    /// Which message the payload carries. See [`FrameKind`].
    pub kind: u8,

    /// Bit flags:
    ///   bit    0: forwarded by a peer ring node rather than a registrant
    ///   bits 1-7: reserved, must be zero
    pub flags: u8,

    /// Number of node-to-node hops this request has already taken.
    /// Replies echo the value of the request they answer.
    pub hops: u8,

    /// Chosen by the sender of a request and echoed in its reply.
    /// Node-to-node forwards use the forwarding node's tracking handle.
    pub request_id: U64<BigEndian>,

    /// Length of the JSON payload in bytes, not including this header.
    pub length: U32<BigEndian>,
}

assert_eq_size!(FrameHeader, [u8; 16]);

/// Size of [`FrameHeader`] on the wire.
pub const HEADER_LEN: usize = std::mem::size_of::<FrameHeader>();

impl FrameHeader {
    /// Parse and validate a header from the first [`HEADER_LEN`] bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        let header = FrameHeader::read_from_prefix(bytes).ok_or(WireError::Truncated {
            expected: HEADER_LEN,
            actual: bytes.len(),
        })?;
        if header.version != WIRE_VERSION {
            return Err(WireError::UnknownVersion(header.version));
        }
        if header.flags & !FLAG_FORWARDED != 0 {
            return Err(WireError::ReservedFlagsSet(header.flags));
        }
        FrameKind::try_from(header.kind)?;
        let length = header.length.get() as usize;
        if length > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(length));
        }
        Ok(header)
    }

    pub fn payload_len(&self) -> usize {
        self.length.get() as usize
    }
}

// ── Frame Kind ───────────────────────────────────────────────────────────────

/// Message discriminator carried in [`FrameHeader::kind`].
///
/// Requests are odd, their replies are the following even value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    RegisterRequest = 0x01,
    RegisterResponse = 0x02,
    IsReadyRequest = 0x03,
    IsReadyResponse = 0x04,
    LookupByTopicsRequest = 0x05,
    LookupByTopicsResponse = 0x06,
    LookupAllRequest = 0x07,
    LookupAllResponse = 0x08,
    /// Ring-walking readiness census. Only exchanged between ring nodes.
    CensusRequest = 0x09,
    CensusResponse = 0x0a,
}

impl FrameKind {
    pub fn is_request(self) -> bool {
        (self as u8) % 2 == 1
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameKind::RegisterRequest),
            0x02 => Ok(FrameKind::RegisterResponse),
            0x03 => Ok(FrameKind::IsReadyRequest),
            0x04 => Ok(FrameKind::IsReadyResponse),
            0x05 => Ok(FrameKind::LookupByTopicsRequest),
            0x06 => Ok(FrameKind::LookupByTopicsResponse),
            0x07 => Ok(FrameKind::LookupAllRequest),
            0x08 => Ok(FrameKind::LookupAllResponse),
            0x09 => Ok(FrameKind::CensusRequest),
            0x0a => Ok(FrameKind::CensusResponse),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

impl From<FrameKind> for u8 {
    fn from(k: FrameKind) -> u8 {
        k as u8
    }
}

// ── Frame ────────────────────────────────────────────────────────────────────

/// A decoded frame: header fields plus the raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub flags: u8,
    pub hops: u8,
    pub request_id: u64,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: FrameKind, request_id: u64, payload: Vec<u8>) -> Self {
        Self {
            kind,
            flags: 0,
            hops: 0,
            request_id,
            payload,
        }
    }

    /// Mark this frame as sent by a ring node on behalf of someone else.
    pub fn forwarded(mut self, hops: u8) -> Self {
        self.flags |= FLAG_FORWARDED;
        self.hops = hops;
        self
    }

    pub fn is_forwarded(&self) -> bool {
        self.flags & FLAG_FORWARDED != 0
    }

    pub fn header(&self) -> Result<FrameHeader, WireError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(self.payload.len()));
        }
        Ok(FrameHeader {
            version: WIRE_VERSION,
            kind: self.kind.into(),
            flags: self.flags,
            hops: self.hops,
            request_id: U64::new(self.request_id),
            length: U32::new(self.payload.len() as u32),
        })
    }

    /// Header followed by payload, ready to write to a socket.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let header = self.header()?;
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Assemble a frame from an already validated header and its payload.
    pub fn from_parts(header: &FrameHeader, payload: Vec<u8>) -> Result<Self, WireError> {
        if payload.len() != header.payload_len() {
            return Err(WireError::Truncated {
                expected: header.payload_len(),
                actual: payload.len(),
            });
        }
        Ok(Self {
            kind: FrameKind::try_from(header.kind)?,
            flags: header.flags,
            hops: header.hops,
            request_id: header.request_id.get(),
            payload,
        })
    }

    /// Decode one complete frame from a byte slice.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let header = FrameHeader::parse(bytes)?;
        let end = HEADER_LEN + header.payload_len();
        if bytes.len() < end {
            return Err(WireError::Truncated {
                expected: end,
                actual: bytes.len(),
            });
        }
        Self::from_parts(&header, bytes[HEADER_LEN..end].to_vec())
    }
}

// ── Topic hashing ────────────────────────────────────────────────────────────

/// Position of a topic or node on the ring, always `< 2^address_bits`.
pub type RingHash = u64;

/// Hash a topic name onto a ring of `2^address_bits` positions.
///
/// Every node and every registrant must agree on this function; ownership
/// is decided by it. The first eight bytes of the BLAKE3 digest are read
/// big-endian and reduced modulo `2^address_bits`.
pub fn topic_hash(topic: &str, address_bits: u32) -> RingHash {
    let digest = blake3::hash(topic.as_bytes());
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_be_bytes(word) & ring_mask(address_bits)
}

/// `2^address_bits - 1`, saturating at 64 bits.
pub fn ring_mask(address_bits: u32) -> u64 {
    if address_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << address_bits) - 1
    }
}

// ── Constants ────────────────────────────────────────────────────────────────

/// Current wire format version.
pub const WIRE_VERSION: u8 = 0x01;

/// Header flag: the request was forwarded by a ring node.
pub const FLAG_FORWARDED: u8 = 0x01;

/// Maximum payload size in bytes.
pub const MAX_PAYLOAD: usize = 1 << 20;

/// Default size of the hash space in bits.
pub const DEFAULT_ADDRESS_BITS: u32 = 8;

/// Largest supported hash space.
pub const MAX_ADDRESS_BITS: u32 = 64;

/// Default discovery port.
pub const DEFAULT_PORT: u16 = 5556;

/// Default receive timeout on node-to-node forwards, in milliseconds.
pub const DEFAULT_PEER_TIMEOUT_MS: u64 = 2000;

/// Fixed delay a registrant waits before re-asking after `CheckAgain`,
/// in milliseconds.
pub const CHECK_AGAIN_RETRY_MS: u64 = 10;

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown wire version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown frame kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("unknown registrant role: 0x{0:02x}")]
    UnknownRole(u8),

    #[error("payload length {0} exceeds maximum {}", MAX_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("reserved flags are non-zero: 0x{0:02x}")]
    ReservedFlagsSet(u8),

    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("frame kind {0:?} is not valid here")]
    UnexpectedKind(FrameKind),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

// ── Tests ────────────────────────────────────────────────────────────────────
