//! chordcast-core: wire format, discovery messages, topology, and config.
//! All other chordcast crates depend on this one.

pub mod config;
pub mod message;
pub mod topology;
pub mod wire;

pub use config::ChordcastConfig;
pub use message::{Dissemination, RegistrantInfo, Request, Response, Role, Status};
pub use topology::{RingNode, Topology, TopologyError};
pub use wire::{topic_hash, Frame, FrameKind, RingHash, WireError};
