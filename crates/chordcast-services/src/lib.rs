//! chordcast-services: the discovery ring: topology model, routing,
//! registration store, forward correlation, and the node state machine that
//! ties them together. Also the async frame codec and client shared by the
//! daemon, the CLI and the tests.

pub mod client;
pub mod codec;
pub mod correlator;
pub mod finger;
pub mod handler;
pub mod lookup;
pub mod node;
pub mod registry;
pub mod ring;
pub mod router;

pub use client::DiscoveryClient;
pub use codec::{read_frame, write_frame, CodecError};
pub use correlator::{Handle, OriginId};
pub use finger::{FingerEntry, FingerTable};
pub use handler::{dispatch, Action, RequestContext, RequestHandler};
pub use node::{DiscoveryNode, NodeSettings, NodeSnapshot};
pub use registry::{RegistrantRecord, RegistrationError, RegistrationStore};
pub use ring::{is_between, Ring, RingError};
pub use router::{Route, Router, TopicHashFn};
