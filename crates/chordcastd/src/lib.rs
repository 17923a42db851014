//! chordcastd: one discovery node of the ring.

pub mod daemon;
pub mod event;
pub mod event_loop;
pub mod listener;
pub mod peer;

pub use daemon::{Daemon, DaemonHandle};
