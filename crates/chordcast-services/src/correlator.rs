//! Response correlation for forwarded requests.
//!
//! A request that cannot be answered locally becomes a job. Each sub-request
//! the job sends to another ring node gets a handle, which travels as the
//! frame's request id and comes back on the reply. When the last outstanding
//! handle of a job resolves, the job's aggregate is handed back to the node
//! so exactly one reply reaches the connection that asked.

use std::collections::{BTreeMap, HashMap};

use chordcast_core::message::{RegistrantInfo, Response, Status, Tally};
use chordcast_core::topology::RingNode;

/// Identifies an inbound connection.
pub type OriginId = u64;

/// Tracking handle of one forwarded sub-request.
pub type Handle = u64;

pub type JobId = u64;

/// Where the eventual reply goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub conn: OriginId,
    pub request_id: u64,
    pub hops: u8,
}

/// What a finished census is used for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CensusPurpose {
    IsReady,
    LookupTopics(Vec<String>),
    LookupAll,
    /// This node is a link in someone else's census chain.
    Relay,
}

/// Partial result of a job, folded together from its branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    /// First failure reason wins.
    Register { failure: Option<String> },
    /// Publishers deduplicated by id. Any failed branch means ask again.
    Lookup {
        publishers: BTreeMap<String, RegistrantInfo>,
        check_again: bool,
    },
    Census {
        purpose: CensusPurpose,
        tally: Tally,
        complete: bool,
    },
}

impl Aggregate {
    pub fn lookup(publishers: Vec<RegistrantInfo>) -> Self {
        Aggregate::Lookup {
            publishers: publishers.into_iter().map(|p| (p.id.clone(), p)).collect(),
            check_again: false,
        }
    }

    fn absorb(&mut self, response: Response) {
        let matched = match (&mut *self, response) {
            (Aggregate::Register { failure }, Response::Register(r)) => {
                if r.status != Status::Success && failure.is_none() {
                    *failure = Some(r.reason.unwrap_or_else(|| "registration failed".into()));
                }
                true
            }
            (
                Aggregate::Lookup {
                    publishers,
                    check_again,
                },
                Response::LookupByTopics(r) | Response::LookupAllPublishers(r),
            ) => {
                if r.status == Status::Success {
                    publishers.extend(r.publishers.into_iter().map(|p| (p.id.clone(), p)));
                } else {
                    *check_again = true;
                }
                true
            }
            (Aggregate::Census { tally, complete, .. }, Response::Census(r)) => {
                tally.merge(r.tally);
                *complete &= r.complete;
                true
            }
            (_, other) => {
                tracing::warn!(kind = ?other.kind(), "reply kind does not match forwarded request");
                false
            }
        };
        if !matched {
            self.absorb_failure("mismatched reply");
        }
    }

    fn absorb_failure(&mut self, reason: &str) {
        match self {
            Aggregate::Register { failure } => {
                failure.get_or_insert_with(|| reason.to_string());
            }
            Aggregate::Lookup { check_again, .. } => *check_again = true,
            Aggregate::Census { complete, .. } => *complete = false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingForward {
    pub job: JobId,
    pub peer: RingNode,
}

#[derive(Debug)]
struct Job {
    origin: Origin,
    outstanding: usize,
    aggregate: Aggregate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    pub origin: Origin,
    pub aggregate: Aggregate,
}

/// What resolving a handle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Other branches of the job are still out.
    Waiting,
    Complete(Completed),
    /// The handle was unknown or its origin has gone away.
    Dropped,
}

#[derive(Debug, Default)]
pub struct Correlator {
    next_handle: Handle,
    next_job: JobId,
    jobs: HashMap<JobId, Job>,
    pending: HashMap<Handle, PendingForward>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a request that will be answered once its forwards
    /// resolve. `aggregate` already holds the local share of the answer.
    pub fn open(&mut self, origin: Origin, aggregate: Aggregate) -> JobId {
        self.next_job += 1;
        let id = self.next_job;
        self.jobs.insert(
            id,
            Job {
                origin,
                outstanding: 0,
                aggregate,
            },
        );
        id
    }

    /// Record a sub-request of `job` headed for `peer`.
    pub fn forward(&mut self, job: JobId, peer: &RingNode) -> Handle {
        self.next_handle += 1;
        let handle = self.next_handle;
        if let Some(j) = self.jobs.get_mut(&job) {
            j.outstanding += 1;
        }
        self.pending.insert(
            handle,
            PendingForward {
                job,
                peer: peer.clone(),
            },
        );
        handle
    }

    pub fn on_response(&mut self, handle: Handle, response: Response) -> Progress {
        self.resolve(handle, |agg| agg.absorb(response))
    }

    /// The peer could not be reached or did not answer in time.
    pub fn on_failure(&mut self, handle: Handle, reason: &str) -> Progress {
        self.resolve(handle, |agg| agg.absorb_failure(reason))
    }

    fn resolve(&mut self, handle: Handle, apply: impl FnOnce(&mut Aggregate)) -> Progress {
        let Some(pending) = self.pending.remove(&handle) else {
            tracing::warn!(handle, "reply for unknown forward handle");
            return Progress::Dropped;
        };
        let Some(job) = self.jobs.get_mut(&pending.job) else {
            tracing::warn!(handle, peer = %pending.peer.id, "origin closed, dropping relayed reply");
            return Progress::Dropped;
        };

        apply(&mut job.aggregate);
        job.outstanding = job.outstanding.saturating_sub(1);
        if job.outstanding > 0 {
            return Progress::Waiting;
        }
        match self.jobs.remove(&pending.job) {
            Some(job) => Progress::Complete(Completed {
                origin: job.origin,
                aggregate: job.aggregate,
            }),
            None => Progress::Dropped,
        }
    }

    /// Forget every job answering `conn`. Their forwards stay pending so the
    /// peer replies can be recognised and discarded.
    pub fn drop_origin(&mut self, conn: OriginId) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| job.origin.conn != conn);
        before - self.jobs.len()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn pending_forward(&self, handle: Handle) -> Option<&PendingForward> {
        self.pending.get(&handle)
    }
}
