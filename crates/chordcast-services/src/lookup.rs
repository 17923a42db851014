//! Publisher lookups.
//!
//! Entry nodes answer lookups from a census tally: nothing is handed out
//! until readiness holds, broker dissemination hands out the brokers, and
//! "who publishes anything" is every publisher the census saw. A direct
//! lookup by topics needs the topic owners, who match against their own
//! store.

use chordcast_core::message::{Dissemination, LookupResponse, Tally};

/// What a lookup by topics needs next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicAnswer {
    Reply(LookupResponse),
    /// Ready under direct dissemination; ask the owners of each topic.
    AskOwners,
}

pub struct LookupEngine<'a> {
    tally: &'a Tally,
    ready: bool,
    dissemination: Dissemination,
}

impl<'a> LookupEngine<'a> {
    pub fn new(tally: &'a Tally, ready: bool, dissemination: Dissemination) -> Self {
        Self {
            tally,
            ready,
            dissemination,
        }
    }

    pub fn by_topics(&self) -> TopicAnswer {
        if !self.ready {
            return TopicAnswer::Reply(LookupResponse::check_again());
        }
        match self.dissemination {
            Dissemination::Direct => TopicAnswer::AskOwners,
            Dissemination::Broker => TopicAnswer::Reply(LookupResponse::success(
                self.tally.brokers.values().cloned().collect(),
            )),
        }
    }

    pub fn all(&self) -> LookupResponse {
        if !self.ready {
            return LookupResponse::check_again();
        }
        LookupResponse::success(self.tally.publishers.values().cloned().collect())
    }
}
