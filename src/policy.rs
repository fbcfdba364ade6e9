//! Failure policy - decides which content ids are refused up front
//!
//! Every operation that takes a content id asks the policy first and fails
//! with [`Error::BadContentId`](crate::Error::BadContentId) when it refuses.
//! Production nodes run [`AcceptAll`]; conformance tests inject a
//! [`RejectSet`] so chosen ids fail deterministically.

use std::collections::HashSet;

use crate::types::ContentId;

pub trait FailurePolicy: Send + Sync {
    /// Whether operations on `cid` must fail
    fn rejects(&self, cid: &ContentId) -> bool;
}

/// Accepts every content id
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl FailurePolicy for AcceptAll {
    fn rejects(&self, _cid: &ContentId) -> bool {
        false
    }
}

/// Rejects a fixed set of content ids
#[derive(Debug, Clone, Default)]
pub struct RejectSet {
    rejected: HashSet<ContentId>,
}

impl RejectSet {
    pub fn new(rejected: impl IntoIterator<Item = ContentId>) -> Self {
        Self {
            rejected: rejected.into_iter().collect(),
        }
    }
}

impl FailurePolicy for RejectSet {
    fn rejects(&self, cid: &ContentId) -> bool {
        self.rejected.contains(cid)
    }
}

impl<F> FailurePolicy for F
where
    F: Fn(&ContentId) -> bool + Send + Sync,
{
    fn rejects(&self, cid: &ContentId) -> bool {
        self(cid)
    }
}
