//! Chain collector
//!
//! Pairs a "parent" item with the one "child" item answering to the same
//! origin. Parents are remembered in a bounded LRU until their child shows
//! up (possibly in a later pulse); children without a stored parent are
//! dropped.
//!
//! ```text
//! parent ──is/proper──► parents[origin(parent)]
//! child  ──is────────► parents.pop(origin(child)) ──proper──► Chain { parent, child }
//! ```

use crate::record::{Record, RecordId, Request, ResultRecord, SideEffect};
use lru::LruCache;
use std::num::NonZeroUsize;

/// Default bound on parents waiting for their child
pub const DEFAULT_PARENT_CAPACITY: usize = 100_000;

/// Matched parent/child pair
#[derive(Debug, Clone, PartialEq)]
pub struct Chain<P, C> {
    pub parent: P,
    pub child: C,
}

/// Request paired with its result
pub type CoupledResult = Chain<Request, ResultRecord>;

/// Request paired with the side effect it produced
pub type CoupledSideEffect = Chain<Request, SideEffect>;

/// Everything a chain collector can be fed
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Record(Record),
    CoupledResult(CoupledResult),
    CoupledSideEffect(CoupledSideEffect),
}

impl From<Record> for Item {
    fn from(record: Record) -> Self {
        Item::Record(record)
    }
}

impl Item {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Item::Record(record) => Some(record),
            _ => None,
        }
    }
}

type Projection<T> = Box<dyn Fn(&Item) -> Option<T> + Send + Sync>;
type OriginFn<T> = Box<dyn Fn(&T) -> RecordId + Send + Sync>;
type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// One side of a chain: role membership, correlation key, acceptance filter
pub struct RelationDesc<T> {
    is: Projection<T>,
    origin: OriginFn<T>,
    proper: Predicate<T>,
}

impl<T> RelationDesc<T> {
    /// `is` projects an item into the role type; every member is proper
    /// until [`RelationDesc::proper`] narrows it.
    pub fn new<I, O>(is: I, origin: O) -> Self
    where
        I: Fn(&Item) -> Option<T> + Send + Sync + 'static,
        O: Fn(&T) -> RecordId + Send + Sync + 'static,
    {
        Self {
            is: Box::new(is),
            origin: Box::new(origin),
            proper: Box::new(|_| true),
        }
    }

    pub fn proper<F>(mut self, proper: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.proper = Box::new(proper);
        self
    }
}

impl RelationDesc<Request> {
    /// Request records passing `filter`, keyed by their own ID
    pub fn requests<F>(filter: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        RelationDesc::new(
            move |item| {
                item.as_record()
                    .and_then(Request::from_record)
                    .filter(|request| filter(request))
            },
            |request: &Request| request.id,
        )
    }
}

impl RelationDesc<ResultRecord> {
    /// Every result record, keyed by the request it answers
    pub fn results() -> Self {
        RelationDesc::new(
            |item| item.as_record().and_then(ResultRecord::from_record),
            |result: &ResultRecord| result.request(),
        )
    }
}

impl RelationDesc<SideEffect> {
    /// Every activate/amend/deactivate, keyed by the request that produced it
    pub fn side_effects() -> Self {
        RelationDesc::new(
            |item| item.as_record().and_then(SideEffect::from_record),
            |effect: &SideEffect| effect.request,
        )
    }
}

pub struct ChainCollector<P, C> {
    parent: RelationDesc<P>,
    child: RelationDesc<C>,
    parents: LruCache<RecordId, P>,
}

impl<P, C> ChainCollector<P, C> {
    pub fn with_capacity(parent: RelationDesc<P>, child: RelationDesc<C>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            parent,
            child,
            parents: LruCache::new(capacity),
        }
    }

    /// Feed one item; returns a chain when a child completes a stored parent
    pub fn collect(&mut self, item: &Item) -> Option<Chain<P, C>> {
        if let Some(parent) = (self.parent.is)(item) {
            if !(self.parent.proper)(&parent) {
                return None;
            }
            let origin = (self.parent.origin)(&parent);
            if let Some((displaced, _)) = self.parents.push(origin, parent) {
                if displaced == origin {
                    log::warn!("⚠️  Chain parent for origin {} overwritten", origin);
                } else {
                    log::debug!("Chain parent for origin {} evicted unmatched", displaced);
                }
            }
            return None;
        }

        if let Some(child) = (self.child.is)(item) {
            let origin = (self.child.origin)(&child);
            let parent = self.parents.pop(&origin)?;
            if !(self.child.proper)(&child) {
                log::debug!("Chain for origin {} dropped: child not proper", origin);
                return None;
            }
            return Some(Chain { parent, child });
        }

        None
    }

    /// Parents still waiting for a child
    pub fn pending(&self) -> usize {
        self.parents.len()
    }
}
