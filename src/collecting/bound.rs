//! Bound collector
//!
//! Two-level chain: a root incoming request's successful result is joined
//! with the side effect of one outgoing call it issued.
//!
//! ```text
//! level 1: root request ─► result        = CoupledResult
//!          outgoing     ─► side effect   = CoupledSideEffect
//! level 2: CoupledSideEffect (origin: outgoing.reason)
//!          CoupledResult     (origin: root.id)          = Bound
//! ```
//!
//! The side effect must be observed before the root's result, which matches
//! execution order on the ledger.

use super::chain::{Chain, ChainCollector, CoupledResult, CoupledSideEffect, Item, RelationDesc};
use crate::record::{Record, Request, ResultRecord, SideEffect};

pub type Bound = Chain<CoupledSideEffect, CoupledResult>;

pub struct BoundCollector {
    results: ChainCollector<Request, ResultRecord>,
    effects: ChainCollector<Request, SideEffect>,
    bound: ChainCollector<CoupledSideEffect, CoupledResult>,
}

impl BoundCollector {
    /// `root` selects incoming requests, `outgoing` selects the calls whose
    /// side effect is wanted
    pub fn new<R, O>(root: R, outgoing: O, capacity: usize) -> Self
    where
        R: Fn(&Request) -> bool + Send + Sync + 'static,
        O: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        let results = ChainCollector::with_capacity(
            RelationDesc::requests(move |request| request.incoming && root(request)),
            RelationDesc::results().proper(ResultRecord::is_success),
            capacity,
        );
        let effects = ChainCollector::with_capacity(
            RelationDesc::requests(move |request| !request.incoming && outgoing(request)),
            RelationDesc::side_effects(),
            capacity,
        );
        let bound = ChainCollector::with_capacity(
            RelationDesc::new(
                |item| match item {
                    Item::CoupledSideEffect(chain) => Some(chain.clone()),
                    _ => None,
                },
                |chain: &CoupledSideEffect| chain.parent.reason(),
            ),
            RelationDesc::new(
                |item| match item {
                    Item::CoupledResult(chain) => Some(chain.clone()),
                    _ => None,
                },
                |chain: &CoupledResult| chain.parent.id,
            ),
            capacity,
        );

        Self {
            results,
            effects,
            bound,
        }
    }

    pub fn collect(&mut self, record: &Record) -> Option<Bound> {
        let item = Item::Record(record.clone());
        if let Some(effect) = self.effects.collect(&item) {
            return self.bound.collect(&Item::CoupledSideEffect(effect));
        }
        if let Some(result) = self.results.collect(&item) {
            return self.bound.collect(&Item::CoupledResult(result));
        }
        None
    }
}
