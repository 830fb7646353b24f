//! Call tree builder
//!
//! Rebuilds the full execution tree under a request through the cross-batch
//! cache: the request itself, its result and side effect (both optional)
//! and, recursively, every request it issued.

use super::cache::{RecordCache, Scope};
use super::CollectError;
use crate::record::{RecordId, Request, ResultRecord, SideEffect};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub request: Request,
    /// Requests whose reason is this request, unordered
    pub outgoings: Vec<Structure>,
    pub side_effect: Option<SideEffect>,
    pub result: Option<ResultRecord>,
}

impl Structure {
    /// Depth-first search over this node and every descendant
    pub fn find<F>(&self, predicate: &F) -> Option<&Structure>
    where
        F: Fn(&Structure) -> bool,
    {
        if predicate(self) {
            return Some(self);
        }
        self.outgoings.iter().find_map(|outgoing| outgoing.find(predicate))
    }

    /// First activation of an object of `prototype` anywhere in the tree
    pub fn activation_of(&self, prototype: RecordId) -> Option<&SideEffect> {
        self.find(&|node: &Structure| {
            node.side_effect
                .as_ref()
                .map(|effect| effect.is_activate() && effect.image == prototype)
                .unwrap_or(false)
        })
        .and_then(|node| node.side_effect.as_ref())
    }

    /// Outgoing constructor call on `prototype`
    pub fn constructor_of(&self, prototype: RecordId) -> Option<&Structure> {
        self.find(&|node: &Structure| {
            !node.request.incoming
                && node.request.is_constructor()
                && node.request.prototype() == Some(prototype)
        })
    }

    pub fn size(&self) -> usize {
        1 + self.outgoings.iter().map(Structure::size).sum::<usize>()
    }
}

type BuildFuture<'a> = Pin<Box<dyn Future<Output = Result<Structure, CollectError>> + Send + 'a>>;

#[derive(Clone)]
pub struct TreeBuilder {
    cache: Arc<RecordCache>,
}

impl TreeBuilder {
    pub fn new(cache: Arc<RecordCache>) -> Self {
        Self { cache }
    }

    /// Missing request anywhere in the tree is fatal; missing results and
    /// side effects are normal for calls still in flight.
    pub async fn build(&self, request_id: RecordId) -> Result<Structure, CollectError> {
        let request = self.fetch_request(request_id).await?;
        self.build_from(request).await
    }

    /// Origin request of a result or side effect
    pub async fn fetch_request(&self, request_id: RecordId) -> Result<Request, CollectError> {
        self.cache
            .request(request_id)
            .await?
            .as_ref()
            .and_then(Request::from_record)
            .ok_or(CollectError::MissingPrerequisite {
                scope: Scope::Request,
                id: request_id,
            })
    }

    fn build_from(&self, request: Request) -> BuildFuture<'_> {
        Box::pin(async move {
            let result = self
                .cache
                .result(request.id)
                .await?
                .as_ref()
                .and_then(ResultRecord::from_record);
            let side_effect = self
                .cache
                .side_effect(request.id)
                .await?
                .as_ref()
                .and_then(SideEffect::from_record);

            let mut outgoings = Vec::new();
            for called in self.cache.called_requests(request.id).await? {
                if called.id == request.id {
                    continue;
                }
                let Some(child) = Request::from_record(&called) else {
                    continue;
                };
                outgoings.push(self.build_from(child).await?);
            }

            Ok(Structure {
                request,
                outgoings,
                side_effect,
                result,
            })
        })
    }
}
