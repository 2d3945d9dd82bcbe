//! Resource fetcher abstraction
//!
//! Each supported kind has one fetcher. A fetch is a lazy stream of records
//! that walks the provider's pagination and attaches tags as it goes. The
//! first error ends the stream and the whole fetch is discarded.

use crate::error::FetchError;
use crate::model::{ResourceKind, ResourceRecord};
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Stream of records produced by a fetch
pub type RecordStream<'a> = BoxStream<'a, Result<ResourceRecord, FetchError>>;

/// Who and where to fetch for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchScope {
    pub identity: String,
    pub region: String,

    /// Page size hint passed to the provider's listing call
    pub page_size: i32,
}

impl FetchScope {
    pub fn new(identity: impl Into<String>, region: impl Into<String>, page_size: i32) -> Self {
        Self {
            identity: identity.into(),
            region: region.into(),
            page_size,
        }
    }
}

/// Lists every resource of one kind
pub trait ResourceFetcher: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Start a fetch. Nothing is requested until the stream is polled.
    fn fetch<'a>(&'a self, scope: &'a FetchScope) -> RecordStream<'a>;
}

/// Fetchers indexed by kind
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<ResourceKind, Arc<dyn ResourceFetcher>>,
}

impl fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetcherRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fetcher, replacing any previous one for the same kind
    pub fn register(&mut self, fetcher: Arc<dyn ResourceFetcher>) {
        let kind = fetcher.kind();
        if self.fetchers.insert(kind, fetcher).is_some() {
            tracing::debug!("Replaced fetcher for {}", kind);
        }
    }

    pub fn with(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.register(fetcher);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<Arc<dyn ResourceFetcher>> {
        self.fetchers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.fetchers.contains_key(&kind)
    }

    /// Registered kinds in canonical order
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<_> = self.fetchers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}
