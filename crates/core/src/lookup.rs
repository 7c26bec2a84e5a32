//! Catalog lookup: the single-shot, callback-completing fetch contract.

pub mod rakuten;

use reqwest::Url;

use crate::error::LookupError;

/// Outcome of one catalog query. There is no partial state.
pub type CatalogQueryResult = Result<CatalogItem, LookupError>;

/// Receives the result of a [`CatalogProvider::fetch`].
pub type CompletionHandler = Box<dyn FnOnce(CatalogQueryResult) + Send + 'static>;

/// A remote bibliographic catalog.
///
/// `fetch` must return without waiting on the network, issue exactly one
/// request, and call `on_complete` exactly once from a different execution
/// context than the caller's.
pub trait CatalogProvider: Send + Sync {
    fn name(&self) -> &str;
    fn fetch(&self, isbn: &str, on_complete: CompletionHandler);
}

/// Owns a [`CompletionHandler`] and guarantees it is called exactly once.
///
/// If the guard is dropped before [`complete`](Self::complete) (the fetch task
/// was cancelled, its runtime shut down or the task panicked), the handler
/// receives [`LookupError::Transport`] from the drop.
pub struct CompletionGuard {
    handler: Option<CompletionHandler>,
}

impl CompletionGuard {
    pub fn new(handler: CompletionHandler) -> Self {
        Self {
            handler: Some(handler),
        }
    }

    pub fn complete(mut self, result: CatalogQueryResult) {
        if let Some(handler) = self.handler.take() {
            handler(result);
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            tracing::warn!("catalog lookup dropped before completing");
            handler(Err(LookupError::Transport(LOOKUP_CANCELLED.to_string())));
        }
    }
}

/// Transport message delivered when a lookup never ran to completion.
pub const LOOKUP_CANCELLED: &str = "lookup cancelled";

/// Fields extracted from the first catalog item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogItem {
    pub title: Option<String>,
    pub storefront_url: Option<Url>,
}
