//! Event handler registry.
//!
//! Maps each [`EventKind`] to an ordered list of async handlers. Registration
//! is append-only; dispatch snapshots the list so no lock is held while a
//! handler runs.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::logging::LogContext;
use crate::protocol::{EventKind, ServerEvent};

/// Future returned by a boxed handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Type-erased handler closure.
type Handler = Arc<dyn Fn(Arc<ServerEvent>) -> HandlerFuture + Send + Sync>;

/// Handlers keyed by event kind, invoked in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<EventKind, usize> =
            handlers.iter().map(|(kind, list)| (*kind, list.len())).collect();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

impl HandlerRegistry {
    /// Append a handler for `kind`.
    pub fn add<F, Fut>(&self, kind: EventKind, handler: F)
    where
        F: Fn(Arc<ServerEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event| handler(event).boxed());
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(handler);
    }

    /// Number of handlers registered for `kind`.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    fn snapshot(&self, kind: EventKind) -> Vec<Handler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Run every handler registered for the event's kind, one after another.
    ///
    /// A handler that fails or panics is logged and skipped; the remaining
    /// handlers still see the event.
    pub async fn dispatch(&self, event: ServerEvent, log: &LogContext) {
        let kind = event.kind();
        let event = Arc::new(event);

        for handler in self.snapshot(kind) {
            let event = Arc::clone(&event);
            let outcome = AssertUnwindSafe(async move { handler(event).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!(target: log.target(), "Handler for '{}' failed: {:#}", kind, e);
                }
                Err(_) => {
                    log::error!(target: log.target(), "Handler for '{}' panicked", kind);
                }
            }
        }
    }
}
