//! Request context injection
//!
//! Thread-local storage for the request being processed, so every span opened
//! while a batch runs carries its `request_id` and current `operation`.

use std::cell::RefCell;

use uuid::Uuid;

/// Request context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContextData {
    /// Identifier shared by every item of one request batch
    pub request_id: Uuid,
    /// Operation of the batch item being processed
    pub operation: Option<String>,
}

thread_local! {
    static REQUEST_CONTEXT: RefCell<Option<RequestContextData>> = const { RefCell::new(None) };
}

/// RAII guard for request context
///
/// Creating the guard sets the request context for the current thread.
/// Dropping it restores the previous context (if any).
///
/// # Example
///
/// ```ignore
/// use tessera_logging::RequestContextGuard;
///
/// let _batch = RequestContextGuard::new(request_id);
/// for item in items {
///     let _item = RequestContextGuard::for_operation(item.operation.name());
///     tracing::info!("Processing item");
/// }
/// ```
pub struct RequestContextGuard {
    previous: Option<RequestContextData>,
}

impl RequestContextGuard {
    /// Enter a request with no operation selected yet
    pub fn new(request_id: Uuid) -> Self {
        Self::install(RequestContextData {
            request_id,
            operation: None,
        })
    }

    /// Narrow the current request to one operation
    ///
    /// Outside any request a fresh request ID is allocated.
    pub fn for_operation(operation: impl Into<String>) -> Self {
        let request_id = Self::current_request_id().unwrap_or_else(Uuid::new_v4);
        Self::install(RequestContextData {
            request_id,
            operation: Some(operation.into()),
        })
    }

    fn install(data: RequestContextData) -> Self {
        let previous = REQUEST_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// Get the current request context (if any)
    pub fn current() -> Option<RequestContextData> {
        REQUEST_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current request ID (if set)
    pub fn current_request_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.request_id)
    }

    /// Get the current operation (if set)
    pub fn current_operation() -> Option<String> {
        Self::current().and_then(|ctx| ctx.operation)
    }
}

impl Drop for RequestContextGuard {
    fn drop(&mut self) {
        REQUEST_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}
