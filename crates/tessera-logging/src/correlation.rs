//! Correlation IDs for batch processing
//!
//! A request batch gets one root context; each item gets a child linked to it,
//! so the log lines of one item can be told apart from its siblings while
//! still grouping under the batch's trace ID.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation context for one unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationContext {
    /// Root trace ID, shared by a batch and all of its items
    pub trace_id: Uuid,

    /// Span ID, unique to this unit of work
    pub span_id: Uuid,

    /// Parent span ID, for hierarchical tracing
    pub parent_span_id: Option<Uuid>,

    /// Position of the item inside its batch
    pub item_index: Option<usize>,

    /// Operation name of the item
    pub operation: Option<String>,
}

impl CorrelationContext {
    /// Create a new root context (one per request batch)
    pub fn new_root() -> Self {
        Self::with_trace_id(Uuid::new_v4())
    }

    /// Create a root context with a specific trace ID
    pub fn with_trace_id(trace_id: Uuid) -> Self {
        Self {
            trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            item_index: None,
            operation: None,
        }
    }

    /// Create a child context for the item at `index`
    pub fn child(&self, index: usize) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            item_index: Some(index),
            operation: None,
        }
    }

    /// Attach an operation name to this context
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn trace_id_str(&self) -> String {
        self.trace_id.to_string()
    }

    pub fn span_id_str(&self) -> String {
        self.span_id.to_string()
    }

    pub fn parent_span_id_str(&self) -> Option<String> {
        self.parent_span_id.map(|id| id.to_string())
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new_root()
    }
}

/// Helper trait to attach correlation context to tracing spans
///
/// Only fields declared on the span (as `tracing::field::Empty`) are recorded.
pub trait CorrelationExt {
    /// Record correlation fields on a span
    fn record_correlation(&self, ctx: &CorrelationContext);
}

impl CorrelationExt for tracing::Span {
    fn record_correlation(&self, ctx: &CorrelationContext) {
        self.record(fields::TRACE_ID, ctx.trace_id_str());
        self.record(fields::SPAN_ID, ctx.span_id_str());
        if let Some(parent) = ctx.parent_span_id_str() {
            self.record(fields::PARENT_SPAN_ID, parent);
        }
        if let Some(index) = ctx.item_index {
            self.record(fields::ITEM_INDEX, index as u64);
        }
        if let Some(ref operation) = ctx.operation {
            self.record(fields::OPERATION, operation.as_str());
        }
    }
}

/// Standard field names for correlation
pub mod fields {
    pub const TRACE_ID: &str = "trace_id";
    pub const SPAN_ID: &str = "span_id";
    pub const PARENT_SPAN_ID: &str = "parent_span_id";
    pub const ITEM_INDEX: &str = "item_index";
    pub const OPERATION: &str = "operation";
    pub const REQUEST_ID: &str = "request_id";
    pub const UNIQUE_ID: &str = "unique_id";
}

/// Standard span names
pub mod spans {
    pub const PROCESS_BATCH: &str = "process_batch";
    pub const BATCH_ITEM: &str = "batch_item";
}
