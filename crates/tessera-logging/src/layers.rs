//! Custom tracing layers for Tessera KMS
//!
//! Injects the active request context into spans.

use tracing::{Subscriber, span};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::LookupSpan,
};

use crate::context::{RequestContextData, RequestContextGuard};

/// Layer that attaches the active request context to new spans
///
/// The context is available to later layers through the span's extensions
/// whenever a [`RequestContextGuard`] is active.
#[derive(Debug, Default)]
pub struct RequestContextLayer;

impl RequestContextLayer {
    /// Create a new request context layer
    pub fn new() -> Self {
        Self
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct RequestContextExtension {
    pub data: RequestContextData,
}

impl<S> Layer<S> for RequestContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id)
            && let Some(request) = RequestContextGuard::current()
        {
            span.extensions_mut()
                .insert(RequestContextExtension { data: request });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;
    use uuid::Uuid;

    /// Records the request ID seen on each span's extension at close
    struct SpanRecorder(Arc<Mutex<Vec<Option<Uuid>>>>);

    impl<S> Layer<S> for SpanRecorder
    where
        S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    {
        fn on_close(&self, id: span::Id, ctx: Context<'_, S>) {
            let seen = ctx.span(&id).and_then(|span| {
                span.extensions()
                    .get::<RequestContextExtension>()
                    .map(|ext| ext.data.request_id)
            });
            self.0.lock().unwrap().push(seen);
        }
    }

    #[test]
    fn test_layer_attaches_request_context() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry()
            .with(RequestContextLayer::new())
            .with(SpanRecorder(Arc::clone(&seen)));

        let request_id = Uuid::new_v4();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info_span!("outside").in_scope(|| {});
            let _guard = RequestContextGuard::new(request_id);
            tracing::info_span!("inside").in_scope(|| {});
        });

        assert_eq!(*seen.lock().unwrap(), vec![None, Some(request_id)]);
    }
}
