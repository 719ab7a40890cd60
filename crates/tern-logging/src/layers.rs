//! Tracing layers for the Tern runtime

use tracing::{Subscriber, span};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::LookupSpan,
};

use crate::context::{NodeContextData, NodeContextGuard};

/// Attaches the active [`NodeContextGuard`] data to every new span
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeContextLayer;

impl NodeContextLayer {
    pub fn new() -> Self {
        Self
    }
}

/// Span extension holding the node identity
#[derive(Debug, Clone)]
pub struct NodeContextExtension {
    pub data: NodeContextData,
}

impl<S> Layer<S> for NodeContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        // Spans opened outside a guard inherit their parent's node.
        let data = NodeContextGuard::current().or_else(|| {
            let parent = span.parent()?;
            let extensions = parent.extensions();
            let inherited = extensions
                .get::<NodeContextExtension>()
                .map(|ext| ext.data.clone());
            inherited
        });
        if let Some(data) = data {
            span.extensions_mut().insert(NodeContextExtension { data });
        }
    }
}
