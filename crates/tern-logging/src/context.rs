//! Per-node logging context
//!
//! Several simulated nodes can share one process. A [`NodeContextGuard`]
//! marks the current thread as working for one of them, and spans opened
//! while it is alive carry that node's identity.

use std::cell::RefCell;
use std::fmt;

use tern_core::{PlatformConfig, TimeMode};
use uuid::Uuid;

/// Node identity attached to spans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContextData {
    /// Simulation node id, 0 for a real-time node
    pub node_id: u16,
    /// How the node's clock advances
    pub time_kind: TimeKind,
    /// Unique id for this run of the node
    pub instance_id: Uuid,
}

/// Clock flavour of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeKind {
    Real,
    Virtual,
}

impl fmt::Display for TimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeKind::Real => write!(f, "real"),
            TimeKind::Virtual => write!(f, "virtual"),
        }
    }
}

impl From<&TimeMode> for TimeKind {
    fn from(mode: &TimeMode) -> Self {
        match mode {
            TimeMode::Real => TimeKind::Real,
            TimeMode::Virtual(_) => TimeKind::Virtual,
        }
    }
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for the node context
///
/// Dropping the guard restores whatever context was active before it.
///
/// ```ignore
/// let config = PlatformConfig::simulation(3);
/// let _guard = NodeContextGuard::for_config(&config);
/// let _span = NodeContextGuard::span().entered();
/// tracing::info!("node up"); // carries node_id = 3
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    /// Enter the context of `node_id` with a fresh instance id
    pub fn new(node_id: u16, time_kind: TimeKind) -> Self {
        Self::with_instance_id(node_id, time_kind, Uuid::new_v4())
    }

    /// Enter a context with a fixed instance id
    pub fn with_instance_id(node_id: u16, time_kind: TimeKind, instance_id: Uuid) -> Self {
        let data = NodeContextData {
            node_id,
            time_kind,
            instance_id,
        };
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// Enter the context described by a platform configuration
    pub fn for_config(config: &PlatformConfig) -> Self {
        let node_id = match &config.time_mode {
            TimeMode::Virtual(vt) => vt.node_id,
            TimeMode::Real => 0,
        };
        Self::new(node_id, TimeKind::from(&config.time_mode))
    }

    /// The active context, if any
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    pub fn current_node_id() -> Option<u16> {
        Self::current().map(|ctx| ctx.node_id)
    }

    pub fn current_instance_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.instance_id)
    }

    /// A span recording the active node's identity as fields.
    ///
    /// Formatters print span fields, so events inside this span show the
    /// node they came from. Without an active context the fields are empty.
    pub fn span() -> tracing::Span {
        match Self::current() {
            Some(ctx) => tracing::info_span!(
                "node",
                node_id = ctx.node_id,
                time = %ctx.time_kind,
                instance_id = %ctx.instance_id,
            ),
            None => tracing::info_span!(
                "node",
                node_id = tracing::field::Empty,
                time = tracing::field::Empty,
                instance_id = tracing::field::Empty,
            ),
        }
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = previous);
    }
}

/// Run a block inside a node context
///
/// ```ignore
/// with_node_context!(2, TimeKind::Virtual, {
///     tracing::info!("inside node 2");
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($node_id:expr, $kind:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($node_id, $kind);
        $body
    }};
}
