// Copyright (c) 2019-present Dmitry Stepanov and Fyrox Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Everything related to nodes of a process tree.
//!
//! A process tree is a set of connected nodes, where each node has a single
//! parent and zero or more children. The tree decides which user handlers run,
//! in what order, and how their individual outcomes fold into a final result.
//! There is a fixed set of structural nodes (sequence, selector, parallel,
//! inverter) plus the handler leaf with user-defined logic.
//!
//! Every node carries a small amount of shared configuration: a name that is
//! unique among its siblings, a [`Priority`] rank, the insertion `order`
//! assigned by the builder, an optional conjunction of eligibility conditions
//! and a `read_only` flag that protects the node from being replaced when
//! trees from several sources are merged into one.

use crate::{
    session::ExecutionContext,
    status::{Priority, Status},
};
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use strum_macros::{AsRefStr, EnumString, VariantNames};

pub mod composite;
pub mod handler;
pub mod inverter;
pub mod parallel;

pub use composite::{CompositeKind, CompositeNode};
pub use handler::HandlerNode;
pub use inverter::InverterNode;
pub use parallel::{ParallelNode, ThresholdMode};

/// A user-defined action attached to a handler leaf.
pub type HandlerFn = Arc<dyn Fn(&mut ExecutionContext) -> Status + Send + Sync>;

/// A pure predicate that gates a node. A node with several conditions is
/// eligible only if all of them hold; a node without conditions is always
/// eligible. Conditions are evaluated once, at the moment the parent
/// composite freezes its working set.
pub type Condition = Arc<dyn Fn(&ExecutionContext) -> bool + Send + Sync>;

/// Kind of a node, used to match nodes of separate trees during a merge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, AsRefStr, EnumString, VariantNames)]
pub enum NodeKind {
    /// Leaf node with user-defined logic.
    Handler,
    /// Composite node implementing the AND aggregation.
    Sequence,
    /// Composite node implementing the OR aggregation.
    Selector,
    /// Composite node with count-based aggregation.
    Parallel,
    /// Decorator that flips success and failure of its single child.
    Inverter,
}

/// Configuration shared by every node variant.
#[derive(Clone)]
pub struct BaseNode {
    pub(crate) name: String,
    pub(crate) priority: Priority,
    pub(crate) order: u32,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) read_only: bool,
    pub(crate) status: Status,
}

impl BaseNode {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: Priority::default(),
            order: 0,
            conditions: Vec::new(),
            read_only: false,
            status: Status::Unknown,
        }
    }

    /// Copies the configuration of the node and resets its execution state.
    pub(crate) fn instantiate(&self) -> Self {
        Self {
            name: self.name.clone(),
            priority: self.priority,
            order: self.order,
            conditions: self.conditions.clone(),
            read_only: self.read_only,
            status: Status::Unknown,
        }
    }
}

impl Debug for BaseNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseNode")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("order", &self.order)
            .field("conditions", &self.conditions.len())
            .field("read_only", &self.read_only)
            .field("status", &self.status)
            .finish()
    }
}

/// Possible variations of process tree nodes.
#[derive(Debug)]
pub enum ProcessNode {
    /// Leaf node with user-defined logic.
    Handler(HandlerNode),
    /// Sequence or selector node.
    Composite(CompositeNode),
    /// Count-based aggregation node.
    Parallel(ParallelNode),
    /// A node that flips success and failure of its single child.
    Inverter(InverterNode),
}

impl ProcessNode {
    pub(crate) fn base(&self) -> &BaseNode {
        match self {
            ProcessNode::Handler(v) => &v.base,
            ProcessNode::Composite(v) => &v.base,
            ProcessNode::Parallel(v) => &v.base,
            ProcessNode::Inverter(v) => &v.base,
        }
    }

    pub(crate) fn base_mut(&mut self) -> &mut BaseNode {
        match self {
            ProcessNode::Handler(v) => &mut v.base,
            ProcessNode::Composite(v) => &mut v.base,
            ProcessNode::Parallel(v) => &mut v.base,
            ProcessNode::Inverter(v) => &mut v.base,
        }
    }

    /// Name of the node, unique among its siblings.
    pub fn name(&self) -> &str {
        &self.base().name
    }

    /// Priority rank of the node.
    pub fn priority(&self) -> Priority {
        self.base().priority
    }

    /// Insertion index assigned by the builder.
    pub fn order(&self) -> u32 {
        self.base().order
    }

    /// Whether the node is protected from being replaced during merges.
    pub fn is_read_only(&self) -> bool {
        self.base().read_only
    }

    /// Kind of the node. Sequence and selector composites report distinct
    /// kinds so merges never silently flip aggregation logic.
    pub fn kind(&self) -> NodeKind {
        match self {
            ProcessNode::Handler(_) => NodeKind::Handler,
            ProcessNode::Composite(v) => match v.kind {
                CompositeKind::Sequence => NodeKind::Sequence,
                CompositeKind::Selector => NodeKind::Selector,
            },
            ProcessNode::Parallel(_) => NodeKind::Parallel,
            ProcessNode::Inverter(_) => NodeKind::Inverter,
        }
    }

    /// Current status of the node. For inverters this is the mapped status of
    /// their child.
    pub fn status(&self) -> Status {
        match self {
            ProcessNode::Inverter(v) => v.status(),
            other => other.base().status,
        }
    }

    /// Children of the node, in registration order. Empty for handlers.
    pub fn children(&self) -> &[ProcessNode] {
        match self {
            ProcessNode::Handler(_) => &[],
            ProcessNode::Composite(v) => &v.children,
            ProcessNode::Parallel(v) => &v.children,
            ProcessNode::Inverter(v) => v
                .child
                .as_deref()
                .map(std::slice::from_ref)
                .unwrap_or(&[]),
        }
    }

    /// Searches for a direct child with the given name.
    pub fn find_child(&self, name: &str) -> Option<&ProcessNode> {
        self.children().iter().find(|c| c.name() == name)
    }

    /// Resolves a dotted path (`"a.b.c"`) against the descendants of the node.
    pub fn child_by_path(&self, path: &str) -> Option<&ProcessNode> {
        let mut node = self;
        for segment in path.split('.') {
            node = node.find_child(segment)?;
        }
        Some(node)
    }

    /// Runs the node within the given context and returns its new status.
    pub(crate) fn execute(&mut self, ctx: &mut ExecutionContext) -> Status {
        match self {
            ProcessNode::Handler(v) => v.execute(ctx),
            ProcessNode::Composite(v) => v.execute(ctx),
            ProcessNode::Parallel(v) => v.execute(ctx),
            ProcessNode::Inverter(v) => v.execute(ctx),
        }
    }

    /// Resolves a suspended node towards success. An empty path targets the
    /// currently parked child, otherwise the head of the path selects the
    /// child and the tail is passed down recursively.
    pub(crate) fn resume(&mut self, ctx: &mut ExecutionContext, path: &[&str]) -> Status {
        match self {
            // Leftover path segments address children a leaf does not have.
            ProcessNode::Handler(v) if !path.is_empty() => v.base.status,
            ProcessNode::Handler(v) => v.resume(ctx),
            ProcessNode::Composite(v) => v.resume(ctx, path),
            ProcessNode::Parallel(v) => v.resume(ctx, path),
            ProcessNode::Inverter(v) => v.resume(ctx, path),
        }
    }

    /// Resolves a suspended node towards failure. Addressing works the same
    /// way as in [`Self::resume`].
    pub(crate) fn fail(&mut self, ctx: &mut ExecutionContext, path: &[&str]) -> Status {
        match self {
            ProcessNode::Handler(v) if !path.is_empty() => v.base.status,
            ProcessNode::Handler(v) => v.fail(ctx),
            ProcessNode::Composite(v) => v.fail(ctx, path),
            ProcessNode::Parallel(v) => v.fail(ctx, path),
            ProcessNode::Inverter(v) => v.fail(ctx, path),
        }
    }

    /// Cancels the node together with every descendant that is not terminal
    /// yet. Cancellation cannot be undone.
    pub(crate) fn cancel(&mut self, ctx: &mut ExecutionContext) -> Status {
        match self {
            ProcessNode::Handler(v) => v.cancel(),
            ProcessNode::Composite(v) => v.cancel(ctx),
            ProcessNode::Parallel(v) => v.cancel(ctx),
            ProcessNode::Inverter(v) => v.cancel(ctx),
        }
    }

    /// Produces a fresh runnable copy of the node. Configuration (names,
    /// priorities, orders, conditions, tree shape) is preserved, execution
    /// state is reset. Handler copies keep the shared invocation counter of
    /// their template.
    pub fn instantiate(&self) -> ProcessNode {
        match self {
            ProcessNode::Handler(v) => ProcessNode::Handler(v.instantiate()),
            ProcessNode::Composite(v) => ProcessNode::Composite(v.instantiate()),
            ProcessNode::Parallel(v) => ProcessNode::Parallel(v.instantiate()),
            ProcessNode::Inverter(v) => ProcessNode::Inverter(v.instantiate()),
        }
    }
}

/// Checks the condition conjunction of a node. A condition that panics is
/// treated as not met.
pub(crate) fn conditions_met(node: &ProcessNode, ctx: &ExecutionContext) -> bool {
    node.base().conditions.iter().all(|condition| {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| condition(ctx)))
            .unwrap_or(false)
    })
}

/// Sorts eligible child indices so that the slice starts with the child that
/// must run first: higher priority wins, equal priorities keep registration
/// order.
pub(crate) fn sort_by_precedence(indices: &mut [usize], children: &[ProcessNode]) {
    indices.sort_by(|&a, &b| {
        children[b]
            .priority()
            .rank()
            .cmp(&children[a].priority().rank())
            .then(children[a].order().cmp(&children[b].order()))
    });
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
