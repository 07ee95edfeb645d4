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

//! Fluent construction of process trees and the merge machinery that layers
//! trees from several sources (global registrations, per-target registrations,
//! local contributions) into a single runnable tree.
//!
//! Nodes of separate trees are matched by `(name, kind)`. A matched composite
//! deep-merges its children; a matched handler is replaced by the later side,
//! unless the earlier one is marked read only. Matched nodes keep the order
//! of the earlier side, their conditions are conjoined and the read only flag
//! of either side sticks. A name that exists on both sides with incompatible
//! kinds is a construction error.
//!
//! Structural misuse of the node builders themselves, such as giving an
//! inverter a second child, panics right away; the affected tree could never
//! run and there is nothing sensible to recover to.

use crate::{
    error::TreeError,
    log::Log,
    node::{
        BaseNode, CompositeKind, CompositeNode, Condition, HandlerFn, HandlerNode, InverterNode,
        ParallelNode, ProcessNode, ThresholdMode,
    },
    session::ExecutionContext,
    status::{Priority, Status},
};
use std::sync::Arc;

/// Name shared by every builder-created root node, so that trees registered
/// from separate sources merge at the child level.
pub const ROOT_NAME: &str = "root";

/// Kind of the composite created as the root of a built tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RootKind {
    /// All eligible children must succeed.
    Sequence,
    /// Children are fallbacks.
    Selector,
    /// Count-based aggregation of children.
    Parallel,
}

/// Common configuration shared by every node builder.
pub struct BaseNodeBuilder {
    name: String,
    priority: Priority,
    conditions: Vec<Condition>,
    read_only: bool,
}

impl BaseNodeBuilder {
    /// Starts a builder for a node with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: Priority::default(),
            conditions: Vec::new(),
            read_only: false,
        }
    }

    /// Sets the priority rank of the node.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds an eligibility condition. All conditions of a node must hold for
    /// the node to enter the working set of its parent.
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.conditions.push(Arc::new(condition));
        self
    }

    /// Protects the node from being replaced during merges.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    fn build_base(self) -> BaseNode {
        let mut base = BaseNode::new(self.name);
        base.priority = self.priority;
        base.conditions = self.conditions;
        base.read_only = self.read_only;
        base
    }
}

/// Builder for handler leaves.
pub struct HandlerBuilder {
    base: BaseNodeBuilder,
    func: Option<HandlerFn>,
}

impl HandlerBuilder {
    /// Starts a handler builder with the given common configuration.
    pub fn new(base: BaseNodeBuilder) -> Self {
        Self { base, func: None }
    }

    /// Sets the user function of the handler. A handler without a function
    /// resolves to success as soon as it runs.
    pub fn with_func<F>(mut self, func: F) -> Self
    where
        F: Fn(&mut ExecutionContext) -> Status + Send + Sync + 'static,
    {
        self.func = Some(Arc::new(func));
        self
    }

    /// Creates the handler node.
    pub fn build(self) -> ProcessNode {
        let func = self
            .func
            .unwrap_or_else(|| Arc::new(|_: &mut ExecutionContext| Status::Success));
        ProcessNode::Handler(HandlerNode::new(self.base.build_base(), func))
    }
}

/// Builder for sequence and selector composites.
pub struct CompositeBuilder {
    base: BaseNodeBuilder,
    kind: CompositeKind,
    children: Vec<ProcessNode>,
}

impl CompositeBuilder {
    /// Starts a sequence builder with the given common configuration.
    pub fn new_sequence(base: BaseNodeBuilder) -> Self {
        Self {
            base,
            kind: CompositeKind::Sequence,
            children: Vec::new(),
        }
    }

    /// Starts a selector builder with the given common configuration.
    pub fn new_selector(base: BaseNodeBuilder) -> Self {
        Self {
            base,
            kind: CompositeKind::Selector,
            children: Vec::new(),
        }
    }

    /// Appends a child. A child with a name that is already taken by a child
    /// of the same kind merges with it; a name collision across kinds is a
    /// construction error and panics.
    pub fn with_child(mut self, node: ProcessNode) -> Self {
        if let Err(error) = merge_into_children(&mut self.children, node, &self.base.name) {
            panic!("malformed composite: {}", error);
        }
        self
    }

    /// Creates the composite node.
    pub fn build(self) -> ProcessNode {
        let mut node = CompositeNode::new(self.kind, self.base.build_base());
        node.children = self.children;
        ProcessNode::Composite(node)
    }
}

/// Builder for parallel nodes.
pub struct ParallelBuilder {
    base: BaseNodeBuilder,
    required_successes: u32,
    required_failures: u32,
    mode: ThresholdMode,
    children: Vec<ProcessNode>,
}

impl ParallelBuilder {
    /// Starts a parallel builder with the given common configuration.
    pub fn new(base: BaseNodeBuilder) -> Self {
        Self {
            base,
            required_successes: 0,
            required_failures: 0,
            mode: ThresholdMode::default(),
            children: Vec::new(),
        }
    }

    /// Number of successful children needed for the node to succeed. Zero
    /// means every eligible child must succeed.
    pub fn with_required_successes(mut self, count: u32) -> Self {
        self.required_successes = count;
        self
    }

    /// Number of failed children needed for the node to fail. Zero means any
    /// failure fails the node.
    pub fn with_required_failures(mut self, count: u32) -> Self {
        self.required_failures = count;
        self
    }

    /// Sets the tie breaker used when both thresholds are satisfied at once
    /// or neither can be reached anymore.
    pub fn with_threshold_mode(mut self, mode: ThresholdMode) -> Self {
        self.mode = mode;
        self
    }

    /// Appends a child, with the same collision rules as [`CompositeBuilder::with_child`].
    pub fn with_child(mut self, node: ProcessNode) -> Self {
        if let Err(error) = merge_into_children(&mut self.children, node, &self.base.name) {
            panic!("malformed parallel: {}", error);
        }
        self
    }

    /// Creates the parallel node.
    pub fn build(self) -> ProcessNode {
        let mut node = ParallelNode::new(self.base.build_base());
        node.required_successes = self.required_successes;
        node.required_failures = self.required_failures;
        node.mode = self.mode;
        node.children = self.children;
        ProcessNode::Parallel(node)
    }
}

/// Builder for inverter decorators.
pub struct InverterBuilder {
    base: BaseNodeBuilder,
    child: Option<ProcessNode>,
}

impl InverterBuilder {
    /// Starts an inverter builder with the given common configuration.
    pub fn new(base: BaseNodeBuilder) -> Self {
        Self { base, child: None }
    }

    /// Sets the single child of the inverter. Panics if a child was already
    /// set; an inverter holds exactly one child.
    pub fn with_child(mut self, node: ProcessNode) -> Self {
        if self.child.is_some() {
            panic!("inverter '{}' can hold only a single child", self.base.name);
        }
        self.child = Some(node);
        self
    }

    /// Creates the inverter node.
    pub fn build(self) -> ProcessNode {
        let mut node = InverterNode::new(self.base.build_base());
        node.child = self.child.map(Box::new);
        ProcessNode::Inverter(node)
    }
}

/// Assembles a whole tree around a root composite and merges fragments from
/// other sources into it. Unlike the node builders above, errors here are
/// reported through [`TreeBuilder::build`]: colliding registrations come from
/// independent call sites and the caller must be able to observe the
/// conflict.
pub struct TreeBuilder {
    root: ProcessNode,
    error: Option<TreeError>,
}

impl TreeBuilder {
    /// Creates a builder with a fresh root of the given kind.
    pub fn new(kind: RootKind) -> Self {
        let base = BaseNode::new(ROOT_NAME);
        let root = match kind {
            RootKind::Sequence => {
                ProcessNode::Composite(CompositeNode::new(CompositeKind::Sequence, base))
            }
            RootKind::Selector => {
                ProcessNode::Composite(CompositeNode::new(CompositeKind::Selector, base))
            }
            RootKind::Parallel => ProcessNode::Parallel(ParallelNode::new(base)),
        };
        Self { root, error: None }
    }

    /// Creates a builder that continues an already assembled tree.
    pub fn from_root(root: ProcessNode) -> Self {
        Self { root, error: None }
    }

    /// A read-only view of the tree assembled so far.
    pub fn root(&self) -> &ProcessNode {
        &self.root
    }

    /// Appends a node to the root, merging it with an existing node of the
    /// same name and kind.
    pub fn with_child(mut self, node: ProcessNode) -> Self {
        if self.error.is_none() {
            if let Err(error) = attach_child(&mut self.root, node) {
                self.error = Some(error);
            }
        }
        self
    }

    /// Merges another tree into the current root context. The source root
    /// itself is treated as a context, not as a node to match: its children
    /// are merged one by one, its own configuration is discarded.
    pub fn with_merged(mut self, tree: ProcessNode) -> Self {
        if self.error.is_none() {
            let children = match tree {
                ProcessNode::Composite(composite) => composite.children,
                ProcessNode::Parallel(parallel) => parallel.children,
                leaf => vec![leaf],
            };
            for child in children {
                if let Err(error) = attach_child(&mut self.root, child) {
                    self.error = Some(error);
                    break;
                }
            }
        }
        self
    }

    /// Finishes the tree, reporting the first construction error that was
    /// latched while assembling it.
    pub fn build(self) -> Result<ProcessNode, TreeError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.root),
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn next_order(children: &[ProcessNode]) -> u32 {
    children.iter().map(|c| c.order() + 1).max().unwrap_or(0)
}

fn attach_child(parent: &mut ProcessNode, node: ProcessNode) -> Result<(), TreeError> {
    let parent_name = parent.name().to_owned();
    match parent {
        ProcessNode::Composite(composite) => {
            merge_into_children(&mut composite.children, node, &parent_name)
        }
        ProcessNode::Parallel(parallel) => {
            merge_into_children(&mut parallel.children, node, &parent_name)
        }
        ProcessNode::Inverter(inverter) => match inverter.child.as_deref_mut() {
            None => {
                inverter.child = Some(Box::new(node));
                Ok(())
            }
            Some(existing) if existing.name() == node.name() => {
                let path = join_path(&parent_name, node.name());
                merge_nodes(existing, node, &path)
            }
            Some(_) => Err(TreeError::InverterChildConflict { path: parent_name }),
        },
        ProcessNode::Handler(_) => Err(TreeError::ChildrenNotSupported { path: parent_name }),
    }
}

fn merge_into_children(
    children: &mut Vec<ProcessNode>,
    incoming: ProcessNode,
    parent_path: &str,
) -> Result<(), TreeError> {
    let path = join_path(parent_path, incoming.name());
    match children
        .iter_mut()
        .find(|existing| existing.name() == incoming.name())
    {
        Some(existing) => merge_nodes(existing, incoming, &path),
        None => {
            let order = next_order(children);
            let mut incoming = incoming;
            incoming.base_mut().order = order;
            children.push(incoming);
            Ok(())
        }
    }
}

fn merge_nodes(
    existing: &mut ProcessNode,
    incoming: ProcessNode,
    path: &str,
) -> Result<(), TreeError> {
    if existing.kind() != incoming.kind() {
        return Err(TreeError::KindMismatch {
            path: path.to_owned(),
            existing: existing.kind(),
            incoming: incoming.kind(),
        });
    }

    match (&mut *existing, incoming) {
        (ProcessNode::Handler(old), ProcessNode::Handler(new)) => {
            if old.base.read_only {
                Log::warn(format!(
                    "Handler '{}' is read only and keeps its registered behavior",
                    path
                ));
                return Ok(());
            }
            // The later handler replaces the earlier one, keeping the slot:
            // the earlier order stays, conditions of both sides must hold.
            let mut new = new;
            new.base.order = old.base.order;
            let mut conditions = std::mem::take(&mut old.base.conditions);
            conditions.extend(new.base.conditions);
            new.base.conditions = conditions;
            *old = new;
        }
        (ProcessNode::Composite(old), ProcessNode::Composite(new)) => {
            merge_common(&mut old.base, new.base);
            for child in new.children {
                merge_into_children(&mut old.children, child, path)?;
            }
        }
        (ProcessNode::Parallel(old), ProcessNode::Parallel(new)) => {
            if !old.base.read_only {
                old.required_successes = new.required_successes;
                old.required_failures = new.required_failures;
                old.mode = new.mode;
            }
            merge_common(&mut old.base, new.base);
            for child in new.children {
                merge_into_children(&mut old.children, child, path)?;
            }
        }
        (ProcessNode::Inverter(old), ProcessNode::Inverter(new)) => {
            merge_common(&mut old.base, new.base);
            if let Some(new_child) = new.child {
                match old.child.as_deref_mut() {
                    None => old.child = Some(new_child),
                    Some(old_child) if old_child.name() == new_child.name() => {
                        let child_path = join_path(path, old_child.name());
                        merge_nodes(old_child, *new_child, &child_path)?;
                    }
                    Some(_) => {
                        return Err(TreeError::InverterChildConflict {
                            path: path.to_owned(),
                        })
                    }
                }
            }
        }
        // Kinds were compared above.
        _ => unreachable!(),
    }
    Ok(())
}

// Folds the common configuration of a matched pair: the earlier side keeps
// its slot and rank, conditions are conjoined, read only sticks. A read only
// node keeps its configuration untouched.
fn merge_common(old: &mut BaseNode, new: BaseNode) {
    if old.read_only {
        return;
    }
    old.conditions.extend(new.conditions);
    old.read_only |= new.read_only;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::NodeKind;

    fn handler(name: &str) -> ProcessNode {
        HandlerBuilder::new(BaseNodeBuilder::new(name)).build()
    }

    /// Renders the observable shape of a tree: names, kinds, orders, read
    /// only flags and condition counts, recursively.
    fn shape(node: &ProcessNode) -> String {
        let mut out = format!(
            "{}:{}@{}{}c{}",
            node.kind().as_ref(),
            node.name(),
            node.order(),
            if node.is_read_only() { "!" } else { "" },
            node.base().conditions.len(),
        );
        if !node.children().is_empty() {
            let inner: Vec<String> = node.children().iter().map(shape).collect();
            out.push_str(&format!("[{}]", inner.join(",")));
        }
        out
    }

    #[test]
    fn orders_are_assigned_in_registration_sequence() {
        let tree = TreeBuilder::new(RootKind::Selector)
            .with_child(handler("a"))
            .with_child(handler("b"))
            .with_child(handler("c"))
            .build()
            .unwrap();
        let orders: Vec<u32> = tree.children().iter().map(|c| c.order()).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn merging_an_empty_tree_changes_nothing() {
        let tree = TreeBuilder::new(RootKind::Selector)
            .with_child(handler("a"))
            .with_child(
                CompositeBuilder::new_sequence(BaseNodeBuilder::new("seq"))
                    .with_child(handler("x"))
                    .build(),
            )
            .build()
            .unwrap();
        let before = shape(&tree);
        let merged = TreeBuilder::from_root(tree)
            .with_merged(TreeBuilder::new(RootKind::Selector).build().unwrap())
            .build()
            .unwrap();
        assert_eq!(shape(&merged), before);
    }

    #[test]
    fn merging_a_tree_into_itself_is_idempotent() {
        let build = || {
            TreeBuilder::new(RootKind::Selector)
                .with_child(handler("a"))
                .with_child(
                    CompositeBuilder::new_sequence(BaseNodeBuilder::new("seq"))
                        .with_child(handler("x"))
                        .with_child(handler("y"))
                        .build(),
                )
                .build()
                .unwrap()
        };
        let original = build();
        let before = shape(&original);
        let merged = TreeBuilder::from_root(original)
            .with_merged(build())
            .build()
            .unwrap();
        assert_eq!(shape(&merged), before);
    }

    #[test]
    fn matched_composites_merge_their_children() {
        let first = TreeBuilder::new(RootKind::Selector)
            .with_child(
                CompositeBuilder::new_sequence(BaseNodeBuilder::new("pay"))
                    .with_child(handler("check"))
                    .build(),
            )
            .build()
            .unwrap();
        let second = TreeBuilder::new(RootKind::Selector)
            .with_child(
                CompositeBuilder::new_sequence(BaseNodeBuilder::new("pay"))
                    .with_child(handler("charge"))
                    .build(),
            )
            .build()
            .unwrap();
        let merged = TreeBuilder::from_root(first)
            .with_merged(second)
            .build()
            .unwrap();
        let pay = merged.find_child("pay").unwrap();
        assert_eq!(pay.children().len(), 2);
        assert_eq!(pay.children()[0].name(), "check");
        assert_eq!(pay.children()[1].name(), "charge");
        assert_eq!(pay.children()[1].order(), 1);
    }

    #[test]
    fn later_handler_replaces_earlier_one_in_place() {
        let first = TreeBuilder::new(RootKind::Selector)
            .with_child(handler("log"))
            .with_child(handler("tail"))
            .build()
            .unwrap();
        let replacement = HandlerBuilder::new(
            BaseNodeBuilder::new("log")
                .with_priority(Priority::High)
                .with_condition(|_| true),
        )
        .build();
        let merged = TreeBuilder::from_root(first)
            .with_child(replacement)
            .build()
            .unwrap();
        let log = merged.find_child("log").unwrap();
        // The slot is kept, the configuration of the later side wins.
        assert_eq!(log.order(), 0);
        assert_eq!(log.priority(), Priority::High);
        assert_eq!(log.base().conditions.len(), 1);
    }

    #[test]
    fn read_only_handler_survives_the_merge() {
        let first = TreeBuilder::new(RootKind::Selector)
            .with_child(
                CompositeBuilder::new_sequence(BaseNodeBuilder::new("pay"))
                    .with_child(
                        HandlerBuilder::new(
                            BaseNodeBuilder::new("log")
                                .with_priority(Priority::Critical)
                                .with_read_only(true),
                        )
                        .build(),
                    )
                    .build(),
            )
            .build()
            .unwrap();
        let second = TreeBuilder::new(RootKind::Selector)
            .with_child(
                CompositeBuilder::new_sequence(BaseNodeBuilder::new("pay"))
                    .with_child(handler("log"))
                    .with_child(handler("audit"))
                    .build(),
            )
            .build()
            .unwrap();
        let merged = TreeBuilder::from_root(first)
            .with_merged(second)
            .build()
            .unwrap();
        let pay = merged.find_child("pay").unwrap();
        let log = pay.find_child("log").unwrap();
        assert!(log.is_read_only());
        assert_eq!(log.priority(), Priority::Critical);
        // The sibling that did not collide still merged in.
        assert!(pay.find_child("audit").is_some());
    }

    #[test]
    fn kind_conflict_is_reported() {
        let first = TreeBuilder::new(RootKind::Selector)
            .with_child(handler("pay"))
            .build()
            .unwrap();
        let second = TreeBuilder::new(RootKind::Selector)
            .with_child(
                CompositeBuilder::new_sequence(BaseNodeBuilder::new("pay")).build(),
            )
            .build()
            .unwrap();
        let result = TreeBuilder::from_root(first).with_merged(second).build();
        assert_eq!(
            result.unwrap_err(),
            TreeError::KindMismatch {
                path: "root.pay".to_owned(),
                existing: NodeKind::Handler,
                incoming: NodeKind::Sequence,
            }
        );
    }

    #[test]
    #[should_panic(expected = "single child")]
    fn inverter_rejects_a_second_child() {
        let _ = InverterBuilder::new(BaseNodeBuilder::new("not"))
            .with_child(handler("a"))
            .with_child(handler("b"));
    }

    #[test]
    fn matched_inverters_merge_their_child() {
        let first = TreeBuilder::new(RootKind::Selector)
            .with_child(
                InverterBuilder::new(BaseNodeBuilder::new("not"))
                    .with_child(handler("inner"))
                    .build(),
            )
            .build()
            .unwrap();
        let second = TreeBuilder::new(RootKind::Selector)
            .with_child(
                InverterBuilder::new(BaseNodeBuilder::new("not"))
                    .with_child(handler("other"))
                    .build(),
            )
            .build()
            .unwrap();
        let result = TreeBuilder::from_root(first).with_merged(second).build();
        assert_eq!(
            result.unwrap_err(),
            TreeError::InverterChildConflict {
                path: "root.not".to_owned(),
            }
        );
    }

    #[test]
    fn sequence_and_selector_do_not_match_each_other() {
        let first = TreeBuilder::new(RootKind::Selector)
            .with_child(CompositeBuilder::new_sequence(BaseNodeBuilder::new("flow")).build())
            .build()
            .unwrap();
        let second = TreeBuilder::new(RootKind::Selector)
            .with_child(CompositeBuilder::new_selector(BaseNodeBuilder::new("flow")).build())
            .build()
            .unwrap();
        assert!(TreeBuilder::from_root(first).with_merged(second).build().is_err());
    }
}
