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

//! Composite node is a container for children nodes. Composite node could be
//! either `Sequence` or `Selector`. `Sequence` drives eligible children one by
//! one and succeeds only if all of them succeed, implementing the logical AND
//! function. `Selector` drives eligible children until one of them succeeds,
//! implementing the logical OR function.
//!
//! On the first execution the composite freezes its working set: children
//! whose conditions hold, sorted by priority rank and then by registration
//! order. The set is not recomputed mid-run, so adding or removing eligibility
//! after processing started has no effect on the running node. A child that
//! suspends parks the whole composite; `resume`/`fail` re-enter the drive loop
//! from the parked child and continue from there.

use crate::{
    node::{conditions_met, sort_by_precedence, BaseNode, ProcessNode},
    session::ExecutionContext,
    status::Status,
};

/// Defines exact behavior of the composite node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompositeKind {
    /// Children must all succeed, in order; the first failure fails the node.
    Sequence,
    /// Children are fallbacks; the first success resolves the node.
    Selector,
}

impl Default for CompositeKind {
    fn default() -> Self {
        Self::Sequence
    }
}

/// See module docs.
#[derive(Debug)]
pub struct CompositeNode {
    pub(crate) base: BaseNode,
    pub(crate) kind: CompositeKind,
    pub(crate) children: Vec<ProcessNode>,
    // Frozen working set: indices of eligible children in precedence order.
    pub(crate) available: Vec<usize>,
    // Remaining work in reverse precedence order, so pop() yields the next
    // child to drive.
    work_stack: Vec<usize>,
    current: Option<usize>,
    is_processing: bool,
}

impl CompositeNode {
    pub(crate) fn new(kind: CompositeKind, base: BaseNode) -> Self {
        Self {
            base,
            kind,
            children: Vec::new(),
            available: Vec::new(),
            work_stack: Vec::new(),
            current: None,
            is_processing: false,
        }
    }

    /// The kind of the composite.
    pub fn composite_kind(&self) -> CompositeKind {
        self.kind
    }

    pub(crate) fn execute(&mut self, ctx: &mut ExecutionContext) -> Status {
        if self.base.status.is_terminal() {
            return self.base.status;
        }
        if !self.is_processing {
            self.freeze_working_set(ctx);
        }
        self.drive(ctx)
    }

    fn freeze_working_set(&mut self, ctx: &ExecutionContext) {
        let mut eligible: Vec<usize> = (0..self.children.len())
            .filter(|&i| conditions_met(&self.children[i], ctx))
            .collect();
        sort_by_precedence(&mut eligible, &self.children);
        self.available = eligible.clone();
        eligible.reverse();
        self.work_stack = eligible;
        self.current = self.work_stack.pop();
        self.is_processing = true;
    }

    fn drive(&mut self, ctx: &mut ExecutionContext) -> Status {
        while let Some(index) = self.current {
            let status = {
                let child = &mut self.children[index];
                if child.status().is_terminal() {
                    child.status()
                } else {
                    ctx.enter(child.name());
                    child.execute(ctx);
                    ctx.leave();
                    child.status()
                }
            };
            match status {
                Status::Cancelled => {
                    self.cancel_descendants(ctx);
                    self.base.status = Status::Cancelled;
                    return self.base.status;
                }
                Status::Waiting | Status::Unknown => {
                    // The child is not settled; park here and keep it current
                    // so an unaddressed resume lands on it.
                    self.base.status = Status::Waiting;
                    return self.base.status;
                }
                Status::Success => match self.kind {
                    CompositeKind::Sequence => self.current = self.work_stack.pop(),
                    CompositeKind::Selector => {
                        self.base.status = Status::Success;
                        return self.base.status;
                    }
                },
                Status::Failure => match self.kind {
                    CompositeKind::Sequence => {
                        self.base.status = Status::Failure;
                        return self.base.status;
                    }
                    CompositeKind::Selector => self.current = self.work_stack.pop(),
                },
            }
        }

        // The working set is exhausted. All children of a sequence succeeded;
        // all fallbacks of a selector failed. An empty working set resolves
        // the same way.
        self.base.status = match self.kind {
            CompositeKind::Sequence => Status::Success,
            CompositeKind::Selector => Status::Failure,
        };
        self.base.status
    }

    pub(crate) fn resume(&mut self, ctx: &mut ExecutionContext, path: &[&str]) -> Status {
        self.settle(ctx, path, true)
    }

    pub(crate) fn fail(&mut self, ctx: &mut ExecutionContext, path: &[&str]) -> Status {
        self.settle(ctx, path, false)
    }

    fn settle(&mut self, ctx: &mut ExecutionContext, path: &[&str], success: bool) -> Status {
        if self.base.status.is_terminal() || !self.is_processing {
            return self.base.status;
        }
        let target = match path.first() {
            None => self.current,
            Some(&head) => self
                .available
                .iter()
                .copied()
                .find(|&i| self.children[i].name() == head),
        };
        let Some(index) = target else {
            // Unknown names are not an error; merged trees may lack paths
            // that other registration sources refer to.
            return self.base.status;
        };
        let tail = if path.is_empty() { path } else { &path[1..] };
        {
            let child = &mut self.children[index];
            ctx.enter(child.name());
            if success {
                child.resume(ctx, tail);
            } else {
                child.fail(ctx, tail);
            }
            ctx.leave();
        }
        self.drive(ctx)
    }

    pub(crate) fn cancel(&mut self, ctx: &mut ExecutionContext) -> Status {
        if self.base.status.is_terminal() {
            return self.base.status;
        }
        self.cancel_descendants(ctx);
        self.base.status = Status::Cancelled;
        self.base.status
    }

    fn cancel_descendants(&mut self, ctx: &mut ExecutionContext) {
        if self.is_processing {
            for index in self.available.clone() {
                if !self.children[index].status().is_terminal() {
                    self.children[index].cancel(ctx);
                }
            }
        } else {
            for child in &mut self.children {
                if !child.status().is_terminal() {
                    child.cancel(ctx);
                }
            }
        }
    }

    pub(crate) fn instantiate(&self) -> Self {
        Self {
            base: self.base.instantiate(),
            kind: self.kind,
            children: self.children.iter().map(|c| c.instantiate()).collect(),
            available: Vec::new(),
            work_stack: Vec::new(),
            current: None,
            is_processing: false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::handler::HandlerNode;
    use crate::node::test_support::TestRig;
    use crate::status::Priority;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn leaf(name: &str, status: Status, trace: &Arc<parking_lot::Mutex<Vec<String>>>) -> ProcessNode {
        let trace = trace.clone();
        let name_owned = name.to_owned();
        ProcessNode::Handler(HandlerNode::new(
            BaseNode::new(name),
            Arc::new(move |_| {
                trace.lock().push(name_owned.clone());
                status
            }),
        ))
    }

    fn composite(kind: CompositeKind, children: Vec<ProcessNode>) -> CompositeNode {
        let mut node = CompositeNode::new(kind, BaseNode::new("root"));
        for (i, mut child) in children.into_iter().enumerate() {
            child.base_mut().order = i as u32;
            node.children.push(child);
        }
        node
    }

    #[test]
    fn sequence_runs_children_in_order() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Sequence,
            vec![
                leaf("a", Status::Success, &trace),
                leaf("b", Status::Success, &trace),
                leaf("c", Status::Success, &trace),
            ],
        );
        assert_eq!(node.execute(&mut rig.ctx()), Status::Success);
        assert_eq!(*trace.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn sequence_short_circuits_on_failure() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Sequence,
            vec![
                leaf("a", Status::Success, &trace),
                leaf("b", Status::Failure, &trace),
                leaf("c", Status::Success, &trace),
            ],
        );
        assert_eq!(node.execute(&mut rig.ctx()), Status::Failure);
        assert_eq!(*trace.lock(), vec!["a", "b"]);
    }

    #[test]
    fn selector_falls_back_until_success() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Selector,
            vec![
                leaf("a", Status::Failure, &trace),
                leaf("b", Status::Success, &trace),
                leaf("c", Status::Success, &trace),
            ],
        );
        assert_eq!(node.execute(&mut rig.ctx()), Status::Success);
        assert_eq!(*trace.lock(), vec!["a", "b"]);
    }

    #[test]
    fn selector_fails_when_all_fallbacks_fail() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Selector,
            vec![
                leaf("a", Status::Failure, &trace),
                leaf("b", Status::Failure, &trace),
            ],
        );
        assert_eq!(node.execute(&mut rig.ctx()), Status::Failure);
    }

    #[test]
    fn empty_working_set_resolves_by_kind() {
        let mut rig = TestRig::new();
        let mut sequence = composite(CompositeKind::Sequence, Vec::new());
        let mut selector = composite(CompositeKind::Selector, Vec::new());
        assert_eq!(sequence.execute(&mut rig.ctx()), Status::Success);
        assert_eq!(selector.execute(&mut rig.ctx()), Status::Failure);
    }

    #[test]
    fn priority_preempts_registration_order() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Sequence,
            vec![
                leaf("normal", Status::Success, &trace),
                leaf("critical", Status::Success, &trace),
            ],
        );
        node.children[1].base_mut().priority = Priority::Critical;
        assert_eq!(node.execute(&mut rig.ctx()), Status::Success);
        assert_eq!(*trace.lock(), vec!["critical", "normal"]);
    }

    #[test]
    fn visitation_order_is_deterministic() {
        for _ in 0..16 {
            let mut rig = TestRig::new();
            let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
            let mut node = composite(
                CompositeKind::Sequence,
                vec![
                    leaf("low", Status::Success, &trace),
                    leaf("high", Status::Success, &trace),
                    leaf("normal", Status::Success, &trace),
                ],
            );
            node.children[0].base_mut().priority = Priority::Low;
            node.children[1].base_mut().priority = Priority::High;
            node.execute(&mut rig.ctx());
            assert_eq!(*trace.lock(), vec!["high", "normal", "low"]);
        }
    }

    #[test]
    fn unmet_conditions_filter_children_out() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Sequence,
            vec![
                leaf("skipped", Status::Failure, &trace),
                leaf("ran", Status::Success, &trace),
            ],
        );
        node.children[0]
            .base_mut()
            .conditions
            .push(Arc::new(|_| false));
        assert_eq!(node.execute(&mut rig.ctx()), Status::Success);
        assert_eq!(*trace.lock(), vec!["ran"]);
    }

    #[test]
    fn panicking_condition_filters_the_child_out() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Sequence,
            vec![leaf("skipped", Status::Failure, &trace)],
        );
        node.children[0]
            .base_mut()
            .conditions
            .push(Arc::new(|_| panic!("broken predicate")));
        // The only child is filtered out, so the sequence resolves vacuously.
        assert_eq!(node.execute(&mut rig.ctx()), Status::Success);
        assert!(trace.lock().is_empty());
    }

    #[test]
    fn waiting_child_parks_the_sequence() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Sequence,
            vec![
                leaf("a", Status::Success, &trace),
                leaf("wait", Status::Waiting, &trace),
                leaf("c", Status::Success, &trace),
            ],
        );
        assert_eq!(node.execute(&mut rig.ctx()), Status::Waiting);
        assert_eq!(*trace.lock(), vec!["a", "wait"]);
        // An unaddressed resume lands on the parked child and the drive loop
        // continues past it.
        assert_eq!(node.resume(&mut rig.ctx(), &[]), Status::Success);
        assert_eq!(*trace.lock(), vec!["a", "wait", "c"]);
    }

    #[test]
    fn addressed_fail_of_parked_child_fails_the_sequence() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Sequence,
            vec![
                leaf("wait", Status::Waiting, &trace),
                leaf("b", Status::Success, &trace),
            ],
        );
        node.execute(&mut rig.ctx());
        assert_eq!(node.fail(&mut rig.ctx(), &["wait"]), Status::Failure);
        assert_eq!(*trace.lock(), vec!["wait"]);
    }

    #[test]
    fn unknown_address_is_a_no_op() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Sequence,
            vec![leaf("wait", Status::Waiting, &trace)],
        );
        node.execute(&mut rig.ctx());
        assert_eq!(node.resume(&mut rig.ctx(), &["missing"]), Status::Waiting);
    }

    #[test]
    fn cancel_reaches_pending_descendants() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Sequence,
            vec![
                leaf("done", Status::Success, &trace),
                leaf("wait", Status::Waiting, &trace),
                leaf("untouched", Status::Success, &trace),
            ],
        );
        node.execute(&mut rig.ctx());
        assert_eq!(node.cancel(&mut rig.ctx()), Status::Cancelled);
        assert_eq!(node.children[0].status(), Status::Success);
        assert_eq!(node.children[1].status(), Status::Cancelled);
        assert_eq!(node.children[2].status(), Status::Cancelled);
        // Terminal for good.
        assert_eq!(node.resume(&mut rig.ctx(), &[]), Status::Cancelled);
        assert_eq!(node.execute(&mut rig.ctx()), Status::Cancelled);
    }

    #[test]
    fn cancelled_child_cancels_the_whole_composite() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Sequence,
            vec![
                leaf("boom", Status::Cancelled, &trace),
                leaf("later", Status::Success, &trace),
            ],
        );
        assert_eq!(node.execute(&mut rig.ctx()), Status::Cancelled);
        assert_eq!(node.children[1].status(), Status::Cancelled);
    }

    #[test]
    fn instantiation_resets_state_and_keeps_shape() {
        let mut rig = TestRig::new();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut node = composite(
            CompositeKind::Sequence,
            vec![
                leaf("a", Status::Success, &trace),
                leaf("b", Status::Success, &trace),
            ],
        );
        node.execute(&mut rig.ctx());
        let copy = node.instantiate();
        assert_eq!(copy.base.status, Status::Unknown);
        assert!(!copy.is_processing);
        assert_eq!(copy.children.len(), 2);
        assert_eq!(copy.children[0].name(), "a");
        assert_eq!(copy.children[1].order(), 1);
    }

    #[test]
    fn handler_counter_is_not_incremented_by_replays() {
        // A parked composite can be driven through execute again without
        // reinvoking settled or suspended leaves.
        let mut rig = TestRig::new();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let mut node = composite(
            CompositeKind::Sequence,
            vec![ProcessNode::Handler(HandlerNode::new(
                BaseNode::new("wait"),
                Arc::new(move |_| {
                    count_clone.fetch_add(1, Ordering::Relaxed);
                    Status::Waiting
                }),
            ))],
        );
        node.execute(&mut rig.ctx());
        node.execute(&mut rig.ctx());
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
