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

//! Single-shot execution context of a process.
//!
//! A session owns the merged tree assembled for one `execute` call and drives
//! it to completion. Execution is cooperative and single-threaded: a handler
//! that needs to wait for an external event returns [`Status::Waiting`] and
//! the session parks above that leaf until `resume` or `fail` re-enters it.
//! A session must not be re-entered from within a handler it is currently
//! driving; distinct sessions are fully independent and may live on distinct
//! threads.

use crate::{
    log::Log,
    manager::Target,
    node::ProcessNode,
    process::{DataBag, FailureRecord},
    status::Status,
};
use crate::error::DataError;
use std::any::Any;
use uuid::Uuid;

/// The view of the owning process that nodes and user handlers see while the
/// tree is being driven: the typed data bag, the failure sink and the dotted
/// path of the node currently on the walk stack.
pub struct ExecutionContext<'a> {
    session_id: Uuid,
    data: &'a mut DataBag,
    failures: &'a mut Vec<FailureRecord>,
    walk: Vec<String>,
    waiting_path: Option<String>,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        session_id: Uuid,
        data: &'a mut DataBag,
        failures: &'a mut Vec<FailureRecord>,
    ) -> Self {
        Self {
            session_id,
            data,
            failures,
            walk: Vec::new(),
            waiting_path: None,
        }
    }

    /// Id of the session driving the tree.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Shared access to the data bag of the owning process.
    pub fn data(&self) -> &DataBag {
        self.data
    }

    /// Mutable access to the data bag of the owning process.
    pub fn data_mut(&mut self) -> &mut DataBag {
        self.data
    }

    /// Stores a value in the data bag of the owning process.
    pub fn set_data<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.data.set(key, value);
    }

    /// Reads a value of the given type from the data bag.
    pub fn get_data<T: Any>(&self, key: &str) -> Result<&T, DataError> {
        self.data.get(key)
    }

    /// Reads a value of the given type, with a miss or a type mismatch folded
    /// into `None`.
    pub fn try_get_data<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.try_get(key)
    }

    /// Dotted path of the node currently being driven.
    pub fn current_path(&self) -> String {
        self.walk.join(".")
    }

    pub(crate) fn enter(&mut self, name: &str) {
        self.walk.push(name.to_owned());
    }

    pub(crate) fn leave(&mut self) {
        self.walk.pop();
    }

    pub(crate) fn record_failure(&mut self, message: String) {
        let path = self.current_path();
        self.failures.push(FailureRecord { path, message });
    }

    pub(crate) fn note_suspension(&mut self) {
        self.waiting_path = Some(self.current_path());
    }

    pub(crate) fn take_waiting_path(&mut self) -> Option<String> {
        self.waiting_path.take()
    }
}

/// See module docs.
pub struct Session {
    id: Uuid,
    root: ProcessNode,
    targets: Vec<Target>,
    waiting_path: Option<String>,
}

impl Session {
    pub(crate) fn new(root: ProcessNode, targets: Vec<Target>) -> Self {
        Self {
            id: Uuid::new_v4(),
            root,
            targets,
            waiting_path: None,
        }
    }

    /// Unique id of the session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current status of the merged tree.
    pub fn status(&self) -> Status {
        self.root.status()
    }

    /// The merged tree the session drives.
    pub fn root(&self) -> &ProcessNode {
        &self.root
    }

    /// Targets whose registrations participated in the merged tree.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Dotted path of the leaf whose suspension parked the session, if the
    /// session is currently waiting.
    pub fn waiting_path(&self) -> Option<&str> {
        self.waiting_path.as_deref()
    }

    pub(crate) fn execute(&mut self, ctx: &mut ExecutionContext) -> Status {
        let status = self.root.status();
        if status.is_terminal() {
            return status;
        }
        ctx.enter(self.root.name());
        let status = self.root.execute(ctx);
        ctx.leave();
        self.update_waiting_path(ctx, status);
        status
    }

    pub(crate) fn resume(&mut self, ctx: &mut ExecutionContext, node_ids: &[&str]) -> Status {
        self.settle(ctx, node_ids, true)
    }

    pub(crate) fn fail(&mut self, ctx: &mut ExecutionContext, node_ids: &[&str]) -> Status {
        self.settle(ctx, node_ids, false)
    }

    fn settle(&mut self, ctx: &mut ExecutionContext, node_ids: &[&str], success: bool) -> Status {
        ctx.enter(self.root.name());
        if node_ids.is_empty() {
            // Without an address the signal lands on the parked subtree.
            if success {
                self.root.resume(ctx, &[]);
            } else {
                self.root.fail(ctx, &[]);
            }
        } else {
            for id in node_ids {
                // The path is split once; nodes only ever see slices of it.
                let segments: Vec<&str> = id.split('.').collect();
                if success {
                    self.root.resume(ctx, &segments);
                } else {
                    self.root.fail(ctx, &segments);
                }
            }
        }
        ctx.leave();
        let status = self.root.status();
        self.update_waiting_path(ctx, status);
        status
    }

    pub(crate) fn cancel(&mut self, ctx: &mut ExecutionContext) -> Status {
        ctx.enter(self.root.name());
        let status = self.root.cancel(ctx);
        ctx.leave();
        if status != Status::Cancelled {
            Log::warn(format!(
                "Session {} did not resolve to a cancellation, got {:?}",
                self.id, status
            ));
        }
        self.waiting_path = None;
        status
    }

    fn update_waiting_path(&mut self, ctx: &mut ExecutionContext, status: Status) {
        self.waiting_path = if status == Status::Waiting {
            ctx.take_waiting_path().or_else(|| self.waiting_path.take())
        } else {
            None
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::builder::{BaseNodeBuilder, CompositeBuilder, HandlerBuilder, RootKind, TreeBuilder};
    use crate::node::test_support::TestRig;

    fn waiting_tree() -> ProcessNode {
        TreeBuilder::new(RootKind::Selector)
            .with_child(
                CompositeBuilder::new_sequence(BaseNodeBuilder::new("flow"))
                    .with_child(
                        HandlerBuilder::new(BaseNodeBuilder::new("wait"))
                            .with_func(|_| Status::Waiting)
                            .build(),
                    )
                    .with_child(
                        HandlerBuilder::new(BaseNodeBuilder::new("done"))
                            .with_func(|_| Status::Success)
                            .build(),
                    )
                    .build(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn waiting_path_points_at_the_suspended_leaf() {
        let mut rig = TestRig::new();
        let mut session = Session::new(waiting_tree(), Vec::new());
        assert_eq!(session.execute(&mut rig.ctx()), Status::Waiting);
        assert_eq!(session.waiting_path(), Some("root.flow.wait"));
        assert_eq!(session.resume(&mut rig.ctx(), &[]), Status::Success);
        assert_eq!(session.waiting_path(), None);
    }

    #[test]
    fn dotted_path_addresses_the_nested_leaf() {
        let mut rig = TestRig::new();
        let mut session = Session::new(waiting_tree(), Vec::new());
        session.execute(&mut rig.ctx());
        assert_eq!(session.resume(&mut rig.ctx(), &["flow.wait"]), Status::Success);
    }

    #[test]
    fn unknown_paths_are_ignored() {
        let mut rig = TestRig::new();
        let mut session = Session::new(waiting_tree(), Vec::new());
        session.execute(&mut rig.ctx());
        assert_eq!(
            session.resume(&mut rig.ctx(), &["stranger.leaf"]),
            Status::Waiting
        );
    }

    #[test]
    fn terminal_root_is_not_driven_again() {
        let mut rig = TestRig::new();
        let mut session = Session::new(waiting_tree(), Vec::new());
        session.execute(&mut rig.ctx());
        session.resume(&mut rig.ctx(), &[]);
        assert_eq!(session.execute(&mut rig.ctx()), Status::Success);
    }

    #[test]
    fn cancel_tears_the_tree_down() {
        let mut rig = TestRig::new();
        let mut session = Session::new(waiting_tree(), Vec::new());
        session.execute(&mut rig.ctx());
        assert_eq!(session.cancel(&mut rig.ctx()), Status::Cancelled);
        assert_eq!(session.status(), Status::Cancelled);
        assert_eq!(session.resume(&mut rig.ctx(), &[]), Status::Cancelled);
    }
}
