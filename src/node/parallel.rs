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

//! Parallel node drives every eligible child in a single pass and folds their
//! outcomes by counting, not by position. The name describes the aggregation
//! semantics only; children run on the single cooperative thread of the
//! session, one after another, and a child that suspends does not stop the
//! pass. The node resolves once enough children succeeded or failed, where
//! "enough" is configured per node.

use crate::{
    node::{conditions_met, sort_by_precedence, BaseNode, ProcessNode},
    session::ExecutionContext,
    status::Status,
};

/// Tie breaker used when both thresholds of a parallel node are satisfied at
/// the same time, or when every child settled without reaching either
/// threshold.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThresholdMode {
    /// Ties resolve to success.
    SuccessPriority,
    /// Ties resolve to failure.
    FailurePriority,
}

impl Default for ThresholdMode {
    fn default() -> Self {
        Self::SuccessPriority
    }
}

impl ThresholdMode {
    fn pick(self) -> Status {
        match self {
            Self::SuccessPriority => Status::Success,
            Self::FailurePriority => Status::Failure,
        }
    }
}

/// See module docs.
#[derive(Debug)]
pub struct ParallelNode {
    pub(crate) base: BaseNode,
    pub(crate) children: Vec<ProcessNode>,
    // Zero means "all eligible children must succeed".
    pub(crate) required_successes: u32,
    // Zero means "any failure fails the node".
    pub(crate) required_failures: u32,
    pub(crate) mode: ThresholdMode,
    pub(crate) available: Vec<usize>,
    is_processing: bool,
}

impl ParallelNode {
    pub(crate) fn new(base: BaseNode) -> Self {
        Self {
            base,
            children: Vec::new(),
            required_successes: 0,
            required_failures: 0,
            mode: ThresholdMode::default(),
            available: Vec::new(),
            is_processing: false,
        }
    }

    pub(crate) fn execute(&mut self, ctx: &mut ExecutionContext) -> Status {
        if self.base.status.is_terminal() {
            return self.base.status;
        }
        if !self.is_processing {
            let mut eligible: Vec<usize> = (0..self.children.len())
                .filter(|&i| conditions_met(&self.children[i], ctx))
                .collect();
            sort_by_precedence(&mut eligible, &self.children);
            self.available = eligible;
            self.is_processing = true;

            // One pass over the working set. Suspended children stay parked
            // and are settled later through resume/fail.
            for index in self.available.clone() {
                let child = &mut self.children[index];
                if child.status() == Status::Unknown {
                    ctx.enter(child.name());
                    child.execute(ctx);
                    ctx.leave();
                }
            }
        }
        self.resolve(ctx)
    }

    fn resolve(&mut self, ctx: &mut ExecutionContext) -> Status {
        if self
            .available
            .iter()
            .any(|&i| self.children[i].status() == Status::Cancelled)
        {
            self.cancel_pending(ctx);
            self.base.status = Status::Cancelled;
            return self.base.status;
        }

        let successes = self.count(Status::Success);
        let failures = self.count(Status::Failure);
        let success_threshold = if self.required_successes == 0 {
            self.available.len() as u32
        } else {
            self.required_successes
        };
        let failure_threshold = if self.required_failures == 0 {
            1
        } else {
            self.required_failures
        };

        let decided = match (
            successes >= success_threshold,
            failures >= failure_threshold,
        ) {
            (true, true) => Some(self.mode.pick()),
            (true, false) => Some(Status::Success),
            (false, true) => Some(Status::Failure),
            (false, false) => None,
        };

        if let Some(status) = decided {
            // The outcome is already determined; children that are still
            // pending can never change it, so they are torn down.
            self.cancel_pending(ctx);
            self.base.status = status;
            return self.base.status;
        }

        if self
            .available
            .iter()
            .any(|&i| self.children[i].status().is_pending())
        {
            self.base.status = Status::Waiting;
            return self.base.status;
        }

        // Every child settled and neither threshold was reached.
        self.base.status = self.mode.pick();
        self.base.status
    }

    fn count(&self, status: Status) -> u32 {
        self.available
            .iter()
            .filter(|&&i| self.children[i].status() == status)
            .count() as u32
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
            // Without an address the signal lands on the first pending child
            // in precedence order.
            None => self
                .available
                .iter()
                .copied()
                .find(|&i| self.children[i].status().is_pending()),
            Some(&head) => self
                .available
                .iter()
                .copied()
                .find(|&i| self.children[i].name() == head),
        };
        let Some(index) = target else {
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
        self.resolve(ctx)
    }

    pub(crate) fn cancel(&mut self, ctx: &mut ExecutionContext) -> Status {
        if self.base.status.is_terminal() {
            return self.base.status;
        }
        if self.is_processing {
            self.cancel_pending(ctx);
        } else {
            for child in &mut self.children {
                if !child.status().is_terminal() {
                    child.cancel(ctx);
                }
            }
        }
        self.base.status = Status::Cancelled;
        self.base.status
    }

    fn cancel_pending(&mut self, ctx: &mut ExecutionContext) {
        for index in self.available.clone() {
            if !self.children[index].status().is_terminal() {
                self.children[index].cancel(ctx);
            }
        }
    }

    pub(crate) fn instantiate(&self) -> Self {
        Self {
            base: self.base.instantiate(),
            children: self.children.iter().map(|c| c.instantiate()).collect(),
            required_successes: self.required_successes,
            required_failures: self.required_failures,
            mode: self.mode,
            available: Vec::new(),
            is_processing: false,
        }
    }
}
