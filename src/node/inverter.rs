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

//! A node that inverts the state of its single child ([`Status::Failure`]
//! becomes [`Status::Success`] and vice versa, any other status remains
//! unchanged). The mapping applies to execution results and to status reads;
//! `resume`, `fail` and `cancel` pass through to the child untouched.

use crate::{
    log::Log,
    node::{BaseNode, ProcessNode},
    session::ExecutionContext,
    status::Status,
};

fn invert(status: Status) -> Status {
    match status {
        Status::Success => Status::Failure,
        Status::Failure => Status::Success,
        other => other,
    }
}

/// See module docs.
#[derive(Debug)]
pub struct InverterNode {
    pub(crate) base: BaseNode,
    pub(crate) child: Option<Box<ProcessNode>>,
}

impl InverterNode {
    pub(crate) fn new(base: BaseNode) -> Self {
        Self { base, child: None }
    }

    /// Mapped status of the child.
    pub fn status(&self) -> Status {
        match &self.child {
            Some(child) => invert(child.status()),
            None => self.base.status,
        }
    }

    pub(crate) fn execute(&mut self, ctx: &mut ExecutionContext) -> Status {
        if self.status().is_terminal() {
            return self.status();
        }
        let Some(child) = self.child.as_deref_mut() else {
            Log::warn(format!("Inverter '{}' has no child to run", self.base.name));
            self.base.status = Status::Failure;
            return self.base.status;
        };
        ctx.enter(child.name());
        child.execute(ctx);
        ctx.leave();
        self.base.status = invert(child.status());
        self.base.status
    }

    pub(crate) fn resume(&mut self, ctx: &mut ExecutionContext, path: &[&str]) -> Status {
        self.delegate(ctx, path, true)
    }

    pub(crate) fn fail(&mut self, ctx: &mut ExecutionContext, path: &[&str]) -> Status {
        self.delegate(ctx, path, false)
    }

    fn delegate(&mut self, ctx: &mut ExecutionContext, path: &[&str], success: bool) -> Status {
        let Some(child) = self.child.as_deref_mut() else {
            return self.base.status;
        };
        if let Some(&head) = path.first() {
            if child.name() != head {
                return invert(child.status());
            }
        }
        let tail = if path.is_empty() { path } else { &path[1..] };
        ctx.enter(child.name());
        let status = if success {
            child.resume(ctx, tail)
        } else {
            child.fail(ctx, tail)
        };
        ctx.leave();
        self.base.status = invert(child.status());
        status
    }

    pub(crate) fn cancel(&mut self, ctx: &mut ExecutionContext) -> Status {
        if let Some(child) = self.child.as_deref_mut() {
            if !child.status().is_terminal() {
                child.cancel(ctx);
            }
            self.base.status = invert(child.status());
        } else if !self.base.status.is_terminal() {
            self.base.status = Status::Cancelled;
        }
        self.base.status
    }

    pub(crate) fn instantiate(&self) -> Self {
        Self {
            base: self.base.instantiate(),
            child: self
                .child
                .as_ref()
                .map(|c| Box::new(c.instantiate())),
        }
    }
}
