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

//! Handler is a "final" node of a process tree. It wraps a user-defined
//! function which is able to mutate the data of the owning process and decide
//! the outcome of the leaf. A handler that returns [`Status::Waiting`]
//! suspends the whole branch above it until the process receives an external
//! `resume` or `fail` signal.

use crate::{
    log::Log,
    node::{panic_message, BaseNode, HandlerFn},
    session::ExecutionContext,
    status::Status,
};
use std::fmt::{Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// See module docs.
pub struct HandlerNode {
    pub(crate) base: BaseNode,
    pub(crate) func: HandlerFn,
    // Shared with the template the node was instantiated from, so the total
    // number of real invocations of the user function survives cloning.
    pub(crate) execution_count: Arc<AtomicU32>,
    // A terminal outcome injected by resume/fail before the first execution.
    // The user function still runs once, with a chance to override the
    // injected outcome with a cancellation.
    pub(crate) preset: Option<Status>,
    pub(crate) invoked: bool,
}

impl Debug for HandlerNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerNode")
            .field("base", &self.base)
            .field("execution_count", &self.execution_count.load(Ordering::Relaxed))
            .field("preset", &self.preset)
            .field("invoked", &self.invoked)
            .finish()
    }
}

impl HandlerNode {
    pub(crate) fn new(base: BaseNode, func: HandlerFn) -> Self {
        Self {
            base,
            func,
            execution_count: Arc::new(AtomicU32::new(0)),
            preset: None,
            invoked: false,
        }
    }

    /// Total number of real invocations of the user function, counted across
    /// the template and all of its instantiated copies.
    pub fn execution_count(&self) -> u32 {
        self.execution_count.load(Ordering::Relaxed)
    }

    pub(crate) fn execute(&mut self, ctx: &mut ExecutionContext) -> Status {
        if self.base.status.is_terminal() {
            return self.base.status;
        }
        if self.invoked && self.preset.is_none() {
            // The user function already ran and left the leaf unsettled;
            // only an external signal can move it now.
            return self.base.status;
        }

        let result = match catch_unwind(AssertUnwindSafe(|| (self.func)(ctx))) {
            Ok(status) => status,
            Err(payload) => {
                let message = panic_message(payload);
                Log::err(format!(
                    "Handler '{}' panicked: {}",
                    ctx.current_path(),
                    message
                ));
                ctx.record_failure(message);
                Status::Failure
            }
        };
        self.invoked = true;
        self.execution_count.fetch_add(1, Ordering::Relaxed);

        self.base.status = match self.preset.take() {
            // The injected outcome wins, unless the user function asked for a
            // cancellation while observing it.
            Some(preset) => {
                if result == Status::Cancelled {
                    Status::Cancelled
                } else {
                    preset
                }
            }
            None => result,
        };

        if self.base.status == Status::Waiting {
            ctx.note_suspension();
        }

        self.base.status
    }

    pub(crate) fn resume(&mut self, ctx: &mut ExecutionContext) -> Status {
        self.settle(ctx, Status::Success)
    }

    pub(crate) fn fail(&mut self, ctx: &mut ExecutionContext) -> Status {
        self.settle(ctx, Status::Failure)
    }

    fn settle(&mut self, ctx: &mut ExecutionContext, outcome: Status) -> Status {
        if !self.invoked && !self.base.status.is_terminal() {
            // The leaf was resolved before it ever ran; run it once now with
            // the outcome already decided.
            self.preset = Some(outcome);
            return self.execute(ctx);
        }
        if self.base.status.is_pending() {
            self.base.status = outcome;
        }
        self.base.status
    }

    pub(crate) fn cancel(&mut self) -> Status {
        if !self.base.status.is_terminal() {
            self.base.status = Status::Cancelled;
            self.preset = None;
        }
        self.base.status
    }

    pub(crate) fn instantiate(&self) -> Self {
        Self {
            base: self.base.instantiate(),
            func: self.func.clone(),
            execution_count: self.execution_count.clone(),
            preset: None,
            invoked: false,
        }
    }
}
