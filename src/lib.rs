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

//! Hierarchical process execution engine.
//!
//! A [`Process`] is a data-carrying unit of work; a tree of composable
//! control-flow nodes decides which user handlers run, in what order, and how
//! their individual outcomes fold into a final result. Trees are assembled
//! with fluent builders, registered in a thread-safe [`ProcessManager`]
//! (globally, or per [`Target`] instance) and merged per execution, so that
//! default behaviour, per-target customisation and per-instance overrides
//! layer predictably.
//!
//! Execution is cooperative and single-threaded per session. A handler that
//! starts an asynchronous operation externally returns [`Status::Waiting`];
//! the external completion later calls [`Process::resume`] or
//! [`Process::fail`], addressing leaves by dotted paths such as
//! `"paymentStrategy.creditCard.chargeCard"`. Cancellation is terminal.
//!
//! # Example
//!
//! ```rust
//! use proctree::{
//!     BaseNodeBuilder, CompositeBuilder, HandlerBuilder, MergeBehaviour, Process,
//!     ProcessManager, ProcessModel, Status,
//! };
//!
//! struct Checkout;
//!
//! impl ProcessModel for Checkout {}
//!
//! let manager = ProcessManager::new();
//! manager
//!     .register::<Checkout, _>(|builder| {
//!         builder.with_child(
//!             CompositeBuilder::new_sequence(BaseNodeBuilder::new("pay"))
//!                 .with_child(
//!                     HandlerBuilder::new(BaseNodeBuilder::new("reserve"))
//!                         .with_func(|_| Status::Success)
//!                         .build(),
//!                 )
//!                 .with_child(
//!                     HandlerBuilder::new(BaseNodeBuilder::new("charge"))
//!                         .with_func(|_| Status::Waiting)
//!                         .build(),
//!                 )
//!                 .build(),
//!         )
//!     })
//!     .unwrap();
//!
//! let mut process = Process::new::<Checkout>();
//! let status = process
//!     .execute_with(&manager, MergeBehaviour::All, &[])
//!     .unwrap();
//! assert_eq!(status, Status::Waiting);
//!
//! // The payment gateway calls back later.
//! assert_eq!(process.resume(&["pay.charge"]).unwrap(), Status::Success);
//! ```

#![warn(missing_docs)]

pub mod builder;
pub mod error;
pub mod log;
pub mod manager;
pub mod node;
pub mod process;
pub mod session;
pub mod status;

pub use builder::{
    BaseNodeBuilder, CompositeBuilder, HandlerBuilder, InverterBuilder, ParallelBuilder, RootKind,
    TreeBuilder,
};
pub use error::{DataError, ProcessError, TreeError};
pub use log::{Log, LogMessage, MessageKind};
pub use manager::{MergeBehaviour, ProcessManager, Target};
pub use node::{
    CompositeKind, Condition, HandlerFn, NodeKind, ProcessNode, ThresholdMode,
};
pub use process::{DataBag, FailureRecord, Process, ProcessModel};
pub use session::{ExecutionContext, Session};
pub use status::{Priority, Status};
