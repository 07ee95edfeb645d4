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

//! The data-carrying unit of work submitted for execution.
//!
//! A process pairs a typed key-value data bag with a processing tree that is
//! assembled from up to four sources when `execute` is called: the global
//! registration for the process type, registrations for the targets the call
//! lists, the [`ProcessModel::processing`] hook of the type itself and any
//! `with_processing` contributions made on the instance. Later sources win
//! where handlers collide, so defaults can be layered under per-target
//! customisation and per-instance overrides.
//!
//! `execute` is single shot. Once a session exists, further `execute` calls
//! report the current status, and the `resume`/`fail`/`cancel` operations
//! re-enter the suspended tree.

use crate::{
    builder::{RootKind, TreeBuilder},
    error::{DataError, ProcessError, TreeError},
    log::Log,
    manager::{MergeBehaviour, ProcessManager, Target},
    node::{BaseNode, CompositeKind, CompositeNode, ProcessNode},
    session::{ExecutionContext, Session},
    status::Status,
};
use fxhash::FxHashMap;
use instant::Instant;
use std::any::{Any, TypeId};
use uuid::Uuid;

/// A user-defined process type. The type selects the registry entries that
/// apply to the process; the `processing` hook contributes the tree the type
/// itself carries, below any `with_processing` contributions.
pub trait ProcessModel: 'static {
    /// Builds the tree the process type brings along by itself.
    fn processing(builder: TreeBuilder) -> TreeBuilder {
        builder
    }
}

/// Typed key-value store carried by every process.
#[derive(Default)]
pub struct DataBag {
    entries: FxHashMap<String, Box<dyn Any + Send>>,
}

impl DataBag {
    /// Stores a value under the given key, replacing any previous entry.
    pub fn set<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Box::new(value));
    }

    /// Reads a value of the given type. A missing key or an entry of a
    /// different type is an error.
    pub fn get<T: Any>(&self, key: &str) -> Result<&T, DataError> {
        match self.entries.get(key) {
            None => Err(DataError::Missing(key.to_owned())),
            Some(value) => value
                .downcast_ref::<T>()
                .ok_or_else(|| DataError::TypeMismatch(key.to_owned())),
        }
    }

    /// Reads a value of the given type; misses and type mismatches fold into
    /// `None`.
    pub fn try_get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Mutable variant of [`Self::try_get`].
    pub fn try_get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.entries.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Returns true if the bag has an entry under the given key.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// A handler failure recorded on the owning process, with the dotted path of
/// the leaf that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Dotted path of the failed leaf.
    pub path: String,
    /// The failure message.
    pub message: String,
}

/// See module docs.
pub struct Process {
    id: Uuid,
    created_at: Instant,
    model_type: TypeId,
    processing_hook: fn(TreeBuilder) -> TreeBuilder,
    data: DataBag,
    failures: Vec<FailureRecord>,
    local_root: Option<ProcessNode>,
    build_error: Option<TreeError>,
    session: Option<Session>,
}

impl Process {
    /// Creates a process of the given type with an empty data bag.
    pub fn new<M: ProcessModel>() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Instant::now(),
            model_type: TypeId::of::<M>(),
            processing_hook: M::processing,
            data: DataBag::default(),
            failures: Vec::new(),
            local_root: None,
            build_error: None,
            session: None,
        }
    }

    /// Unique id of the process.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The moment the process was constructed.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Shared access to the data bag.
    pub fn data(&self) -> &DataBag {
        &self.data
    }

    /// Mutable access to the data bag.
    pub fn data_mut(&mut self) -> &mut DataBag {
        &mut self.data
    }

    /// Stores a value in the data bag.
    pub fn set_data<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.data.set(key, value);
    }

    /// Reads a value of the given type from the data bag.
    pub fn get_data<T: Any>(&self, key: &str) -> Result<&T, DataError> {
        self.data.get(key)
    }

    /// Reads a value of the given type, with misses folded into `None`.
    pub fn try_get_data<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.try_get(key)
    }

    /// Handler failures recorded while the tree was driven.
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// The session of the process, once `execute` created one.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Current status of the process tree; [`Status::Unknown`] before
    /// `execute`.
    pub fn status(&self) -> Status {
        self.session
            .as_ref()
            .map(|s| s.status())
            .unwrap_or(Status::Unknown)
    }

    /// Extends the local tree of the process. Contributions compose: calling
    /// this several times merges the fragments together, later calls winning
    /// where handlers collide.
    pub fn with_processing<F>(self, build: F) -> Self
    where
        F: FnOnce(TreeBuilder) -> TreeBuilder,
    {
        self.with_processing_root(RootKind::Selector, build)
    }

    /// Same as [`Self::with_processing`], with an explicit root kind for the
    /// local tree.
    pub fn with_processing_root<F>(mut self, kind: RootKind, build: F) -> Self
    where
        F: FnOnce(TreeBuilder) -> TreeBuilder,
    {
        if self.session.is_some() {
            Log::warn(format!(
                "Process {} is already executing, the contribution is ignored",
                self.id
            ));
            return self;
        }
        if self.build_error.is_some() {
            return self;
        }
        match build(TreeBuilder::new(kind)).build() {
            Err(error) => self.build_error = Some(error),
            Ok(tree) => {
                let merged = match self.local_root.take() {
                    None => Ok(tree),
                    Some(existing) => TreeBuilder::from_root(existing).with_merged(tree).build(),
                };
                match merged {
                    Ok(tree) => self.local_root = Some(tree),
                    Err(error) => self.build_error = Some(error),
                }
            }
        }
        self
    }

    /// Executes the process against the process-wide registry. Single shot:
    /// once a session exists the call reports its current status instead of
    /// running anything.
    pub fn execute(&mut self) -> Result<Status, ProcessError> {
        self.execute_with(ProcessManager::global(), MergeBehaviour::All, &[])
    }

    /// Executes the process against the given registry, with the given
    /// targets participating in the merge.
    pub fn execute_with(
        &mut self,
        manager: &ProcessManager,
        behaviour: MergeBehaviour,
        targets: &[Target],
    ) -> Result<Status, ProcessError> {
        if let Some(session) = &self.session {
            return Ok(session.status());
        }
        if let Some(error) = self.build_error.take() {
            return Err(error.into());
        }

        // The hook of the type sits below the instance contributions.
        let hook_tree = (self.processing_hook)(TreeBuilder::new(RootKind::Selector)).build()?;
        let hook_tree = if hook_tree.children().is_empty() {
            None
        } else {
            Some(hook_tree)
        };
        let local = match (hook_tree, self.local_root.take()) {
            (None, local) => local,
            (Some(hook), None) => Some(hook),
            (Some(hook), Some(local)) => {
                Some(TreeBuilder::from_root(hook).with_merged(local).build()?)
            }
        };

        let root = match manager.get_root(self.model_type, local, targets, behaviour)? {
            Some(root) => root,
            None => {
                Log::warn(format!(
                    "Process {} has no processing tree registered anywhere",
                    self.id
                ));
                ProcessNode::Composite(CompositeNode::new(
                    CompositeKind::Selector,
                    BaseNode::new(crate::builder::ROOT_NAME),
                ))
            }
        };

        let mut session = Session::new(root, targets.to_vec());
        let status = {
            let mut ctx =
                ExecutionContext::new(session.id(), &mut self.data, &mut self.failures);
            session.execute(&mut ctx)
        };
        self.session = Some(session);
        Ok(status)
    }

    /// Resolves suspended leaves towards success. Each entry of `node_ids` is
    /// a dotted path below the root; an empty list targets the subtree the
    /// session is parked on.
    pub fn resume(&mut self, node_ids: &[&str]) -> Result<Status, ProcessError> {
        let session = self.session.as_mut().ok_or(ProcessError::NotStarted)?;
        let mut ctx = ExecutionContext::new(session.id(), &mut self.data, &mut self.failures);
        Ok(session.resume(&mut ctx, node_ids))
    }

    /// Resolves suspended leaves towards failure, addressed the same way as
    /// [`Self::resume`].
    pub fn fail(&mut self, node_ids: &[&str]) -> Result<Status, ProcessError> {
        let session = self.session.as_mut().ok_or(ProcessError::NotStarted)?;
        let mut ctx = ExecutionContext::new(session.id(), &mut self.data, &mut self.failures);
        Ok(session.fail(&mut ctx, node_ids))
    }

    /// Cancels the whole tree. Cancellation is terminal.
    pub fn cancel(&mut self) -> Result<Status, ProcessError> {
        let session = self.session.as_mut().ok_or(ProcessError::NotStarted)?;
        let mut ctx = ExecutionContext::new(session.id(), &mut self.data, &mut self.failures);
        Ok(session.cancel(&mut ctx))
    }
}
