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

//! Thread-safe registry of process tree templates.
//!
//! Trees are registered per process type, either globally or for a specific
//! [`Target`] instance. Registration composes: a later registration for the
//! same slot merges over whatever was registered before. Reads always clone,
//! so a running session can never mutate a registered template and concurrent
//! registration can never corrupt a running session.

use crate::{
    builder::{RootKind, TreeBuilder},
    error::TreeError,
    node::ProcessNode,
    process::ProcessModel,
};
use fxhash::FxHashMap;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::any::TypeId;
use uuid::Uuid;

/// A cheap handle identifying an external entity that process trees can be
/// registered for. Two copies of the same handle select the same registry
/// entries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    id: Uuid,
}

impl Target {
    /// Mints a fresh target identity.
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Unique id of the target.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new()
    }
}

/// How per-target registrations participate when a session tree is assembled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MergeBehaviour {
    /// Merge the entries of every listed target, in listing order.
    All,
    /// Merge only the entry of the first listed target that has one.
    First,
    /// Ignore per-target entries entirely.
    None,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum TargetKey {
    Global,
    Instance(Uuid),
}

/// See module docs.
pub struct ProcessManager {
    registry: Mutex<FxHashMap<TypeId, FxHashMap<TargetKey, ProcessNode>>>,
}

lazy_static! {
    static ref GLOBAL: ProcessManager = ProcessManager::new();
}

impl ProcessManager {
    /// Creates an empty registry. Most applications use the process-wide
    /// instance available through [`ProcessManager::global`]; separate
    /// instances are mainly useful to keep tests isolated.
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(FxHashMap::default()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static ProcessManager {
        &GLOBAL
    }

    /// Registers a tree delta for the given process type, composing it over
    /// any previous global registration. The root of a fresh entry is a
    /// parallel node, so independently registered branches do not gate each
    /// other positionally.
    pub fn register<M, F>(&self, build: F) -> Result<(), TreeError>
    where
        M: ProcessModel,
        F: FnOnce(TreeBuilder) -> TreeBuilder,
    {
        self.register_with_root::<M, F>(RootKind::Parallel, None, build)
    }

    /// Registers a tree delta that only applies when the given target is
    /// attached to the executed process.
    pub fn register_for<M, F>(&self, target: &Target, build: F) -> Result<(), TreeError>
    where
        M: ProcessModel,
        F: FnOnce(TreeBuilder) -> TreeBuilder,
    {
        self.register_with_root::<M, F>(RootKind::Parallel, Some(target), build)
    }

    /// Registers a tree delta with an explicit root kind for fresh entries.
    pub fn register_with_root<M, F>(
        &self,
        kind: RootKind,
        target: Option<&Target>,
        build: F,
    ) -> Result<(), TreeError>
    where
        M: ProcessModel,
        F: FnOnce(TreeBuilder) -> TreeBuilder,
    {
        let mut registry = self.registry.lock();
        let per_type = registry.entry(TypeId::of::<M>()).or_default();
        let key = target.map_or(TargetKey::Global, |t| TargetKey::Instance(t.id));
        let builder = match per_type.get(&key) {
            Some(existing) => TreeBuilder::from_root(existing.instantiate()),
            None => TreeBuilder::new(kind),
        };
        let root = build(builder).build()?;
        per_type.insert(key, root);
        Ok(())
    }

    /// Assembles a fresh session tree for the given process type: the global
    /// entry first, then per-target entries according to `behaviour`, then
    /// the local tree of the process itself on top, so that the most specific
    /// source wins where handlers collide. Returns `None` when no source
    /// contributed anything. The result is always a fresh clone; driving it
    /// cannot mutate the registered templates.
    pub fn get_root(
        &self,
        process_type: TypeId,
        local_root: Option<ProcessNode>,
        targets: &[Target],
        behaviour: MergeBehaviour,
    ) -> Result<Option<ProcessNode>, TreeError> {
        // Clone everything we need while holding the lock, merge after.
        let (global, per_target) = {
            let registry = self.registry.lock();
            let Some(per_type) = registry.get(&process_type) else {
                return Ok(local_root);
            };
            let global = per_type.get(&TargetKey::Global).map(|n| n.instantiate());
            let mut per_target = Vec::new();
            match behaviour {
                MergeBehaviour::None => {}
                MergeBehaviour::All => {
                    for target in targets {
                        if let Some(entry) = per_type.get(&TargetKey::Instance(target.id)) {
                            per_target.push(entry.instantiate());
                        }
                    }
                }
                MergeBehaviour::First => {
                    for target in targets {
                        if let Some(entry) = per_type.get(&TargetKey::Instance(target.id)) {
                            per_target.push(entry.instantiate());
                            break;
                        }
                    }
                }
            }
            (global, per_target)
        };

        fn absorb(acc: Option<TreeBuilder>, tree: ProcessNode) -> Option<TreeBuilder> {
            match acc {
                None => Some(TreeBuilder::from_root(tree)),
                Some(builder) => Some(builder.with_merged(tree)),
            }
        }

        let mut builder: Option<TreeBuilder> = None;
        if let Some(global) = global {
            builder = absorb(builder, global);
        }
        for tree in per_target {
            builder = absorb(builder, tree);
        }
        if let Some(local) = local_root {
            builder = absorb(builder, local);
        }
        builder.map(|b| b.build()).transpose()
    }

    /// Drops every registration. Not part of the production surface; tests
    /// use it to tear down the process-wide registry between cases.
    #[doc(hidden)]
    pub fn reset(&self) {
        self.registry.lock().clear();
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::builder::{BaseNodeBuilder, HandlerBuilder};
    use crate::process::ProcessModel;

    struct Checkout;

    impl ProcessModel for Checkout {}

    fn handler(name: &str) -> ProcessNode {
        HandlerBuilder::new(BaseNodeBuilder::new(name)).build()
    }

    #[test]
    fn registrations_compose_per_slot() {
        let manager = ProcessManager::new();
        manager
            .register::<Checkout, _>(|b| b.with_child(handler("a")))
            .unwrap();
        manager
            .register::<Checkout, _>(|b| b.with_child(handler("b")))
            .unwrap();
        let root = manager
            .get_root(TypeId::of::<Checkout>(), None, &[], MergeBehaviour::All)
            .unwrap()
            .unwrap();
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.children()[0].name(), "a");
        assert_eq!(root.children()[1].name(), "b");
    }

    #[test]
    fn target_entries_merge_according_to_behaviour() {
        let manager = ProcessManager::new();
        let first = Target::new();
        let second = Target::new();
        manager
            .register::<Checkout, _>(|b| b.with_child(handler("global")))
            .unwrap();
        manager
            .register_for::<Checkout, _>(&first, |b| b.with_child(handler("first")))
            .unwrap();
        manager
            .register_for::<Checkout, _>(&second, |b| b.with_child(handler("second")))
            .unwrap();

        let targets = [first, second];
        let all = manager
            .get_root(TypeId::of::<Checkout>(), None, &targets, MergeBehaviour::All)
            .unwrap()
            .unwrap();
        assert!(all.find_child("first").is_some());
        assert!(all.find_child("second").is_some());

        let first_only = manager
            .get_root(
                TypeId::of::<Checkout>(),
                None,
                &targets,
                MergeBehaviour::First,
            )
            .unwrap()
            .unwrap();
        assert!(first_only.find_child("first").is_some());
        assert!(first_only.find_child("second").is_none());

        let none = manager
            .get_root(
                TypeId::of::<Checkout>(),
                None,
                &targets,
                MergeBehaviour::None,
            )
            .unwrap()
            .unwrap();
        assert!(none.find_child("first").is_none());
        assert!(none.find_child("global").is_some());
    }

    #[test]
    fn unknown_type_falls_back_to_the_local_tree() {
        let manager = ProcessManager::new();
        let local = TreeBuilder::new(RootKind::Selector)
            .with_child(handler("mine"))
            .build()
            .unwrap();
        let root = manager
            .get_root(
                TypeId::of::<Checkout>(),
                Some(local),
                &[],
                MergeBehaviour::All,
            )
            .unwrap()
            .unwrap();
        assert!(root.find_child("mine").is_some());
        let nothing = manager
            .get_root(TypeId::of::<Checkout>(), None, &[], MergeBehaviour::All)
            .unwrap();
        assert!(nothing.is_none());
    }

    #[test]
    fn reads_clone_the_registered_template() {
        let manager = ProcessManager::new();
        manager
            .register::<Checkout, _>(|b| b.with_child(handler("a")))
            .unwrap();
        let first = manager
            .get_root(TypeId::of::<Checkout>(), None, &[], MergeBehaviour::All)
            .unwrap()
            .unwrap();
        let second = manager
            .get_root(TypeId::of::<Checkout>(), None, &[], MergeBehaviour::All)
            .unwrap()
            .unwrap();
        // Separate instantiations, not views of the same template.
        assert_eq!(first.children().len(), second.children().len());
        assert_eq!(first.status(), crate::status::Status::Unknown);
    }
}
