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

//! All possible errors that can happen in the engine.

use crate::node::NodeKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// An error produced while assembling or merging a process tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Two nodes with the same name but incompatible kinds met during a merge.
    KindMismatch {
        /// Dotted path of the conflicting node.
        path: String,
        /// Kind of the node that was already in the tree.
        existing: NodeKind,
        /// Kind of the node that was merged in.
        incoming: NodeKind,
    },
    /// A merge tried to give an inverter a second, differently named child.
    InverterChildConflict {
        /// Dotted path of the inverter.
        path: String,
    },
    /// A child was attached to a node that cannot hold children.
    ChildrenNotSupported {
        /// Dotted path of the node.
        path: String,
    },
}

impl Display for TreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeError::KindMismatch {
                path,
                existing,
                incoming,
            } => {
                write!(
                    f,
                    "node '{}' is already registered as {} and cannot be merged with {}",
                    path,
                    existing.as_ref(),
                    incoming.as_ref()
                )
            }
            TreeError::InverterChildConflict { path } => {
                write!(f, "inverter '{}' can hold only a single child", path)
            }
            TreeError::ChildrenNotSupported { path } => {
                write!(f, "node '{}' cannot hold children", path)
            }
        }
    }
}

impl Error for TreeError {}

/// An error produced by process lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The local tree of the process could not be assembled.
    Tree(TreeError),
    /// `resume`, `fail` or `cancel` was called before `execute`.
    NotStarted,
}

impl Display for ProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::Tree(v) => Display::fmt(v, f),
            ProcessError::NotStarted => {
                write!(f, "the process has no session yet, call execute first")
            }
        }
    }
}

impl Error for ProcessError {}

impl From<TreeError> for ProcessError {
    fn from(e: TreeError) -> Self {
        Self::Tree(e)
    }
}

/// An error produced by typed access to the data bag of a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    /// There is no entry under the given key.
    Missing(String),
    /// The entry under the given key has a different type.
    TypeMismatch(String),
}

impl Display for DataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::Missing(key) => write!(f, "there is no data under the key '{}'", key),
            DataError::TypeMismatch(key) => {
                write!(f, "data under the key '{}' has a different type", key)
            }
        }
    }
}

impl Error for DataError {}
