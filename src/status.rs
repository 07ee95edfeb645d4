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

//! Execution status and priority ranks shared by every node in a process tree.

use strum_macros::{AsRefStr, EnumString, VariantNames};

/// Status of execution of a process tree node.
///
/// A node starts in [`Status::Unknown`] and moves to exactly one terminal
/// status ([`Status::Success`], [`Status::Failure`] or [`Status::Cancelled`]),
/// possibly passing through [`Status::Waiting`] while it is suspended and
/// waits for an external `resume`/`fail` signal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, AsRefStr, EnumString, VariantNames)]
pub enum Status {
    /// Node was not executed yet.
    Unknown,
    /// Action was successful.
    Success,
    /// Failed to perform an action.
    Failure,
    /// Node is suspended and waits for an external signal to continue.
    Waiting,
    /// Node was cancelled. This status is terminal and cannot be undone.
    Cancelled,
}

impl Default for Status {
    fn default() -> Self {
        Self::Unknown
    }
}

impl Status {
    /// Returns true if the status cannot change anymore.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }

    /// Returns true if the node still needs an external signal to settle.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Waiting | Self::Unknown)
    }

    /// Relative severity used when statuses of several children are folded
    /// into one. Cancellation dominates everything, an unfinished wait
    /// dominates any finished outcome.
    pub fn severity(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Success => 1,
            Self::Failure => 2,
            Self::Waiting => 3,
            Self::Cancelled => 4,
        }
    }
}

/// Priority rank of a node. Composites visit eligible children with higher
/// priority first; children of equal priority keep their registration order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, AsRefStr, EnumString, VariantNames)]
pub enum Priority {
    /// Must run before anything else.
    Critical,
    /// Runs before normal work.
    High,
    /// Default rank.
    Normal,
    /// Runs after normal work.
    Low,
    /// Runs last.
    Background,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Priority {
    /// Execution precedence of the rank; a higher value runs earlier.
    pub fn rank(self) -> u32 {
        match self {
            Self::Critical => 4,
            Self::High => 3,
            Self::Normal => 2,
            Self::Low => 1,
            Self::Background => 0,
        }
    }
}
