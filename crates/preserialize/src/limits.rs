//! Resource limits for a single pass.
//!
//! Traversal never recurses natively, so depth is bounded only by memory.
//! These limits let callers reject hostile input before it exhausts memory.

use crate::error::{PreserializeError, Result};

/// Default maximum nesting depth of a graph or wire tree.
pub const DEFAULT_MAX_DEPTH: usize = 1 << 20;

/// Default maximum number of nodes visited in one pass.
pub const DEFAULT_MAX_NODES: usize = 1 << 26;

/// Limits enforced during `preserialize` and `depreserialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum nesting depth (number of open frames).
    pub max_depth: usize,
    /// Maximum number of visited nodes, including leaves and references.
    pub max_nodes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

impl Limits {
    /// Creates the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the maximum number of visited nodes.
    pub fn max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub(crate) fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(PreserializeError::LimitExceeded {
                limit: "depth",
                max: self.max_depth,
            });
        }
        Ok(())
    }

    pub(crate) fn check_nodes(&self, nodes: usize) -> Result<()> {
        if nodes > self.max_nodes {
            return Err(PreserializeError::LimitExceeded {
                limit: "node count",
                max: self.max_nodes,
            });
        }
        Ok(())
    }
}
