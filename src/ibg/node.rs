use super::index_set::{IndexId, IndexSet};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Position of a node in its graph's arena. Assigned at creation, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub(crate) fn new(index: usize) -> Self {
        NodeId(index as u32)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outgoing edge: removing `index` from the parent configuration yields `child`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub index: IndexId,
    pub child: NodeId,
}

/// The fields filled in by a node's single expansion.
#[derive(Debug, Clone)]
pub struct Expansion {
    pub(crate) cost: f64,
    pub(crate) used: IndexSet,
    pub(crate) children: Vec<Edge>,
}

impl Expansion {
    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn used(&self) -> &IndexSet {
        &self.used
    }

    pub fn children(&self) -> &[Edge] {
        &self.children
    }
}

/// A node of the index benefit graph.
///
/// The expansion is published through a `OnceLock`, so cost and children
/// become visible to readers together and exactly once.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    config: IndexSet,
    expansion: OnceLock<Expansion>,
}

impl Node {
    pub(crate) fn new(id: NodeId, config: IndexSet) -> Self {
        Self {
            id,
            config,
            expansion: OnceLock::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &IndexSet {
        &self.config
    }

    pub fn is_expanded(&self) -> bool {
        self.expansion.get().is_some()
    }

    pub fn expansion(&self) -> Option<&Expansion> {
        self.expansion.get()
    }

    pub fn cost(&self) -> Option<f64> {
        self.expansion.get().map(|e| e.cost)
    }

    pub(crate) fn expand(&self, expansion: Expansion) -> Result<()> {
        self.expansion.set(expansion).map_err(|_| {
            Error::GraphInconsistency(format!("node {} expanded twice", self.id))
        })
    }

    /// Mutable access for post-construction repair passes.
    pub(crate) fn expansion_mut(&mut self) -> Option<&mut Expansion> {
        self.expansion.get_mut()
    }
}
