//! Mutation journal
//!
//! Every child-list change made through the arena leaves a record here,
//! the same shape a MutationObserver hands to its callback.

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::types::NodeId;

/// One child-list change under `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added_nodes: SmallVec<[NodeId; 2]>,
    pub removed_nodes: SmallVec<[NodeId; 2]>,
}

impl MutationRecord {
    pub fn added(target: NodeId, node: NodeId) -> Self {
        Self {
            target,
            added_nodes: smallvec![node],
            removed_nodes: SmallVec::new(),
        }
    }

    pub fn removed(target: NodeId, node: NodeId) -> Self {
        Self {
            target,
            added_nodes: SmallVec::new(),
            removed_nodes: smallvec![node],
        }
    }
}

/// Records produced by one host mutation step, delivered together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationBatch {
    pub records: Vec<MutationRecord>,
}

impl MutationBatch {
    pub fn new(records: Vec<MutationRecord>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All added node ids, in record order
    pub fn added_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.records
            .iter()
            .flat_map(|record| record.added_nodes.iter().copied())
    }
}
