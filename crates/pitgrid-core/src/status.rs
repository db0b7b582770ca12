//! Status of graph nodes.

use serde::{Deserialize, Serialize};

/// Status of a node in the task graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    /// Node waiting on its dependencies.
    #[default]
    Pending,
    /// Node executing.
    Running,
    /// Node completed successfully.
    Completed,
    /// Node failed.
    Failed,
    /// Node never started because an upstream node failed.
    Skipped,
}

impl NodeStatus {
    /// Returns true if the node is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}
