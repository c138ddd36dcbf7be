//! Swap progress shown above a conversation

use serde::{Deserialize, Serialize};

/// The flags and message count a conversation carries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapProgress {
    #[serde(default)]
    pub swap_accepted: bool,
    #[serde(default)]
    pub swap_completed: bool,
    #[serde(default)]
    pub has_reviewed: bool,
    #[serde(default)]
    pub message_count: usize,
}

/// Linear swap stages, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwapStage {
    Matched,
    Chatting,
    Accepted,
    InProgress,
    Completed,
    Reviewed,
}

impl SwapStage {
    pub const ALL: [SwapStage; 6] = [
        SwapStage::Matched,
        SwapStage::Chatting,
        SwapStage::Accepted,
        SwapStage::InProgress,
        SwapStage::Completed,
        SwapStage::Reviewed,
    ];

    /// Later milestones win over earlier ones; without flags the message
    /// count decides. Two messages still count as matched.
    pub fn derive(progress: &SwapProgress) -> Self {
        if progress.has_reviewed {
            SwapStage::Reviewed
        } else if progress.swap_completed {
            SwapStage::Completed
        } else if progress.swap_accepted {
            SwapStage::InProgress
        } else if progress.message_count > 2 {
            SwapStage::Chatting
        } else if progress.message_count == 1 {
            SwapStage::Accepted
        } else {
            SwapStage::Matched
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SwapStage::Matched => "Matched",
            SwapStage::Chatting => "Chatting",
            SwapStage::Accepted => "Accepted",
            SwapStage::InProgress => "In Progress",
            SwapStage::Completed => "Completed",
            SwapStage::Reviewed => "Reviewed",
        }
    }

    /// Position in [`SwapStage::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Width of the progress bar, 0-100
    pub fn progress_percent(self) -> f64 {
        (self.index() + 1) as f64 / Self::ALL.len() as f64 * 100.0
    }
}
