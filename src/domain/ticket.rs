use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a submitted swap is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Submitted,
    Pending,
    Completed,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Completed | LifecycleState::Failed)
    }

    /// Map a backend status string (`pending`, `completed`, `failed`, ...)
    pub fn from_backend_status(status: &str) -> Option<Self> {
        match status.to_ascii_lowercase().as_str() {
            "submitted" => Some(LifecycleState::Submitted),
            "pending" | "started" | "processing" => Some(LifecycleState::Pending),
            "completed" | "success" | "confirmed" => Some(LifecycleState::Completed),
            "failed" | "error" | "reverted" => Some(LifecycleState::Failed),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            LifecycleState::Submitted => 0,
            LifecycleState::Pending => 1,
            LifecycleState::Completed | LifecycleState::Failed => 2,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Submitted => "submitted",
            LifecycleState::Pending => "pending",
            LifecycleState::Completed => "completed",
            LifecycleState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Tracked record of one submitted swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTicket {
    pub transaction_id: String,
    pub quote_id: String,
    pub submitted_at: DateTime<Utc>,
    pub lifecycle_state: LifecycleState,
}

impl SwapTicket {
    pub fn submitted(transaction_id: String, quote_id: String, submitted_at: DateTime<Utc>) -> Self {
        Self {
            transaction_id,
            quote_id,
            submitted_at,
            lifecycle_state: LifecycleState::Submitted,
        }
    }

    /// Move forward to `next`. Returns false (and leaves the ticket alone)
    /// for backwards moves or anything after a terminal state.
    pub fn advance(&mut self, next: LifecycleState) -> bool {
        if self.lifecycle_state.is_terminal() || next.rank() <= self.lifecycle_state.rank() {
            return false;
        }
        self.lifecycle_state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> SwapTicket {
        SwapTicket::submitted("tx-1".to_string(), "q-1".to_string(), Utc::now())
    }

    #[test]
    fn test_forward_progress() {
        let mut t = ticket();
        assert!(t.advance(LifecycleState::Pending));
        assert!(t.advance(LifecycleState::Completed));
        assert_eq!(t.lifecycle_state, LifecycleState::Completed);
    }

    #[test]
    fn test_completion_can_skip_pending() {
        let mut t = ticket();
        assert!(t.advance(LifecycleState::Completed));
    }

    #[test]
    fn test_terminal_is_sticky() {
        let mut t = ticket();
        assert!(t.advance(LifecycleState::Failed));
        assert!(!t.advance(LifecycleState::Completed));
        assert!(!t.advance(LifecycleState::Pending));
        assert_eq!(t.lifecycle_state, LifecycleState::Failed);
    }

    #[test]
    fn test_no_backwards_move() {
        let mut t = ticket();
        t.advance(LifecycleState::Pending);
        assert!(!t.advance(LifecycleState::Submitted));
        assert!(!t.advance(LifecycleState::Pending));
    }

    #[test]
    fn test_backend_status_mapping() {
        assert_eq!(LifecycleState::from_backend_status("completed"), Some(LifecycleState::Completed));
        assert_eq!(LifecycleState::from_backend_status("PENDING"), Some(LifecycleState::Pending));
        assert_eq!(LifecycleState::from_backend_status("failed"), Some(LifecycleState::Failed));
        assert_eq!(LifecycleState::from_backend_status("unknown"), None);
    }
}
