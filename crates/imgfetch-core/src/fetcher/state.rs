/// Lifecycle of an operation.
///
/// `Pending → Executing → {Completed | Failed | Cancelled}`, or
/// `Pending → Cancelled` when every caller gives up before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Executing,
    Cancelled,
    Completed,
    Failed,
}

impl OperationState {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationState::Pending => "pending",
            OperationState::Executing => "executing",
            OperationState::Cancelled => "cancelled",
            OperationState::Completed => "completed",
            OperationState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::Cancelled | OperationState::Completed | OperationState::Failed
        )
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
