use noor_bridge_core::{IntervalOutOfRange, LoadReason};
use noor_bridge_host::LoadFailure;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Notifications are blocked. Enable notifications for this extension in your system settings, or switch reminders to popup mode.")]
    PermissionDenied,

    #[error("Operation already in progress: {0}")]
    OperationInProgress(String),

    #[error("{}", load_message(*reason, detail))]
    Load { reason: LoadReason, detail: String },

    #[error("Audio is unavailable for this selection. Try a different reciter. ({0})")]
    Resolution(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn load_message(reason: LoadReason, detail: &str) -> String {
    match reason {
        LoadReason::BlockedByAutoplayPolicy => {
            format!("Playback was blocked by the browser's autoplay policy. Press play again. ({detail})")
        }
        LoadReason::Network | LoadReason::UnsupportedFormat => format!(
            "Audio is unavailable for this selection. Try a different reciter. ({reason}: {detail})"
        ),
        LoadReason::Decode => format!("Could not play this recitation ({reason}: {detail})"),
        LoadReason::Unavailable => format!(
            "Audio playback is not available right now. Keep the extension open and try again. ({reason}: {detail})"
        ),
    }
}

impl CoordinatorError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorError::InvalidInput(_) => "InvalidInput",
            CoordinatorError::PermissionDenied => "PermissionDenied",
            CoordinatorError::OperationInProgress(_) => "OperationInProgress",
            CoordinatorError::Load { .. } => "LoadError",
            CoordinatorError::Resolution(_) => "ResolutionError",
            CoordinatorError::UnknownAction(_) => "UnknownAction",
            CoordinatorError::Internal(_) => "InternalError",
        }
    }
}

impl From<LoadFailure> for CoordinatorError {
    fn from(failure: LoadFailure) -> Self {
        Self::Load {
            reason: failure.reason,
            detail: failure.detail,
        }
    }
}

impl From<IntervalOutOfRange> for CoordinatorError {
    fn from(err: IntervalOutOfRange) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
