//! User-decision surface contract.
//!
//! Prompts are asynchronous request/response operations: the protocol step
//! that asks waits for the answer before proceeding. Notices are fire-and-forget.

use std::fmt;

use async_trait::async_trait;

use crate::source::SourceError;

/// Non-blocking messages for the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Transient position source problem; tracking continues
    SourceWarning(SourceError),
    /// Tracking was stopped because of a fatal source error
    TrackingStopped(SourceError),
    /// Writing the crash snapshot failed
    BackupFailed { message: String },
    /// Saving the finished session failed; the route is kept
    SaveFailed { message: String },
    Saved { name: String },
    Discarded,
    /// The save prompt was abandoned; the route stays in the backup slot
    RouteRetained,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SourceWarning(err) => write!(f, "{err}"),
            Notice::TrackingStopped(err) => write!(f, "{err} Tracking stopped."),
            Notice::BackupFailed { message } => write!(f, "Auto-save failed: {message}"),
            Notice::SaveFailed { message } => write!(f, "Failed to save route: {message}"),
            Notice::Saved { name } => write!(f, "\"{name}\" saved successfully!"),
            Notice::Discarded => write!(f, "Route discarded"),
            Notice::RouteRetained => write!(
                f,
                "Route kept as unsaved. It will be offered again next time the app starts."
            ),
        }
    }
}

/// Yes/no and text-entry prompts plus notices.
#[async_trait]
pub trait DecisionSurface: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;

    /// `None` means the user cancelled the prompt.
    async fn prompt_text(&self, message: &str, default_value: &str) -> Option<String>;

    fn notify(&self, notice: Notice);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_display() {
        let notice = Notice::Saved {
            name: "Carmel loop".to_string(),
        };
        assert_eq!(notice.to_string(), "\"Carmel loop\" saved successfully!");
        assert!(Notice::TrackingStopped(SourceError::PermissionDenied)
            .to_string()
            .ends_with("Tracking stopped."));
    }
}
