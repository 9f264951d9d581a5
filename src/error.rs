//! Failure taxonomy for a fetch-and-merge run.
//!
//! Local, recoverable conditions (retention-expired sub-windows, malformed
//! book entries) are handled where they occur and never reach this type.
//! Everything here is fatal for the run: nothing is committed to the
//! canonical store once one of these is raised.

use std::fmt::{Display, Formatter};

/// Fatal run failures, classified for exit-code reporting.
#[derive(Debug, Clone)]
pub enum RunError {
    /// Login credentials or one-time code were rejected, or the login flow
    /// never reached the dashboard.
    Auth { message: String },
    /// Login succeeded but no child identities or no CSRF token could be
    /// harvested from the post-login traffic.
    Session { message: String },
    /// A weekly-activity call failed inside the retention window and retries
    /// were exhausted.
    Fetch { message: String },
}

impl RunError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Auth { .. } => 2,
            Self::Session { .. } => 3,
            Self::Fetch { .. } => 4,
        }
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth { message } => write!(f, "authentication failed: {}", message),
            Self::Session { message } => write!(f, "session harvest failed: {}", message),
            Self::Fetch { message } => write!(f, "fetch failed: {}", message),
        }
    }
}

impl std::error::Error for RunError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let errors = [
            RunError::auth("bad password"),
            RunError::session("no children"),
            RunError::fetch("retries exhausted"),
        ];
        let codes: Vec<i32> = errors.iter().map(RunError::exit_code).collect();
        assert_eq!(codes, vec![2, 3, 4]);
    }

    #[test]
    fn test_display_includes_message() {
        let err = RunError::session("no CSRF token in cookies");
        assert_eq!(
            err.to_string(),
            "session harvest failed: no CSRF token in cookies"
        );
    }
}
