use crate::error::Error;
use serde::{Deserialize, Serialize};

/// A user facing rendition of an [`Error`], handed to whichever front-end
/// ends up showing it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StandardError {
    pub title: String,
    pub message: String,
}

impl StandardError {
    pub fn new(title: String, message: String) -> Self {
        Self { title, message }
    }
}

impl std::fmt::Display for StandardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error {}: {}", self.title, self.message)
    }
}

impl From<&Error> for StandardError {
    fn from(error: &Error) -> Self {
        match error {
            Error::ToolNotFound { tool } => StandardError::new(
                format!("{tool} could not be found"),
                format!("Is {tool} installed and on the PATH?"),
            ),
            Error::ToolFailed { tool, code, stderr } => StandardError::new(
                format!("{tool} failed"),
                format!("{tool} exited with status {code}: {stderr}"),
            ),
            Error::Parse { .. } => {
                StandardError::new("Unreadable disc report".to_string(), error.to_string())
            }
            Error::SpawnLocked => StandardError::new(
                "Shutting down".to_string(),
                "New processes can't be started right now".to_string(),
            ),
            Error::NoTitlesSurvived => StandardError::new(
                "No usable titles".to_string(),
                "No title on the disc has audio in one of the configured languages".to_string(),
            ),
            Error::NoFeatureDetected => StandardError::new(
                "No main feature".to_string(),
                "Main feature detection has not run yet".to_string(),
            ),
            Error::InvalidState(message) => {
                StandardError::new("Invalid state".to_string(), message.clone())
            }
            Error::Config(message) => {
                StandardError::new("Configuration".to_string(), message.clone())
            }
            Error::Io(e) => StandardError::new("I/O".to_string(), e.to_string()),
        }
    }
}

impl From<Error> for StandardError {
    fn from(error: Error) -> Self {
        StandardError::from(&error)
    }
}
