//! Confirmation before destructive actions

use anyhow::Result;

/// Asks the user to confirm a destructive action
pub trait ConfirmationPrompt: Send + Sync {
    /// Returns `true` when the user agreed
    fn ask(&self, message: &str) -> Result<bool>;
}

/// Answers every question with the same value
///
/// Used for non-interactive runs where `--yes` was not given: every
/// overwrite is declined.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl ConfirmationPrompt for FixedAnswer {
    fn ask(&self, message: &str) -> Result<bool> {
        tracing::debug!("Answering '{}' with {}", message, self.0);
        Ok(self.0)
    }
}
