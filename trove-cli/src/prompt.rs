//! Interactive confirmation on the terminal

use anyhow::{Context, Result};
use std::io::{self, Write};

use trove_core::ConfirmationPrompt;

/// Asks on stdout and reads the answer from stdin
///
/// Only "y" and "yes" count as agreement; anything else, including a
/// closed stdin, declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl ConfirmationPrompt for StdinPrompt {
    fn ask(&self, message: &str) -> Result<bool> {
        print!("{message} [y/N]: ");
        io::stdout().flush().context("Failed to flush stdout")?;

        let mut input = String::new();
        io::stdin()
            .read_line(&mut input)
            .context("Failed to read confirmation from stdin")?;

        Ok(is_yes(&input))
    }
}

fn is_yes(input: &str) -> bool {
    let input = input.trim().to_lowercase();
    input == "y" || input == "yes"
}
