//! Operator interaction during resolution and sync.
//!
//! Everything the pipeline would otherwise ask a human goes through
//! [`ResolutionPolicy`], so the resolution chain never touches the console.

use crate::catalog::EntityKind;
use anyhow::Result;
use crossterm::style::Stylize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    Interactive,
    Automatic,
}

/// Answer to the periodic "keep going?" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointDecision {
    Continue,
    Abort,
    /// Finish the run without further prompts.
    SwitchToAutomatic,
}

pub trait ResolutionPolicy {
    fn mode(&self) -> ResolutionMode;

    /// Whether a minimal `manual` row may be created for an entity nothing
    /// else could resolve.
    fn confirm_manual(&mut self, kind: EntityKind, description: &str) -> bool;

    /// Whether a local fuzzy hit should be accepted.
    fn confirm_fuzzy_match(
        &mut self,
        kind: EntityKind,
        query: &str,
        candidate: &str,
        score: f64,
    ) -> bool;

    fn checkpoint(&mut self, processed: usize, total: usize) -> CheckpointDecision;

    /// Surfaces a fallback decision or error to the operator.
    fn notify(&mut self, message: &str);
}

// =============================================================================
// Automatic
// =============================================================================

pub struct AutomaticPolicy {
    create_manual: bool,
}

impl AutomaticPolicy {
    pub fn new(create_manual: bool) -> Self {
        Self { create_manual }
    }
}

impl ResolutionPolicy for AutomaticPolicy {
    fn mode(&self) -> ResolutionMode {
        ResolutionMode::Automatic
    }

    fn confirm_manual(&mut self, _kind: EntityKind, _description: &str) -> bool {
        self.create_manual
    }

    fn confirm_fuzzy_match(&mut self, _: EntityKind, _: &str, _: &str, _: f64) -> bool {
        true
    }

    fn checkpoint(&mut self, _processed: usize, _total: usize) -> CheckpointDecision {
        CheckpointDecision::Continue
    }

    fn notify(&mut self, message: &str) {
        info!("{}", message);
    }
}

// =============================================================================
// Interactive
// =============================================================================

/// Source of operator answers. `None` means the input was closed.
pub trait LineReader {
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

pub struct TerminalReader {
    editor: DefaultEditor,
}

impl TerminalReader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineReader for TerminalReader {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        match self.editor.readline(prompt) {
            Ok(line) => Some(line),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
            Err(e) => {
                warn!("Failed to read operator input: {}", e);
                None
            }
        }
    }
}

pub struct InteractivePolicy<R: LineReader> {
    reader: R,
}

impl<R: LineReader> InteractivePolicy<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Asks until the answer is y or n. Closed input counts as "no".
    fn ask_yes_no(&mut self, question: &str) -> bool {
        let prompt = format!("{} {} ", "?".cyan().bold(), question);
        loop {
            let Some(line) = self.reader.read_line(&prompt) else {
                return false;
            };
            match line.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => println!("Please answer y or n."),
            }
        }
    }
}

impl<R: LineReader> ResolutionPolicy for InteractivePolicy<R> {
    fn mode(&self) -> ResolutionMode {
        ResolutionMode::Interactive
    }

    fn confirm_manual(&mut self, kind: EntityKind, description: &str) -> bool {
        self.ask_yes_no(&format!(
            "No match found for {} {}. Create it manually? [y/n]",
            kind, description
        ))
    }

    fn confirm_fuzzy_match(
        &mut self,
        kind: EntityKind,
        query: &str,
        candidate: &str,
        score: f64,
    ) -> bool {
        self.ask_yes_no(&format!(
            "Use existing {} '{}' for '{}' (similarity {:.2})? [y/n]",
            kind, candidate, query, score
        ))
    }

    fn checkpoint(&mut self, processed: usize, total: usize) -> CheckpointDecision {
        let prompt = format!(
            "{} Processed {}/{}. [c]ontinue, [a]bort, switch to a[u]tomatic: ",
            "?".cyan().bold(),
            processed,
            total
        );
        loop {
            let Some(line) = self.reader.read_line(&prompt) else {
                return CheckpointDecision::Abort;
            };
            match line.trim().to_ascii_lowercase().as_str() {
                "" | "c" | "continue" => return CheckpointDecision::Continue,
                "a" | "abort" => return CheckpointDecision::Abort,
                "u" | "auto" | "automatic" => return CheckpointDecision::SwitchToAutomatic,
                _ => println!("Please answer c, a or u."),
            }
        }
    }

    fn notify(&mut self, message: &str) {
        println!("{} {}", "!".yellow().bold(), message);
    }
}
