//! Values flowing between pipeline stages.

use std::path::{Path, PathBuf};

/// A decoded request: command name followed by raw arguments.
///
/// Never empty. Produced only by [`parse_command`](crate::parse_command).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    elements: Vec<String>,
}

impl ParsedCommand {
    /// Callers guarantee `elements` is non-empty.
    pub(crate) fn from_elements(elements: Vec<String>) -> Self {
        debug_assert!(!elements.is_empty());
        Self { elements }
    }

    /// Build from literal parts, bypassing the parser. Returns `None` if
    /// `elements` is empty.
    pub fn new(elements: Vec<String>) -> Option<Self> {
        if elements.is_empty() {
            None
        } else {
            Some(Self { elements })
        }
    }

    /// The candidate command name.
    pub fn name(&self) -> &str {
        &self.elements[0]
    }

    /// The candidate raw arguments.
    pub fn args(&self) -> &[String] {
        &self.elements[1..]
    }

    /// All elements, name first.
    pub fn into_elements(self) -> Vec<String> {
        self.elements
    }
}

/// An authorized execution: a registry-resolved executable and the argument
/// list its policy produced.
///
/// Only [`CommandRegistry::resolve`](crate::CommandRegistry::resolve) creates
/// these. Arguments go straight to `execve` as `argv[1..]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub(crate) command: String,
    pub(crate) program: PathBuf,
    pub(crate) args: Vec<String>,
}

impl ExecutionRequest {
    /// Registry key that authorized this request.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Canonical path of the executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Final argument list, not including the program itself.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}
