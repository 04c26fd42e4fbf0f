//! Error taxonomy. Hand-rolled `Display`/`Error` impls in the
//! same style as `graphix-compiler::expr::CouldNotResolve` — no
//! typed-error-derive dependency anywhere in this dependency tree, so these
//! stay plain structs propagated through `anyhow` at the public boundary
//! rather than growing a `thiserror` dependency.

use std::fmt;

#[derive(Debug)]
pub struct AnalyzerError {
    pub message: String,
    pub form: String,
}

impl fmt::Display for AnalyzerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.message, self.form)
    }
}
impl std::error::Error for AnalyzerError {}

impl AnalyzerError {
    pub fn new(message: impl Into<String>, form: impl fmt::Display) -> Self {
        AnalyzerError { message: message.into(), form: form.to_string() }
    }
}

#[derive(Debug)]
pub struct MacroExpansionError {
    pub macro_name: String,
    pub cause: String,
    pub form: String,
}

impl fmt::Display for MacroExpansionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "macro {} failed: {} in {}", self.macro_name, self.cause, self.form)
    }
}
impl std::error::Error for MacroExpansionError {}

/// Unreachable IR at emission time: the emitter still produces parseable
/// output — a comment with a null stand-in — rather than aborting output
/// generation outright, while still surfacing the error to the
/// caller via the returned `Result`.
#[derive(Debug)]
pub struct EmitterError {
    pub message: String,
}

impl fmt::Display for EmitterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for EmitterError {}

impl EmitterError {
    pub fn new(message: impl Into<String>) -> Self {
        EmitterError { message: message.into() }
    }

    /// The parseable fallback text emitted alongside the error, e.g.
    /// `/* TODO: unreachable IR: <message> */ null`.
    pub fn fallback_text(&self) -> String {
        format!("/* TODO: unreachable IR: {} */ null", self.message)
    }
}
