//! Diagnostic context tracking and severity-graded reporting.
//!
//! Readers and writers push a label for each parsing phase (stream name,
//! section name, record index) onto a [`Context`] and pop it when the phase
//! ends. The joined stack forms the diagnostic path reported with every
//! warning and carried inside fatal errors, so a failure deep inside a
//! record can be located without a debugger.
//!
//! Two severities exist:
//! - **warning**: an observed value falls outside its expected set but
//!   parsing continues with the observed value ([`Context::check_value`]).
//! - **error**: a hard invariant is violated and the current document
//!   read or write aborts ([`Context::assert_value`]).

use std::fmt;

use log::warn;

use crate::ecad::types::error::{EcadError, Result};

/// A recoverable observation recorded during a document read or write.
#[derive(Debug, Clone)]
pub struct Warning {
    /// Diagnostic path at the time the warning was recorded.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Label stack and warning accumulator shared by all parsing phases.
///
/// Warnings accumulated before a fatal abort remain available, so callers
/// can distinguish "file is unreadable" from "file read with caveats".
#[derive(Debug, Default)]
pub struct Context {
    stack: Vec<String>,
    warnings: Vec<Warning>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a label for the parsing phase that is about to start.
    pub fn push(&mut self, label: impl Into<String>) {
        self.stack.push(label.into());
    }

    /// Pops the label of the parsing phase that just ended.
    pub fn pop(&mut self) {
        self.stack.pop();
    }

    /// Returns the current diagnostic path, labels joined with `/`.
    pub fn path(&self) -> String {
        self.stack.join("/")
    }

    /// Records a warning at the current path and mirrors it to the log.
    pub fn warn(&mut self, message: impl Into<String>) {
        let warning = Warning {
            path: self.path(),
            message: message.into(),
        };
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Returns all warnings recorded so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Drains the accumulated warnings, leaving the context empty.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Soft check: compares a value against an allow-list.
    ///
    /// Records a warning on mismatch and returns whether the value matched.
    /// Parsing continues with the observed value either way.
    pub fn check_value<T>(&mut self, what: &str, observed: T, allowed: &[T]) -> bool
    where
        T: PartialEq + fmt::Display,
    {
        if allowed.contains(&observed) {
            return true;
        }
        self.warn(format!(
            "unexpected {} '{}' (expected one of: {})",
            what,
            observed,
            allowed_list(allowed)
        ));
        false
    }

    /// Hard assert: compares a value against an allow-list.
    ///
    /// Fails with [`EcadError::AssertionFailed`] on mismatch, carrying the
    /// current diagnostic path.
    pub fn assert_value<T>(&self, what: &str, observed: T, allowed: &[T]) -> Result<()>
    where
        T: PartialEq + fmt::Display,
    {
        if allowed.contains(&observed) {
            return Ok(());
        }
        Err(EcadError::AssertionFailed {
            path: self.path(),
            message: format!(
                "unexpected {} '{}' (expected one of: {})",
                what,
                observed,
                allowed_list(allowed)
            ),
        })
    }
}

fn allowed_list<T: fmt::Display>(allowed: &[T]) -> String {
    let mut out = String::new();
    for (i, value) in allowed.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('\'');
        out.push_str(&value.to_string());
        out.push('\'');
    }
    out
}
