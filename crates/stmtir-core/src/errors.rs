use crate::ast::StmtTag;
use crate::source_location::SourceSpan;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which statement a fault passed through on its way out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementNote {
    pub kind: StmtTag,
    pub source_text: Option<String>,
    pub span: SourceSpan,
}

impl fmt::Display for StatementNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "while lowering {} statement at {}", self.kind, self.span)?;
        if let Some(text) = &self.source_text {
            write!(f, ": `{}`", text)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub message: String,
    pub span: Option<SourceSpan>,
    /// Innermost statement first.
    pub trail: Vec<StatementNote>,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
            trail: Vec::new(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for note in &self.trail {
            write!(f, "\n  {}", note)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    UnsupportedConstruct,
    InvariantViolation,
    StateAccessViolation,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LowerError {
    #[error("Unsupported construct: {0}")]
    UnsupportedConstruct(Fault),

    #[error("Internal invariant violated: {0}")]
    InvariantViolation(Fault),

    #[error("State access violation: {0}")]
    StateAccessViolation(Fault),
}

pub type Result<T> = std::result::Result<T, LowerError>;

impl LowerError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        LowerError::UnsupportedConstruct(Fault::new(message))
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        LowerError::InvariantViolation(Fault::new(message))
    }

    pub fn state_access(message: impl Into<String>) -> Self {
        LowerError::StateAccessViolation(Fault::new(message))
    }

    pub fn kind(&self) -> FaultKind {
        match self {
            LowerError::UnsupportedConstruct(_) => FaultKind::UnsupportedConstruct,
            LowerError::InvariantViolation(_) => FaultKind::InvariantViolation,
            LowerError::StateAccessViolation(_) => FaultKind::StateAccessViolation,
        }
    }

    /// Compiler defects, as opposed to problems in the user's program.
    pub fn is_internal(&self) -> bool {
        self.kind() == FaultKind::InvariantViolation
    }

    pub fn fault(&self) -> &Fault {
        match self {
            LowerError::UnsupportedConstruct(f)
            | LowerError::InvariantViolation(f)
            | LowerError::StateAccessViolation(f) => f,
        }
    }

    fn fault_mut(&mut self) -> &mut Fault {
        match self {
            LowerError::UnsupportedConstruct(f)
            | LowerError::InvariantViolation(f)
            | LowerError::StateAccessViolation(f) => f,
        }
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        let fault = self.fault_mut();
        if fault.span.is_none() && span.is_valid() {
            fault.span = Some(span);
        }
        self
    }

    /// Record the enclosing statement. The variant is left untouched.
    pub fn annotate(self, note: StatementNote) -> Self {
        let span = note.span;
        let mut err = self.with_span(span);
        err.fault_mut().trail.push(note);
        err
    }
}
