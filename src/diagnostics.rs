//! Diagnostics
//!
//! Collects errors and warnings across the build pipeline so that a single
//! failed build reports every problem at once. Errors are always fatal;
//! warnings become fatal only in strict mode.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BarberError, Result};

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing build problems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Emptiness ===
    /// No templates were installed
    NoTemplates,
    /// No documents were installed
    NoDocuments,

    // === Documents ===
    /// A document field name is declared by more than one document
    ShadowedField,
    /// A document is never targeted by any template
    DanglingDocument,

    // === Template wiring ===
    /// Template's declared source differs from the schema it was installed under
    SourceMismatch,
    /// Template targets a document that is not installed
    MissingTarget,
    /// Template text failed to compile
    CompileFailure,

    // === Template contents ===
    /// Template references a variable the data schema does not have
    MissingVariable,
    /// Template lacks a field a target document requires
    MissingRequiredField,
    /// Template declares a field no target document uses
    ExtraField,
    /// A (data, document) pairing has no template for the data schema
    DanglingDataSchema,
    /// A (data, document) pairing is not among the template's targets
    InvalidTarget,
    /// Two data schemas derive the same template token
    TokenCollision,

    // === Data schemas ===
    /// A data schema field is never referenced by any template
    UnusedDataField,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoTemplates => "W001",
            Self::NoDocuments => "W002",
            Self::ShadowedField => "E001",
            Self::DanglingDocument => "W003",
            Self::SourceMismatch => "E002",
            Self::MissingTarget => "E003",
            Self::CompileFailure => "E004",
            Self::MissingVariable => "E005",
            Self::MissingRequiredField => "E006",
            Self::ExtraField => "E007",
            Self::DanglingDataSchema => "E008",
            Self::InvalidTarget => "E009",
            Self::TokenCollision => "E010",
            Self::UnusedDataField => "W004",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::NoTemplates
            | Self::NoDocuments
            | Self::DanglingDocument
            | Self::UnusedDataField => Severity::Warning,

            Self::ShadowedField
            | Self::SourceMismatch
            | Self::MissingTarget
            | Self::CompileFailure
            | Self::MissingVariable
            | Self::MissingRequiredField
            | Self::ExtraField
            | Self::DanglingDataSchema
            | Self::InvalidTarget
            | Self::TokenCollision => Severity::Error,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single build problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Accumulator threaded through the validation pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
    strict: bool,
}

impl Diagnostics {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            ..Default::default()
        }
    }

    /// Record a problem; its code decides which list it lands in
    pub fn push(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        let item = Diagnostic::new(code, message);
        match item.severity() {
            Severity::Error => self.errors.push(item),
            Severity::Warning => self.warnings.push(item),
        }
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether the collected problems are fatal under the current strictness
    pub fn is_fatal(&self) -> bool {
        self.has_errors() || (self.strict && !self.warnings.is_empty())
    }

    /// Returns the accumulated report as an error if anything fatal was recorded
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_fatal() {
            Err(BarberError::Validation(self.clone()))
        } else {
            Ok(())
        }
    }

    /// Consume the collection, keeping the warnings for the built barbershop
    pub fn into_warnings(self) -> Vec<Diagnostic> {
        self.warnings
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show_warnings = self.strict && !self.warnings.is_empty();
        writeln!(
            f,
            "Barbershop validation failed with {} error(s){}",
            self.errors.len(),
            if show_warnings {
                format!(" and {} warning(s) (strict mode)", self.warnings.len())
            } else {
                String::new()
            }
        )?;

        if !self.errors.is_empty() {
            writeln!(f, "\nErrors:")?;
            for (i, item) in self.errors.iter().enumerate() {
                writeln!(f, "\n{}. {}", i + 1, item)?;
            }
        }

        if show_warnings {
            writeln!(f, "\nWarnings:")?;
            for (i, item) in self.warnings.iter().enumerate() {
                writeln!(f, "\n{}. {}", i + 1, item)?;
            }
        }

        Ok(())
    }
}
