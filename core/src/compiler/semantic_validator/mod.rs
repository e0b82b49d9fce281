//! Semantic validation for Flow modules
//!
//! Rule-based checks that run after parsing to catch errors the grammar
//! can't enforce.
//!
//! # Usage
//!
//! ```ignore
//! use lunar_core::compiler::parser::parse_module;
//! use lunar_core::compiler::semantic_validator::{validate_module, ValidationContext};
//!
//! let module = parse_module(source)?;
//! let errors = validate_module(&module, &ValidationContext::new(source));
//! ```
//!
//! # Adding a New Rule
//!
//! 1. Create a new file in `semantic_validator/rules/`
//! 2. Implement `ValidationRule` for your struct
//! 3. Add it to the `Validator::new()` constructor

pub mod rules;

use std::collections::HashSet;

use super::ast::{Module, Span};
use crate::types::{Diagnostic, Severity as DiagnosticSeverity};

// ============================================================================
// Validation Error Types
// ============================================================================

/// A problem found by semantic analysis
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The source location of the issue
    pub span: Span,
    /// Human-readable message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Which rule produced this error
    pub rule_id: &'static str,
}

/// Severity levels for validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Must be fixed - code is incorrect
    Error,
    /// Should probably be fixed - potential bug
    Warning,
    /// Suggestion for improvement
    Hint,
}

impl ValidationError {
    pub fn error(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Error,
            rule_id,
        }
    }

    pub fn warning(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Warning,
            rule_id,
        }
    }

    /// Check if this is an error (not a warning or hint)
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }

    /// Convert into the wire diagnostic for `file`
    pub fn to_diagnostic(&self, file: &str) -> Diagnostic {
        let severity = match self.severity {
            Severity::Error => DiagnosticSeverity::Error,
            Severity::Warning => DiagnosticSeverity::Warning,
            Severity::Hint => DiagnosticSeverity::Info,
        };
        Diagnostic {
            severity,
            message: self.message.clone(),
            start: self.span.start,
            length: self.span.len(),
            line: self.span.start_line,
            column: self.span.start_col,
            code: self.rule_id.to_string(),
            file: file.to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Hint => "hint",
        };
        write!(
            f,
            "{} at line {}, col {}: {} [{}]",
            severity,
            self.span.start_line + 1,
            self.span.start_col + 1,
            self.message,
            self.rule_id
        )
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// Validation Context
// ============================================================================

/// What a rule can see besides the module itself
pub struct ValidationContext<'a> {
    /// The module's source text
    pub source: &'a str,
    /// Ambient names declared by this or other open documents
    pub globals: HashSet<String>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            globals: HashSet::new(),
        }
    }

    pub fn with_globals(mut self, globals: impl IntoIterator<Item = String>) -> Self {
        self.globals.extend(globals);
        self
    }
}

// ============================================================================
// ValidationRule Trait
// ============================================================================

/// Trait that all validation rules implement.
///
/// Rules are independent of each other and should produce clear,
/// actionable messages.
pub trait ValidationRule: Send + Sync {
    /// Unique identifier for this rule (e.g., "undefined-variable")
    fn id(&self) -> &'static str;

    /// Human-readable description of what this rule checks
    fn description(&self) -> &'static str;

    /// Run the validation and return any problems found
    fn validate(&self, module: &Module, ctx: &ValidationContext) -> Vec<ValidationError>;
}

// ============================================================================
// Validator - Runs All Rules
// ============================================================================

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    /// Create a new validator with all built-in rules.
    pub fn new() -> Self {
        Self {
            rules: vec![
                // Error rules - these indicate bugs
                Box::new(rules::UndefinedVariableRule),
                Box::new(rules::ConstAssignRule),
                Box::new(rules::InvalidJumpRule),
                // Warning rules - these are suggestions
                Box::new(rules::UnreachableCodeRule),
                Box::new(rules::UnusedVariableRule),
            ],
        }
    }

    /// Run all validation rules and collect errors.
    pub fn validate(&self, module: &Module, ctx: &ValidationContext) -> Vec<ValidationError> {
        let mut errors: Vec<ValidationError> = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(module, ctx))
            .collect();
        errors.sort_by_key(|e| e.span.start);
        errors
    }

    /// Registered rules as (id, description)
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Validate a module with every built-in rule.
pub fn validate_module(module: &Module, ctx: &ValidationContext) -> Vec<ValidationError> {
    Validator::new().validate(module, ctx)
}

/// Check if a module has any validation errors (not just warnings).
pub fn has_errors(module: &Module, ctx: &ValidationContext) -> bool {
    validate_module(module, ctx).iter().any(|e| e.is_error())
}

#[cfg(test)]
mod tests;
