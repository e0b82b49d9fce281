//! Rule: Unused Variable
//!
//! Reports a warning when a variable is declared but never used.
//!
//! # Examples
//!
//! ```flow
//! // Warning: 'x' is declared but never used
//! let x = 5;
//! let y = 10;
//! print(y);
//! ```
//!
//! # Notes
//!
//! - Variables starting with `_` are exempt (convention for intentionally unused)
//! - Exported names, parameters and catch variables are never reported
//! - This is a warning, not an error, since unused variables are valid code

use std::collections::{HashMap, HashSet};

use crate::compiler::ast::{ArrowBody, Expr, MemberAccess, Module, Span, Stmt};

use super::super::{ValidationContext, ValidationError, ValidationRule};

/// Rule that checks for unused variable declarations.
pub struct UnusedVariableRule;

impl ValidationRule for UnusedVariableRule {
    fn id(&self) -> &'static str {
        "unused-variable"
    }

    fn description(&self) -> &'static str {
        "Variables should be used after declaration"
    }

    fn validate(&self, module: &Module, _ctx: &ValidationContext) -> Vec<ValidationError> {
        // Phase 1: Collect all declarations
        let mut declarations: HashMap<String, Span> = HashMap::new();
        for stmt in &module.body {
            collect_declarations(stmt, &mut declarations);
        }

        // Phase 2: Collect all usages
        let mut usages: HashSet<String> = HashSet::new();
        for stmt in &module.body {
            collect_usages(stmt, &mut usages);
        }

        // Phase 3: Report unused declarations
        let mut errors = Vec::new();
        for (name, span) in declarations {
            if name.starts_with('_') {
                continue;
            }

            if !usages.contains(&name) {
                errors.push(ValidationError::warning(
                    span,
                    format!("'{}' is declared but its value is never read", name),
                    self.id(),
                ));
            }
        }

        errors
    }
}

// ============================================================================
// Declaration Collection
// ============================================================================

/// Recursively collect all variable and function declarations
fn collect_declarations(stmt: &Stmt, declarations: &mut HashMap<String, Span>) {
    match stmt {
        Stmt::Declare {
            target, exported, ..
        } => {
            if !exported {
                for binding in target.bindings() {
                    declarations.insert(binding.name, binding.span);
                }
            }
        }

        Stmt::Function {
            name,
            name_span,
            body,
            exported,
            ..
        } => {
            if !exported {
                declarations.insert(name.clone(), *name_span);
            }
            collect_declarations(body, declarations);
        }

        Stmt::ForLoop {
            binding,
            binding_span,
            body,
            ..
        } => {
            declarations.insert(binding.clone(), *binding_span);
            collect_declarations(body, declarations);
        }

        Stmt::Try {
            body, catch_body, ..
        } => {
            collect_declarations(body, declarations);
            collect_declarations(catch_body, declarations);
        }

        Stmt::Block { body, .. } => {
            for s in body {
                collect_declarations(s, declarations);
            }
        }

        Stmt::If { then_s, else_s, .. } => {
            collect_declarations(then_s, declarations);
            if let Some(else_stmt) = else_s {
                collect_declarations(else_stmt, declarations);
            }
        }

        Stmt::While { body, .. } => {
            collect_declarations(body, declarations);
        }

        // These don't contain declarations
        Stmt::Ambient { .. }
        | Stmt::Assign { .. }
        | Stmt::Return { .. }
        | Stmt::Throw { .. }
        | Stmt::Expr { .. }
        | Stmt::Break { .. }
        | Stmt::Continue { .. } => {}
    }
}

// ============================================================================
// Usage Collection
// ============================================================================

/// Recursively collect all variable usages
fn collect_usages(stmt: &Stmt, usages: &mut HashSet<String>) {
    match stmt {
        Stmt::Declare { init, .. } => {
            if let Some(expr) = init {
                collect_expr_usages(expr, usages);
            }
        }

        Stmt::Function { body, .. } => collect_usages(body, usages),

        Stmt::Assign {
            var, path, value, ..
        } => {
            // Writing through a property reads the base object
            if !path.is_empty() {
                usages.insert(var.clone());
            }
            for access in path {
                if let MemberAccess::Index { expr, .. } = access {
                    collect_expr_usages(expr, usages);
                }
            }
            collect_expr_usages(value, usages);
        }

        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => {
            collect_expr_usages(test, usages);
            collect_usages(then_s, usages);
            if let Some(else_stmt) = else_s {
                collect_usages(else_stmt, usages);
            }
        }

        Stmt::While { test, body, .. } => {
            collect_expr_usages(test, usages);
            collect_usages(body, usages);
        }

        Stmt::ForLoop { iterable, body, .. } => {
            collect_expr_usages(iterable, usages);
            collect_usages(body, usages);
        }

        Stmt::Try {
            body, catch_body, ..
        } => {
            collect_usages(body, usages);
            collect_usages(catch_body, usages);
        }

        Stmt::Block { body, .. } => {
            for s in body {
                collect_usages(s, usages);
            }
        }

        Stmt::Return { value, .. } => {
            if let Some(expr) = value {
                collect_expr_usages(expr, usages);
            }
        }

        Stmt::Throw { value: expr, .. } | Stmt::Expr { expr, .. } => {
            collect_expr_usages(expr, usages);
        }

        Stmt::Ambient { .. } | Stmt::Break { .. } | Stmt::Continue { .. } => {}
    }
}

/// Collect variable usages from an expression
fn collect_expr_usages(expr: &Expr, usages: &mut HashSet<String>) {
    match expr {
        Expr::Ident { name, .. } => {
            usages.insert(name.clone());
        }

        Expr::Arrow { body, .. } => match body {
            ArrowBody::Expr { expr } => collect_expr_usages(expr, usages),
            ArrowBody::Block { body } => collect_usages(body, usages),
        },

        other => {
            for child in other.children() {
                collect_expr_usages(child, usages);
            }
        }
    }
}
