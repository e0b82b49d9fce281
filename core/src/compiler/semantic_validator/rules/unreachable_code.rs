//! Rule: Unreachable Code
//!
//! Reports a warning when code appears after a statement that always exits
//! (return, throw, break, continue).
//!
//! # Examples
//!
//! ```flow
//! // Warning: code after return is unreachable
//! return 5;
//! let x = 10;  // <-- unreachable
//! ```
//!
//! ```flow
//! // OK: return is in a branch, so code after is reachable
//! if (condition) {
//!     return 5;
//! }
//! let x = 10;
//! ```
//!
//! Function declarations after a terminator are hoisted, so they are not
//! reported.

use crate::compiler::ast::{ArrowBody, Expr, Module, Stmt};

use super::super::{ValidationContext, ValidationError, ValidationRule};

/// Rule that checks for unreachable code.
pub struct UnreachableCodeRule;

impl ValidationRule for UnreachableCodeRule {
    fn id(&self) -> &'static str {
        "unreachable-code"
    }

    fn description(&self) -> &'static str {
        "Code after return/throw/break/continue is unreachable"
    }

    fn validate(&self, module: &Module, _ctx: &ValidationContext) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        check_stmts(&module.body, &mut errors, self.id());
        errors
    }
}

/// Check a list of statements for unreachable code
fn check_stmts(stmts: &[Stmt], errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    let mut found_terminator = false;

    for stmt in stmts {
        if found_terminator && !matches!(stmt, Stmt::Function { .. } | Stmt::Ambient { .. }) {
            errors.push(ValidationError::warning(
                stmt.span(),
                "Unreachable code detected",
                rule_id,
            ));
            // Only the first unreachable statement is reported
            break;
        }

        if is_terminator(stmt) {
            found_terminator = true;
        }

        check_stmt_children(stmt, errors, rule_id);
    }
}

/// Check if a statement always terminates (doesn't fall through)
fn is_terminator(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Block { body, .. } => body.last().is_some_and(is_terminator),

        // If/else terminates only if BOTH branches terminate
        Stmt::If { then_s, else_s, .. } => {
            is_terminator(then_s) && else_s.as_ref().is_some_and(|s| is_terminator(s))
        }

        other => other.is_terminator(),
    }
}

/// Recursively check children of a statement
fn check_stmt_children(stmt: &Stmt, errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    match stmt {
        Stmt::Block { body, .. } => check_stmts(body, errors, rule_id),
        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => {
            check_expr(test, errors, rule_id);
            check_stmt_children(then_s, errors, rule_id);
            if let Some(else_s) = else_s {
                check_stmt_children(else_s, errors, rule_id);
            }
        }
        Stmt::While { body, .. } | Stmt::ForLoop { body, .. } | Stmt::Function { body, .. } => {
            check_stmt_children(body, errors, rule_id)
        }
        Stmt::Try {
            body, catch_body, ..
        } => {
            check_stmt_children(body, errors, rule_id);
            check_stmt_children(catch_body, errors, rule_id);
        }
        Stmt::Declare { init: Some(expr), .. }
        | Stmt::Return {
            value: Some(expr), ..
        }
        | Stmt::Assign { value: expr, .. }
        | Stmt::Throw { value: expr, .. }
        | Stmt::Expr { expr, .. } => check_expr(expr, errors, rule_id),
        _ => {}
    }
}

fn check_expr(expr: &Expr, errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    match expr {
        Expr::Arrow {
            body: ArrowBody::Block { body },
            ..
        } => check_stmt_children(body, errors, rule_id),
        Expr::Arrow {
            body: ArrowBody::Expr { expr },
            ..
        } => check_expr(expr, errors, rule_id),
        other => {
            for child in other.children() {
                check_expr(child, errors, rule_id);
            }
        }
    }
}
