//! Rule: Invalid Jump
//!
//! Reports an error for `break` or `continue` with no enclosing loop in the
//! same function. A `try` body is lowered into its own Lua function, so a
//! jump from inside it to a loop outside the `try` is reported as well.
//!
//! ```flow
//! while (true) {
//!     try {
//!         break;      // Error: cannot leave a try block
//!     } catch (e) {
//!         break;      // OK
//!     }
//! }
//! ```

use crate::compiler::ast::{ArrowBody, Expr, Module, Stmt};

use super::super::{ValidationContext, ValidationError, ValidationRule};

pub struct InvalidJumpRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpContext {
    /// Not inside any loop of the current function
    None,
    Loop,
    /// Inside a try body whose nearest loop is outside the try
    TryInsideLoop,
}

impl ValidationRule for InvalidJumpRule {
    fn id(&self) -> &'static str {
        "invalid-jump"
    }

    fn description(&self) -> &'static str {
        "break and continue must target a loop in the same function"
    }

    fn validate(&self, module: &Module, _ctx: &ValidationContext) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for stmt in &module.body {
            check_stmt(stmt, JumpContext::None, &mut errors, self.id());
        }
        errors
    }
}

fn check_stmt(
    stmt: &Stmt,
    ctx: JumpContext,
    errors: &mut Vec<ValidationError>,
    rule_id: &'static str,
) {
    match stmt {
        Stmt::Break { span } | Stmt::Continue { span } => {
            let keyword = if matches!(stmt, Stmt::Break { .. }) {
                "break"
            } else {
                "continue"
            };
            let message = match ctx {
                JumpContext::Loop => return,
                JumpContext::None => format!("'{}' can only be used inside a loop", keyword),
                JumpContext::TryInsideLoop => {
                    format!("'{}' cannot jump out of a try block", keyword)
                }
            };
            errors.push(ValidationError::error(*span, message, rule_id));
        }
        Stmt::Block { body, .. } => {
            for s in body {
                check_stmt(s, ctx, errors, rule_id);
            }
        }
        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => {
            check_expr(test, errors, rule_id);
            check_stmt(then_s, ctx, errors, rule_id);
            if let Some(else_s) = else_s {
                check_stmt(else_s, ctx, errors, rule_id);
            }
        }
        Stmt::While { test, body, .. } => {
            check_expr(test, errors, rule_id);
            check_stmt(body, JumpContext::Loop, errors, rule_id);
        }
        Stmt::ForLoop { iterable, body, .. } => {
            check_expr(iterable, errors, rule_id);
            check_stmt(body, JumpContext::Loop, errors, rule_id);
        }
        Stmt::Try {
            body, catch_body, ..
        } => {
            let inner = match ctx {
                JumpContext::None => JumpContext::None,
                JumpContext::Loop | JumpContext::TryInsideLoop => JumpContext::TryInsideLoop,
            };
            check_stmt(body, inner, errors, rule_id);
            check_stmt(catch_body, ctx, errors, rule_id);
        }
        Stmt::Function { body, .. } => check_stmt(body, JumpContext::None, errors, rule_id),
        Stmt::Declare { init, .. } => {
            if let Some(init) = init {
                check_expr(init, errors, rule_id);
            }
        }
        Stmt::Assign { value, .. } => check_expr(value, errors, rule_id),
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                check_expr(value, errors, rule_id);
            }
        }
        Stmt::Throw { value, .. } | Stmt::Expr { expr: value, .. } => {
            check_expr(value, errors, rule_id)
        }
        Stmt::Ambient { .. } => {}
    }
}

/// Expressions only matter for the arrow functions they contain
fn check_expr(expr: &Expr, errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    if let Expr::Arrow {
        body: ArrowBody::Block { body },
        ..
    } = expr
    {
        check_stmt(body, JumpContext::None, errors, rule_id);
        return;
    }
    if let Expr::Arrow {
        body: ArrowBody::Expr { expr },
        ..
    } = expr
    {
        check_expr(expr, errors, rule_id);
        return;
    }
    for child in expr.children() {
        check_expr(child, errors, rule_id);
    }
}
