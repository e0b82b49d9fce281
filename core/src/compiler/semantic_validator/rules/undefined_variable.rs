//! Rule: Undefined Variable
//!
//! Reports an error when a name is read or assigned without a declaration
//! in scope.
//!
//! # Examples
//!
//! ```flow
//! // Error: 'x' is used before declaration
//! let y = x + 1;
//! let x = 5;
//! ```
//!
//! ```flow
//! // OK: function bodies run later and may see names declared further down
//! function show() { print(total); }
//! const total = 3;
//! show();
//! ```

use std::collections::HashSet;

use crate::compiler::ast::{ArrowBody, DeclareTarget, Expr, MemberAccess, Module, Stmt};
use crate::compiler::lualib::FLOW_GLOBALS;

use super::super::{ValidationContext, ValidationError, ValidationRule};

/// Rule that checks for undefined variable usage.
pub struct UndefinedVariableRule;

impl ValidationRule for UndefinedVariableRule {
    fn id(&self) -> &'static str {
        "undefined-variable"
    }

    fn description(&self) -> &'static str {
        "Variables must be declared before use"
    }

    fn validate(&self, module: &Module, ctx: &ValidationContext) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut scope = Scope::new();

        scope.add_builtins(ctx);

        check_block(&module.body, &mut scope, &mut errors, self.id());

        errors
    }
}

// ============================================================================
// Scope Tracking
// ============================================================================

/// Tracks variables in scope.
struct Scope {
    /// Variables currently in scope
    defined: HashSet<String>,
    /// Declared somewhere in an enclosing block, visible only from function bodies
    deferred: HashSet<String>,
}

impl Scope {
    fn new() -> Self {
        Self {
            defined: HashSet::new(),
            deferred: HashSet::new(),
        }
    }

    fn define(&mut self, name: &str) {
        self.defined.insert(name.to_string());
    }

    fn is_defined(&self, name: &str) -> bool {
        self.defined.contains(name)
    }

    /// Runtime globals plus ambient declarations from every open document
    fn add_builtins(&mut self, ctx: &ValidationContext) {
        for name in FLOW_GLOBALS {
            self.define(name);
        }
        for name in &ctx.globals {
            self.define(name);
        }
    }

    /// Create a child scope (for blocks, loops, etc.)
    fn child(&self) -> Self {
        Self {
            defined: self.defined.clone(),
            deferred: self.deferred.clone(),
        }
    }

    /// Scope for a function body, where deferred names become visible
    fn function(&self) -> Self {
        let mut scope = self.child();
        scope.defined.extend(self.deferred.iter().cloned());
        scope
    }
}

// ============================================================================
// AST Traversal
// ============================================================================

fn check_block(
    body: &[Stmt],
    scope: &mut Scope,
    errors: &mut Vec<ValidationError>,
    rule_id: &'static str,
) {
    for stmt in body {
        match stmt {
            // Function declarations are hoisted
            Stmt::Function { name, .. } | Stmt::Ambient { name, .. } => scope.define(name),
            Stmt::Declare { target, .. } => {
                for binding in target.bindings() {
                    scope.deferred.insert(binding.name);
                }
            }
            _ => {}
        }
    }

    for stmt in body {
        check_stmt(stmt, scope, errors, rule_id);
    }
}

/// Check a statement for undefined variable usage
fn check_stmt(
    stmt: &Stmt,
    scope: &mut Scope,
    errors: &mut Vec<ValidationError>,
    rule_id: &'static str,
) {
    match stmt {
        Stmt::Declare { target, init, .. } => {
            // Check the initializer FIRST (before adding variable to scope)
            // This catches: let x = x + 1;
            if let Some(init_expr) = init {
                check_expr(init_expr, scope, errors, rule_id);
            }

            match target {
                DeclareTarget::Simple { name, .. } => {
                    scope.define(name);
                }
                DeclareTarget::Destructure { names, .. } => {
                    for binding in names {
                        scope.define(&binding.name);
                    }
                }
            }
        }

        Stmt::Function { params, body, .. } => {
            let mut fn_scope = scope.function();
            for param in params {
                fn_scope.define(&param.name);
            }
            check_stmt(body, &mut fn_scope, errors, rule_id);
        }

        Stmt::Ambient { name, .. } => {
            scope.define(name);
        }

        Stmt::Assign {
            var,
            var_span,
            path,
            value,
            ..
        } => {
            if !scope.is_defined(var) {
                let message = if path.is_empty() {
                    format!("Cannot assign to undeclared variable '{}'", var)
                } else {
                    format!("Undefined variable '{}'", var)
                };
                errors.push(ValidationError::error(*var_span, message, rule_id));
            }
            for access in path {
                if let MemberAccess::Index { expr, .. } = access {
                    check_expr(expr, scope, errors, rule_id);
                }
            }
            check_expr(value, scope, errors, rule_id);
        }

        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => {
            check_expr(test, scope, errors, rule_id);

            let mut then_scope = scope.child();
            check_stmt(then_s, &mut then_scope, errors, rule_id);

            if let Some(else_stmt) = else_s {
                let mut else_scope = scope.child();
                check_stmt(else_stmt, &mut else_scope, errors, rule_id);
            }
        }

        Stmt::While { test, body, .. } => {
            check_expr(test, scope, errors, rule_id);

            let mut body_scope = scope.child();
            check_stmt(body, &mut body_scope, errors, rule_id);
        }

        Stmt::ForLoop {
            binding,
            iterable,
            body,
            ..
        } => {
            check_expr(iterable, scope, errors, rule_id);

            let mut body_scope = scope.child();
            body_scope.define(binding);
            check_stmt(body, &mut body_scope, errors, rule_id);
        }

        Stmt::Try {
            body,
            catch_var,
            catch_body,
            ..
        } => {
            let mut try_scope = scope.child();
            check_stmt(body, &mut try_scope, errors, rule_id);

            let mut catch_scope = scope.child();
            catch_scope.define(catch_var);
            check_stmt(catch_body, &mut catch_scope, errors, rule_id);
        }

        Stmt::Block { body, .. } => {
            let mut block_scope = scope.child();
            check_block(body, &mut block_scope, errors, rule_id);
        }

        Stmt::Return { value, .. } => {
            if let Some(expr) = value {
                check_expr(expr, scope, errors, rule_id);
            }
        }

        Stmt::Throw { value, .. } | Stmt::Expr { expr: value, .. } => {
            check_expr(value, scope, errors, rule_id);
        }

        Stmt::Break { .. } | Stmt::Continue { .. } => {}
    }
}

/// Check an expression for undefined variable usage
fn check_expr(
    expr: &Expr,
    scope: &Scope,
    errors: &mut Vec<ValidationError>,
    rule_id: &'static str,
) {
    match expr {
        Expr::Ident { name, span } => {
            if !scope.is_defined(name) {
                errors.push(ValidationError::error(
                    *span,
                    format!("Undefined variable '{}'", name),
                    rule_id,
                ));
            }
        }

        Expr::Arrow { params, body, .. } => {
            let mut fn_scope = scope.function();
            for param in params {
                fn_scope.define(&param.name);
            }
            match body {
                ArrowBody::Expr { expr } => check_expr(expr, &fn_scope, errors, rule_id),
                ArrowBody::Block { body } => check_stmt(body, &mut fn_scope, errors, rule_id),
            }
        }

        // Property names are not variable references; children() skips them
        other => {
            for child in other.children() {
                check_expr(child, scope, errors, rule_id);
            }
        }
    }
}
