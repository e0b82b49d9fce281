//! Rule: Const Assign
//!
//! Reports an error when a `const` binding is the target of an assignment.
//!
//! ```flow
//! const limit = 3;
//! limit = 4;      // Error
//! limit += 1;     // Error
//! ```
//!
//! Mutating a property of a `const` object (`config.x = 1`) is allowed.

use std::collections::HashMap;

use crate::compiler::ast::{ArrowBody, Binding, Expr, MemberAccess, Module, Stmt, VarKind};

use super::super::{ValidationContext, ValidationError, ValidationRule};

pub struct ConstAssignRule;

impl ValidationRule for ConstAssignRule {
    fn id(&self) -> &'static str {
        "const-assign"
    }

    fn description(&self) -> &'static str {
        "Constants cannot be reassigned"
    }

    fn validate(&self, module: &Module, _ctx: &ValidationContext) -> Vec<ValidationError> {
        let mut checker = Checker {
            scopes: Vec::new(),
            errors: Vec::new(),
            rule_id: self.id(),
        };
        checker.block(&module.body);
        checker.errors
    }
}

struct Checker {
    /// Innermost scope last; `true` marks a constant
    scopes: Vec<HashMap<String, bool>>,
    errors: Vec<ValidationError>,
    rule_id: &'static str,
}

impl Checker {
    fn is_const(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .copied()
            .unwrap_or(false)
    }

    fn with_scope(&mut self, bindings: HashMap<String, bool>, f: impl FnOnce(&mut Self)) {
        self.scopes.push(bindings);
        f(self);
        self.scopes.pop();
    }

    /// Block-level declarations shadow outer names for the whole block
    fn block(&mut self, body: &[Stmt]) {
        let mut bindings = HashMap::new();
        for stmt in body {
            match stmt {
                Stmt::Declare {
                    var_kind, target, ..
                } => {
                    for binding in target.bindings() {
                        bindings.insert(binding.name, *var_kind == VarKind::Const);
                    }
                }
                Stmt::Function { name, .. } => {
                    bindings.insert(name.clone(), false);
                }
                _ => {}
            }
        }
        self.with_scope(bindings, |this| {
            for stmt in body {
                this.stmt(stmt);
            }
        });
    }

    fn function(&mut self, params: &[Binding], body: FunctionBody) {
        let bindings = params.iter().map(|p| (p.name.clone(), false)).collect();
        self.with_scope(bindings, |this| match body {
            FunctionBody::Stmt(stmt) => this.stmt(stmt),
            FunctionBody::Expr(expr) => this.expr(expr),
        });
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { body, .. } => self.block(body),
            Stmt::Declare { init, .. } => {
                if let Some(init) = init {
                    self.expr(init);
                }
            }
            Stmt::Function { params, body, .. } => self.function(params, FunctionBody::Stmt(body)),
            Stmt::Ambient { .. } | Stmt::Break { .. } | Stmt::Continue { .. } => {}
            Stmt::Assign {
                var,
                var_span,
                path,
                value,
                ..
            } => {
                if path.is_empty() && self.is_const(var) {
                    self.errors.push(ValidationError::error(
                        *var_span,
                        format!("Cannot assign to '{}' because it is a constant", var),
                        self.rule_id,
                    ));
                }
                for access in path {
                    if let MemberAccess::Index { expr, .. } = access {
                        self.expr(expr);
                    }
                }
                self.expr(value);
            }
            Stmt::If {
                test,
                then_s,
                else_s,
                ..
            } => {
                self.expr(test);
                self.stmt(then_s);
                if let Some(else_s) = else_s {
                    self.stmt(else_s);
                }
            }
            Stmt::While { test, body, .. } => {
                self.expr(test);
                self.stmt(body);
            }
            Stmt::ForLoop {
                var_kind,
                binding,
                iterable,
                body,
                ..
            } => {
                self.expr(iterable);
                let bindings = HashMap::from([(binding.clone(), *var_kind == VarKind::Const)]);
                self.with_scope(bindings, |this| this.stmt(body));
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Stmt::Throw { value, .. } | Stmt::Expr { expr: value, .. } => self.expr(value),
            Stmt::Try {
                body,
                catch_var,
                catch_body,
                ..
            } => {
                self.stmt(body);
                let bindings = HashMap::from([(catch_var.clone(), false)]);
                self.with_scope(bindings, |this| this.stmt(catch_body));
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        if let Expr::Arrow { params, body, .. } = expr {
            match body {
                ArrowBody::Expr { expr } => self.function(params, FunctionBody::Expr(expr)),
                ArrowBody::Block { body } => self.function(params, FunctionBody::Stmt(body)),
            }
            return;
        }
        for child in expr.children() {
            self.expr(child);
        }
    }
}

enum FunctionBody<'a> {
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}
