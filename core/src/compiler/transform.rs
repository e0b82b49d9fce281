//! Lowering of Flow modules to Lua syntax trees
//!
//! The transform walks the Flow AST once and builds a [`Chunk`]. Constructs
//! with no direct Lua counterpart call into the runtime helpers in
//! [`lualib`](super::lualib); every helper used is recorded on the chunk so
//! the emitter can inline it.
//!
//! Notable lowerings:
//!
//! - Function declarations are hoisted. A block that declares functions
//!   forward-declares all of its bindings with one `local` statement.
//! - `continue` becomes a `goto` to a label placed after the loop body,
//!   which is wrapped in `do ... end` so the jump never enters a local's scope.
//! - `try`/`catch` runs the body under `pcall`. A `return` inside the body
//!   returns `true, value` so the enclosing function can pass it on.
//! - Empty array literals and those with `null` elements record their length
//!   under [`LENGTH_MARKER`].

use std::collections::{BTreeSet, HashSet};

use super::ast::{
    ArrowBody, Binding, BinaryOp, DeclareTarget, Expr, ForLoopKind, MemberAccess, Module, Stmt,
    UnaryOp,
};
use super::lua::ast::{
    BinaryOperator, Chunk, Expression, Statement, StatementKind, TableField, UnaryOperator,
    LUA_KEYWORDS,
};
use super::lualib::{self, LuaLibFeature, LuaLibImport};
use crate::types::LENGTH_MARKER;

const EXPORTS: &str = "____exports";
const TRY_OK: &str = "____ok";
const TRY_RESULT: &str = "____result";
const TRY_VALUE: &str = "____value";

/// `console` methods that map straight onto `print`
const CONSOLE_METHODS: &[&str] = &["log", "info", "warn", "error"];

/// Library tables whose methods are called directly instead of through
/// the method dispatch helper
const DIRECT_LIBRARIES: &[&str] = &["Math", "string", "table", "math", "utf8", "coroutine"];

/// Lower a parsed module to a Lua chunk.
pub fn transform_module(module: &Module, lualib_import: LuaLibImport) -> Chunk {
    let mut transformer = Transformer::default();
    let body = transformer.module(module);

    let lualib = match lualib_import {
        LuaLibImport::Inline => lualib::resolve(transformer.features.iter().copied()),
        LuaLibImport::None => Vec::new(),
    };

    Chunk { lualib, body }
}

/// Lua name for a Flow identifier
pub fn lua_name(name: &str) -> String {
    let name = name.replace('$', "_S_");
    if LUA_KEYWORDS.contains(&name.as_str()) {
        format!("____{}", name)
    } else {
        name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StaticKind {
    Number,
    String,
    Unknown,
}

/// Type of an expression when it is evident from its syntax alone
fn static_kind(expr: &Expr) -> StaticKind {
    match expr {
        Expr::LitNum { .. } => StaticKind::Number,
        Expr::LitStr { .. } => StaticKind::String,
        Expr::Unary {
            op: UnaryOp::Neg, ..
        } => StaticKind::Number,
        Expr::Member { property, .. } if property == "length" => StaticKind::Number,
        Expr::Binary { op, left, right, .. } => match op {
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => StaticKind::Number,
            BinaryOp::Add => match (static_kind(left), static_kind(right)) {
                (StaticKind::Number, StaticKind::Number) => StaticKind::Number,
                (StaticKind::String, _) | (_, StaticKind::String) => StaticKind::String,
                _ => StaticKind::Unknown,
            },
            _ => StaticKind::Unknown,
        },
        _ => StaticKind::Unknown,
    }
}

/// Literals that are truthy in Lua, so `c and a or b` is safe
fn is_truthy_literal(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::LitNum { .. }
            | Expr::LitStr { .. }
            | Expr::LitList { .. }
            | Expr::LitObj { .. }
            | Expr::Arrow { .. }
            | Expr::LitBool { v: true, .. }
    )
}

fn is_exported(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::Declare { exported: true, .. } | Stmt::Function { exported: true, .. }
    )
}

/// `continue` targeting the loop whose body is `stmt`
fn contains_continue(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Continue { .. } => true,
        Stmt::Block { body, .. } => body.iter().any(contains_continue),
        Stmt::If { then_s, else_s, .. } => {
            contains_continue(then_s) || else_s.as_deref().is_some_and(contains_continue)
        }
        Stmt::Try {
            body, catch_body, ..
        } => contains_continue(body) || contains_continue(catch_body),
        _ => false,
    }
}

/// `return` leaving the function that encloses `stmt`
fn contains_return(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return { .. } => true,
        Stmt::Block { body, .. } => body.iter().any(contains_return),
        Stmt::If { then_s, else_s, .. } => {
            contains_return(then_s) || else_s.as_deref().is_some_and(contains_return)
        }
        Stmt::While { body, .. } | Stmt::ForLoop { body, .. } => contains_return(body),
        Stmt::Try {
            body, catch_body, ..
        } => contains_return(body) || contains_return(catch_body),
        _ => false,
    }
}

/// Lua requires `return` to be the last statement of a block
fn close_returns(stmts: Vec<Statement>) -> Vec<Statement> {
    let last = stmts.len().saturating_sub(1);
    stmts
        .into_iter()
        .enumerate()
        .map(|(i, stmt)| {
            if i < last && matches!(stmt.kind, StatementKind::Return { .. }) {
                let origin = stmt.origin;
                Statement {
                    kind: StatementKind::Do { body: vec![stmt] },
                    origin,
                }
            } else {
                stmt
            }
        })
        .collect()
}

enum FunctionBody<'a> {
    Block(&'a Stmt),
    Expr(&'a Expr),
}

#[derive(Default)]
struct Transformer {
    features: BTreeSet<LuaLibFeature>,
    temp_count: usize,
    label_count: usize,
    /// Continue label of each enclosing loop in the current function, innermost last
    loop_labels: Vec<Option<String>>,
    /// Enclosing try bodies in the current function
    try_depth: usize,
    /// The module declares `____exports`
    exports: bool,
}

impl Transformer {
    fn use_feature(&mut self, feature: LuaLibFeature) -> &'static str {
        self.features.insert(feature);
        feature.name()
    }

    fn temp(&mut self) -> String {
        let name = format!("____temp_{}", self.temp_count);
        self.temp_count += 1;
        name
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn module(&mut self, module: &Module) -> Vec<Statement> {
        self.exports = module.body.iter().any(is_exported);

        let mut body = Vec::new();
        if self.exports {
            body.push(Statement::local(
                EXPORTS,
                Some(Expression::Table { fields: Vec::new() }),
            ));
        }
        body.extend(self.block(&module.body));

        let returns = matches!(
            body.last().map(|s| &s.kind),
            Some(StatementKind::Return { .. })
        );
        if self.exports && !returns {
            body.push(Statement::ret(vec![Expression::ident(EXPORTS)]));
        }
        body
    }

    fn block(&mut self, stmts: &[Stmt]) -> Vec<Statement> {
        let mut out = Vec::new();
        let mut predeclared = HashSet::new();

        if stmts.iter().any(|s| matches!(s, Stmt::Function { .. })) {
            let mut names: Vec<String> = Vec::new();
            for stmt in stmts {
                let declared = match stmt {
                    Stmt::Function { name, .. } => vec![name.clone()],
                    Stmt::Declare { target, .. } => {
                        target.bindings().into_iter().map(|b| b.name).collect()
                    }
                    _ => Vec::new(),
                };
                for name in declared {
                    if predeclared.insert(name.clone()) {
                        names.push(name);
                    }
                }
            }
            out.push(Statement::new(StatementKind::Local {
                names: names.iter().map(|n| lua_name(n)).collect(),
                values: Vec::new(),
            }));

            for stmt in stmts {
                if let Stmt::Function {
                    name,
                    params,
                    body,
                    exported,
                    span,
                    ..
                } = stmt
                {
                    let function = self.function(params, FunctionBody::Block(body));
                    out.push(Statement::at(
                        StatementKind::Assign {
                            targets: vec![Expression::ident(lua_name(name))],
                            values: vec![function],
                        },
                        *span,
                    ));
                    if *exported {
                        out.extend(self.export(name));
                    }
                }
            }
        }

        for stmt in stmts {
            if matches!(stmt, Stmt::Function { .. }) {
                continue;
            }
            let mut lowered = self.stmt(stmt, &predeclared);
            if let Some(first) = lowered.first_mut() {
                if first.origin.is_none() {
                    first.origin = Some(stmt.span().into());
                }
            }
            out.extend(lowered);
        }

        close_returns(out)
    }

    /// Statements of a nested body (a block or a single statement)
    fn body(&mut self, stmt: &Stmt) -> Vec<Statement> {
        match stmt {
            Stmt::Block { body, .. } => self.block(body),
            other => self.block(std::slice::from_ref(other)),
        }
    }

    fn stmt(&mut self, stmt: &Stmt, predeclared: &HashSet<String>) -> Vec<Statement> {
        match stmt {
            Stmt::Block { body, .. } => vec![Statement::new(StatementKind::Do {
                body: self.block(body),
            })],

            Stmt::Declare {
                target,
                init,
                exported,
                ..
            } => self.declare(target, init.as_ref(), *exported, predeclared),

            Stmt::Function {
                name,
                params,
                body,
                exported,
                ..
            } => {
                let body = match self.function(params, FunctionBody::Block(body)) {
                    Expression::Function { body, .. } => body,
                    _ => Vec::new(),
                };
                let mut out = vec![Statement::new(StatementKind::LocalFunction {
                    name: lua_name(name),
                    params: params.iter().map(|p| lua_name(&p.name)).collect(),
                    body,
                })];
                if *exported {
                    out.extend(self.export(name));
                }
                out
            }

            Stmt::Ambient { .. } => Vec::new(),

            Stmt::Assign {
                var,
                path,
                op,
                value,
                ..
            } => self.assign(var, path, op.map(BinaryOp::from), value),

            Stmt::If {
                test,
                then_s,
                else_s,
                ..
            } => {
                let condition = self.expr(test);
                let then_body = self.body(then_s);
                let else_body = else_s.as_ref().map(|s| self.body(s));
                vec![Statement::new(StatementKind::If {
                    condition,
                    then_body,
                    else_body,
                })]
            }

            Stmt::While { test, body, .. } => {
                let condition = self.expr(test);
                let body = self.loop_body(body);
                vec![Statement::new(StatementKind::While { condition, body })]
            }

            Stmt::ForLoop {
                kind,
                binding,
                iterable,
                body,
                ..
            } => {
                let iterable = self.expr(iterable);
                let body = self.loop_body(body);
                let (names, iterator) = match kind {
                    ForLoopKind::Of => (
                        vec!["____".to_string(), lua_name(binding)],
                        Expression::call_named("ipairs", vec![iterable]),
                    ),
                    ForLoopKind::In => (
                        vec![lua_name(binding)],
                        Expression::call_named("pairs", vec![iterable]),
                    ),
                };
                vec![Statement::new(StatementKind::ForIn {
                    names,
                    iterators: vec![iterator],
                    body,
                })]
            }

            Stmt::Return { value, .. } => {
                let mut values = Vec::new();
                if self.try_depth > 0 {
                    values.push(Expression::Boolean { value: true });
                }
                if let Some(value) = value {
                    values.push(self.expr(value));
                }
                vec![Statement::ret(values)]
            }

            Stmt::Throw { value, .. } => {
                let value = self.expr(value);
                vec![Statement::call(Expression::call_named(
                    "error",
                    vec![value, Expression::number(0.0)],
                ))]
            }

            Stmt::Try {
                body,
                catch_var,
                catch_body,
                ..
            } => self.try_catch(body, catch_var, catch_body),

            Stmt::Expr { expr, .. } => match self.expr(expr) {
                call @ Expression::Call { .. } => vec![Statement::call(call)],
                other => vec![Statement::local("_", Some(other))],
            },

            Stmt::Break { .. } => vec![Statement::new(StatementKind::Break)],

            Stmt::Continue { .. } => {
                let label = self
                    .loop_labels
                    .last()
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| "__continue".to_string());
                vec![Statement::new(StatementKind::Goto { label })]
            }
        }
    }

    fn declare(
        &mut self,
        target: &DeclareTarget,
        init: Option<&Expr>,
        exported: bool,
        predeclared: &HashSet<String>,
    ) -> Vec<Statement> {
        let mut out = Vec::new();

        match target {
            DeclareTarget::Simple { name, .. } => {
                let value = init.map(|e| self.expr(e));
                if predeclared.contains(name) {
                    if let Some(value) = value {
                        out.push(Statement::assign(Expression::ident(lua_name(name)), value));
                    }
                } else {
                    out.push(Statement::local(lua_name(name), value));
                }
            }
            DeclareTarget::Destructure { names, .. } => {
                let temp = self.temp();
                let value = init.map(|e| self.expr(e)).unwrap_or(Expression::Nil);
                out.push(Statement::local(&temp, Some(value)));

                let values = names
                    .iter()
                    .map(|b| Expression::field(Expression::ident(&temp), &b.name))
                    .collect();
                let lua_names: Vec<String> = names.iter().map(|b| lua_name(&b.name)).collect();
                let kind = if names.iter().all(|b| predeclared.contains(&b.name)) {
                    StatementKind::Assign {
                        targets: lua_names.into_iter().map(Expression::ident).collect(),
                        values,
                    }
                } else {
                    StatementKind::Local {
                        names: lua_names,
                        values,
                    }
                };
                out.push(Statement::new(kind));
            }
        }

        if exported {
            for binding in target.bindings() {
                out.extend(self.export(&binding.name));
            }
        }
        out
    }

    fn export(&self, name: &str) -> Option<Statement> {
        self.exports.then(|| {
            Statement::assign(
                Expression::field(Expression::ident(EXPORTS), name),
                Expression::ident(lua_name(name)),
            )
        })
    }

    fn assign(
        &mut self,
        var: &str,
        path: &[MemberAccess],
        op: Option<BinaryOp>,
        value: &Expr,
    ) -> Vec<Statement> {
        let base = Expression::ident(lua_name(var));

        let Some((last, prefix)) = path.split_last() else {
            let value = self.compound(op, base.clone(), value);
            return vec![Statement::assign(base, value)];
        };

        let mut object = base;
        for access in prefix {
            object = self.access(object, access);
        }

        let key = match last {
            MemberAccess::Prop { property, .. } => Expression::string(property),
            MemberAccess::Index { expr, .. } => self.expr(expr),
        };

        if let Expression::String { .. } = key {
            let target = Expression::index(object, key);
            let value = self.compound(op, target.clone(), value);
            return vec![Statement::assign(target, value)];
        }

        let current = {
            let index = self.use_feature(LuaLibFeature::Index);
            Expression::call_named(index, vec![object.clone(), key.clone()])
        };
        let value = self.compound(op, current, value);
        let set_index = self.use_feature(LuaLibFeature::SetIndex);
        vec![Statement::call(Expression::call_named(
            set_index,
            vec![object, key, value],
        ))]
    }

    /// `value`, or `current <op> value` for compound assignments
    fn compound(&mut self, op: Option<BinaryOp>, current: Expression, value: &Expr) -> Expression {
        match op {
            None => self.expr(value),
            Some(op) => {
                let kind = static_kind(value);
                let value = self.expr(value);
                self.arithmetic(op, current, StaticKind::Unknown, value, kind)
            }
        }
    }

    fn access(&mut self, object: Expression, access: &MemberAccess) -> Expression {
        match access {
            MemberAccess::Prop { property, .. } => Expression::field(object, property),
            MemberAccess::Index { expr, .. } => self.index(object, expr),
        }
    }

    fn loop_body(&mut self, body: &Stmt) -> Vec<Statement> {
        let label = contains_continue(body).then(|| {
            self.label_count += 1;
            format!("__continue{}", self.label_count)
        });

        self.loop_labels.push(label.clone());
        let lowered = self.body(body);
        self.loop_labels.pop();

        match label {
            Some(name) => vec![
                Statement::new(StatementKind::Do { body: lowered }),
                Statement::new(StatementKind::Label { name }),
            ],
            None => lowered,
        }
    }

    fn try_catch(&mut self, body: &Stmt, catch_var: &str, catch_body: &Stmt) -> Vec<Statement> {
        let labels = std::mem::take(&mut self.loop_labels);
        self.try_depth += 1;
        let try_body = self.body(body);
        self.try_depth -= 1;
        self.loop_labels = labels;

        let returns = contains_return(body);
        let mut names = vec![TRY_OK.to_string(), TRY_RESULT.to_string()];
        if returns {
            names.push(TRY_VALUE.to_string());
        }
        let pcall = Expression::call_named(
            "pcall",
            vec![Expression::Function {
                params: Vec::new(),
                body: try_body,
            }],
        );

        let mut catch_stmts = vec![Statement::local(
            lua_name(catch_var),
            Some(Expression::ident(TRY_RESULT)),
        )];
        catch_stmts.extend(self.body(catch_body));
        let catch_stmts = close_returns(catch_stmts);

        let else_body = returns.then(|| {
            let mut values = Vec::new();
            if self.try_depth > 0 {
                values.push(Expression::Boolean { value: true });
            }
            values.push(Expression::ident(TRY_VALUE));
            vec![Statement::new(StatementKind::If {
                condition: Expression::ident(TRY_RESULT),
                then_body: vec![Statement::ret(values)],
                else_body: None,
            })]
        });

        vec![Statement::new(StatementKind::Do {
            body: vec![
                Statement::new(StatementKind::Local {
                    names,
                    values: vec![pcall],
                }),
                Statement::new(StatementKind::If {
                    condition: Expression::unary(UnaryOperator::Not, Expression::ident(TRY_OK)),
                    then_body: catch_stmts,
                    else_body,
                }),
            ],
        })]
    }

    fn function(&mut self, params: &[Binding], body: FunctionBody) -> Expression {
        let labels = std::mem::take(&mut self.loop_labels);
        let try_depth = std::mem::replace(&mut self.try_depth, 0);

        let body = match body {
            FunctionBody::Block(stmt) => self.body(stmt),
            FunctionBody::Expr(expr) => {
                let value = self.expr(expr);
                vec![Statement::ret(vec![value])]
            }
        };

        self.loop_labels = labels;
        self.try_depth = try_depth;

        Expression::Function {
            params: params.iter().map(|p| lua_name(&p.name)).collect(),
            body,
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self, expr: &Expr) -> Expression {
        match expr {
            Expr::LitBool { v, .. } => Expression::Boolean { value: *v },
            Expr::LitNum { v, .. } => Expression::number(*v),
            Expr::LitStr { v, .. } => Expression::string(v),
            Expr::LitNull { .. } => Expression::Nil,

            Expr::LitList { elements, .. } => {
                let mut fields: Vec<TableField> = elements
                    .iter()
                    .map(|e| TableField::Positional { value: self.expr(e) })
                    .collect();
                let holes = elements.iter().any(|e| matches!(e, Expr::LitNull { .. }));
                if elements.is_empty() || holes {
                    fields.push(TableField::Named {
                        name: LENGTH_MARKER.to_string(),
                        value: Expression::number(elements.len() as f64),
                    });
                }
                Expression::Table { fields }
            }

            Expr::LitObj { properties, .. } => Expression::Table {
                fields: properties
                    .iter()
                    .map(|(key, _, value)| TableField::Named {
                        name: key.clone(),
                        value: self.expr(value),
                    })
                    .collect(),
            },

            Expr::Ident { name, .. } => match name.as_str() {
                "NaN" => Expression::number(f64::NAN),
                "Infinity" => Expression::number(f64::INFINITY),
                _ => {
                    if let Some(feature) = LuaLibFeature::for_global(name) {
                        self.use_feature(feature);
                    }
                    Expression::ident(lua_name(name))
                }
            },

            Expr::Member {
                object,
                property,
                optional,
                ..
            } => {
                let object = self.expr(object);
                if *optional {
                    let optional = self.use_feature(LuaLibFeature::Optional);
                    Expression::call_named(optional, vec![object, Expression::string(property)])
                } else if property == "length" {
                    let len = self.use_feature(LuaLibFeature::Length);
                    Expression::call_named(len, vec![object])
                } else {
                    Expression::field(object, property)
                }
            }

            Expr::Index { object, index, .. } => {
                let object = self.expr(object);
                self.index(object, index)
            }

            Expr::Call { callee, args, .. } => self.call(callee, args),

            Expr::Arrow { params, body, .. } => match body {
                ArrowBody::Expr { expr } => self.function(params, FunctionBody::Expr(expr)),
                ArrowBody::Block { body } => self.function(params, FunctionBody::Block(body)),
            },

            Expr::Binary {
                op, left, right, ..
            } => self.binary(*op, left, right),

            Expr::Unary { op, operand, .. } => {
                let operand = self.expr(operand);
                let op = match op {
                    UnaryOp::Not => UnaryOperator::Not,
                    UnaryOp::Neg => UnaryOperator::Neg,
                };
                Expression::unary(op, operand)
            }

            Expr::Ternary {
                condition,
                consequent,
                alternate,
                ..
            } => {
                let truthy = is_truthy_literal(consequent);
                let condition = self.expr(condition);
                let consequent = self.expr(consequent);
                let alternate = self.expr(alternate);
                if truthy {
                    Expression::binary(
                        BinaryOperator::Or,
                        Expression::binary(BinaryOperator::And, condition, consequent),
                        alternate,
                    )
                } else {
                    Expression::immediately_invoked(vec![
                        Statement::new(StatementKind::If {
                            condition,
                            then_body: vec![Statement::ret(vec![consequent])],
                            else_body: None,
                        }),
                        Statement::ret(vec![alternate]),
                    ])
                }
            }
        }
    }

    fn index(&mut self, object: Expression, index: &Expr) -> Expression {
        if let Expr::LitStr { v, .. } = index {
            return Expression::field(object, v);
        }
        let key = self.expr(index);
        let helper = self.use_feature(LuaLibFeature::Index);
        Expression::call_named(helper, vec![object, key])
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Expression {
        if let Expr::Member {
            object,
            property,
            optional: false,
            ..
        } = callee
        {
            if let Expr::Ident { name, .. } = &**object {
                if name == "console" && CONSOLE_METHODS.contains(&property.as_str()) {
                    let args = self.exprs(args);
                    return Expression::call_named("print", args);
                }
                if DIRECT_LIBRARIES.contains(&name.as_str()) {
                    let library = self.expr(object);
                    let args = self.exprs(args);
                    return Expression::call(Expression::field(library, property), args);
                }
            }

            let object = self.expr(object);
            let mut call_args = vec![object, Expression::string(property)];
            call_args.extend(self.exprs(args));
            let helper = self.use_feature(LuaLibFeature::CallMethod);
            return Expression::call_named(helper, call_args);
        }

        let callee = self.expr(callee);
        let args = self.exprs(args);
        Expression::call(callee, args)
    }

    fn exprs(&mut self, exprs: &[Expr]) -> Vec<Expression> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Expression {
        let (left_kind, right_kind) = (static_kind(left), static_kind(right));
        let left = self.expr(left);
        let right = self.expr(right);

        let op = match op {
            BinaryOp::Nullish => {
                let helper = self.use_feature(LuaLibFeature::Nullish);
                let fallback = Expression::Function {
                    params: Vec::new(),
                    body: vec![Statement::ret(vec![right])],
                };
                return Expression::call_named(helper, vec![left, fallback]);
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                return self.arithmetic(op, left, left_kind, right, right_kind);
            }
            BinaryOp::And => BinaryOperator::And,
            BinaryOp::Or => BinaryOperator::Or,
            BinaryOp::Eq => BinaryOperator::Eq,
            BinaryOp::Ne => BinaryOperator::Ne,
            BinaryOp::Lt => BinaryOperator::Lt,
            BinaryOp::Lte => BinaryOperator::Le,
            BinaryOp::Gt => BinaryOperator::Gt,
            BinaryOp::Gte => BinaryOperator::Ge,
        };
        Expression::binary(op, left, right)
    }

    fn arithmetic(
        &mut self,
        op: BinaryOp,
        left: Expression,
        left_kind: StaticKind,
        right: Expression,
        right_kind: StaticKind,
    ) -> Expression {
        let op = match op {
            BinaryOp::Add => match (left_kind, right_kind) {
                (StaticKind::Number, StaticKind::Number) => BinaryOperator::Add,
                (StaticKind::String, StaticKind::String) => BinaryOperator::Concat,
                _ => {
                    let helper = self.use_feature(LuaLibFeature::Add);
                    return Expression::call_named(helper, vec![left, right]);
                }
            },
            BinaryOp::Sub => BinaryOperator::Sub,
            BinaryOp::Mul => BinaryOperator::Mul,
            BinaryOp::Div => BinaryOperator::Div,
            _ => BinaryOperator::Mod,
        };
        Expression::binary(op, left, right)
    }
}
