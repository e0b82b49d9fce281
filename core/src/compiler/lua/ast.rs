//! Lua syntax tree produced by the transform and printed by the emitter

use serde::{Deserialize, Serialize};

use crate::compiler::ast::Span;
use crate::compiler::lualib::LuaLibFeature;

/// A complete Lua chunk
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Chunk {
    /// Runtime helpers injected ahead of the body
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lualib: Vec<LuaLibFeature>,
    pub body: Vec<Statement>,
}

/// Source position a generated statement was lowered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// 0-indexed
    pub line: usize,
    /// 0-indexed
    pub column: usize,
}

impl From<Span> for Origin {
    fn from(span: Span) -> Self {
        Origin {
            line: span.start_line,
            column: span.start_col,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(flatten)]
    pub kind: StatementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Self {
        Statement { kind, origin: None }
    }

    pub fn at(kind: StatementKind, span: Span) -> Self {
        Statement {
            kind,
            origin: Some(span.into()),
        }
    }

    pub fn local(name: impl Into<String>, value: Option<Expression>) -> Self {
        Statement::new(StatementKind::Local {
            names: vec![name.into()],
            values: value.into_iter().collect(),
        })
    }

    pub fn assign(target: Expression, value: Expression) -> Self {
        Statement::new(StatementKind::Assign {
            targets: vec![target],
            values: vec![value],
        })
    }

    pub fn call(call: Expression) -> Self {
        Statement::new(StatementKind::Call { call })
    }

    pub fn ret(values: Vec<Expression>) -> Self {
        Statement::new(StatementKind::Return { values })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StatementKind {
    Local {
        names: Vec<String>,
        values: Vec<Expression>,
    },
    Assign {
        targets: Vec<Expression>,
        values: Vec<Expression>,
    },
    LocalFunction {
        name: String,
        params: Vec<String>,
        body: Vec<Statement>,
    },
    Call {
        call: Expression,
    },
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_body: Option<Vec<Statement>>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    ForIn {
        names: Vec<String>,
        iterators: Vec<Expression>,
        body: Vec<Statement>,
    },
    Do {
        body: Vec<Statement>,
    },
    Return {
        values: Vec<Expression>,
    },
    Break,
    Goto {
        label: String,
    },
    Label {
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Or,
    And,
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
    Eq,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Or => "or",
            BinaryOperator::And => "and",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Le => "<=",
            BinaryOperator::Ge => ">=",
            BinaryOperator::Ne => "~=",
            BinaryOperator::Eq => "==",
            BinaryOperator::Concat => "..",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
        }
    }

    /// Lua 5.4 operator priority (higher binds tighter)
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Lt
            | BinaryOperator::Gt
            | BinaryOperator::Le
            | BinaryOperator::Ge
            | BinaryOperator::Ne
            | BinaryOperator::Eq => 3,
            BinaryOperator::Concat => 9,
            BinaryOperator::Add | BinaryOperator::Sub => 10,
            BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => 11,
        }
    }

    pub fn is_right_associative(self) -> bool {
        self == BinaryOperator::Concat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Neg,
    Len,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Not => "not ",
            UnaryOperator::Neg => "-",
            UnaryOperator::Len => "#",
        }
    }
}

pub const UNARY_PRECEDENCE: u8 = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Expression {
    Nil,
    Boolean {
        value: bool,
    },
    Number {
        value: f64,
    },
    String {
        value: String,
    },
    Identifier {
        name: String,
    },
    Index {
        object: Box<Expression>,
        key: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    Function {
        params: Vec<String>,
        body: Vec<Statement>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    Table {
        fields: Vec<TableField>,
    },
}

impl Expression {
    pub fn ident(name: impl Into<String>) -> Self {
        Expression::Identifier { name: name.into() }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::String {
            value: value.into(),
        }
    }

    pub fn number(value: f64) -> Self {
        Expression::Number { value }
    }

    pub fn call(callee: Expression, args: Vec<Expression>) -> Self {
        Expression::Call {
            callee: Box::new(callee),
            args,
        }
    }

    /// Call a global or local function by name
    pub fn call_named(name: &str, args: Vec<Expression>) -> Self {
        Expression::call(Expression::ident(name), args)
    }

    pub fn index(object: Expression, key: Expression) -> Self {
        Expression::Index {
            object: Box::new(object),
            key: Box::new(key),
        }
    }

    /// `object.name`
    pub fn field(object: Expression, name: impl Into<String>) -> Self {
        Expression::index(object, Expression::string(name))
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOperator, operand: Expression) -> Self {
        Expression::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// `(function() <body> end)()`
    pub fn immediately_invoked(body: Vec<Statement>) -> Self {
        Expression::call(
            Expression::Function {
                params: Vec::new(),
                body,
            },
            Vec::new(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TableField {
    Positional { value: Expression },
    Named { name: String, value: Expression },
    Keyed { key: Expression, value: Expression },
}

/// Lua reserved words that cannot be used as names
pub const LUA_KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
    "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// True if `name` can be written as a bare Lua name
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !LUA_KEYWORDS.contains(&name)
}
