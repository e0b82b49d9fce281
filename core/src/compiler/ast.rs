//! Flow abstract syntax tree

use serde::{Deserialize, Serialize};

/// Source location span for diagnostics and source maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Start line (0-indexed)
    pub start_line: usize,
    /// Start column (0-indexed)
    pub start_col: usize,
    /// End line (0-indexed)
    pub end_line: usize,
    /// End column (0-indexed)
    pub end_col: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a span that covers both self and other
    pub fn merge(&self, other: &Span) -> Span {
        let (start_line, start_col) = if self.start <= other.start {
            (self.start_line, self.start_col)
        } else {
            (other.start_line, other.start_col)
        };
        let (end_line, end_col) = if self.end >= other.end {
            (self.end_line, self.end_col)
        } else {
            (other.end_line, other.end_col)
        };
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A parsed source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub body: Vec<Stmt>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// Variable declaration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Let,
    Const,
}

/// For loop kind (in vs of)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForLoopKind {
    /// for (let k in obj) - iterates over keys
    In,
    /// for (let v of arr) - iterates over values
    Of,
}

/// Shape of an ambient `declare` statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmbientKind {
    Function,
    Variable,
}

/// Named binding with its location (parameters, destructured names)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// Target for variable declaration (simple identifier or destructure pattern)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum DeclareTarget {
    Simple {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Destructure {
        names: Vec<Binding>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl DeclareTarget {
    pub fn bindings(&self) -> Vec<Binding> {
        match self {
            DeclareTarget::Simple { name, span } => vec![Binding {
                name: name.clone(),
                span: *span,
            }],
            DeclareTarget::Destructure { names, .. } => names.clone(),
        }
    }
}

/// Member access segment for assignment paths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum MemberAccess {
    Prop {
        property: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Index {
        expr: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

/// Arithmetic operator of a compound assignment (`+=`, `-=`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Statement AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    Block {
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Declare {
        var_kind: VarKind,
        target: DeclareTarget,
        init: Option<Expr>,
        #[serde(default)]
        exported: bool,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Function {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        name_span: Span,
        params: Vec<Binding>,
        body: Box<Stmt>,
        #[serde(default)]
        exported: bool,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Ambient {
        name: String,
        kind: AmbientKind,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Assign {
        var: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        var_span: Span,
        path: Vec<MemberAccess>,
        op: Option<AssignOp>,
        value: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    If {
        test: Expr,
        then_s: Box<Stmt>,
        else_s: Option<Box<Stmt>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    ForLoop {
        kind: ForLoopKind,
        var_kind: VarKind,
        binding: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        binding_span: Span,
        iterable: Expr,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Return {
        value: Option<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Throw {
        value: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Try {
        body: Box<Stmt>,
        catch_var: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        catch_var_span: Span,
        catch_body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Expr {
        expr: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Break {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Continue {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Stmt {
    /// Get the span of this statement
    pub fn span(&self) -> Span {
        match self {
            Stmt::Block { span, .. } => *span,
            Stmt::Declare { span, .. } => *span,
            Stmt::Function { span, .. } => *span,
            Stmt::Ambient { span, .. } => *span,
            Stmt::Assign { span, .. } => *span,
            Stmt::If { span, .. } => *span,
            Stmt::While { span, .. } => *span,
            Stmt::ForLoop { span, .. } => *span,
            Stmt::Return { span, .. } => *span,
            Stmt::Throw { span, .. } => *span,
            Stmt::Try { span, .. } => *span,
            Stmt::Expr { span, .. } => *span,
            Stmt::Break { span } => *span,
            Stmt::Continue { span } => *span,
        }
    }

    /// True for statements after which control never reaches the next sibling
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Stmt::Return { .. } | Stmt::Throw { .. } | Stmt::Break { .. } | Stmt::Continue { .. }
        )
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    And,     // &&
    Or,      // ||
    Nullish, // ??
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }
}

impl From<AssignOp> for BinaryOp {
    fn from(op: AssignOp) -> Self {
        match op {
            AssignOp::Add => BinaryOp::Add,
            AssignOp::Sub => BinaryOp::Sub,
            AssignOp::Mul => BinaryOp::Mul,
            AssignOp::Div => BinaryOp::Div,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Body of an arrow function: `x => x + 1` or `x => { ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ArrowBody {
    Expr { expr: Box<Expr> },
    Block { body: Box<Stmt> },
}

/// Expression AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    LitBool {
        v: bool,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitNum {
        v: f64,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitStr {
        v: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitNull {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitList {
        elements: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitObj {
        /// Properties as (key, key_span, value) tuples
        properties: Vec<(String, Span, Expr)>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Ident {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Member {
        object: Box<Expr>,
        property: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        property_span: Span,
        optional: bool,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Arrow {
        params: Vec<Binding>,
        body: ArrowBody,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Ternary {
        condition: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Expr {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::LitBool { span, .. } => *span,
            Expr::LitNum { span, .. } => *span,
            Expr::LitStr { span, .. } => *span,
            Expr::LitNull { span } => *span,
            Expr::LitList { span, .. } => *span,
            Expr::LitObj { span, .. } => *span,
            Expr::Ident { span, .. } => *span,
            Expr::Member { span, .. } => *span,
            Expr::Index { span, .. } => *span,
            Expr::Call { span, .. } => *span,
            Expr::Arrow { span, .. } => *span,
            Expr::Binary { span, .. } => *span,
            Expr::Unary { span, .. } => *span,
            Expr::Ternary { span, .. } => *span,
        }
    }

    /// Direct child expressions, not descending into arrow function bodies
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::LitList { elements, .. } => elements.iter().collect(),
            Expr::LitObj { properties, .. } => properties.iter().map(|(_, _, v)| v).collect(),
            Expr::Member { object, .. } => vec![&**object],
            Expr::Index { object, index, .. } => vec![&**object, &**index],
            Expr::Call { callee, args, .. } => {
                let mut out: Vec<&Expr> = vec![&**callee];
                out.extend(args.iter());
                out
            }
            Expr::Binary { left, right, .. } => vec![&**left, &**right],
            Expr::Unary { operand, .. } => vec![&**operand],
            Expr::Ternary {
                condition,
                consequent,
                alternate,
                ..
            } => vec![&**condition, &**consequent, &**alternate],
            Expr::LitBool { .. }
            | Expr::LitNum { .. }
            | Expr::LitStr { .. }
            | Expr::LitNull { .. }
            | Expr::Ident { .. }
            | Expr::Arrow { .. } => vec![],
        }
    }
}

/// Helper function for serde to skip serializing default spans
pub(crate) fn is_default_span(span: &Span) -> bool {
    *span == Span::default()
}
