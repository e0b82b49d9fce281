//! PEST-based parser for Flow source files
//!
//! Produces a [`Module`] with span information on every node, used for
//! diagnostics and source maps.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use super::ast::{
    ArrowBody, AssignOp, AmbientKind, BinaryOp, Binding, DeclareTarget, Expr, ForLoopKind,
    MemberAccess, Module, Span, Stmt, UnaryOp, VarKind,
};

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "compiler/flow.pest"]
struct FlowParser;

/* ===================== Error Types ===================== */

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}")]
    PestError(String, Option<Span>),
    #[error("{0}")]
    BuildError(String, Option<Span>),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::PestError(_, span) => *span,
            ParseError::BuildError(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::PestError(msg, _) => msg,
            ParseError::BuildError(msg, _) => msg,
        }
    }

    fn from_pest(err: pest::error::Error<Rule>, index: &LineIndex) -> Self {
        let err = err.renamed_rules(describe_rule);
        let (start, end) = match err.location {
            pest::error::InputLocation::Pos(pos) => (pos, pos),
            pest::error::InputLocation::Span((start, end)) => (start, end),
        };
        let message = format!("Syntax error: {}", err.variant.message());
        ParseError::PestError(message, Some(index.span_of(start, end)))
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

fn describe_rule(rule: &Rule) -> String {
    match rule {
        Rule::EOI => "end of input".to_string(),
        Rule::identifier | Rule::identifier_name => "identifier".to_string(),
        Rule::assign_op => "'='".to_string(),
        Rule::kw_catch => "'catch'".to_string(),
        other => format!("{:?}", other).replace('_', " "),
    }
}

/* ===================== Span Helpers ===================== */

/// Precomputed line starts for offset → (line, column) lookups
struct LineIndex<'s> {
    source: &'s str,
    line_starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    fn new(source: &'s str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            source,
            line_starts,
        }
    }

    /// 0-indexed (line, column); columns count chars
    fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let start = self.line_starts[line];
        let col = self
            .source
            .get(start..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(0);
        (line, col)
    }

    fn span_of(&self, start: usize, end: usize) -> Span {
        let (start_line, start_col) = self.line_col(start);
        let (end_line, end_col) = self.line_col(end);
        Span::new(start, end, start_line, start_col, end_line, end_col)
    }

    fn span(&self, pair: &Pair<Rule>) -> Span {
        let pest_span = pair.as_span();
        self.span_of(pest_span.start(), pest_span.end())
    }
}

/// Convert byte offset to (line, column) - 0-indexed
pub fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    LineIndex::new(source).line_col(offset)
}

/// Inner pairs without keyword tokens
fn children<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword_token(p.as_rule()))
}

fn is_keyword_token(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_function
            | Rule::kw_return
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_for
            | Rule::kw_try
            | Rule::kw_catch
            | Rule::kw_throw
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_export
            | Rule::kw_declare
            | Rule::kw_new
    )
}

/* ===================== Public API ===================== */

/// Parse a Flow source string into a module
pub fn parse_module(source: &str) -> ParseResult<Module> {
    let index = LineIndex::new(source);
    let mut pairs =
        FlowParser::parse(Rule::program, source).map_err(|e| ParseError::from_pest(e, &index))?;

    let program = pairs.next().unwrap();
    let span = index.span(&program);
    let body = program
        .into_inner()
        .filter(|p| p.as_rule() == Rule::statement)
        .map(|p| build_statement(p, &index))
        .collect::<ParseResult<Vec<_>>>()?;

    Ok(Module { body, span })
}

/// Parse a single expression (testing API)
pub fn parse_expression(source: &str) -> ParseResult<Expr> {
    let module = parse_module(source)?;
    match module.body.into_iter().next() {
        Some(Stmt::Expr { expr, .. }) => Ok(expr),
        _ => Err(ParseError::BuildError(
            "Expected a single expression statement".to_string(),
            None,
        )),
    }
}

/* ===================== AST Builder ===================== */

fn build_block(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Stmt> {
    let span = index.span(&pair);
    let statements: ParseResult<Vec<Stmt>> = pair
        .into_inner()
        .map(|stmt_pair| build_statement(stmt_pair, index))
        .collect();

    Ok(Stmt::Block {
        body: statements?,
        span,
    })
}

fn build_var_kind(pair: &Pair<Rule>, index: &LineIndex) -> ParseResult<VarKind> {
    match pair.as_str() {
        "let" => Ok(VarKind::Let),
        "const" => Ok(VarKind::Const),
        other => Err(ParseError::BuildError(
            format!("Expected 'let' or 'const', got: {}", other),
            Some(index.span(pair)),
        )),
    }
}

fn build_params(pair: Pair<Rule>, index: &LineIndex) -> Vec<Binding> {
    pair.into_inner()
        .map(|id| Binding {
            span: index.span(&id),
            name: id.as_str().to_string(),
        })
        .collect()
}

fn build_function_decl(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Stmt> {
    let span = index.span(&pair);
    let mut inner = children(pair);

    let name_pair = inner.next().unwrap();
    let name_span = index.span(&name_pair);
    let name = name_pair.as_str().to_string();

    let mut params = Vec::new();
    let mut body = None;
    for part in inner {
        match part.as_rule() {
            Rule::param_list => params = build_params(part, index),
            Rule::block => body = Some(build_block(part, index)?),
            _ => {}
        }
    }

    let body = body.ok_or_else(|| {
        ParseError::BuildError(format!("Function '{}' has no body", name), Some(span))
    })?;

    Ok(Stmt::Function {
        name,
        name_span,
        params,
        body: Box::new(body),
        exported: false,
        span,
    })
}

fn build_ambient_decl(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Stmt> {
    let span = index.span(&pair);
    let decl = children(pair).next().unwrap();

    let kind = match decl.as_rule() {
        Rule::ambient_function => AmbientKind::Function,
        Rule::ambient_var => AmbientKind::Variable,
        other => {
            return Err(ParseError::BuildError(
                format!("Unexpected ambient declaration: {:?}", other),
                Some(span),
            ))
        }
    };

    let name = children(decl)
        .find(|p| p.as_rule() == Rule::identifier)
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();

    Ok(Stmt::Ambient { name, kind, span })
}

fn build_export_stmt(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Stmt> {
    let span = index.span(&pair);
    let inner = children(pair).next().unwrap();
    let mut stmt = build_statement(inner, index)?;

    match &mut stmt {
        Stmt::Function {
            exported, span: s, ..
        }
        | Stmt::Declare {
            exported, span: s, ..
        } => {
            *exported = true;
            *s = span;
        }
        _ => {
            return Err(ParseError::BuildError(
                "Only declarations can be exported".to_string(),
                Some(span),
            ))
        }
    }

    Ok(stmt)
}

fn build_if_stmt(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Stmt> {
    let span = index.span(&pair);
    let mut inner = children(pair);

    let test = build_expression(inner.next().unwrap(), index)?;
    let then_s = build_statement(inner.next().unwrap(), index)?;

    let else_s = if let Some(else_clause_pair) = inner.next() {
        let else_inner = children(else_clause_pair).next().unwrap();
        Some(Box::new(build_statement(else_inner, index)?))
    } else {
        None
    };

    Ok(Stmt::If {
        test,
        then_s: Box::new(then_s),
        else_s,
        span,
    })
}

fn build_while_stmt(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Stmt> {
    let span = index.span(&pair);
    let mut inner = children(pair);

    let test = build_expression(inner.next().unwrap(), index)?;
    let body = build_statement(inner.next().unwrap(), index)?;

    Ok(Stmt::While {
        test,
        body: Box::new(body),
        span,
    })
}

fn build_for_loop_stmt(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Stmt> {
    let span = index.span(&pair);
    let mut inner = children(pair);

    let var_kind = build_var_kind(&inner.next().unwrap(), index)?;

    let binding_pair = inner.next().unwrap();
    let binding_span = index.span(&binding_pair);
    let binding = binding_pair.as_str().to_string();

    let kind_pair = inner.next().unwrap();
    let kind = match kind_pair.as_str() {
        "of" => ForLoopKind::Of,
        "in" => ForLoopKind::In,
        other => {
            return Err(ParseError::BuildError(
                format!("Expected 'of' or 'in', got: {}", other),
                Some(index.span(&kind_pair)),
            ))
        }
    };

    let iterable = build_expression(inner.next().unwrap(), index)?;
    let body = build_statement(inner.next().unwrap(), index)?;

    Ok(Stmt::ForLoop {
        kind,
        var_kind,
        binding,
        binding_span,
        iterable,
        body: Box::new(body),
        span,
    })
}

fn build_declare_stmt(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Stmt> {
    let span = index.span(&pair);
    let mut inner = children(pair);

    let var_kind = build_var_kind(&inner.next().unwrap(), index)?;
    let target = build_declare_target(inner.next().unwrap(), index)?;

    let init = if let Some(expr_pair) = inner.next() {
        Some(build_expression(expr_pair, index)?)
    } else {
        None
    };

    if matches!(target, DeclareTarget::Destructure { .. }) && init.is_none() {
        return Err(ParseError::BuildError(
            "Destructuring declaration requires an initializer".to_string(),
            Some(span),
        ));
    }

    if var_kind == VarKind::Const && init.is_none() {
        return Err(ParseError::BuildError(
            "'const' declarations must be initialized".to_string(),
            Some(span),
        ));
    }

    Ok(Stmt::Declare {
        var_kind,
        target,
        init,
        exported: false,
        span,
    })
}

fn build_declare_target(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<DeclareTarget> {
    let inner = pair.into_inner().next().unwrap();
    let inner_span = index.span(&inner);

    match inner.as_rule() {
        Rule::identifier => Ok(DeclareTarget::Simple {
            name: inner.as_str().to_string(),
            span: inner_span,
        }),
        Rule::destructure_pattern => {
            let props_pair = inner.into_inner().next().unwrap();
            Ok(DeclareTarget::Destructure {
                names: build_params(props_pair, index),
                span: inner_span,
            })
        }
        _ => Err(ParseError::BuildError(
            format!("Unexpected declare target rule: {:?}", inner.as_rule()),
            Some(inner_span),
        )),
    }
}

fn build_try_stmt(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Stmt> {
    let span = index.span(&pair);
    let mut inner = children(pair);

    let body = build_statement(inner.next().unwrap(), index)?;

    let catch_var_pair = inner.next().unwrap();
    let catch_var_span = index.span(&catch_var_pair);
    let catch_var = catch_var_pair.as_str().to_string();

    let catch_body = build_statement(inner.next().unwrap(), index)?;

    Ok(Stmt::Try {
        body: Box::new(body),
        catch_var,
        catch_var_span,
        catch_body: Box::new(catch_body),
        span,
    })
}

fn build_assign_stmt(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Stmt> {
    let span = index.span(&pair);
    let mut inner = pair.into_inner();

    let var_pair = inner.next().unwrap();
    let var_span = index.span(&var_pair);
    let var = var_pair.as_str().to_string();

    let mut path = Vec::new();
    let mut op = None;
    let mut expr_pair = None;

    for pair in inner {
        match pair.as_rule() {
            Rule::assign_path_segment => {
                let segment_span = index.span(&pair);
                let segment_inner = pair.into_inner().next().unwrap();
                match segment_inner.as_rule() {
                    Rule::identifier_name => path.push(MemberAccess::Prop {
                        property: segment_inner.as_str().to_string(),
                        span: segment_span,
                    }),
                    Rule::expression => path.push(MemberAccess::Index {
                        expr: build_expression(segment_inner, index)?,
                        span: segment_span,
                    }),
                    _ => {}
                }
            }
            Rule::assign_op => {
                op = match pair.as_str() {
                    "+=" => Some(AssignOp::Add),
                    "-=" => Some(AssignOp::Sub),
                    "*=" => Some(AssignOp::Mul),
                    "/=" => Some(AssignOp::Div),
                    _ => None,
                };
            }
            Rule::expression => {
                expr_pair = Some(pair);
                break;
            }
            _ => {}
        }
    }

    let value = build_expression(expr_pair.unwrap(), index)?;
    Ok(Stmt::Assign {
        var,
        var_span,
        path,
        op,
        value,
        span,
    })
}

fn binary_op_for(rule: Rule) -> Option<BinaryOp> {
    let op = match rule {
        Rule::op_and => BinaryOp::And,
        Rule::op_or => BinaryOp::Or,
        Rule::op_nullish => BinaryOp::Nullish,
        Rule::op_eq => BinaryOp::Eq,
        Rule::op_ne => BinaryOp::Ne,
        Rule::op_lt => BinaryOp::Lt,
        Rule::op_lte => BinaryOp::Lte,
        Rule::op_gt => BinaryOp::Gt,
        Rule::op_gte => BinaryOp::Gte,
        Rule::op_add => BinaryOp::Add,
        Rule::op_sub => BinaryOp::Sub,
        Rule::op_mul => BinaryOp::Mul,
        Rule::op_div => BinaryOp::Div,
        Rule::op_mod => BinaryOp::Mod,
        _ => return None,
    };
    Some(op)
}

fn build_binary_expr(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Expr> {
    let span = index.span(&pair);
    let mut inner = pair.into_inner();

    let first = inner.next().ok_or_else(|| {
        ParseError::BuildError("Empty binary expression".to_string(), Some(span))
    })?;
    let mut left = build_expression(first, index)?;

    while let Some(op_pair) = inner.next() {
        let op = binary_op_for(op_pair.as_rule()).ok_or_else(|| {
            ParseError::BuildError(
                format!("Expected operator, got {:?}", op_pair.as_rule()),
                Some(span),
            )
        })?;

        let right_pair = inner.next().ok_or_else(|| {
            ParseError::BuildError("Missing right operand after operator".to_string(), Some(span))
        })?;
        let right = build_expression(right_pair, index)?;
        let new_span = left.span().merge(&right.span());

        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: new_span,
        };
    }

    Ok(left)
}

fn build_statement(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Stmt> {
    let span = index.span(&pair);

    match pair.as_rule() {
        Rule::statement => {
            let inner = pair.into_inner().next().unwrap();
            build_statement(inner, index)
        }
        Rule::ambient_decl => build_ambient_decl(pair, index),
        Rule::export_stmt => build_export_stmt(pair, index),
        Rule::function_decl => build_function_decl(pair, index),
        Rule::return_stmt => {
            let value = children(pair)
                .next()
                .map(|expr_pair| build_expression(expr_pair, index))
                .transpose()?;
            Ok(Stmt::Return { value, span })
        }
        Rule::throw_stmt => {
            let expr_pair = children(pair).next().unwrap();
            let value = build_expression(expr_pair, index)?;
            Ok(Stmt::Throw { value, span })
        }
        Rule::if_stmt => build_if_stmt(pair, index),
        Rule::while_stmt => build_while_stmt(pair, index),
        Rule::for_loop_stmt => build_for_loop_stmt(pair, index),
        Rule::try_stmt => build_try_stmt(pair, index),
        Rule::break_stmt => Ok(Stmt::Break { span }),
        Rule::continue_stmt => Ok(Stmt::Continue { span }),
        Rule::block => build_block(pair, index),
        Rule::declare_stmt => build_declare_stmt(pair, index),
        Rule::assign_stmt => build_assign_stmt(pair, index),
        Rule::expr_stmt => {
            let expr_pair = pair.into_inner().next().unwrap();
            let expr = build_expression(expr_pair, index)?;
            Ok(Stmt::Expr { expr, span })
        }
        _ => Err(ParseError::BuildError(
            format!("Unexpected statement rule: {:?}", pair.as_rule()),
            Some(span),
        )),
    }
}

fn build_arrow_fn(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Expr> {
    let span = index.span(&pair);
    let mut inner = pair.into_inner();

    let params_pair = inner.next().unwrap();
    let params = match params_pair.into_inner().next() {
        Some(p) if p.as_rule() == Rule::param_list => build_params(p, index),
        Some(p) => vec![Binding {
            span: index.span(&p),
            name: p.as_str().to_string(),
        }],
        None => Vec::new(),
    };

    let body_pair = inner.next().unwrap();
    let body = match body_pair.as_rule() {
        Rule::block => ArrowBody::Block {
            body: Box::new(build_block(body_pair, index)?),
        },
        _ => ArrowBody::Expr {
            expr: Box::new(build_expression(body_pair, index)?),
        },
    };

    Ok(Expr::Arrow { params, body, span })
}

fn build_postfix_expr(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Expr> {
    let mut inner = children(pair);
    let primary_pair = inner.next().unwrap();
    let mut expr = build_expression(primary_pair, index)?;

    for postfix_pair in inner {
        let postfix_span = index.span(&postfix_pair);
        let postfix_inner = postfix_pair.into_inner().next().unwrap();
        let new_span = expr.span().merge(&postfix_span);

        expr = match postfix_inner.as_rule() {
            Rule::call_suffix => {
                let args = match postfix_inner.into_inner().next() {
                    Some(arg_list_pair) => build_expr_list(arg_list_pair, index)?,
                    None => vec![],
                };
                Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span: new_span,
                }
            }
            Rule::optional_access | Rule::regular_access => {
                let optional = postfix_inner.as_rule() == Rule::optional_access;
                let prop_pair = postfix_inner.into_inner().next().unwrap();
                Expr::Member {
                    object: Box::new(expr),
                    property: prop_pair.as_str().to_string(),
                    property_span: index.span(&prop_pair),
                    optional,
                    span: new_span,
                }
            }
            Rule::index_access => {
                let index_pair = postfix_inner.into_inner().next().unwrap();
                Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(build_expression(index_pair, index)?),
                    span: new_span,
                }
            }
            other => {
                return Err(ParseError::BuildError(
                    format!("Unexpected postfix rule: {:?}", other),
                    Some(postfix_span),
                ))
            }
        };
    }

    Ok(expr)
}

fn build_template(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Expr> {
    let span = index.span(&pair);
    let mut result: Option<Expr> = None;

    for part in pair.into_inner() {
        let part_span = index.span(&part);
        let part_expr = match part.as_rule() {
            Rule::template_chars => Expr::LitStr {
                v: unescape(part.as_str()),
                span: part_span,
            },
            Rule::template_sub => build_expression(part.into_inner().next().unwrap(), index)?,
            _ => continue,
        };

        // A leading substitution still has to concatenate as a string
        let left = match result.take() {
            Some(left) => left,
            None if matches!(part_expr, Expr::LitStr { .. }) => {
                result = Some(part_expr);
                continue;
            }
            None => Expr::LitStr {
                v: String::new(),
                span,
            },
        };

        result = Some(Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(left),
            right: Box::new(part_expr),
            span,
        });
    }

    Ok(result.unwrap_or(Expr::LitStr {
        v: String::new(),
        span,
    }))
}

fn build_expression(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Expr> {
    let span = index.span(&pair);

    match pair.as_rule() {
        Rule::expression | Rule::primary | Rule::literal | Rule::paren_expr => {
            let inner = pair.into_inner().next().unwrap();
            build_expression(inner, index)
        }
        Rule::arrow_fn => build_arrow_fn(pair, index),
        Rule::ternary_expr => {
            let mut inner = pair.into_inner();
            let condition = build_expression(inner.next().unwrap(), index)?;

            if let Some(consequent_pair) = inner.next() {
                let consequent = build_expression(consequent_pair, index)?;
                let alternate = build_expression(inner.next().unwrap(), index)?;
                Ok(Expr::Ternary {
                    condition: Box::new(condition),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                    span,
                })
            } else {
                Ok(condition)
            }
        }
        Rule::nullish_expr
        | Rule::logical_or_expr
        | Rule::logical_and_expr
        | Rule::equality_expr
        | Rule::comparison_expr
        | Rule::additive_expr
        | Rule::multiplicative_expr => build_binary_expr(pair, index),
        Rule::unary_expr => {
            let mut inner = pair.into_inner();
            let first = inner.next().unwrap();

            let op = match first.as_rule() {
                Rule::op_not => UnaryOp::Not,
                Rule::op_neg => UnaryOp::Neg,
                _ => return build_expression(first, index),
            };
            let operand = build_expression(inner.next().unwrap(), index)?;
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                span,
            })
        }
        Rule::postfix_expr => build_postfix_expr(pair, index),
        Rule::identifier => Ok(Expr::Ident {
            name: pair.as_str().to_string(),
            span,
        }),
        Rule::number => {
            let num_str = pair.as_str();
            let value = num_str.parse::<f64>().map_err(|e| {
                ParseError::BuildError(
                    format!("Failed to parse number '{}': {}", num_str, e),
                    Some(span),
                )
            })?;
            Ok(Expr::LitNum { v: value, span })
        }
        Rule::boolean => Ok(Expr::LitBool {
            v: pair.as_str() == "true",
            span,
        }),
        Rule::string => Ok(Expr::LitStr {
            v: string_value(pair),
            span,
        }),
        Rule::template => build_template(pair, index),
        Rule::null_lit => Ok(Expr::LitNull { span }),
        Rule::object_lit => build_object_literal(pair, index),
        Rule::array_lit => {
            let elements = match pair.into_inner().next() {
                Some(element_list_pair) => build_expr_list(element_list_pair, index)?,
                None => vec![],
            };
            Ok(Expr::LitList { elements, span })
        }
        _ => Err(ParseError::BuildError(
            format!("Unexpected expression rule: {:?}", pair.as_rule()),
            Some(span),
        )),
    }
}

fn build_expr_list(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Vec<Expr>> {
    pair.into_inner()
        .map(|expr_pair| build_expression(expr_pair, index))
        .collect()
}

fn build_object_literal(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<Expr> {
    let span = index.span(&pair);

    let properties = match pair.into_inner().next() {
        Some(property_list_pair) => property_list_pair
            .into_inner()
            .map(|property_pair| build_property(property_pair, index))
            .collect::<ParseResult<Vec<_>>>()?,
        None => vec![],
    };

    Ok(Expr::LitObj { properties, span })
}

fn build_property(pair: Pair<Rule>, index: &LineIndex) -> ParseResult<(String, Span, Expr)> {
    let inner = pair.into_inner().next().unwrap();
    let inner_span = index.span(&inner);

    match inner.as_rule() {
        Rule::property_pair => {
            let mut inner_pairs = inner.into_inner();
            let key_pair = inner_pairs.next().unwrap();
            let key_span = index.span(&key_pair);
            let key_token = key_pair.into_inner().next().unwrap();
            let key = match key_token.as_rule() {
                Rule::string => string_value(key_token),
                _ => key_token.as_str().to_string(),
            };
            let value = build_expression(inner_pairs.next().unwrap(), index)?;
            Ok((key, key_span, value))
        }
        Rule::property_shorthand => {
            let key = inner.as_str().to_string();
            let value = Expr::Ident {
                name: key.clone(),
                span: inner_span,
            };
            Ok((key, inner_span, value))
        }
        _ => Err(ParseError::BuildError(
            format!("Unexpected property rule: {:?}", inner.as_rule()),
            Some(inner_span),
        )),
    }
}

fn string_value(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|content| unescape(content.as_str()))
        .unwrap_or_default()
}

/// Resolve backslash escapes in a string or template literal body
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_stmt(source: &str) -> Stmt {
        parse_module(source)
            .expect("parse failed")
            .body
            .into_iter()
            .next()
            .expect("no statements")
    }

    #[test]
    fn test_parse_declarations_and_spans() {
        let module = parse_module("let a = 1\nconst b = a + 2;").unwrap();
        assert_eq!(module.body.len(), 2);

        match &module.body[1] {
            Stmt::Declare {
                var_kind,
                target: DeclareTarget::Simple { name, span },
                init: Some(Expr::Binary { op, .. }),
                ..
            } => {
                assert_eq!(*var_kind, VarKind::Const);
                assert_eq!(name, "b");
                assert_eq!(span.start_line, 1);
                assert_eq!(span.start_col, 6);
                assert_eq!(*op, BinaryOp::Add);
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_keyword_prefixed_identifiers() {
        let module = parse_module("let letter = 1\nreturnValue = letter\nnewItems = [];").unwrap();
        assert_eq!(module.body.len(), 3);
        assert!(matches!(&module.body[1], Stmt::Assign { var, .. } if var == "returnValue"));
        assert!(matches!(&module.body[2], Stmt::Assign { var, .. } if var == "newItems"));
    }

    #[test]
    fn test_operator_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. })),
            other => panic!("unexpected expression: {:?}", other),
        }
    }

    #[test]
    fn test_function_and_export() {
        match first_stmt("export function add(a, b) { return a + b }") {
            Stmt::Function {
                name,
                params,
                exported,
                ..
            } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert!(exported);
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_arrow_functions() {
        let expr = parse_expression("items.map(x => x * 2)").unwrap();
        match expr {
            Expr::Call { callee, args, .. } => {
                assert!(matches!(*callee, Expr::Member { ref property, .. } if property == "map"));
                assert!(matches!(args[0], Expr::Arrow { ref params, .. } if params.len() == 1));
            }
            other => panic!("unexpected expression: {:?}", other),
        }

        let expr = parse_expression("(a, b) => { return a }").unwrap();
        assert!(matches!(
            expr,
            Expr::Arrow {
                body: ArrowBody::Block { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_compound_assignment_and_index_path() {
        match first_stmt("counts[key] += 1") {
            Stmt::Assign { var, path, op, .. } => {
                assert_eq!(var, "counts");
                assert!(matches!(path[0], MemberAccess::Index { .. }));
                assert_eq!(op, Some(AssignOp::Add));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_template_literal_desugars_to_concatenation() {
        let expr = parse_expression("`hi ${name}!`").unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::Add,
                left,
                right,
                ..
            } => {
                assert!(matches!(*right, Expr::LitStr { ref v, .. } if v == "!"));
                assert!(matches!(*left, Expr::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("unexpected expression: {:?}", other),
        }
    }

    #[test]
    fn test_string_escapes() {
        let expr = parse_expression(r#""a\tb\nA""#).unwrap();
        assert!(matches!(expr, Expr::LitStr { ref v, .. } if v == "a\tb\nA"));
    }

    #[test]
    fn test_ambient_declarations() {
        let module = parse_module("declare function host(x)\ndeclare const VERSION;").unwrap();
        assert!(matches!(
            &module.body[0],
            Stmt::Ambient { name, kind: AmbientKind::Function, .. } if name == "host"
        ));
        assert!(matches!(
            &module.body[1],
            Stmt::Ambient { name, kind: AmbientKind::Variable, .. } if name == "VERSION"
        ));
    }

    #[test]
    fn test_try_catch_and_throw() {
        match first_stmt("try { throw Error('boom') } catch (e) { print(e.message) }") {
            Stmt::Try {
                body, catch_var, ..
            } => {
                assert_eq!(catch_var, "e");
                match *body {
                    Stmt::Block { ref body, .. } => {
                        assert!(matches!(body[0], Stmt::Throw { .. }))
                    }
                    ref other => panic!("unexpected try body: {:?}", other),
                }
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_syntax_error_has_position() {
        let err = parse_module("let x = ;\n").unwrap_err();
        assert!(matches!(err, ParseError::PestError(..)));
        let span = err.span().unwrap();
        assert_eq!(span.start_line, 0);
        assert!(err.message().starts_with("Syntax error"));
    }

    #[test]
    fn test_const_requires_initializer() {
        let err = parse_module("const x;").unwrap_err();
        assert!(matches!(err, ParseError::BuildError(..)));
    }

    #[test]
    fn test_offset_to_line_col() {
        let source = "ab\ncd\nef";
        assert_eq!(offset_to_line_col(source, 0), (0, 0));
        assert_eq!(offset_to_line_col(source, 4), (1, 1));
        assert_eq!(offset_to_line_col(source, 6), (2, 0));
    }
}
