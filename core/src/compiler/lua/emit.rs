//! Lua printer
//!
//! Renders a [`Chunk`] as Lua 5.4 source and records, for every statement
//! that carries an [`Origin`](super::ast::Origin), which generated line it
//! starts on. The mappings feed the source map encoder.

use super::ast::{
    is_valid_name, Chunk, Expression, Statement, StatementKind, TableField, UnaryOperator,
    UNARY_PRECEDENCE,
};
use crate::compiler::lualib;

const INDENT: &str = "    ";
const ATOM_PRECEDENCE: u8 = u8::MAX;

/// Generated position → source position, all 0-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: usize,
    pub generated_column: usize,
    pub source_line: usize,
    pub source_column: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EmittedLua {
    pub code: String,
    pub mappings: Vec<Mapping>,
}

/// Print a chunk, prefixed by the runtime helpers it uses
pub fn emit_chunk(chunk: &Chunk) -> EmittedLua {
    let mut printer = Printer::default();

    let prelude = lualib::render(&chunk.lualib);
    if !prelude.is_empty() {
        printer.write(&prelude);
        printer.write("\n");
    }

    printer.block(&chunk.body);

    EmittedLua {
        code: printer.out,
        mappings: printer.mappings,
    }
}

#[derive(Default)]
struct Printer {
    out: String,
    line: usize,
    indent: usize,
    mappings: Vec<Mapping>,
}

impl Printer {
    fn write(&mut self, text: &str) {
        self.line += text.matches('\n').count();
        self.out.push_str(text);
    }

    fn start_line(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    fn block(&mut self, body: &[Statement]) {
        for stmt in body {
            self.statement(stmt);
        }
    }

    fn nested(&mut self, body: &[Statement]) {
        self.indent += 1;
        self.block(body);
        self.indent -= 1;
    }

    fn statement(&mut self, stmt: &Statement) {
        self.start_line();
        if let Some(origin) = stmt.origin {
            self.mappings.push(Mapping {
                generated_line: self.line,
                generated_column: self.indent * INDENT.len(),
                source_line: origin.line,
                source_column: origin.column,
            });
        }

        match &stmt.kind {
            StatementKind::Local { names, values } => {
                self.write("local ");
                self.write(&names.join(", "));
                if !values.is_empty() {
                    self.write(" = ");
                    self.expression_list(values);
                }
            }
            StatementKind::Assign { targets, values } => {
                self.expression_list(targets);
                self.write(" = ");
                self.expression_list(values);
            }
            StatementKind::LocalFunction { name, params, body } => {
                self.write("local function ");
                self.write(name);
                self.function_body(params, body);
            }
            StatementKind::Call { call } => {
                // A leading `(` would otherwise continue the previous statement
                if starts_with_paren(call) {
                    self.write(";");
                }
                self.expression(call, 0)
            }
            StatementKind::If {
                condition,
                then_body,
                else_body,
            } => self.if_chain(condition, then_body, else_body.as_deref()),
            StatementKind::While { condition, body } => {
                self.write("while ");
                self.expression(condition, 0);
                self.write(" do\n");
                self.nested(body);
                self.close("end");
            }
            StatementKind::ForIn {
                names,
                iterators,
                body,
            } => {
                self.write("for ");
                self.write(&names.join(", "));
                self.write(" in ");
                self.expression_list(iterators);
                self.write(" do\n");
                self.nested(body);
                self.close("end");
            }
            StatementKind::Do { body } => {
                self.write("do\n");
                self.nested(body);
                self.close("end");
            }
            StatementKind::Return { values } => {
                self.write("return");
                if !values.is_empty() {
                    self.write(" ");
                    self.expression_list(values);
                }
            }
            StatementKind::Break => self.write("break"),
            StatementKind::Goto { label } => {
                self.write("goto ");
                self.write(label);
            }
            StatementKind::Label { name } => {
                self.write("::");
                self.write(name);
                self.write("::");
            }
        }

        self.write("\n");
    }

    /// Writes `keyword` on its own line at the current indent
    fn close(&mut self, keyword: &str) {
        self.start_line();
        self.write(keyword);
    }

    fn if_chain(
        &mut self,
        condition: &Expression,
        then_body: &[Statement],
        else_body: Option<&[Statement]>,
    ) {
        self.write("if ");
        self.expression(condition, 0);
        self.write(" then\n");
        self.nested(then_body);

        let mut else_body = else_body;
        while let Some(body) = else_body {
            match body {
                [Statement {
                    kind:
                        StatementKind::If {
                            condition,
                            then_body,
                            else_body: next,
                        },
                    ..
                }] => {
                    self.start_line();
                    self.write("elseif ");
                    self.expression(condition, 0);
                    self.write(" then\n");
                    self.nested(then_body);
                    else_body = next.as_deref();
                }
                _ => {
                    self.close("else\n");
                    self.nested(body);
                    else_body = None;
                }
            }
        }

        self.close("end");
    }

    fn function_body(&mut self, params: &[String], body: &[Statement]) {
        self.write("(");
        self.write(&params.join(", "));
        self.write(")");
        if body.is_empty() {
            self.write(" end");
            return;
        }
        self.write("\n");
        self.nested(body);
        self.close("end");
    }

    fn expression_list(&mut self, exprs: &[Expression]) {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.expression(expr, 0);
        }
    }

    /// Writes a prefix expression (call target / indexed object)
    fn prefix(&mut self, expr: &Expression) {
        match expr {
            Expression::Identifier { .. } | Expression::Index { .. } | Expression::Call { .. } => {
                self.expression(expr, ATOM_PRECEDENCE)
            }
            _ => {
                self.write("(");
                self.expression(expr, 0);
                self.write(")");
            }
        }
    }

    fn expression(&mut self, expr: &Expression, min_precedence: u8) {
        match expr {
            Expression::Nil => self.write("nil"),
            Expression::Boolean { value } => self.write(if *value { "true" } else { "false" }),
            Expression::Number { value } => {
                let text = format_number(*value);
                self.write(&text);
            }
            Expression::String { value } => {
                let text = quote_string(value);
                self.write(&text);
            }
            Expression::Identifier { name } => self.write(name),
            Expression::Index { object, key } => {
                self.prefix(object);
                match key.as_ref() {
                    Expression::String { value } if is_valid_name(value) => {
                        self.write(".");
                        self.write(value);
                    }
                    _ => {
                        self.write("[");
                        self.expression(key, 0);
                        self.write("]");
                    }
                }
            }
            Expression::Call { callee, args } => {
                self.prefix(callee);
                self.write("(");
                self.expression_list(args);
                self.write(")");
            }
            Expression::Function { params, body } => {
                self.write("function");
                self.function_body(params, body);
            }
            Expression::Binary { op, left, right } => {
                let precedence = op.precedence();
                let wrap = precedence < min_precedence;
                if wrap {
                    self.write("(");
                }
                let (left_min, right_min) = if op.is_right_associative() {
                    (precedence + 1, precedence)
                } else {
                    (precedence, precedence + 1)
                };
                self.expression(left, left_min);
                self.write(" ");
                self.write(op.symbol());
                self.write(" ");
                self.expression(right, right_min);
                if wrap {
                    self.write(")");
                }
            }
            Expression::Unary { op, operand } => {
                let wrap = UNARY_PRECEDENCE < min_precedence;
                if wrap {
                    self.write("(");
                }
                self.write(op.symbol());
                // `- -x` must not print as a `--` comment
                let negated_again = *op == UnaryOperator::Neg
                    && matches!(
                        operand.as_ref(),
                        Expression::Unary {
                            op: UnaryOperator::Neg,
                            ..
                        }
                    );
                if negated_again {
                    self.write("(");
                    self.expression(operand, 0);
                    self.write(")");
                } else {
                    self.expression(operand, UNARY_PRECEDENCE);
                }
                if wrap {
                    self.write(")");
                }
            }
            Expression::Table { fields } => self.table(fields),
        }
    }

    fn table(&mut self, fields: &[TableField]) {
        if fields.is_empty() {
            self.write("{}");
            return;
        }
        self.write("{");
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            match field {
                TableField::Positional { value } => self.expression(value, 0),
                TableField::Named { name, value } if is_valid_name(name) => {
                    self.write(name);
                    self.write(" = ");
                    self.expression(value, 0);
                }
                TableField::Named { name, value } => {
                    self.write("[");
                    let key = quote_string(name);
                    self.write(&key);
                    self.write("] = ");
                    self.expression(value, 0);
                }
                TableField::Keyed { key, value } => {
                    self.write("[");
                    self.expression(key, 0);
                    self.write("] = ");
                    self.expression(value, 0);
                }
            }
        }
        self.write("}");
    }
}

fn format_number(value: f64) -> String {
    if value.is_nan() {
        "(0 / 0)".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "math.huge" } else { "-math.huge" };
        text.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\{:03}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn starts_with_paren(expr: &Expression) -> bool {
    match expr {
        Expression::Function { .. } => true,
        Expression::Call { callee, .. } => starts_with_paren(callee),
        Expression::Index { object, .. } => starts_with_paren(object),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::Span;
    use crate::compiler::lua::ast::BinaryOperator;

    fn print(body: Vec<Statement>) -> String {
        emit_chunk(&Chunk {
            lualib: Vec::new(),
            body,
        })
        .code
    }

    fn add(a: Expression, b: Expression) -> Expression {
        Expression::binary(BinaryOperator::Add, a, b)
    }

    #[test]
    fn test_precedence_parenthesizes_only_when_needed() {
        let x = Expression::ident("x");
        let y = Expression::ident("y");
        let z = Expression::ident("z");

        let grouped = Expression::binary(BinaryOperator::Mul, add(x.clone(), y.clone()), z.clone());
        let flat = add(x.clone(), Expression::binary(BinaryOperator::Mul, y.clone(), z.clone()));
        let right_nested = Expression::binary(BinaryOperator::Sub, x, add(y, z));

        let code = print(vec![
            Statement::local("a", Some(grouped)),
            Statement::local("b", Some(flat)),
            Statement::local("c", Some(right_nested)),
        ]);
        assert_eq!(
            code,
            "local a = (x + y) * z\nlocal b = x + y * z\nlocal c = x - (y + z)\n"
        );
    }

    #[test]
    fn test_index_uses_dot_for_valid_names() {
        let obj = Expression::ident("obj");
        let code = print(vec![
            Statement::call(Expression::call(
                Expression::field(obj.clone(), "run"),
                vec![Expression::index(obj.clone(), Expression::string("end"))],
            )),
            Statement::assign(
                Expression::index(obj, Expression::number(1.0)),
                Expression::string("a\"b\n"),
            ),
        ]);
        assert_eq!(code, "obj.run(obj[\"end\"])\nobj[1] = \"a\\\"b\\n\"\n");
    }

    #[test]
    fn test_if_chain_prints_elseif() {
        let inner = Statement::new(StatementKind::If {
            condition: Expression::ident("b"),
            then_body: vec![Statement::new(StatementKind::Break)],
            else_body: Some(vec![Statement::ret(vec![])]),
        });
        let code = print(vec![Statement::new(StatementKind::If {
            condition: Expression::ident("a"),
            then_body: vec![Statement::call(Expression::call_named("f", vec![]))],
            else_body: Some(vec![inner]),
        })]);
        assert_eq!(
            code,
            "if a then\n    f()\nelseif b then\n    break\nelse\n    return\nend\n"
        );
    }

    #[test]
    fn test_function_expressions_are_wrapped_when_called() {
        let code = print(vec![Statement::local(
            "v",
            Some(Expression::immediately_invoked(vec![Statement::ret(vec![
                Expression::number(1.5),
            ])])),
        )]);
        assert_eq!(code, "local v = (function()\n    return 1.5\nend)()\n");
    }

    #[test]
    fn test_double_negation_is_not_a_comment() {
        let code = print(vec![Statement::local(
            "n",
            Some(Expression::unary(
                UnaryOperator::Neg,
                Expression::unary(UnaryOperator::Neg, Expression::ident("x")),
            )),
        )]);
        assert_eq!(code, "local n = -(-x)\n");
    }

    #[test]
    fn test_mappings_follow_generated_lines() {
        let span = |line| Span::new(0, 1, line, 2, line, 3);
        let emitted = emit_chunk(&Chunk {
            lualib: Vec::new(),
            body: vec![
                Statement::at(
                    StatementKind::While {
                        condition: Expression::Boolean { value: true },
                        body: vec![Statement::at(StatementKind::Break, span(1))],
                    },
                    span(0),
                ),
                Statement::at(StatementKind::Return { values: vec![] }, span(4)),
            ],
        });

        let lines: Vec<(usize, usize, usize)> = emitted
            .mappings
            .iter()
            .map(|m| (m.generated_line, m.generated_column, m.source_line))
            .collect();
        assert_eq!(lines, vec![(0, 0, 0), (1, 4, 1), (3, 0, 4)]);
    }

    #[test]
    fn test_table_fields() {
        let code = print(vec![Statement::local(
            "t",
            Some(Expression::Table {
                fields: vec![
                    TableField::Positional {
                        value: Expression::number(1.0),
                    },
                    TableField::Named {
                        name: "a".into(),
                        value: Expression::Nil,
                    },
                    TableField::Named {
                        name: "b c".into(),
                        value: Expression::Boolean { value: false },
                    },
                ],
            }),
        )]);
        assert_eq!(code, "local t = {1, a = nil, [\"b c\"] = false}\n");
    }
}
