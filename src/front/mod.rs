/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

pub mod ast;
pub mod codegen;

use crate::errors::CompileError;
use ast::*;
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

// Derive the parser from our grammar file.
#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct LanceParser;

pub fn parse_source(source: &str) -> Result<SourceProgram, CompileError> {
    let mut pairs = LanceParser::parse(Rule::program, source)?;
    let program = pairs.next().ok_or(CompileError::InvalidInputFile)?;

    let mut declarations = Vec::new();
    let mut statements = Vec::new();
    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::var_declaration => build_declarations(pair, &mut declarations)?,
            Rule::statement => statements.push(build_statement(pair)?),
            Rule::EOI => {}
            _ => return Err(CompileError::InvalidInputFile),
        }
    }

    Ok(SourceProgram {
        declarations,
        statements,
    })
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn build_declarations(
    pair: Pair<Rule>,
    declarations: &mut Vec<Declaration>,
) -> Result<(), CompileError> {
    let line = line_of(&pair);
    for declarator in pair.into_inner() {
        if declarator.as_rule() != Rule::declarator {
            continue;
        }
        let inner = declarator
            .into_inner()
            .next()
            .ok_or(CompileError::InvalidInputFile)?;
        let declaration = match inner.as_rule() {
            Rule::ident => Declaration {
                name: inner.as_str().to_string(),
                kind: DeclarationKind::Scalar { init: None },
                line,
            },
            Rule::init_declarator => {
                let mut parts = inner.into_inner();
                let name = parts.next().unwrap().as_str().to_string();
                let init = build_expr(parts.last().unwrap())?;
                Declaration {
                    name,
                    kind: DeclarationKind::Scalar { init: Some(init) },
                    line,
                }
            }
            Rule::array_declarator => {
                let mut parts = inner.into_inner();
                let name = parts.next().unwrap().as_str().to_string();
                let size = build_expr(parts.next().unwrap())?;
                Declaration {
                    name,
                    kind: DeclarationKind::Array { size },
                    line,
                }
            }
            _ => return Err(CompileError::InvalidInputFile),
        };
        declarations.push(declaration);
    }
    Ok(())
}

fn build_statement(pair: Pair<Rule>) -> Result<Statement, CompileError> {
    let line = line_of(&pair);
    let inner = pair
        .into_inner()
        .next()
        .ok_or(CompileError::InvalidInputFile)?;

    let kind = match inner.as_rule() {
        Rule::block => {
            let mut body = Vec::new();
            for statement in inner.into_inner() {
                body.push(build_statement(statement)?);
            }
            StatementKind::Block(body)
        }
        Rule::if_statement => {
            let mut parts = inner.into_inner();
            parts.next(); // if keyword
            let condition = build_expr(parts.next().unwrap())?;
            let then_branch = Box::new(build_statement(parts.next().unwrap())?);
            let else_branch = match parts.find(|p| p.as_rule() == Rule::statement) {
                Some(statement) => Some(Box::new(build_statement(statement)?)),
                None => None,
            };
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            }
        }
        Rule::while_statement => {
            let mut parts = inner.into_inner();
            parts.next(); // while keyword
            let condition = build_expr(parts.next().unwrap())?;
            let body = Box::new(build_statement(parts.next().unwrap())?);
            StatementKind::While { condition, body }
        }
        Rule::do_while_statement => {
            let mut parts = inner.into_inner();
            parts.next(); // do keyword
            let body = Box::new(build_statement(parts.next().unwrap())?);
            parts.next(); // while keyword
            let condition = build_expr(parts.next().unwrap())?;
            StatementKind::DoWhile { body, condition }
        }
        Rule::return_statement => StatementKind::Return,
        Rule::read_statement => {
            let lvalue = inner
                .into_inner()
                .find(|p| p.as_rule() == Rule::lvalue)
                .ok_or(CompileError::InvalidInputFile)?;
            StatementKind::Read(build_lvalue(lvalue)?)
        }
        Rule::write_statement => {
            let expr = inner
                .into_inner()
                .find(|p| p.as_rule() == Rule::expr)
                .ok_or(CompileError::InvalidInputFile)?;
            StatementKind::Write(build_expr(expr)?)
        }
        Rule::assign_statement => {
            let mut parts = inner.into_inner();
            let target = build_lvalue(parts.next().unwrap())?;
            let value = build_expr(parts.last().unwrap())?;
            StatementKind::Assign { target, value }
        }
        Rule::empty_statement => StatementKind::Empty,
        _ => return Err(CompileError::InvalidInputFile),
    };

    Ok(Statement { kind, line })
}

fn build_lvalue(pair: Pair<Rule>) -> Result<Lvalue, CompileError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or(CompileError::InvalidInputFile)?;
    match inner.as_rule() {
        Rule::ident => Ok(Lvalue::Scalar(inner.as_str().to_string())),
        Rule::array_access => {
            let mut parts = inner.into_inner();
            let name = parts.next().unwrap().as_str().to_string();
            let index = build_expr(parts.next().unwrap())?;
            Ok(Lvalue::Array(name, Box::new(index)))
        }
        _ => Err(CompileError::InvalidInputFile),
    }
}

/// Fold a left-associative operator tier: `operand (op operand)*`.
fn build_binary_tier(pair: Pair<Rule>) -> Result<Expr, CompileError> {
    let mut parts = pair.into_inner();
    let mut result = build_expr(parts.next().ok_or(CompileError::InvalidInputFile)?)?;

    while let Some(op) = parts.next() {
        let rhs = build_expr(parts.next().ok_or(CompileError::InvalidInputFile)?)?;
        let op = match op.as_str() {
            "||" => BinaryOp::LogOr,
            "&&" => BinaryOp::LogAnd,
            "^^" => BinaryOp::LogXor,
            "|" => BinaryOp::BitOr,
            "^" => BinaryOp::BitXor,
            "&" => BinaryOp::BitAnd,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            _ => return Err(CompileError::InvalidExpression),
        };
        result = Expr::Binary(op, Box::new(result), Box::new(rhs));
    }
    Ok(result)
}

fn build_expr(pair: Pair<Rule>) -> Result<Expr, CompileError> {
    match pair.as_rule() {
        Rule::expr => build_expr(pair.into_inner().next().unwrap()),
        Rule::lor_expr
        | Rule::land_expr
        | Rule::lxor_expr
        | Rule::bor_expr
        | Rule::bxor_expr
        | Rule::band_expr
        | Rule::eq_expr
        | Rule::rel_expr
        | Rule::shift_expr
        | Rule::add_expr
        | Rule::mul_expr => build_binary_tier(pair),
        Rule::unary_expr => {
            let mut operators = Vec::new();
            let mut operand = None;
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::unary_op => operators.push(match part.as_str() {
                        "-" => UnaryOp::Neg,
                        "!" => UnaryOp::LogicalNot,
                        _ => UnaryOp::BitwiseNot,
                    }),
                    _ => operand = Some(build_expr(part)?),
                }
            }
            let mut result = operand.ok_or(CompileError::InvalidExpression)?;
            for op in operators.into_iter().rev() {
                result = Expr::Unary(op, Box::new(result));
            }
            Ok(result)
        }
        Rule::primary => build_expr(pair.into_inner().next().unwrap()),
        Rule::number => {
            let value = pair
                .as_str()
                .parse::<i32>()
                .map_err(|_| CompileError::InvalidExpression)?;
            Ok(Expr::Number(value))
        }
        Rule::ident => Ok(Expr::Variable(pair.as_str().to_string())),
        Rule::array_access => {
            let mut parts = pair.into_inner();
            let name = parts.next().unwrap().as_str().to_string();
            let index = build_expr(parts.next().unwrap())?;
            Ok(Expr::ArrayElement(name, Box::new(index)))
        }
        _ => Err(CompileError::InvalidExpression),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_declarations() {
        let source = "int x;\nint y = 4, a[10];\nwrite(x);\n";
        let program = parse_source(source).unwrap();
        assert_eq!(program.declarations.len(), 3);
        assert_eq!(program.declarations[0].name, "x");
        assert_eq!(
            program.declarations[1].kind,
            DeclarationKind::Scalar {
                init: Some(Expr::Number(4))
            }
        );
        assert_eq!(
            program.declarations[2].kind,
            DeclarationKind::Array {
                size: Expr::Number(10)
            }
        );
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn test_precedence_of_operators() {
        let program = parse_source("int x; x = 1 + 2 * 3;").unwrap();
        let StatementKind::Assign { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(
            *value,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Number(1)),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Number(2)),
                    Box::new(Expr::Number(3))
                ))
            )
        );
    }

    #[test]
    fn test_while_and_comparison() {
        let source = "int i;\nwhile (i < 10) { i = i + 1; }\n";
        let program = parse_source(source).unwrap();
        let StatementKind::While { condition, body } = &program.statements[0].kind else {
            panic!("expected while");
        };
        assert!(matches!(condition, Expr::Binary(BinaryOp::Lt, _, _)));
        assert!(matches!(&body.kind, StatementKind::Block(stmts) if stmts.len() == 1));
    }

    #[test]
    fn test_if_else_and_unary() {
        let source = "int x;\nif (!x) x = 1; else x = -x;\n";
        let program = parse_source(source).unwrap();
        let StatementKind::If {
            condition,
            else_branch,
            ..
        } = &program.statements[0].kind
        else {
            panic!("expected if");
        };
        assert!(matches!(condition, Expr::Unary(UnaryOp::LogicalNot, _)));
        assert!(else_branch.is_some());
    }

    #[test]
    fn test_logical_xor_has_its_own_tier() {
        // ^^ binds tighter than && and looser than |.
        let program = parse_source("int x; x = 1 && 2 ^^ 3 | 4;").unwrap();
        let StatementKind::Assign { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        let Expr::Binary(BinaryOp::LogAnd, _, rhs) = value else {
            panic!("expected && at the top, got {:?}", value);
        };
        let Expr::Binary(BinaryOp::LogXor, _, xor_rhs) = rhs.as_ref() else {
            panic!("expected ^^ below &&, got {:?}", rhs);
        };
        assert!(matches!(xor_rhs.as_ref(), Expr::Binary(BinaryOp::BitOr, _, _)));
    }

    #[test]
    fn test_array_access_and_read_write() {
        let source = "int a[4];\nread(a[0]);\nwrite(a[0] + a[1]);\n";
        let program = parse_source(source).unwrap();
        assert!(matches!(
            &program.statements[0].kind,
            StatementKind::Read(Lvalue::Array(name, _)) if name == "a"
        ));
    }

    #[test]
    fn test_syntax_error_is_reported() {
        assert!(matches!(
            parse_source("int x; x = ;"),
            Err(CompileError::SyntaxError(_))
        ));
    }

    #[test]
    fn test_comments_are_skipped() {
        let source = "/* decls */ int x; // trailing\nx = 1; /* done */";
        assert!(parse_source(source).is_ok());
    }
}
