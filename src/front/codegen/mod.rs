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

//! Statement-level IR generation driving the program builder.

pub mod array;
pub mod expressions;

use crate::errors::CompileError;
use crate::front::ast::{
    Declaration, DeclarationKind, Lvalue, SourceProgram, Statement, StatementKind,
};
use crate::ir::{Address, CG_DIRECT_ALL, Program, REG_0, RegId, VarType};
use crate::target::TargetInfo;
use expressions::{ExprValue, fold_constant, gen_expression};

/// Translate a parsed source program into an IR program ending in `HALT`.
pub fn generate_program(
    source: &SourceProgram,
    target: &TargetInfo,
) -> Result<Program, CompileError> {
    let mut program = Program::new();

    for declaration in &source.declarations {
        generate_declaration(&mut program, declaration)?;
    }
    for statement in &source.statements {
        generate_statement(&mut program, target, statement)?;
    }
    program.gen_halt();
    Ok(program)
}

fn generate_declaration(
    program: &mut Program,
    declaration: &Declaration,
) -> Result<(), CompileError> {
    program.set_source_line(declaration.line);
    match &declaration.kind {
        DeclarationKind::Scalar { init } => {
            let init_val = match init {
                Some(expr) => fold_constant(program, expr)?,
                None => 0,
            };
            program.create_variable(&declaration.name, VarType::Integer, false, 0, init_val)
        }
        DeclarationKind::Array { size } => {
            let size = fold_constant(program, size)?;
            program.create_variable(&declaration.name, VarType::Integer, true, size, 0)
        }
    }
}

/// The register caching a scalar variable. The first touch assigns the
/// register and, when `gen_load` is set, loads the variable's word from its
/// storage label; assignments skip the load because they overwrite the
/// whole value.
pub fn get_symbol_location(
    program: &mut Program,
    id: &str,
    gen_load: bool,
) -> Result<RegId, CompileError> {
    let variable = program
        .get_variable(id)
        .ok_or_else(|| CompileError::SymbolTableError(id.to_string()))?;
    if variable.is_array {
        return Err(CompileError::InvalidType(id.to_string()));
    }
    let label = variable.label;

    if let Some(location) = program.sy_table.location_of(id) {
        return Ok(location);
    }
    let location = program.new_register();
    program.sy_table.set_location(id, location)?;
    if gen_load {
        program.gen_load(location, Address::Label(label));
    }
    Ok(location)
}

/// Evaluate `condition` and leave the flags reflecting whether it is zero,
/// so a following `BEQ` branches on "condition false".
fn gen_condition_flags(
    program: &mut Program,
    target: &TargetInfo,
    condition: &crate::front::ast::Expr,
) -> Result<(), CompileError> {
    let value = gen_expression(program, target, condition)?;
    let reg = match value {
        ExprValue::Register(reg) => reg,
        ExprValue::Immediate(value) => program.gen_load_immediate(value),
    };
    program.gen_andb(reg, reg, reg, CG_DIRECT_ALL);
    Ok(())
}

fn generate_statement(
    program: &mut Program,
    target: &TargetInfo,
    statement: &Statement,
) -> Result<(), CompileError> {
    program.set_source_line(statement.line);

    match &statement.kind {
        StatementKind::Block(body) => {
            for statement in body {
                generate_statement(program, target, statement)?;
            }
            Ok(())
        }

        StatementKind::Assign { target: lvalue, value } => {
            let value = gen_expression(program, target, value)?;
            match lvalue {
                Lvalue::Scalar(name) => {
                    let location = get_symbol_location(program, name, false)?;
                    match value {
                        ExprValue::Immediate(value) => {
                            program.gen_move_immediate(location, value);
                        }
                        ExprValue::Register(reg) => {
                            program.gen_add(location, reg, REG_0, CG_DIRECT_ALL);
                        }
                    }
                    Ok(())
                }
                Lvalue::Array(name, index) => {
                    let index = gen_expression(program, target, index)?;
                    array::store_array_element(program, target, name, index, value)
                }
            }
        }

        StatementKind::Read(lvalue) => match lvalue {
            Lvalue::Scalar(name) => {
                let location = get_symbol_location(program, name, false)?;
                program.gen_read(location);
                Ok(())
            }
            Lvalue::Array(name, index) => {
                let dest = program.new_register();
                program.gen_read(dest);
                let index = gen_expression(program, target, index)?;
                array::store_array_element(
                    program,
                    target,
                    name,
                    index,
                    ExprValue::Register(dest),
                )
            }
        },

        StatementKind::Write(expr) => {
            let value = gen_expression(program, target, expr)?;
            let reg = match value {
                ExprValue::Immediate(value) => program.gen_load_immediate(value),
                ExprValue::Register(reg) => reg,
            };
            program.gen_write(reg);
            Ok(())
        }

        StatementKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            gen_condition_flags(program, target, condition)?;
            let label_else = program.new_label();
            program.gen_beq(Address::Label(label_else));
            generate_statement(program, target, then_branch)?;

            match else_branch {
                Some(else_branch) => {
                    let label_end = program.new_label();
                    program.gen_bt(Address::Label(label_end));
                    program.assign_label(label_else)?;
                    generate_statement(program, target, else_branch)?;
                    program.assign_label(label_end)?;
                }
                None => {
                    program.assign_label(label_else)?;
                }
            }
            Ok(())
        }

        StatementKind::While { condition, body } => {
            let label_condition = program.assign_new_label()?;
            gen_condition_flags(program, target, condition)?;
            let label_end = program.new_label();
            program.gen_beq(Address::Label(label_end));
            generate_statement(program, target, body)?;
            program.gen_bt(Address::Label(label_condition));
            program.assign_label(label_end)?;
            Ok(())
        }

        StatementKind::DoWhile { body, condition } => {
            let label_start = program.assign_new_label()?;
            generate_statement(program, target, body)?;
            gen_condition_flags(program, target, condition)?;
            program.gen_bne(Address::Label(label_start));
            Ok(())
        }

        StatementKind::Return => {
            program.gen_ret();
            Ok(())
        }

        StatementKind::Empty => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse_source;
    use crate::ir::Opcode;

    const TARGET: TargetInfo = crate::target::amd64::TARGET_INFO;

    fn generate(source: &str) -> Program {
        let ast = parse_source(source).unwrap();
        generate_program(&ast, &TARGET).unwrap()
    }

    fn opcodes(program: &Program) -> Vec<Opcode> {
        program
            .instructions
            .iter()
            .map(|(_, i)| i.opcode)
            .collect()
    }

    #[test]
    fn test_program_ends_with_halt() {
        let program = generate("int x;\nx = 1;\n");
        assert_eq!(*opcodes(&program).last().unwrap(), Opcode::Halt);
    }

    #[test]
    fn test_constant_assignment_folds() {
        let program = generate("int x;\nx = 2 + 3;\nwrite(x);\n");
        let ops = opcodes(&program);
        // move immediate 5, write, halt; no arithmetic survives
        assert_eq!(ops, vec![Opcode::Addi, Opcode::Write, Opcode::Halt]);
        let first = program
            .instructions
            .iter()
            .map(|(_, i)| i.clone())
            .next()
            .unwrap();
        assert_eq!(first.immediate, 5);
    }

    #[test]
    fn test_while_loop_shape() {
        let program = generate("int i;\ni = 0;\nwhile (i < 10) { i = i + 1; }\nwrite(i);\n");
        let ops = opcodes(&program);
        assert!(ops.contains(&Opcode::Beq));
        assert!(ops.contains(&Opcode::Bt));
        // The loop back-edge target is the labeled condition start.
        let bt = program
            .instructions
            .iter()
            .map(|(_, i)| i.clone())
            .find(|i| i.opcode == Opcode::Bt)
            .unwrap();
        let Some(Address::Label(target)) = bt.address else {
            panic!("BT must target a label");
        };
        let labeled = program
            .instructions
            .iter()
            .any(|(_, i)| i.label.is_some_and(|l| program.labels.labels_equal(l, target)));
        assert!(labeled, "back-edge target must be attached");
    }

    #[test]
    fn test_if_without_else_attaches_label_after_branch() {
        let program = generate("int x;\nif (x) x = 1;\nwrite(x);\n");
        let ops = opcodes(&program);
        assert!(ops.contains(&Opcode::Beq));
        // The else label landed on the write's first instruction.
        let beq = program
            .instructions
            .iter()
            .map(|(_, i)| i.clone())
            .find(|i| i.opcode == Opcode::Beq)
            .unwrap();
        let Some(Address::Label(target)) = beq.address else {
            panic!();
        };
        assert!(
            program
                .instructions
                .iter()
                .any(|(_, i)| i.label.is_some_and(|l| program.labels.labels_equal(l, target)))
        );
    }

    #[test]
    fn test_do_while_branches_backwards() {
        let program = generate("int i;\ni = 0;\ndo { i = i + 1; } while (i < 3);\n");
        let ops = opcodes(&program);
        assert!(ops.contains(&Opcode::Bne));
        assert!(!ops.contains(&Opcode::Bt));
    }

    #[test]
    fn test_read_into_scalar_and_array() {
        let program = generate("int x, a[2];\nread(x);\nread(a[0]);\n");
        let ops = opcodes(&program);
        assert_eq!(ops.iter().filter(|op| **op == Opcode::Read).count(), 2);
        assert!(ops.contains(&Opcode::Mova));
    }

    #[test]
    fn test_undeclared_variable_is_an_error() {
        let ast = parse_source("write(y);\n").unwrap();
        assert_eq!(
            generate_program(&ast, &TARGET).unwrap_err(),
            CompileError::SymbolTableError("y".to_string())
        );
    }

    #[test]
    fn test_array_initializer_must_be_constant() {
        let ast = parse_source("int x; int a[x];\n").unwrap();
        assert_eq!(
            generate_program(&ast, &TARGET).unwrap_err(),
            CompileError::InvalidExpression
        );
    }
}
