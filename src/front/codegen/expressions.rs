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

//! Expression code generation with constant folding.
//!
//! Expression values are either immediates (folded at compile time) or
//! virtual registers. Folding substitutes defined values for the undefined
//! C corner cases: division by zero yields `i32::MAX` with a warning,
//! negative shift amounts warn and pass through, over-wide shifts clamp.

use crate::errors::{CompileError, Warning};
use crate::front::ast::{BinaryOp, Expr, UnaryOp};
use crate::front::codegen::{array, get_symbol_location};
use crate::ir::{CG_DIRECT_ALL, Program, RegId};
use crate::target::TargetInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprValue {
    Immediate(i32),
    Register(RegId),
}

impl ExprValue {
    /// The register holding this value, materializing immediates.
    fn into_register(self, program: &mut Program) -> RegId {
        match self {
            ExprValue::Register(reg) => reg,
            ExprValue::Immediate(value) => program.gen_load_immediate(value),
        }
    }
}

pub fn gen_expression(
    program: &mut Program,
    target: &TargetInfo,
    expr: &Expr,
) -> Result<ExprValue, CompileError> {
    match expr {
        Expr::Number(value) => Ok(ExprValue::Immediate(*value)),
        Expr::Variable(name) => {
            let location = get_symbol_location(program, name, true)?;
            Ok(ExprValue::Register(location))
        }
        Expr::ArrayElement(name, index) => {
            let index = gen_expression(program, target, index)?;
            let element = array::load_array_element(program, target, name, index)?;
            Ok(ExprValue::Register(element))
        }
        Expr::Unary(op, operand) => {
            let operand = gen_expression(program, target, operand)?;
            gen_unary_op(program, *op, operand)
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = gen_expression(program, target, lhs)?;
            let rhs = gen_expression(program, target, rhs)?;
            match op {
                BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Le
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::Ne => handle_binary_comparison(program, lhs, rhs, *op),
                _ => handle_bin_numeric_op(program, lhs, rhs, *op),
            }
        }
    }
}

fn gen_unary_op(
    program: &mut Program,
    op: UnaryOp,
    operand: ExprValue,
) -> Result<ExprValue, CompileError> {
    match op {
        // Unary minus is subtraction from zero.
        UnaryOp::Neg => handle_bin_numeric_op(
            program,
            ExprValue::Immediate(0),
            operand,
            BinaryOp::Sub,
        ),
        UnaryOp::LogicalNot => match operand {
            ExprValue::Immediate(value) => Ok(ExprValue::Immediate((value == 0) as i32)),
            ExprValue::Register(reg) => {
                let dest = program.new_register();
                program.gen_notl(dest, reg);
                Ok(ExprValue::Register(dest))
            }
        },
        UnaryOp::BitwiseNot => match operand {
            ExprValue::Immediate(value) => Ok(ExprValue::Immediate(!value)),
            ExprValue::Register(reg) => {
                let dest = program.new_register();
                program.gen_notb(dest, reg);
                Ok(ExprValue::Register(dest))
            }
        },
    }
}

pub fn handle_bin_numeric_op(
    program: &mut Program,
    exp1: ExprValue,
    exp2: ExprValue,
    op: BinaryOp,
) -> Result<ExprValue, CompileError> {
    if let (ExprValue::Immediate(val1), ExprValue::Immediate(val2)) = (exp1, exp2) {
        return fold_numeric_op(program, val1, val2, op);
    }

    let output = program.new_register();

    if let ExprValue::Immediate(val2) = exp2 {
        let reg1 = exp1.into_register(program);
        match op {
            BinaryOp::Add => program.gen_addi(output, reg1, val2),
            BinaryOp::Sub => program.gen_subi(output, reg1, val2),
            BinaryOp::Mul => program.gen_muli(output, reg1, val2),
            BinaryOp::Div => {
                if val2 == 0 {
                    program.add_warning(Warning::DivisionByZero);
                }
                program.gen_divi(output, reg1, val2)
            }
            BinaryOp::Shl => {
                if val2 < 0 {
                    program.add_warning(Warning::InvalidShiftAmount);
                }
                program.gen_shli(output, reg1, val2)
            }
            BinaryOp::Shr => {
                if val2 < 0 {
                    program.add_warning(Warning::InvalidShiftAmount);
                }
                program.gen_shri(output, reg1, val2)
            }
            BinaryOp::BitAnd => program.gen_andbi(output, reg1, val2),
            BinaryOp::BitOr => program.gen_orbi(output, reg1, val2),
            BinaryOp::BitXor => program.gen_eorbi(output, reg1, val2),
            BinaryOp::LogAnd => program.gen_andli(output, reg1, val2),
            BinaryOp::LogOr => program.gen_orli(output, reg1, val2),
            BinaryOp::LogXor => program.gen_eorli(output, reg1, val2),
            _ => return Err(CompileError::InvalidExpression),
        };
        return Ok(ExprValue::Register(output));
    }

    let reg1 = exp1.into_register(program);
    let reg2 = exp2.into_register(program);
    match op {
        BinaryOp::Add => program.gen_add(output, reg1, reg2, CG_DIRECT_ALL),
        BinaryOp::Sub => program.gen_sub(output, reg1, reg2, CG_DIRECT_ALL),
        BinaryOp::Mul => program.gen_mul(output, reg1, reg2, CG_DIRECT_ALL),
        BinaryOp::Div => program.gen_div(output, reg1, reg2, CG_DIRECT_ALL),
        BinaryOp::Shl => program.gen_shl(output, reg1, reg2, CG_DIRECT_ALL),
        BinaryOp::Shr => program.gen_shr(output, reg1, reg2, CG_DIRECT_ALL),
        BinaryOp::BitAnd => program.gen_andb(output, reg1, reg2, CG_DIRECT_ALL),
        BinaryOp::BitOr => program.gen_orb(output, reg1, reg2, CG_DIRECT_ALL),
        BinaryOp::BitXor => program.gen_eorb(output, reg1, reg2, CG_DIRECT_ALL),
        BinaryOp::LogAnd => program.gen_andl(output, reg1, reg2, CG_DIRECT_ALL),
        BinaryOp::LogOr => program.gen_orl(output, reg1, reg2, CG_DIRECT_ALL),
        BinaryOp::LogXor => program.gen_eorl(output, reg1, reg2, CG_DIRECT_ALL),
        _ => return Err(CompileError::InvalidExpression),
    };
    Ok(ExprValue::Register(output))
}

fn fold_numeric_op(
    program: &mut Program,
    val1: i32,
    val2: i32,
    op: BinaryOp,
) -> Result<ExprValue, CompileError> {
    let folded = match op {
        BinaryOp::Add => val1.wrapping_add(val2),
        BinaryOp::Sub => val1.wrapping_sub(val2),
        BinaryOp::Mul => val1.wrapping_mul(val2),
        BinaryOp::Div => {
            if val2 == 0 {
                program.add_warning(Warning::DivisionByZero);
                i32::MAX
            } else {
                val1.wrapping_div(val2)
            }
        }
        BinaryOp::Shl => {
            if val2 < 0 {
                program.add_warning(Warning::InvalidShiftAmount);
                val2
            } else if val2 >= 32 {
                0
            } else {
                val1.wrapping_shl(val2 as u32)
            }
        }
        BinaryOp::Shr => {
            if val2 < 0 {
                program.add_warning(Warning::InvalidShiftAmount);
                val2
            } else {
                // arithmetic shift; amounts past the width saturate to 31
                val1 >> val2.min(31)
            }
        }
        BinaryOp::BitAnd => val1 & val2,
        BinaryOp::BitOr => val1 | val2,
        BinaryOp::BitXor => val1 ^ val2,
        BinaryOp::LogAnd => ((val1 != 0) && (val2 != 0)) as i32,
        BinaryOp::LogOr => ((val1 != 0) || (val2 != 0)) as i32,
        BinaryOp::LogXor => ((val1 != 0) != (val2 != 0)) as i32,
        BinaryOp::Lt => (val1 < val2) as i32,
        BinaryOp::Gt => (val1 > val2) as i32,
        BinaryOp::Le => (val1 <= val2) as i32,
        BinaryOp::Ge => (val1 >= val2) as i32,
        BinaryOp::Eq => (val1 == val2) as i32,
        BinaryOp::Ne => (val1 != val2) as i32,
    };
    Ok(ExprValue::Immediate(folded))
}

pub fn handle_binary_comparison(
    program: &mut Program,
    exp1: ExprValue,
    exp2: ExprValue,
    op: BinaryOp,
) -> Result<ExprValue, CompileError> {
    if let (ExprValue::Immediate(val1), ExprValue::Immediate(val2)) = (exp1, exp2) {
        return fold_numeric_op(program, val1, val2, op);
    }

    // The subtraction sets the flags the set-on-condition reads; its result
    // register is immediately overwritten with the 0/1 outcome. A literal
    // operand uses the immediate form directly; when the literal is on the
    // left the subtraction is swapped and negated back.
    let output = program.new_register();
    match (exp1, exp2) {
        (ExprValue::Register(reg1), ExprValue::Immediate(val2)) => {
            program.gen_subi(output, reg1, val2);
        }
        (ExprValue::Immediate(val1), ExprValue::Register(reg2)) => {
            program.gen_subi(output, reg2, val1);
            program.gen_neg(output, output, CG_DIRECT_ALL);
        }
        (ExprValue::Register(reg1), ExprValue::Register(reg2)) => {
            program.gen_sub(output, reg1, reg2, CG_DIRECT_ALL);
        }
        (ExprValue::Immediate(_), ExprValue::Immediate(_)) => {
            return Err(CompileError::InvalidExpression);
        }
    }
    match op {
        BinaryOp::Lt => program.gen_slt(output),
        BinaryOp::Gt => program.gen_sgt(output),
        BinaryOp::Le => program.gen_sle(output),
        BinaryOp::Ge => program.gen_sge(output),
        BinaryOp::Eq => program.gen_seq(output),
        BinaryOp::Ne => program.gen_sne(output),
        _ => return Err(CompileError::InvalidExpression),
    };
    Ok(ExprValue::Register(output))
}

/// Evaluate an expression that must be compile-time constant (array sizes
/// and declaration initializers).
pub fn fold_constant(program: &mut Program, expr: &Expr) -> Result<i32, CompileError> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Unary(op, operand) => {
            let value = fold_constant(program, operand)?;
            match op {
                UnaryOp::Neg => Ok(value.wrapping_neg()),
                UnaryOp::LogicalNot => Ok((value == 0) as i32),
                UnaryOp::BitwiseNot => Ok(!value),
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let val1 = fold_constant(program, lhs)?;
            let val2 = fold_constant(program, rhs)?;
            match fold_numeric_op(program, val1, val2, *op)? {
                ExprValue::Immediate(value) => Ok(value),
                ExprValue::Register(_) => Err(CompileError::InvalidExpression),
            }
        }
        Expr::Variable(_) | Expr::ArrayElement(_, _) => Err(CompileError::InvalidExpression),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Opcode;

    const TARGET: TargetInfo = crate::target::amd64::TARGET_INFO;

    fn expr_of(source_expr: &str) -> Expr {
        let source = format!("int x;\nx = {};\n", source_expr);
        let program = crate::front::parse_source(&source).unwrap();
        match &program.statements[0].kind {
            crate::front::ast::StatementKind::Assign { value, .. } => value.clone(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_constant_folding() {
        let mut program = Program::new();
        let value = gen_expression(&mut program, &TARGET, &expr_of("2 + 3 * 4")).unwrap();
        assert_eq!(value, ExprValue::Immediate(14));
        assert!(program.instructions.is_empty());
    }

    #[test]
    fn test_division_by_zero_folds_to_int_max() {
        let mut program = Program::new();
        let value = gen_expression(&mut program, &TARGET, &expr_of("5 / 0")).unwrap();
        assert_eq!(value, ExprValue::Immediate(i32::MAX));
        assert_eq!(program.warnings, vec![Warning::DivisionByZero]);
    }

    #[test]
    fn test_negative_shift_amount_warns() {
        let mut program = Program::new();
        gen_expression(&mut program, &TARGET, &expr_of("1 << (0 - 2)")).unwrap();
        assert_eq!(program.warnings, vec![Warning::InvalidShiftAmount]);
    }

    #[test]
    fn test_wide_shifts_are_defined() {
        let mut program = Program::new();
        assert_eq!(
            gen_expression(&mut program, &TARGET, &expr_of("1 << 40")).unwrap(),
            ExprValue::Immediate(0)
        );
        assert_eq!(
            gen_expression(&mut program, &TARGET, &expr_of("(0 - 8) >> 40")).unwrap(),
            ExprValue::Immediate(-1)
        );
    }

    #[test]
    fn test_logical_fold_normalizes() {
        let mut program = Program::new();
        assert_eq!(
            gen_expression(&mut program, &TARGET, &expr_of("7 && 3")).unwrap(),
            ExprValue::Immediate(1)
        );
        assert_eq!(
            gen_expression(&mut program, &TARGET, &expr_of("0 || 9")).unwrap(),
            ExprValue::Immediate(1)
        );
        assert_eq!(
            gen_expression(&mut program, &TARGET, &expr_of("7 ^^ 3")).unwrap(),
            ExprValue::Immediate(0)
        );
        assert_eq!(
            gen_expression(&mut program, &TARGET, &expr_of("7 ^^ 0")).unwrap(),
            ExprValue::Immediate(1)
        );
    }

    #[test]
    fn test_logical_xor_generates_eorl() {
        let mut program = Program::new();
        program
            .create_variable("x", crate::ir::VarType::Integer, false, 0, 0)
            .unwrap();
        program
            .create_variable("y", crate::ir::VarType::Integer, false, 0, 0)
            .unwrap();
        gen_expression(&mut program, &TARGET, &expr_of("x ^^ 1")).unwrap();
        gen_expression(&mut program, &TARGET, &expr_of("x ^^ y")).unwrap();
        let ops: Vec<Opcode> = program
            .instructions
            .iter()
            .map(|(_, i)| i.opcode)
            .collect();
        assert_eq!(
            ops,
            vec![Opcode::Load, Opcode::Eorli, Opcode::Load, Opcode::Eorl]
        );
    }

    #[test]
    fn test_immediate_on_the_right_uses_immediate_opcode() {
        let mut program = Program::new();
        program
            .create_variable("x", crate::ir::VarType::Integer, false, 0, 0)
            .unwrap();
        gen_expression(&mut program, &TARGET, &expr_of("x + 1")).unwrap();
        let ops: Vec<Opcode> = program
            .instructions
            .iter()
            .map(|(_, i)| i.opcode)
            .collect();
        // load of x, then ADDI
        assert_eq!(ops, vec![Opcode::Load, Opcode::Addi]);
    }

    #[test]
    fn test_comparison_with_literal_uses_subi() {
        let mut program = Program::new();
        program
            .create_variable("x", crate::ir::VarType::Integer, false, 0, 0)
            .unwrap();
        let value = gen_expression(&mut program, &TARGET, &expr_of("x < 10")).unwrap();
        let ops: Vec<Opcode> = program
            .instructions
            .iter()
            .map(|(_, i)| i.opcode)
            .collect();
        assert_eq!(ops, vec![Opcode::Load, Opcode::Subi, Opcode::Slt]);
        assert!(matches!(value, ExprValue::Register(_)));
        let subi = program
            .instructions
            .iter()
            .map(|(_, i)| i.clone())
            .find(|i| i.opcode == Opcode::Subi)
            .unwrap();
        assert_eq!(subi.immediate, 10);
    }

    #[test]
    fn test_comparison_with_literal_on_the_left_negates() {
        let mut program = Program::new();
        program
            .create_variable("x", crate::ir::VarType::Integer, false, 0, 0)
            .unwrap();
        gen_expression(&mut program, &TARGET, &expr_of("10 > x")).unwrap();
        let ops: Vec<Opcode> = program
            .instructions
            .iter()
            .map(|(_, i)| i.opcode)
            .collect();
        // x - 10 is computed, negated back into 10 - x, then tested.
        assert_eq!(
            ops,
            vec![Opcode::Load, Opcode::Subi, Opcode::Neg, Opcode::Sgt]
        );
    }

    #[test]
    fn test_comparison_of_two_registers_subtracts() {
        let mut program = Program::new();
        program
            .create_variable("x", crate::ir::VarType::Integer, false, 0, 0)
            .unwrap();
        program
            .create_variable("y", crate::ir::VarType::Integer, false, 0, 0)
            .unwrap();
        gen_expression(&mut program, &TARGET, &expr_of("x == y")).unwrap();
        let ops: Vec<Opcode> = program
            .instructions
            .iter()
            .map(|(_, i)| i.opcode)
            .collect();
        assert_eq!(
            ops,
            vec![Opcode::Load, Opcode::Load, Opcode::Sub, Opcode::Seq]
        );
    }
}
