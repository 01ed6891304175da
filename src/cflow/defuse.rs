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

//! Per-opcode def/use extraction and local type inference.

use crate::cflow::{CfgNode, CfgVarId, Graph, MAX_DEFS, MAX_USES, VAR_PSW};
use crate::errors::CompileError;
use crate::ir::{Instruction, Opcode, Program, VarType};

/// Register operand slots of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandSlot {
    Rd,
    Rs1,
    Rs2,
}

/// Which operand slots an instruction defines and which it uses, positioned
/// like the dataflow arrays (`uses[2]` is the indirect-destination slot).
/// The PSW is not part of this view.
pub fn operand_roles(
    instr: &Instruction,
) -> ([Option<OperandSlot>; MAX_DEFS], [Option<OperandSlot>; MAX_USES]) {
    let mut defs = [None; MAX_DEFS];
    let mut uses = [None; MAX_USES];
    let opcode = instr.opcode;

    match opcode {
        Opcode::Load | Opcode::Read | Opcode::Mova => defs[0] = Some(OperandSlot::Rd),
        Opcode::Store | Opcode::Write => uses[0] = Some(OperandSlot::Rd),
        Opcode::Seq | Opcode::Sne | Opcode::Slt | Opcode::Sle | Opcode::Sgt | Opcode::Sge => {
            defs[0] = Some(OperandSlot::Rd)
        }
        Opcode::Halt | Opcode::Ret | Opcode::Jsr | Opcode::Nop => {}
        Opcode::Notl | Opcode::Notb => {
            defs[0] = Some(OperandSlot::Rd);
            uses[0] = Some(OperandSlot::Rs1);
        }
        _ if opcode.is_immediate_form() => {
            defs[0] = Some(OperandSlot::Rd);
            uses[0] = Some(OperandSlot::Rs1);
        }
        _ if !opcode.is_jump() => {
            // Three-operand form. An indirect destination is a store through
            // the register, which reads it instead of defining it.
            if instr.rd.as_ref().is_some_and(|reg| reg.indirect) {
                uses[2] = Some(OperandSlot::Rd);
            } else {
                defs[0] = Some(OperandSlot::Rd);
            }
            uses[0] = Some(OperandSlot::Rs1);
            uses[1] = Some(OperandSlot::Rs2);
        }
        _ => {}
    }

    (defs, uses)
}

/// Fill `node.defs`/`node.uses` for one instruction, the PSW pseudo
/// variable included, and run type inference for the defined register,
/// writing the result back into the instruction operands.
pub fn set_def_uses(
    graph: &mut Graph,
    program: &mut Program,
    node: &mut CfgNode,
) -> Result<(), CompileError> {
    let instr = program
        .instructions
        .get(node.instr)
        .ok_or(CompileError::CfgInvalidNode)?;
    let opcode = instr.opcode;

    let psw = graph.alloc_variable(VAR_PSW, &[], VarType::Inferred)?;
    let dest = match &instr.rd {
        Some(reg) => Some((
            graph.alloc_variable(reg.id, &reg.mc_whitelist, reg.ty)?,
            reg.indirect,
        )),
        None => None,
    };
    let src1 = match &instr.rs1 {
        Some(reg) => Some((
            graph.alloc_variable(reg.id, &reg.mc_whitelist, reg.ty)?,
            reg.indirect,
        )),
        None => None,
    };
    let src2 = match &instr.rs2 {
        Some(reg) => Some((
            graph.alloc_variable(reg.id, &reg.mc_whitelist, reg.ty)?,
            reg.indirect,
        )),
        None => None,
    };

    let var = |slot: Option<OperandSlot>| match slot? {
        OperandSlot::Rd => dest.map(|(id, _)| id),
        OperandSlot::Rs1 => src1.map(|(id, _)| id),
        OperandSlot::Rs2 => src2.map(|(id, _)| id),
    };

    let instr = program.instructions.get(node.instr).unwrap();
    let (def_slots, use_slots) = operand_roles(instr);
    for (index, slot) in def_slots.into_iter().enumerate() {
        node.defs[index] = var(slot);
    }
    for (index, slot) in use_slots.into_iter().enumerate() {
        node.uses[index] = var(slot);
    }

    if opcode.defines_psw() {
        node.defs[1] = Some(psw);
    }
    if opcode.uses_psw() {
        node.uses[0] = Some(psw);
    }

    // Local type inference for the defined register: the destination takes
    // the widest source type, with the pointer flag stripped from sources
    // that are dereferenced by this instruction.
    if let Some((dest_id, _)) = dest {
        if graph.var(dest_id).ty == VarType::Inferred {
            let source_ty = |slot: Option<(CfgVarId, bool)>| match slot {
                Some((id, indirect)) => {
                    let ty = graph.var(id).ty;
                    if indirect { ty.strip_pointer() } else { ty }
                }
                None => VarType::Inferred,
            };
            let inferred = source_ty(src1).max(source_ty(src2));
            graph.variables[dest_id.0].ty = inferred;
        }
    }

    // Propagate variable types back onto the instruction operands.
    let instr = program.instructions.get_mut(node.instr).unwrap();
    if let (Some(reg), Some((id, _))) = (&mut instr.rd, dest) {
        reg.ty = graph.variables[id.0].ty;
    }
    if let (Some(reg), Some((id, _))) = (&mut instr.rs1, src1) {
        reg.ty = graph.variables[id.0].ty;
    }
    if let (Some(reg), Some((id, _))) = (&mut instr.rs2, src2) {
        reg.ty = graph.variables[id.0].ty;
    }

    Ok(())
}
