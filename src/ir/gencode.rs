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

//! Instruction builders. Each `gen_*` method constructs one instruction,
//! attaches the pending label if any, appends it at the current insertion
//! point and returns its node id.

use crate::ir::instruction::{Address, Instruction, REG_0, RegId, RegisterOp, VarType};
use crate::ir::list::NodeId;
use crate::ir::opcode::Opcode;
use crate::ir::program::Program;

/// Indirection flags for the destination and second-source operands of
/// ternary instructions. The first source can never be indirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CgFlags {
    pub dest_indirect: bool,
    pub src2_indirect: bool,
}

pub const CG_DIRECT_ALL: CgFlags = CgFlags {
    dest_indirect: false,
    src2_indirect: false,
};

pub const CG_INDIRECT_DEST: CgFlags = CgFlags {
    dest_indirect: true,
    src2_indirect: false,
};

pub const CG_INDIRECT_SOURCE: CgFlags = CgFlags {
    dest_indirect: false,
    src2_indirect: true,
};

impl Program {
    /// Fill in the type of a register caching a source variable, so the type
    /// inference has a starting point.
    fn set_type_of_variable_register(&self, reg: &mut RegisterOp) {
        if reg.id == REG_0 || reg.ty != VarType::Inferred {
            return;
        }
        let Some(id) = self.sy_table.id_from_location(reg.id) else {
            return;
        };
        let Some(ty) = self.sy_table.type_of(id) else {
            return;
        };
        reg.ty = if reg.indirect { ty.with_pointer() } else { ty };
    }

    fn gen_ternary(
        &mut self,
        opcode: Opcode,
        r_dest: RegId,
        r_source1: RegId,
        r_source2: RegId,
        flags: CgFlags,
        ty: VarType,
    ) -> NodeId {
        let dest_ty = if flags.dest_indirect {
            ty.with_pointer()
        } else {
            ty
        };
        let src2_ty = if flags.src2_indirect {
            ty.with_pointer()
        } else {
            ty
        };

        let mut dest = RegisterOp::new(r_dest, dest_ty, flags.dest_indirect);
        let mut src1 = RegisterOp::new(r_source1, ty, false);
        let mut src2 = RegisterOp::new(r_source2, src2_ty, flags.src2_indirect);
        self.set_type_of_variable_register(&mut dest);
        self.set_type_of_variable_register(&mut src1);
        self.set_type_of_variable_register(&mut src2);
        if ty == VarType::Inferred && r_source1 == REG_0 && r_source2 == REG_0 {
            dest.ty = VarType::Integer;
        }

        let mut instr = Instruction::new(opcode);
        instr.rd = Some(dest);
        instr.rs1 = Some(src1);
        instr.rs2 = Some(src2);
        self.add_instruction(instr)
    }

    fn gen_binary(
        &mut self,
        opcode: Opcode,
        r_dest: RegId,
        r_source1: RegId,
        immediate: i32,
    ) -> NodeId {
        let mut dest = RegisterOp::direct(r_dest);
        let mut src1 = RegisterOp::direct(r_source1);
        self.set_type_of_variable_register(&mut dest);
        self.set_type_of_variable_register(&mut src1);
        if r_source1 == REG_0 {
            dest.ty = VarType::Integer;
        }

        let mut instr = Instruction::new(opcode);
        instr.rd = Some(dest);
        instr.rs1 = Some(src1);
        instr.immediate = immediate;
        self.add_instruction(instr)
    }

    fn gen_unary(&mut self, opcode: Opcode, r_dest: RegId, address: Option<Address>) -> NodeId {
        let mut instr = Instruction::new(opcode);
        let ty = match opcode {
            // I/O and loads produce integers; MOVA produces an address.
            Opcode::Read | Opcode::Load => VarType::Integer,
            Opcode::Mova => VarType::IntegerPtr,
            _ => VarType::Inferred,
        };
        let mut dest = RegisterOp::new(r_dest, ty, false);
        self.set_type_of_variable_register(&mut dest);
        instr.rd = Some(dest);
        instr.address = address;
        self.add_instruction(instr)
    }

    fn gen_jump(&mut self, opcode: Opcode, target: Address) -> NodeId {
        let mut instr = Instruction::new(opcode);
        instr.address = Some(target);
        self.add_instruction(instr)
    }

    // ---- control ----

    pub fn gen_nop(&mut self) -> NodeId {
        self.add_instruction(Instruction::new(Opcode::Nop))
    }

    pub fn gen_halt(&mut self) -> NodeId {
        self.add_instruction(Instruction::new(Opcode::Halt))
    }

    pub fn gen_ret(&mut self) -> NodeId {
        self.add_instruction(Instruction::new(Opcode::Ret))
    }

    pub fn gen_jsr(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Jsr, target)
    }

    // ---- memory and I/O ----

    pub fn gen_load(&mut self, r_dest: RegId, target: Address) -> NodeId {
        self.gen_unary(Opcode::Load, r_dest, Some(target))
    }

    pub fn gen_store(&mut self, r_source: RegId, target: Address) -> NodeId {
        self.gen_unary(Opcode::Store, r_source, Some(target))
    }

    pub fn gen_mova(&mut self, r_dest: RegId, target: Address) -> NodeId {
        self.gen_unary(Opcode::Mova, r_dest, Some(target))
    }

    pub fn gen_read(&mut self, r_dest: RegId) -> NodeId {
        self.gen_unary(Opcode::Read, r_dest, None)
    }

    pub fn gen_write(&mut self, r_source: RegId) -> NodeId {
        self.gen_unary(Opcode::Write, r_source, None)
    }

    // ---- set on condition ----

    pub fn gen_seq(&mut self, r_dest: RegId) -> NodeId {
        self.gen_unary(Opcode::Seq, r_dest, None)
    }

    pub fn gen_sne(&mut self, r_dest: RegId) -> NodeId {
        self.gen_unary(Opcode::Sne, r_dest, None)
    }

    pub fn gen_slt(&mut self, r_dest: RegId) -> NodeId {
        self.gen_unary(Opcode::Slt, r_dest, None)
    }

    pub fn gen_sle(&mut self, r_dest: RegId) -> NodeId {
        self.gen_unary(Opcode::Sle, r_dest, None)
    }

    pub fn gen_sgt(&mut self, r_dest: RegId) -> NodeId {
        self.gen_unary(Opcode::Sgt, r_dest, None)
    }

    pub fn gen_sge(&mut self, r_dest: RegId) -> NodeId {
        self.gen_unary(Opcode::Sge, r_dest, None)
    }

    // ---- ternary arithmetic and logic ----

    pub fn gen_add(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Add, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_sub(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Sub, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_mul(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Mul, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_div(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Div, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_andl(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Andl, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_orl(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Orl, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_eorl(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Eorl, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_andb(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Andb, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_orb(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Orb, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_eorb(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Eorb, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_shl(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Shl, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_shr(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Shr, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_rotl(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Rotl, rd, rs1, rs2, flags, VarType::Inferred)
    }

    pub fn gen_rotr(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Rotr, rd, rs1, rs2, flags, VarType::Inferred)
    }

    /// `rd = -rs2`; the first source is the zero register.
    pub fn gen_neg(&mut self, rd: RegId, r_source: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Neg, rd, REG_0, r_source, flags, VarType::Inferred)
    }

    pub fn gen_spcl(&mut self, rd: RegId, rs1: RegId, rs2: RegId, flags: CgFlags) -> NodeId {
        self.gen_ternary(Opcode::Spcl, rd, rs1, rs2, flags, VarType::Inferred)
    }

    // ---- immediate forms ----

    pub fn gen_addi(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Addi, rd, rs1, immediate)
    }

    pub fn gen_subi(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Subi, rd, rs1, immediate)
    }

    pub fn gen_muli(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Muli, rd, rs1, immediate)
    }

    pub fn gen_divi(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Divi, rd, rs1, immediate)
    }

    pub fn gen_andli(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Andli, rd, rs1, immediate)
    }

    pub fn gen_orli(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Orli, rd, rs1, immediate)
    }

    pub fn gen_eorli(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Eorli, rd, rs1, immediate)
    }

    pub fn gen_andbi(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Andbi, rd, rs1, immediate)
    }

    pub fn gen_orbi(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Orbi, rd, rs1, immediate)
    }

    pub fn gen_eorbi(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Eorbi, rd, rs1, immediate)
    }

    pub fn gen_shli(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Shli, rd, rs1, immediate)
    }

    pub fn gen_shri(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Shri, rd, rs1, immediate)
    }

    pub fn gen_rotli(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Rotli, rd, rs1, immediate)
    }

    pub fn gen_rotri(&mut self, rd: RegId, rs1: RegId, immediate: i32) -> NodeId {
        self.gen_binary(Opcode::Rotri, rd, rs1, immediate)
    }

    // ---- binary register forms ----

    pub fn gen_notl(&mut self, rd: RegId, rs1: RegId) -> NodeId {
        self.gen_binary(Opcode::Notl, rd, rs1, 0)
    }

    pub fn gen_notb(&mut self, rd: RegId, rs1: RegId) -> NodeId {
        self.gen_binary(Opcode::Notb, rd, rs1, 0)
    }

    // ---- branches ----

    pub fn gen_bt(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bt, target)
    }

    pub fn gen_bf(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bf, target)
    }

    pub fn gen_bhi(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bhi, target)
    }

    pub fn gen_bls(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bls, target)
    }

    pub fn gen_bcc(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bcc, target)
    }

    pub fn gen_bcs(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bcs, target)
    }

    pub fn gen_bne(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bne, target)
    }

    pub fn gen_beq(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Beq, target)
    }

    pub fn gen_bvc(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bvc, target)
    }

    pub fn gen_bvs(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bvs, target)
    }

    pub fn gen_bpl(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bpl, target)
    }

    pub fn gen_bmi(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bmi, target)
    }

    pub fn gen_bge(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bge, target)
    }

    pub fn gen_blt(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Blt, target)
    }

    pub fn gen_bgt(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Bgt, target)
    }

    pub fn gen_ble(&mut self, target: Address) -> NodeId {
        self.gen_jump(Opcode::Ble, target)
    }

    // ---- helpers ----

    /// Load an immediate into a fresh register and return the register.
    pub fn gen_load_immediate(&mut self, immediate: i32) -> RegId {
        let dest = self.new_register();
        self.gen_addi(dest, REG_0, immediate);
        dest
    }

    /// Move an immediate into an existing register.
    pub fn gen_move_immediate(&mut self, dest: RegId, immediate: i32) -> NodeId {
        self.gen_addi(dest, REG_0, immediate)
    }
}
