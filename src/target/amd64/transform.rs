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

//! Lowering of the IR to what x86-64 can encode, in five passes:
//!
//! 1. logical operations become bitwise operations over values normalized
//!    to {0,1},
//! 2. flag consumers whose reaching definition is a `mov` or a `setcc`
//!    (which do not set flags on x86) get the flags materialized,
//! 3. the runtime I/O opcodes get C-ABI clobber markers and argument/return
//!    register constraints,
//! 4. three-address instructions are reduced to two-address form,
//! 5. shifts, divisions and their implicit register operands get their
//!    allocation constraints.

use crate::cflow::liveness::perform_liveness_analysis;
use crate::cflow::reaching::reaching_definitions_of_node;
use crate::cflow::Graph;
use crate::errors::CompileError;
use crate::ir::{
    CG_DIRECT_ALL, CG_INDIRECT_SOURCE, CgFlags, NodeId, Opcode, Program, REG_0, RegisterOp,
    VarType,
};
use crate::target::amd64::{CALLER_SAVED, R_EAX, R_ECX, R_EDI, R_EDX};

pub fn do_target_specific_transformations(program: &mut Program) -> Result<(), CompileError> {
    rewrite_logical_operations(program);
    fix_flag_users(program)?;
    fix_read_write_calls(program);
    fix_instruction_operands(program);
    insert_register_allocation_constraints(program);
    Ok(())
}

/// Lower `ANDL`/`ORL`/`EORL`/`NOTL` and their immediate forms. The register
/// forms normalize their operands to {0,1} (bitwise self-and to set the
/// flags, then `SNE`); the immediate forms constant-simplify instead:
/// `x && 0` is 0, `x || n` with nonzero `n` is 1, `x ^^ 0` normalizes `x`
/// and `x ^^ n` negates the normalization.
fn rewrite_logical_operations(program: &mut Program) {
    for id in program.instructions.ids() {
        let instr = program.instructions.get(id).unwrap();
        let opcode = instr.opcode;

        match opcode {
            Opcode::Andl | Opcode::Eorl => {
                let rs1 = instr.rs1.as_ref().unwrap().id;
                let (rs2, rs2_indirect) = {
                    let reg = instr.rs2.as_ref().unwrap();
                    (reg.id, reg.indirect)
                };
                program.push_insertion_point(program.instructions.prev(id));
                let norm1 = program.new_register();
                let norm2 = program.new_register();
                let first = program.gen_andb(rs1, rs1, rs1, CG_DIRECT_ALL);
                program.move_label(first, id);
                program.gen_sne(norm1);
                if rs2_indirect {
                    let tmp = program.new_register();
                    program.gen_add(tmp, REG_0, rs2, CG_INDIRECT_SOURCE);
                } else {
                    program.gen_andb(rs2, rs2, rs2, CG_DIRECT_ALL);
                }
                program.gen_sne(norm2);
                program.pop_insertion_point();

                let instr = program.instructions.get_mut(id).unwrap();
                instr.opcode = if opcode == Opcode::Andl {
                    Opcode::Andb
                } else {
                    Opcode::Eorb
                };
                instr.rs1.as_mut().unwrap().id = norm1;
                let rs2 = instr.rs2.as_mut().unwrap();
                rs2.id = norm2;
                rs2.indirect = false;
            }

            Opcode::Orl => {
                // OR of the raw values, then normalize the result through
                // the flags it sets.
                let (dest_id, dest_indirect) = {
                    let reg = instr.rd.as_ref().unwrap();
                    (reg.id, reg.indirect)
                };
                let fresh = program.new_register();
                {
                    let instr = program.instructions.get_mut(id).unwrap();
                    instr.opcode = Opcode::Orb;
                    let rd = instr.rd.as_mut().unwrap();
                    rd.id = fresh;
                    rd.indirect = false;
                }
                program.push_insertion_point(Some(id));
                if dest_indirect {
                    let tmp = program.new_register();
                    program.gen_sne(tmp);
                    program.gen_add(
                        dest_id,
                        REG_0,
                        tmp,
                        CgFlags {
                            dest_indirect,
                            src2_indirect: false,
                        },
                    );
                } else {
                    program.gen_sne(dest_id);
                }
                program.pop_insertion_point();
            }

            Opcode::Andli => {
                let rd = instr.rd.as_ref().unwrap().id;
                let rs1 = instr.rs1.as_ref().unwrap().id;
                let immediate = instr.immediate;
                program.push_insertion_point(program.instructions.prev(id));
                let first = if immediate == 0 {
                    program.gen_eorb(rd, rd, rd, CG_DIRECT_ALL)
                } else {
                    let first = program.gen_andb(rs1, rs1, rs1, CG_DIRECT_ALL);
                    program.gen_sne(rd);
                    first
                };
                program.move_label(first, id);
                program.pop_insertion_point();
                program.remove_instruction(id);
            }

            Opcode::Orli => {
                let rd = instr.rd.as_ref().unwrap().id;
                let rs1 = instr.rs1.as_ref().unwrap().id;
                let immediate = instr.immediate;
                program.push_insertion_point(program.instructions.prev(id));
                let first = if immediate != 0 {
                    program.gen_addi(rd, REG_0, 1)
                } else {
                    let first = program.gen_andb(rs1, rs1, rs1, CG_DIRECT_ALL);
                    program.gen_sne(rd);
                    first
                };
                program.move_label(first, id);
                program.pop_insertion_point();
                program.remove_instruction(id);
            }

            Opcode::Eorli => {
                let rd = instr.rd.as_ref().unwrap().id;
                let rs1 = instr.rs1.as_ref().unwrap().id;
                let immediate = instr.immediate;
                program.push_insertion_point(program.instructions.prev(id));
                let first = program.gen_andb(rs1, rs1, rs1, CG_DIRECT_ALL);
                if immediate == 0 {
                    program.gen_sne(rd);
                } else {
                    program.gen_seq(rd);
                }
                program.move_label(first, id);
                program.pop_insertion_point();
                program.remove_instruction(id);
            }

            Opcode::Notl => {
                let rd = instr.rd.as_ref().unwrap().id;
                let rs1 = instr.rs1.as_ref().unwrap().id;
                program.push_insertion_point(program.instructions.prev(id));
                let first = program.gen_andb(rs1, rs1, rs1, CG_DIRECT_ALL);
                program.gen_seq(rd);
                program.move_label(first, id);
                program.pop_insertion_point();
                program.remove_instruction(id);
            }

            _ => {}
        }
    }
}

/// On x86-64 `mov` does not set the flags and `setcc` leaves them at the
/// compare that fed it. Find every flag consumer, walk to its reaching
/// definitions and materialize the flags after each definition that is a
/// move (but not `MOVA`) or a `setcc` other than `SNE` (whose zero-flag
/// semantics already match).
fn fix_flag_users(program: &mut Program) -> Result<(), CompileError> {
    let mut graph = Graph::build(program)?;
    perform_liveness_analysis(&mut graph);

    let mut patches: Vec<(NodeId, RegisterOp)> = Vec::new();
    for (block_index, block) in graph.blocks.iter().enumerate() {
        for (node_index, node) in block.nodes.iter().enumerate() {
            let uses_psw = node.uses[0].is_some_and(|use_var| graph.is_psw(use_var));
            if !uses_psw {
                continue;
            }

            for reach in reaching_definitions_of_node(&graph, block_index, node_index) {
                if !graph.is_psw(reach.var) {
                    continue;
                }
                let def_instr_id = graph.blocks[reach.block].nodes[reach.node].instr;
                let def_instr = program.instructions.get(def_instr_id).unwrap();

                let needs_patch = match def_instr.as_move() {
                    Some(_) => def_instr.opcode != Opcode::Mova,
                    None => def_instr.opcode.is_setcc() && def_instr.opcode != Opcode::Sne,
                };
                if !needs_patch {
                    continue;
                }
                let dest = def_instr.rd.as_ref().unwrap().clone();
                if !patches.iter().any(|(id, _)| *id == def_instr_id) {
                    patches.push((def_instr_id, dest));
                }
            }
        }
    }

    for (after, dest) in patches {
        program.push_insertion_point(Some(after));
        if dest.indirect {
            let tmp = program.new_register();
            program.gen_orb(tmp, REG_0, dest.id, CG_INDIRECT_SOURCE);
        } else {
            program.gen_andb(dest.id, dest.id, dest.id, CG_DIRECT_ALL);
        }
        program.pop_insertion_point();
    }
    Ok(())
}

/// `READ`/`WRITE` become C-ABI calls: dummy definitions mark every
/// caller-saved register as clobbered, the call result is pinned to the
/// return register and copied out, and the `WRITE` argument is pinned to the
/// first-argument register by a pre-call copy.
fn fix_read_write_calls(program: &mut Program) {
    for id in program.instructions.ids() {
        let opcode = program.instructions.get(id).unwrap().opcode;
        match opcode {
            Opcode::Read => {
                let mut first = None;
                program.push_insertion_point(program.instructions.prev(id));
                for &reg in &CALLER_SAVED[1..] {
                    let dummy = gen_clobber_marker(program, reg);
                    first.get_or_insert(dummy);
                }
                program.pop_insertion_point();
                if program.instructions.get(id).unwrap().label.is_some() {
                    program.move_label(first.unwrap(), id);
                }

                let result = program.new_register();
                let dest = {
                    let rd = program
                        .instructions
                        .get_mut(id)
                        .unwrap()
                        .rd
                        .as_mut()
                        .unwrap();
                    let dest = rd.id;
                    rd.id = result;
                    rd.mc_whitelist = vec![R_EAX];
                    dest
                };
                program.push_insertion_point(Some(id));
                program.gen_add(dest, result, REG_0, CG_DIRECT_ALL);
                program.pop_insertion_point();
            }

            Opcode::Write => {
                let mut first = None;
                program.push_insertion_point(program.instructions.prev(id));
                for &reg in &CALLER_SAVED {
                    let dummy = gen_clobber_marker(program, reg);
                    first.get_or_insert(dummy);
                }
                let argument = program.new_register();
                let source = {
                    let rd = program
                        .instructions
                        .get_mut(id)
                        .unwrap()
                        .rd
                        .as_mut()
                        .unwrap();
                    let source = rd.id;
                    rd.id = argument;
                    rd.mc_whitelist = vec![R_EDI];
                    source
                };
                program.gen_add(argument, source, REG_0, CG_DIRECT_ALL);
                program.pop_insertion_point();
                if program.instructions.get(id).unwrap().label.is_some() {
                    program.move_label(first.unwrap(), id);
                }
            }

            _ => {}
        }
    }
}

/// A dummy definition whitelisted to one machine register, telling the
/// allocator the register is overwritten at this point.
fn gen_clobber_marker(program: &mut Program, reg: crate::ir::McRegId) -> NodeId {
    let var = program.new_register();
    let id = program.gen_addi(var, REG_0, 0);
    let instr = program.instructions.get_mut(id).unwrap();
    instr.rd.as_mut().unwrap().mc_whitelist = vec![reg];
    instr.dummy = true;
    id
}

/// Reduce `rd = rs1 op rs2` to the two-address form `rd op= rs2` by copying
/// `rs1` into `rd` first. `MULI` keeps its three-operand immediate form and
/// plain moves need no fixing. When `rd` and `rs2` collide (same register,
/// or two memory operands), `rs2` is saved to a fresh temporary before the
/// copy clobbers it.
fn fix_instruction_operands(program: &mut Program) {
    for id in program.instructions.ids() {
        let instr = program.instructions.get(id).unwrap();
        if instr.as_move().is_some() || instr.opcode == Opcode::Muli {
            continue;
        }

        if instr.opcode == Opcode::Neg {
            // NEG takes its value from rs2 (its first source is the zero
            // register); the one-operand x86 form negates rd in place.
            let (Some(rd), Some(rs2)) = (&instr.rd, &instr.rs2) else {
                continue;
            };
            if rd.id == rs2.id && rd.indirect == rs2.indirect {
                continue;
            }
            let (rd_id, rd_indirect) = (rd.id, rd.indirect);
            let (rs2_id, rs2_indirect) = (rs2.id, rs2.indirect);
            program.push_insertion_point(program.instructions.prev(id));
            let copy = program.gen_add(
                rd_id,
                REG_0,
                rs2_id,
                CgFlags {
                    dest_indirect: rd_indirect,
                    src2_indirect: rs2_indirect,
                },
            );
            if program.instructions.get(id).unwrap().label.is_some() {
                program.move_label(copy, id);
            }
            program.pop_insertion_point();
            let rs2 = program.instructions.get_mut(id).unwrap().rs2.as_mut().unwrap();
            rs2.id = rd_id;
            rs2.indirect = rd_indirect;
            continue;
        }

        let (Some(rd), Some(rs1)) = (&instr.rd, &instr.rs1) else {
            continue;
        };
        if rd.id == rs1.id && rd.indirect == rs1.indirect {
            continue;
        }
        let (rd_id, rd_indirect) = (rd.id, rd.indirect);
        let rs1_id = rs1.id;

        if let Some(rs2) = &instr.rs2 {
            if rs2.id == rd_id || (rd_indirect && rs2.indirect) {
                let (rs2_id, rs2_indirect) = (rs2.id, rs2.indirect);
                program.push_insertion_point(program.instructions.prev(id));
                let saved = program.new_register();
                let copy = program.gen_add(
                    saved,
                    REG_0,
                    rs2_id,
                    CgFlags {
                        dest_indirect: false,
                        src2_indirect: rs2_indirect,
                    },
                );
                if program.instructions.get(id).unwrap().label.is_some() {
                    program.move_label(copy, id);
                }
                program.pop_insertion_point();
                let rs2 = program.instructions.get_mut(id).unwrap().rs2.as_mut().unwrap();
                rs2.id = saved;
                rs2.indirect = false;
            }
        }

        program.push_insertion_point(program.instructions.prev(id));
        let copy = program.gen_add(
            rd_id,
            REG_0,
            rs1_id,
            CgFlags {
                dest_indirect: rd_indirect,
                src2_indirect: false,
            },
        );
        if program.instructions.get(id).unwrap().label.is_some() {
            program.move_label(copy, id);
        }
        program.pop_insertion_point();

        let rs1 = program.instructions.get_mut(id).unwrap().rs1.as_mut().unwrap();
        rs1.id = rd_id;
        rs1.indirect = rd_indirect;
    }
}

/// Pin the implicit register operands of the remaining instructions:
/// shift amounts to ECX, divisions to EAX with the sign extension of the
/// dividend in EDX (`rtmp` copy, `SLT`, `NEG`), plus a dummy definition of
/// EDX after the division marking it clobbered.
fn insert_register_allocation_constraints(program: &mut Program) {
    for id in program.instructions.ids() {
        let opcode = program.instructions.get(id).unwrap().opcode;

        if matches!(
            opcode,
            Opcode::Shl | Opcode::Shr | Opcode::Rotl | Opcode::Rotr
        ) {
            let (amount_id, amount_indirect) = {
                let rs2 = program.instructions.get(id).unwrap().rs2.as_ref().unwrap();
                (rs2.id, rs2.indirect)
            };
            program.push_insertion_point(program.instructions.prev(id));
            let count = program.new_register();
            let copy = program.gen_add(
                count,
                REG_0,
                amount_id,
                CgFlags {
                    dest_indirect: false,
                    src2_indirect: amount_indirect,
                },
            );
            if program.instructions.get(id).unwrap().label.is_some() {
                program.move_label(copy, id);
            }
            program.pop_insertion_point();
            let rs2 = program.instructions.get_mut(id).unwrap().rs2.as_mut().unwrap();
            rs2.id = count;
            rs2.indirect = false;
            rs2.mc_whitelist = vec![R_ECX];
        }

        if program.instructions.get(id).unwrap().opcode == Opcode::Divi {
            // x86-64 has no division with an immediate operand.
            let immediate = program.instructions.get(id).unwrap().immediate;
            program.push_insertion_point(program.instructions.prev(id));
            let materialized = program.new_register();
            let load = program.gen_addi(materialized, REG_0, immediate);
            if program.instructions.get(id).unwrap().label.is_some() {
                program.move_label(load, id);
            }
            program.pop_insertion_point();
            let instr = program.instructions.get_mut(id).unwrap();
            instr.opcode = Opcode::Div;
            instr.immediate = 0;
            instr.rs2 = Some(RegisterOp::new(materialized, VarType::Integer, false));
        }

        if program.instructions.get(id).unwrap().opcode == Opcode::Div {
            let (dest_id, dest_indirect) = {
                let rd = program.instructions.get(id).unwrap().rd.as_ref().unwrap();
                (rd.id, rd.indirect)
            };
            let dividend = program.new_register();
            let sign = program.new_register();

            program.push_insertion_point(program.instructions.prev(id));
            let copy = program.gen_add(
                dividend,
                REG_0,
                dest_id,
                CgFlags {
                    dest_indirect: false,
                    src2_indirect: dest_indirect,
                },
            );
            if program.instructions.get(id).unwrap().label.is_some() {
                program.move_label(copy, id);
            }
            // Sign-extend the dividend into EDX: set the flags, take the
            // sign bit, negate it into all-ones or zero.
            program.gen_andb(dividend, dividend, dividend, CG_DIRECT_ALL);
            let slt = program.gen_slt(sign);
            program
                .instructions
                .get_mut(slt)
                .unwrap()
                .rd
                .as_mut()
                .unwrap()
                .mc_whitelist = vec![R_EDX];
            program.gen_neg(sign, sign, CG_DIRECT_ALL);
            program.pop_insertion_point();

            {
                let instr = program.instructions.get_mut(id).unwrap();
                let rd = instr.rd.as_mut().unwrap();
                rd.id = dividend;
                rd.indirect = false;
                rd.mc_whitelist = vec![R_EAX];
                let rs1 = instr.rs1.as_mut().unwrap();
                rs1.id = dividend;
                rs1.indirect = false;
            }

            program.push_insertion_point(Some(id));
            // The division leaves the remainder in EDX.
            let dummy = program.gen_addi(sign, REG_0, 0);
            program.instructions.get_mut(dummy).unwrap().dummy = true;
            program.gen_add(
                dest_id,
                REG_0,
                dividend,
                CgFlags {
                    dest_indirect,
                    src2_indirect: false,
                },
            );
            program.pop_insertion_point();
        }
    }
}
