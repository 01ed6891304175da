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

use crate::errors::CompileError;
use crate::ir::{NodeId, Opcode, Program, REG_0, RegId, RegisterOp};

fn is_int16(immediate: i32) -> bool {
    immediate < (1 << 15) && immediate >= -(1 << 15)
}

/// Load `immediate` into `dest` using only 16-bit immediates:
/// high half via `ADDI` + `SHLI 16`, then the sign-extended low half.
/// Returns the first emitted instruction.
fn gen_lowered_immediate_move(program: &mut Program, dest: RegId, immediate: i32) -> NodeId {
    let mut imm0 = immediate;
    let mut imm1 = 0;
    if !is_int16(immediate) {
        // sign-extend the low half so the high half compensates for it
        imm0 = immediate as i16 as i32;
        imm1 = immediate.wrapping_sub(imm0) >> 16;
    }

    let mut first = None;
    let mut base = REG_0;
    if imm1 != 0 {
        first = Some(program.gen_addi(dest, base, imm1));
        program.gen_shli(dest, dest, 16);
        base = dest;
    }
    if imm0 != 0 || base == REG_0 {
        let instr = program.gen_addi(dest, base, imm0);
        first.get_or_insert(instr);
    }
    first.unwrap()
}

/// Rewrite every instruction whose immediate does not fit in signed 16 bits:
/// immediate loads are replaced by the lowered move sequence, everything
/// else materializes the immediate into a fresh register and switches to the
/// three-register opcode.
fn fix_large_immediates(program: &mut Program) {
    for id in program.instructions.ids() {
        let instr = program.instructions.get(id).unwrap();
        if !instr.opcode.is_immediate_form() || is_int16(instr.immediate) {
            continue;
        }

        let is_immediate_load =
            instr.opcode == Opcode::Addi && instr.rs1.as_ref().is_some_and(|r| r.id == REG_0);

        if is_immediate_load {
            let dest = instr.rd.as_ref().unwrap().id;
            let immediate = instr.immediate;
            program.push_insertion_point(Some(id));
            gen_lowered_immediate_move(program, dest, immediate);
            program.remove_instruction(id);
            program.pop_insertion_point();
        } else {
            let immediate = instr.immediate;
            program.push_insertion_point(program.instructions.prev(id));
            let reg = program.new_register();
            let first = gen_lowered_immediate_move(program, reg, immediate);
            program.move_label(first, id);
            let instr = program.instructions.get_mut(id).unwrap();
            instr.immediate = 0;
            instr.rs2 = Some(RegisterOp::direct(reg));
            instr.opcode = instr.opcode.switch_immediate_form();
            program.pop_insertion_point();
        }
    }
}

pub fn do_target_specific_transformations(program: &mut Program) -> Result<(), CompileError> {
    fix_large_immediates(program);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opcodes(program: &Program) -> Vec<Opcode> {
        program
            .instructions
            .iter()
            .map(|(_, instr)| instr.opcode)
            .collect()
    }

    #[test]
    fn test_small_immediates_are_untouched() {
        let mut program = Program::new();
        let r = program.new_register();
        program.gen_addi(r, REG_0, 32767);
        program.gen_addi(r, r, -32768);
        program.gen_halt();
        do_target_specific_transformations(&mut program).unwrap();
        assert_eq!(opcodes(&program), vec![Opcode::Addi, Opcode::Addi, Opcode::Halt]);
    }

    #[test]
    fn test_large_immediate_load_is_expanded() {
        let mut program = Program::new();
        let r = program.new_register();
        program.gen_addi(r, REG_0, 0x0012_3456);
        program.gen_halt();
        do_target_specific_transformations(&mut program).unwrap();

        // high half, shift, low half
        assert_eq!(
            opcodes(&program),
            vec![Opcode::Addi, Opcode::Shli, Opcode::Addi, Opcode::Halt]
        );
        let imms: Vec<i32> = program
            .instructions
            .iter()
            .map(|(_, instr)| instr.immediate)
            .collect();
        // 0x123456 = (0x12 << 16) + 0x3456
        assert_eq!(imms, vec![0x12, 16, 0x3456, 0]);
    }

    #[test]
    fn test_large_immediate_operand_switches_to_register_form() {
        let mut program = Program::new();
        let r = program.new_register();
        let s = program.new_register();
        program.gen_muli(s, r, 100_000);
        program.gen_halt();
        do_target_specific_transformations(&mut program).unwrap();

        let ops = opcodes(&program);
        assert_eq!(*ops.last().unwrap(), Opcode::Halt);
        assert!(ops.contains(&Opcode::Mul), "MULI must become MUL");
        assert!(!ops.contains(&Opcode::Muli));

        // The materialization lands right before the multiplication.
        let mul = program
            .instructions
            .iter()
            .find(|(_, i)| i.opcode == Opcode::Mul)
            .map(|(_, i)| i.clone())
            .unwrap();
        assert_eq!(mul.immediate, 0);
        assert!(mul.rs2.is_some());
    }

    #[test]
    fn test_label_survives_expansion() {
        let mut program = Program::new();
        let r = program.new_register();
        let label = program.assign_new_label().unwrap();
        program.gen_addi(r, REG_0, 0x7FFF_FFFF);
        program.gen_halt();
        do_target_specific_transformations(&mut program).unwrap();

        let head = program.instructions.head().unwrap();
        assert_eq!(program.instructions.get(head).unwrap().label, Some(label));
    }

    #[test]
    fn test_negative_low_half_sign_extension() {
        // 0x18000 has a low half of 0x8000 = -32768; the high half must
        // compensate.
        let mut program = Program::new();
        let r = program.new_register();
        program.gen_addi(r, REG_0, 0x18000);
        program.gen_halt();
        do_target_specific_transformations(&mut program).unwrap();

        let imms: Vec<i32> = program
            .instructions
            .iter()
            .map(|(_, instr)| instr.immediate)
            .collect();
        // (2 << 16) + (-32768) = 0x18000
        assert_eq!(imms, vec![2, 16, -32768, 0]);
    }
}
