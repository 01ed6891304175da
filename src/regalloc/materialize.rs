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

//! Spill materialization and machine-register substitution.
//!
//! After this pass the instruction stream refers only to machine registers:
//! every use of a spilled variable is preceded by a load of its backing word
//! into a reserved scratch register, every definition is followed by a store
//! back, and all other virtual register ids are replaced by their allocated
//! machine registers.

use crate::cflow::defuse::{OperandSlot, operand_roles};
use crate::errors::CompileError;
use crate::ir::{Address, DataDirective, DirectiveKind, LabelId, Program, REG_0, RegId};
use crate::regalloc::{Binding, RegAllocator};
use crate::target::TargetInfo;
use std::collections::HashMap;

pub fn materialize_register_allocation(
    program: &mut Program,
    allocator: &RegAllocator,
    target: &TargetInfo,
) -> Result<(), CompileError> {
    let first_scratch = target.allocatable_registers() + 1;
    let mut backing_words: HashMap<RegId, LabelId> = HashMap::new();

    for id in program.instructions.ids() {
        let instr = program.instructions.get(id).unwrap();
        let (def_slots, use_slots) = operand_roles(instr);

        // Distinct spilled variables referenced by this instruction, in
        // operand order, with their roles.
        let mut spilled: Vec<(RegId, bool, bool)> = Vec::new();
        let mut record = |reg: RegId, is_def: bool| {
            if let Some(entry) = spilled.iter_mut().find(|(id, _, _)| *id == reg) {
                entry.1 |= is_def;
                entry.2 |= !is_def;
            } else {
                spilled.push((reg, is_def, !is_def));
            }
        };

        for slot in [OperandSlot::Rd, OperandSlot::Rs1, OperandSlot::Rs2] {
            let Some(reg) = operand(instr, slot) else {
                continue;
            };
            if reg == REG_0 {
                continue;
            }
            match allocator.binding_of(reg) {
                Some(Binding::Spill) => {
                    let is_def = def_slots.iter().flatten().any(|s| *s == slot);
                    let is_use = use_slots.iter().flatten().any(|s| *s == slot);
                    if is_def {
                        record(reg, true);
                    }
                    if is_use {
                        record(reg, false);
                    }
                    if !is_def && !is_use {
                        record(reg, false);
                    }
                }
                Some(Binding::Reg(_)) | None => {}
            }
        }

        if spilled.len() > target.num_spill_regs as usize {
            return Err(CompileError::RegisterAllocationError(format!(
                "instruction references {} spilled values but only {} scratch registers exist",
                spilled.len(),
                target.num_spill_regs
            )));
        }

        // Bind each spilled variable to one scratch register and make sure
        // it has a backing word in the data segment.
        let assignments: Vec<(RegId, RegId, bool, bool, LabelId)> = spilled
            .iter()
            .enumerate()
            .map(|(index, &(var, is_def, is_use))| {
                let scratch = first_scratch + index as i32;
                let label = *backing_words.entry(var).or_insert_with(|| {
                    let label = program.labels.reserve();
                    program.data.push(DataDirective {
                        kind: DirectiveKind::Word,
                        value: 0,
                        label: Some(label),
                    });
                    label
                });
                (var, scratch, is_def, is_use, label)
            })
            .collect();

        // Loads for the spilled uses, in front of the instruction; the
        // instruction's label migrates to the first load.
        let mut first_load = None;
        program.push_insertion_point(program.instructions.prev(id));
        for &(_, scratch, _, is_use, label) in &assignments {
            if is_use {
                let load = program.gen_load(scratch, Address::Label(label));
                first_load.get_or_insert(load);
            }
        }
        program.pop_insertion_point();
        if let Some(first_load) = first_load {
            if program.instructions.get(id).unwrap().label.is_some() {
                program.move_label(first_load, id);
            }
        }

        // Rewrite the operands: spilled ones to their scratch register,
        // everything else to its allocated machine register.
        let instr = program.instructions.get_mut(id).unwrap();
        for slot in [OperandSlot::Rd, OperandSlot::Rs1, OperandSlot::Rs2] {
            let reg = match slot {
                OperandSlot::Rd => instr.rd.as_mut(),
                OperandSlot::Rs1 => instr.rs1.as_mut(),
                OperandSlot::Rs2 => instr.rs2.as_mut(),
            };
            let Some(reg) = reg else { continue };
            if reg.id == REG_0 {
                continue;
            }
            if let Some(&(_, scratch, _, _, _)) =
                assignments.iter().find(|(var, ..)| *var == reg.id)
            {
                reg.id = scratch;
                continue;
            }
            match allocator.binding_of(reg.id) {
                Some(Binding::Reg(mc_reg)) => reg.id = mc_reg,
                _ => {
                    return Err(CompileError::RegisterAllocationError(format!(
                        "virtual register {} has no machine register",
                        reg.id
                    )));
                }
            }
        }

        // Stores for the spilled definitions, after the instruction.
        program.push_insertion_point(Some(id));
        for &(_, scratch, is_def, _, label) in &assignments {
            if is_def {
                program.gen_store(scratch, Address::Label(label));
            }
        }
        program.pop_insertion_point();
    }

    Ok(())
}

fn operand(instr: &crate::ir::Instruction, slot: OperandSlot) -> Option<RegId> {
    match slot {
        OperandSlot::Rd => instr.rd.as_ref().map(|reg| reg.id),
        OperandSlot::Rs1 => instr.rs1.as_ref().map(|reg| reg.id),
        OperandSlot::Rs2 => instr.rs2.as_ref().map(|reg| reg.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cflow::Graph;
    use crate::cflow::liveness::perform_liveness_analysis;
    use crate::ir::{CG_DIRECT_ALL, Opcode};
    use crate::target::TargetInfo;

    const TINY_TARGET: TargetInfo = TargetInfo {
        name: "tiny",
        num_registers: 4,
        num_spill_regs: 2,
        ptr_granularity: 4,
    };

    fn run_backend(program: &mut Program, target: &TargetInfo) -> RegAllocator {
        let mut graph = Graph::build(program).unwrap();
        perform_liveness_analysis(&mut graph);
        let mut allocator = RegAllocator::new(&graph, target).unwrap();
        allocator.execute_linear_scan().unwrap();
        materialize_register_allocation(program, &allocator, target).unwrap();
        allocator
    }

    #[test]
    fn test_no_virtual_registers_survive() {
        // Five simultaneously live values on two allocatable registers.
        let mut program = Program::new();
        let regs: Vec<_> = (0..5).map(|_| program.new_register()).collect();
        for (index, &reg) in regs.iter().enumerate() {
            program.gen_addi(reg, REG_0, index as i32);
        }
        let mut sum = regs[0];
        for &reg in &regs[1..] {
            let next = program.new_register();
            program.gen_add(next, sum, reg, CG_DIRECT_ALL);
            sum = next;
        }
        program.gen_write(sum);
        program.gen_halt();

        run_backend(&mut program, &TINY_TARGET);

        for (_, instr) in program.instructions.iter() {
            for reg in [&instr.rd, &instr.rs1, &instr.rs2].into_iter().flatten() {
                assert!(
                    reg.id >= 0 && reg.id <= TINY_TARGET.num_registers,
                    "operand {} is not a machine register",
                    reg.id
                );
            }
        }
    }

    #[test]
    fn test_spilled_values_get_loads_and_stores() {
        let mut program = Program::new();
        let regs: Vec<_> = (0..4).map(|_| program.new_register()).collect();
        for (index, &reg) in regs.iter().enumerate() {
            program.gen_addi(reg, REG_0, index as i32);
        }
        // Keep all four alive past this point.
        let sum = program.new_register();
        program.gen_add(sum, regs[0], regs[1], CG_DIRECT_ALL);
        program.gen_add(sum, sum, regs[2], CG_DIRECT_ALL);
        program.gen_add(sum, sum, regs[3], CG_DIRECT_ALL);
        program.gen_write(sum);
        program.gen_halt();

        let allocator = run_backend(&mut program, &TINY_TARGET);
        let spill_count = allocator
            .bindings
            .values()
            .filter(|binding| **binding == Binding::Spill)
            .count();
        assert!(spill_count >= 1);

        let loads = program
            .instructions
            .iter()
            .filter(|(_, i)| i.opcode == Opcode::Load)
            .count();
        let stores = program
            .instructions
            .iter()
            .filter(|(_, i)| i.opcode == Opcode::Store)
            .count();
        assert!(loads >= 1, "spilled uses must be reloaded");
        assert!(stores >= 1, "spilled definitions must be written back");

        // One backing word per spilled variable was added to the data
        // segment.
        assert_eq!(program.data.len(), spill_count);
    }

    #[test]
    fn test_label_migrates_to_spill_load() {
        // One allocatable register: `a` has the latest end point, so it is
        // the value that spills, and the labeled write of `a` needs a
        // reload.
        let mut program = Program::new();
        let a = program.new_register();
        let b = program.new_register();
        program.gen_addi(a, REG_0, 1);
        program.gen_addi(b, REG_0, 2);
        program.gen_addi(b, b, 1);
        let label = program.assign_new_label().unwrap();
        program.gen_write(a);
        program.gen_halt();

        let target = TargetInfo {
            num_registers: 3,
            num_spill_regs: 2,
            ..TINY_TARGET
        };
        let allocator = run_backend(&mut program, &target);
        assert_eq!(allocator.binding_of(a), Some(Binding::Spill));

        let labeled = program
            .instructions
            .iter()
            .find(|(_, instr)| instr.label == Some(label))
            .map(|(_, instr)| instr.opcode)
            .expect("label survived materialization");
        assert_eq!(labeled, Opcode::Load);
    }
}
