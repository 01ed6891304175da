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

//! Array element access: take the array's address with `MOVA`, add the
//! scaled index, then go through the address register indirectly.

use crate::errors::CompileError;
use crate::front::codegen::expressions::ExprValue;
use crate::ir::{
    Address, CG_DIRECT_ALL, CG_INDIRECT_DEST, CG_INDIRECT_SOURCE, Program, REG_0, RegId,
};
use crate::target::TargetInfo;

/// Compute the address of `id[index]` into a fresh register.
pub fn load_array_address(
    program: &mut Program,
    target: &TargetInfo,
    id: &str,
    index: ExprValue,
) -> Result<RegId, CompileError> {
    let variable = program
        .get_variable(id)
        .ok_or_else(|| CompileError::SymbolTableError(id.to_string()))?;
    if !variable.is_array {
        return Err(CompileError::InvalidType(id.to_string()));
    }
    let label = variable.label;

    let address = program.new_register();
    program.gen_mova(address, Address::Label(label));

    // Elements are words; scale by the target's addressing granularity.
    let element_size = 4 / target.ptr_granularity;

    match index {
        ExprValue::Immediate(value) => {
            if value != 0 {
                program.gen_addi(address, address, value * element_size);
            }
        }
        ExprValue::Register(index_reg) => {
            let mut offset = index_reg;
            if element_size != 1 {
                offset = program.new_register();
                program.gen_muli(offset, index_reg, element_size);
            }
            program.gen_add(address, address, offset, CG_DIRECT_ALL);
        }
    }

    Ok(address)
}

/// Load `id[index]` into a fresh register.
pub fn load_array_element(
    program: &mut Program,
    target: &TargetInfo,
    id: &str,
    index: ExprValue,
) -> Result<RegId, CompileError> {
    let address = load_array_address(program, target, id, index)?;
    let element = program.new_register();
    program.gen_add(element, REG_0, address, CG_INDIRECT_SOURCE);
    Ok(element)
}

/// Store `data` into `id[index]`.
pub fn store_array_element(
    program: &mut Program,
    target: &TargetInfo,
    id: &str,
    index: ExprValue,
    data: ExprValue,
) -> Result<(), CompileError> {
    let address = load_array_address(program, target, id, index)?;
    let value = match data {
        ExprValue::Register(reg) => reg,
        ExprValue::Immediate(value) => program.gen_load_immediate(value),
    };
    program.gen_add(address, REG_0, value, CG_INDIRECT_DEST);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Opcode, VarType};

    fn array_program() -> Program {
        let mut program = Program::new();
        program
            .create_variable("a", VarType::Integer, true, 4, 0)
            .unwrap();
        program
    }

    #[test]
    fn test_constant_index_folds_into_displacement() {
        let mut program = array_program();
        let target = crate::target::amd64::TARGET_INFO;
        load_array_element(&mut program, &target, "a", ExprValue::Immediate(2)).unwrap();

        let instrs: Vec<_> = program
            .instructions
            .iter()
            .map(|(_, i)| i.clone())
            .collect();
        assert_eq!(instrs[0].opcode, Opcode::Mova);
        assert_eq!(instrs[1].opcode, Opcode::Addi);
        // byte addressed: element 2 is at offset 8
        assert_eq!(instrs[1].immediate, 8);
        assert_eq!(instrs[2].opcode, Opcode::Add);
        assert!(instrs[2].rs2.as_ref().unwrap().indirect);
    }

    #[test]
    fn test_word_addressed_target_scales_by_one() {
        let mut program = array_program();
        let target = crate::target::mace::TARGET_INFO;
        let index = program.new_register();
        load_array_element(&mut program, &target, "a", ExprValue::Register(index)).unwrap();

        // No MULI: word granularity means the index is the offset.
        let ops: Vec<Opcode> = program
            .instructions
            .iter()
            .map(|(_, i)| i.opcode)
            .collect();
        assert_eq!(ops, vec![Opcode::Mova, Opcode::Add, Opcode::Add]);
    }

    #[test]
    fn test_store_through_address_register() {
        let mut program = array_program();
        let target = crate::target::amd64::TARGET_INFO;
        store_array_element(
            &mut program,
            &target,
            "a",
            ExprValue::Immediate(0),
            ExprValue::Immediate(7),
        )
        .unwrap();

        let last = program
            .instructions
            .iter()
            .map(|(_, i)| i.clone())
            .last()
            .unwrap();
        assert_eq!(last.opcode, Opcode::Add);
        assert!(last.rd.as_ref().unwrap().indirect);
    }

    #[test]
    fn test_scalar_used_as_array_is_an_error() {
        let mut program = Program::new();
        program
            .create_variable("x", VarType::Integer, false, 0, 0)
            .unwrap();
        let target = crate::target::amd64::TARGET_INFO;
        assert_eq!(
            load_array_address(&mut program, &target, "x", ExprValue::Immediate(0)),
            Err(CompileError::InvalidType("x".to_string()))
        );
    }
}
