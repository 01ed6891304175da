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

//! MACE assembly printer: `.data`/`.text` directives and one mnemonic per
//! line, with indirect register operands parenthesized.

use crate::errors::CompileError;
use crate::ir::{Address, DirectiveKind, Instruction, Program, RegisterOp};
use std::io::Write;

fn w(result: std::io::Result<()>) -> Result<(), CompileError> {
    result.map_err(|_| CompileError::FwriteError)
}

fn format_register(reg: &RegisterOp) -> String {
    if reg.indirect {
        format!("(R{})", reg.id)
    } else {
        format!("R{}", reg.id)
    }
}

fn format_address(program: &Program, address: &Address) -> String {
    match address {
        Address::Number(value) => format!("{}", value),
        Address::Label(label) => program.labels.format(*label),
    }
}

fn translate_instruction(
    program: &Program,
    instr: &Instruction,
    output: &mut dyn Write,
) -> Result<(), CompileError> {
    match instr.label {
        Some(label) => w(write!(output, "{}:\t", program.labels.format(label)))?,
        None => w(write!(output, "\t"))?,
    }
    w(write!(output, "{}", instr.opcode.mnemonic()))?;

    for reg in [&instr.rd, &instr.rs1, &instr.rs2].into_iter().flatten() {
        w(write!(output, " {}", format_register(reg)))?;
    }
    if let Some(address) = &instr.address {
        w(write!(output, " {}", format_address(program, address)))?;
    } else if instr.opcode.is_immediate_form() {
        w(write!(output, " #{}", instr.immediate))?;
    }

    if let Some(comment) = &instr.comment {
        w(write!(output, "\t\t/* {} */", comment))?;
    }
    w(writeln!(output))
}

fn translate_data_segment(program: &Program, output: &mut dyn Write) -> Result<(), CompileError> {
    if program.data.is_empty() {
        return Ok(());
    }
    w(writeln!(output, "\t.data"))?;

    for data in &program.data {
        match data.label {
            Some(label) => w(write!(output, "{}:\t", program.labels.format(label)))?,
            None => w(write!(output, "\t"))?,
        }
        let directive = match data.kind {
            DirectiveKind::Word => ".WORD",
            DirectiveKind::Space => ".SPACE",
        };
        w(writeln!(output, "{} {}", directive, data.value))?;
    }
    Ok(())
}

fn translate_code_segment(program: &Program, output: &mut dyn Write) -> Result<(), CompileError> {
    if program.instructions.is_empty() {
        return Ok(());
    }
    w(writeln!(output, "\t.text"))?;

    for (_, instr) in program.instructions.iter() {
        if instr.dummy {
            continue;
        }
        translate_instruction(program, instr, output)?;
    }
    Ok(())
}

pub fn write_assembly(program: &Program, output: &mut dyn Write) -> Result<(), CompileError> {
    translate_data_segment(program, output)?;
    translate_code_segment(program, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CG_INDIRECT_SOURCE, REG_0, VarType};

    fn print(program: &Program) -> String {
        let mut buffer = Vec::new();
        write_assembly(program, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_directives_and_mnemonics() {
        let mut program = Program::new();
        program
            .create_variable("x", VarType::Integer, false, 0, 3)
            .unwrap();
        program
            .create_variable("a", VarType::Integer, true, 4, 0)
            .unwrap();
        let r = program.new_register();
        program.gen_addi(r, REG_0, 5);
        let label = program.label_of_variable("x").unwrap();
        program.gen_store(r, Address::Label(label));
        program.gen_halt();

        let text = print(&program);
        assert!(text.contains("\t.data\n"));
        assert!(text.contains("_x:\t.WORD 3\n"));
        assert!(text.contains("_a:\t.SPACE 16\n"));
        assert!(text.contains("\t.text\n"));
        assert!(text.contains("\tADDI R1 R0 #5"));
        assert!(text.contains("\tSTORE R1 _x"));
        assert!(text.contains("\tHALT\n"));
    }

    #[test]
    fn test_indirect_operand_is_parenthesized() {
        let mut program = Program::new();
        let (value, addr) = (program.new_register(), program.new_register());
        program.gen_add(value, REG_0, addr, CG_INDIRECT_SOURCE);
        let text = print(&program);
        assert!(text.contains("\tADD R1 R0 (R2)"));
    }

    #[test]
    fn test_labels_and_branches() {
        let mut program = Program::new();
        let target = program.assign_new_label().unwrap();
        program.gen_nop();
        program.gen_bt(Address::Label(target));
        let text = print(&program);
        let expected = format!("{}:\tNOP", program.labels.format(target));
        assert!(text.contains(&expected));
        assert!(text.contains(&format!("\tBT {}", program.labels.format(target))));
    }

    #[test]
    fn test_comments_are_emitted() {
        let mut program = Program::new();
        program.set_source_line(7);
        let r = program.new_register();
        program.gen_addi(r, REG_0, 1);
        let text = print(&program);
        assert!(text.contains("/* line 7 */"));
    }
}
