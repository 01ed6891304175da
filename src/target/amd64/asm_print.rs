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

//! NASM printer for the x86-64 target.
//!
//! By the time this runs the stream is two-address form over machine
//! registers only. Register names are picked by operand type: 32-bit names
//! for integers, 64-bit names for pointers and addressing, 8-bit names for
//! `setcc` results.

use crate::errors::CompileError;
use crate::ir::{
    Address, DirectiveKind, Instruction, MoveSource, Opcode, Program, RegisterOp, VarType,
};
use std::io::Write;

const REG_NAMES_64: [&str; 15] = [
    "0", "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13", "r14",
    "r15",
];
const REG_NAMES_32: [&str; 15] = [
    "0", "eax", "ebx", "ecx", "edx", "esi", "edi", "r8d", "r9d", "r10d", "r11d", "r12d", "r13d",
    "r14d", "r15d",
];
const REG_NAMES_8: [&str; 15] = [
    "0", "al", "bl", "cl", "dl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b", "r13b",
    "r14b", "r15b",
];

fn w(result: std::io::Result<()>) -> Result<(), CompileError> {
    result.map_err(|_| CompileError::FwriteError)
}

fn reg_name_64(reg: &RegisterOp) -> Result<&'static str, CompileError> {
    REG_NAMES_64
        .get(reg.id as usize)
        .copied()
        .ok_or(CompileError::InvalidRegister)
}

fn reg_name_32(reg: &RegisterOp) -> Result<&'static str, CompileError> {
    REG_NAMES_32
        .get(reg.id as usize)
        .copied()
        .ok_or(CompileError::InvalidRegister)
}

fn reg_name_8(reg: &RegisterOp) -> Result<&'static str, CompileError> {
    REG_NAMES_8
        .get(reg.id as usize)
        .copied()
        .ok_or(CompileError::InvalidRegister)
}

/// The operand as value or memory reference: `dword [r64]` when indirect,
/// the 64-bit name for pointers, the 32-bit name otherwise.
fn reg_val_or_ptr(reg: &RegisterOp) -> Result<String, CompileError> {
    if reg.indirect {
        Ok(format!("dword [{}]", reg_name_64(reg)?))
    } else if reg.ty.is_pointer() {
        Ok(reg_name_64(reg)?.to_string())
    } else {
        Ok(reg_name_32(reg)?.to_string())
    }
}

fn address_operand(program: &Program, address: &Address) -> String {
    match address {
        Address::Number(value) => format!("{}", value),
        Address::Label(label) => program.labels.format(*label),
    }
}

fn emit_function_prologue(output: &mut dyn Write) -> Result<(), CompileError> {
    w(output.write_all(
        b"\tpush rbp\n\
          \tmov rbp, rsp\n\
          \tpush rbx\n\
          \tpush r12\n\
          \tpush r13\n\
          \tpush r14\n\
          \tpush r15\n\
          \tsub rsp, 8\n",
    ))
}

fn emit_function_epilogue(output: &mut dyn Write) -> Result<(), CompileError> {
    w(output.write_all(
        b"\tadd rsp, 8\n\
          \tpop r15\n\
          \tpop r14\n\
          \tpop r13\n\
          \tpop r12\n\
          \tpop rbx\n\
          \tmov rsp, rbp\n\
          \tpop rbp\n",
    ))
}

/// Moves need no computing instruction at all: they become `mov` (or `lea`
/// for label addresses). Returns false when the instruction is not a move.
fn translate_mov(
    program: &Program,
    instr: &Instruction,
    output: &mut dyn Write,
) -> Result<bool, CompileError> {
    let Some((dest, source)) = instr.as_move() else {
        return Ok(false);
    };

    match source {
        MoveSource::Address(Address::Number(value)) => {
            w(writeln!(output, "\tmov {}, {}", reg_name_64(dest)?, value))?;
        }
        MoveSource::Address(Address::Label(label)) => {
            w(writeln!(
                output,
                "\tlea {}, [{}]",
                reg_name_64(dest)?,
                program.labels.format(*label)
            ))?;
        }
        MoveSource::Register(src) => {
            if src.id == dest.id && src.indirect == dest.indirect && src.ty == dest.ty {
                return Ok(true);
            }
            w(writeln!(
                output,
                "\tmov {}, {}",
                reg_val_or_ptr(dest)?,
                reg_val_or_ptr(src)?
            ))?;
        }
        MoveSource::Immediate(value) => {
            w(writeln!(
                output,
                "\tmov {}, {}",
                reg_val_or_ptr(dest)?,
                value
            ))?;
        }
    }
    Ok(true)
}

fn translate_load_store(
    program: &Program,
    instr: &Instruction,
    output: &mut dyn Write,
) -> Result<(), CompileError> {
    let address = instr
        .address
        .as_ref()
        .ok_or(CompileError::InvalidAddress)?;
    let address = address_operand(program, address);
    let reg = reg_name_32(instr.rd.as_ref().ok_or(CompileError::InvalidRegister)?)?;

    if instr.opcode == Opcode::Store {
        w(writeln!(output, "\tmov dword [{}], {}", address, reg))
    } else {
        w(writeln!(output, "\tmov {}, dword [{}]", reg, address))
    }
}

fn translate_setcc(instr: &Instruction, output: &mut dyn Write) -> Result<(), CompileError> {
    let mnemonic = match instr.opcode {
        Opcode::Seq => "sete",
        Opcode::Sne => "setne",
        Opcode::Sge => "setge",
        Opcode::Sgt => "setg",
        Opcode::Sle => "setle",
        Opcode::Slt => "setl",
        _ => return Err(CompileError::InvalidOpcode),
    };
    let dest = instr.rd.as_ref().ok_or(CompileError::InvalidRegister)?;
    w(writeln!(output, "\t{} {}", mnemonic, reg_name_8(dest)?))?;
    w(writeln!(
        output,
        "\tmovzx {}, {}",
        reg_name_32(dest)?,
        reg_name_8(dest)?
    ))
}

fn translate_instruction(
    program: &Program,
    instr: &Instruction,
    output: &mut dyn Write,
) -> Result<(), CompileError> {
    if instr.dummy {
        return Ok(());
    }

    if let Some(label) = instr.label {
        w(writeln!(output, "{}:", program.labels.format(label)))?;
    }

    if translate_mov(program, instr, output)? {
        return Ok(());
    }

    let dest = instr.rd.as_ref();
    let source = instr.rs2.as_ref().or(instr.rs1.as_ref());

    let dest_str = match dest {
        Some(reg) => reg_val_or_ptr(reg)?,
        None => String::new(),
    };
    let mut source_str = String::new();
    if let (Some(dest), Some(source)) = (dest, source) {
        source_str = reg_val_or_ptr(source)?;
        // A 32-bit value feeding a pointer-wide operation is widened first.
        if !source.indirect && source.ty == VarType::Integer && dest.ty == VarType::IntegerPtr {
            w(writeln!(
                output,
                "\tmovsx {}, {}",
                reg_name_64(source)?,
                reg_name_32(source)?
            ))?;
            source_str = reg_name_64(source)?.to_string();
        }
    }

    let address_str = instr
        .address
        .as_ref()
        .map(|address| address_operand(program, address))
        .unwrap_or_default();

    match instr.opcode {
        Opcode::Bf | Opcode::Nop => w(writeln!(output, "\tnop")),
        Opcode::Add => w(writeln!(output, "\tadd {}, {}", dest_str, source_str)),
        Opcode::Sub => w(writeln!(output, "\tsub {}, {}", dest_str, source_str)),
        Opcode::Mul => w(writeln!(output, "\timul {}, {}", dest_str, source_str)),
        Opcode::Div => w(writeln!(output, "\tidiv {}", source_str)),
        Opcode::Andb => w(writeln!(output, "\tand {}, {}", dest_str, source_str)),
        Opcode::Orb => w(writeln!(output, "\tor {}, {}", dest_str, source_str)),
        Opcode::Eorb => w(writeln!(output, "\txor {}, {}", dest_str, source_str)),
        Opcode::Shl => w(writeln!(output, "\tsal {}, cl", dest_str)),
        Opcode::Shr => w(writeln!(output, "\tsar {}, cl", dest_str)),
        Opcode::Rotl => w(writeln!(output, "\trol {}, cl", dest_str)),
        Opcode::Rotr => w(writeln!(output, "\tror {}, cl", dest_str)),
        Opcode::Neg => w(writeln!(output, "\tneg {}", dest_str)),
        Opcode::Notb => w(writeln!(output, "\tnot {}", dest_str)),
        Opcode::Addi => w(writeln!(output, "\tadd {}, {}", dest_str, instr.immediate)),
        Opcode::Subi => w(writeln!(output, "\tsub {}, {}", dest_str, instr.immediate)),
        Opcode::Muli => w(writeln!(
            output,
            "\timul {}, {}, {}",
            dest_str, source_str, instr.immediate
        )),
        Opcode::Andbi => w(writeln!(output, "\tand {}, {}", dest_str, instr.immediate)),
        Opcode::Orbi => w(writeln!(output, "\tor {}, {}", dest_str, instr.immediate)),
        Opcode::Eorbi => w(writeln!(output, "\txor {}, {}", dest_str, instr.immediate)),
        Opcode::Shli => w(writeln!(output, "\tsal {}, {}", dest_str, instr.immediate)),
        Opcode::Shri => w(writeln!(output, "\tsar {}, {}", dest_str, instr.immediate)),
        Opcode::Rotli => w(writeln!(output, "\trol {}, {}", dest_str, instr.immediate)),
        Opcode::Rotri => w(writeln!(output, "\tror {}, {}", dest_str, instr.immediate)),
        Opcode::Seq | Opcode::Sne | Opcode::Slt | Opcode::Sle | Opcode::Sgt | Opcode::Sge => {
            translate_setcc(instr, output)
        }
        Opcode::Load | Opcode::Store => translate_load_store(program, instr, output),
        Opcode::Bt => w(writeln!(output, "\tjmp {}", address_str)),
        Opcode::Bhi => w(writeln!(output, "\tja {}", address_str)),
        Opcode::Bls => w(writeln!(output, "\tjbe {}", address_str)),
        Opcode::Bcc => w(writeln!(output, "\tjnc {}", address_str)),
        Opcode::Bcs => w(writeln!(output, "\tjc {}", address_str)),
        Opcode::Bne => w(writeln!(output, "\tjne {}", address_str)),
        Opcode::Beq => w(writeln!(output, "\tje {}", address_str)),
        Opcode::Bvc => w(writeln!(output, "\tjno {}", address_str)),
        Opcode::Bvs => w(writeln!(output, "\tjo {}", address_str)),
        Opcode::Bpl => w(writeln!(output, "\tjns {}", address_str)),
        Opcode::Bmi => w(writeln!(output, "\tjs {}", address_str)),
        Opcode::Bge => w(writeln!(output, "\tjge {}", address_str)),
        Opcode::Blt => w(writeln!(output, "\tjl {}", address_str)),
        Opcode::Bgt => w(writeln!(output, "\tjg {}", address_str)),
        Opcode::Ble => w(writeln!(output, "\tjle {}", address_str)),
        Opcode::Ret | Opcode::Halt => {
            emit_function_epilogue(output)?;
            w(writeln!(output, "\tret"))
        }
        Opcode::Read => w(writeln!(output, "\tcall __axe_read")),
        Opcode::Write => w(writeln!(output, "\tcall __axe_write")),
        // Anything left over cannot be encoded on x86-64 and marks a bug in
        // the lowering passes.
        Opcode::Spcl
        | Opcode::Andl
        | Opcode::Orl
        | Opcode::Eorl
        | Opcode::Andli
        | Opcode::Orli
        | Opcode::Eorli
        | Opcode::Notl
        | Opcode::Divi
        | Opcode::Jsr
        | Opcode::Mova => Err(CompileError::InvalidOpcode),
    }
}

fn translate_data_segment(program: &Program, output: &mut dyn Write) -> Result<(), CompileError> {
    if program.data.is_empty() {
        return Ok(());
    }

    w(writeln!(output, "section .bss"))?;
    for data in &program.data {
        if data.kind != DirectiveKind::Space {
            continue;
        }
        translate_data_object(program, data, "resb", output)?;
    }

    w(writeln!(output, "section .data"))?;
    for data in &program.data {
        if data.kind != DirectiveKind::Word {
            continue;
        }
        translate_data_object(program, data, "dd", output)?;
    }
    Ok(())
}

fn translate_data_object(
    program: &Program,
    data: &crate::ir::DataDirective,
    directive: &str,
    output: &mut dyn Write,
) -> Result<(), CompileError> {
    match data.label {
        Some(label) => w(write!(output, "{}:\t", program.labels.format(label)))?,
        None => w(write!(output, "\t"))?,
    }
    w(writeln!(output, "{} {}", directive, data.value))
}

fn translate_code_segment(program: &Program, output: &mut dyn Write) -> Result<(), CompileError> {
    if program.instructions.is_empty() {
        return Ok(());
    }
    w(output.write_all(b"section .text\n__lance_start:\n"))?;
    emit_function_prologue(output)?;

    for (_, instr) in program.instructions.iter() {
        translate_instruction(program, instr, output)?;
    }
    Ok(())
}

pub fn write_assembly(program: &Program, output: &mut dyn Write) -> Result<(), CompileError> {
    w(output.write_all(
        b"bits 64\n\
          default rel\n\
          global __lance_start\n\
          extern __axe_read\n\
          extern __axe_write\n",
    ))?;
    translate_data_segment(program, output)?;
    translate_code_segment(program, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CG_DIRECT_ALL, REG_0};
    use crate::target::amd64::{R_EAX, R_EBX, R_ECX};

    fn print(program: &Program) -> String {
        let mut buffer = Vec::new();
        write_assembly(program, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_header_prologue_and_epilogue() {
        let mut program = Program::new();
        program.gen_halt();
        let text = print(&program);
        assert!(text.starts_with(
            "bits 64\ndefault rel\nglobal __lance_start\nextern __axe_read\nextern __axe_write\n"
        ));
        assert!(text.contains("section .text\n__lance_start:\n"));
        assert!(text.contains("\tpush rbp\n\tmov rbp, rsp\n"));
        assert!(text.contains("\tmov rsp, rbp\n\tpop rbp\n\tret\n"));
    }

    #[test]
    fn test_moves_and_two_address_arithmetic() {
        let mut program = Program::new();
        program.gen_addi(R_EAX, REG_0, 5);
        program.gen_add(R_EAX, R_EAX, R_EBX, CG_DIRECT_ALL);
        program.gen_subi(R_EAX, R_EAX, 1);
        program.gen_halt();
        let text = print(&program);
        assert!(text.contains("\tmov eax, 5\n"));
        assert!(text.contains("\tadd eax, ebx\n"));
        assert!(text.contains("\tsub eax, 1\n"));
    }

    #[test]
    fn test_setcc_uses_byte_register_and_zero_extends() {
        let mut program = Program::new();
        program.gen_seq(R_EBX);
        program.gen_halt();
        let text = print(&program);
        assert!(text.contains("\tsete bl\n\tmovzx ebx, bl\n"));
    }

    #[test]
    fn test_shift_uses_cl() {
        let mut program = Program::new();
        let id = program.gen_shl(R_EAX, R_EAX, R_ECX, CG_DIRECT_ALL);
        let _ = id;
        program.gen_halt();
        let text = print(&program);
        assert!(text.contains("\tsal eax, cl\n"));
    }

    #[test]
    fn test_dummy_instructions_are_not_emitted() {
        let mut program = Program::new();
        let id = program.gen_addi(R_EAX, REG_0, 0);
        program.instructions.get_mut(id).unwrap().dummy = true;
        program.gen_halt();
        let text = print(&program);
        assert!(!text.contains("mov eax, 0"));
    }

    #[test]
    fn test_data_sections() {
        let mut program = Program::new();
        program
            .create_variable("x", crate::ir::VarType::Integer, false, 0, 9)
            .unwrap();
        program
            .create_variable("a", crate::ir::VarType::Integer, true, 4, 0)
            .unwrap();
        program.gen_halt();
        let text = print(&program);
        let bss = text.find("section .bss").unwrap();
        let data = text.find("section .data").unwrap();
        assert!(bss < data);
        assert!(text.contains("_a:\tresb 16\n"));
        assert!(text.contains("_x:\tdd 9\n"));
    }

    #[test]
    fn test_indirect_operand_and_pointer_widening() {
        let mut program = Program::new();
        // A pointer base plus a 32-bit offset: the offset is sign-extended
        // to the pointer width first.
        let id = program.gen_add(R_EBX, R_EBX, R_EAX, CG_DIRECT_ALL);
        {
            let instr = program.instructions.get_mut(id).unwrap();
            instr.rd.as_mut().unwrap().ty = crate::ir::VarType::IntegerPtr;
            instr.rs1.as_mut().unwrap().ty = crate::ir::VarType::IntegerPtr;
            instr.rs2.as_mut().unwrap().ty = crate::ir::VarType::Integer;
        }
        // A load through the pointer.
        let id = program.gen_add(R_EAX, R_EAX, R_EBX, crate::ir::CG_INDIRECT_SOURCE);
        program
            .instructions
            .get_mut(id)
            .unwrap()
            .rs2
            .as_mut()
            .unwrap()
            .ty = crate::ir::VarType::IntegerPtr;
        program.gen_halt();

        let text = print(&program);
        assert!(text.contains("\tmovsx rax, eax\n\tadd rbx, rax\n"));
        assert!(text.contains("\tadd eax, dword [rbx]\n"));
    }

    #[test]
    fn test_load_and_store_reference_their_label() {
        let mut program = Program::new();
        program
            .create_variable("x", crate::ir::VarType::Integer, false, 0, 0)
            .unwrap();
        let label = program.label_of_variable("x").unwrap();
        program.gen_load(R_EAX, crate::ir::Address::Label(label));
        program.gen_store(R_EAX, crate::ir::Address::Label(label));
        program.gen_halt();
        let text = print(&program);
        assert!(text.contains("\tmov eax, dword [_x]\n"));
        assert!(text.contains("\tmov dword [_x], eax\n"));
    }

    #[test]
    fn test_unencodable_opcode_is_an_error() {
        let mut program = Program::new();
        program.gen_divi(R_EAX, R_EAX, 2);
        let mut buffer = Vec::new();
        assert_eq!(
            write_assembly(&program, &mut buffer),
            Err(CompileError::InvalidOpcode)
        );
    }
}
