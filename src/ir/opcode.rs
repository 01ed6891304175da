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

/// Every opcode of the three-address IR.
///
/// The register forms of the arithmetic/logic family are ternary
/// (`rd = rs1 op rs2`); the `...I` forms replace `rs2` with the instruction
/// immediate. `Notl`/`Notb` are binary (`rd = op rs1`). Set-on-condition
/// opcodes read the flags register and write 0/1 into `rd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // rd = rs1 op rs2
    Add,
    Sub,
    Andl,
    Orl,
    Eorl,
    Andb,
    Orb,
    Eorb,
    Mul,
    Div,
    Shl,
    Shr,
    Rotl,
    Rotr,
    Neg,
    Spcl,
    // rd = rs1 op imm
    Addi,
    Subi,
    Andli,
    Orli,
    Eorli,
    Andbi,
    Orbi,
    Eorbi,
    Muli,
    Divi,
    Shli,
    Shri,
    Rotli,
    Rotri,
    // rd = op rs1
    Notl,
    Notb,
    // rd = condition(flags)
    Seq,
    Sne,
    Slt,
    Sle,
    Sgt,
    Sge,
    // branches on flags
    Bt,
    Bf,
    Bhi,
    Bls,
    Bcc,
    Bcs,
    Bne,
    Beq,
    Bvc,
    Bvs,
    Bpl,
    Bmi,
    Bge,
    Blt,
    Bgt,
    Ble,
    // memory
    Load,
    Store,
    Mova,
    // runtime library I/O
    Read,
    Write,
    // control
    Nop,
    Halt,
    Ret,
    Jsr,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Andl => "ANDL",
            Opcode::Orl => "ORL",
            Opcode::Eorl => "EORL",
            Opcode::Andb => "ANDB",
            Opcode::Orb => "ORB",
            Opcode::Eorb => "EORB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Shl => "SHL",
            Opcode::Shr => "SHR",
            Opcode::Rotl => "ROTL",
            Opcode::Rotr => "ROTR",
            Opcode::Neg => "NEG",
            Opcode::Spcl => "SPCL",
            Opcode::Addi => "ADDI",
            Opcode::Subi => "SUBI",
            Opcode::Andli => "ANDLI",
            Opcode::Orli => "ORLI",
            Opcode::Eorli => "EORLI",
            Opcode::Andbi => "ANDBI",
            Opcode::Orbi => "ORBI",
            Opcode::Eorbi => "EORBI",
            Opcode::Muli => "MULI",
            Opcode::Divi => "DIVI",
            Opcode::Shli => "SHLI",
            Opcode::Shri => "SHRI",
            Opcode::Rotli => "ROTLI",
            Opcode::Rotri => "ROTRI",
            Opcode::Notl => "NOTL",
            Opcode::Notb => "NOTB",
            Opcode::Seq => "SEQ",
            Opcode::Sne => "SNE",
            Opcode::Slt => "SLT",
            Opcode::Sle => "SLE",
            Opcode::Sgt => "SGT",
            Opcode::Sge => "SGE",
            Opcode::Bt => "BT",
            Opcode::Bf => "BF",
            Opcode::Bhi => "BHI",
            Opcode::Bls => "BLS",
            Opcode::Bcc => "BCC",
            Opcode::Bcs => "BCS",
            Opcode::Bne => "BNE",
            Opcode::Beq => "BEQ",
            Opcode::Bvc => "BVC",
            Opcode::Bvs => "BVS",
            Opcode::Bpl => "BPL",
            Opcode::Bmi => "BMI",
            Opcode::Bge => "BGE",
            Opcode::Blt => "BLT",
            Opcode::Bgt => "BGT",
            Opcode::Ble => "BLE",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Mova => "MOVA",
            Opcode::Read => "READ",
            Opcode::Write => "WRITE",
            Opcode::Nop => "NOP",
            Opcode::Halt => "HALT",
            Opcode::Ret => "RET",
            Opcode::Jsr => "JSR",
        }
    }

    /// Branch instructions, conditional or not.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Bt
                | Opcode::Bf
                | Opcode::Bhi
                | Opcode::Bls
                | Opcode::Bcc
                | Opcode::Bcs
                | Opcode::Bne
                | Opcode::Beq
                | Opcode::Bvc
                | Opcode::Bvs
                | Opcode::Bpl
                | Opcode::Bmi
                | Opcode::Bge
                | Opcode::Blt
                | Opcode::Bgt
                | Opcode::Ble
        )
    }

    /// `BT` always branches; `BF` never does. Neither consults the flags, so
    /// neither has a fall-through edge in the flow graph.
    pub fn is_unconditional_jump(self) -> bool {
        matches!(self, Opcode::Bt | Opcode::Bf)
    }

    pub fn is_halt_or_ret(self) -> bool {
        matches!(self, Opcode::Halt | Opcode::Ret)
    }

    pub fn is_setcc(self) -> bool {
        matches!(
            self,
            Opcode::Seq | Opcode::Sne | Opcode::Slt | Opcode::Sle | Opcode::Sgt | Opcode::Sge
        )
    }

    /// Switch between the immediate and three-register forms of an opcode
    /// (`ADDI` <-> `ADD`). Opcodes without a counterpart are returned
    /// unchanged.
    pub fn switch_immediate_form(self) -> Opcode {
        match self {
            Opcode::Add => Opcode::Addi,
            Opcode::Sub => Opcode::Subi,
            Opcode::Andl => Opcode::Andli,
            Opcode::Orl => Opcode::Orli,
            Opcode::Eorl => Opcode::Eorli,
            Opcode::Andb => Opcode::Andbi,
            Opcode::Orb => Opcode::Orbi,
            Opcode::Eorb => Opcode::Eorbi,
            Opcode::Mul => Opcode::Muli,
            Opcode::Div => Opcode::Divi,
            Opcode::Shl => Opcode::Shli,
            Opcode::Shr => Opcode::Shri,
            Opcode::Rotl => Opcode::Rotli,
            Opcode::Rotr => Opcode::Rotri,
            Opcode::Addi => Opcode::Add,
            Opcode::Subi => Opcode::Sub,
            Opcode::Andli => Opcode::Andl,
            Opcode::Orli => Opcode::Orl,
            Opcode::Eorli => Opcode::Eorl,
            Opcode::Andbi => Opcode::Andb,
            Opcode::Orbi => Opcode::Orb,
            Opcode::Eorbi => Opcode::Eorb,
            Opcode::Muli => Opcode::Mul,
            Opcode::Divi => Opcode::Div,
            Opcode::Shli => Opcode::Shl,
            Opcode::Shri => Opcode::Shr,
            Opcode::Rotli => Opcode::Rotl,
            Opcode::Rotri => Opcode::Rotr,
            other => other,
        }
    }

    fn register_form_of_immediate(self) -> Option<Opcode> {
        match self {
            Opcode::Addi
            | Opcode::Subi
            | Opcode::Andli
            | Opcode::Orli
            | Opcode::Eorli
            | Opcode::Andbi
            | Opcode::Orbi
            | Opcode::Eorbi
            | Opcode::Muli
            | Opcode::Divi
            | Opcode::Shli
            | Opcode::Shri
            | Opcode::Rotli
            | Opcode::Rotri => Some(self.switch_immediate_form()),
            _ => None,
        }
    }

    /// True for the opcodes whose mnemonic ends with `I`.
    pub fn is_immediate_form(self) -> bool {
        self.register_form_of_immediate().is_some()
    }

    /// Opcodes that define the processor status word. Set-on-condition
    /// opcodes both read and define it; `SPCL` leaves the flags alone.
    pub fn defines_psw(self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Sub
                | Opcode::Andl
                | Opcode::Orl
                | Opcode::Eorl
                | Opcode::Andb
                | Opcode::Orb
                | Opcode::Eorb
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Shl
                | Opcode::Shr
                | Opcode::Rotl
                | Opcode::Rotr
                | Opcode::Neg
                | Opcode::Addi
                | Opcode::Subi
                | Opcode::Andli
                | Opcode::Orli
                | Opcode::Eorli
                | Opcode::Andbi
                | Opcode::Orbi
                | Opcode::Eorbi
                | Opcode::Muli
                | Opcode::Divi
                | Opcode::Shli
                | Opcode::Shri
                | Opcode::Rotli
                | Opcode::Rotri
                | Opcode::Notl
                | Opcode::Notb
        ) || self.is_setcc()
    }

    /// Opcodes that read the processor status word.
    pub fn uses_psw(self) -> bool {
        (self.is_jump() && !self.is_unconditional_jump()) || self.is_setcc()
    }
}
