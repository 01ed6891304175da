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

use crate::ir::labels::LabelId;
use crate::ir::opcode::Opcode;

/// Virtual register identifier. Id 0 is the zero register; after register
/// allocation the same field holds machine register identifiers.
pub type RegId = i32;

pub const REG_0: RegId = 0;

/// Machine register identifier (1-based, target specific).
pub type McRegId = i32;

/// Operand/value types. The pointer variant marks values that must live in a
/// full-width register on targets where addresses are wider than integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VarType {
    Inferred,
    Integer,
    IntegerPtr,
}

impl VarType {
    pub fn is_pointer(self) -> bool {
        self == VarType::IntegerPtr
    }

    /// Drop the pointer flag; used when a source operand is dereferenced.
    pub fn strip_pointer(self) -> VarType {
        match self {
            VarType::IntegerPtr => VarType::Integer,
            other => other,
        }
    }

    /// Add the pointer flag to a known type.
    pub fn with_pointer(self) -> VarType {
        match self {
            VarType::Integer | VarType::IntegerPtr => VarType::IntegerPtr,
            VarType::Inferred => VarType::Inferred,
        }
    }
}

/// A register operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterOp {
    pub id: RegId,
    /// Interpret the register content as a memory address.
    pub indirect: bool,
    pub ty: VarType,
    /// Machine registers this operand may be assigned to, in preference
    /// order. Empty means any register.
    pub mc_whitelist: Vec<McRegId>,
}

impl RegisterOp {
    pub fn new(id: RegId, ty: VarType, indirect: bool) -> RegisterOp {
        RegisterOp {
            id,
            indirect,
            ty,
            mc_whitelist: Vec::new(),
        }
    }

    pub fn direct(id: RegId) -> RegisterOp {
        RegisterOp::new(id, VarType::Inferred, false)
    }
}

/// Target of a branch or memory instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    Label(LabelId),
    Number(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub rd: Option<RegisterOp>,
    pub rs1: Option<RegisterOp>,
    pub rs2: Option<RegisterOp>,
    pub immediate: i32,
    pub address: Option<Address>,
    pub label: Option<LabelId>,
    pub comment: Option<String>,
    /// Present only to communicate constraints to the register allocator;
    /// not emitted by the assembly printers.
    pub dummy: bool,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Instruction {
        Instruction {
            opcode,
            rd: None,
            rs1: None,
            rs2: None,
            immediate: 0,
            address: None,
            label: None,
            comment: None,
            dummy: false,
        }
    }
}

/// The source operand of an instruction recognized as a plain copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveSource<'a> {
    Register(&'a RegisterOp),
    Address(&'a Address),
    Immediate(i32),
}

impl Instruction {
    /// Recognize instructions that only copy a value into `rd`: additive or
    /// or/xor forms with a zero-register or zero-immediate operand, and
    /// `MOVA`. Returns the destination and the moved source.
    pub fn as_move(&self) -> Option<(&RegisterOp, MoveSource<'_>)> {
        let rd = self.rd.as_ref()?;
        match self.opcode {
            Opcode::Mova => {
                let addr = self.address.as_ref()?;
                Some((rd, MoveSource::Address(addr)))
            }
            Opcode::Add | Opcode::Orb | Opcode::Eorb => {
                let rs1 = self.rs1.as_ref()?;
                let rs2 = self.rs2.as_ref()?;
                if rs1.id == REG_0 && !rs1.indirect {
                    Some((rd, MoveSource::Register(rs2)))
                } else if rs2.id == REG_0 && !rs2.indirect {
                    Some((rd, MoveSource::Register(rs1)))
                } else {
                    None
                }
            }
            Opcode::Sub => {
                let rs1 = self.rs1.as_ref()?;
                let rs2 = self.rs2.as_ref()?;
                if rs2.id == REG_0 && !rs2.indirect {
                    Some((rd, MoveSource::Register(rs1)))
                } else {
                    None
                }
            }
            Opcode::Addi | Opcode::Subi | Opcode::Orbi | Opcode::Eorbi => {
                let rs1 = self.rs1.as_ref()?;
                if self.opcode == Opcode::Addi && rs1.id == REG_0 && !rs1.indirect {
                    Some((rd, MoveSource::Immediate(self.immediate)))
                } else if self.immediate == 0 {
                    Some((rd, MoveSource::Register(rs1)))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// Assembler directive for one datum in the data segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// One initialized word.
    Word,
    /// An uninitialized block of bytes.
    Space,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataDirective {
    pub kind: DirectiveKind,
    pub value: i32,
    pub label: Option<LabelId>,
}

/// A named source-level variable and its storage label.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: String,
    pub ty: VarType,
    pub is_array: bool,
    pub array_size: i32,
    pub init_val: i32,
    pub label: LabelId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_inference_ordering() {
        assert!(VarType::IntegerPtr > VarType::Integer);
        assert!(VarType::Integer > VarType::Inferred);
        assert_eq!(VarType::IntegerPtr.strip_pointer(), VarType::Integer);
        assert_eq!(VarType::Integer.with_pointer(), VarType::IntegerPtr);
    }

    #[test]
    fn test_move_recognition() {
        let mut add = Instruction::new(Opcode::Add);
        add.rd = Some(RegisterOp::direct(5));
        add.rs1 = Some(RegisterOp::direct(REG_0));
        add.rs2 = Some(RegisterOp::direct(3));
        match add.as_move() {
            Some((rd, MoveSource::Register(src))) => {
                assert_eq!(rd.id, 5);
                assert_eq!(src.id, 3);
            }
            other => panic!("expected register move, got {:?}", other),
        }

        let mut addi = Instruction::new(Opcode::Addi);
        addi.rd = Some(RegisterOp::direct(5));
        addi.rs1 = Some(RegisterOp::direct(REG_0));
        addi.immediate = 42;
        assert!(matches!(
            addi.as_move(),
            Some((_, MoveSource::Immediate(42)))
        ));

        let mut sub = Instruction::new(Opcode::Sub);
        sub.rd = Some(RegisterOp::direct(5));
        sub.rs1 = Some(RegisterOp::direct(1));
        sub.rs2 = Some(RegisterOp::direct(2));
        assert_eq!(sub.as_move(), None);
    }
}
