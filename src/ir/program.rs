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

use crate::errors::{CompileError, Warning};
use crate::ir::instruction::{
    DataDirective, DirectiveKind, Instruction, RegId, VarType, Variable,
};
use crate::ir::labels::{LabelId, LabelManager};
use crate::ir::list::{ArenaList, NodeId};
use crate::ir::opcode::Opcode;
use crate::symbols::SymbolTable;

/// Word size of the variables owned by the program, in bytes.
const WORD_SIZE: i32 = 4;

/// The in-memory program under compilation: variables, the instruction
/// stream with its insertion-point stack, data directives, the label
/// manager, the symbol table and the virtual register counter.
#[derive(Debug)]
pub struct Program {
    pub variables: Vec<Variable>,
    pub instructions: ArenaList<Instruction>,
    pub data: Vec<DataDirective>,
    pub labels: LabelManager,
    pub sy_table: SymbolTable,
    pub warnings: Vec<Warning>,
    /// Insertion cursors; the bottom entry is "append to the end" and the
    /// stack is never empty. Each entry is the node after which the next
    /// instruction is inserted (`None` = at the head).
    insertion_points: Vec<Option<NodeId>>,
    current_register: RegId,
    current_line: Option<usize>,
    prev_line: Option<usize>,
}

impl Default for Program {
    fn default() -> Self {
        Program::new()
    }
}

impl Program {
    pub fn new() -> Program {
        Program {
            variables: Vec::new(),
            instructions: ArenaList::new(),
            data: Vec::new(),
            labels: LabelManager::new(),
            sy_table: SymbolTable::new(),
            warnings: Vec::new(),
            insertion_points: vec![None],
            // register 0 is the zero register
            current_register: 1,
            current_line: None,
            prev_line: None,
        }
    }

    /// Hand out a fresh virtual register identifier.
    pub fn new_register(&mut self) -> RegId {
        let result = self.current_register;
        self.current_register += 1;
        result
    }

    pub fn new_label(&mut self) -> LabelId {
        self.labels.reserve()
    }

    pub fn new_named_label(&mut self, name: &str) -> LabelId {
        self.labels.reserve_named(name)
    }

    /// Queue `label` for attachment to the next appended instruction.
    pub fn assign_label(&mut self, label: LabelId) -> Result<LabelId, CompileError> {
        self.labels.attach(label)
    }

    /// Reserve a label and attach it in one step.
    pub fn assign_new_label(&mut self) -> Result<LabelId, CompileError> {
        let label = self.new_label();
        self.assign_label(label)
    }

    /// Record the source line the next emitted instructions belong to.
    pub fn set_source_line(&mut self, line: usize) {
        self.current_line = Some(line);
    }

    pub fn add_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// Append `instr` at the current insertion point, consuming the pending
    /// label and tagging the instruction with a source-line comment when the
    /// line changed since the previous append.
    pub fn add_instruction(&mut self, mut instr: Instruction) -> NodeId {
        instr.label = self.labels.take_pending();

        if self.current_line.is_some() && self.current_line != self.prev_line {
            instr.comment = Some(format!("line {}", self.current_line.unwrap()));
        }
        self.prev_line = self.current_line;

        let cursor = *self
            .insertion_points
            .last()
            .expect("insertion point stack is never empty");
        let id = self.instructions.insert_after(cursor, instr);
        *self.insertion_points.last_mut().unwrap() = Some(id);
        id
    }

    /// Save the insertion point and continue inserting after `ip`
    /// (`None` inserts at the head of the instruction list).
    pub fn push_insertion_point(&mut self, ip: Option<NodeId>) {
        self.prev_line = None;
        self.insertion_points.push(ip);
    }

    /// Restore the previous insertion point. A pending label is affixed to
    /// the instruction following the cursor, materializing a `NOP` when no
    /// unlabeled instruction follows. Returns the popped cursor position.
    pub fn pop_insertion_point(&mut self) -> Option<NodeId> {
        self.prev_line = None;
        let cursor = *self.insertion_points.last().unwrap();

        if let Some(label) = self.labels.take_pending() {
            let follower = cursor.and_then(|ip| self.instructions.next(ip));
            let target = match follower {
                Some(next) if self.instructions.get(next).unwrap().label.is_none() => next,
                _ => self.add_instruction(Instruction::new(Opcode::Nop)),
            };
            self.instructions.get_mut(target).unwrap().label = Some(label);
        }

        debug_assert!(self.insertion_points.len() > 1);
        self.insertion_points.pop();
        cursor
    }

    /// Remove an instruction from the stream. Its label migrates to the next
    /// instruction (synthesizing a `NOP` when there is none or it is already
    /// labeled), its comment follows when the next has none, and insertion
    /// cursors pointing at the removed node are rewound to its predecessor.
    pub fn remove_instruction(&mut self, id: NodeId) {
        let removed = self.instructions.get(id).expect("stale instruction id");
        let has_label = removed.label.is_some();
        let has_comment = removed.comment.is_some();

        if has_label || has_comment {
            let mut next_id = self.instructions.next(id);

            if has_label {
                let needs_nop = match next_id {
                    Some(next) => self.instructions.get(next).unwrap().label.is_some(),
                    None => true,
                };
                if needs_nop {
                    self.push_insertion_point(Some(id));
                    let nop = self.add_instruction(Instruction::new(Opcode::Nop));
                    self.pop_insertion_point();
                    next_id = Some(nop);
                }
                let label = self.instructions.get_mut(id).unwrap().label.take();
                self.instructions.get_mut(next_id.unwrap()).unwrap().label = label;
            }

            if let Some(next) = next_id {
                if has_comment && self.instructions.get(next).unwrap().comment.is_none() {
                    let comment = self.instructions.get_mut(id).unwrap().comment.take();
                    self.instructions.get_mut(next).unwrap().comment = comment;
                }
            }
        }

        let prev = self.instructions.prev(id);
        for entry in &mut self.insertion_points {
            if *entry == Some(id) {
                *entry = prev;
            }
        }
        self.instructions.remove(id);
    }

    /// Move the label (and the comment, when the destination has none) from
    /// `src` onto `dest`. The destination must not already be labeled.
    pub fn move_label(&mut self, dest: NodeId, src: NodeId) {
        let label = self.instructions.get_mut(src).unwrap().label.take();
        let dest_instr = self.instructions.get(dest).unwrap();
        assert!(
            dest_instr.label.is_none() || label.is_none(),
            "label move onto an already labeled instruction"
        );
        if label.is_some() {
            self.instructions.get_mut(dest).unwrap().label = label;
        }

        if self.instructions.get(dest).unwrap().comment.is_none() {
            let comment = self.instructions.get_mut(src).unwrap().comment.take();
            self.instructions.get_mut(dest).unwrap().comment = comment;
        }
    }

    /// Declare a source variable: allocates its storage label, emits the
    /// matching data directive and registers the symbol.
    pub fn create_variable(
        &mut self,
        id: &str,
        ty: VarType,
        is_array: bool,
        array_size: i32,
        init_val: i32,
    ) -> Result<(), CompileError> {
        if id.is_empty() {
            return Err(CompileError::VariableIdUnspecified);
        }
        if ty != VarType::Integer {
            return Err(CompileError::InvalidType(id.to_string()));
        }
        if is_array && array_size <= 0 {
            return Err(CompileError::InvalidArraySize(id.to_string()));
        }
        if self.get_variable(id).is_some() {
            return Err(CompileError::VariableAlreadyDeclared(id.to_string()));
        }

        let label = self.labels.reserve_named(id);

        self.variables.push(Variable {
            id: id.to_string(),
            ty,
            is_array,
            array_size,
            init_val,
            label,
        });

        let directive = if is_array {
            DataDirective {
                kind: DirectiveKind::Space,
                value: array_size * WORD_SIZE,
                label: Some(label),
            }
        } else {
            DataDirective {
                kind: DirectiveKind::Word,
                value: init_val,
                label: Some(label),
            }
        };
        self.data.push(directive);

        self.sy_table.put(id, ty)?;
        Ok(())
    }

    pub fn get_variable(&self, id: &str) -> Option<&Variable> {
        self.variables.iter().find(|var| var.id == id)
    }

    pub fn label_of_variable(&self, id: &str) -> Option<LabelId> {
        self.get_variable(id).map(|var| var.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instruction::REG_0;

    #[test]
    fn test_pending_label_consumed_by_next_instruction() {
        let mut program = Program::new();
        let label = program.assign_new_label().unwrap();
        let r = program.new_register();
        let id = program.gen_addi(r, REG_0, 1);
        assert_eq!(program.instructions.get(id).unwrap().label, Some(label));

        let id2 = program.gen_addi(r, r, 1);
        assert_eq!(program.instructions.get(id2).unwrap().label, None);
    }

    #[test]
    fn test_pop_insertion_point_materializes_nop_for_pending_label() {
        let mut program = Program::new();
        let r = program.new_register();
        program.gen_addi(r, REG_0, 1);

        program.push_insertion_point(program.instructions.tail());
        let label = program.assign_new_label().unwrap();
        program.pop_insertion_point();

        let tail = program.instructions.tail().unwrap();
        let instr = program.instructions.get(tail).unwrap();
        assert_eq!(instr.opcode, Opcode::Nop);
        assert_eq!(instr.label, Some(label));
    }

    #[test]
    fn test_insertion_point_inserts_in_the_middle() {
        let mut program = Program::new();
        let r = program.new_register();
        let first = program.gen_addi(r, REG_0, 1);
        program.gen_addi(r, r, 2);

        program.push_insertion_point(Some(first));
        program.gen_addi(r, r, 10);
        program.gen_addi(r, r, 11);
        program.pop_insertion_point();

        let imms: Vec<i32> = program
            .instructions
            .iter()
            .map(|(_, instr)| instr.immediate)
            .collect();
        assert_eq!(imms, vec![1, 10, 11, 2]);
    }

    #[test]
    fn test_remove_instruction_migrates_label() {
        let mut program = Program::new();
        let r = program.new_register();
        let label = program.assign_new_label().unwrap();
        let first = program.gen_addi(r, REG_0, 1);
        let second = program.gen_addi(r, r, 2);

        program.remove_instruction(first);
        assert_eq!(program.instructions.get(second).unwrap().label, Some(label));

        // Removing the last labeled instruction synthesizes a NOP.
        let label2 = program.assign_new_label().unwrap();
        let third = program.gen_addi(r, r, 3);
        let _ = label2;
        program.remove_instruction(second);
        program.remove_instruction(third);
        let tail = program.instructions.tail().unwrap();
        assert_eq!(
            program.instructions.get(tail).unwrap().opcode,
            Opcode::Nop
        );
    }

    #[test]
    fn test_remove_instruction_rewinds_cursor() {
        let mut program = Program::new();
        let r = program.new_register();
        let first = program.gen_addi(r, REG_0, 1);
        let second = program.gen_addi(r, r, 2);

        program.push_insertion_point(Some(second));
        program.remove_instruction(second);
        // The cursor fell back to `first`: the next insert goes after it.
        let inserted = program.gen_addi(r, r, 9);
        program.pop_insertion_point();
        assert_eq!(program.instructions.next(first), Some(inserted));
    }

    #[test]
    fn test_create_variable_rejects_bad_declarations() {
        let mut program = Program::new();
        program
            .create_variable("x", VarType::Integer, false, 0, 5)
            .unwrap();
        assert_eq!(
            program.create_variable("x", VarType::Integer, false, 0, 0),
            Err(CompileError::VariableAlreadyDeclared("x".to_string()))
        );
        assert_eq!(
            program.create_variable("a", VarType::Integer, true, 0, 0),
            Err(CompileError::InvalidArraySize("a".to_string()))
        );
    }

    #[test]
    fn test_variable_data_directives() {
        let mut program = Program::new();
        program
            .create_variable("x", VarType::Integer, false, 0, 7)
            .unwrap();
        program
            .create_variable("a", VarType::Integer, true, 4, 0)
            .unwrap();

        assert_eq!(program.data.len(), 2);
        assert_eq!(program.data[0].kind, DirectiveKind::Word);
        assert_eq!(program.data[0].value, 7);
        assert_eq!(program.data[1].kind, DirectiveKind::Space);
        assert_eq!(program.data[1].value, 16);
        assert_eq!(program.labels.name_of(program.data[1].label.unwrap()), Some("_a"));
    }
}
