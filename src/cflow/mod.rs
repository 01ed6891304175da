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

//! Control flow graph over the instruction stream.
//!
//! Blocks, nodes and variables are stored in vectors and refer to each other
//! by index; the graph never points back into the owning program beyond the
//! stable instruction node ids.

pub mod defuse;
pub mod liveness;
pub mod reaching;

use crate::errors::CompileError;
use crate::ir::{McRegId, NodeId, Program, RegId, VarType};
use std::collections::{BTreeSet, HashMap};

/// Pseudo register id of the processor status word.
pub const VAR_PSW: RegId = -2;

/// When set, the zero register is treated as always live and is kept out of
/// every liveness set.
pub const CFLOW_ALWAYS_LIVEIN_R0: bool = true;

/// Max defined/used variables for one node (the second def is the PSW).
pub const MAX_DEFS: usize = 2;
pub const MAX_USES: usize = 3;

pub type BlockId = usize;

/// Successor/predecessor slot naming the virtual ending block.
pub const ENDING_BLOCK: BlockId = usize::MAX;

/// Index into `Graph::variables`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CfgVarId(pub usize);

/// One variable (virtual register or the PSW) as seen by the dataflow
/// passes.
#[derive(Debug, Clone, PartialEq)]
pub struct CfgVar {
    pub id: RegId,
    pub ty: VarType,
    /// Intersection of the machine-register whitelists observed at every
    /// definition and use. `None` = unconstrained.
    pub mc_whitelist: Option<Vec<McRegId>>,
}

/// One instruction of the graph with its dataflow facts.
#[derive(Debug, Clone)]
pub struct CfgNode {
    pub instr: NodeId,
    pub defs: [Option<CfgVarId>; MAX_DEFS],
    pub uses: [Option<CfgVarId>; MAX_USES],
    pub live_in: BTreeSet<CfgVarId>,
    pub live_out: BTreeSet<CfgVarId>,
}

impl CfgNode {
    fn new(instr: NodeId) -> CfgNode {
        CfgNode {
            instr,
            defs: [None; MAX_DEFS],
            uses: [None; MAX_USES],
            live_in: BTreeSet::new(),
            live_out: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct BasicBlock {
    pub nodes: Vec<CfgNode>,
    pub pred: Vec<BlockId>,
    pub succ: Vec<BlockId>,
}

impl BasicBlock {
    fn add_succ(&mut self, succ: BlockId) {
        if !self.succ.contains(&succ) {
            self.succ.push(succ);
        }
    }

    fn add_pred(&mut self, pred: BlockId) {
        if !self.pred.contains(&pred) {
            self.pred.push(pred);
        }
    }
}

#[derive(Debug)]
pub struct Graph {
    /// Blocks in program order; the starting block is the first one.
    pub blocks: Vec<BasicBlock>,
    /// Predecessors of the virtual ending block.
    pub ending_preds: Vec<BlockId>,
    pub variables: Vec<CfgVar>,
    var_index: HashMap<RegId, CfgVarId>,
}

impl Graph {
    /// Partition the program's instruction stream into basic blocks and wire
    /// the control flow edges. Def/use extraction runs per node and writes
    /// inferred operand types back into the instructions.
    pub fn build(program: &mut Program) -> Result<Graph, CompileError> {
        let mut graph = Graph {
            blocks: Vec::new(),
            ending_preds: Vec::new(),
            variables: Vec::new(),
            var_index: HashMap::new(),
        };

        let mut open_block: Option<BlockId> = None;
        for id in program.instructions.ids() {
            let instr = program.instructions.get(id).unwrap();

            // Frontend scaffolding: loads with no destination register are
            // not part of the flow graph.
            if instr.opcode == crate::ir::Opcode::Load && instr.rd.is_none() {
                continue;
            }

            let starting = instr.label.is_some();
            let ending = instr.opcode.is_jump()
                || instr.opcode.is_halt_or_ret()
                || instr.opcode == crate::ir::Opcode::Jsr;

            let mut node = CfgNode::new(id);
            defuse::set_def_uses(&mut graph, program, &mut node)?;

            let block = match open_block {
                Some(block) if !starting => block,
                _ => {
                    graph.blocks.push(BasicBlock::default());
                    graph.blocks.len() - 1
                }
            };
            graph.blocks[block].nodes.push(node);
            open_block = if ending { None } else { Some(block) };
        }

        graph.wire_edges(program)?;
        Ok(graph)
    }

    fn wire_edges(&mut self, program: &Program) -> Result<(), CompileError> {
        for index in 0..self.blocks.len() {
            let last = self.blocks[index]
                .nodes
                .last()
                .ok_or(CompileError::CfgInvalidBlock)?;
            let last_instr = program
                .instructions
                .get(last.instr)
                .ok_or(CompileError::CfgInvalidNode)?;
            let opcode = last_instr.opcode;

            if opcode.is_halt_or_ret() {
                self.connect(index, ENDING_BLOCK);
                continue;
            }

            if opcode.is_jump() {
                let label = match last_instr.address {
                    Some(crate::ir::Address::Label(label)) => label,
                    _ => return Err(CompileError::CfgInvalidLabel("<none>".to_string())),
                };
                let target = self.search_label(program, label).ok_or_else(|| {
                    CompileError::CfgInvalidLabel(program.labels.format(label))
                })?;
                self.connect(index, target);
            }

            if !opcode.is_unconditional_jump() {
                let fall_through = if index + 1 < self.blocks.len() {
                    index + 1
                } else {
                    ENDING_BLOCK
                };
                self.connect(index, fall_through);
            }
        }
        Ok(())
    }

    fn connect(&mut self, from: BlockId, to: BlockId) {
        if to == ENDING_BLOCK {
            self.blocks[from].add_succ(ENDING_BLOCK);
            if !self.ending_preds.contains(&from) {
                self.ending_preds.push(from);
            }
        } else {
            self.blocks[from].add_succ(to);
            self.blocks[to].add_pred(from);
        }
    }

    /// Find the block whose first instruction carries `label`.
    fn search_label(&self, program: &Program, label: crate::ir::LabelId) -> Option<BlockId> {
        for (index, block) in self.blocks.iter().enumerate() {
            let first = block.nodes.first()?;
            let instr = program.instructions.get(first.instr)?;
            if let Some(instr_label) = instr.label {
                if program.labels.labels_equal(instr_label, label) {
                    return Some(index);
                }
            }
        }
        None
    }

    /// Look up or create the dataflow variable for register `id`, merging
    /// the machine-register whitelist and the operand type into it.
    pub fn alloc_variable(
        &mut self,
        id: RegId,
        mc_whitelist: &[McRegId],
        ty: VarType,
    ) -> Result<CfgVarId, CompileError> {
        let var_id = match self.var_index.get(&id) {
            Some(&var_id) => var_id,
            None => {
                let var_id = CfgVarId(self.variables.len());
                self.variables.push(CfgVar {
                    id,
                    ty: VarType::Inferred,
                    mc_whitelist: None,
                });
                self.var_index.insert(id, var_id);
                var_id
            }
        };

        let var = &mut self.variables[var_id.0];
        if !mc_whitelist.is_empty() {
            match &mut var.mc_whitelist {
                None => var.mc_whitelist = Some(mc_whitelist.to_vec()),
                Some(existing) => {
                    existing.retain(|reg| mc_whitelist.contains(reg));
                    if existing.is_empty() {
                        return Err(CompileError::RegisterAllocationError(format!(
                            "conflicting machine register constraints on register {}",
                            id
                        )));
                    }
                }
            }
        }
        if var.ty == VarType::Inferred {
            var.ty = ty;
        }
        Ok(var_id)
    }

    pub fn var(&self, id: CfgVarId) -> &CfgVar {
        &self.variables[id.0]
    }

    pub fn is_zero_reg(&self, id: CfgVarId) -> bool {
        self.variables[id.0].id == crate::ir::REG_0
    }

    pub fn is_psw(&self, id: CfgVarId) -> bool {
        self.variables[id.0].id == VAR_PSW
    }
}
