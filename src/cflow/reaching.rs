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

//! Reaching definitions, restricted to the uses of a single node: which
//! definitions can deliver the values this node reads?
//!
//! The walk goes backward from the node through its block and the
//! predecessor chain. Each predecessor path works on its own copy of the
//! not-yet-reached set, while visited blocks are shared globally, so a block
//! is scanned at most once.

use crate::cflow::{BlockId, CfgVarId, Graph};
use std::collections::{BTreeSet, HashSet};

/// One reaching definition: the defining node and the variable it defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachingDef {
    pub block: BlockId,
    pub node: usize,
    pub var: CfgVarId,
}

/// Definitions reaching the uses of node `node` of block `block`.
pub fn reaching_definitions_of_node(
    graph: &Graph,
    block: BlockId,
    node: usize,
) -> Vec<ReachingDef> {
    let mut not_reached: BTreeSet<CfgVarId> = graph.blocks[block].nodes[node]
        .uses
        .iter()
        .flatten()
        .copied()
        .collect();
    let mut result = Vec::new();
    let mut visited = HashSet::new();

    scan_block(
        graph,
        block,
        node.checked_sub(1),
        &mut not_reached,
        &mut result,
        &mut visited,
    );
    result
}

fn scan_block(
    graph: &Graph,
    block: BlockId,
    start: Option<usize>,
    not_reached: &mut BTreeSet<CfgVarId>,
    result: &mut Vec<ReachingDef>,
    visited: &mut HashSet<BlockId>,
) {
    if visited.contains(&block) {
        return;
    }

    if let Some(start) = start {
        for index in (0..=start).rev() {
            if not_reached.is_empty() {
                break;
            }
            let node = &graph.blocks[block].nodes[index];
            for def in node.defs.iter().flatten() {
                if not_reached.remove(def) {
                    result.push(ReachingDef {
                        block,
                        node: index,
                        var: *def,
                    });
                }
            }
        }
    }

    visited.insert(block);
    if not_reached.is_empty() {
        return;
    }

    for &pred in &graph.blocks[block].pred {
        let mut not_reached_here = not_reached.clone();
        let last = graph.blocks[pred].nodes.len().checked_sub(1);
        scan_block(graph, pred, last, &mut not_reached_here, result, visited);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Address, Program, REG_0};

    #[test]
    fn test_definition_found_in_same_block() {
        let mut program = Program::new();
        let r = program.new_register();
        program.gen_addi(r, REG_0, 1);
        program.gen_write(r);
        program.gen_halt();
        let mut graph = Graph::build(&mut program).unwrap();
        crate::cflow::liveness::perform_liveness_analysis(&mut graph);

        let defs = reaching_definitions_of_node(&graph, 0, 1);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].block, 0);
        assert_eq!(defs[0].node, 0);
        assert_eq!(graph.var(defs[0].var).id, r);
    }

    #[test]
    fn test_definitions_reach_across_blocks_and_loops() {
        // i = 0; loop: i = i - 1; sub t, i, limit; blt loop; write i; halt
        let mut program = Program::new();
        let i = program.new_register();
        let limit = program.new_register();
        program.gen_addi(i, REG_0, 0);
        let loop_label = program.assign_new_label().unwrap();
        program.gen_subi(i, i, 1);
        let t = program.new_register();
        program.gen_sub(t, i, limit, crate::ir::CG_DIRECT_ALL);
        program.gen_blt(Address::Label(loop_label));
        program.gen_write(i);
        program.gen_halt();

        let mut graph = Graph::build(&mut program).unwrap();
        crate::cflow::liveness::perform_liveness_analysis(&mut graph);

        // write(i) is the first node of block 2; the nearest definition of i
        // (the subi inside the loop) shadows the initial one.
        let defs = reaching_definitions_of_node(&graph, 2, 0);
        let positions: Vec<(usize, usize)> = defs.iter().map(|d| (d.block, d.node)).collect();
        assert_eq!(positions, vec![(1, 0)]);

        // The branch uses the psw, defined by the sub right before it.
        let defs = reaching_definitions_of_node(&graph, 1, 2);
        assert_eq!(defs.len(), 1);
        assert_eq!((defs[0].block, defs[0].node), (1, 1));
        assert!(graph.is_psw(defs[0].var));

        // The sub reads i (defined one node up) and limit (never defined):
        // only the definition of i is reported.
        let defs = reaching_definitions_of_node(&graph, 1, 1);
        let positions: Vec<(usize, usize)> = defs.iter().map(|d| (d.block, d.node)).collect();
        assert_eq!(positions, vec![(1, 0)]);
        let _ = limit;
    }
}
