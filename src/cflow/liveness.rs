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

//! Backward liveness analysis, iterated to a fixed point.
//!
//! Sets only ever grow during an iteration, so termination follows from the
//! finite variable universe. With `CFLOW_ALWAYS_LIVEIN_R0` the zero register
//! is modeled as live everywhere by keeping it out of every set.

use crate::cflow::{BasicBlock, CFLOW_ALWAYS_LIVEIN_R0, CfgVar, CfgVarId, ENDING_BLOCK, Graph};
use std::collections::BTreeSet;

pub fn perform_liveness_analysis(graph: &mut Graph) {
    while liveness_iteration(graph) {}
}

/// Returns the variables live out of `block`: the union of the live-in sets
/// of its successors (the virtual ending block contributes nothing).
fn compute_live_out(graph: &Graph, block: usize) -> BTreeSet<CfgVarId> {
    let mut result = BTreeSet::new();
    for &succ in &graph.blocks[block].succ {
        if succ == ENDING_BLOCK {
            continue;
        }
        if let Some(first) = graph.blocks[succ].nodes.first() {
            result.extend(first.live_in.iter().copied());
        }
    }
    result
}

fn liveness_iteration(graph: &mut Graph) -> bool {
    let mut modified = false;
    for block in (0..graph.blocks.len()).rev() {
        let out = compute_live_out(graph, block);
        if liveness_on_block(&mut graph.blocks[block], &graph.variables, out) {
            modified = true;
        }
    }
    modified
}

fn liveness_on_block(
    block: &mut BasicBlock,
    variables: &[CfgVar],
    block_out: BTreeSet<CfgVarId>,
) -> bool {
    let mut modified = false;
    let mut incoming = block_out;

    for node in block.nodes.iter_mut().rev() {
        for var in &incoming {
            if node.live_out.insert(*var) {
                modified = true;
            }
        }

        let mut live_in = node.live_out.clone();
        for use_var in node.uses.iter().flatten() {
            if CFLOW_ALWAYS_LIVEIN_R0 && variables[use_var.0].id == crate::ir::REG_0 {
                continue;
            }
            live_in.insert(*use_var);
        }
        for def_var in node.defs.iter().flatten() {
            if CFLOW_ALWAYS_LIVEIN_R0 && variables[def_var.0].id == crate::ir::REG_0 {
                continue;
            }
            // A register both read and written by the instruction stays
            // live across it.
            let also_used = node.uses.iter().flatten().any(|u| u == def_var);
            if !also_used {
                live_in.remove(def_var);
            }
        }

        for var in &live_in {
            if node.live_in.insert(*var) {
                modified = true;
            }
        }
        incoming = node.live_in.clone();
    }

    modified
}
