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

//! Linear-scan register allocation over the live intervals of the control
//! flow graph, honoring per-interval machine-register whitelists.

pub mod materialize;

use crate::cflow::Graph;
use crate::errors::CompileError;
use crate::ir::{McRegId, RegId};
use crate::target::TargetInfo;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Reg(McRegId),
    Spill,
}

/// Range of instruction numbers (in traversal order) during which a
/// variable must live in a register.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveInterval {
    pub var_id: RegId,
    /// Allowed machine registers in preference order. Empty until the
    /// constraint initialization pass runs.
    pub mc_constraints: Vec<McRegId>,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug)]
pub struct RegAllocator {
    /// Number of allocatable registers; the registers above this are
    /// reserved as spill scratches.
    reg_num: i32,
    /// Intervals sorted by start point.
    pub intervals: Vec<LiveInterval>,
    pub bindings: HashMap<RegId, Binding>,
    free_registers: Vec<McRegId>,
}

impl RegAllocator {
    /// Build the allocator state from a graph with liveness information.
    pub fn new(graph: &Graph, target: &TargetInfo) -> Result<RegAllocator, CompileError> {
        let reg_num = target.allocatable_registers();
        let mut allocator = RegAllocator {
            reg_num,
            intervals: compute_live_intervals(graph),
            bindings: HashMap::new(),
            free_registers: (1..=reg_num).collect(),
        };
        allocator.initialize_register_constraints()?;
        Ok(allocator)
    }

    pub fn allocatable_registers(&self) -> i32 {
        self.reg_num
    }

    /// Give every unconstrained interval its whitelist: all allocatable
    /// registers, minus the whitelists of overlapping pre-constrained
    /// intervals (they are simultaneously live and cannot share), and
    /// reordered to prefer the registers of intervals starting exactly where
    /// this one ends (a use-then-define pattern which may share).
    fn initialize_register_constraints(&mut self) -> Result<(), CompileError> {
        let all_registers: Vec<McRegId> = (1..=self.reg_num).collect();

        for index in 0..self.intervals.len() {
            if !self.intervals[index].mc_constraints.is_empty() {
                continue;
            }
            let mut constraints = all_registers.clone();
            let end = self.intervals[index].end;

            for other in self.intervals[index + 1..].iter() {
                if other.start > end {
                    break;
                }
                if other.mc_constraints.is_empty() {
                    continue;
                }
                if other.start == end {
                    optimize_register_set(&mut constraints, &other.mc_constraints);
                } else {
                    constraints.retain(|reg| !other.mc_constraints.contains(reg));
                }
            }

            if constraints.is_empty() {
                return Err(CompileError::RegisterAllocationError(format!(
                    "no machine register left for register {}",
                    self.intervals[index].var_id
                )));
            }
            self.intervals[index].mc_constraints = constraints;
        }
        Ok(())
    }

    /// Walk the intervals in start order, expiring finished ones and
    /// assigning the first free whitelisted register; spill when none is
    /// available.
    pub fn execute_linear_scan(&mut self) -> Result<(), CompileError> {
        // Active intervals, as indices sorted by end point.
        let mut active: Vec<usize> = Vec::new();

        for current in 0..self.intervals.len() {
            self.expire_old_intervals(&mut active, current);

            match self.assign_register(current) {
                Some(reg) => {
                    self.bindings
                        .insert(self.intervals[current].var_id, Binding::Reg(reg));
                    insert_by_end(&mut active, current, &self.intervals);
                }
                None => self.spill_at_interval(&mut active, current),
            }
        }
        Ok(())
    }

    /// Remove from the active set every interval ending before the current
    /// one starts, returning its register to the free pool. An interval
    /// ending exactly at the current start is a use-then-define pattern:
    /// the current interval's whitelist is first reordered to prefer the
    /// register about to be freed.
    fn expire_old_intervals(&mut self, active: &mut Vec<usize>, current: usize) {
        let start = self.intervals[current].start;
        while let Some(&oldest) = active.first() {
            if self.intervals[oldest].end > start {
                return;
            }

            if self.intervals[oldest].end == start {
                if let Some(Binding::Reg(reg)) =
                    self.bindings.get(&self.intervals[oldest].var_id).copied()
                {
                    let preferred = [reg];
                    let mut constraints =
                        std::mem::take(&mut self.intervals[current].mc_constraints);
                    optimize_register_set(&mut constraints, &preferred);
                    self.intervals[current].mc_constraints = constraints;
                }
            }

            active.remove(0);
            if let Some(Binding::Reg(reg)) =
                self.bindings.get(&self.intervals[oldest].var_id).copied()
            {
                self.free_registers.insert(0, reg);
            }
        }
    }

    /// First free register of the interval's whitelist, in whitelist order.
    fn assign_register(&mut self, current: usize) -> Option<McRegId> {
        for &reg in &self.intervals[current].mc_constraints {
            if let Some(pos) = self.free_registers.iter().position(|free| *free == reg) {
                self.free_registers.remove(pos);
                return Some(reg);
            }
        }
        None
    }

    /// All registers are busy: spill the interval with the latest end point.
    /// When that is an active interval whose register the current one may
    /// use, steal the register and spill the active interval instead.
    fn spill_at_interval(&mut self, active: &mut Vec<usize>, current: usize) {
        let current_var = self.intervals[current].var_id;

        if let Some(&last) = active.last() {
            let last_var = self.intervals[last].var_id;
            if self.intervals[last].end > self.intervals[current].end {
                if let Some(Binding::Reg(reg)) = self.bindings.get(&last_var).copied() {
                    if self.intervals[current].mc_constraints.contains(&reg) {
                        self.bindings.insert(current_var, Binding::Reg(reg));
                        self.bindings.insert(last_var, Binding::Spill);
                        active.pop();
                        insert_by_end(active, current, &self.intervals);
                        return;
                    }
                }
            }
        }

        self.bindings.insert(current_var, Binding::Spill);
    }

    pub fn binding_of(&self, var_id: RegId) -> Option<Binding> {
        self.bindings.get(&var_id).copied()
    }
}

fn insert_by_end(active: &mut Vec<usize>, interval: usize, intervals: &[LiveInterval]) {
    let end = intervals[interval].end;
    let pos = active
        .iter()
        .position(|&other| intervals[other].end > end)
        .unwrap_or(active.len());
    active.insert(pos, interval);
}

/// Move the registers of `preferred` to the front of `set`, keeping the
/// relative order of the rest.
fn optimize_register_set(set: &mut Vec<McRegId>, preferred: &[McRegId]) {
    for &reg in preferred {
        if let Some(pos) = set.iter().position(|r| *r == reg) {
            set.remove(pos);
            set.insert(0, reg);
        }
    }
}

/// Number the nodes linearly in traversal order and extend each variable's
/// interval over every position where it is live in, live out or defined.
/// The zero register and the PSW get no interval.
fn compute_live_intervals(graph: &Graph) -> Vec<LiveInterval> {
    let mut order: Vec<RegId> = Vec::new();
    let mut by_var: HashMap<RegId, LiveInterval> = HashMap::new();
    let mut counter = 0usize;

    for block in &graph.blocks {
        for node in &block.nodes {
            let live = node
                .live_in
                .iter()
                .chain(node.live_out.iter())
                .copied()
                .chain(node.defs.iter().flatten().copied());
            for var in live {
                let cfg_var = graph.var(var);
                if cfg_var.id == crate::ir::REG_0 || cfg_var.id == crate::cflow::VAR_PSW {
                    continue;
                }
                by_var
                    .entry(cfg_var.id)
                    .and_modify(|interval| {
                        interval.start = interval.start.min(counter);
                        interval.end = interval.end.max(counter);
                    })
                    .or_insert_with(|| {
                        order.push(cfg_var.id);
                        LiveInterval {
                            var_id: cfg_var.id,
                            mc_constraints: cfg_var.mc_whitelist.clone().unwrap_or_default(),
                            start: counter,
                            end: counter,
                        }
                    });
            }
            counter += 1;
        }
    }

    let mut intervals: Vec<LiveInterval> = order
        .into_iter()
        .map(|var| by_var.remove(&var).unwrap())
        .collect();
    intervals.sort_by_key(|interval| interval.start);
    intervals
}
