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

pub mod amd64;
pub mod mace;

use crate::errors::CompileError;
use crate::ir::Program;
use std::io::Write;

/// Properties of a target machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    pub name: &'static str,
    /// Number of machine registers, the zero register excluded.
    pub num_registers: i32,
    /// Registers reserved for spilled temporaries; equals the maximum
    /// number of unique register operands of a single instruction.
    pub num_spill_regs: i32,
    /// Bytes per memory address step.
    pub ptr_granularity: i32,
}

impl TargetInfo {
    /// Machine registers available to the allocator (`1..=this`); the ones
    /// above are the spill scratches.
    pub fn allocatable_registers(&self) -> i32 {
        self.num_registers - self.num_spill_regs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TargetKind {
    #[default]
    Amd64,
    Mace,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TargetKind::Amd64 => "amd64",
            TargetKind::Mace => "mace",
        })
    }
}

impl TargetKind {
    pub fn info(self) -> &'static TargetInfo {
        match self {
            TargetKind::Mace => &mace::TARGET_INFO,
            TargetKind::Amd64 => &amd64::TARGET_INFO,
        }
    }

    /// Lower the program to the subset of the IR this target can encode and
    /// insert its register allocation constraints.
    pub fn transform_program(self, program: &mut Program) -> Result<(), CompileError> {
        match self {
            TargetKind::Mace => mace::transform::do_target_specific_transformations(program),
            TargetKind::Amd64 => amd64::transform::do_target_specific_transformations(program),
        }
    }

    /// Emit the final assembly text.
    pub fn write_assembly(
        self,
        program: &Program,
        output: &mut dyn Write,
    ) -> Result<(), CompileError> {
        match self {
            TargetKind::Mace => mace::asm_print::write_assembly(program, output),
            TargetKind::Amd64 => amd64::asm_print::write_assembly(program, output),
        }
    }
}
