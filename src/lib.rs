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

pub mod cflow;
pub mod errors;
pub mod front;
pub mod ir;
pub mod regalloc;
pub mod symbols;
pub mod target;

use anyhow::{Context, Result};
use errors::Warning;
pub use target::TargetKind;

extern crate pest;
extern crate pest_derive;

pub struct CompileOutput {
    pub assembly: String,
    pub warnings: Vec<Warning>,
}

/// Compile a Lance source program down to assembly text for `target`.
pub fn compile(source: &str, target: TargetKind) -> Result<CompileOutput> {
    let info = target.info();

    let ast = front::parse_source(source).context("Failed during parsing stage")?;

    let mut program = front::codegen::generate_program(&ast, info)
        .context("Failed during IR generation")?;

    target
        .transform_program(&mut program)
        .context("Failed during target-specific lowering")?;

    let mut graph =
        cflow::Graph::build(&mut program).context("Failed while building the control flow graph")?;
    cflow::liveness::perform_liveness_analysis(&mut graph);

    let mut allocator = regalloc::RegAllocator::new(&graph, info)
        .context("Failed while preparing register allocation")?;
    allocator
        .execute_linear_scan()
        .context("Failed during register allocation")?;

    regalloc::materialize::materialize_register_allocation(&mut program, &allocator, info)
        .context("Failed while materializing spilled registers")?;

    let mut buffer = Vec::new();
    target
        .write_assembly(&program, &mut buffer)
        .context("Failed while emitting assembly")?;
    let assembly =
        String::from_utf8(buffer).context("Failed while emitting assembly")?;

    Ok(CompileOutput {
        assembly,
        warnings: program.warnings,
    })
}
