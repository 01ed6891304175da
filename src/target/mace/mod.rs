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

//! The MACE teaching RISC machine: 31 general purpose registers, word
//! addressed memory, and a one-to-one mapping from the IR to its ISA except
//! for immediates wider than 16 bits.

pub mod asm_print;
pub mod transform;

use crate::target::TargetInfo;

pub const TARGET_INFO: TargetInfo = TargetInfo {
    name: "MACE",
    num_registers: 31,
    num_spill_regs: 3,
    ptr_granularity: 4,
};
