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

//! The x86-64 target: NASM output, System-V ABI, two-address instructions.

pub mod asm_print;
pub mod transform;

use crate::ir::McRegId;
use crate::target::TargetInfo;

pub const R_EAX: McRegId = 1;
/// callee-save
pub const R_EBX: McRegId = 2;
pub const R_ECX: McRegId = 3;
pub const R_EDX: McRegId = 4;
pub const R_ESI: McRegId = 5;
pub const R_EDI: McRegId = 6;
pub const R_R8D: McRegId = 7;
pub const R_R9D: McRegId = 8;
pub const R_R10D: McRegId = 9;
pub const R_R11D: McRegId = 10;
/// callee-save
pub const R_R12D: McRegId = 11;
/// callee-save
pub const R_R13D: McRegId = 12;
/// callee-save
pub const R_R14D: McRegId = 13;
/// callee-save
pub const R_R15D: McRegId = 14;

/// Registers a C-ABI call may clobber, the return register first.
pub const CALLER_SAVED: [McRegId; 9] = [
    R_EAX, R_ECX, R_EDX, R_ESI, R_EDI, R_R8D, R_R9D, R_R10D, R_R11D,
];

pub const TARGET_INFO: TargetInfo = TargetInfo {
    name: "x86_64",
    num_registers: 14,
    num_spill_regs: 2,
    ptr_granularity: 1,
};
