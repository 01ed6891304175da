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

pub mod gencode;
pub mod instruction;
pub mod labels;
pub mod list;
pub mod opcode;
pub mod program;

pub use gencode::{CG_DIRECT_ALL, CG_INDIRECT_DEST, CG_INDIRECT_SOURCE, CgFlags};
pub use instruction::{
    Address, DataDirective, DirectiveKind, Instruction, McRegId, MoveSource, REG_0, RegId,
    RegisterOp, VarType, Variable,
};
pub use labels::{LabelId, LabelManager};
pub use list::{ArenaList, NodeId};
pub use opcode::Opcode;
pub use program::Program;
