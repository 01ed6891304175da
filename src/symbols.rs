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

use crate::errors::CompileError;
use crate::ir::{RegId, VarType};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub ty: VarType,
    /// Register currently caching the symbol's value, once assigned.
    pub location: Option<RegId>,
}

// The symbol table maps source identifiers to their type and the virtual
// register holding their value.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable {
            symbols: HashMap::new(),
        }
    }

    pub fn put(&mut self, name: &str, ty: VarType) -> Result<(), CompileError> {
        if self.symbols.contains_key(name) {
            return Err(CompileError::SymbolTableError(name.to_string()));
        }
        self.symbols.insert(name.to_string(), Symbol { ty, location: None });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn type_of(&self, name: &str) -> Option<VarType> {
        self.symbols.get(name).map(|sym| sym.ty)
    }

    pub fn location_of(&self, name: &str) -> Option<RegId> {
        self.symbols.get(name)?.location
    }

    pub fn set_location(&mut self, name: &str, location: RegId) -> Result<(), CompileError> {
        match self.symbols.get_mut(name) {
            Some(sym) => {
                sym.location = Some(location);
                Ok(())
            }
            None => Err(CompileError::SymbolTableError(name.to_string())),
        }
    }

    /// Reverse lookup: which symbol is cached in `location`?
    pub fn id_from_location(&self, location: RegId) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, sym)| sym.location == Some(location))
            .map(|(name, _)| name.as_str())
    }
}
