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
use std::collections::HashMap;

/// Identifier of a label. Equality of labels is equality of their resolved
/// identifiers; identifier 0 is reserved and never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

/// Allocates label identifiers and tracks their names, aliases and the
/// pending label waiting to be attached to the next appended instruction.
///
/// A label is *reserved* when allocated and *attached* once it has been
/// bound to an instruction. Attaching a second label to the same point does
/// not produce two labels: the second becomes an alias of the first, and the
/// surviving name is picked by `attach`.
#[derive(Debug, Default)]
pub struct LabelManager {
    next_id: u32,
    names: HashMap<u32, String>,
    aliases: HashMap<u32, u32>,
    pending: Option<LabelId>,
}

impl LabelManager {
    pub fn new() -> LabelManager {
        LabelManager {
            next_id: 1,
            names: HashMap::new(),
            aliases: HashMap::new(),
            pending: None,
        }
    }

    /// Reserve a fresh label identifier.
    pub fn reserve(&mut self) -> LabelId {
        let id = LabelId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Reserve a fresh label and give it a (disambiguated) name.
    pub fn reserve_named(&mut self, name: &str) -> LabelId {
        let label = self.reserve();
        self.set_name(label, name);
        label
    }

    /// Follow alias links down to the canonical identifier.
    pub fn resolve(&self, label: LabelId) -> LabelId {
        let mut id = label.0;
        while let Some(&target) = self.aliases.get(&id) {
            id = target;
        }
        LabelId(id)
    }

    pub fn labels_equal(&self, a: LabelId, b: LabelId) -> bool {
        self.resolve(a) == self.resolve(b)
    }

    pub fn name_of(&self, label: LabelId) -> Option<&str> {
        self.names.get(&self.resolve(label).0).map(|s| s.as_str())
    }

    /// Printable form of a label: its name when it has one, else `L<id>`.
    pub fn format(&self, label: LabelId) -> String {
        let canonical = self.resolve(label);
        match self.names.get(&canonical.0) {
            Some(name) => name.clone(),
            None => format!("L{}", canonical.0),
        }
    }

    /// Enqueue `label` for attachment to the next appended instruction.
    ///
    /// If another label is already waiting there, `label` is turned into an
    /// alias of it: both end up with the same identifier and name. The name
    /// is chosen by "a name wins over nameless; on tie, the smaller
    /// identifier wins". Returns the surviving label.
    pub fn attach(&mut self, label: LabelId) -> Result<LabelId, CompileError> {
        if label.0 == 0 || label.0 >= self.next_id {
            return Err(CompileError::InvalidLabel);
        }

        let label = self.resolve(label);
        let pending = match self.pending {
            None => {
                self.pending = Some(label);
                return Ok(label);
            }
            Some(p) => self.resolve(p),
        };
        if pending == label {
            return Ok(pending);
        }

        let pending_name = self.names.get(&pending.0).cloned();
        let label_name = self.names.get(&label.0).cloned();
        let surviving_name = match (pending_name, label_name) {
            (Some(name), None) => Some(name),
            (None, Some(name)) => Some(name),
            (pending_name, label_name) => {
                if label < pending {
                    label_name
                } else {
                    pending_name
                }
            }
        };

        self.aliases.insert(label.0, pending.0);
        self.names.remove(&label.0);
        match surviving_name {
            Some(name) => {
                self.names.insert(pending.0, name);
            }
            None => {
                self.names.remove(&pending.0);
            }
        }
        Ok(pending)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Remove and return the label waiting for the next instruction.
    pub fn take_pending(&mut self) -> Option<LabelId> {
        self.pending.take()
    }

    /// Name a label. The name is sanitized to `[A-Za-z0-9_]`, prefixed with
    /// an underscore, and a `_N` suffix is appended until it is unique among
    /// all named labels.
    pub fn set_name(&mut self, label: LabelId, name: &str) {
        let canonical = self.resolve(label);
        let sanitized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();

        let mut candidate = format!("_{}", sanitized);
        let mut serial = 0;
        while self
            .names
            .iter()
            .any(|(id, n)| *id != canonical.0 && *n == candidate)
        {
            candidate = format!("_{}_{}", sanitized, serial);
            serial += 1;
        }
        self.names.insert(canonical.0, candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_is_unique() {
        let mut manager = LabelManager::new();
        let a = manager.reserve();
        let b = manager.reserve();
        assert_ne!(a, b);
        assert!(a.0 > 0);
    }

    #[test]
    fn test_attach_aliases_second_label() {
        let mut manager = LabelManager::new();
        let a = manager.reserve();
        let b = manager.reserve();
        assert_eq!(manager.attach(a).unwrap(), a);
        assert_eq!(manager.attach(b).unwrap(), a);
        assert!(manager.labels_equal(a, b));
        assert_eq!(manager.resolve(b), a);
    }

    #[test]
    fn test_alias_name_resolution() {
        // A name wins over nameless.
        let mut manager = LabelManager::new();
        let a = manager.reserve();
        let b = manager.reserve_named("loop");
        manager.attach(a).unwrap();
        manager.attach(b).unwrap();
        assert_eq!(manager.name_of(a), Some("_loop"));

        // On a name tie the smaller identifier wins.
        let mut manager = LabelManager::new();
        let a = manager.reserve_named("first");
        let b = manager.reserve_named("second");
        manager.attach(b).unwrap();
        manager.attach(a).unwrap();
        assert_eq!(manager.name_of(b), Some("_first"));
        assert_eq!(manager.format(a), "_first");
    }

    #[test]
    fn test_name_sanitizing_and_disambiguation() {
        let mut manager = LabelManager::new();
        let a = manager.reserve_named("my label!");
        assert_eq!(manager.name_of(a), Some("_mylabel"));
        let b = manager.reserve_named("mylabel");
        assert_eq!(manager.name_of(b), Some("_mylabel_0"));
        let c = manager.reserve_named("mylabel");
        assert_eq!(manager.name_of(c), Some("_mylabel_1"));
    }

    #[test]
    fn test_attach_rejects_unknown_label() {
        let mut manager = LabelManager::new();
        assert_eq!(
            manager.attach(LabelId(7)),
            Err(CompileError::InvalidLabel)
        );
    }

    #[test]
    fn test_unnamed_label_formats_by_id() {
        let mut manager = LabelManager::new();
        let a = manager.reserve();
        assert_eq!(manager.format(a), format!("L{}", a.0));
    }

    #[test]
    fn test_pending_label_is_taken_once() {
        let mut manager = LabelManager::new();
        let a = manager.reserve();
        manager.attach(a).unwrap();
        assert!(manager.has_pending());
        assert_eq!(manager.take_pending(), Some(a));
        assert_eq!(manager.take_pending(), None);
    }

    #[test]
    fn test_alias_chain_resolves_transitively() {
        let mut manager = LabelManager::new();
        let a = manager.reserve();
        let b = manager.reserve();
        let c = manager.reserve();
        manager.attach(a).unwrap();
        manager.attach(b).unwrap();
        // A new attachment point: `a` is pending no more.
        manager.take_pending();
        manager.attach(c).unwrap();
        manager.attach(b).unwrap();
        // b ~ a and then c absorbed b's class representative.
        assert!(manager.labels_equal(a, b));
        assert!(manager.labels_equal(b, c));
        assert_eq!(manager.resolve(b), manager.resolve(c));
    }

    #[test]
    fn test_label_identifiers_stay_unique_after_aliasing() {
        let mut manager = LabelManager::new();
        let labels: Vec<LabelId> = (0..4).map(|_| manager.reserve()).collect();
        manager.attach(labels[0]).unwrap();
        manager.attach(labels[1]).unwrap();
        for (index, a) in labels.iter().enumerate() {
            for b in labels.iter().skip(index + 1) {
                let (ra, rb) = (manager.resolve(*a), manager.resolve(*b));
                // Either distinct classes or the same canonical pair.
                assert!(ra != rb || manager.name_of(*a) == manager.name_of(*b));
            }
        }
    }
}
