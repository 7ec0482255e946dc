//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Symbol table for the occ C compiler
//
// Symbols live in a session-long arena addressed by SymId; scope exit
// only pops visibility, never frees. Two independent namespaces per
// scope frame: ordinary identifiers and struct/union/enum tags.
//

use crate::diag::{CResult, CompileError, Position};
use crate::types::TypeId;

/// Nesting limit for scope frames.
const MAX_SCOPES: usize = 1024;

// ============================================================================
// Symbols
// ============================================================================

/// Handle into the symbol arena. Stable for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Declared but not defined here
    Extern,
    /// Defined with external linkage
    Global,
    /// Defined with internal linkage
    Static,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymKind {
    /// Block-scope object backed by a stack slot. `addr` is the virtual
    /// register holding the slot address; `param` is the zero-based
    /// parameter index when the object is a function parameter.
    Local { addr: u32, param: Option<u32> },
    /// File-scope object or function. Static definitions get a fresh
    /// private link name; everything else links under its own name.
    Global { linkage: Linkage, link_name: String },
    /// Name bound to a type by typedef
    Typedef,
    /// Enumeration constant with its value
    EnumConst { value: i64 },
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub pos: Position,
    pub name: String,
    pub typ: TypeId,
    pub kind: SymKind,
    /// For functions and initialized objects: a definition has been seen
    pub defined: bool,
}

impl Symbol {
    pub fn is_global(&self) -> bool {
        matches!(self.kind, SymKind::Global { .. })
    }

    pub fn linkage(&self) -> Option<Linkage> {
        match self.kind {
            SymKind::Global { linkage, .. } => Some(linkage),
            _ => None,
        }
    }

    pub fn link_name(&self) -> &str {
        match &self.kind {
            SymKind::Global { link_name, .. } => link_name,
            _ => panic!("internal error: link name of non-global symbol"),
        }
    }
}

// ============================================================================
// Scopes
// ============================================================================

struct Frame {
    syms: Vec<SymId>,
    tags: Vec<(String, TypeId)>,
}

/// Scope stack over the symbol arena. Construction opens the file scope;
/// it is never popped.
pub struct Scopes {
    arena: Vec<Symbol>,
    frames: Vec<Frame>,
}

impl Scopes {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            frames: vec![Frame {
                syms: Vec::new(),
                tags: Vec::new(),
            }],
        }
    }

    pub fn push(&mut self, pos: Position) -> CResult<()> {
        if self.frames.len() >= MAX_SCOPES {
            return Err(CompileError::decl(pos, "too many nested scopes"));
        }
        self.frames.push(Frame {
            syms: Vec::new(),
            tags: Vec::new(),
        });
        Ok(())
    }

    pub fn pop(&mut self) {
        if self.frames.len() <= 1 {
            panic!("internal error: scope underflow");
        }
        self.frames.pop();
    }

    pub fn at_file_scope(&self) -> bool {
        self.frames.len() == 1
    }

    pub fn get(&self, id: SymId) -> &Symbol {
        &self.arena[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymId) -> &mut Symbol {
        &mut self.arena[id.0 as usize]
    }

    /// Install a symbol in the innermost scope. Redeclaration policy is
    /// the caller's business; this never rejects a duplicate name.
    pub fn define(&mut self, sym: Symbol) -> SymId {
        let id = SymId(self.arena.len() as u32);
        self.arena.push(sym);
        self.frames
            .last_mut()
            .expect("internal error: no scope frame")
            .syms
            .push(id);
        id
    }

    /// Look up an ordinary identifier, innermost scope outward.
    pub fn lookup(&self, name: &str) -> Option<SymId> {
        for frame in self.frames.iter().rev() {
            for &id in frame.syms.iter().rev() {
                if self.arena[id.0 as usize].name == name {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Look up an ordinary identifier in the innermost scope only.
    pub fn lookup_innermost(&self, name: &str) -> Option<SymId> {
        let frame = self.frames.last()?;
        for &id in frame.syms.iter().rev() {
            if self.arena[id.0 as usize].name == name {
                return Some(id);
            }
        }
        None
    }

    /// Install a tag binding in the innermost scope.
    pub fn define_tag(&mut self, name: String, typ: TypeId) {
        self.frames
            .last_mut()
            .expect("internal error: no scope frame")
            .tags
            .push((name, typ));
    }

    /// Look up a tag, innermost scope outward.
    pub fn lookup_tag(&self, name: &str) -> Option<TypeId> {
        for frame in self.frames.iter().rev() {
            for (n, t) in frame.tags.iter().rev() {
                if n == name {
                    return Some(*t);
                }
            }
        }
        None
    }

    /// Look up a tag in the innermost scope only.
    pub fn lookup_tag_innermost(&self, name: &str) -> Option<TypeId> {
        let frame = self.frames.last()?;
        for (n, t) in frame.tags.iter().rev() {
            if n == name {
                return Some(*t);
            }
        }
        None
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeTable;

    fn sym(name: &str, typ: TypeId) -> Symbol {
        Symbol {
            pos: Position::new(1, 1),
            name: name.to_string(),
            typ,
            kind: SymKind::Global {
                linkage: Linkage::Global,
                link_name: name.to_string(),
            },
            defined: false,
        }
    }

    #[test]
    fn test_define_and_lookup() {
        let t = TypeTable::new();
        let mut s = Scopes::new();
        let id = s.define(sym("x", t.int_id));
        assert_eq!(s.lookup("x"), Some(id));
        assert_eq!(s.lookup("y"), None);
    }

    #[test]
    fn test_shadowing_and_pop() {
        let t = TypeTable::new();
        let mut s = Scopes::new();
        let outer = s.define(sym("x", t.int_id));
        s.push(Position::default()).unwrap();
        let inner = s.define(sym("x", t.char_id));
        assert_eq!(s.lookup("x"), Some(inner));
        s.pop();
        assert_eq!(s.lookup("x"), Some(outer));
        // The shadowed symbol is still readable through its id
        assert_eq!(s.get(inner).typ, t.char_id);
    }

    #[test]
    fn test_innermost_only() {
        let t = TypeTable::new();
        let mut s = Scopes::new();
        s.define(sym("x", t.int_id));
        s.push(Position::default()).unwrap();
        assert_eq!(s.lookup_innermost("x"), None);
        assert!(s.lookup("x").is_some());
    }

    #[test]
    fn test_tag_namespace_independent() {
        let t = TypeTable::new();
        let mut s = Scopes::new();
        s.define(sym("node", t.int_id));
        s.define_tag("node".to_string(), t.char_id);
        // Same name resolves differently per namespace
        assert!(s.lookup("node").is_some());
        assert_eq!(s.lookup_tag("node"), Some(t.char_id));
        assert_eq!(s.lookup_tag("other"), None);
    }

    #[test]
    fn test_tag_scoping() {
        let t = TypeTable::new();
        let mut s = Scopes::new();
        s.define_tag("a".to_string(), t.int_id);
        s.push(Position::default()).unwrap();
        s.define_tag("a".to_string(), t.long_id);
        assert_eq!(s.lookup_tag("a"), Some(t.long_id));
        assert_eq!(s.lookup_tag_innermost("a"), Some(t.long_id));
        s.pop();
        assert_eq!(s.lookup_tag("a"), Some(t.int_id));
    }

    #[test]
    fn test_scope_depth_limit() {
        let mut s = Scopes::new();
        for _ in 0..1023 {
            s.push(Position::default()).unwrap();
        }
        assert!(s.push(Position::default()).is_err());
    }

    #[test]
    #[should_panic(expected = "internal error")]
    fn test_pop_file_scope_panics() {
        let mut s = Scopes::new();
        s.pop();
    }
}
