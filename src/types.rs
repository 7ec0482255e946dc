//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Type system for the occ C compiler
//
// All types live in one arena addressed by TypeId. Struct/union/enum tags
// are nominal: a forward declaration allocates an arena slot marked
// incomplete, and parsing the body later overwrites that same slot, so
// every TypeId handed out before completion observes the finished layout.
// Pointer/array/function types are compared structurally.
//

use crate::symbol::SymId;

// ============================================================================
// Type ID
// ============================================================================

/// Handle into the type arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

// ============================================================================
// Primitive Kinds
// ============================================================================

/// Primitive (arithmetic) type kinds, LP64 model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimKind {
    Char,
    Short,
    Int,
    Long,
    LongLong,
    Float,
    Double,
    LongDouble,
}

impl PrimKind {
    pub fn size(&self) -> usize {
        match self {
            PrimKind::Char => 1,
            PrimKind::Short => 2,
            PrimKind::Int | PrimKind::Float => 4,
            PrimKind::Long | PrimKind::LongLong | PrimKind::Double => 8,
            PrimKind::LongDouble => 16,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            PrimKind::Float | PrimKind::Double | PrimKind::LongDouble
        )
    }

    /// Conversion rank for the usual arithmetic conversions.
    /// Total order over the arithmetic kinds; floats outrank all integers.
    pub fn rank(&self) -> u32 {
        match self {
            PrimKind::Char => 1,
            PrimKind::Short => 2,
            PrimKind::Int => 3,
            PrimKind::Long => 4,
            PrimKind::LongLong => 5,
            PrimKind::Float => 6,
            PrimKind::Double => 7,
            PrimKind::LongDouble => 8,
        }
    }
}

// ============================================================================
// Type Representation
// ============================================================================

/// A struct/union member with its computed byte offset.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub typ: TypeId,
    pub offset: usize,
}

/// A function parameter: optional name plus type.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Option<String>,
    pub typ: TypeId,
}

/// A C type.
#[derive(Debug, Clone)]
pub enum Type {
    Void,
    Prim {
        kind: PrimKind,
        signed: bool,
    },
    Ptr {
        to: TypeId,
    },
    Arr {
        elem: TypeId,
        /// None while the dimension is still unknown (incomplete)
        len: Option<usize>,
    },
    Func {
        ret: TypeId,
        params: Vec<Param>,
        variadic: bool,
    },
    Record {
        tag: Option<String>,
        is_union: bool,
        members: Vec<Member>,
        size: usize,
        align: usize,
        complete: bool,
    },
    Enum {
        tag: Option<String>,
        members: Vec<SymId>,
        complete: bool,
    },
}

// ============================================================================
// Type Table
// ============================================================================

/// Arena of all types for one compilation session, with the primitive
/// singletons pre-interned.
pub struct TypeTable {
    arena: Vec<Type>,

    pub void_id: TypeId,
    pub char_id: TypeId,
    pub uchar_id: TypeId,
    pub short_id: TypeId,
    pub ushort_id: TypeId,
    pub int_id: TypeId,
    pub uint_id: TypeId,
    pub long_id: TypeId,
    pub ulong_id: TypeId,
    pub llong_id: TypeId,
    pub ullong_id: TypeId,
    pub float_id: TypeId,
    pub double_id: TypeId,
    pub ldouble_id: TypeId,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut arena = Vec::with_capacity(64);
        let mut prim = |kind, signed| {
            let id = TypeId(arena.len() as u32);
            arena.push(Type::Prim { kind, signed });
            id
        };
        let char_id = prim(PrimKind::Char, true);
        let uchar_id = prim(PrimKind::Char, false);
        let short_id = prim(PrimKind::Short, true);
        let ushort_id = prim(PrimKind::Short, false);
        let int_id = prim(PrimKind::Int, true);
        let uint_id = prim(PrimKind::Int, false);
        let long_id = prim(PrimKind::Long, true);
        let ulong_id = prim(PrimKind::Long, false);
        let llong_id = prim(PrimKind::LongLong, true);
        let ullong_id = prim(PrimKind::LongLong, false);
        let float_id = prim(PrimKind::Float, true);
        let double_id = prim(PrimKind::Double, true);
        let ldouble_id = prim(PrimKind::LongDouble, true);
        let void_id = TypeId(arena.len() as u32);
        arena.push(Type::Void);
        Self {
            arena,
            void_id,
            char_id,
            uchar_id,
            short_id,
            ushort_id,
            int_id,
            uint_id,
            long_id,
            ulong_id,
            llong_id,
            ullong_id,
            float_id,
            double_id,
            ldouble_id,
        }
    }

    pub fn alloc(&mut self, t: Type) -> TypeId {
        let id = TypeId(self.arena.len() as u32);
        self.arena.push(t);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.arena[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.arena[id.0 as usize]
    }

    /// Overwrite an arena slot in place. Used for tag completion and the
    /// parenthesized-declarator stub, where prior references must observe
    /// the new contents.
    pub fn replace(&mut self, id: TypeId, t: Type) {
        self.arena[id.0 as usize] = t;
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn ptr_to(&mut self, to: TypeId) -> TypeId {
        self.alloc(Type::Ptr { to })
    }

    pub fn array_of(&mut self, elem: TypeId, len: Option<usize>) -> TypeId {
        self.alloc(Type::Arr { elem, len })
    }

    pub fn func(&mut self, ret: TypeId, params: Vec<Param>, variadic: bool) -> TypeId {
        self.alloc(Type::Func {
            ret,
            params,
            variadic,
        })
    }

    /// Look up the primitive singleton for a kind/signedness pair.
    pub fn prim_id(&self, kind: PrimKind, signed: bool) -> TypeId {
        match (kind, signed) {
            (PrimKind::Char, true) => self.char_id,
            (PrimKind::Char, false) => self.uchar_id,
            (PrimKind::Short, true) => self.short_id,
            (PrimKind::Short, false) => self.ushort_id,
            (PrimKind::Int, true) => self.int_id,
            (PrimKind::Int, false) => self.uint_id,
            (PrimKind::Long, true) => self.long_id,
            (PrimKind::Long, false) => self.ulong_id,
            (PrimKind::LongLong, true) => self.llong_id,
            (PrimKind::LongLong, false) => self.ullong_id,
            (PrimKind::Float, _) => self.float_id,
            (PrimKind::Double, _) => self.double_id,
            (PrimKind::LongDouble, _) => self.ldouble_id,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn is_ptr(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Ptr { .. })
    }

    pub fn is_arr(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Arr { .. })
    }

    pub fn is_func(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Func { .. })
    }

    pub fn is_func_ptr(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::Ptr { to } => self.is_func(*to),
            _ => false,
        }
    }

    pub fn is_record(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Record { .. })
    }

    /// Integer type: integer primitive or enum.
    pub fn is_itype(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::Prim { kind, .. } => !kind.is_float(),
            Type::Enum { .. } => true,
            _ => false,
        }
    }

    pub fn is_ftype(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Prim { kind, .. } if kind.is_float())
    }

    pub fn is_arith(&self, id: TypeId) -> bool {
        self.is_itype(id) || self.is_ftype(id)
    }

    pub fn is_signed(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::Prim { signed, .. } => *signed,
            Type::Enum { .. } => true,
            _ => false,
        }
    }

    /// Pointee of a pointer, element of an array.
    pub fn base_of(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Type::Ptr { to } => Some(*to),
            Type::Arr { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    pub fn return_type(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Type::Func { ret, .. } => Some(*ret),
            _ => None,
        }
    }

    /// Size in bytes, None for incomplete types (and void/function types).
    pub fn size_of(&self, id: TypeId) -> Option<usize> {
        match self.get(id) {
            Type::Void => None,
            Type::Prim { kind, .. } => Some(kind.size()),
            Type::Ptr { .. } => Some(8),
            Type::Arr { elem, len } => {
                // Overflowing dimensions make the type unusable, same
                // as any other incomplete type
                let n = (*len)?;
                self.size_of(*elem)?.checked_mul(n)
            }
            Type::Func { .. } => None,
            Type::Record { size, complete, .. } => {
                if *complete {
                    Some(*size)
                } else {
                    None
                }
            }
            Type::Enum { complete, .. } => {
                if *complete {
                    Some(4)
                } else {
                    None
                }
            }
        }
    }

    /// A type is incomplete if it cannot be instantiated as a value.
    pub fn is_incomplete(&self, id: TypeId) -> bool {
        self.size_of(id).is_none() && !self.is_func(id)
    }

    pub fn align_of(&self, id: TypeId) -> usize {
        match self.get(id) {
            Type::Void | Type::Func { .. } => 1,
            Type::Prim { kind, .. } => kind.size(),
            Type::Ptr { .. } => 8,
            Type::Arr { elem, .. } => self.align_of(*elem),
            Type::Record { align, .. } => *align,
            Type::Enum { .. } => 4,
        }
    }

    /// Rank for the usual arithmetic conversions; enum ranks as int.
    pub fn conv_rank(&self, id: TypeId) -> u32 {
        match self.get(id) {
            Type::Prim { kind, .. } => kind.rank(),
            Type::Enum { .. } => PrimKind::Int.rank(),
            _ => panic!("internal error: conv_rank of non-arithmetic type"),
        }
    }

    /// Can signed type `a` represent every value of unsigned type `b`?
    pub fn can_represent(&self, a: TypeId, b: TypeId) -> bool {
        match (self.size_of(a), self.size_of(b)) {
            (Some(sa), Some(sb)) => sa > sb,
            _ => false,
        }
    }

    /// The unsigned counterpart of an integer type's rank.
    pub fn unsigned_of(&self, id: TypeId) -> TypeId {
        match self.get(id) {
            Type::Prim { kind, .. } if !kind.is_float() => self.prim_id(*kind, false),
            Type::Enum { .. } => self.uint_id,
            _ => panic!("internal error: unsigned_of of non-integer type"),
        }
    }

    // ------------------------------------------------------------------
    // Structural identity
    // ------------------------------------------------------------------

    /// Structural type identity. Tag types are nominal: two distinct
    /// record/enum slots are never the same type.
    pub fn same_type(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (Type::Void, Type::Void) => true,
            (
                Type::Prim {
                    kind: ka,
                    signed: sa,
                },
                Type::Prim {
                    kind: kb,
                    signed: sb,
                },
            ) => ka == kb && sa == sb,
            (Type::Ptr { to: ta }, Type::Ptr { to: tb }) => self.same_type(*ta, *tb),
            (
                Type::Arr {
                    elem: ea,
                    len: la,
                },
                Type::Arr {
                    elem: eb,
                    len: lb,
                },
            ) => la == lb && self.same_type(*ea, *eb),
            (
                Type::Func {
                    ret: ra,
                    params: pa,
                    variadic: va,
                },
                Type::Func {
                    ret: rb,
                    params: pb,
                    variadic: vb,
                },
            ) => {
                va == vb
                    && pa.len() == pb.len()
                    && self.same_type(*ra, *rb)
                    && pa
                        .iter()
                        .zip(pb.iter())
                        .all(|(x, y)| self.same_type(x.typ, y.typ))
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Compute offsets for a member list and complete the record slot
    /// in place, so earlier references to the tag observe the layout.
    pub fn complete_record(&mut self, id: TypeId, mut members: Vec<Member>, is_union: bool) {
        let (size, align) = self.layout(&mut members, is_union);
        let tag = match self.get(id) {
            Type::Record { tag, .. } => tag.clone(),
            _ => panic!("internal error: completing a non-record type"),
        };
        self.replace(
            id,
            Type::Record {
                tag,
                is_union,
                members,
                size,
                align,
                complete: true,
            },
        );
    }

    /// Natural-alignment layout. Returns (size, align).
    fn layout(&self, members: &mut [Member], is_union: bool) -> (usize, usize) {
        let mut offset = 0usize;
        let mut max_align = 1usize;
        let mut max_size = 0usize;
        for m in members.iter_mut() {
            let align = self.align_of(m.typ);
            let size = self.size_of(m.typ).unwrap_or(0);
            max_align = max_align.max(align);
            if is_union {
                m.offset = 0;
                max_size = max_size.max(size);
            } else {
                offset = (offset + align - 1) & !(align - 1);
                m.offset = offset;
                offset += size;
            }
        }
        let total = if is_union { max_size } else { offset };
        let padded = if max_align > 1 {
            (total + max_align - 1) & !(max_align - 1)
        } else {
            total
        };
        (padded, max_align)
    }

    /// Find a member by name, returning its byte offset and type.
    pub fn member(&self, id: TypeId, name: &str) -> Option<(usize, TypeId)> {
        match self.get(id) {
            Type::Record { members, .. } => members
                .iter()
                .find(|m| m.name == name)
                .map(|m| (m.offset, m.typ)),
            _ => None,
        }
    }

    /// Positional member list for initializer walking.
    pub fn members(&self, id: TypeId) -> &[Member] {
        match self.get(id) {
            Type::Record { members, .. } => members,
            _ => &[],
        }
    }

    /// Positional index of a named member.
    pub fn member_index(&self, id: TypeId, name: &str) -> Option<usize> {
        self.members(id).iter().position(|m| m.name == name)
    }

    // ------------------------------------------------------------------
    // Display
    // ------------------------------------------------------------------

    /// Render a type for diagnostics.
    pub fn name_of(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Void => "void".to_string(),
            Type::Prim { kind, signed } => {
                let base = match kind {
                    PrimKind::Char => "char",
                    PrimKind::Short => "short",
                    PrimKind::Int => "int",
                    PrimKind::Long => "long",
                    PrimKind::LongLong => "long long",
                    PrimKind::Float => "float",
                    PrimKind::Double => "double",
                    PrimKind::LongDouble => "long double",
                };
                if !*signed && !kind.is_float() {
                    format!("unsigned {}", base)
                } else {
                    base.to_string()
                }
            }
            Type::Ptr { to } => format!("{}*", self.name_of(*to)),
            Type::Arr { elem, len } => match len {
                Some(n) => format!("{}[{}]", self.name_of(*elem), n),
                None => format!("{}[]", self.name_of(*elem)),
            },
            Type::Func { ret, params, variadic } => {
                let mut s = format!("{}(", self.name_of(*ret));
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        s.push_str(", ");
                    }
                    s.push_str(&self.name_of(p.typ));
                }
                if *variadic {
                    if !params.is_empty() {
                        s.push_str(", ");
                    }
                    s.push_str("...");
                }
                s.push(')');
                s
            }
            Type::Record { tag, is_union, .. } => {
                let kw = if *is_union { "union" } else { "struct" };
                match tag {
                    Some(t) => format!("{} {}", kw, t),
                    None => format!("{} <anonymous>", kw),
                }
            }
            Type::Enum { tag, .. } => match tag {
                Some(t) => format!("enum {}", t),
                None => "enum <anonymous>".to_string(),
            },
        }
    }
}

impl Default for TypeTable {
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

    #[test]
    fn test_prim_sizes() {
        let t = TypeTable::new();
        assert_eq!(t.size_of(t.char_id), Some(1));
        assert_eq!(t.size_of(t.int_id), Some(4));
        assert_eq!(t.size_of(t.long_id), Some(8));
        assert_eq!(t.size_of(t.double_id), Some(8));
    }

    #[test]
    fn test_pointer_and_array() {
        let mut t = TypeTable::new();
        let p = t.ptr_to(t.int_id);
        assert!(t.is_ptr(p));
        assert_eq!(t.size_of(p), Some(8));

        let a = t.array_of(t.int_id, Some(10));
        assert_eq!(t.size_of(a), Some(40));
        assert_eq!(t.align_of(a), 4);

        let unsized_arr = t.array_of(t.int_id, None);
        assert_eq!(t.size_of(unsized_arr), None);
        assert!(t.is_incomplete(unsized_arr));
    }

    #[test]
    fn test_array_of_ptr_vs_ptr_to_array() {
        let mut t = TypeTable::new();
        // int *d[3]
        let ip = t.ptr_to(t.int_id);
        let arr_of_ptr = t.array_of(ip, Some(3));
        // int (*d)[3]
        let arr = t.array_of(t.int_id, Some(3));
        let ptr_to_arr = t.ptr_to(arr);

        assert!(!t.same_type(arr_of_ptr, ptr_to_arr));
        assert_eq!(t.size_of(arr_of_ptr), Some(24));
        assert_eq!(t.size_of(ptr_to_arr), Some(8));
        assert_eq!(t.name_of(arr_of_ptr), "int*[3]");
        assert_eq!(t.name_of(ptr_to_arr), "int[3]*");
    }

    #[test]
    fn test_same_type_structural() {
        let mut t = TypeTable::new();
        let p1 = t.ptr_to(t.int_id);
        let p2 = t.ptr_to(t.int_id);
        assert_ne!(p1, p2);
        assert!(t.same_type(p1, p2));

        let pc = t.ptr_to(t.char_id);
        assert!(!t.same_type(p1, pc));
    }

    #[test]
    fn test_records_nominal() {
        let mut t = TypeTable::new();
        let r1 = t.alloc(Type::Record {
            tag: Some("a".into()),
            is_union: false,
            members: Vec::new(),
            size: 0,
            align: 1,
            complete: false,
        });
        let r2 = t.alloc(Type::Record {
            tag: Some("a".into()),
            is_union: false,
            members: Vec::new(),
            size: 0,
            align: 1,
            complete: false,
        });
        assert!(!t.same_type(r1, r2));
        assert!(t.same_type(r1, r1));
    }

    #[test]
    fn test_tag_completion_in_place() {
        let mut t = TypeTable::new();
        let r = t.alloc(Type::Record {
            tag: Some("foo".into()),
            is_union: false,
            members: Vec::new(),
            size: 0,
            align: 1,
            complete: false,
        });
        // A pointer to the incomplete tag, obtained before completion
        let p = t.ptr_to(r);
        assert!(t.is_incomplete(r));

        let members = vec![
            Member {
                name: "c".into(),
                typ: t.char_id,
                offset: 0,
            },
            Member {
                name: "x".into(),
                typ: t.int_id,
                offset: 0,
            },
        ];
        t.complete_record(r, members, false);

        // The earlier pointer now sees the completed layout
        let pointee = t.base_of(p).unwrap();
        assert_eq!(pointee, r);
        assert!(!t.is_incomplete(pointee));
        assert_eq!(t.size_of(pointee), Some(8));
        assert_eq!(t.member(pointee, "x"), Some((4, t.int_id)));
    }

    #[test]
    fn test_struct_layout_alignment() {
        let mut t = TypeTable::new();
        let mut members = vec![
            Member {
                name: "a".into(),
                typ: t.char_id,
                offset: 0,
            },
            Member {
                name: "b".into(),
                typ: t.long_id,
                offset: 0,
            },
            Member {
                name: "c".into(),
                typ: t.char_id,
                offset: 0,
            },
        ];
        let r = t.alloc(Type::Record {
            tag: None,
            is_union: false,
            members: Vec::new(),
            size: 0,
            align: 1,
            complete: false,
        });
        t.complete_record(r, std::mem::take(&mut members), false);
        assert_eq!(t.member(r, "a"), Some((0, t.char_id)));
        assert_eq!(t.member(r, "b"), Some((8, t.long_id)));
        assert_eq!(t.member(r, "c"), Some((16, t.char_id)));
        assert_eq!(t.size_of(r), Some(24));
        assert_eq!(t.align_of(r), 8);
    }

    #[test]
    fn test_union_layout() {
        let mut t = TypeTable::new();
        let members = vec![
            Member {
                name: "i".into(),
                typ: t.int_id,
                offset: 0,
            },
            Member {
                name: "l".into(),
                typ: t.long_id,
                offset: 0,
            },
        ];
        let r = t.alloc(Type::Record {
            tag: None,
            is_union: true,
            members: Vec::new(),
            size: 0,
            align: 1,
            complete: false,
        });
        t.complete_record(r, members, true);
        assert_eq!(t.member(r, "i"), Some((0, t.int_id)));
        assert_eq!(t.member(r, "l"), Some((0, t.long_id)));
        assert_eq!(t.size_of(r), Some(8));
    }

    #[test]
    fn test_conv_rank_order() {
        let t = TypeTable::new();
        assert!(t.conv_rank(t.char_id) < t.conv_rank(t.short_id));
        assert!(t.conv_rank(t.short_id) < t.conv_rank(t.int_id));
        assert!(t.conv_rank(t.int_id) < t.conv_rank(t.long_id));
        assert!(t.conv_rank(t.llong_id) < t.conv_rank(t.float_id));
        assert!(t.conv_rank(t.float_id) < t.conv_rank(t.double_id));
        // Signedness does not affect rank
        assert_eq!(t.conv_rank(t.int_id), t.conv_rank(t.uint_id));
    }

    #[test]
    fn test_can_represent() {
        let t = TypeTable::new();
        // long can hold every unsigned int
        assert!(t.can_represent(t.long_id, t.uint_id));
        // int cannot hold every unsigned int
        assert!(!t.can_represent(t.int_id, t.uint_id));
    }

    #[test]
    fn test_unsigned_of() {
        let t = TypeTable::new();
        assert_eq!(t.unsigned_of(t.int_id), t.uint_id);
        assert_eq!(t.unsigned_of(t.long_id), t.ulong_id);
    }
}
