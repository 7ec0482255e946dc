//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// One-pass C parser for the occ compiler
//
// Parsing, semantic analysis, and IR emission are fused: declarations
// create symbols as they are parsed, statements build basic blocks as
// they are recognized, and expression statements lower straight into
// the current block. The Compiler struct is the whole compilation
// session; nothing is process-global, so sessions are independently
// instantiable.
//

use bitflags::bitflags;
use std::collections::HashMap;

use crate::diag::{CResult, CompileError, Position};
use crate::ir::{ir_type_of, DataItem, IrType, IrVal, LabelId, Module, Opcode, Term};
use crate::parse::ast::{Expr, ExprKind, InitEntry};
use crate::symbol::{Linkage, Scopes, SymId, SymKind, Symbol};
use crate::token::{Lexer, TokKind, Token};
use crate::types::{Member, Param, Type, TypeId, TypeTable};

// ============================================================================
// Storage classes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SClass {
    None,
    Auto,
    Register,
    Extern,
    Static,
    Typedef,
    /// Plain file-scope declaration (no storage-class keyword)
    Global,
}

// ============================================================================
// Declaration specifier accumulation
// ============================================================================

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct SpecBits: u32 {
        const CHAR = 1 << 0;
        const SHORT = 1 << 1;
        const INT = 1 << 2;
        const LONG = 1 << 3;
        const LONG_LONG = 1 << 4;
        const SIGNED = 1 << 5;
        const UNSIGNED = 1 << 6;
        const FLOAT = 1 << 7;
        const DOUBLE = 1 << 8;
        const ENUM = 1 << 9;
        const STRUCT = 1 << 10;
        const VOID = 1 << 11;
        const IDENT = 1 << 12;
    }
}

// ============================================================================
// Per-function control-flow bookkeeping
// ============================================================================

/// A named goto target, created at first mention.
pub(crate) struct GotoLabel {
    pub(crate) label: LabelId,
    pub(crate) defined: bool,
}

/// An active switch statement. Case edges accumulate while the body is
/// parsed; the dispatch chain is built once the body is done.
pub(crate) struct SwitchCtx {
    pub(crate) scrut: IrVal,
    pub(crate) cases: Vec<(i64, LabelId)>,
    pub(crate) default: Option<LabelId>,
}

// ============================================================================
// Compilation session
// ============================================================================

/// One compilation session: a translation unit's worth of state.
pub struct Compiler {
    pub(crate) lex: Lexer,
    pub(crate) types: TypeTable,
    pub(crate) scopes: Scopes,
    pub(crate) module: Module,
    /// File-scope objects without initializer, flushed zeroed at unit end
    pub(crate) tentative: Vec<SymId>,
    pub(crate) cur_func: Option<SymId>,
    pub(crate) labels: HashMap<String, GotoLabel>,
    pub(crate) gotos: Vec<(Position, String)>,
    pub(crate) breaks: Vec<LabelId>,
    pub(crate) conts: Vec<LabelId>,
    pub(crate) switches: Vec<SwitchCtx>,
}

impl Compiler {
    pub fn new(file: impl Into<String>, source: &str) -> CResult<Self> {
        Ok(Self {
            lex: Lexer::new(file, source)?,
            types: TypeTable::new(),
            scopes: Scopes::new(),
            module: Module::new(),
            tentative: Vec::new(),
            cur_func: None,
            labels: HashMap::new(),
            gotos: Vec::new(),
            breaks: Vec::new(),
            conts: Vec::new(),
            switches: Vec::new(),
        })
    }

    /// Compile the whole translation unit and return the rendered IR.
    pub fn compile(mut self) -> CResult<String> {
        self.module.module_begin();
        while self.kind() != TokKind::Eof {
            self.decl()?;
        }
        let tent = std::mem::take(&mut self.tentative);
        for id in tent {
            let sym = self.scopes.get(id);
            let size = match self.types.size_of(sym.typ) {
                Some(s) => s,
                None => {
                    return Err(CompileError::decl(
                        sym.pos,
                        format!("tentative definition of {} has incomplete type", sym.name),
                    ))
                }
            };
            let export = sym.linkage() == Some(Linkage::Global);
            let link = sym.link_name().to_string();
            self.module.emit_data(&link, export, &[DataItem::Zero(size)]);
        }
        Ok(self.module.module_end())
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    pub(crate) fn cur(&self) -> &Token {
        self.lex.current()
    }

    pub(crate) fn kind(&self) -> TokKind {
        self.lex.current().kind
    }

    pub(crate) fn pos(&self) -> Position {
        self.lex.current().pos
    }

    pub(crate) fn next(&mut self) -> CResult<Token> {
        self.lex.advance()
    }

    pub(crate) fn expect(&mut self, k: TokKind) -> CResult<Token> {
        if self.kind() != k {
            return Err(CompileError::token(
                self.pos(),
                format!("expected {} but got {}", k.name(), self.kind().name()),
            ));
        }
        self.next()
    }

    // ------------------------------------------------------------------
    // Lookahead classification
    // ------------------------------------------------------------------

    pub(crate) fn is_typename(&self, name: &str) -> bool {
        match self.scopes.lookup(name) {
            Some(id) => matches!(self.scopes.get(id).kind, SymKind::Typedef),
            None => false,
        }
    }

    pub(crate) fn is_type_start(&self, t: &Token) -> bool {
        match t.kind {
            TokKind::Enum
            | TokKind::Struct
            | TokKind::Union
            | TokKind::Void
            | TokKind::Char
            | TokKind::Short
            | TokKind::Int
            | TokKind::Long
            | TokKind::Signed
            | TokKind::Unsigned
            | TokKind::Float
            | TokKind::Double => true,
            TokKind::Ident => self.is_typename(&t.text),
            _ => false,
        }
    }

    fn is_decl_start(&self) -> bool {
        if self.is_type_start(self.cur()) {
            return true;
        }
        matches!(
            self.kind(),
            TokKind::Extern
                | TokKind::Register
                | TokKind::Static
                | TokKind::Auto
                | TokKind::Typedef
                | TokKind::Const
                | TokKind::Volatile
        )
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn decl(&mut self) -> CResult<()> {
        let pos = self.pos();
        let (basety, mut sclass) = self.declspecs()?;
        while self.kind() != TokKind::Semi && self.kind() != TokKind::Eof {
            let (name, typ, init) = self.parse_declarator(basety, true)?;
            if sclass == SClass::None {
                sclass = if self.scopes.at_file_scope() {
                    SClass::Global
                } else {
                    SClass::Auto
                };
            }
            if sclass == SClass::Typedef && init.is_some() {
                return Err(CompileError::decl(pos, "typedef cannot have an initializer"));
            }
            let name = match name {
                Some(n) => n,
                None => return Err(CompileError::decl(pos, "declaration needs to specify a name")),
            };
            let had_init = init.is_some();
            let sym = self.define_sym(pos, sclass, &name, typ, init)?;
            if self.scopes.at_file_scope() && self.kind() == TokKind::LBrace {
                if had_init {
                    return Err(CompileError::decl(
                        pos,
                        "function declaration has an initializer",
                    ));
                }
                if !self.types.is_func(typ) {
                    return Err(CompileError::decl(pos, "expected a function"));
                }
                if self.scopes.get(sym).defined {
                    return Err(CompileError::decl(
                        pos,
                        format!("{} already initialized", name),
                    ));
                }
                self.cur_func = Some(sym);
                self.funcbody(sym)?;
                self.scopes.get_mut(sym).defined = true;
                self.cur_func = None;
                return Ok(());
            }
            if self.kind() == TokKind::Comma {
                self.next()?;
            } else {
                break;
            }
        }
        self.expect(TokKind::Semi)?;
        Ok(())
    }

    /// Accumulate declaration specifiers, committing to one canonical
    /// type by exhaustive bitmask match.
    pub(crate) fn declspecs(&mut self) -> CResult<(TypeId, SClass)> {
        use SpecBits as S;

        let pos = self.pos();
        let mut bits = S::empty();
        let mut tagty: Option<TypeId> = None;
        let mut sclass = SClass::None;

        let dup = |pos| CompileError::decl(pos, "invalid declaration specifiers");

        loop {
            let k = self.kind();
            if matches!(
                k,
                TokKind::Extern
                    | TokKind::Static
                    | TokKind::Register
                    | TokKind::Auto
                    | TokKind::Typedef
            ) {
                if sclass != SClass::None {
                    return Err(CompileError::decl(
                        pos,
                        "multiple storage classes in declaration specifiers",
                    ));
                }
                sclass = match k {
                    TokKind::Extern => SClass::Extern,
                    TokKind::Static => SClass::Static,
                    TokKind::Register => SClass::Register,
                    TokKind::Auto => SClass::Auto,
                    TokKind::Typedef => SClass::Typedef,
                    _ => unreachable!(),
                };
                self.next()?;
                continue;
            }
            match k {
                TokKind::Const | TokKind::Volatile => {
                    self.next()?;
                }
                TokKind::Struct | TokKind::Union => {
                    if !bits.is_empty() {
                        return Err(dup(pos));
                    }
                    bits |= S::STRUCT;
                    tagty = Some(self.ptag()?);
                    break;
                }
                TokKind::Enum => {
                    if !bits.is_empty() {
                        return Err(dup(pos));
                    }
                    bits |= S::ENUM;
                    tagty = Some(self.ptag()?);
                    break;
                }
                TokKind::Void => {
                    if bits.contains(S::VOID) {
                        return Err(dup(pos));
                    }
                    bits |= S::VOID;
                    self.next()?;
                    break;
                }
                TokKind::Char => {
                    if bits.contains(S::CHAR) {
                        return Err(dup(pos));
                    }
                    bits |= S::CHAR;
                    self.next()?;
                }
                TokKind::Short => {
                    if bits.contains(S::SHORT) {
                        return Err(dup(pos));
                    }
                    bits |= S::SHORT;
                    self.next()?;
                }
                TokKind::Int => {
                    if bits.contains(S::INT) {
                        return Err(dup(pos));
                    }
                    bits |= S::INT;
                    self.next()?;
                }
                TokKind::Long => {
                    if bits.contains(S::LONG_LONG) {
                        return Err(dup(pos));
                    }
                    if bits.contains(S::LONG) {
                        bits.remove(S::LONG);
                        bits |= S::LONG_LONG;
                    } else {
                        bits |= S::LONG;
                    }
                    self.next()?;
                }
                TokKind::Float => {
                    if bits.contains(S::FLOAT) {
                        return Err(dup(pos));
                    }
                    bits |= S::FLOAT;
                    self.next()?;
                }
                TokKind::Double => {
                    if bits.contains(S::DOUBLE) {
                        return Err(dup(pos));
                    }
                    bits |= S::DOUBLE;
                    self.next()?;
                }
                TokKind::Signed => {
                    if bits.contains(S::SIGNED) {
                        return Err(dup(pos));
                    }
                    bits |= S::SIGNED;
                    self.next()?;
                }
                TokKind::Unsigned => {
                    if bits.contains(S::UNSIGNED) {
                        return Err(dup(pos));
                    }
                    bits |= S::UNSIGNED;
                    self.next()?;
                }
                TokKind::Ident => {
                    let name = self.cur().text.clone();
                    if bits.is_empty() && self.is_typename(&name) {
                        let id = self
                            .scopes
                            .lookup(&name)
                            .expect("internal error: typedef name without a symbol");
                        tagty = Some(self.scopes.get(id).typ);
                        bits |= S::IDENT;
                        self.next()?;
                    }
                    break;
                }
                _ => break,
            }
        }

        let s = |f: S| bits == f;
        let t = &self.types;
        let typ = if s(S::FLOAT) {
            t.float_id
        } else if s(S::DOUBLE) {
            t.double_id
        } else if s(S::LONG | S::DOUBLE) {
            t.ldouble_id
        } else if s(S::SIGNED | S::CHAR) || s(S::CHAR) {
            t.char_id
        } else if s(S::UNSIGNED | S::CHAR) {
            t.uchar_id
        } else if s(S::SIGNED | S::SHORT | S::INT) || s(S::SHORT | S::INT) || s(S::SHORT) {
            t.short_id
        } else if s(S::UNSIGNED | S::SHORT | S::INT) || s(S::UNSIGNED | S::SHORT) {
            t.ushort_id
        } else if s(S::SIGNED | S::INT) || s(S::SIGNED) || s(S::INT) || bits.is_empty() {
            t.int_id
        } else if s(S::UNSIGNED | S::INT) || s(S::UNSIGNED) {
            t.uint_id
        } else if s(S::SIGNED | S::LONG | S::INT) || s(S::SIGNED | S::LONG) || s(S::LONG | S::INT) || s(S::LONG) {
            t.long_id
        } else if s(S::UNSIGNED | S::LONG | S::INT) || s(S::UNSIGNED | S::LONG) {
            t.ulong_id
        } else if s(S::SIGNED | S::LONG_LONG | S::INT)
            || s(S::SIGNED | S::LONG_LONG)
            || s(S::LONG_LONG | S::INT)
            || s(S::LONG_LONG)
        {
            t.llong_id
        } else if s(S::UNSIGNED | S::LONG_LONG | S::INT) || s(S::UNSIGNED | S::LONG_LONG) {
            t.ullong_id
        } else if s(S::VOID) {
            t.void_id
        } else if s(S::ENUM) || s(S::STRUCT) || s(S::IDENT) {
            tagty.expect("internal error: tag specifier without a type")
        } else {
            return Err(CompileError::decl(pos, "invalid declaration specifiers"));
        };
        Ok((typ, sclass))
    }

    /// Parse one declarator around `basety`, yielding the declared name
    /// (None for abstract declarators), the full type, and an optional
    /// initializer when the context allows one.
    pub(crate) fn parse_declarator(
        &mut self,
        basety: TypeId,
        allow_init: bool,
    ) -> CResult<(Option<String>, TypeId, Option<Expr>)> {
        while matches!(self.kind(), TokKind::Const | TokKind::Volatile) {
            self.next()?;
        }
        if self.kind() == TokKind::Star {
            self.next()?;
            let ptr = self.types.ptr_to(basety);
            return self.parse_declarator(ptr, allow_init);
        }
        let (name, typ) = self.direct_declarator(basety)?;
        let init = if self.kind() == TokKind::Assign {
            if !allow_init {
                return Err(CompileError::token(self.pos(), "unexpected initializer"));
            }
            self.next()?;
            Some(self.decl_init(typ)?)
        } else {
            None
        };
        Ok((name, typ, init))
    }

    /// The declarator core. A parenthesized declarator binds its suffixes
    /// to a stub slot whose contents are filled in only after the outer
    /// suffixes are parsed, which is what makes `int (*d)[3]` come out as
    /// pointer-to-array rather than array-of-pointer.
    fn direct_declarator(&mut self, basety: TypeId) -> CResult<(Option<String>, TypeId)> {
        match self.kind() {
            TokKind::LParen => {
                self.next()?;
                let stub = self.types.alloc(self.types.get(basety).clone());
                let (name, typ, _) = self.parse_declarator(stub, false)?;
                self.expect(TokKind::RParen)?;
                let tail = self.declarator_tail(basety)?;
                let tail_t = self.types.get(tail).clone();
                self.types.replace(stub, tail_t);
                Ok((name, typ))
            }
            TokKind::Ident => {
                let name = self.cur().text.clone();
                self.next()?;
                let typ = self.declarator_tail(basety)?;
                Ok((Some(name), typ))
            }
            _ => {
                let typ = self.declarator_tail(basety)?;
                Ok((None, typ))
            }
        }
    }

    fn declarator_tail(&mut self, basety: TypeId) -> CResult<TypeId> {
        let mut t = basety;
        loop {
            match self.kind() {
                TokKind::LBracket => {
                    self.next()?;
                    let len = if self.kind() != TokKind::RBracket {
                        let p = self.pos();
                        let c = self.constexpr()?;
                        if c.sym.is_some() {
                            return Err(CompileError::constexpr(
                                p,
                                "pointer derived constant in array size",
                            ));
                        }
                        if c.v < 0 {
                            return Err(CompileError::constexpr(p, "negative array dimension"));
                        }
                        Some(c.v as usize)
                    } else {
                        None
                    };
                    self.expect(TokKind::RBracket)?;
                    t = self.types.array_of(t, len);
                }
                TokKind::LParen => {
                    self.next()?;
                    let (params, variadic) = self.parse_params()?;
                    self.expect(TokKind::RParen)?;
                    t = self.types.func(basety, params, variadic);
                }
                _ => return Ok(t),
            }
        }
    }

    fn parse_params(&mut self) -> CResult<(Vec<Param>, bool)> {
        let mut params = Vec::new();
        let mut variadic = false;
        if self.kind() == TokKind::RParen {
            return Ok((params, variadic));
        }
        if self.kind() == TokKind::Void && self.lex.peek().kind == TokKind::RParen {
            self.next()?;
            return Ok((params, variadic));
        }
        loop {
            let pos = self.pos();
            let (basety, sclass) = self.declspecs()?;
            let (name, typ, _) = self.parse_declarator(basety, false)?;
            if sclass != SClass::None {
                return Err(CompileError::decl(
                    pos,
                    "storage class not allowed in parameter decl",
                ));
            }
            params.push(Param { name, typ });
            if self.kind() != TokKind::Comma {
                break;
            }
            self.next()?;
            if self.kind() == TokKind::Ellipsis {
                variadic = true;
                self.next()?;
                break;
            }
        }
        Ok((params, variadic))
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    fn alloc_tag(&mut self, tag: Option<String>, is_union: bool, is_enum: bool) -> TypeId {
        if is_enum {
            self.types.alloc(Type::Enum {
                tag,
                members: Vec::new(),
                complete: false,
            })
        } else {
            self.types.alloc(Type::Record {
                tag,
                is_union,
                members: Vec::new(),
                size: 0,
                align: 1,
                complete: false,
            })
        }
    }

    fn tag_complete(&self, id: TypeId) -> bool {
        match self.types.get(id) {
            Type::Record { complete, .. } | Type::Enum { complete, .. } => *complete,
            _ => panic!("internal error: non-tag type in tag namespace"),
        }
    }

    /// Parse a struct/union/enum tag reference, with optional body.
    /// Completing a forward-declared tag mutates the original arena
    /// slot so earlier references see the finished layout.
    pub(crate) fn ptag(&mut self) -> CResult<TypeId> {
        let pos = self.pos();
        let tkind = self.kind();
        self.next()?;
        let is_union = tkind == TokKind::Union;
        let is_enum = tkind == TokKind::Enum;

        let mut name: Option<String> = None;
        if self.kind() == TokKind::Ident {
            name = Some(self.cur().text.clone());
            self.next()?;
        }

        if let Some(n) = &name {
            if let Some(existing) = self.scopes.lookup_tag(n) {
                match (is_enum, self.types.get(existing)) {
                    (false, Type::Record { is_union: u, .. }) => {
                        if *u != is_union {
                            return Err(CompileError::decl(
                                pos,
                                "struct/union accessed by wrong tag type",
                            ));
                        }
                    }
                    (false, _) => {
                        return Err(CompileError::decl(pos, "struct/union accessed by enum tag"))
                    }
                    (true, Type::Enum { .. }) => {}
                    (true, _) => {
                        return Err(CompileError::decl(pos, "enum tag accessed by struct or union"))
                    }
                }
            }
        }

        let has_body = self.kind() == TokKind::LBrace || name.is_none();
        if !has_body {
            let n = name.unwrap();
            return Ok(match self.scopes.lookup_tag(&n) {
                Some(t) => t,
                None => {
                    let t = self.alloc_tag(Some(n.clone()), is_union, is_enum);
                    self.scopes.define_tag(n, t);
                    t
                }
            });
        }

        let slot = match &name {
            Some(n) => match self.scopes.lookup_tag_innermost(n) {
                Some(s) => {
                    if self.tag_complete(s) {
                        return Err(CompileError::decl(
                            pos,
                            format!("redefinition of tag {}", n),
                        ));
                    }
                    s
                }
                None => {
                    let s = self.alloc_tag(Some(n.clone()), is_union, is_enum);
                    self.scopes.define_tag(n.clone(), s);
                    s
                }
            },
            None => self.alloc_tag(None, is_union, is_enum),
        };
        if is_enum {
            self.penum(slot)?;
        } else {
            self.pstruct(slot, is_union)?;
        }
        Ok(slot)
    }

    fn pstruct(&mut self, slot: TypeId, is_union: bool) -> CResult<()> {
        let mut members: Vec<Member> = Vec::new();
        self.expect(TokKind::LBrace)?;
        while self.kind() != TokKind::RBrace {
            let (basety, _sclass) = self.declspecs()?;
            loop {
                let p = self.pos();
                let (name, typ, _) = self.parse_declarator(basety, false)?;
                let mut bitfield = false;
                if self.kind() == TokKind::Colon {
                    // Bit-field width is parsed but storage is not modeled
                    self.next()?;
                    self.constexpr()?;
                    bitfield = true;
                }
                if self.types.is_incomplete(typ) {
                    return Err(CompileError::decl(p, "incomplete type inside struct/union"));
                }
                match name {
                    Some(n) => members.push(Member {
                        name: n,
                        typ,
                        offset: 0,
                    }),
                    None if bitfield => {}
                    None => return Err(CompileError::decl(p, "expected a member name")),
                }
                if self.kind() != TokKind::Comma {
                    break;
                }
                self.next()?;
            }
            self.expect(TokKind::Semi)?;
        }
        self.expect(TokKind::RBrace)?;
        self.types.complete_record(slot, members, is_union);
        Ok(())
    }

    fn penum(&mut self, slot: TypeId) -> CResult<()> {
        let mut members: Vec<SymId> = Vec::new();
        let mut v: i64 = 0;
        self.expect(TokKind::LBrace)?;
        loop {
            if self.kind() == TokKind::RBrace {
                break;
            }
            let p = self.pos();
            let name = self.expect(TokKind::Ident)?.text;
            if self.kind() == TokKind::Assign {
                self.next()?;
                let c = self.constexpr()?;
                if c.sym.is_some() {
                    return Err(CompileError::constexpr(
                        p,
                        "pointer derived constant in enum",
                    ));
                }
                v = c.v;
            }
            let s = self.define_enum(p, &name, slot, v)?;
            members.push(s);
            if self.kind() != TokKind::Comma {
                break;
            }
            self.next()?;
            v += 1;
        }
        self.expect(TokKind::RBrace)?;
        let tag = match self.types.get(slot) {
            Type::Enum { tag, .. } => tag.clone(),
            _ => panic!("internal error: completing a non-enum type"),
        };
        self.types.replace(
            slot,
            Type::Enum {
                tag,
                members,
                complete: true,
            },
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Symbol creation
    // ------------------------------------------------------------------

    fn define_enum(
        &mut self,
        pos: Position,
        name: &str,
        typ: TypeId,
        value: i64,
    ) -> CResult<SymId> {
        if self.scopes.lookup_innermost(name).is_some() {
            return Err(CompileError::decl(pos, format!("redefinition of {}", name)));
        }
        Ok(self.scopes.define(Symbol {
            pos,
            name: name.to_string(),
            typ,
            kind: SymKind::EnumConst { value },
            defined: true,
        }))
    }

    /// Create or merge a symbol, deciding kind and linkage from the
    /// storage class. Redeclaration at the same scope merges into the
    /// existing symbol; globals gaining their initializer are emitted
    /// immediately and leave the tentative set.
    pub(crate) fn define_sym(
        &mut self,
        pos: Position,
        sclass: SClass,
        name: &str,
        typ: TypeId,
        init: Option<Expr>,
    ) -> CResult<SymId> {
        if (matches!(sclass, SClass::Auto | SClass::Register) || init.is_some())
            && self.types.is_incomplete(typ)
        {
            return Err(CompileError::decl(
                pos,
                "cannot use incomplete type in this context",
            ));
        }
        if matches!(sclass, SClass::Auto | SClass::Register) && self.scopes.at_file_scope() {
            return Err(CompileError::decl(
                pos,
                "defining local symbol in global scope",
            ));
        }

        if let Some(id) = self.scopes.lookup_innermost(name) {
            match self.scopes.get(id).kind.clone() {
                SymKind::Typedef => {
                    if sclass != SClass::Typedef
                        || !self.types.same_type(self.scopes.get(id).typ, typ)
                    {
                        return Err(CompileError::decl(
                            pos,
                            format!("incompatible redefinition of typedef {}", name),
                        ));
                    }
                }
                SymKind::Global { linkage, link_name } => {
                    let mut linkage = linkage;
                    if linkage == Linkage::Extern && sclass == SClass::Global {
                        linkage = Linkage::Global;
                        self.scopes.get_mut(id).kind = SymKind::Global {
                            linkage,
                            link_name,
                        };
                    }
                    let want = match sclass {
                        SClass::Global => Linkage::Global,
                        SClass::Extern => Linkage::Extern,
                        SClass::Static => Linkage::Static,
                        _ => {
                            return Err(CompileError::decl(
                                pos,
                                format!("redefinition of {}", name),
                            ))
                        }
                    };
                    if linkage != want {
                        return Err(CompileError::decl(
                            pos,
                            format!("redefinition of {} with differing storage class", name),
                        ));
                    }
                    if self.scopes.get(id).defined && init.is_some() {
                        return Err(CompileError::decl(
                            pos,
                            format!("{} already initialized", name),
                        ));
                    }
                    if !self.scopes.get(id).defined {
                        if let Some(init) = init {
                            self.scopes.get_mut(id).defined = true;
                            if !self.types.is_func(typ) {
                                self.emit_global_data(id, &init)?;
                            }
                            self.tentative.retain(|&s| s != id);
                        }
                    }
                }
                _ => {
                    return Err(CompileError::decl(pos, format!("redefinition of {}", name)));
                }
            }
            return Ok(id);
        }

        let defined = init.is_some();
        let kind = match sclass {
            SClass::Auto | SClass::Register => {
                let slot = self.alloca_slot(typ);
                let addr = match slot {
                    IrVal::Reg { n, .. } => n,
                    _ => panic!("internal error: stack slot is not a register"),
                };
                SymKind::Local { addr, param: None }
            }
            SClass::Typedef => SymKind::Typedef,
            SClass::Extern => SymKind::Global {
                linkage: Linkage::Extern,
                link_name: name.to_string(),
            },
            SClass::Global => SymKind::Global {
                linkage: Linkage::Global,
                link_name: name.to_string(),
            },
            SClass::Static => {
                let l = self.module.new_label();
                SymKind::Global {
                    linkage: Linkage::Static,
                    link_name: format!(".L{}", l.0),
                }
            }
            SClass::None => panic!("internal error: unresolved storage class"),
        };
        let is_local = matches!(kind, SymKind::Local { .. });
        let id = self.scopes.define(Symbol {
            pos,
            name: name.to_string(),
            typ,
            kind,
            defined,
        });
        if is_local {
            if let Some(init) = init {
                self.lower_local_init(id, &init)?;
            }
        } else if !self.types.is_func(typ) {
            if self.scopes.get(id).is_global() {
                let link = self
                    .scopes
                    .get(id)
                    .linkage()
                    .expect("internal error: global symbol without linkage");
                match (init, link) {
                    (Some(init), _) => self.emit_global_data(id, &init)?,
                    (None, Linkage::Extern) => {}
                    (None, _) => self.tentative.push(id),
                }
            }
        }
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Initializers
    // ------------------------------------------------------------------

    /// Parse an initializer for a target type: brace form for arrays
    /// and records, a plain assignment expression otherwise.
    pub(crate) fn decl_init(&mut self, typ: TypeId) -> CResult<Expr> {
        if self.types.is_arr(typ) && self.kind() == TokKind::LBrace {
            return self.array_init(typ);
        }
        if self.types.is_record(typ) && self.kind() == TokKind::LBrace {
            return self.struct_init(typ);
        }
        self.assign_expr()
    }

    /// Brace initializer for an array. A `[k] =` designator repositions
    /// the cursor to k; every consumed element then advances it by one.
    /// Nested initializers flatten into the parent entry list.
    fn array_init(&mut self, typ: TypeId) -> CResult<Expr> {
        let initpos = self.pos();
        let (elem, dim) = match self.types.get(typ) {
            Type::Arr { elem, len } => (*elem, *len),
            _ => panic!("internal error: array initializer for non-array"),
        };
        let esize = match self.types.size_of(elem) {
            Some(s) => s,
            None => {
                return Err(CompileError::decl(
                    initpos,
                    "array has incomplete element type",
                ))
            }
        };
        let mut entries: Vec<InitEntry> = Vec::new();
        let mut idx: usize = 0;
        let mut largest: usize = 0;
        self.expect(TokKind::LBrace)?;
        loop {
            if self.kind() == TokKind::RBrace {
                break;
            }
            if self.kind() == TokKind::LBracket {
                let selpos = self.pos();
                self.next()?;
                let c = self.constexpr()?;
                self.expect(TokKind::RBracket)?;
                self.expect(TokKind::Assign)?;
                if c.sym.is_some() {
                    return Err(CompileError::constexpr(
                        selpos,
                        "pointer derived constants not allowed in initializer selector",
                    ));
                }
                if c.v < 0 {
                    return Err(CompileError::constexpr(
                        selpos,
                        "negative initializer index not allowed",
                    ));
                }
                idx = c.v as usize;
                largest = largest.max(idx);
            }
            let sub = self.decl_init(elem)?;
            match sub.kind {
                ExprKind::Init(subentries) => {
                    for e in subentries {
                        entries.push(InitEntry {
                            offset: esize * idx + e.offset,
                            expr: e.expr,
                        });
                    }
                }
                _ => {
                    let sub = self.mk_cast(sub, elem)?;
                    entries.push(InitEntry {
                        offset: esize * idx,
                        expr: sub,
                    });
                }
            }
            idx += 1;
            largest = largest.max(idx);
            if self.kind() != TokKind::Comma {
                break;
            }
            self.next()?;
        }
        self.check_init_overlap(&mut entries)?;
        self.expect(TokKind::RBrace)?;
        match dim {
            None => {
                // Infer the dimension from the highest index used
                self.types.replace(
                    typ,
                    Type::Arr {
                        elem,
                        len: Some(largest),
                    },
                );
            }
            Some(d) => {
                if largest != d {
                    return Err(CompileError::decl(
                        initpos,
                        "array initializer wrong size for type",
                    ));
                }
            }
        }
        Ok(Expr::new(ExprKind::Init(entries), typ, initpos))
    }

    /// Brace initializer for a struct or union, walking members
    /// positionally with `.name =` designators repositioning the walk.
    fn struct_init(&mut self, typ: TypeId) -> CResult<Expr> {
        let initpos = self.pos();
        if self.types.is_incomplete(typ) {
            return Err(CompileError::decl(
                initpos,
                "cannot initialize an incomplete struct/union",
            ));
        }
        let members: Vec<Member> = self.types.members(typ).to_vec();
        let mut entries: Vec<InitEntry> = Vec::new();
        let mut mi: usize = 0;
        let mut neednext = false;
        self.expect(TokKind::LBrace)?;
        loop {
            if self.kind() == TokKind::RBrace {
                break;
            }
            if self.kind() == TokKind::Dot {
                neednext = false;
                let selpos = self.pos();
                self.next()?;
                let name = self.expect(TokKind::Ident)?.text;
                self.expect(TokKind::Assign)?;
                mi = match self.types.member_index(typ, &name) {
                    Some(i) => i,
                    None => {
                        return Err(CompileError::typ(
                            selpos,
                            format!("struct has no member '{}'", name),
                        ))
                    }
                };
            }
            if neednext {
                mi += 1;
                if mi >= members.len() {
                    return Err(CompileError::decl(
                        self.pos(),
                        "end of struct already reached",
                    ));
                }
            }
            let m = match members.get(mi) {
                Some(m) => m.clone(),
                None => {
                    return Err(CompileError::decl(
                        initpos,
                        "too many elements in struct initializer",
                    ))
                }
            };
            let sub = self.decl_init(m.typ)?;
            match sub.kind {
                ExprKind::Init(subentries) => {
                    for e in subentries {
                        entries.push(InitEntry {
                            offset: m.offset + e.offset,
                            expr: e.expr,
                        });
                    }
                }
                _ => {
                    let sub = self.mk_cast(sub, m.typ)?;
                    entries.push(InitEntry {
                        offset: m.offset,
                        expr: sub,
                    });
                }
            }
            if self.kind() != TokKind::Comma {
                break;
            }
            self.next()?;
            neednext = true;
        }
        self.check_init_overlap(&mut entries)?;
        self.expect(TokKind::RBrace)?;
        Ok(Expr::new(ExprKind::Init(entries), typ, initpos))
    }

    /// Sort flattened entries by offset and reject any two whose byte
    /// ranges overlap.
    fn check_init_overlap(&self, entries: &mut [InitEntry]) -> CResult<()> {
        entries.sort_by_key(|e| e.offset);
        for pair in entries.windows(2) {
            let size = self.types.size_of(pair[0].expr.typ).unwrap_or(0);
            if pair[1].offset < pair[0].offset + size {
                return Err(CompileError::decl(
                    pair[0].expr.pos,
                    "fields in init overlaps with another field",
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Function bodies
    // ------------------------------------------------------------------

    fn funcbody(&mut self, sym: SymId) -> CResult<()> {
        let fpos = self.scopes.get(sym).pos;
        let ftyp = self.scopes.get(sym).typ;
        let (ret, params, _variadic) = match self.types.get(ftyp) {
            Type::Func {
                ret,
                params,
                variadic,
            } => (*ret, params.clone(), *variadic),
            _ => panic!("internal error: function body for non-function"),
        };
        let export = self.scopes.get(sym).linkage() == Some(Linkage::Global);
        let link = self.scopes.get(sym).link_name().to_string();
        let ret_ir = if matches!(self.types.get(ret), Type::Void) {
            None
        } else {
            Some(ir_type_of(&self.types, ret))
        };
        let ptys: Vec<IrType> = params
            .iter()
            .map(|p| ir_type_of(&self.types, p.typ))
            .collect();
        let regs = self.module.function_begin(&link, export, ret_ir, &ptys);

        self.labels.clear();
        self.gotos.clear();

        self.scopes.push(fpos)?;
        for (i, (p, reg)) in params.iter().zip(regs).enumerate() {
            if let Some(name) = &p.name {
                let slot = self.alloca_slot(p.typ);
                self.emit_store(slot.clone(), reg, p.typ);
                let addr = match slot {
                    IrVal::Reg { n, .. } => n,
                    _ => panic!("internal error: stack slot is not a register"),
                };
                self.scopes.define(Symbol {
                    pos: fpos,
                    name: name.clone(),
                    typ: p.typ,
                    kind: SymKind::Local {
                        addr,
                        param: Some(i as u32),
                    },
                    defined: true,
                });
            }
        }

        self.block_stmt()?;

        let gotos = std::mem::take(&mut self.gotos);
        for (pos, name) in gotos {
            let defined = self.labels.get(&name).map(|l| l.defined).unwrap_or(false);
            if !defined {
                return Err(CompileError::control(pos, "goto target not defined"));
            }
        }

        // Fallthrough off the end of the body
        self.module.terminate(Term::Ret(None));
        self.module.function_end();
        self.scopes.pop();
        Ok(())
    }

    pub(crate) fn lookup_label(&mut self, name: &str) -> LabelId {
        if let Some(l) = self.labels.get(name) {
            return l.label;
        }
        let label = self.module.new_label();
        self.labels.insert(
            name.to_string(),
            GotoLabel {
                label,
                defined: false,
            },
        );
        label
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn decl_or_stmt(&mut self) -> CResult<()> {
        if self.is_decl_start() {
            self.decl()
        } else {
            self.stmt()
        }
    }

    fn block_stmt(&mut self) -> CResult<()> {
        self.scopes.push(self.pos())?;
        self.expect(TokKind::LBrace)?;
        while self.kind() != TokKind::RBrace && self.kind() != TokKind::Eof {
            self.decl_or_stmt()?;
        }
        self.expect(TokKind::RBrace)?;
        self.scopes.pop();
        Ok(())
    }

    fn stmt(&mut self) -> CResult<()> {
        // An identifier directly followed by ':' is a label definition
        if self.kind() == TokKind::Ident && self.lex.peek().kind == TokKind::Colon {
            let t = self.cur().clone();
            let label = self.lookup_label(&t.text);
            self.next()?;
            self.next()?;
            let rec = self
                .labels
                .get_mut(&t.text)
                .expect("internal error: label record missing after lookup");
            if rec.defined {
                return Err(CompileError::control(
                    t.pos,
                    format!("redefinition of label {}", t.text),
                ));
            }
            rec.defined = true;
            self.module.terminate(Term::Jmp(label));
            let nb = self.module.new_block();
            self.module.set_current(nb);
            self.module.add_label(label);
            return Ok(());
        }
        match self.kind() {
            TokKind::If => self.p_if(),
            TokKind::For => self.p_for(),
            TokKind::While => self.p_while(),
            TokKind::Do => self.p_do_while(),
            TokKind::Return => self.p_return(),
            TokKind::Switch => self.p_switch(),
            TokKind::Case => self.p_case(),
            TokKind::Default => self.p_default(),
            TokKind::Break => self.p_break(),
            TokKind::Continue => self.p_continue(),
            TokKind::Goto => self.p_goto(),
            TokKind::LBrace => self.block_stmt(),
            _ => self.expr_stmt(),
        }
    }

    fn expr_stmt(&mut self) -> CResult<()> {
        if self.kind() == TokKind::Semi {
            self.next()?;
            return Ok(());
        }
        let e = self.expr()?;
        self.lower_expr(&e)?;
        self.expect(TokKind::Semi)?;
        Ok(())
    }

    fn p_return(&mut self) -> CResult<()> {
        self.expect(TokKind::Return)?;
        if self.kind() != TokKind::Semi {
            let e = self.expr()?;
            let func = self.cur_func.expect("internal error: return outside function");
            let ret = self
                .types
                .return_type(self.scopes.get(func).typ)
                .expect("internal error: current function has non-function type");
            if matches!(self.types.get(ret), Type::Void) {
                self.lower_expr(&e)?;
                self.module.terminate(Term::Ret(None));
            } else {
                let e = self.mk_cast(e, ret)?;
                let v = self.lower_expr(&e)?;
                self.module.terminate(Term::Ret(Some(v)));
            }
        } else {
            self.module.terminate(Term::Ret(None));
        }
        self.expect(TokKind::Semi)?;
        Ok(())
    }

    /// The canonical block-splitting pattern: condition seals the entry
    /// with a conditional branch; each arm seals with a jump to the join
    /// block. The else block exists only when an `else` is present.
    fn p_if(&mut self) -> CResult<()> {
        self.expect(TokKind::If)?;
        self.expect(TokKind::LParen)?;
        let e = self.expr()?;
        let v = self.lower_expr(&e)?;
        self.expect(TokKind::RParen)?;

        let entry = self.module.current_label();
        let then_l = self.module.new_block();
        let done_l = self.module.new_block();

        self.module.set_current(then_l);
        self.stmt()?;
        self.module.terminate(Term::Jmp(done_l));

        let false_target = if self.kind() == TokKind::Else {
            self.next()?;
            let else_l = self.module.new_block();
            self.module.set_current(else_l);
            self.stmt()?;
            self.module.terminate(Term::Jmp(done_l));
            else_l
        } else {
            done_l
        };

        self.module.set_current(entry);
        self.module.terminate(Term::Cbr(v, then_l, false_target));
        self.module.set_current(done_l);
        Ok(())
    }

    fn p_while(&mut self) -> CResult<()> {
        self.expect(TokKind::While)?;
        let cond_l = self.module.new_block();
        let body_l = self.module.new_block();
        let end_l = self.module.new_block();

        self.module.terminate(Term::Jmp(cond_l));
        self.module.set_current(cond_l);
        self.expect(TokKind::LParen)?;
        let e = self.expr()?;
        let v = self.lower_expr(&e)?;
        self.expect(TokKind::RParen)?;
        self.module.terminate(Term::Cbr(v, body_l, end_l));

        self.module.set_current(body_l);
        self.conts.push(cond_l);
        self.breaks.push(end_l);
        self.stmt()?;
        self.conts.pop();
        self.breaks.pop();
        self.module.terminate(Term::Jmp(cond_l));

        self.module.set_current(end_l);
        Ok(())
    }

    fn p_do_while(&mut self) -> CResult<()> {
        self.expect(TokKind::Do)?;
        let body_l = self.module.new_block();
        let cond_l = self.module.new_block();
        let end_l = self.module.new_block();

        self.module.terminate(Term::Jmp(body_l));
        self.module.set_current(body_l);
        self.conts.push(cond_l);
        self.breaks.push(end_l);
        self.stmt()?;
        self.conts.pop();
        self.breaks.pop();
        self.module.terminate(Term::Jmp(cond_l));

        self.expect(TokKind::While)?;
        self.expect(TokKind::LParen)?;
        self.module.set_current(cond_l);
        let e = self.expr()?;
        let v = self.lower_expr(&e)?;
        self.expect(TokKind::RParen)?;
        self.expect(TokKind::Semi)?;
        self.module.terminate(Term::Cbr(v, body_l, end_l));

        self.module.set_current(end_l);
        Ok(())
    }

    fn p_for(&mut self) -> CResult<()> {
        self.expect(TokKind::For)?;
        self.expect(TokKind::LParen)?;
        if self.kind() == TokKind::Semi {
            self.next()?;
        } else {
            let e = self.expr()?;
            self.lower_expr(&e)?;
            self.expect(TokKind::Semi)?;
        }

        let cond_l = self.module.new_block();
        let body_l = self.module.new_block();
        let step_l = self.module.new_block();
        let end_l = self.module.new_block();

        self.module.terminate(Term::Jmp(cond_l));
        self.module.set_current(cond_l);
        if self.kind() == TokKind::Semi {
            // Omitted condition is always true
            self.next()?;
            self.module.terminate(Term::Jmp(body_l));
        } else {
            let e = self.expr()?;
            let v = self.lower_expr(&e)?;
            self.expect(TokKind::Semi)?;
            self.module.terminate(Term::Cbr(v, body_l, end_l));
        }

        self.module.set_current(step_l);
        if self.kind() != TokKind::RParen {
            let e = self.expr()?;
            self.lower_expr(&e)?;
        }
        self.module.terminate(Term::Jmp(cond_l));
        self.expect(TokKind::RParen)?;

        self.module.set_current(body_l);
        self.conts.push(step_l);
        self.breaks.push(end_l);
        self.stmt()?;
        self.conts.pop();
        self.breaks.pop();
        self.module.terminate(Term::Jmp(step_l));

        self.module.set_current(end_l);
        Ok(())
    }

    /// switch lowers as: evaluate the scrutinee once, jump to a dispatch
    /// block, parse the body collecting case edges (fallthrough between
    /// cases preserved), then grow the dispatch block into a cascading
    /// compare-and-branch chain in source order.
    fn p_switch(&mut self) -> CResult<()> {
        let pos = self.pos();
        self.expect(TokKind::Switch)?;
        self.expect(TokKind::LParen)?;
        let e = self.expr()?;
        if !self.types.is_itype(e.typ) {
            return Err(CompileError::typ(pos, "switch requires an integer expression"));
        }
        let scrut = self.lower_expr(&e)?;
        self.expect(TokKind::RParen)?;

        let dispatch = self.module.new_block();
        let end_l = self.module.new_block();
        self.module.terminate(Term::Jmp(dispatch));

        let body_l = self.module.new_block();
        self.module.set_current(body_l);
        self.breaks.push(end_l);
        self.switches.push(SwitchCtx {
            scrut,
            cases: Vec::new(),
            default: None,
        });
        self.stmt()?;
        self.module.terminate(Term::Jmp(end_l));
        let ctx = self
            .switches
            .pop()
            .expect("internal error: switch context stack underflow");
        self.breaks.pop();

        self.module.set_current(dispatch);
        let scrut_ty = ctx.scrut.ty();
        for (val, target) in &ctx.cases {
            let c = self.module.new_reg(IrType::W);
            self.module.append(
                Opcode::CEq,
                Some(c.clone()),
                vec![ctx.scrut.clone(), IrVal::Const { ty: scrut_ty, v: *val }],
            );
            let next_l = self.module.new_block();
            self.module.terminate(Term::Cbr(c, *target, next_l));
            self.module.set_current(next_l);
        }
        self.module
            .terminate(Term::Jmp(ctx.default.unwrap_or(end_l)));
        self.module.set_current(end_l);
        Ok(())
    }

    fn p_case(&mut self) -> CResult<()> {
        let pos = self.pos();
        if self.switches.is_empty() {
            return Err(CompileError::control(pos, "case outside of switch"));
        }
        self.expect(TokKind::Case)?;
        let c = self.constexpr()?;
        if c.sym.is_some() {
            return Err(CompileError::constexpr(
                pos,
                "case cannot have pointer derived constant",
            ));
        }
        self.expect(TokKind::Colon)?;
        let l = self.module.new_block();
        self.module.terminate(Term::Jmp(l));
        self.module.set_current(l);
        self.switches
            .last_mut()
            .expect("internal error: no active switch")
            .cases
            .push((c.v, l));
        self.stmt()
    }

    fn p_default(&mut self) -> CResult<()> {
        let pos = self.pos();
        if self.switches.is_empty() {
            return Err(CompileError::control(pos, "default outside of switch"));
        }
        let has_default = self
            .switches
            .last()
            .expect("internal error: switch context stack underflow")
            .default
            .is_some();
        if has_default {
            return Err(CompileError::control(pos, "switch already has default"));
        }
        self.expect(TokKind::Default)?;
        self.expect(TokKind::Colon)?;
        let l = self.module.new_block();
        self.module.terminate(Term::Jmp(l));
        self.module.set_current(l);
        self.switches
            .last_mut()
            .expect("internal error: switch context stack underflow")
            .default = Some(l);
        self.stmt()
    }

    fn p_break(&mut self) -> CResult<()> {
        let pos = self.pos();
        let target = match self.breaks.last() {
            Some(l) => *l,
            None => {
                return Err(CompileError::control(pos, "break without parent statement"))
            }
        };
        self.expect(TokKind::Break)?;
        self.expect(TokKind::Semi)?;
        self.module.terminate(Term::Jmp(target));
        Ok(())
    }

    fn p_continue(&mut self) -> CResult<()> {
        let pos = self.pos();
        let target = match self.conts.last() {
            Some(l) => *l,
            None => {
                return Err(CompileError::control(
                    pos,
                    "continue without parent statement",
                ))
            }
        };
        self.expect(TokKind::Continue)?;
        self.expect(TokKind::Semi)?;
        self.module.terminate(Term::Jmp(target));
        Ok(())
    }

    fn p_goto(&mut self) -> CResult<()> {
        let pos = self.pos();
        self.expect(TokKind::Goto)?;
        let name = self.expect(TokKind::Ident)?.text;
        self.expect(TokKind::Semi)?;
        let l = self.lookup_label(&name);
        self.gotos.push((pos, name));
        self.module.terminate(Term::Jmp(l));
        Ok(())
    }
}
