//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Expression parsing for the occ C compiler
//
// Classic recursive descent, one function per precedence level. Every
// node constructor checks its operand types before building the node,
// so an expression tree that exists is well typed; parse errors and
// type errors share the same failure channel. Implicit conversions
// (integer promotion, the usual arithmetic conversions, pointer
// normalization) are materialized as Cast nodes here, never during
// lowering.
//

use crate::diag::{CResult, CompileError, Position};
use crate::parse::ast::{BinOp, Expr, ExprKind, UnOp};
use crate::parse::parser::Compiler;
use crate::symbol::SymKind;
use crate::token::TokKind;
use crate::types::{PrimKind, Type, TypeId};

// ============================================================================
// Constant expression values
// ============================================================================

/// Result of folding a constant expression. `sym` is set when the value
/// is derived from the address of a data symbol (string literal or
/// address-of a global); such values are rejected wherever a pure
/// integer constant is required.
#[derive(Debug, Clone)]
pub(crate) struct CConst {
    pub(crate) v: i64,
    pub(crate) sym: Option<String>,
}

/// Truncate a folded value to the width and signedness of a target type.
fn trunc_const(v: i64, size: usize, signed: bool) -> i64 {
    match (size, signed) {
        (1, true) => v as i8 as i64,
        (1, false) => v as u8 as i64,
        (2, true) => v as i16 as i64,
        (2, false) => v as u16 as i64,
        (4, true) => v as i32 as i64,
        (4, false) => v as u32 as i64,
        _ => v,
    }
}

impl Compiler {
    // ------------------------------------------------------------------
    // Precedence levels
    // ------------------------------------------------------------------

    pub(crate) fn expr(&mut self) -> CResult<Expr> {
        let mut n = self.assign_expr()?;
        while self.kind() == TokKind::Comma {
            let p = self.pos();
            self.next()?;
            let r = self.assign_expr()?;
            let t = r.typ;
            n = Expr::new(
                ExprKind::Comma {
                    lhs: Box::new(n),
                    rhs: Box::new(r),
                },
                t,
                p,
            );
        }
        Ok(n)
    }

    pub(crate) fn assign_expr(&mut self) -> CResult<Expr> {
        let l = self.cond_expr()?;
        let k = self.kind();
        if matches!(
            k,
            TokKind::Assign
                | TokKind::AddAssign
                | TokKind::SubAssign
                | TokKind::MulAssign
                | TokKind::DivAssign
                | TokKind::ModAssign
                | TokKind::AndAssign
                | TokKind::OrAssign
                | TokKind::XorAssign
        ) {
            let p = self.pos();
            self.next()?;
            let r = self.assign_expr()?;
            return self.mk_assign(p, k, l, r);
        }
        Ok(l)
    }

    fn cond_expr(&mut self) -> CResult<Expr> {
        let c = self.logor_expr()?;
        if self.kind() != TokKind::Question {
            return Ok(c);
        }
        let p = self.pos();
        self.next()?;
        let t = self.expr()?;
        self.expect(TokKind::Colon)?;
        let f = self.cond_expr()?;
        if !self.types.same_type(t.typ, f.typ) {
            return Err(CompileError::typ(p, "both cases of ? must be same type"));
        }
        let typ = t.typ;
        Ok(Expr::new(
            ExprKind::Cond {
                cond: Box::new(c),
                then: Box::new(t),
                els: Box::new(f),
            },
            typ,
            p,
        ))
    }

    fn logor_expr(&mut self) -> CResult<Expr> {
        let mut l = self.logand_expr()?;
        while self.kind() == TokKind::OrOr {
            let p = self.pos();
            self.next()?;
            let r = self.logand_expr()?;
            l = self.mk_binop(p, BinOp::LogOr, l, r)?;
        }
        Ok(l)
    }

    fn logand_expr(&mut self) -> CResult<Expr> {
        let mut l = self.or_expr()?;
        while self.kind() == TokKind::AndAnd {
            let p = self.pos();
            self.next()?;
            let r = self.or_expr()?;
            l = self.mk_binop(p, BinOp::LogAnd, l, r)?;
        }
        Ok(l)
    }

    fn or_expr(&mut self) -> CResult<Expr> {
        let mut l = self.xor_expr()?;
        while self.kind() == TokKind::Pipe {
            let p = self.pos();
            self.next()?;
            let r = self.xor_expr()?;
            l = self.mk_binop(p, BinOp::BitOr, l, r)?;
        }
        Ok(l)
    }

    fn xor_expr(&mut self) -> CResult<Expr> {
        let mut l = self.and_expr()?;
        while self.kind() == TokKind::Caret {
            let p = self.pos();
            self.next()?;
            let r = self.and_expr()?;
            l = self.mk_binop(p, BinOp::BitXor, l, r)?;
        }
        Ok(l)
    }

    fn and_expr(&mut self) -> CResult<Expr> {
        let mut l = self.eql_expr()?;
        while self.kind() == TokKind::Amp {
            let p = self.pos();
            self.next()?;
            let r = self.eql_expr()?;
            l = self.mk_binop(p, BinOp::BitAnd, l, r)?;
        }
        Ok(l)
    }

    fn eql_expr(&mut self) -> CResult<Expr> {
        let mut l = self.rel_expr()?;
        loop {
            let op = match self.kind() {
                TokKind::EqEq => BinOp::Eq,
                TokKind::Ne => BinOp::Ne,
                _ => return Ok(l),
            };
            let p = self.pos();
            self.next()?;
            let r = self.rel_expr()?;
            l = self.mk_binop(p, op, l, r)?;
        }
    }

    fn rel_expr(&mut self) -> CResult<Expr> {
        let mut l = self.shift_expr()?;
        loop {
            let op = match self.kind() {
                TokKind::Lt => BinOp::Lt,
                TokKind::Gt => BinOp::Gt,
                TokKind::Le => BinOp::Le,
                TokKind::Ge => BinOp::Ge,
                _ => return Ok(l),
            };
            let p = self.pos();
            self.next()?;
            let r = self.shift_expr()?;
            l = self.mk_binop(p, op, l, r)?;
        }
    }

    fn shift_expr(&mut self) -> CResult<Expr> {
        let mut l = self.add_expr()?;
        loop {
            let op = match self.kind() {
                TokKind::Shl => BinOp::Shl,
                TokKind::Shr => BinOp::Shr,
                _ => return Ok(l),
            };
            let p = self.pos();
            self.next()?;
            let r = self.add_expr()?;
            l = self.mk_binop(p, op, l, r)?;
        }
    }

    fn add_expr(&mut self) -> CResult<Expr> {
        let mut l = self.mul_expr()?;
        loop {
            let op = match self.kind() {
                TokKind::Plus => BinOp::Add,
                TokKind::Minus => BinOp::Sub,
                _ => return Ok(l),
            };
            let p = self.pos();
            self.next()?;
            let r = self.mul_expr()?;
            l = self.mk_binop(p, op, l, r)?;
        }
    }

    fn mul_expr(&mut self) -> CResult<Expr> {
        let mut l = self.cast_expr()?;
        loop {
            let op = match self.kind() {
                TokKind::Star => BinOp::Mul,
                TokKind::Slash => BinOp::Div,
                TokKind::Percent => BinOp::Rem,
                _ => return Ok(l),
            };
            let p = self.pos();
            self.next()?;
            let r = self.cast_expr()?;
            l = self.mk_binop(p, op, l, r)?;
        }
    }

    fn cast_expr(&mut self) -> CResult<Expr> {
        if self.kind() == TokKind::LParen && self.is_type_start(self.lex.peek()) {
            self.next()?;
            let typ = self.typename()?;
            self.expect(TokKind::RParen)?;
            if self.kind() == TokKind::LBrace {
                // Compound literal
                return self.decl_init(typ);
            }
            let o = self.unary_expr()?;
            return self.mk_cast(o, typ);
        }
        self.unary_expr()
    }

    /// Abstract type name, as used in casts and sizeof.
    pub(crate) fn typename(&mut self) -> CResult<TypeId> {
        let p = self.pos();
        let (basety, _sclass) = self.declspecs()?;
        let (name, typ, _) = self.parse_declarator(basety, false)?;
        if name.is_some() {
            return Err(CompileError::token(p, "unexpected identifier in type name"));
        }
        Ok(typ)
    }

    fn unary_expr(&mut self) -> CResult<Expr> {
        match self.kind() {
            TokKind::Inc | TokKind::Dec => {
                let inc = self.kind() == TokKind::Inc;
                let p = self.pos();
                self.next()?;
                let n = self.unary_expr()?;
                self.mk_incdec(p, inc, false, n)
            }
            TokKind::Star => {
                let p = self.pos();
                self.next()?;
                let o = self.cast_expr()?;
                self.mk_unop(p, UnOp::Deref, o)
            }
            TokKind::Amp => {
                let p = self.pos();
                self.next()?;
                let o = self.cast_expr()?;
                self.mk_unop(p, UnOp::Addr, o)
            }
            TokKind::Minus => {
                let p = self.pos();
                self.next()?;
                let o = self.cast_expr()?;
                self.mk_unop(p, UnOp::Neg, o)
            }
            TokKind::Bang => {
                let p = self.pos();
                self.next()?;
                let o = self.cast_expr()?;
                self.mk_unop(p, UnOp::LogNot, o)
            }
            TokKind::Tilde => {
                let p = self.pos();
                self.next()?;
                let o = self.cast_expr()?;
                self.mk_unop(p, UnOp::BitNot, o)
            }
            TokKind::Sizeof => {
                let p = self.pos();
                self.next()?;
                let typ = if self.kind() == TokKind::LParen && self.is_type_start(self.lex.peek())
                {
                    self.next()?;
                    let t = self.typename()?;
                    self.expect(TokKind::RParen)?;
                    t
                } else {
                    self.unary_expr()?.typ
                };
                let size = match self.types.size_of(typ) {
                    Some(s) => s,
                    None => {
                        return Err(CompileError::typ(
                            p,
                            "cannot use incomplete type in sizeof",
                        ))
                    }
                };
                Ok(Expr::int_lit(size as i64, self.types.int_id, p))
            }
            _ => self.post_expr(),
        }
    }

    fn post_expr(&mut self) -> CResult<Expr> {
        let mut n = self.primary_expr()?;
        loop {
            match self.kind() {
                TokKind::LBracket => {
                    let p = self.pos();
                    self.next()?;
                    let idx = self.expr()?;
                    self.expect(TokKind::RBracket)?;
                    if self.types.base_of(n.typ).is_none() {
                        return Err(CompileError::typ(
                            p,
                            "can only index an array or pointer",
                        ));
                    }
                    let pa = self.mk_ptradd(p, n, idx, false)?;
                    let elem = self
                        .types
                        .base_of(pa.typ)
                        .expect("internal error: pointer add produced a non-pointer");
                    n = Expr::new(
                        ExprKind::Unary {
                            op: UnOp::Deref,
                            expr: Box::new(pa),
                        },
                        elem,
                        p,
                    );
                }
                TokKind::Dot => {
                    let p = self.pos();
                    if !self.types.is_record(n.typ) {
                        return Err(CompileError::typ(p, "expected a struct or union"));
                    }
                    if self.types.is_incomplete(n.typ) {
                        return Err(CompileError::typ(p, "selector on incomplete type"));
                    }
                    self.next()?;
                    let name = self.expect(TokKind::Ident)?.text;
                    let (offset, mty) = match self.types.member(n.typ, &name) {
                        Some(m) => m,
                        None => {
                            return Err(CompileError::typ(
                                p,
                                format!("struct has no member {}", name),
                            ))
                        }
                    };
                    n = Expr::new(
                        ExprKind::Member {
                            base: Box::new(n),
                            offset,
                        },
                        mty,
                        p,
                    );
                }
                TokKind::Arrow => {
                    let p = self.pos();
                    let rec = match self.types.get(n.typ) {
                        Type::Ptr { to } if self.types.is_record(*to) => *to,
                        _ => return Err(CompileError::typ(p, "expected a struct pointer")),
                    };
                    if self.types.is_incomplete(rec) {
                        return Err(CompileError::typ(p, "selector on incomplete type"));
                    }
                    self.next()?;
                    let name = self.expect(TokKind::Ident)?.text;
                    let (offset, mty) = match self.types.member(rec, &name) {
                        Some(m) => m,
                        None => {
                            return Err(CompileError::typ(
                                p,
                                format!("struct pointer has no member {}", name),
                            ))
                        }
                    };
                    let deref = Expr::new(
                        ExprKind::Unary {
                            op: UnOp::Deref,
                            expr: Box::new(n),
                        },
                        rec,
                        p,
                    );
                    n = Expr::new(
                        ExprKind::Member {
                            base: Box::new(deref),
                            offset,
                        },
                        mty,
                        p,
                    );
                }
                TokKind::LParen => {
                    n = self.call_expr(n)?;
                }
                TokKind::Inc => {
                    let p = self.pos();
                    n = self.mk_incdec(p, true, true, n)?;
                    self.next()?;
                }
                TokKind::Dec => {
                    let p = self.pos();
                    n = self.mk_incdec(p, false, true, n)?;
                    self.next()?;
                }
                _ => return Ok(n),
            }
        }
    }

    fn call_expr(&mut self, funclike: Expr) -> CResult<Expr> {
        let pos = self.pos();
        self.expect(TokKind::LParen)?;
        let fty = if self.types.is_func(funclike.typ) {
            funclike.typ
        } else if self.types.is_func_ptr(funclike.typ) {
            self.types
                .base_of(funclike.typ)
                .expect("internal error: function pointer without pointee")
        } else {
            return Err(CompileError::typ(pos, "cannot call non function"));
        };
        let (ret, ptypes, variadic) = match self.types.get(fty) {
            Type::Func {
                ret,
                params,
                variadic,
            } => (
                *ret,
                params.iter().map(|p| p.typ).collect::<Vec<_>>(),
                *variadic,
            ),
            _ => panic!("internal error: call target is not a function type"),
        };
        let mut args = Vec::new();
        if self.kind() != TokKind::RParen {
            loop {
                args.push(self.assign_expr()?);
                if self.kind() != TokKind::Comma {
                    break;
                }
                self.next()?;
            }
        }
        self.expect(TokKind::RParen)?;
        if args.len() < ptypes.len() {
            return Err(CompileError::typ(pos, "function called with too few args"));
        }
        if args.len() > ptypes.len() && !variadic {
            return Err(CompileError::typ(pos, "function called with too many args"));
        }
        // Fixed arguments convert to the declared parameter types;
        // variadic extras pass through unchanged
        let mut conv = Vec::with_capacity(args.len());
        for (i, a) in args.into_iter().enumerate() {
            conv.push(match ptypes.get(i) {
                Some(&pt) => self.mk_cast(a, pt)?,
                None => a,
            });
        }
        Ok(Expr::new(
            ExprKind::Call {
                func: Box::new(funclike),
                args: conv,
            },
            ret,
            pos,
        ))
    }

    fn primary_expr(&mut self) -> CResult<Expr> {
        let pos = self.pos();
        match self.kind() {
            TokKind::Ident => {
                if self.cur().text == "__builtin_va_start" {
                    return self.va_start();
                }
                let name = self.cur().text.clone();
                let sym = match self.scopes.lookup(&name) {
                    Some(s) => s,
                    None => {
                        return Err(CompileError::typ(
                            pos,
                            format!("undefined symbol {}", name),
                        ))
                    }
                };
                self.next()?;
                if matches!(self.scopes.get(sym).kind, SymKind::Typedef) {
                    return Err(CompileError::typ(
                        pos,
                        format!("unexpected type name {} in expression", name),
                    ));
                }
                let typ = self.scopes.get(sym).typ;
                // Enumeration constants fold to their value right here
                if let SymKind::EnumConst { value } = self.scopes.get(sym).kind {
                    return Ok(Expr::int_lit(value, typ, pos));
                }
                Ok(Expr::new(ExprKind::Ident(sym), typ, pos))
            }
            TokKind::IntLit => {
                let text = self.cur().text.clone();
                self.next()?;
                let v = parse_int_text(&text)
                    .ok_or_else(|| CompileError::token(pos, "integer constant out of range"))?;
                Ok(Expr::int_lit(v, self.types.int_id, pos))
            }
            TokKind::CharLit => {
                let text = self.cur().text.clone();
                self.next()?;
                let v = decode_char_lit(&text)
                    .ok_or_else(|| CompileError::token(pos, "unknown escape code"))?;
                Ok(Expr::int_lit(v, self.types.int_id, pos))
            }
            TokKind::StrLit => {
                let bytes = self.cur().text.clone().into_bytes();
                self.next()?;
                let typ = self.types.ptr_to(self.types.char_id);
                Ok(Expr::new(ExprKind::StrLit(bytes), typ, pos))
            }
            TokKind::LParen => {
                self.next()?;
                let e = self.expr()?;
                self.expect(TokKind::RParen)?;
                Ok(e)
            }
            _ => Err(CompileError::token(
                pos,
                "expected an ident, constant, string or (",
            )),
        }
    }

    fn va_start(&mut self) -> CResult<Expr> {
        let pos = self.pos();
        self.expect(TokKind::Ident)?;
        self.expect(TokKind::LParen)?;
        let ap = self.assign_expr()?;
        if !ap.is_lvalue() {
            return Err(CompileError::typ(ap.pos, "va_start expects an lvalue"));
        }
        self.expect(TokKind::Comma)?;
        let param = self.assign_expr()?;
        self.expect(TokKind::RParen)?;
        match &param.kind {
            ExprKind::Ident(sym) => {
                let is_param = matches!(
                    self.scopes.get(*sym).kind,
                    SymKind::Local { param: Some(_), .. }
                );
                if !is_param {
                    return Err(CompileError::typ(
                        pos,
                        "expected a parameter symbol in va_start",
                    ));
                }
            }
            _ => {
                return Err(CompileError::typ(pos, "expected an identifier in va_start"));
            }
        }
        Ok(Expr::new(
            ExprKind::VaStart { ap: Box::new(ap) },
            self.types.void_id,
            pos,
        ))
    }

    // ------------------------------------------------------------------
    // Node constructors
    // ------------------------------------------------------------------

    fn is_scalar(&self, t: TypeId) -> bool {
        self.types.is_arith(t) || self.types.is_ptr(t)
    }

    pub(crate) fn mk_binop(
        &mut self,
        pos: Position,
        op: BinOp,
        mut l: Expr,
        mut r: Expr,
    ) -> CResult<Expr> {
        if op == BinOp::Add {
            if self.types.is_ptr(l.typ) || self.types.is_arr(l.typ) {
                return self.mk_ptradd(pos, l, r, false);
            }
            if self.types.is_ptr(r.typ) || self.types.is_arr(r.typ) {
                return self.mk_ptradd(pos, r, l, false);
            }
        }
        if op == BinOp::Sub && (self.types.is_ptr(l.typ) || self.types.is_arr(l.typ)) {
            if self.types.is_ptr(r.typ) || self.types.is_arr(r.typ) {
                return Err(CompileError::typ(pos, "pointer subtraction is not supported"));
            }
            return self.mk_ptradd(pos, l, r, true);
        }

        if op.is_logical() {
            if !self.is_scalar(l.typ) || !self.is_scalar(r.typ) {
                return Err(CompileError::typ(
                    pos,
                    "logical operator requires scalar operands",
                ));
            }
            return Ok(Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(l),
                    rhs: Box::new(r),
                },
                self.types.int_id,
                pos,
            ));
        }

        let lptr = self.types.is_ptr(l.typ);
        let rptr = self.types.is_ptr(r.typ);
        if op.is_cmp() {
            if lptr || rptr {
                if lptr && !rptr {
                    if !self.types.is_itype(r.typ) {
                        return Err(CompileError::typ(pos, "invalid operands to comparison"));
                    }
                    let to = l.typ;
                    r = self.mk_cast(r, to)?;
                } else if rptr && !lptr {
                    if !self.types.is_itype(l.typ) {
                        return Err(CompileError::typ(pos, "invalid operands to comparison"));
                    }
                    let to = r.typ;
                    l = self.mk_cast(l, to)?;
                }
            } else {
                if !self.types.is_arith(l.typ) || !self.types.is_arith(r.typ) {
                    return Err(CompileError::typ(pos, "invalid operands to comparison"));
                }
                self.usual_arith_conv(&mut l, &mut r)?;
            }
            // Comparison result type is signed int, always
            return Ok(Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(l),
                    rhs: Box::new(r),
                },
                self.types.int_id,
                pos,
            ));
        }

        if lptr || rptr {
            return Err(CompileError::typ(pos, "invalid operands to binary operator"));
        }
        if op.int_only() && (!self.types.is_itype(l.typ) || !self.types.is_itype(r.typ)) {
            return Err(CompileError::typ(pos, "operator requires integer operands"));
        }
        if !self.types.is_arith(l.typ) || !self.types.is_arith(r.typ) {
            return Err(CompileError::typ(pos, "invalid operands to binary operator"));
        }
        let t = self.usual_arith_conv(&mut l, &mut r)?;
        Ok(Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(l),
                rhs: Box::new(r),
            },
            t,
            pos,
        ))
    }

    /// Pointer plus integer, normalized to (pointer, offset) order. The
    /// index converts to long; scaling by the element size happens at
    /// lowering.
    pub(crate) fn mk_ptradd(
        &mut self,
        pos: Position,
        ptr: Expr,
        idx: Expr,
        sub: bool,
    ) -> CResult<Expr> {
        if !self.types.is_itype(idx.typ) {
            return Err(CompileError::typ(
                idx.pos,
                "addition with a pointer requires an integer type",
            ));
        }
        let elem = self
            .types
            .base_of(ptr.typ)
            .expect("internal error: pointer add on non-pointer");
        let elem_size = match self.types.size_of(elem) {
            Some(s) => s,
            None => {
                return Err(CompileError::typ(
                    pos,
                    "pointer arithmetic on incomplete type",
                ))
            }
        };
        let idx = self.mk_cast(idx, self.types.long_id)?;
        let typ = if self.types.is_arr(ptr.typ) {
            self.types.ptr_to(elem)
        } else {
            ptr.typ
        };
        Ok(Expr::new(
            ExprKind::PtrAdd {
                ptr: Box::new(ptr),
                idx: Box::new(idx),
                elem_size,
                sub,
            },
            typ,
            pos,
        ))
    }

    pub(crate) fn mk_assign(
        &mut self,
        pos: Position,
        k: TokKind,
        l: Expr,
        r: Expr,
    ) -> CResult<Expr> {
        if !l.is_lvalue() {
            return Err(CompileError::typ(l.pos, "assign expects an lvalue"));
        }
        let op = match k {
            TokKind::Assign => None,
            TokKind::AddAssign => Some(BinOp::Add),
            TokKind::SubAssign => Some(BinOp::Sub),
            TokKind::MulAssign => Some(BinOp::Mul),
            TokKind::DivAssign => Some(BinOp::Div),
            TokKind::ModAssign => Some(BinOp::Rem),
            TokKind::AndAssign => Some(BinOp::BitAnd),
            TokKind::OrAssign => Some(BinOp::BitOr),
            TokKind::XorAssign => Some(BinOp::BitXor),
            _ => panic!("internal error: not an assignment operator"),
        };
        if let Some(o) = op {
            if o.int_only() && !self.types.is_itype(l.typ) {
                return Err(CompileError::typ(pos, "operator requires integer operands"));
            }
        }
        let r = match op {
            Some(BinOp::Add) | Some(BinOp::Sub) if self.types.is_ptr(l.typ) => {
                if !self.types.is_itype(r.typ) {
                    return Err(CompileError::typ(
                        r.pos,
                        "addition with a pointer requires an integer type",
                    ));
                }
                self.mk_cast(r, self.types.long_id)?
            }
            _ => {
                let to = l.typ;
                self.mk_cast(r, to)?
            }
        };
        let typ = l.typ;
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                dst: Box::new(l),
                src: Box::new(r),
            },
            typ,
            pos,
        ))
    }

    pub(crate) fn mk_unop(&mut self, pos: Position, op: UnOp, o: Expr) -> CResult<Expr> {
        let (o, typ) = match op {
            UnOp::Addr => {
                if !o.is_lvalue() {
                    return Err(CompileError::typ(o.pos, "& expects an lvalue"));
                }
                let t = self.types.ptr_to(o.typ);
                (o, t)
            }
            UnOp::Deref => {
                if !self.types.is_ptr(o.typ) && !self.types.is_arr(o.typ) {
                    return Err(CompileError::typ(o.pos, "cannot deref non pointer"));
                }
                let t = self
                    .types
                    .base_of(o.typ)
                    .expect("internal error: pointer without pointee");
                (o, t)
            }
            UnOp::LogNot => {
                if !self.is_scalar(o.typ) {
                    return Err(CompileError::typ(o.pos, "! requires a scalar operand"));
                }
                (o, self.types.int_id)
            }
            UnOp::Neg => {
                if !self.types.is_arith(o.typ) {
                    return Err(CompileError::typ(o.pos, "- requires an arithmetic operand"));
                }
                let o = if self.types.is_itype(o.typ) {
                    self.ipromote(o)
                } else {
                    o
                };
                let t = o.typ;
                (o, t)
            }
            UnOp::BitNot => {
                if !self.types.is_itype(o.typ) {
                    return Err(CompileError::typ(o.pos, "~ requires an integer operand"));
                }
                let o = self.ipromote(o);
                let t = o.typ;
                (o, t)
            }
        };
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                expr: Box::new(o),
            },
            typ,
            pos,
        ))
    }

    pub(crate) fn mk_incdec(
        &mut self,
        pos: Position,
        inc: bool,
        post: bool,
        operand: Expr,
    ) -> CResult<Expr> {
        if !operand.is_lvalue() {
            return Err(CompileError::typ(
                operand.pos,
                "++ and -- expects an lvalue",
            ));
        }
        if !self.is_scalar(operand.typ) {
            return Err(CompileError::typ(
                operand.pos,
                "++ and -- expects a scalar operand",
            ));
        }
        let typ = operand.typ;
        Ok(Expr::new(
            ExprKind::IncDec {
                pre: !post,
                inc,
                expr: Box::new(operand),
            },
            typ,
            pos,
        ))
    }

    /// Conversion to a target type. A cast between identical types is a
    /// no-op returning the original node.
    pub(crate) fn mk_cast(&mut self, o: Expr, to: TypeId) -> CResult<Expr> {
        if self.types.same_type(o.typ, to) {
            return Ok(o);
        }
        let pos = o.pos;
        Ok(Expr::new(
            ExprKind::Cast { expr: Box::new(o) },
            to,
            pos,
        ))
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    /// Integer promotion: char and short (either signedness) promote to
    /// int or unsigned int; enum promotes to int. Idempotent.
    pub(crate) fn ipromote(&mut self, e: Expr) -> Expr {
        let target = match self.types.get(e.typ) {
            Type::Prim { kind, signed } => match kind {
                PrimKind::Char | PrimKind::Short => {
                    if *signed {
                        Some(self.types.int_id)
                    } else {
                        Some(self.types.uint_id)
                    }
                }
                _ => None,
            },
            Type::Enum { .. } => Some(self.types.int_id),
            _ => panic!("internal error: integer promotion of non-integer type"),
        };
        match target {
            Some(t) => self
                .mk_cast(e, t)
                .expect("internal error: promotion cast failed"),
            None => e,
        }
    }

    /// The usual arithmetic conversions: the classic five-way ladder,
    /// in this order. Mutates both operands to the common type and
    /// returns it.
    pub(crate) fn usual_arith_conv(&mut self, a: &mut Expr, b: &mut Expr) -> CResult<TypeId> {
        if !self.types.is_arith(a.typ) || !self.types.is_arith(b.typ) {
            panic!("internal error: usual arithmetic conversion on non-arithmetic operands");
        }
        let (large, small) = if self.types.conv_rank(a.typ) < self.types.conv_rank(b.typ) {
            (b, a)
        } else {
            (a, b)
        };
        if self.types.is_ftype(large.typ) {
            let to = large.typ;
            self.cast_in_place(small, to)?;
            return Ok(to);
        }
        self.promote_in_place(large);
        self.promote_in_place(small);
        if self.types.same_type(large.typ, small.typ) {
            return Ok(large.typ);
        }
        if self.types.is_signed(large.typ) == self.types.is_signed(small.typ) {
            let to = large.typ;
            self.cast_in_place(small, to)?;
            return Ok(to);
        }
        if !self.types.is_signed(large.typ) {
            let to = large.typ;
            self.cast_in_place(small, to)?;
            return Ok(to);
        }
        if self.types.can_represent(large.typ, small.typ) {
            let to = large.typ;
            self.cast_in_place(small, to)?;
            return Ok(to);
        }
        let u = self.types.unsigned_of(large.typ);
        self.cast_in_place(large, u)?;
        self.cast_in_place(small, u)?;
        Ok(u)
    }

    fn cast_in_place(&mut self, e: &mut Expr, to: TypeId) -> CResult<()> {
        if self.types.same_type(e.typ, to) {
            return Ok(());
        }
        let pos = e.pos;
        let inner = std::mem::replace(e, Expr::int_lit(0, to, pos));
        *e = Expr::new(
            ExprKind::Cast {
                expr: Box::new(inner),
            },
            to,
            pos,
        );
        Ok(())
    }

    fn promote_in_place(&mut self, e: &mut Expr) {
        let pos = e.pos;
        let inner = std::mem::replace(e, Expr::int_lit(0, self.types.int_id, pos));
        *e = self.ipromote(inner);
    }

    // ------------------------------------------------------------------
    // Constant expressions
    // ------------------------------------------------------------------

    /// Parse and fold a constant expression (conditional-expression
    /// grammar, no assignment or comma).
    pub(crate) fn constexpr(&mut self) -> CResult<CConst> {
        let n = self.cond_expr()?;
        self.fold_expr(&n)
    }

    /// Fold a well-typed expression tree to a constant. Identifier
    /// loads, calls, and anything address-dependent beyond plain symbol
    /// addresses is not a constant expression.
    pub(crate) fn fold_expr(&mut self, e: &Expr) -> CResult<CConst> {
        let not_const = CompileError::constexpr(e.pos, "not a constant expression");
        match &e.kind {
            ExprKind::IntLit(v) => Ok(CConst { v: *v, sym: None }),
            ExprKind::StrLit(bytes) => Ok(CConst {
                v: 0,
                sym: Some(self.module.string_lit(bytes)),
            }),
            // A function designator is its address
            ExprKind::Ident(s)
                if self.scopes.get(*s).is_global() && self.types.is_func(e.typ) =>
            {
                Ok(CConst {
                    v: 0,
                    sym: Some(self.scopes.get(*s).link_name().to_string()),
                })
            }
            ExprKind::Unary { op, expr } => match op {
                UnOp::Addr => match &expr.kind {
                    ExprKind::Ident(s) if self.scopes.get(*s).is_global() => Ok(CConst {
                        v: 0,
                        sym: Some(self.scopes.get(*s).link_name().to_string()),
                    }),
                    _ => Err(not_const),
                },
                UnOp::Neg | UnOp::BitNot | UnOp::LogNot => {
                    let c = self.fold_expr(expr)?;
                    if c.sym.is_some() {
                        return Err(not_const);
                    }
                    let v = match op {
                        UnOp::Neg => c.v.wrapping_neg(),
                        UnOp::BitNot => !c.v,
                        UnOp::LogNot => (c.v == 0) as i64,
                        _ => unreachable!(),
                    };
                    Ok(CConst { v, sym: None })
                }
                UnOp::Deref => Err(not_const),
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.fold_expr(lhs)?;
                let r = self.fold_expr(rhs)?;
                if l.sym.is_some() || r.sym.is_some() {
                    return Err(not_const);
                }
                let signed = self.types.is_signed(lhs.typ);
                let v = match op {
                    BinOp::Add => l.v.wrapping_add(r.v),
                    BinOp::Sub => l.v.wrapping_sub(r.v),
                    BinOp::Mul => l.v.wrapping_mul(r.v),
                    BinOp::Div | BinOp::Rem => {
                        if r.v == 0 {
                            return Err(CompileError::constexpr(
                                e.pos,
                                "division by zero in constant expression",
                            ));
                        }
                        match (op, signed) {
                            (BinOp::Div, true) => l.v.wrapping_div(r.v),
                            (BinOp::Div, false) => ((l.v as u64) / (r.v as u64)) as i64,
                            (BinOp::Rem, true) => l.v.wrapping_rem(r.v),
                            (BinOp::Rem, false) => ((l.v as u64) % (r.v as u64)) as i64,
                            _ => unreachable!(),
                        }
                    }
                    BinOp::Shl => l.v.wrapping_shl(r.v as u32 & 63),
                    BinOp::Shr => {
                        if signed {
                            l.v.wrapping_shr(r.v as u32 & 63)
                        } else {
                            ((l.v as u64).wrapping_shr(r.v as u32 & 63)) as i64
                        }
                    }
                    BinOp::BitAnd => l.v & r.v,
                    BinOp::BitOr => l.v | r.v,
                    BinOp::BitXor => l.v ^ r.v,
                    BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                        let c = if signed {
                            l.v.cmp(&r.v)
                        } else {
                            (l.v as u64).cmp(&(r.v as u64))
                        };
                        let res = match op {
                            BinOp::Lt => c.is_lt(),
                            BinOp::Gt => c.is_gt(),
                            BinOp::Le => c.is_le(),
                            BinOp::Ge => c.is_ge(),
                            _ => unreachable!(),
                        };
                        res as i64
                    }
                    BinOp::Eq => (l.v == r.v) as i64,
                    BinOp::Ne => (l.v != r.v) as i64,
                    BinOp::LogAnd => (l.v != 0 && r.v != 0) as i64,
                    BinOp::LogOr => (l.v != 0 || r.v != 0) as i64,
                };
                Ok(CConst { v, sym: None })
            }
            ExprKind::Cond { cond, then, els } => {
                let c = self.fold_expr(cond)?;
                if c.sym.is_some() {
                    return Err(not_const);
                }
                if c.v != 0 {
                    self.fold_expr(then)
                } else {
                    self.fold_expr(els)
                }
            }
            ExprKind::Cast { expr } => {
                let c = self.fold_expr(expr)?;
                if c.sym.is_some() {
                    // Pointer-derived values survive only pointer casts
                    if self.types.is_ptr(e.typ) {
                        return Ok(c);
                    }
                    return Err(not_const);
                }
                let size = self.types.size_of(e.typ).unwrap_or(8);
                let signed = self.types.is_signed(e.typ);
                Ok(CConst {
                    v: trunc_const(c.v, size, signed),
                    sym: None,
                })
            }
            ExprKind::PtrAdd {
                ptr,
                idx,
                elem_size,
                sub,
            } => {
                let p = self.fold_expr(ptr)?;
                let i = self.fold_expr(idx)?;
                if p.sym.is_none() || i.sym.is_some() {
                    return Err(not_const);
                }
                let off = i.v.wrapping_mul(*elem_size as i64);
                let v = if *sub {
                    p.v.wrapping_sub(off)
                } else {
                    p.v.wrapping_add(off)
                };
                Ok(CConst { v, sym: p.sym })
            }
            _ => Err(not_const),
        }
    }
}

// ============================================================================
// Literal decoding
// ============================================================================

/// Parse an integer literal's text: hex with 0x prefix, decimal
/// otherwise, trailing u/l suffixes ignored.
fn parse_int_text(text: &str) -> Option<i64> {
    let t = text.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as i64);
    }
    t.parse::<i64>().ok()
}

/// Decode a character constant's raw text, quotes included.
fn decode_char_lit(text: &str) -> Option<i64> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let bytes = inner.as_bytes();
    if bytes.first() == Some(&b'\\') {
        let v = match bytes.get(1)? {
            b'n' => b'\n',
            b't' => b'\t',
            b'r' => b'\r',
            b'0' => 0,
            b'\\' => b'\\',
            b'\'' => b'\'',
            _ => return None,
        };
        return Some(v as i64);
    }
    bytes.first().map(|&b| b as i64)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_text() {
        assert_eq!(parse_int_text("42"), Some(42));
        assert_eq!(parse_int_text("0x1f"), Some(31));
        assert_eq!(parse_int_text("7ul"), Some(7));
        assert_eq!(parse_int_text("0"), Some(0));
    }

    #[test]
    fn test_decode_char_lit() {
        assert_eq!(decode_char_lit("'a'"), Some('a' as i64));
        assert_eq!(decode_char_lit("'\\n'"), Some(10));
        assert_eq!(decode_char_lit("'\\0'"), Some(0));
        assert_eq!(decode_char_lit("'\\q'"), None);
    }

    #[test]
    fn test_trunc_const() {
        assert_eq!(trunc_const(300, 1, false), 44);
        assert_eq!(trunc_const(-1, 1, false), 255);
        assert_eq!(trunc_const(0xffff_ffff, 4, true), -1);
        assert_eq!(trunc_const(0x1_0000_0001, 4, false), 1);
    }
}
