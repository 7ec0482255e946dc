//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Expression lowering for the occ C compiler
//
// Turns typed expression trees into IR in the current block. Scalars
// lower to register values; arrays, functions, and records lower to
// their address. Short-circuit operators and the conditional operator
// split blocks and pass their result through a stack slot, so lowering
// never needs phi nodes.
//

use crate::diag::{CResult, CompileError};
use crate::ir::{ir_type_of, mem_class_of, DataItem, IrType, IrVal, MemClass, Opcode, Term};
use crate::parse::ast::{BinOp, Expr, ExprKind, InitEntry, UnOp};
use crate::parse::parser::Compiler;
use crate::symbol::{Linkage, SymId, SymKind};
use crate::types::{Type, TypeId};

/// Opcode for an arithmetic or bitwise binary operator, given the
/// signedness of its (already converted) operands.
fn arith_opcode(op: BinOp, signed: bool) -> Opcode {
    match op {
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Div => {
            if signed {
                Opcode::DivS
            } else {
                Opcode::DivU
            }
        }
        BinOp::Rem => {
            if signed {
                Opcode::RemS
            } else {
                Opcode::RemU
            }
        }
        BinOp::BitAnd => Opcode::And,
        BinOp::BitOr => Opcode::Or,
        BinOp::BitXor => Opcode::Xor,
        BinOp::Shl => Opcode::Shl,
        BinOp::Shr => {
            if signed {
                Opcode::ShrA
            } else {
                Opcode::ShrL
            }
        }
        _ => panic!("internal error: not an arithmetic operator"),
    }
}

fn cmp_opcode(op: BinOp, signed: bool) -> Opcode {
    match (op, signed) {
        (BinOp::Eq, _) => Opcode::CEq,
        (BinOp::Ne, _) => Opcode::CNe,
        (BinOp::Lt, true) => Opcode::CSLt,
        (BinOp::Lt, false) => Opcode::CULt,
        (BinOp::Le, true) => Opcode::CSLe,
        (BinOp::Le, false) => Opcode::CULe,
        (BinOp::Gt, true) => Opcode::CSGt,
        (BinOp::Gt, false) => Opcode::CUGt,
        (BinOp::Ge, true) => Opcode::CSGe,
        (BinOp::Ge, false) => Opcode::CUGe,
        _ => panic!("internal error: not a comparison operator"),
    }
}

impl Compiler {
    /// Types whose values travel by address.
    fn by_address(&self, t: TypeId) -> bool {
        self.types.is_arr(t) || self.types.is_func(t) || self.types.is_record(t)
    }

    // ------------------------------------------------------------------
    // Slots, loads, stores
    // ------------------------------------------------------------------

    /// Reserve a stack slot for an object of this type and return its
    /// address register.
    pub(crate) fn alloca_slot(&mut self, typ: TypeId) -> IrVal {
        let size = self
            .types
            .size_of(typ)
            .expect("internal error: stack slot for incomplete type");
        let align = self.types.align_of(typ);
        let dst = self.module.new_reg(IrType::L);
        self.module
            .append(Opcode::Alloca { size, align }, Some(dst.clone()), vec![]);
        dst
    }

    pub(crate) fn emit_load(&mut self, addr: IrVal, typ: TypeId) -> IrVal {
        let mem = mem_class_of(&self.types, typ);
        let dst = self.module.new_reg(mem.reg_type());
        self.module
            .append(Opcode::Load { mem }, Some(dst.clone()), vec![addr]);
        dst
    }

    /// Store a value at an address. Record values arrive as a source
    /// address and copy bytewise.
    pub(crate) fn emit_store(&mut self, addr: IrVal, v: IrVal, typ: TypeId) {
        if self.types.is_record(typ) {
            let bytes = self
                .types
                .size_of(typ)
                .expect("internal error: store of incomplete record");
            self.module
                .append(Opcode::Blit { bytes }, None, vec![v, addr]);
            return;
        }
        let mem = mem_class_of(&self.types, typ);
        self.module
            .append(Opcode::Store { mem }, None, vec![v, addr]);
    }

    // ------------------------------------------------------------------
    // Value conversion
    // ------------------------------------------------------------------

    /// Convert a register value between C types: integer widening and
    /// narrowing, int/float moves, float precision changes. Same-class
    /// pointer and integer conversions are free.
    pub(crate) fn convert(&mut self, v: IrVal, from: TypeId, to: TypeId) -> IrVal {
        if matches!(self.types.get(to), Type::Void) {
            return v;
        }
        let ft = ir_type_of(&self.types, from);
        let tt = ir_type_of(&self.types, to);
        if ft.is_int() && tt.is_int() {
            // Narrowing to a sub-word type re-extends within the register
            let tsize = self.types.size_of(to).unwrap_or(8);
            if tsize <= 2 {
                let op = match (tsize, self.types.is_signed(to)) {
                    (1, true) => Opcode::ExtSB,
                    (1, false) => Opcode::ExtUB,
                    (2, true) => Opcode::ExtSH,
                    (2, false) => Opcode::ExtUH,
                    _ => unreachable!(),
                };
                let dst = self.module.new_reg(IrType::W);
                self.module.append(op, Some(dst.clone()), vec![v]);
                return dst;
            }
            if ft == tt {
                return v;
            }
            if tt == IrType::L {
                let op = if self.types.is_signed(from) {
                    Opcode::ExtSW
                } else {
                    Opcode::ExtUW
                };
                let dst = self.module.new_reg(IrType::L);
                self.module.append(op, Some(dst.clone()), vec![v]);
                return dst;
            }
            // l to w truncation
            let dst = self.module.new_reg(IrType::W);
            self.module.append(Opcode::Copy, Some(dst.clone()), vec![v]);
            return dst;
        }
        if ft.is_int() && !tt.is_int() {
            let op = match (ft, self.types.is_signed(from)) {
                (IrType::W, true) => Opcode::SWToF,
                (IrType::W, false) => Opcode::UWToF,
                (IrType::L, true) => Opcode::SLToF,
                (IrType::L, false) => Opcode::ULToF,
                _ => unreachable!(),
            };
            let dst = self.module.new_reg(tt);
            self.module.append(op, Some(dst.clone()), vec![v]);
            return dst;
        }
        if !ft.is_int() && tt.is_int() {
            let op = if ft == IrType::S {
                Opcode::SToSI
            } else {
                Opcode::DToSI
            };
            let dst = self.module.new_reg(tt);
            self.module.append(op, Some(dst.clone()), vec![v]);
            return dst;
        }
        if ft == tt {
            return v;
        }
        let op = if tt == IrType::D {
            Opcode::ExtS
        } else {
            Opcode::TruncD
        };
        let dst = self.module.new_reg(tt);
        self.module.append(op, Some(dst.clone()), vec![v]);
        dst
    }

    // ------------------------------------------------------------------
    // Addresses
    // ------------------------------------------------------------------

    /// Address of an lvalue. Only identifier, dereference, and member
    /// shapes can reach here; the type checker guarantees it.
    pub(crate) fn lower_addr(&mut self, e: &Expr) -> CResult<IrVal> {
        match &e.kind {
            ExprKind::Ident(sym) => match &self.scopes.get(*sym).kind {
                SymKind::Local { addr, .. } => Ok(IrVal::Reg {
                    ty: IrType::L,
                    n: *addr,
                }),
                SymKind::Global { link_name, .. } => Ok(IrVal::Global(link_name.clone())),
                _ => panic!("internal error: address of non-object symbol"),
            },
            ExprKind::Unary {
                op: UnOp::Deref,
                expr,
            } => self.lower_expr(expr),
            ExprKind::Member { base, offset } => {
                let b = self.lower_addr(base)?;
                if *offset == 0 {
                    return Ok(b);
                }
                let dst = self.module.new_reg(IrType::L);
                self.module.append(
                    Opcode::Add,
                    Some(dst.clone()),
                    vec![
                        b,
                        IrVal::Const {
                            ty: IrType::L,
                            v: *offset as i64,
                        },
                    ],
                );
                Ok(dst)
            }
            _ => panic!("internal error: address of non-lvalue"),
        }
    }

    // ------------------------------------------------------------------
    // Expression lowering
    // ------------------------------------------------------------------

    pub(crate) fn lower_expr(&mut self, e: &Expr) -> CResult<IrVal> {
        match &e.kind {
            ExprKind::IntLit(v) => Ok(IrVal::Const {
                ty: ir_type_of(&self.types, e.typ),
                v: *v,
            }),
            ExprKind::StrLit(bytes) => Ok(IrVal::Global(self.module.string_lit(bytes))),
            ExprKind::Ident(_) | ExprKind::Member { .. } => {
                let addr = self.lower_addr(e)?;
                if self.by_address(e.typ) {
                    return Ok(addr);
                }
                Ok(self.emit_load(addr, e.typ))
            }
            ExprKind::Unary { op, expr } => match op {
                UnOp::Addr => self.lower_addr(expr),
                UnOp::Deref => {
                    let addr = self.lower_expr(expr)?;
                    if self.by_address(e.typ) {
                        return Ok(addr);
                    }
                    Ok(self.emit_load(addr, e.typ))
                }
                UnOp::Neg => {
                    let v = self.lower_expr(expr)?;
                    let ty = v.ty();
                    let dst = self.module.new_reg(ty);
                    self.module.append(
                        Opcode::Sub,
                        Some(dst.clone()),
                        vec![IrVal::Const { ty, v: 0 }, v],
                    );
                    Ok(dst)
                }
                UnOp::BitNot => {
                    let v = self.lower_expr(expr)?;
                    let ty = v.ty();
                    let dst = self.module.new_reg(ty);
                    self.module.append(
                        Opcode::Xor,
                        Some(dst.clone()),
                        vec![v, IrVal::Const { ty, v: -1 }],
                    );
                    Ok(dst)
                }
                UnOp::LogNot => {
                    let v = self.lower_expr(expr)?;
                    let ty = v.ty();
                    let dst = self.module.new_reg(IrType::W);
                    self.module.append(
                        Opcode::CEq,
                        Some(dst.clone()),
                        vec![v, IrVal::Const { ty, v: 0 }],
                    );
                    Ok(dst)
                }
            },
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, e.typ),
            ExprKind::PtrAdd {
                ptr,
                idx,
                elem_size,
                sub,
            } => {
                let pv = self.lower_expr(ptr)?;
                let iv = self.lower_expr(idx)?;
                let scaled = self.module.new_reg(IrType::L);
                self.module.append(
                    Opcode::Mul,
                    Some(scaled.clone()),
                    vec![
                        iv,
                        IrVal::Const {
                            ty: IrType::L,
                            v: *elem_size as i64,
                        },
                    ],
                );
                let op = if *sub { Opcode::Sub } else { Opcode::Add };
                let dst = self.module.new_reg(IrType::L);
                self.module.append(op, Some(dst.clone()), vec![pv, scaled]);
                Ok(dst)
            }
            ExprKind::Assign { op, dst, src } => self.lower_assign(*op, dst, src),
            ExprKind::IncDec { pre, inc, expr } => {
                let addr = self.lower_addr(expr)?;
                let old = self.emit_load(addr.clone(), expr.typ);
                let ty = old.ty();
                let delta = match self.types.base_of(expr.typ) {
                    Some(elem) if self.types.is_ptr(expr.typ) => {
                        self.types.size_of(elem).ok_or_else(|| {
                            CompileError::typ(e.pos, "pointer arithmetic on incomplete type")
                        })? as i64
                    }
                    _ => 1,
                };
                let op = if *inc { Opcode::Add } else { Opcode::Sub };
                let new = self.module.new_reg(ty);
                self.module.append(
                    op,
                    Some(new.clone()),
                    vec![old.clone(), IrVal::Const { ty, v: delta }],
                );
                self.emit_store(addr, new.clone(), expr.typ);
                Ok(if *pre { new } else { old })
            }
            ExprKind::Cond { cond, then, els } => self.lower_cond(cond, then, els, e.typ),
            ExprKind::Call { func, args } => self.lower_call(func, args, e.typ),
            ExprKind::Comma { lhs, rhs } => {
                self.lower_expr(lhs)?;
                self.lower_expr(rhs)
            }
            ExprKind::Cast { expr } => {
                let v = self.lower_expr(expr)?;
                Ok(self.convert(v, expr.typ, e.typ))
            }
            ExprKind::Init(_) => {
                // Compound literal: a fresh anonymous stack object
                let slot = self.alloca_slot(e.typ);
                self.store_init(slot.clone(), e.typ, e)?;
                if self.by_address(e.typ) {
                    return Ok(slot);
                }
                Ok(self.emit_load(slot, e.typ))
            }
            ExprKind::VaStart { ap } => {
                let addr = self.lower_addr(ap)?;
                self.module.append(Opcode::VaStart, None, vec![addr]);
                Ok(IrVal::Const {
                    ty: IrType::W,
                    v: 0,
                })
            }
        }
    }

    fn lower_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, typ: TypeId) -> CResult<IrVal> {
        if op.is_logical() {
            return self.lower_shortcircuit(op, lhs, rhs);
        }
        let lv = self.lower_expr(lhs)?;
        let rv = self.lower_expr(rhs)?;
        if op.is_cmp() {
            let signed = !self.types.is_ptr(lhs.typ) && self.types.is_signed(lhs.typ);
            let dst = self.module.new_reg(IrType::W);
            self.module
                .append(cmp_opcode(op, signed), Some(dst.clone()), vec![lv, rv]);
            return Ok(dst);
        }
        let signed = self.types.is_signed(typ);
        let dst = self.module.new_reg(ir_type_of(&self.types, typ));
        self.module
            .append(arith_opcode(op, signed), Some(dst.clone()), vec![lv, rv]);
        Ok(dst)
    }

    /// `&&` and `||` pass their 0/1 result through a stack slot and
    /// branch around the right operand.
    fn lower_shortcircuit(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> CResult<IrVal> {
        let slot = self.module.new_reg(IrType::L);
        self.module
            .append(Opcode::Alloca { size: 4, align: 4 }, Some(slot.clone()), vec![]);

        let lv = self.lower_expr(lhs)?;
        let lb = self.module.new_reg(IrType::W);
        self.module.append(
            Opcode::CNe,
            Some(lb.clone()),
            vec![lv.clone(), IrVal::Const { ty: lv.ty(), v: 0 }],
        );
        self.module.append(
            Opcode::Store { mem: MemClass::SW },
            None,
            vec![lb.clone(), slot.clone()],
        );

        let rhs_l = self.module.new_block();
        let merge_l = self.module.new_block();
        match op {
            BinOp::LogAnd => self.module.terminate(Term::Cbr(lb, rhs_l, merge_l)),
            BinOp::LogOr => self.module.terminate(Term::Cbr(lb, merge_l, rhs_l)),
            _ => panic!("internal error: not a logical operator"),
        }

        self.module.set_current(rhs_l);
        let rv = self.lower_expr(rhs)?;
        let rb = self.module.new_reg(IrType::W);
        self.module.append(
            Opcode::CNe,
            Some(rb.clone()),
            vec![rv.clone(), IrVal::Const { ty: rv.ty(), v: 0 }],
        );
        self.module.append(
            Opcode::Store { mem: MemClass::SW },
            None,
            vec![rb, slot.clone()],
        );
        self.module.terminate(Term::Jmp(merge_l));

        self.module.set_current(merge_l);
        let dst = self.module.new_reg(IrType::W);
        self.module.append(
            Opcode::Load { mem: MemClass::SW },
            Some(dst.clone()),
            vec![slot],
        );
        Ok(dst)
    }

    /// The conditional operator evaluates exactly one arm; the chosen
    /// value flows through a stack slot into the join block.
    fn lower_cond(&mut self, cond: &Expr, then: &Expr, els: &Expr, typ: TypeId) -> CResult<IrVal> {
        let is_void = matches!(self.types.get(typ), Type::Void);
        let by_addr = self.by_address(typ);
        let slot = if is_void {
            None
        } else if by_addr {
            // Aggregate arms travel by address; the slot holds that address
            let s = self.module.new_reg(IrType::L);
            self.module
                .append(Opcode::Alloca { size: 8, align: 8 }, Some(s.clone()), vec![]);
            Some(s)
        } else {
            Some(self.alloca_slot(typ))
        };

        let cv = self.lower_expr(cond)?;
        let then_l = self.module.new_block();
        let else_l = self.module.new_block();
        let merge_l = self.module.new_block();
        self.module.terminate(Term::Cbr(cv, then_l, else_l));

        self.module.set_current(then_l);
        let tv = self.lower_expr(then)?;
        if let Some(s) = &slot {
            if by_addr {
                self.module.append(
                    Opcode::Store { mem: MemClass::L },
                    None,
                    vec![tv, s.clone()],
                );
            } else {
                self.emit_store(s.clone(), tv, typ);
            }
        }
        self.module.terminate(Term::Jmp(merge_l));

        self.module.set_current(else_l);
        let ev = self.lower_expr(els)?;
        if let Some(s) = &slot {
            if by_addr {
                self.module.append(
                    Opcode::Store { mem: MemClass::L },
                    None,
                    vec![ev, s.clone()],
                );
            } else {
                self.emit_store(s.clone(), ev, typ);
            }
        }
        self.module.terminate(Term::Jmp(merge_l));

        self.module.set_current(merge_l);
        match slot {
            None => Ok(IrVal::Const {
                ty: IrType::W,
                v: 0,
            }),
            Some(s) => {
                if by_addr {
                    let dst = self.module.new_reg(IrType::L);
                    self.module.append(
                        Opcode::Load { mem: MemClass::L },
                        Some(dst.clone()),
                        vec![s],
                    );
                    Ok(dst)
                } else {
                    Ok(self.emit_load(s, typ))
                }
            }
        }
    }

    fn lower_assign(&mut self, op: Option<BinOp>, dst: &Expr, src: &Expr) -> CResult<IrVal> {
        let addr = self.lower_addr(dst)?;
        match op {
            None => {
                let v = self.lower_expr(src)?;
                self.emit_store(addr, v.clone(), dst.typ);
                Ok(v)
            }
            Some(op) => {
                let old = self.emit_load(addr.clone(), dst.typ);
                let mut rv = self.lower_expr(src)?;
                if self.types.is_ptr(dst.typ) {
                    // Compound pointer arithmetic scales like ptr + int
                    let elem = self
                        .types
                        .base_of(dst.typ)
                        .expect("internal error: pointer without pointee");
                    let esize = self.types.size_of(elem).ok_or_else(|| {
                        CompileError::typ(dst.pos, "pointer arithmetic on incomplete type")
                    })?;
                    let scaled = self.module.new_reg(IrType::L);
                    self.module.append(
                        Opcode::Mul,
                        Some(scaled.clone()),
                        vec![
                            rv,
                            IrVal::Const {
                                ty: IrType::L,
                                v: esize as i64,
                            },
                        ],
                    );
                    rv = scaled;
                }
                let signed = self.types.is_ptr(dst.typ) || self.types.is_signed(dst.typ);
                let new = self.module.new_reg(old.ty());
                self.module
                    .append(arith_opcode(op, signed), Some(new.clone()), vec![old, rv]);
                self.emit_store(addr, new.clone(), dst.typ);
                Ok(new)
            }
        }
    }

    fn lower_call(&mut self, func: &Expr, args: &[Expr], ret: TypeId) -> CResult<IrVal> {
        let fty = if self.types.is_func(func.typ) {
            func.typ
        } else {
            self.types
                .base_of(func.typ)
                .expect("internal error: call through non-pointer")
        };
        let (fixed, variadic) = match self.types.get(fty) {
            Type::Func {
                params, variadic, ..
            } => (params.len(), *variadic),
            _ => panic!("internal error: call target is not a function type"),
        };

        // Direct calls name the global; everything else goes through a value
        let callee = match &func.kind {
            ExprKind::Ident(sym) if self.scopes.get(*sym).is_global() => {
                IrVal::Global(self.scopes.get(*sym).link_name().to_string())
            }
            _ => self.lower_expr(func)?,
        };

        let mut irargs = vec![callee];
        for a in args {
            irargs.push(self.lower_expr(a)?);
        }
        let dst = if matches!(self.types.get(ret), Type::Void) {
            None
        } else {
            Some(self.module.new_reg(ir_type_of(&self.types, ret)))
        };
        self.module
            .append(Opcode::Call { fixed, variadic }, dst.clone(), irargs);
        Ok(dst.unwrap_or(IrVal::Const {
            ty: IrType::W,
            v: 0,
        }))
    }

    // ------------------------------------------------------------------
    // Initializers
    // ------------------------------------------------------------------

    /// Run a local object's initializer: scalar store, or one store per
    /// flattened brace entry.
    pub(crate) fn lower_local_init(&mut self, id: SymId, init: &Expr) -> CResult<()> {
        let (addr, typ) = {
            let sym = self.scopes.get(id);
            match &sym.kind {
                SymKind::Local { addr, .. } => (*addr, sym.typ),
                _ => panic!("internal error: local initializer for non-local"),
            }
        };
        let base = IrVal::Reg {
            ty: IrType::L,
            n: addr,
        };
        self.store_init(base, typ, init)
    }

    fn store_init(&mut self, base: IrVal, typ: TypeId, init: &Expr) -> CResult<()> {
        let entries: Vec<InitEntry> = match &init.kind {
            ExprKind::Init(es) => es.clone(),
            _ => {
                let e = self.mk_cast(init.clone(), typ)?;
                vec![InitEntry { offset: 0, expr: e }]
            }
        };
        for entry in entries {
            let addr = if entry.offset == 0 {
                base.clone()
            } else {
                let dst = self.module.new_reg(IrType::L);
                self.module.append(
                    Opcode::Add,
                    Some(dst.clone()),
                    vec![
                        base.clone(),
                        IrVal::Const {
                            ty: IrType::L,
                            v: entry.offset as i64,
                        },
                    ],
                );
                dst
            };
            let v = self.lower_expr(&entry.expr)?;
            self.emit_store(addr, v, entry.expr.typ);
        }
        Ok(())
    }

    /// Emit a global object's data definition from its folded
    /// initializer: constants at their offsets, zero fill between and
    /// after, symbol references as pointer-sized relocations.
    pub(crate) fn emit_global_data(&mut self, id: SymId, init: &Expr) -> CResult<()> {
        let (typ, link, export, pos) = {
            let sym = self.scopes.get(id);
            (
                sym.typ,
                sym.link_name().to_string(),
                sym.linkage() == Some(Linkage::Global),
                sym.pos,
            )
        };
        let total = self
            .types
            .size_of(typ)
            .ok_or_else(|| CompileError::decl(pos, "cannot use incomplete type in this context"))?;

        let entries: Vec<InitEntry> = match &init.kind {
            ExprKind::Init(es) => es.clone(),
            _ => {
                let e = self.mk_cast(init.clone(), typ)?;
                vec![InitEntry { offset: 0, expr: e }]
            }
        };

        let mut items: Vec<DataItem> = Vec::new();
        let mut cursor = 0usize;
        for entry in &entries {
            if entry.offset > cursor {
                items.push(DataItem::Zero(entry.offset - cursor));
                cursor = entry.offset;
            }
            let c = self.fold_expr(&entry.expr)?;
            match c.sym {
                Some(sym) => {
                    if c.v != 0 {
                        return Err(CompileError::constexpr(
                            entry.expr.pos,
                            "unsupported pointer constant in initializer",
                        ));
                    }
                    items.push(DataItem::Ref(sym));
                    cursor += 8;
                }
                None => {
                    let size = self.types.size_of(entry.expr.typ).unwrap_or(8);
                    items.push(match size {
                        1 => DataItem::Byte(c.v),
                        2 => DataItem::Half(c.v),
                        4 => DataItem::Word(c.v),
                        _ => DataItem::Long(c.v),
                    });
                    cursor += size;
                }
            }
        }
        if total > cursor {
            items.push(DataItem::Zero(total - cursor));
        }
        self.module.emit_data(&link, export, &items);
        Ok(())
    }
}
