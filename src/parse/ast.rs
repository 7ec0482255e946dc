//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Expression trees for the occ C compiler
//
// Expressions are the only AST this compiler keeps; statements never
// become trees, they lower straight to IR as they are parsed. Every
// node carries the C type the type checker assigned while building it,
// so lowering never re-derives types. Conversions are explicit Cast
// nodes inserted during construction; `a->b` is built as a member
// access on a dereference, and `a[i]` as a dereferenced pointer add,
// so lowering handles one shape per concept.
//

use crate::diag::Position;
use crate::symbol::SymId;
use crate::types::TypeId;

// ============================================================================
// Operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Arithmetic negation
    Neg,
    /// Bitwise complement
    BitNot,
    /// Logical not, yields int 0/1
    LogNot,
    /// Address-of
    Addr,
    /// Pointer dereference
    Deref,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    LogAnd,
    LogOr,
}

impl BinOp {
    /// Comparison operators yield int and skip the result-type ladder.
    pub fn is_cmp(&self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::LogAnd | BinOp::LogOr)
    }

    /// Operators restricted to integer operands.
    pub fn int_only(&self) -> bool {
        matches!(
            self,
            BinOp::Rem | BinOp::Shl | BinOp::Shr | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor
        )
    }
}

// ============================================================================
// Expression Nodes
// ============================================================================

/// One flattened initializer element: byte offset within the object
/// being initialized, plus the value expression.
#[derive(Debug, Clone)]
pub struct InitEntry {
    pub offset: usize,
    pub expr: Expr,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(i64),
    /// String literal bytes, without quotes, escapes already decoded
    StrLit(Vec<u8>),
    Ident(SymId),
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Pointer arithmetic: `ptr +/- idx * elem_size`. The index is
    /// already converted to long; scaling happens during lowering.
    PtrAdd {
        ptr: Box<Expr>,
        idx: Box<Expr>,
        elem_size: usize,
        sub: bool,
    },
    /// Plain or compound assignment; `op` is the arithmetic half of
    /// `+=` and friends
    Assign {
        op: Option<BinOp>,
        dst: Box<Expr>,
        src: Box<Expr>,
    },
    IncDec {
        pre: bool,
        inc: bool,
        expr: Box<Expr>,
    },
    /// Member access on an lvalue; `a->b` wraps the base in Deref first
    Member {
        base: Box<Expr>,
        offset: usize,
    },
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Comma {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Conversion to this node's type, explicit or inserted
    Cast {
        expr: Box<Expr>,
    },
    /// Flattened brace initializer, offsets relative to the object start
    Init(Vec<InitEntry>),
    /// __builtin_va_start(ap); the checked va_list argument
    VaStart {
        ap: Box<Expr>,
    },
}

/// A typed expression node.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub typ: TypeId,
    pub pos: Position,
}

impl Expr {
    pub fn new(kind: ExprKind, typ: TypeId, pos: Position) -> Self {
        Self { kind, typ, pos }
    }

    pub fn int_lit(v: i64, typ: TypeId, pos: Position) -> Self {
        Self::new(ExprKind::IntLit(v), typ, pos)
    }

    /// Designated addressable object: identifier, dereference, or a
    /// member chain rooted in one.
    pub fn is_lvalue(&self) -> bool {
        match &self.kind {
            ExprKind::Ident(_) => true,
            ExprKind::Unary {
                op: UnOp::Deref, ..
            } => true,
            ExprKind::Member { base, .. } => base.is_lvalue(),
            _ => false,
        }
    }

    pub fn as_int_const(&self) -> Option<i64> {
        match self.kind {
            ExprKind::IntLit(v) => Some(v),
            _ => None,
        }
    }
}
