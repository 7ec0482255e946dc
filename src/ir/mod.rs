//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Intermediate representation for the occ C compiler
//
// A small typed three-address IR rendered as QBE-flavored text. Values
// are 32- or 64-bit integer classes (w, l) or float classes (s, d);
// sub-word widths exist only at loads and stores. Functions are lists
// of basic blocks; each block carries a label set, straight-line
// instructions, and exactly one terminator once sealed.
//

pub mod build;

#[cfg(test)]
mod test_build;

use crate::types::{PrimKind, Type, TypeId, TypeTable};
use std::fmt::Write as _;

// ============================================================================
// Values and Types
// ============================================================================

/// Register class of a value held in a virtual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrType {
    /// 32-bit integer
    W,
    /// 64-bit integer (also pointers)
    L,
    /// single-precision float
    S,
    /// double-precision float
    D,
}

impl IrType {
    fn letter(&self) -> char {
        match self {
            IrType::W => 'w',
            IrType::L => 'l',
            IrType::S => 's',
            IrType::D => 'd',
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, IrType::W | IrType::L)
    }
}

/// Memory access width for loads and stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemClass {
    SB,
    UB,
    SH,
    UH,
    SW,
    UW,
    L,
    S,
    D,
}

impl MemClass {
    fn load_name(&self) -> &'static str {
        match self {
            MemClass::SB => "loadsb",
            MemClass::UB => "loadub",
            MemClass::SH => "loadsh",
            MemClass::UH => "loaduh",
            MemClass::SW => "loadsw",
            MemClass::UW => "loaduw",
            MemClass::L => "loadl",
            MemClass::S => "loads",
            MemClass::D => "loadd",
        }
    }

    fn store_name(&self) -> &'static str {
        match self {
            MemClass::SB | MemClass::UB => "storeb",
            MemClass::SH | MemClass::UH => "storeh",
            MemClass::SW | MemClass::UW => "storew",
            MemClass::L => "storel",
            MemClass::S => "stores",
            MemClass::D => "stored",
        }
    }

    /// Register class a load of this width produces.
    pub fn reg_type(&self) -> IrType {
        match self {
            MemClass::L => IrType::L,
            MemClass::S => IrType::S,
            MemClass::D => IrType::D,
            _ => IrType::W,
        }
    }
}

/// Block label, rendered `.L<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

/// An IR operand.
#[derive(Debug, Clone, PartialEq)]
pub enum IrVal {
    Const { ty: IrType, v: i64 },
    /// Virtual register; write-once, numbered per function
    Reg { ty: IrType, n: u32 },
    /// Address of a named global
    Global(String),
}

impl IrVal {
    pub fn ty(&self) -> IrType {
        match self {
            IrVal::Const { ty, .. } | IrVal::Reg { ty, .. } => *ty,
            IrVal::Global(_) => IrType::L,
        }
    }

    fn render(&self) -> String {
        match self {
            IrVal::Const { v, .. } => format!("{}", v),
            IrVal::Reg { n, .. } => format!("%t{}", n),
            IrVal::Global(name) => format!("${}", name),
        }
    }
}

// ============================================================================
// Instructions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Stack slot of `size` bytes; `align` picks the alloc variant
    Alloca { size: usize, align: usize },
    Load { mem: MemClass },
    Store { mem: MemClass },
    Copy,
    /// Memory copy of `bytes` from args[0] to args[1]
    Blit { bytes: usize },
    Add,
    Sub,
    Mul,
    DivS,
    DivU,
    RemS,
    RemU,
    And,
    Or,
    Xor,
    Shl,
    ShrA,
    ShrL,
    CEq,
    CNe,
    CSLt,
    CSLe,
    CSGt,
    CSGe,
    CULt,
    CULe,
    CUGt,
    CUGe,
    ExtSB,
    ExtUB,
    ExtSH,
    ExtUH,
    ExtSW,
    ExtUW,
    /// Signed int to float, by source class
    SWToF,
    SLToF,
    UWToF,
    ULToF,
    /// Float to signed int, by source class
    SToSI,
    DToSI,
    /// Single to double
    ExtS,
    /// Double to single
    TruncD,
    /// Function call; args[0] is the callee, `fixed` counts the named
    /// parameters when the callee is variadic
    Call { fixed: usize, variadic: bool },
    VaStart,
}

#[derive(Debug, Clone)]
pub struct Insn {
    pub op: Opcode,
    pub dst: Option<IrVal>,
    pub args: Vec<IrVal>,
}

/// Block terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Jmp(LabelId),
    /// Branch on nonzero: (cond, then-target, else-target)
    Cbr(IrVal, LabelId, LabelId),
    Ret(Option<IrVal>),
}

/// A basic block: label set, instructions, at most one terminator.
#[derive(Debug, Clone)]
pub struct Block {
    pub labels: Vec<LabelId>,
    pub insns: Vec<Insn>,
    pub term: Option<Term>,
}

impl Block {
    fn new(label: LabelId) -> Self {
        Self {
            labels: vec![label],
            insns: Vec::new(),
            term: None,
        }
    }

    pub fn sealed(&self) -> bool {
        self.term.is_some()
    }
}

// ============================================================================
// Data definitions
// ============================================================================

/// One element of a global data definition.
#[derive(Debug, Clone)]
pub enum DataItem {
    Byte(i64),
    Half(i64),
    Word(i64),
    Long(i64),
    /// `n` zero bytes
    Zero(usize),
    /// Address of another data symbol
    Ref(String),
}

// ============================================================================
// Function state
// ============================================================================

struct FuncState {
    name: String,
    export: bool,
    ret: Option<IrType>,
    params: Vec<(IrType, u32)>,
    blocks: Vec<Block>,
    cur: usize,
    next_reg: u32,
}

// ============================================================================
// Module builder
// ============================================================================

/// Accumulates the textual IR for one translation unit.
pub struct Module {
    out: String,
    next_label: u32,
    strings: Vec<(u32, Vec<u8>)>,
    func: Option<FuncState>,
}

impl Module {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            next_label: 0,
            strings: Vec::new(),
            func: None,
        }
    }

    pub fn module_begin(&mut self) {
        self.out.clear();
        self.next_label = 0;
        self.strings.clear();
        self.func = None;
    }

    /// Flush deferred string-literal data and return the finished text.
    pub fn module_end(&mut self) -> String {
        if self.func.is_some() {
            panic!("internal error: module ended inside a function");
        }
        let strings = std::mem::take(&mut self.strings);
        for (label, bytes) in strings {
            let mut items: Vec<DataItem> =
                bytes.iter().map(|&b| DataItem::Byte(b as i64)).collect();
            items.push(DataItem::Byte(0));
            self.write_data(&format!(".L{}", label), false, &items);
        }
        std::mem::take(&mut self.out)
    }

    pub fn new_label(&mut self) -> LabelId {
        let l = LabelId(self.next_label);
        self.next_label += 1;
        l
    }

    /// Intern a string literal; data emission is deferred to module end.
    /// Returns the name of the private data symbol holding the bytes.
    pub fn string_lit(&mut self, bytes: &[u8]) -> String {
        if let Some((label, _)) = self.strings.iter().find(|(_, b)| b == &bytes) {
            return format!(".L{}", label);
        }
        let label = self.next_label;
        self.next_label += 1;
        self.strings.push((label, bytes.to_vec()));
        format!(".L{}", label)
    }

    /// Emit a global data definition. Function text is buffered until
    /// function_end, so data emitted while a function is open still
    /// lands before it.
    pub fn emit_data(&mut self, name: &str, export: bool, items: &[DataItem]) {
        self.write_data(name, export, items);
    }

    fn write_data(&mut self, name: &str, export: bool, items: &[DataItem]) {
        if export {
            self.out.push_str("export ");
        }
        let _ = write!(self.out, "data ${} = {{ ", name);
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            match item {
                DataItem::Byte(v) => {
                    let _ = write!(self.out, "b {}", v);
                }
                DataItem::Half(v) => {
                    let _ = write!(self.out, "h {}", v);
                }
                DataItem::Word(v) => {
                    let _ = write!(self.out, "w {}", v);
                }
                DataItem::Long(v) => {
                    let _ = write!(self.out, "l {}", v);
                }
                DataItem::Zero(n) => {
                    let _ = write!(self.out, "z {}", n);
                }
                DataItem::Ref(sym) => {
                    let _ = write!(self.out, "l ${}", sym);
                }
            }
        }
        self.out.push_str(" }\n");
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    /// Open a function definition. Returns the registers bound to the
    /// parameters, in order.
    pub fn function_begin(
        &mut self,
        name: &str,
        export: bool,
        ret: Option<IrType>,
        params: &[IrType],
    ) -> Vec<IrVal> {
        if self.func.is_some() {
            panic!("internal error: nested function definition");
        }
        let entry = self.new_label();
        let mut next_reg = 0u32;
        let mut param_regs = Vec::with_capacity(params.len());
        let mut param_list = Vec::with_capacity(params.len());
        for &ty in params {
            param_regs.push(IrVal::Reg { ty, n: next_reg });
            param_list.push((ty, next_reg));
            next_reg += 1;
        }
        self.func = Some(FuncState {
            name: name.to_string(),
            export,
            ret,
            params: param_list,
            blocks: vec![Block::new(entry)],
            cur: 0,
            next_reg,
        });
        param_regs
    }

    fn fs(&mut self) -> &mut FuncState {
        self.func
            .as_mut()
            .expect("internal error: no open function")
    }

    pub fn new_reg(&mut self, ty: IrType) -> IrVal {
        let fs = self.fs();
        let n = fs.next_reg;
        fs.next_reg += 1;
        IrVal::Reg { ty, n }
    }

    /// Create a fresh block (it becomes part of the flush order now) and
    /// return its label. Does not switch to it.
    pub fn new_block(&mut self) -> LabelId {
        let l = self.new_label();
        self.fs().blocks.push(Block::new(l));
        l
    }

    /// Make the block carrying `label` the current insertion point.
    pub fn set_current(&mut self, label: LabelId) {
        let fs = self.fs();
        match fs.blocks.iter().position(|b| b.labels.contains(&label)) {
            Some(i) => fs.cur = i,
            None => panic!("internal error: unknown block label"),
        }
    }

    /// Attach another label to the current block.
    pub fn add_label(&mut self, label: LabelId) {
        let fs = self.fs();
        let cur = fs.cur;
        fs.blocks[cur].labels.push(label);
    }

    /// Primary label of the current block, usable with `set_current` to
    /// come back after building other blocks.
    pub fn current_label(&self) -> LabelId {
        let fs = self.func.as_ref().expect("internal error: no open function");
        fs.blocks[fs.cur].labels[0]
    }

    pub fn current_sealed(&self) -> bool {
        let fs = self.func.as_ref().expect("internal error: no open function");
        fs.blocks[fs.cur].sealed()
    }

    /// Append an instruction to the current block. If the block is
    /// already sealed (code after return), a fresh unreachable block is
    /// opened transparently.
    pub fn append(&mut self, op: Opcode, dst: Option<IrVal>, args: Vec<IrVal>) {
        if self.current_sealed() {
            let l = self.new_block();
            self.set_current(l);
        }
        let fs = self.fs();
        let cur = fs.cur;
        fs.blocks[cur].insns.push(Insn { op, dst, args });
    }

    /// Seal the current block. Sealing an already-sealed block is a
    /// silent no-op, which lets statement parsers unconditionally append
    /// their fallthrough jump.
    pub fn terminate(&mut self, term: Term) {
        if self.current_sealed() {
            return;
        }
        let fs = self.fs();
        let cur = fs.cur;
        fs.blocks[cur].term = Some(term);
    }

    pub fn block_count(&self) -> usize {
        self.func
            .as_ref()
            .map(|fs| fs.blocks.len())
            .unwrap_or(0)
    }

    /// Close the function: every block must be sealed; blocks flush in
    /// creation order.
    pub fn function_end(&mut self) {
        let fs = self
            .func
            .take()
            .expect("internal error: no open function");
        for b in &fs.blocks {
            if !b.sealed() {
                panic!("internal error: unsealed basic block at function end");
            }
        }
        if fs.export {
            self.out.push_str("export ");
        }
        self.out.push_str("function ");
        if let Some(ret) = fs.ret {
            let _ = write!(self.out, "{} ", ret.letter());
        }
        let _ = write!(self.out, "${}(", fs.name);
        for (i, (ty, n)) in fs.params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            let _ = write!(self.out, "{} %t{}", ty.letter(), n);
        }
        self.out.push_str(") {\n");
        for b in &fs.blocks {
            for l in &b.labels {
                let _ = writeln!(self.out, "@.L{}", l.0);
            }
            for insn in &b.insns {
                self.write_insn(insn);
            }
            let term = b
                .term
                .as_ref()
                .expect("internal error: sealed block without a terminator");
            match term {
                Term::Jmp(l) => {
                    let _ = writeln!(self.out, "\tjmp @.L{}", l.0);
                }
                Term::Cbr(c, t, f) => {
                    let _ = writeln!(self.out, "\tjnz {}, @.L{}, @.L{}", c.render(), t.0, f.0);
                }
                Term::Ret(Some(v)) => {
                    let _ = writeln!(self.out, "\tret {}", v.render());
                }
                Term::Ret(None) => {
                    self.out.push_str("\tret\n");
                }
            }
        }
        self.out.push_str("}\n");
    }

    fn write_insn(&mut self, insn: &Insn) {
        self.out.push('\t');
        if let Some(dst) = &insn.dst {
            let _ = write!(self.out, "{} ={} ", dst.render(), dst.ty().letter());
        }
        let name: String = match insn.op {
            Opcode::Alloca { align, .. } => {
                let variant = if align <= 4 {
                    4
                } else if align <= 8 {
                    8
                } else {
                    16
                };
                format!("alloc{}", variant)
            }
            Opcode::Load { mem } => mem.load_name().to_string(),
            Opcode::Store { mem } => mem.store_name().to_string(),
            Opcode::Copy => "copy".to_string(),
            Opcode::Blit { .. } => "blit".to_string(),
            Opcode::Add => "add".to_string(),
            Opcode::Sub => "sub".to_string(),
            Opcode::Mul => "mul".to_string(),
            Opcode::DivS => "div".to_string(),
            Opcode::DivU => "udiv".to_string(),
            Opcode::RemS => "rem".to_string(),
            Opcode::RemU => "urem".to_string(),
            Opcode::And => "and".to_string(),
            Opcode::Or => "or".to_string(),
            Opcode::Xor => "xor".to_string(),
            Opcode::Shl => "shl".to_string(),
            Opcode::ShrA => "sar".to_string(),
            Opcode::ShrL => "shr".to_string(),
            op @ (Opcode::CEq
            | Opcode::CNe
            | Opcode::CSLt
            | Opcode::CSLe
            | Opcode::CSGt
            | Opcode::CSGe
            | Opcode::CULt
            | Opcode::CULe
            | Opcode::CUGt
            | Opcode::CUGe) => {
                let base = match op {
                    Opcode::CEq => "ceq",
                    Opcode::CNe => "cne",
                    Opcode::CSLt => "cslt",
                    Opcode::CSLe => "csle",
                    Opcode::CSGt => "csgt",
                    Opcode::CSGe => "csge",
                    Opcode::CULt => "cult",
                    Opcode::CULe => "cule",
                    Opcode::CUGt => "cugt",
                    _ => "cuge",
                };
                format!("{}{}", base, insn.args[0].ty().letter())
            }
            Opcode::ExtSB => "extsb".to_string(),
            Opcode::ExtUB => "extub".to_string(),
            Opcode::ExtSH => "extsh".to_string(),
            Opcode::ExtUH => "extuh".to_string(),
            Opcode::ExtSW => "extsw".to_string(),
            Opcode::ExtUW => "extuw".to_string(),
            Opcode::SWToF => "swtof".to_string(),
            Opcode::SLToF => "sltof".to_string(),
            Opcode::UWToF => "uwtof".to_string(),
            Opcode::ULToF => "ultof".to_string(),
            Opcode::SToSI => "stosi".to_string(),
            Opcode::DToSI => "dtosi".to_string(),
            Opcode::ExtS => "exts".to_string(),
            Opcode::TruncD => "truncd".to_string(),
            Opcode::Call { fixed, variadic } => {
                let _ = write!(self.out, "call {}(", insn.args[0].render());
                for (i, a) in insn.args[1..].iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    if variadic && i == fixed {
                        self.out.push_str("..., ");
                    }
                    let _ = write!(self.out, "{} {}", a.ty().letter(), a.render());
                }
                if variadic && insn.args.len() - 1 == fixed {
                    if fixed > 0 {
                        self.out.push_str(", ");
                    }
                    self.out.push_str("...");
                }
                self.out.push_str(")\n");
                return;
            }
            Opcode::VaStart => "vastart".to_string(),
        };
        self.out.push_str(&name);
        match insn.op {
            Opcode::Alloca { size, .. } => {
                let _ = writeln!(self.out, " {}", size);
            }
            Opcode::Blit { bytes } => {
                let _ = writeln!(
                    self.out,
                    " {}, {}, {}",
                    insn.args[0].render(),
                    insn.args[1].render(),
                    bytes
                );
            }
            _ => {
                for (i, a) in insn.args.iter().enumerate() {
                    if i == 0 {
                        self.out.push(' ');
                    } else {
                        self.out.push_str(", ");
                    }
                    self.out.push_str(&a.render());
                }
                self.out.push('\n');
            }
        }
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// C type mapping
// ============================================================================

/// Register class of a value of this C type. Aggregates travel as
/// addresses.
pub fn ir_type_of(types: &TypeTable, id: TypeId) -> IrType {
    match types.get(id) {
        Type::Prim { kind, .. } => match kind {
            PrimKind::Float => IrType::S,
            PrimKind::Double | PrimKind::LongDouble => IrType::D,
            k if k.size() == 8 => IrType::L,
            _ => IrType::W,
        },
        Type::Ptr { .. } | Type::Arr { .. } | Type::Func { .. } | Type::Record { .. } => IrType::L,
        Type::Enum { .. } => IrType::W,
        Type::Void => IrType::W,
    }
}

/// Memory access width for loading or storing a scalar of this C type.
pub fn mem_class_of(types: &TypeTable, id: TypeId) -> MemClass {
    match types.get(id) {
        Type::Prim { kind, signed } => match (kind, signed) {
            (PrimKind::Char, true) => MemClass::SB,
            (PrimKind::Char, false) => MemClass::UB,
            (PrimKind::Short, true) => MemClass::SH,
            (PrimKind::Short, false) => MemClass::UH,
            (PrimKind::Int, true) => MemClass::SW,
            (PrimKind::Int, false) => MemClass::UW,
            (PrimKind::Float, _) => MemClass::S,
            (PrimKind::Double, _) | (PrimKind::LongDouble, _) => MemClass::D,
            _ => MemClass::L,
        },
        Type::Enum { .. } => MemClass::SW,
        _ => MemClass::L,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_function_render() {
        let mut m = Module::new();
        m.module_begin();
        let params = m.function_begin("add", true, Some(IrType::W), &[IrType::W, IrType::W]);
        let dst = m.new_reg(IrType::W);
        m.append(
            Opcode::Add,
            Some(dst.clone()),
            vec![params[0].clone(), params[1].clone()],
        );
        m.terminate(Term::Ret(Some(dst)));
        m.function_end();
        let text = m.module_end();
        assert!(text.contains("export function w $add(w %t0, w %t1) {"));
        assert!(text.contains("%t2 =w add %t0, %t1"));
        assert!(text.contains("\tret %t2"));
    }

    #[test]
    fn test_terminate_sealed_is_noop() {
        let mut m = Module::new();
        m.function_begin("f", false, None, &[]);
        m.terminate(Term::Ret(None));
        // The fallthrough seal after an explicit return must not replace it
        let l = m.new_block();
        m.terminate(Term::Jmp(l));
        m.terminate(Term::Ret(None));
        m.set_current(l);
        m.terminate(Term::Ret(None));
        m.function_end();
        let text = m.module_end();
        assert_eq!(text.matches("\tret").count(), 2);
        assert_eq!(text.matches("jmp").count(), 0);
    }

    #[test]
    fn test_append_after_seal_opens_dead_block() {
        let mut m = Module::new();
        m.function_begin("f", false, Some(IrType::W), &[]);
        m.terminate(Term::Ret(Some(IrVal::Const { ty: IrType::W, v: 1 })));
        assert_eq!(m.block_count(), 1);
        // Unreachable code after return lands in a fresh block
        let dst = m.new_reg(IrType::W);
        m.append(
            Opcode::Copy,
            Some(dst),
            vec![IrVal::Const { ty: IrType::W, v: 2 }],
        );
        assert_eq!(m.block_count(), 2);
        assert!(!m.current_sealed());
        m.terminate(Term::Ret(None));
        m.function_end();
    }

    #[test]
    #[should_panic(expected = "internal error")]
    fn test_unsealed_block_at_end_panics() {
        let mut m = Module::new();
        m.function_begin("f", false, None, &[]);
        let l = m.new_block();
        m.terminate(Term::Jmp(l));
        // The new block is never sealed
        m.function_end();
    }

    #[test]
    fn test_blocks_flush_in_creation_order() {
        let mut m = Module::new();
        m.function_begin("f", false, None, &[]);
        let b1 = m.new_block();
        let b2 = m.new_block();
        m.terminate(Term::Jmp(b2));
        m.set_current(b2);
        m.terminate(Term::Jmp(b1));
        m.set_current(b1);
        m.terminate(Term::Ret(None));
        m.function_end();
        let text = m.module_end();
        // Match the label lines, not the jump operands
        let p1 = text.find("\n@.L1\n").unwrap();
        let p2 = text.find("\n@.L2\n").unwrap();
        assert!(p1 < p2);
    }

    #[test]
    fn test_comparison_suffix_uses_operand_class() {
        let mut m = Module::new();
        let args = m.function_begin("f", false, Some(IrType::W), &[IrType::L]);
        let d = m.new_reg(IrType::W);
        m.append(
            Opcode::CSLt,
            Some(d.clone()),
            vec![args[0].clone(), IrVal::Const { ty: IrType::L, v: 4 }],
        );
        m.terminate(Term::Ret(Some(d)));
        m.function_end();
        let text = m.module_end();
        assert!(text.contains("csltl"), "got: {}", text);
    }

    #[test]
    fn test_data_rendering() {
        let mut m = Module::new();
        m.emit_data(
            "g",
            true,
            &[DataItem::Word(3), DataItem::Zero(4), DataItem::Long(7)],
        );
        m.emit_data("s", false, &[DataItem::Ref(".L0".to_string())]);
        let text = m.module_end();
        assert!(text.contains("export data $g = { w 3, z 4, l 7 }\n"));
        assert!(text.contains("data $s = { l $.L0 }\n"));
    }

    #[test]
    fn test_string_literals_flushed_at_end() {
        let mut m = Module::new();
        m.module_begin();
        let l1 = m.string_lit(b"hi");
        let l2 = m.string_lit(b"hi");
        assert_eq!(l1, l2);
        let l3 = m.string_lit(b"yo");
        assert_ne!(l1, l3);
        let text = m.module_end();
        assert!(text.contains(&format!("data ${} = {{ b 104, b 105, b 0 }}", l1)));
        assert!(text.contains(&format!("data ${} = {{ b 121, b 111, b 0 }}", l3)));
    }

    #[test]
    fn test_variadic_call_render() {
        let mut m = Module::new();
        m.function_begin("f", false, None, &[]);
        let r = m.new_reg(IrType::W);
        m.append(
            Opcode::Call {
                fixed: 1,
                variadic: true,
            },
            Some(r),
            vec![
                IrVal::Global("printf".into()),
                IrVal::Global("fmt".into()),
                IrVal::Const { ty: IrType::W, v: 5 },
            ],
        );
        m.terminate(Term::Ret(None));
        m.function_end();
        let text = m.module_end();
        assert!(text.contains("call $printf(l $fmt, ..., w 5)"));
    }

    #[test]
    fn test_mem_class_mapping() {
        let t = TypeTable::new();
        assert_eq!(mem_class_of(&t, t.char_id), MemClass::SB);
        assert_eq!(mem_class_of(&t, t.uchar_id), MemClass::UB);
        assert_eq!(mem_class_of(&t, t.int_id), MemClass::SW);
        assert_eq!(mem_class_of(&t, t.long_id), MemClass::L);
        assert_eq!(ir_type_of(&t, t.int_id), IrType::W);
        assert_eq!(ir_type_of(&t, t.long_id), IrType::L);
        assert_eq!(ir_type_of(&t, t.double_id), IrType::D);
    }
}
