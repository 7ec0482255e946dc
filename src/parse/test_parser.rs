//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Parser and semantic analysis tests
//

use crate::diag::{CompileError, ErrorKind, Position};
use crate::parse::ast::{BinOp, Expr};
use crate::parse::parser::Compiler;

fn compile(src: &str) -> String {
    Compiler::new("test.c", src)
        .expect("lexer setup failed")
        .compile()
        .expect("compilation failed")
}

fn compile_err(src: &str) -> CompileError {
    Compiler::new("test.c", src)
        .expect("lexer setup failed")
        .compile()
        .expect_err("compilation unexpectedly succeeded")
}

fn session() -> Compiler {
    Compiler::new("test.c", "").unwrap()
}

// ----------------------------------------------------------------------
// Declarations and declarators
// ----------------------------------------------------------------------

#[test]
fn test_declarator_array_of_pointer() {
    // int *d[3] is an array of three pointers: 24 bytes
    let out = compile("int *d[3];");
    assert!(out.contains("data $d = { z 24 }"), "got: {}", out);
}

#[test]
fn test_declarator_pointer_to_array() {
    // int (*d)[3] is one pointer: 8 bytes
    let out = compile("int (*d)[3];");
    assert!(out.contains("data $d = { z 8 }"), "got: {}", out);
}

#[test]
fn test_long_long_and_unsigned_specs() {
    let out = compile("unsigned long long a; long int b; unsigned c;");
    assert!(out.contains("data $a = { z 8 }"));
    assert!(out.contains("data $b = { z 8 }"));
    assert!(out.contains("data $c = { z 4 }"));
}

#[test]
fn test_typedef_declares_type() {
    let out = compile("typedef long tick; tick t = 9;");
    assert!(out.contains("data $t = { l 9 }"), "got: {}", out);
}

#[test]
fn test_multiple_storage_classes_rejected() {
    let e = compile_err("static extern int x;");
    assert_eq!(e.kind, ErrorKind::Decl);
    assert!(e.message.contains("multiple storage classes"));
}

#[test]
fn test_typedef_with_initializer_rejected() {
    let e = compile_err("typedef int t = 3;");
    assert_eq!(e.kind, ErrorKind::Decl);
}

// ----------------------------------------------------------------------
// Linkage and tentative definitions
// ----------------------------------------------------------------------

#[test]
fn test_tentative_collapses_to_single_definition() {
    let out = compile("int g; int g = 3; int g;");
    assert_eq!(out.matches("data $g").count(), 1, "got: {}", out);
    assert!(out.contains("export data $g = { w 3 }"));
}

#[test]
fn test_tentative_flushed_zeroed() {
    let out = compile("int g; long h;");
    assert!(out.contains("export data $g = { z 4 }"));
    assert!(out.contains("export data $h = { z 8 }"));
}

#[test]
fn test_extern_emits_nothing() {
    let out = compile("extern int e;");
    assert!(!out.contains("data $e"), "got: {}", out);
}

#[test]
fn test_extern_then_definition_upgrades() {
    let out = compile("extern int e; int e = 4;");
    assert!(out.contains("export data $e = { w 4 }"));
}

#[test]
fn test_static_gets_private_link_name() {
    let out = compile("static int s = 1;");
    assert!(!out.contains("data $s"), "got: {}", out);
    assert!(!out.contains("export"), "got: {}", out);
    assert!(out.contains("= { w 1 }"));
}

#[test]
fn test_double_initialization_rejected() {
    let e = compile_err("int g = 1; int g = 2;");
    assert_eq!(e.kind, ErrorKind::Decl);
    assert!(e.message.contains("already initialized"));
}

#[test]
fn test_storage_class_mismatch_rejected() {
    let e = compile_err("int g; static int g;");
    assert_eq!(e.kind, ErrorKind::Decl);
    assert!(e.message.contains("differing storage class"));
}

// ----------------------------------------------------------------------
// Tags
// ----------------------------------------------------------------------

#[test]
fn test_tag_completion_in_place() {
    // The forward reference and the completed struct are the same type
    let out = compile("struct s; struct s { int a; long b; }; struct s g;");
    assert!(out.contains("data $g = { z 16 }"), "got: {}", out);
}

#[test]
fn test_self_referential_struct() {
    let out = compile("struct n { struct n *next; int v; }; struct n g;");
    assert!(out.contains("data $g = { z 16 }"), "got: {}", out);
}

#[test]
fn test_union_layout() {
    let out = compile("union u { char c; long l; }; union u g;");
    assert!(out.contains("data $g = { z 8 }"), "got: {}", out);
}

#[test]
fn test_tag_kind_mismatch_rejected() {
    let e = compile_err("struct s { int x; }; union s g;");
    assert_eq!(e.kind, ErrorKind::Decl);
}

#[test]
fn test_tag_redefinition_rejected() {
    let e = compile_err("struct s { int x; }; struct s { int y; };");
    assert_eq!(e.kind, ErrorKind::Decl);
    assert!(e.message.contains("redefinition of tag"));
}

#[test]
fn test_enum_values_and_auto_increment() {
    let out = compile("enum e { A, B = 5, C }; int x = C;");
    assert!(out.contains("data $x = { w 6 }"), "got: {}", out);
}

#[test]
fn test_incomplete_member_rejected() {
    let e = compile_err("struct a; struct b { struct a inner; };");
    assert_eq!(e.kind, ErrorKind::Decl);
    assert!(e.message.contains("incomplete"));
}

// ----------------------------------------------------------------------
// Initializers
// ----------------------------------------------------------------------

#[test]
fn test_nested_array_init_flattens() {
    let out = compile("int a[2][2] = {{1,2},{3,4}};");
    assert!(
        out.contains("data $a = { w 1, w 2, w 3, w 4 }"),
        "got: {}",
        out
    );
}

#[test]
fn test_designator_repositions_cursor() {
    // [0]=1 sets the cursor; the positional 2 lands at index 1
    let out = compile("int a[2] = {[0]=1, 2};");
    assert!(out.contains("data $a = { w 1, w 2 }"), "got: {}", out);
}

#[test]
fn test_designator_with_gap_zero_fills() {
    let out = compile("int a[2] = {[1]=5};");
    assert!(out.contains("data $a = { z 4, w 5 }"), "got: {}", out);
}

#[test]
fn test_init_overlap_rejected() {
    let e = compile_err("int a[2] = {[0]=1, [0]=2};");
    assert_eq!(e.kind, ErrorKind::Decl);
    assert!(e.message.contains("overlaps"));
}

#[test]
fn test_array_init_wrong_size_rejected() {
    let e = compile_err("int a[3] = {1, 2};");
    assert_eq!(e.kind, ErrorKind::Decl);
    assert!(e.message.contains("wrong size"));
}

#[test]
fn test_array_dimension_inferred_from_init() {
    let out = compile("long a[] = {1, 2, 3};");
    assert!(out.contains("data $a = { l 1, l 2, l 3 }"), "got: {}", out);
}

#[test]
fn test_struct_init_positional_and_designated() {
    let out = compile("struct p { int x; int y; }; struct p g = { .y = 2 };");
    assert!(out.contains("data $g = { z 4, w 2 }"), "got: {}", out);
}

#[test]
fn test_struct_init_unknown_member_rejected() {
    let e = compile_err("struct p { int x; }; struct p g = { .z = 1 };");
    assert_eq!(e.kind, ErrorKind::Type);
}

#[test]
fn test_init_entries_cast_to_element_type() {
    // int literals widen to the long element width in data
    let out = compile("long a[2] = {7, 8};");
    assert!(out.contains("data $a = { l 7, l 8 }"), "got: {}", out);
}

#[test]
fn test_global_pointer_init() {
    let out = compile("int v; int *pv = &v;");
    assert!(out.contains("data $pv = { l $v }"), "got: {}", out);
}

#[test]
fn test_global_string_init() {
    let out = compile("char *s = \"hi\";");
    assert!(out.contains("data $s = { l $.L"), "got: {}", out);
    assert!(out.contains("b 104, b 105, b 0"), "got: {}", out);
}

#[test]
fn test_non_constant_global_init_rejected() {
    let e = compile_err("int f(void); int g = f();");
    assert_eq!(e.kind, ErrorKind::ConstExpr);
}

// ----------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------

#[test]
fn test_usual_arith_conv_symmetric() {
    let mut c = session();
    let p = Position::default();
    let cases = [
        (c.types.int_id, c.types.ulong_id, c.types.ulong_id),
        (c.types.int_id, c.types.uint_id, c.types.uint_id),
        (c.types.uint_id, c.types.long_id, c.types.long_id),
        (c.types.char_id, c.types.short_id, c.types.int_id),
        (c.types.int_id, c.types.double_id, c.types.double_id),
    ];
    for (ta, tb, want) in cases {
        let mut a = Expr::int_lit(1, ta, p);
        let mut b = Expr::int_lit(2, tb, p);
        let r1 = c.usual_arith_conv(&mut a, &mut b).unwrap();
        let mut a = Expr::int_lit(1, tb, p);
        let mut b = Expr::int_lit(2, ta, p);
        let r2 = c.usual_arith_conv(&mut a, &mut b).unwrap();
        assert_eq!(r1, r2);
        assert!(c.types.same_type(r1, want));
    }
}

#[test]
fn test_integer_promotion_idempotent() {
    let mut c = session();
    let p = Position::default();
    let e = Expr::int_lit(1, c.types.char_id, p);
    let once = c.ipromote(e);
    assert_eq!(once.typ, c.types.int_id);
    let twice = c.ipromote(once);
    assert_eq!(twice.typ, c.types.int_id);
    let u = Expr::int_lit(1, c.types.ushort_id, p);
    assert_eq!(c.ipromote(u).typ, c.types.uint_id);
}

#[test]
fn test_comparison_yields_int() {
    let mut c = session();
    let p = Position::default();
    let a = Expr::int_lit(1, c.types.ulong_id, p);
    let b = Expr::int_lit(2, c.types.ulong_id, p);
    let r = c.mk_binop(p, BinOp::Lt, a, b).unwrap();
    assert_eq!(r.typ, c.types.int_id);
}

// ----------------------------------------------------------------------
// Expressions and type checks
// ----------------------------------------------------------------------

#[test]
fn test_undefined_symbol_rejected() {
    let e = compile_err("int g = nope;");
    assert_eq!(e.kind, ErrorKind::Type);
    assert!(e.message.contains("undefined symbol"));
}

#[test]
fn test_typedef_name_in_expression_rejected() {
    let e = compile_err("typedef int T; int f(void) { return T; }");
    assert_eq!(e.kind, ErrorKind::Type);
    assert!(e.message.contains("unexpected type name"));
}

#[test]
fn test_va_start_requires_lvalue() {
    let e = compile_err("int f(int n, ...) { __builtin_va_start(1, n); return 0; }");
    assert_eq!(e.kind, ErrorKind::Type);
    assert!(e.message.contains("va_start expects an lvalue"));
}

#[test]
fn test_overflowing_array_dimension_rejected() {
    // 1 << 62 elements of int overflows any size computation
    let e = compile_err("int f(void) { int a[4611686018427387904]; return 0; }");
    assert_eq!(e.kind, ErrorKind::Decl);
    assert!(e.message.contains("incomplete type"));
}

#[test]
fn test_sizeof_constant() {
    let out = compile("int a = sizeof(long); int b = sizeof(int[3]);");
    assert!(out.contains("data $a = { w 8 }"), "got: {}", out);
    assert!(out.contains("data $b = { w 12 }"), "got: {}", out);
}

#[test]
fn test_constant_folding() {
    let out = compile("int a = 2 * 3 + 1; int b = 1 << 4; int c = 1 ? 2 : 3;");
    assert!(out.contains("data $a = { w 7 }"));
    assert!(out.contains("data $b = { w 16 }"));
    assert!(out.contains("data $c = { w 2 }"));
}

#[test]
fn test_char_and_escape_constants() {
    let out = compile("int a = 'A'; int b = '\\n';");
    assert!(out.contains("data $a = { w 65 }"));
    assert!(out.contains("data $b = { w 10 }"));
}

#[test]
fn test_unary_folding() {
    let out = compile("int a = -5; int b = ~0; int c = !3;");
    assert!(out.contains("data $a = { w -5 }"));
    assert!(out.contains("data $b = { w -1 }"));
    assert!(out.contains("data $c = { w 0 }"));
}

#[test]
fn test_hex_and_suffix_literals() {
    let out = compile("int a = 0x1f; long b = 7l;");
    assert!(out.contains("data $a = { w 31 }"));
    assert!(out.contains("data $b = { l 7 }"));
}

#[test]
fn test_division_by_zero_in_constexpr_rejected() {
    let e = compile_err("int a = 1 / 0;");
    assert_eq!(e.kind, ErrorKind::ConstExpr);
}

#[test]
fn test_pointer_constant_in_array_size_rejected() {
    let e = compile_err("int v; int a[(long)&v];");
    assert_eq!(e.kind, ErrorKind::ConstExpr);
}

// ----------------------------------------------------------------------
// Functions, labels, control-flow checks
// ----------------------------------------------------------------------

#[test]
fn test_goto_forward_and_backward() {
    let out = compile(
        "int f() { int i; i = 0; again: i = i + 1; if (i < 3) goto again; goto out; out: return i; }",
    );
    assert!(out.contains("function w $f"));
}

#[test]
fn test_goto_undefined_target_rejected() {
    let e = compile_err("int f() { goto nowhere; }");
    assert_eq!(e.kind, ErrorKind::ControlFlow);
    assert!(e.message.contains("goto target not defined"));
}

#[test]
fn test_duplicate_label_rejected() {
    let e = compile_err("int f() { l: ; l: ; return 0; }");
    assert_eq!(e.kind, ErrorKind::ControlFlow);
    assert!(e.message.contains("redefinition of label"));
}

#[test]
fn test_break_outside_loop_rejected() {
    let e = compile_err("int f() { break; }");
    assert_eq!(e.kind, ErrorKind::ControlFlow);
}

#[test]
fn test_continue_outside_loop_rejected() {
    let e = compile_err("int f() { continue; }");
    assert_eq!(e.kind, ErrorKind::ControlFlow);
}

#[test]
fn test_case_outside_switch_rejected() {
    let e = compile_err("int f() { case 1: return 0; }");
    assert_eq!(e.kind, ErrorKind::ControlFlow);
}

#[test]
fn test_duplicate_default_rejected() {
    let e = compile_err("int f(int x) { switch (x) { default: return 1; default: return 2; } }");
    assert_eq!(e.kind, ErrorKind::ControlFlow);
    assert!(e.message.contains("already has default"));
}

#[test]
fn test_switch_requires_integer_scrutinee() {
    let e = compile_err("int f(int *p) { switch (p) { case 1: return 0; } return 1; }");
    assert_eq!(e.kind, ErrorKind::Type);
}

#[test]
fn test_function_redefinition_rejected() {
    let e = compile_err("int f() { return 0; } int f() { return 1; }");
    assert_eq!(e.kind, ErrorKind::Decl);
    assert!(e.message.contains("already initialized"));
}

#[test]
fn test_call_arity_checked() {
    let e = compile_err("int p(int); int f() { return p(); }");
    assert_eq!(e.kind, ErrorKind::Type);
    assert!(e.message.contains("too few args"));
    let e = compile_err("int p(int); int f() { return p(1, 2); }");
    assert!(e.message.contains("too many args"));
}

#[test]
fn test_member_access_checked() {
    let e = compile_err("struct p { int x; }; int f(struct p *q) { return q->y; }");
    assert_eq!(e.kind, ErrorKind::Type);
    assert!(e.message.contains("no member"));
}

#[test]
fn test_deref_non_pointer_rejected() {
    let e = compile_err("int f(int x) { return *x; }");
    assert_eq!(e.kind, ErrorKind::Type);
    assert!(e.message.contains("cannot deref non pointer"));
}

#[test]
fn test_assign_requires_lvalue() {
    let e = compile_err("int f(int x) { x + 1 = 2; return x; }");
    assert_eq!(e.kind, ErrorKind::Type);
    assert!(e.message.contains("lvalue"));
}

#[test]
fn test_storage_class_in_parameter_rejected() {
    let e = compile_err("int f(static int x) { return x; }");
    assert_eq!(e.kind, ErrorKind::Decl);
    assert!(e.message.contains("parameter"));
}

#[test]
fn test_void_parameter_list() {
    let out = compile("int f(void) { return 0; }");
    assert!(out.contains("export function w $f() {"), "got: {}", out);
}
