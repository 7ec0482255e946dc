//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Control-flow construction and expression lowering tests
//

use crate::parse::Compiler;

fn compile(src: &str) -> String {
    Compiler::new("test.c", src)
        .expect("lexer setup failed")
        .compile()
        .expect("compilation failed")
}

/// Number of basic blocks in the output: lines that define a label.
fn block_labels(text: &str) -> usize {
    text.lines().filter(|l| l.starts_with("@.L")).count()
}

// ----------------------------------------------------------------------
// Branching
// ----------------------------------------------------------------------

#[test]
fn test_if_without_else_is_three_blocks() {
    let out = compile("int f(int x) { if (x) return 1; return 2; }");
    assert_eq!(block_labels(&out), 3, "got: {}", out);
    assert_eq!(out.matches("\tret").count(), 2, "got: {}", out);
    assert!(out.contains("jnz"), "got: {}", out);
}

#[test]
fn test_if_with_else_is_four_blocks() {
    let out = compile("int f(int x) { if (x) return 1; else return 2; return 3; }");
    assert_eq!(block_labels(&out), 4, "got: {}", out);
}

#[test]
fn test_empty_function_single_block() {
    let out = compile("void f(void) { }");
    assert_eq!(block_labels(&out), 1, "got: {}", out);
    assert!(out.contains("function $f()"), "got: {}", out);
    assert!(out.contains("\tret\n"), "got: {}", out);
}

#[test]
fn test_code_after_return_lands_in_dead_block() {
    let out = compile("int f(int x) { return 1; x = 2; }");
    assert_eq!(block_labels(&out), 2, "got: {}", out);
}

// ----------------------------------------------------------------------
// Loops
// ----------------------------------------------------------------------

#[test]
fn test_while_loop_shape() {
    let out = compile("int f(int n) { int s; s = 0; while (n) { s = s + n; n = n - 1; } return s; }");
    // entry, cond, body, end
    assert_eq!(block_labels(&out), 4, "got: {}", out);
    assert!(out.contains("jnz"));
}

#[test]
fn test_do_while_condition_after_body() {
    let out = compile("int f(int n) { do { n = n - 1; } while (n); return n; }");
    assert_eq!(block_labels(&out), 4, "got: {}", out);
    let body = out.find("sub").unwrap();
    let cond = out.find("jnz").unwrap();
    assert!(body < cond, "got: {}", out);
}

#[test]
fn test_for_loop_with_omitted_condition() {
    let out = compile("int f(void) { int i; for (i = 0; ; i = i + 1) { if (i > 9) break; } return i; }");
    assert!(out.contains("jnz"), "got: {}", out);
    assert!(out.contains("csgtw"), "got: {}", out);
}

#[test]
fn test_continue_targets_step_block() {
    let out = compile(
        "int f(void) { int s; int i; s = 0; for (i = 0; i < 9; i = i + 1) { if (i == 3) continue; s = s + i; } return s; }",
    );
    assert!(out.contains("ceqw"), "got: {}", out);
}

// ----------------------------------------------------------------------
// Switch
// ----------------------------------------------------------------------

#[test]
fn test_switch_dispatch_chain() {
    let out = compile(
        "int f(int x) { switch (x) { case 1: return 10; case 2: return 20; default: return 30; } }",
    );
    // One compare-and-branch per case, in source order
    assert_eq!(out.matches("ceqw").count(), 2, "got: {}", out);
    assert_eq!(out.matches("\tret").count(), 4, "got: {}", out);
}

#[test]
fn test_switch_fallthrough_preserved() {
    let out = compile(
        "int f(int x) { int s; s = 0; switch (x) { case 1: s = s + 1; case 2: s = s + 2; } return s; }",
    );
    assert_eq!(out.matches("ceqw").count(), 2, "got: {}", out);
    // The case-1 block falls through into case 2 via a jump
    assert!(out.contains("jmp"), "got: {}", out);
}

#[test]
fn test_switch_without_default_dispatches_to_end() {
    let out = compile("int f(int x) { switch (x) { case 7: return 1; } return 0; }");
    assert_eq!(out.matches("ceqw").count(), 1, "got: {}", out);
}

// ----------------------------------------------------------------------
// Short-circuit and conditional operators
// ----------------------------------------------------------------------

#[test]
fn test_logical_and_branches() {
    let out = compile("int f(int a, int b) { return a && b; }");
    assert!(out.contains("alloc4"), "got: {}", out);
    assert_eq!(out.matches("cnew").count(), 2, "got: {}", out);
    assert!(out.contains("jnz"), "got: {}", out);
    assert!(out.contains("loadsw"), "got: {}", out);
}

#[test]
fn test_logical_or_branches() {
    let out = compile("int f(int a, int b) { return a || b; }");
    assert_eq!(out.matches("cnew").count(), 2, "got: {}", out);
    assert!(out.contains("jnz"), "got: {}", out);
}

#[test]
fn test_conditional_operator_evaluates_one_arm() {
    let out = compile("int c; int f(void) { return c ? 1 : 2; }");
    assert!(out.contains("jnz"), "got: {}", out);
    // One store per arm, one load at the join
    assert_eq!(out.matches("storew").count(), 2, "got: {}", out);
    assert_eq!(out.matches("loadsw").count(), 2, "got: {}", out);
}

// ----------------------------------------------------------------------
// Scalar lowering
// ----------------------------------------------------------------------

#[test]
fn test_parameters_spill_to_slots() {
    let out = compile("int f(int x) { return x; }");
    assert!(out.contains("alloc4"), "got: {}", out);
    assert!(out.contains("storew %t0"), "got: {}", out);
    assert!(out.contains("loadsw"), "got: {}", out);
}

#[test]
fn test_unary_lowering() {
    let out = compile("int f(int x) { return -x; }");
    assert!(out.contains("sub 0,"), "got: {}", out);
    let out = compile("int f(int x) { return ~x; }");
    assert!(out.contains("xor"), "got: {}", out);
    let out = compile("int f(int x) { return !x; }");
    assert!(out.contains("ceqw"), "got: {}", out);
}

#[test]
fn test_signed_and_unsigned_division() {
    let out = compile("int f(int a, int b) { return a / b % b; }");
    assert!(out.contains("div"), "got: {}", out);
    assert!(out.contains("rem"), "got: {}", out);
    let out = compile("unsigned f(unsigned a, unsigned b) { return a / b % b; }");
    assert!(out.contains("udiv"), "got: {}", out);
    assert!(out.contains("urem"), "got: {}", out);
}

#[test]
fn test_shift_selects_arithmetic_or_logical() {
    let out = compile("int f(int a, int b) { return a >> b; }");
    assert!(out.contains("sar"), "got: {}", out);
    let out = compile("unsigned f(unsigned a, unsigned b) { return a >> b; }");
    assert!(out.contains("shr"), "got: {}", out);
}

#[test]
fn test_unsigned_comparison_opcodes() {
    let out = compile("int f(unsigned a, unsigned b) { return a < b; }");
    assert!(out.contains("cultw"), "got: {}", out);
    let out = compile("int f(int a, int b) { return a < b; }");
    assert!(out.contains("csltw"), "got: {}", out);
}

#[test]
fn test_widening_on_return() {
    let out = compile("long f(int x) { return x; }");
    assert!(out.contains("extsw"), "got: {}", out);
    let out = compile("long f(unsigned x) { return x; }");
    assert!(out.contains("extuw"), "got: {}", out);
}

#[test]
fn test_narrowing_cast_reextends() {
    let out = compile("int f(int x) { return (char)x; }");
    assert!(out.contains("extsb"), "got: {}", out);
}

#[test]
fn test_sub_word_loads_and_stores() {
    let out = compile("char c; short s; int f(void) { c = 1; s = 2; return c + s; }");
    assert!(out.contains("storeb"), "got: {}", out);
    assert!(out.contains("storeh"), "got: {}", out);
    assert!(out.contains("loadsb"), "got: {}", out);
    assert!(out.contains("loadsh"), "got: {}", out);
}

#[test]
fn test_compound_assignment() {
    let out = compile("int f(int x) { x += 2; x *= 3; return x; }");
    assert!(out.contains("add"), "got: {}", out);
    assert!(out.contains("mul"), "got: {}", out);
}

#[test]
fn test_incdec_pre_and_post() {
    let out = compile("int f(int x) { int y; y = x++; return --y; }");
    assert!(out.contains("add"), "got: {}", out);
    assert!(out.contains("sub"), "got: {}", out);
}

// ----------------------------------------------------------------------
// Pointers, arrays, records
// ----------------------------------------------------------------------

#[test]
fn test_index_scales_by_element_size() {
    let out = compile("int f(int *p) { return p[2]; }");
    assert!(out.contains("mul"), "got: {}", out);
    assert!(out.contains(", 4"), "got: {}", out);
    assert!(out.contains("loadsw"), "got: {}", out);
}

#[test]
fn test_pointer_increment_steps_by_element() {
    let out = compile("long *f(long *p) { p++; return p; }");
    assert!(out.contains("add"), "got: {}", out);
    assert!(out.contains(", 8"), "got: {}", out);
}

#[test]
fn test_member_access_adds_offset() {
    let out = compile("struct p { int x; int y; }; int f(struct p *q) { return q->y; }");
    assert!(out.contains("add"), "got: {}", out);
    assert!(out.contains(", 4"), "got: {}", out);
    assert!(out.contains("loadsw"), "got: {}", out);
}

#[test]
fn test_struct_assignment_blits() {
    let out = compile(
        "struct p { int x; int y; }; void f(struct p *a, struct p *b) { *a = *b; }",
    );
    assert!(out.contains("blit"), "got: {}", out);
    assert!(out.contains(", 8"), "got: {}", out);
}

#[test]
fn test_address_of_local() {
    let out = compile("int f(void) { int x; int *p; x = 5; p = &x; return *p; }");
    assert!(out.contains("storel"), "got: {}", out);
    assert!(out.contains("loadl"), "got: {}", out);
}

#[test]
fn test_local_array_init_stores() {
    let out = compile("int f(void) { int a[2] = {1, 2}; return a[0]; }");
    assert!(out.contains("alloc4 8"), "got: {}", out);
    assert_eq!(out.matches("storew").count(), 2, "got: {}", out);
}

// ----------------------------------------------------------------------
// Calls
// ----------------------------------------------------------------------

#[test]
fn test_direct_call() {
    let out = compile("int p(int); int f(void) { return p(3); }");
    assert!(out.contains("call $p(w 3)"), "got: {}", out);
}

#[test]
fn test_argument_converted_to_parameter_type() {
    let out = compile("int g(long); int f(void) { return g(3); }");
    assert!(out.contains("extsw 3"), "got: {}", out);
    assert!(out.contains("call $g(l %t"), "got: {}", out);
}

#[test]
fn test_variadic_call_marks_fixed_args() {
    let out = compile("int printf(char *, ...); int f(void) { return printf(\"x\", 5); }");
    assert!(out.contains("call $printf(l $.L"), "got: {}", out);
    assert!(out.contains(", ..., w 5)"), "got: {}", out);
}

#[test]
fn test_void_call_has_no_destination() {
    let out = compile("void g(void); void f(void) { g(); }");
    assert!(out.contains("\tcall $g()"), "got: {}", out);
}

#[test]
fn test_call_through_function_pointer() {
    let out = compile("int f(int (*fp)(int)) { return fp(1); }");
    assert!(out.contains("loadl"), "got: {}", out);
    assert!(out.contains("call %t"), "got: {}", out);
}

#[test]
fn test_va_start_lowering() {
    let out = compile(
        "int f(int n, ...) { char *ap; __builtin_va_start(ap, n); return n; }",
    );
    assert!(out.contains("vastart"), "got: {}", out);
}

// ----------------------------------------------------------------------
// Statics and string data
// ----------------------------------------------------------------------

#[test]
fn test_block_scope_static_emits_data() {
    let out = compile("int f(void) { static int c = 5; c = c + 1; return c; }");
    assert!(out.contains("= { w 5 }"), "got: {}", out);
    // The counter loads and stores through its private data symbol
    assert!(out.contains("loadsw $.L"), "got: {}", out);
}

#[test]
fn test_string_literals_deduplicated() {
    let out = compile(
        "int puts(char *); int f(void) { puts(\"a\"); puts(\"a\"); puts(\"b\"); return 0; }",
    );
    assert_eq!(out.matches("b 97, b 0").count(), 1, "got: {}", out);
    assert_eq!(out.matches("b 98, b 0").count(), 1, "got: {}", out);
}
