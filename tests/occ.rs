//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Integration tests for the occ command-line driver
//

use std::io::Write;
use std::process::{Command, Stdio};

fn occ() -> Command {
    Command::new(env!("CARGO_BIN_EXE_occ"))
}

#[test]
fn test_compile_file_to_stdout() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "int main() {{ return 0; }}").unwrap();
    let out = occ().arg(f.path()).output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("export function w $main() {"), "got: {}", text);
    assert!(text.contains("\tret 0"), "got: {}", text);
}

#[test]
fn test_compile_stdin_to_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let outpath = dir.path().join("out.ssa");
    let mut child = occ()
        .arg("-o")
        .arg(&outpath)
        .arg("-")
        .stdin(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(b"int g = 7;\n")
        .unwrap();
    let status = child.wait().unwrap();
    assert!(status.success());
    let text = std::fs::read_to_string(&outpath).unwrap();
    assert!(text.contains("export data $g = { w 7 }"), "got: {}", text);
}

#[test]
fn test_compile_error_exits_nonzero() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "int f() {{ return *1; }}").unwrap();
    let out = occ().arg(f.path()).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    let err = String::from_utf8(out.stderr).unwrap();
    assert!(err.contains("type error"), "got: {}", err);
    assert!(err.contains("cannot deref non pointer"), "got: {}", err);
}

#[test]
fn test_missing_input_file() {
    let out = occ().arg("/no/such/file.c").output().unwrap();
    assert_eq!(out.status.code(), Some(1));
}
