//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// occ - a small one-pass C compiler front-end
//
// The pipeline is a single pass: the parser drives the lexer, performs
// semantic analysis as declarations and statements are recognized, and
// emits textual IR on the fly. A Compiler value is one compilation
// session; compile() consumes it and yields the IR for the translation
// unit.
//

pub mod diag;
pub mod ir;
pub mod parse;
pub mod symbol;
pub mod token;
pub mod types;

pub use diag::{CResult, CompileError, ErrorKind, Position};
pub use parse::Compiler;
