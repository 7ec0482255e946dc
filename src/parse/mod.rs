//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Parser module - fused parsing, semantic analysis, and IR emission
//

pub mod ast;
mod expression;
pub mod parser;

#[cfg(test)]
mod test_parser;

pub use parser::Compiler;
