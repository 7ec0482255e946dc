//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Token module - token kinds and the tokenizer
//

pub mod lexer;

pub use lexer::{Lexer, TokKind, Token};
