//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Diagnostic positions and error types for the occ C compiler
//

use std::fmt;

// ============================================================================
// Source Position
// ============================================================================

/// Source position attached to every token, symbol, and expression node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    /// Line number (1-based)
    pub line: u32,
    /// Column position (1-based, 0 means unknown)
    pub col: u32,
}

impl Position {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.col > 0 {
            write!(f, "{}:{}", self.line, self.col)
        } else {
            write!(f, "{}", self.line)
        }
    }
}

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Category of a user-facing compilation error.
///
/// Internal invariant violations (scope underflow, unsealed basic blocks)
/// are not represented here; those are defects, reported via panic so the
/// process aborts with a status distinct from ordinary compilation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong token where a specific one was required
    Token,
    /// Conflicting storage classes, bad specifier combinations,
    /// incomplete-type misuse, incompatible redeclaration
    Decl,
    /// Operator applied to incompatible operands, lvalue required,
    /// unknown member, calling a non-function
    Type,
    /// break/continue outside a loop, undefined goto target,
    /// duplicate label or switch default
    ControlFlow,
    /// Pointer-derived or non-constant value where an integer
    /// constant expression is required
    ConstExpr,
}

impl ErrorKind {
    fn what(&self) -> &'static str {
        match self {
            ErrorKind::Token => "syntax error",
            ErrorKind::Decl => "declaration error",
            ErrorKind::Type => "type error",
            ErrorKind::ControlFlow => "control flow error",
            ErrorKind::ConstExpr => "constant expression error",
        }
    }
}

/// A user-input compilation error: position, category, message.
///
/// The first error aborts compilation of the translation unit; there is
/// no recovery or resynchronization.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub pos: Position,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: ErrorKind, pos: Position, message: impl Into<String>) -> Self {
        Self {
            kind,
            pos,
            message: message.into(),
        }
    }

    pub fn token(pos: Position, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Token, pos, message)
    }

    pub fn decl(pos: Position, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decl, pos, message)
    }

    pub fn typ(pos: Position, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, pos, message)
    }

    pub fn control(pos: Position, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ControlFlow, pos, message)
    }

    pub fn constexpr(pos: Position, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConstExpr, pos, message)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.pos, self.kind.what(), self.message)
    }
}

impl std::error::Error for CompileError {}

pub type CResult<T> = Result<T, CompileError>;

// ============================================================================
// Tests
// ============================================================================
