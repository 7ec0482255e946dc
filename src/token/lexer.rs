//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Tokenizer for the occ C compiler
//
// Produces one token at a time with exactly one token of lookahead,
// which is all the parser is permitted to use. Preprocessor directives
// are not supported; '#' lines are skipped wholesale.
//

use crate::diag::{CResult, CompileError, Position};

// ============================================================================
// Token Kinds
// ============================================================================

/// Token kinds: keywords, literals, identifiers, and punctuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokKind {
    Eof,
    Ident,
    IntLit,
    CharLit,
    StrLit,

    // Keywords
    Void,
    Char,
    Short,
    Int,
    Long,
    Signed,
    Unsigned,
    Float,
    Double,
    Const,
    Volatile,
    Extern,
    Static,
    Auto,
    Register,
    Typedef,
    Struct,
    Union,
    Enum,
    If,
    Else,
    While,
    Do,
    For,
    Return,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Goto,
    Sizeof,

    // Punctuators
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Colon,
    Question,
    Dot,
    Arrow,
    Ellipsis,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Ne,
    Shl,
    Shr,
    AndAnd,
    OrOr,
    Inc,
    Dec,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
}

impl TokKind {
    /// Human-readable token name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            TokKind::Eof => "end of file",
            TokKind::Ident => "identifier",
            TokKind::IntLit => "integer constant",
            TokKind::CharLit => "character constant",
            TokKind::StrLit => "string literal",
            TokKind::Void => "void",
            TokKind::Char => "char",
            TokKind::Short => "short",
            TokKind::Int => "int",
            TokKind::Long => "long",
            TokKind::Signed => "signed",
            TokKind::Unsigned => "unsigned",
            TokKind::Float => "float",
            TokKind::Double => "double",
            TokKind::Const => "const",
            TokKind::Volatile => "volatile",
            TokKind::Extern => "extern",
            TokKind::Static => "static",
            TokKind::Auto => "auto",
            TokKind::Register => "register",
            TokKind::Typedef => "typedef",
            TokKind::Struct => "struct",
            TokKind::Union => "union",
            TokKind::Enum => "enum",
            TokKind::If => "if",
            TokKind::Else => "else",
            TokKind::While => "while",
            TokKind::Do => "do",
            TokKind::For => "for",
            TokKind::Return => "return",
            TokKind::Switch => "switch",
            TokKind::Case => "case",
            TokKind::Default => "default",
            TokKind::Break => "break",
            TokKind::Continue => "continue",
            TokKind::Goto => "goto",
            TokKind::Sizeof => "sizeof",
            TokKind::LParen => "'('",
            TokKind::RParen => "')'",
            TokKind::LBrace => "'{'",
            TokKind::RBrace => "'}'",
            TokKind::LBracket => "'['",
            TokKind::RBracket => "']'",
            TokKind::Semi => "';'",
            TokKind::Comma => "','",
            TokKind::Colon => "':'",
            TokKind::Question => "'?'",
            TokKind::Dot => "'.'",
            TokKind::Arrow => "'->'",
            TokKind::Ellipsis => "'...'",
            TokKind::Assign => "'='",
            TokKind::Plus => "'+'",
            TokKind::Minus => "'-'",
            TokKind::Star => "'*'",
            TokKind::Slash => "'/'",
            TokKind::Percent => "'%'",
            TokKind::Amp => "'&'",
            TokKind::Pipe => "'|'",
            TokKind::Caret => "'^'",
            TokKind::Tilde => "'~'",
            TokKind::Bang => "'!'",
            TokKind::Lt => "'<'",
            TokKind::Gt => "'>'",
            TokKind::Le => "'<='",
            TokKind::Ge => "'>='",
            TokKind::EqEq => "'=='",
            TokKind::Ne => "'!='",
            TokKind::Shl => "'<<'",
            TokKind::Shr => "'>>'",
            TokKind::AndAnd => "'&&'",
            TokKind::OrOr => "'||'",
            TokKind::Inc => "'++'",
            TokKind::Dec => "'--'",
            TokKind::AddAssign => "'+='",
            TokKind::SubAssign => "'-='",
            TokKind::MulAssign => "'*='",
            TokKind::DivAssign => "'/='",
            TokKind::ModAssign => "'%='",
            TokKind::AndAssign => "'&='",
            TokKind::OrAssign => "'|='",
            TokKind::XorAssign => "'^='",
        }
    }
}

fn keyword(text: &str) -> Option<TokKind> {
    let k = match text {
        "void" => TokKind::Void,
        "char" => TokKind::Char,
        "short" => TokKind::Short,
        "int" => TokKind::Int,
        "long" => TokKind::Long,
        "signed" => TokKind::Signed,
        "unsigned" => TokKind::Unsigned,
        "float" => TokKind::Float,
        "double" => TokKind::Double,
        "const" => TokKind::Const,
        "volatile" => TokKind::Volatile,
        "extern" => TokKind::Extern,
        "static" => TokKind::Static,
        "auto" => TokKind::Auto,
        "register" => TokKind::Register,
        "typedef" => TokKind::Typedef,
        "struct" => TokKind::Struct,
        "union" => TokKind::Union,
        "enum" => TokKind::Enum,
        "if" => TokKind::If,
        "else" => TokKind::Else,
        "while" => TokKind::While,
        "do" => TokKind::Do,
        "for" => TokKind::For,
        "return" => TokKind::Return,
        "switch" => TokKind::Switch,
        "case" => TokKind::Case,
        "default" => TokKind::Default,
        "break" => TokKind::Break,
        "continue" => TokKind::Continue,
        "goto" => TokKind::Goto,
        "sizeof" => TokKind::Sizeof,
        _ => return None,
    };
    Some(k)
}

// ============================================================================
// Token
// ============================================================================

/// A C token: kind, literal text, and source position.
/// Immutable once produced.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokKind,
    pub text: String,
    pub pos: Position,
}

impl Token {
    fn new(kind: TokKind, text: impl Into<String>, pos: Position) -> Self {
        Self {
            kind,
            text: text.into(),
            pos,
        }
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[inline]
fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

#[inline]
fn is_ident_cont(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Tokenizer with one-token lookahead.
///
/// `current()` is the token under consideration, `peek()` the one after it.
/// `advance()` consumes the current token. This is the entire interface the
/// parser gets; no further lookahead or rewinding exists.
pub struct Lexer {
    bytes: Vec<u8>,
    off: usize,
    line: u32,
    col: u32,
    pub file: String,
    cur: Token,
    ahead: Token,
}

impl Lexer {
    pub fn new(file: impl Into<String>, source: &str) -> CResult<Self> {
        let mut lx = Self {
            bytes: source.as_bytes().to_vec(),
            off: 0,
            line: 1,
            col: 1,
            file: file.into(),
            cur: Token::new(TokKind::Eof, "", Position::default()),
            ahead: Token::new(TokKind::Eof, "", Position::default()),
        };
        // Prime both lookahead slots
        lx.cur = lx.scan()?;
        lx.ahead = lx.scan()?;
        Ok(lx)
    }

    /// The token currently under consideration.
    pub fn current(&self) -> &Token {
        &self.cur
    }

    /// The single lookahead token.
    pub fn peek(&self) -> &Token {
        &self.ahead
    }

    /// Consume the current token and return it.
    pub fn advance(&mut self) -> CResult<Token> {
        let next = self.scan()?;
        let consumed = std::mem::replace(&mut self.cur, std::mem::replace(&mut self.ahead, next));
        Ok(consumed)
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    fn at(&self, n: usize) -> u8 {
        *self.bytes.get(self.off + n).unwrap_or(&0)
    }

    fn bump(&mut self) -> u8 {
        let c = self.at(0);
        self.off += 1;
        if c == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        c
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn skip_whitespace(&mut self) -> CResult<()> {
        loop {
            match self.at(0) {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'/' if self.at(1) == b'/' => {
                    while self.at(0) != b'\n' && self.off < self.bytes.len() {
                        self.bump();
                    }
                }
                b'/' if self.at(1) == b'*' => {
                    let start = self.pos();
                    self.bump();
                    self.bump();
                    loop {
                        if self.off >= self.bytes.len() {
                            return Err(CompileError::token(start, "unterminated comment"));
                        }
                        if self.at(0) == b'*' && self.at(1) == b'/' {
                            self.bump();
                            self.bump();
                            break;
                        }
                        self.bump();
                    }
                }
                // No preprocessor; discard '#' lines
                b'#' => {
                    while self.at(0) != b'\n' && self.off < self.bytes.len() {
                        self.bump();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan(&mut self) -> CResult<Token> {
        self.skip_whitespace()?;
        let pos = self.pos();
        if self.off >= self.bytes.len() {
            return Ok(Token::new(TokKind::Eof, "", pos));
        }
        let c = self.at(0);
        if is_ident_start(c) {
            return Ok(self.scan_ident(pos));
        }
        if c.is_ascii_digit() {
            return Ok(self.scan_number(pos));
        }
        match c {
            b'\'' => self.scan_char(pos),
            b'"' => self.scan_string(pos),
            _ => self.scan_punct(pos),
        }
    }

    fn scan_ident(&mut self, pos: Position) -> Token {
        let start = self.off;
        while is_ident_cont(self.at(0)) {
            self.bump();
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.off]).into_owned();
        match keyword(&text) {
            Some(k) => Token::new(k, text, pos),
            None => Token::new(TokKind::Ident, text, pos),
        }
    }

    fn scan_number(&mut self, pos: Position) -> Token {
        let start = self.off;
        if self.at(0) == b'0' && (self.at(1) == b'x' || self.at(1) == b'X') {
            self.bump();
            self.bump();
            while self.at(0).is_ascii_hexdigit() {
                self.bump();
            }
        } else {
            while self.at(0).is_ascii_digit() {
                self.bump();
            }
        }
        // Integer suffixes accepted and discarded
        while matches!(self.at(0), b'u' | b'U' | b'l' | b'L') {
            self.bump();
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.off]).into_owned();
        Token::new(TokKind::IntLit, text, pos)
    }

    fn scan_char(&mut self, pos: Position) -> CResult<Token> {
        let start = self.off;
        self.bump(); // opening quote
        loop {
            match self.at(0) {
                0 | b'\n' => {
                    return Err(CompileError::token(pos, "unterminated character constant"))
                }
                b'\\' => {
                    self.bump();
                    self.bump();
                }
                b'\'' => {
                    self.bump();
                    break;
                }
                _ => {
                    self.bump();
                }
            }
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.off]).into_owned();
        Ok(Token::new(TokKind::CharLit, text, pos))
    }

    fn scan_string(&mut self, pos: Position) -> CResult<Token> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.at(0) {
                0 | b'\n' => return Err(CompileError::token(pos, "unterminated string literal")),
                b'\\' => {
                    self.bump();
                    let esc = self.bump();
                    text.push(match esc {
                        b'n' => '\n',
                        b't' => '\t',
                        b'r' => '\r',
                        b'0' => '\0',
                        b'\\' => '\\',
                        b'\'' => '\'',
                        b'"' => '"',
                        _ => return Err(CompileError::token(pos, "unknown escape code")),
                    });
                }
                b'"' => {
                    self.bump();
                    break;
                }
                c => {
                    self.bump();
                    text.push(c as char);
                }
            }
        }
        Ok(Token::new(TokKind::StrLit, text, pos))
    }

    fn scan_punct(&mut self, pos: Position) -> CResult<Token> {
        use TokKind::*;
        let c = self.bump();
        let c2 = self.at(0);
        let (kind, len2) = match (c, c2) {
            (b'+', b'+') => (Inc, true),
            (b'+', b'=') => (AddAssign, true),
            (b'-', b'-') => (Dec, true),
            (b'-', b'=') => (SubAssign, true),
            (b'-', b'>') => (Arrow, true),
            (b'*', b'=') => (MulAssign, true),
            (b'/', b'=') => (DivAssign, true),
            (b'%', b'=') => (ModAssign, true),
            (b'&', b'&') => (AndAnd, true),
            (b'&', b'=') => (AndAssign, true),
            (b'|', b'|') => (OrOr, true),
            (b'|', b'=') => (OrAssign, true),
            (b'^', b'=') => (XorAssign, true),
            (b'<', b'<') => (Shl, true),
            (b'>', b'>') => (Shr, true),
            (b'<', b'=') => (Le, true),
            (b'>', b'=') => (Ge, true),
            (b'=', b'=') => (EqEq, true),
            (b'!', b'=') => (Ne, true),
            (b'.', b'.') if self.at(1) == b'.' => {
                self.bump();
                self.bump();
                return Ok(Token::new(Ellipsis, "...", pos));
            }
            (b'+', _) => (Plus, false),
            (b'-', _) => (Minus, false),
            (b'*', _) => (Star, false),
            (b'/', _) => (Slash, false),
            (b'%', _) => (Percent, false),
            (b'&', _) => (Amp, false),
            (b'|', _) => (Pipe, false),
            (b'^', _) => (Caret, false),
            (b'~', _) => (Tilde, false),
            (b'!', _) => (Bang, false),
            (b'<', _) => (Lt, false),
            (b'>', _) => (Gt, false),
            (b'=', _) => (Assign, false),
            (b'(', _) => (LParen, false),
            (b')', _) => (RParen, false),
            (b'{', _) => (LBrace, false),
            (b'}', _) => (RBrace, false),
            (b'[', _) => (LBracket, false),
            (b']', _) => (RBracket, false),
            (b';', _) => (Semi, false),
            (b',', _) => (Comma, false),
            (b':', _) => (Colon, false),
            (b'?', _) => (Question, false),
            (b'.', _) => (Dot, false),
            _ => {
                return Err(CompileError::token(
                    pos,
                    format!("unexpected character '{}'", c as char),
                ))
            }
        };
        let mut text = String::new();
        text.push(c as char);
        if len2 {
            text.push(self.bump() as char);
        }
        Ok(Token::new(kind, text, pos))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokKind> {
        let mut lx = Lexer::new("test.c", src).unwrap();
        let mut out = Vec::new();
        while lx.current().kind != TokKind::Eof {
            out.push(lx.current().kind);
            lx.advance().unwrap();
        }
        out
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            kinds("int foo while whilex"),
            vec![TokKind::Int, TokKind::Ident, TokKind::While, TokKind::Ident]
        );
    }

    #[test]
    fn test_punctuators() {
        assert_eq!(
            kinds("a >>= b"),
            // no >>= operator; lexes as >> then =
            vec![TokKind::Ident, TokKind::Shr, TokKind::Assign, TokKind::Ident]
        );
        assert_eq!(
            kinds("-> ... ++ <= =="),
            vec![
                TokKind::Arrow,
                TokKind::Ellipsis,
                TokKind::Inc,
                TokKind::Le,
                TokKind::EqEq
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let mut lx = Lexer::new("t.c", "42 0x1f 0755 7ul").unwrap();
        assert_eq!(lx.current().text, "42");
        lx.advance().unwrap();
        assert_eq!(lx.current().text, "0x1f");
        lx.advance().unwrap();
        assert_eq!(lx.current().text, "0755");
        lx.advance().unwrap();
        assert_eq!(lx.current().text, "7ul");
    }

    #[test]
    fn test_string_escapes() {
        let lx = Lexer::new("t.c", "\"a\\n\\tb\"").unwrap();
        assert_eq!(lx.current().kind, TokKind::StrLit);
        assert_eq!(lx.current().text, "a\n\tb");
    }

    #[test]
    fn test_char_literal_text_preserved() {
        let lx = Lexer::new("t.c", "'\\n'").unwrap();
        assert_eq!(lx.current().kind, TokKind::CharLit);
        assert_eq!(lx.current().text, "'\\n'");
    }

    #[test]
    fn test_lookahead() {
        let mut lx = Lexer::new("t.c", "a : b").unwrap();
        assert_eq!(lx.current().kind, TokKind::Ident);
        assert_eq!(lx.peek().kind, TokKind::Colon);
        lx.advance().unwrap();
        assert_eq!(lx.current().kind, TokKind::Colon);
        assert_eq!(lx.peek().kind, TokKind::Ident);
    }

    #[test]
    fn test_positions() {
        let mut lx = Lexer::new("t.c", "int\n  x;").unwrap();
        assert_eq!(lx.current().pos, Position::new(1, 1));
        lx.advance().unwrap();
        assert_eq!(lx.current().pos, Position::new(2, 3));
    }

    #[test]
    fn test_comments_and_hash_lines() {
        assert_eq!(
            kinds("#include <x.h>\nint /* c */ x; // t\n"),
            vec![TokKind::Int, TokKind::Ident, TokKind::Semi]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(Lexer::new("t.c", "\"abc").is_err());
    }
}
