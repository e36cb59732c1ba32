//! Raw lexer.
//!
//! Turns a normalized source buffer into a flat stream of `PPToken`s that
//! the preprocessor consumes. Spellings of identifiers, numbers, and
//! character/string literals are preserved as interned symbols; literal
//! decoding and validation happen later, during token classification.

use crate::intern::StringId;
use crate::source_manager::{SourceId, SourceLoc, SourceSpan};

/// Lexical errors. These abort lexing of the current file.
#[derive(Debug, thiserror::Error)]
pub enum LexError {
    #[error("unterminated block comment")]
    UnterminatedBlockComment { location: SourceSpan },
    #[error("unterminated string literal")]
    UnterminatedString { location: SourceSpan },
    #[error("unterminated character literal")]
    UnterminatedChar { location: SourceSpan },
    #[error("invalid literal '{text}'")]
    InvalidLiteral { text: String, location: SourceSpan },
}

impl LexError {
    pub fn location(&self) -> SourceSpan {
        match self {
            LexError::UnterminatedBlockComment { location }
            | LexError::UnterminatedString { location }
            | LexError::UnterminatedChar { location }
            | LexError::InvalidLiteral { location, .. } => *location,
        }
    }
}

bitflags::bitflags! {
    /// Packed per-token flags used by the preprocessor.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PPTokenFlags: u8 {
        /// First token on its source line (directive detection).
        const BEGINNING_OF_LINE = 1 << 0;
        /// Preceded by whitespace on the same line.
        const LEADING_SPACE = 1 << 1;
        /// Produced by macro substitution rather than lexed from a buffer.
        const MACRO_EXPANDED = 1 << 2;
    }
}

/// Preprocessor token kinds. Identifier/number/literal payloads are the
/// exact spellings from the source buffer, interned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PPTokenKind {
    Identifier(StringId),
    Number(StringId),
    StringLiteral(StringId),
    CharLiteral(StringId),

    // Punctuators, longest-match first in the lexer.
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Increment,
    Decrement,
    And,
    Or,
    Xor,
    Not,
    Tilde,
    LeftShift,
    RightShift,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    LeftShiftAssign,
    RightShiftAssign,
    LogicAnd,
    LogicOr,
    Arrow,
    Dot,
    Question,
    Colon,
    Comma,
    Semicolon,
    Ellipsis,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Hash,

    Eof,
}

impl PPTokenKind {
    /// The spelling of the token. Punctuators have a fixed spelling;
    /// payload-carrying kinds return their interned text.
    pub fn spelling(&self) -> &'static str {
        match self {
            PPTokenKind::Identifier(s)
            | PPTokenKind::Number(s)
            | PPTokenKind::StringLiteral(s)
            | PPTokenKind::CharLiteral(s) => s.as_str(),
            PPTokenKind::Plus => "+",
            PPTokenKind::Minus => "-",
            PPTokenKind::Star => "*",
            PPTokenKind::Slash => "/",
            PPTokenKind::Percent => "%",
            PPTokenKind::Increment => "++",
            PPTokenKind::Decrement => "--",
            PPTokenKind::And => "&",
            PPTokenKind::Or => "|",
            PPTokenKind::Xor => "^",
            PPTokenKind::Not => "!",
            PPTokenKind::Tilde => "~",
            PPTokenKind::LeftShift => "<<",
            PPTokenKind::RightShift => ">>",
            PPTokenKind::Less => "<",
            PPTokenKind::Greater => ">",
            PPTokenKind::LessEqual => "<=",
            PPTokenKind::GreaterEqual => ">=",
            PPTokenKind::Equal => "==",
            PPTokenKind::NotEqual => "!=",
            PPTokenKind::Assign => "=",
            PPTokenKind::PlusAssign => "+=",
            PPTokenKind::MinusAssign => "-=",
            PPTokenKind::StarAssign => "*=",
            PPTokenKind::DivAssign => "/=",
            PPTokenKind::ModAssign => "%=",
            PPTokenKind::AndAssign => "&=",
            PPTokenKind::OrAssign => "|=",
            PPTokenKind::XorAssign => "^=",
            PPTokenKind::LeftShiftAssign => "<<=",
            PPTokenKind::RightShiftAssign => ">>=",
            PPTokenKind::LogicAnd => "&&",
            PPTokenKind::LogicOr => "||",
            PPTokenKind::Arrow => "->",
            PPTokenKind::Dot => ".",
            PPTokenKind::Question => "?",
            PPTokenKind::Colon => ":",
            PPTokenKind::Comma => ",",
            PPTokenKind::Semicolon => ";",
            PPTokenKind::Ellipsis => "...",
            PPTokenKind::LeftParen => "(",
            PPTokenKind::RightParen => ")",
            PPTokenKind::LeftBracket => "[",
            PPTokenKind::RightBracket => "]",
            PPTokenKind::LeftBrace => "{",
            PPTokenKind::RightBrace => "}",
            PPTokenKind::Hash => "#",
            PPTokenKind::Eof => "",
        }
    }
}

/// A raw token with its flags and source position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PPToken {
    pub kind: PPTokenKind,
    pub flags: PPTokenFlags,
    pub location: SourceLoc,
    pub length: u16,
}

impl PPToken {
    pub fn new(kind: PPTokenKind, flags: PPTokenFlags, location: SourceLoc, length: u16) -> Self {
        PPToken {
            kind,
            flags,
            location,
            length,
        }
    }

    pub fn span(&self) -> SourceSpan {
        SourceSpan::new_with_length(self.location.source_id(), self.location.offset(), self.length as u32)
    }

    pub fn is_at_line_start(&self) -> bool {
        self.flags.contains(PPTokenFlags::BEGINNING_OF_LINE)
    }
}

/// Raw lexer state machine over one buffer.
pub struct PPLexer {
    pub source_id: SourceId,
    buffer: Vec<u8>,
    position: u32,
    at_line_start: bool,
    had_space: bool,
    pushback: Vec<PPToken>,
}

impl PPLexer {
    pub fn new(source_id: SourceId, buffer: Vec<u8>) -> Self {
        PPLexer {
            source_id,
            buffer,
            position: 0,
            at_line_start: true,
            had_space: false,
            pushback: Vec::new(),
        }
    }

    /// Return a token to the stream; it is handed out again before any new
    /// lexing happens.
    pub fn put_back(&mut self, token: PPToken) {
        self.pushback.push(token);
    }

    /// Current byte offset into the buffer.
    pub fn position(&self) -> u32 {
        self.position
    }

    fn peek(&self) -> Option<u8> {
        self.buffer.get(self.position as usize).copied()
    }

    fn peek_at(&self, ahead: u32) -> Option<u8> {
        self.buffer.get((self.position + ahead) as usize).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.position += 1;
        Some(b)
    }

    fn loc(&self, offset: u32) -> SourceLoc {
        SourceLoc::new(self.source_id, offset)
    }

    fn span_from(&self, start: u32) -> SourceSpan {
        SourceSpan::new(self.loc(start), self.loc(self.position))
    }

    /// Skip whitespace and comments, tracking line starts. Reports an
    /// unterminated block comment.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(b'\n') => {
                    self.position += 1;
                    self.at_line_start = true;
                    self.had_space = false;
                }
                Some(b' ') | Some(b'\t') | Some(b'\x0b') | Some(b'\x0c') => {
                    self.position += 1;
                    self.had_space = true;
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.position += 1;
                    }
                    self.had_space = true;
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.position;
                    self.position += 2;
                    let mut closed = false;
                    while let Some(b) = self.bump() {
                        if b == b'\n' {
                            self.at_line_start = true;
                        }
                        if b == b'*' && self.peek() == Some(b'/') {
                            self.position += 1;
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return Err(LexError::UnterminatedBlockComment {
                            location: self.span_from(start),
                        });
                    }
                    self.had_space = true;
                }
                _ => return Ok(()),
            }
        }
    }

    fn take_flags(&mut self) -> PPTokenFlags {
        let mut flags = PPTokenFlags::empty();
        if self.at_line_start {
            flags |= PPTokenFlags::BEGINNING_OF_LINE;
        }
        if self.had_space {
            flags |= PPTokenFlags::LEADING_SPACE;
        }
        self.at_line_start = false;
        self.had_space = false;
        flags
    }

    fn intern_range(&self, start: u32) -> StringId {
        let text = std::str::from_utf8(&self.buffer[start as usize..self.position as usize])
            .unwrap_or_default();
        StringId::new(text)
    }

    fn make(&self, kind: PPTokenKind, flags: PPTokenFlags, start: u32) -> PPToken {
        PPToken::new(kind, flags, self.loc(start), (self.position - start) as u16)
    }

    /// Lex the next token. `Ok(None)` signals end of buffer.
    pub fn next_token(&mut self) -> Result<Option<PPToken>, LexError> {
        if let Some(token) = self.pushback.pop() {
            return Ok(Some(token));
        }
        self.skip_trivia()?;
        let start = self.position;
        let flags = self.take_flags();
        let first = match self.bump() {
            Some(b) => b,
            None => return Ok(None),
        };

        let kind = match first {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                // Wide literal prefixes keep their spelling on the literal.
                if first == b'L' && matches!(self.peek(), Some(b'"')) {
                    self.position += 1;
                    return self.lex_string(start, flags);
                }
                if first == b'L' && matches!(self.peek(), Some(b'\'')) {
                    self.position += 1;
                    return self.lex_char(start, flags);
                }
                while let Some(b) = self.peek() {
                    if b.is_ascii_alphanumeric() || b == b'_' {
                        self.position += 1;
                    } else {
                        break;
                    }
                }
                PPTokenKind::Identifier(self.intern_range(start))
            }
            b'0'..=b'9' => {
                self.lex_number_tail();
                PPTokenKind::Number(self.intern_range(start))
            }
            b'.' => {
                if matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.lex_number_tail();
                    PPTokenKind::Number(self.intern_range(start))
                } else if self.peek() == Some(b'.') && self.peek_at(1) == Some(b'.') {
                    self.position += 2;
                    PPTokenKind::Ellipsis
                } else {
                    PPTokenKind::Dot
                }
            }
            b'"' => return self.lex_string(start, flags),
            b'\'' => return self.lex_char(start, flags),
            b'+' => match self.peek() {
                Some(b'+') => {
                    self.position += 1;
                    PPTokenKind::Increment
                }
                Some(b'=') => {
                    self.position += 1;
                    PPTokenKind::PlusAssign
                }
                _ => PPTokenKind::Plus,
            },
            b'-' => match self.peek() {
                Some(b'-') => {
                    self.position += 1;
                    PPTokenKind::Decrement
                }
                Some(b'=') => {
                    self.position += 1;
                    PPTokenKind::MinusAssign
                }
                Some(b'>') => {
                    self.position += 1;
                    PPTokenKind::Arrow
                }
                _ => PPTokenKind::Minus,
            },
            b'*' => {
                if self.peek() == Some(b'=') {
                    self.position += 1;
                    PPTokenKind::StarAssign
                } else {
                    PPTokenKind::Star
                }
            }
            b'/' => {
                if self.peek() == Some(b'=') {
                    self.position += 1;
                    PPTokenKind::DivAssign
                } else {
                    PPTokenKind::Slash
                }
            }
            b'%' => {
                if self.peek() == Some(b'=') {
                    self.position += 1;
                    PPTokenKind::ModAssign
                } else {
                    PPTokenKind::Percent
                }
            }
            b'<' => match (self.peek(), self.peek_at(1)) {
                (Some(b'<'), Some(b'=')) => {
                    self.position += 2;
                    PPTokenKind::LeftShiftAssign
                }
                (Some(b'<'), _) => {
                    self.position += 1;
                    PPTokenKind::LeftShift
                }
                (Some(b'='), _) => {
                    self.position += 1;
                    PPTokenKind::LessEqual
                }
                _ => PPTokenKind::Less,
            },
            b'>' => match (self.peek(), self.peek_at(1)) {
                (Some(b'>'), Some(b'=')) => {
                    self.position += 2;
                    PPTokenKind::RightShiftAssign
                }
                (Some(b'>'), _) => {
                    self.position += 1;
                    PPTokenKind::RightShift
                }
                (Some(b'='), _) => {
                    self.position += 1;
                    PPTokenKind::GreaterEqual
                }
                _ => PPTokenKind::Greater,
            },
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.position += 1;
                    PPTokenKind::Equal
                } else {
                    PPTokenKind::Assign
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.position += 1;
                    PPTokenKind::NotEqual
                } else {
                    PPTokenKind::Not
                }
            }
            b'&' => match self.peek() {
                Some(b'&') => {
                    self.position += 1;
                    PPTokenKind::LogicAnd
                }
                Some(b'=') => {
                    self.position += 1;
                    PPTokenKind::AndAssign
                }
                _ => PPTokenKind::And,
            },
            b'|' => match self.peek() {
                Some(b'|') => {
                    self.position += 1;
                    PPTokenKind::LogicOr
                }
                Some(b'=') => {
                    self.position += 1;
                    PPTokenKind::OrAssign
                }
                _ => PPTokenKind::Or,
            },
            b'^' => {
                if self.peek() == Some(b'=') {
                    self.position += 1;
                    PPTokenKind::XorAssign
                } else {
                    PPTokenKind::Xor
                }
            }
            b'~' => PPTokenKind::Tilde,
            b'?' => PPTokenKind::Question,
            b':' => PPTokenKind::Colon,
            b',' => PPTokenKind::Comma,
            b';' => PPTokenKind::Semicolon,
            b'(' => PPTokenKind::LeftParen,
            b')' => PPTokenKind::RightParen,
            b'[' => PPTokenKind::LeftBracket,
            b']' => PPTokenKind::RightBracket,
            b'{' => PPTokenKind::LeftBrace,
            b'}' => PPTokenKind::RightBrace,
            b'#' => PPTokenKind::Hash,
            other => {
                return Err(LexError::InvalidLiteral {
                    text: (other as char).to_string(),
                    location: self.span_from(start),
                });
            }
        };

        Ok(Some(self.make(kind, flags, start)))
    }

    /// Consume the tail of a pp-number: digits, letters, `.`, and signs
    /// after an exponent marker. Validation happens at classification.
    fn lex_number_tail(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' {
                self.position += 1;
            } else if (b == b'+' || b == b'-')
                && matches!(
                    self.buffer.get(self.position as usize - 1),
                    Some(b'e') | Some(b'E') | Some(b'p') | Some(b'P')
                )
            {
                self.position += 1;
            } else {
                break;
            }
        }
    }

    fn lex_string(&mut self, start: u32, flags: PPTokenFlags) -> Result<Option<PPToken>, LexError> {
        // Position is just past the opening quote.
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => {
                    self.position += 1;
                }
                Some(b'\n') | None => {
                    return Err(LexError::UnterminatedString {
                        location: self.span_from(start),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(Some(self.make(
            PPTokenKind::StringLiteral(self.intern_range(start)),
            flags,
            start,
        )))
    }

    fn lex_char(&mut self, start: u32, flags: PPTokenFlags) -> Result<Option<PPToken>, LexError> {
        loop {
            match self.bump() {
                Some(b'\'') => break,
                Some(b'\\') => {
                    self.position += 1;
                }
                Some(b'\n') | None => {
                    return Err(LexError::UnterminatedChar {
                        location: self.span_from(start),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(Some(self.make(
            PPTokenKind::CharLiteral(self.intern_range(start)),
            flags,
            start,
        )))
    }
}
