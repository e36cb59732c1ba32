use crate::intern::StringId;
use crate::lexer::literal::{FloatSuffix, IntegerSuffix};
use crate::source_manager::SourceSpan;

/// Token kinds handed to the parser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    // === LITERALS ===
    IntegerConstant(i64, Option<IntegerSuffix>),
    FloatConstant(f64, Option<FloatSuffix>),
    CharacterConstant(u64),
    /// Decoded (unescaped, concatenated) string contents.
    StringLiteral(StringId),

    // === IDENTIFIERS ===
    Identifier(StringId),

    // === KEYWORDS ===
    // Storage class specifiers
    Extern,
    Static,
    Typedef,

    // Type qualifiers
    Const,
    Restrict,
    Volatile,

    // Type specifiers
    Bool,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Signed,
    Unsigned,
    Void,

    // Tag introducers
    Struct,
    Union,
    Enum,

    // Statements
    Else,
    If,
    Return,
    While,

    Sizeof,

    // === OPERATORS ===
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

    // === PUNCTUATION ===
    Comma,
    Semicolon,
    Ellipsis,

    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,

    // === SPECIAL TOKENS ===
    EndOfFile,
    Unknown,
}

impl TokenKind {
    pub(crate) fn is_storage_class_specifier(&self) -> bool {
        matches!(self, TokenKind::Typedef | TokenKind::Extern | TokenKind::Static)
    }

    pub(crate) fn is_type_specifier(&self) -> bool {
        matches!(
            self,
            TokenKind::Void
                | TokenKind::Char
                | TokenKind::Short
                | TokenKind::Int
                | TokenKind::Long
                | TokenKind::Float
                | TokenKind::Double
                | TokenKind::Signed
                | TokenKind::Unsigned
                | TokenKind::Bool
                | TokenKind::Struct
                | TokenKind::Union
                | TokenKind::Enum
        )
    }

    pub(crate) fn is_type_qualifier(&self) -> bool {
        matches!(self, TokenKind::Const | TokenKind::Restrict | TokenKind::Volatile)
    }

    pub(crate) fn is_declaration_specifier_start(&self) -> bool {
        self.is_storage_class_specifier() || self.is_type_specifier() || self.is_type_qualifier()
    }
}

/// Token with its source span.
///
/// Equality is structural (kind and payload only): macro expansion
/// duplicates tokens at new locations, and those copies must still
/// compare equal to the originals.
#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub span: SourceSpan,
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Token {
    pub fn new(kind: TokenKind, span: SourceSpan) -> Self {
        Token { kind, span }
    }
}
