//! Token classification.
//!
//! Second lexing stage: turns the preprocessor's cleaned token stream into
//! parser tokens. Identifiers are checked against the keyword table,
//! literal spellings are decoded and validated, and adjacent string
//! literals are concatenated. An invalid literal aborts the file.

pub mod literal;
pub mod token;
#[cfg(test)]
mod tests_lexer;

pub use token::{Token, TokenKind};

use crate::intern::StringId;
use crate::pp::{LexError, PPToken, PPTokenKind};
use crate::source_manager::SourceSpan;

fn classify_punctuation(pp_token_kind: PPTokenKind) -> TokenKind {
    match pp_token_kind {
        PPTokenKind::Plus => TokenKind::Plus,
        PPTokenKind::Minus => TokenKind::Minus,
        PPTokenKind::Star => TokenKind::Star,
        PPTokenKind::Slash => TokenKind::Slash,
        PPTokenKind::Percent => TokenKind::Percent,
        PPTokenKind::Increment => TokenKind::Increment,
        PPTokenKind::Decrement => TokenKind::Decrement,

        PPTokenKind::And => TokenKind::And,
        PPTokenKind::Or => TokenKind::Or,
        PPTokenKind::Xor => TokenKind::Xor,
        PPTokenKind::Not => TokenKind::Not,
        PPTokenKind::Tilde => TokenKind::Tilde,
        PPTokenKind::LeftShift => TokenKind::LeftShift,
        PPTokenKind::RightShift => TokenKind::RightShift,

        PPTokenKind::Less => TokenKind::Less,
        PPTokenKind::Greater => TokenKind::Greater,
        PPTokenKind::LessEqual => TokenKind::LessEqual,
        PPTokenKind::GreaterEqual => TokenKind::GreaterEqual,
        PPTokenKind::Equal => TokenKind::Equal,
        PPTokenKind::NotEqual => TokenKind::NotEqual,

        PPTokenKind::Assign => TokenKind::Assign,
        PPTokenKind::PlusAssign => TokenKind::PlusAssign,
        PPTokenKind::MinusAssign => TokenKind::MinusAssign,
        PPTokenKind::StarAssign => TokenKind::StarAssign,
        PPTokenKind::DivAssign => TokenKind::DivAssign,
        PPTokenKind::ModAssign => TokenKind::ModAssign,
        PPTokenKind::AndAssign => TokenKind::AndAssign,
        PPTokenKind::OrAssign => TokenKind::OrAssign,
        PPTokenKind::XorAssign => TokenKind::XorAssign,
        PPTokenKind::LeftShiftAssign => TokenKind::LeftShiftAssign,
        PPTokenKind::RightShiftAssign => TokenKind::RightShiftAssign,

        PPTokenKind::LogicAnd => TokenKind::LogicAnd,
        PPTokenKind::LogicOr => TokenKind::LogicOr,

        PPTokenKind::Arrow => TokenKind::Arrow,
        PPTokenKind::Dot => TokenKind::Dot,

        PPTokenKind::Question => TokenKind::Question,
        PPTokenKind::Colon => TokenKind::Colon,

        PPTokenKind::Comma => TokenKind::Comma,
        PPTokenKind::Semicolon => TokenKind::Semicolon,
        PPTokenKind::Ellipsis => TokenKind::Ellipsis,

        PPTokenKind::LeftParen => TokenKind::LeftParen,
        PPTokenKind::RightParen => TokenKind::RightParen,
        PPTokenKind::LeftBracket => TokenKind::LeftBracket,
        PPTokenKind::RightBracket => TokenKind::RightBracket,
        PPTokenKind::LeftBrace => TokenKind::LeftBrace,
        PPTokenKind::RightBrace => TokenKind::RightBrace,

        // `#` has no meaning past the preprocessor.
        PPTokenKind::Hash => TokenKind::Unknown,

        _ => TokenKind::Unknown,
    }
}

pub(crate) fn is_keyword(symbol: StringId) -> Option<TokenKind> {
    keyword_map().get(&symbol).copied()
}

fn keyword_map() -> &'static hashbrown::HashMap<StringId, TokenKind> {
    static KEYWORDS: std::sync::OnceLock<hashbrown::HashMap<StringId, TokenKind>> =
        std::sync::OnceLock::new();
    KEYWORDS.get_or_init(|| {
        let mut m = hashbrown::HashMap::new();
        m.insert(StringId::new("bool"), TokenKind::Bool);
        m.insert(StringId::new("char"), TokenKind::Char);
        m.insert(StringId::new("const"), TokenKind::Const);
        m.insert(StringId::new("double"), TokenKind::Double);
        m.insert(StringId::new("else"), TokenKind::Else);
        m.insert(StringId::new("enum"), TokenKind::Enum);
        m.insert(StringId::new("extern"), TokenKind::Extern);
        m.insert(StringId::new("float"), TokenKind::Float);
        m.insert(StringId::new("if"), TokenKind::If);
        m.insert(StringId::new("int"), TokenKind::Int);
        m.insert(StringId::new("long"), TokenKind::Long);
        m.insert(StringId::new("restrict"), TokenKind::Restrict);
        m.insert(StringId::new("return"), TokenKind::Return);
        m.insert(StringId::new("short"), TokenKind::Short);
        m.insert(StringId::new("signed"), TokenKind::Signed);
        m.insert(StringId::new("sizeof"), TokenKind::Sizeof);
        m.insert(StringId::new("static"), TokenKind::Static);
        m.insert(StringId::new("struct"), TokenKind::Struct);
        m.insert(StringId::new("typedef"), TokenKind::Typedef);
        m.insert(StringId::new("union"), TokenKind::Union);
        m.insert(StringId::new("unsigned"), TokenKind::Unsigned);
        m.insert(StringId::new("void"), TokenKind::Void);
        m.insert(StringId::new("volatile"), TokenKind::Volatile);
        m.insert(StringId::new("while"), TokenKind::While);
        m.insert(StringId::new("_Bool"), TokenKind::Bool);
        m
    })
}

/// Classifier over a preprocessed token stream.
pub struct Lexer<'src> {
    tokens: &'src [PPToken],
}

impl<'src> Lexer<'src> {
    pub fn new(tokens: &'src [PPToken]) -> Self {
        Lexer { tokens }
    }

    fn classify_token(&self, pptoken: &PPToken) -> Result<TokenKind, LexError> {
        let kind = match pptoken.kind {
            PPTokenKind::Identifier(symbol) => {
                is_keyword(symbol).unwrap_or(TokenKind::Identifier(symbol))
            }
            PPTokenKind::Number(value) => {
                let text = value.as_str();
                if let Some((int_val, suffix)) = literal::parse_integer_literal(text) {
                    TokenKind::IntegerConstant(int_val as i64, suffix)
                } else if let Some((float_val, suffix)) = literal::parse_float_literal(text) {
                    TokenKind::FloatConstant(float_val, suffix)
                } else {
                    return Err(LexError::InvalidLiteral {
                        text: text.to_string(),
                        location: pptoken.span(),
                    });
                }
            }
            PPTokenKind::CharLiteral(symbol) => match literal::parse_char_literal(symbol.as_str()) {
                Some(value) => TokenKind::CharacterConstant(value),
                None => {
                    return Err(LexError::InvalidLiteral {
                        text: symbol.as_str().to_string(),
                        location: pptoken.span(),
                    });
                }
            },
            PPTokenKind::StringLiteral(symbol) => {
                // Handled in tokenize_all so adjacent literals concatenate;
                // decode a lone literal here for completeness.
                match self.decode_string(symbol) {
                    Some(decoded) => TokenKind::StringLiteral(decoded),
                    None => {
                        return Err(LexError::InvalidLiteral {
                            text: symbol.as_str().to_string(),
                            location: pptoken.span(),
                        });
                    }
                }
            }
            PPTokenKind::Eof => TokenKind::EndOfFile,
            other => classify_punctuation(other),
        };
        Ok(kind)
    }

    fn decode_string(&self, symbol: StringId) -> Option<StringId> {
        let (_wide, body) = literal::split_literal_spelling(symbol.as_str())?;
        let decoded = literal::unescape_string(body)?;
        Some(StringId::new(decoded))
    }

    /// Classify the whole stream. The result always ends with an
    /// end-of-file token; an invalid literal is fatal for the file.
    pub fn tokenize_all(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::with_capacity(self.tokens.len());
        let mut iter = self.tokens.iter().peekable();

        while let Some(pptoken) = iter.next() {
            if let PPTokenKind::StringLiteral(symbol) = pptoken.kind {
                // Adjacent string literals merge into one token.
                let mut span = pptoken.span();
                let (_, first_body) = literal::split_literal_spelling(symbol.as_str())
                    .ok_or_else(|| LexError::InvalidLiteral {
                        text: symbol.as_str().to_string(),
                        location: pptoken.span(),
                    })?;
                let mut content = literal::unescape_string(first_body)
                    .ok_or_else(|| LexError::InvalidLiteral {
                        text: symbol.as_str().to_string(),
                        location: pptoken.span(),
                    })?;
                while let Some(next) = iter.peek() {
                    let PPTokenKind::StringLiteral(next_symbol) = next.kind else {
                        break;
                    };
                    let next_span = next.span();
                    let (_, body) = literal::split_literal_spelling(next_symbol.as_str())
                        .ok_or_else(|| LexError::InvalidLiteral {
                            text: next_symbol.as_str().to_string(),
                            location: next_span,
                        })?;
                    let decoded =
                        literal::unescape_string(body).ok_or_else(|| LexError::InvalidLiteral {
                            text: next_symbol.as_str().to_string(),
                            location: next_span,
                        })?;
                    content.push_str(&decoded);
                    span = span.merge(next_span);
                    iter.next();
                }
                tokens.push(Token::new(
                    TokenKind::StringLiteral(StringId::new(content)),
                    span,
                ));
                continue;
            }

            let token = Token::new(self.classify_token(pptoken)?, span_of(pptoken));
            let is_eof = token.kind == TokenKind::EndOfFile;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        if tokens.last().map(|t| t.kind) != Some(TokenKind::EndOfFile) {
            tokens.push(Token::new(TokenKind::EndOfFile, SourceSpan::empty()));
        }
        Ok(tokens)
    }
}

fn span_of(pptoken: &PPToken) -> SourceSpan {
    SourceSpan::new_with_length(
        pptoken.location.source_id(),
        pptoken.location.offset(),
        pptoken.length as u32,
    )
}
