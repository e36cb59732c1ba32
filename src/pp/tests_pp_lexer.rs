use super::*;
use crate::intern::StringId;
use crate::source_manager::{normalize_source, SourceId};

/// Helper to lex a whole buffer into tokens.
fn lex_all(src: &str) -> Vec<PPToken> {
    let _ = env_logger::try_init();
    let normalized = normalize_source(src);
    let mut lexer = PPLexer::new(SourceId(0), normalized.into_bytes());
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token().expect("lex error") {
        tokens.push(token);
    }
    tokens
}

fn kinds(tokens: &[PPToken]) -> Vec<PPTokenKind> {
    tokens.iter().map(|t| t.kind).collect()
}

#[test]
fn test_identifiers_and_numbers() {
    let tokens = lex_all("foo bar42 0x1f 1.5e-3 .25");
    assert_eq!(
        kinds(&tokens),
        vec![
            PPTokenKind::Identifier(StringId::new("foo")),
            PPTokenKind::Identifier(StringId::new("bar42")),
            PPTokenKind::Number(StringId::new("0x1f")),
            PPTokenKind::Number(StringId::new("1.5e-3")),
            PPTokenKind::Number(StringId::new(".25")),
        ]
    );
}

#[test]
fn test_longest_match_punctuators() {
    let tokens = lex_all("<<= >>= ... -> ++ -- <= >= == != && || << >> < >");
    assert_eq!(
        kinds(&tokens),
        vec![
            PPTokenKind::LeftShiftAssign,
            PPTokenKind::RightShiftAssign,
            PPTokenKind::Ellipsis,
            PPTokenKind::Arrow,
            PPTokenKind::Increment,
            PPTokenKind::Decrement,
            PPTokenKind::LessEqual,
            PPTokenKind::GreaterEqual,
            PPTokenKind::Equal,
            PPTokenKind::NotEqual,
            PPTokenKind::LogicAnd,
            PPTokenKind::LogicOr,
            PPTokenKind::LeftShift,
            PPTokenKind::RightShift,
            PPTokenKind::Less,
            PPTokenKind::Greater,
        ]
    );
}

#[test]
fn test_line_and_space_flags() {
    let tokens = lex_all("a b\nc");
    assert!(tokens[0].flags.contains(PPTokenFlags::BEGINNING_OF_LINE));
    assert!(!tokens[1].flags.contains(PPTokenFlags::BEGINNING_OF_LINE));
    assert!(tokens[1].flags.contains(PPTokenFlags::LEADING_SPACE));
    assert!(tokens[2].flags.contains(PPTokenFlags::BEGINNING_OF_LINE));
}

#[test]
fn test_comments_are_skipped() {
    let tokens = lex_all("a // line comment\nb /* block\ncomment */ c");
    assert_eq!(
        kinds(&tokens),
        vec![
            PPTokenKind::Identifier(StringId::new("a")),
            PPTokenKind::Identifier(StringId::new("b")),
            PPTokenKind::Identifier(StringId::new("c")),
        ]
    );
    // Token after a comment keeps the leading-space flag.
    assert!(tokens[2].flags.contains(PPTokenFlags::LEADING_SPACE));
}

#[test]
fn test_unterminated_block_comment() {
    let mut lexer = PPLexer::new(SourceId(0), b"a /* never closed".to_vec());
    assert!(lexer.next_token().unwrap().is_some());
    let err = lexer.next_token().unwrap_err();
    assert!(matches!(err, LexError::UnterminatedBlockComment { .. }));
}

#[test]
fn test_string_and_char_literals_keep_spelling() {
    let tokens = lex_all(r#""hi\n" 'a' L"wide" L'w'"#);
    assert_eq!(
        kinds(&tokens),
        vec![
            PPTokenKind::StringLiteral(StringId::new(r#""hi\n""#)),
            PPTokenKind::CharLiteral(StringId::new("'a'")),
            PPTokenKind::StringLiteral(StringId::new(r#"L"wide""#)),
            PPTokenKind::CharLiteral(StringId::new("L'w'")),
        ]
    );
}

#[test]
fn test_unterminated_string() {
    let mut lexer = PPLexer::new(SourceId(0), b"\"open\n".to_vec());
    let err = lexer.next_token().unwrap_err();
    assert!(matches!(err, LexError::UnterminatedString { .. }));
}

#[test]
fn test_put_back() {
    let mut lexer = PPLexer::new(SourceId(0), b"a b\n".to_vec());
    let a = lexer.next_token().unwrap().unwrap();
    lexer.put_back(a);
    let again = lexer.next_token().unwrap().unwrap();
    assert_eq!(a, again);
}

#[test]
fn test_token_locations() {
    let tokens = lex_all("int x;\n");
    assert_eq!(tokens[0].location.offset(), 0);
    assert_eq!(tokens[0].length, 3);
    assert_eq!(tokens[1].location.offset(), 4);
    assert_eq!(tokens[2].location.offset(), 5);
}
