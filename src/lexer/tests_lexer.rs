use super::*;
use crate::diagnostic::DiagnosticEngine;
use crate::lexer::literal::IntegerSuffix;
use crate::pp::Preprocessor;
use crate::source_manager::SourceManager;

/// Run the full lexing pipeline (preprocess then classify) over a buffer.
fn setup_lexer_test(src: &str) -> (Vec<Token>, SourceManager) {
    let _ = env_logger::try_init();
    let mut source_manager = SourceManager::new();
    let mut diagnostics = DiagnosticEngine::new();
    let source_id = source_manager.add_buffer("<test>", src);
    let pp_tokens = Preprocessor::new(&mut source_manager, &mut diagnostics).process(source_id);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.diagnostics());
    let tokens = Lexer::new(&pp_tokens).tokenize_all().expect("lex error");
    (tokens, source_manager)
}

fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
    tokens.iter().map(|t| t.kind).collect()
}

#[test]
fn test_keywords_and_identifiers() {
    let (tokens, _) = setup_lexer_test("typedef unsigned long size_tt;");
    assert_eq!(
        kinds(&tokens),
        vec![
            TokenKind::Typedef,
            TokenKind::Unsigned,
            TokenKind::Long,
            TokenKind::Identifier(StringId::new("size_tt")),
            TokenKind::Semicolon,
            TokenKind::EndOfFile,
        ]
    );
}

#[test]
fn test_integer_literal_classification() {
    let (tokens, _) = setup_lexer_test("42 0x3fLL 01771 7u");
    assert_eq!(
        kinds(&tokens),
        vec![
            TokenKind::IntegerConstant(42, None),
            TokenKind::IntegerConstant(0x3f, Some(IntegerSuffix::LL)),
            TokenKind::IntegerConstant(0o1771, None),
            TokenKind::IntegerConstant(7, Some(IntegerSuffix::U)),
            TokenKind::EndOfFile,
        ]
    );
}

#[test]
fn test_float_and_char_literals() {
    let (tokens, _) = setup_lexer_test("1.5 'a' '\\n'");
    assert_eq!(
        kinds(&tokens),
        vec![
            TokenKind::FloatConstant(1.5, None),
            TokenKind::CharacterConstant('a' as u64),
            TokenKind::CharacterConstant(b'\n' as u64),
            TokenKind::EndOfFile,
        ]
    );
}

#[test]
fn test_string_decoding_and_concatenation() {
    let (tokens, _) = setup_lexer_test("\"ab\\n\" \"cd\"");
    assert_eq!(
        kinds(&tokens),
        vec![
            TokenKind::StringLiteral(StringId::new("ab\ncd")),
            TokenKind::EndOfFile,
        ]
    );
}

#[test]
fn test_invalid_literal_is_fatal() {
    let _ = env_logger::try_init();
    let mut source_manager = SourceManager::new();
    let mut diagnostics = DiagnosticEngine::new();
    let source_id = source_manager.add_buffer("<test>", "int x = 12monkeys;");
    let pp_tokens = Preprocessor::new(&mut source_manager, &mut diagnostics).process(source_id);
    let result = Lexer::new(&pp_tokens).tokenize_all();
    assert!(matches!(result, Err(crate::pp::LexError::InvalidLiteral { .. })));
}

#[test]
fn test_structural_token_equality() {
    // Tokens compare by kind and payload, not by position.
    let (a, _) = setup_lexer_test("x + 1");
    let (b, _) = setup_lexer_test("  x   +\n1");
    assert_eq!(a, b);
}

#[test]
fn test_round_trip_reference_stream() {
    let src = "int main(void) {\n    return 0;\n}\n";
    let (tokens, sources) = setup_lexer_test(src);

    let expected: &[(TokenKind, u32, u32)] = &[
        (TokenKind::Int, 1, 1),
        (TokenKind::Identifier(StringId::new("main")), 1, 5),
        (TokenKind::LeftParen, 1, 10),
        (TokenKind::Void, 1, 11),
        (TokenKind::RightParen, 1, 15),
        (TokenKind::LeftBrace, 1, 17),
        (TokenKind::Return, 2, 5),
        (TokenKind::IntegerConstant(0, None), 2, 12),
        (TokenKind::Semicolon, 2, 13),
        (TokenKind::RightBrace, 3, 1),
    ];

    assert_eq!(tokens.len(), expected.len() + 1); // + EndOfFile
    for (token, (kind, line, col)) in tokens.iter().zip(expected.iter()) {
        assert_eq!(token.kind, *kind);
        let (l, c) = sources
            .lookup_line_col(token.span.start)
            .expect("span in registered buffer");
        assert_eq!((l, c), (*line, *col), "position mismatch for {:?}", kind);
    }
    assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::EndOfFile));
}
