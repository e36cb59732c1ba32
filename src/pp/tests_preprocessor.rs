use super::*;
use crate::diagnostic::{Diagnostic, DiagnosticEngine};
use crate::intern::StringId;
use crate::source_manager::SourceManager;

/// Helper to run the preprocessor over one buffer.
fn setup_preprocessor_test(src: &str) -> Vec<PPToken> {
    let (tokens, diagnostics) = setup_preprocessor_test_with_diagnostics(src);
    assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
    tokens
}

fn setup_preprocessor_test_with_diagnostics(src: &str) -> (Vec<PPToken>, Vec<Diagnostic>) {
    let _ = env_logger::try_init();

    let mut source_manager = SourceManager::new();
    let mut diagnostics = DiagnosticEngine::new();
    let source_id = source_manager.add_buffer("<test>", src);

    let mut preprocessor = Preprocessor::new(&mut source_manager, &mut diagnostics);
    let tokens = preprocessor.process(source_id);

    let significant_tokens: Vec<_> = tokens
        .into_iter()
        .filter(|t| t.kind != PPTokenKind::Eof)
        .collect();

    (significant_tokens, diagnostics.diagnostics().to_vec())
}

/// Helper macro to assert token sequence kinds
macro_rules! assert_token_kinds {
    ($tokens:expr, $( $expected:expr ),* $(,)?) => {{
        let expected_kinds = vec![$($expected),*];
        assert_eq!($tokens.len(), expected_kinds.len(), "Token count mismatch");
        for (i, (token, expected)) in $tokens.iter().zip(expected_kinds.iter()).enumerate() {
            assert_eq!(token.kind, *expected, "Token {} kind mismatch: expected {:?}, got {:?}", i, expected, token.kind);
        }
    }};
}

#[test]
fn test_object_macro_expansion() {
    let src = "#define TEN 10\nint x = TEN;\n";
    let tokens = setup_preprocessor_test(src);
    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("int")),
        PPTokenKind::Identifier(StringId::new("x")),
        PPTokenKind::Assign,
        PPTokenKind::Number(StringId::new("10")),
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_expansion_matches_direct_tokenization() {
    // Expanding `A+A` must yield the same kinds as tokenizing `1+1`.
    let expanded = setup_preprocessor_test("#define A 1\nA+A\n");
    let direct = setup_preprocessor_test("1+1\n");
    let expanded_kinds: Vec<_> = expanded.iter().map(|t| t.kind).collect();
    let direct_kinds: Vec<_> = direct.iter().map(|t| t.kind).collect();
    assert_eq!(expanded_kinds, direct_kinds);
}

#[test]
fn test_self_referential_macro_does_not_recurse() {
    let src = "#define A A+1\nA\n";
    let tokens = setup_preprocessor_test(src);
    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("A")),
        PPTokenKind::Plus,
        PPTokenKind::Number(StringId::new("1")),
    );
}

#[test]
fn test_mutually_recursive_macros() {
    let src = "#define A B\n#define B A\nA\n";
    let tokens = setup_preprocessor_test(src);
    // A -> B -> A, where the inner A is blocked by the expansion stack.
    assert_token_kinds!(tokens, PPTokenKind::Identifier(StringId::new("A")));
}

#[test]
fn test_function_macro_expansion() {
    let src = "#define ADD(a,b) ((a)+(b))\nint x = ADD(3, 4);\n";
    let tokens = setup_preprocessor_test(src);
    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("int")),
        PPTokenKind::Identifier(StringId::new("x")),
        PPTokenKind::Assign,
        PPTokenKind::LeftParen,
        PPTokenKind::LeftParen,
        PPTokenKind::Number(StringId::new("3")),
        PPTokenKind::RightParen,
        PPTokenKind::Plus,
        PPTokenKind::LeftParen,
        PPTokenKind::Number(StringId::new("4")),
        PPTokenKind::RightParen,
        PPTokenKind::RightParen,
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_function_macro_without_parens_is_literal() {
    let src = "#define F(x) x\nint F;\n";
    let tokens = setup_preprocessor_test(src);
    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("int")),
        PPTokenKind::Identifier(StringId::new("F")),
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_variadic_macro_preserves_commas() {
    let src = "#define CALL(f, ...) f(__VA_ARG__)\nCALL(g, 1, 2, 3)\n";
    let tokens = setup_preprocessor_test(src);
    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("g")),
        PPTokenKind::LeftParen,
        PPTokenKind::Number(StringId::new("1")),
        PPTokenKind::Comma,
        PPTokenKind::Number(StringId::new("2")),
        PPTokenKind::Comma,
        PPTokenKind::Number(StringId::new("3")),
        PPTokenKind::RightParen
    );
}

#[test]
fn test_nested_macro_arguments() {
    let src = "#define ID(x) x\nID(ID(42))\n";
    let tokens = setup_preprocessor_test(src);
    assert_token_kinds!(tokens, PPTokenKind::Number(StringId::new("42")));
}

#[test]
fn test_silent_redefinition() {
    let src = "#define N 1\n#define N 2\nN\n";
    let (tokens, diagnostics) = setup_preprocessor_test_with_diagnostics(src);
    assert!(diagnostics.is_empty());
    assert_token_kinds!(tokens, PPTokenKind::Number(StringId::new("2")));
}

#[test]
fn test_undef() {
    let src = "#define N 1\n#undef N\n#undef NEVER_DEFINED\nN\n";
    let (tokens, diagnostics) = setup_preprocessor_test_with_diagnostics(src);
    assert!(diagnostics.is_empty());
    assert_token_kinds!(tokens, PPTokenKind::Identifier(StringId::new("N")));
}

#[test]
fn test_ifdef_else_endif() {
    let src = "#ifdef UNDEFINED\nint a;\n#else\nint b;\n#endif\n";
    let tokens = setup_preprocessor_test(src);
    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("int")),
        PPTokenKind::Identifier(StringId::new("b")),
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_skipped_branch_nesting() {
    // The skipped branch contains a nested conditional that must be
    // skipped as a balanced unit.
    let src = "#ifdef UNDEFINED\n#ifdef ALSO_UNDEFINED\nint a;\n#else\nint b;\n#endif\nint c;\n#else\nX\n#endif\n";
    let tokens = setup_preprocessor_test(src);
    assert_token_kinds!(tokens, PPTokenKind::Identifier(StringId::new("X")));
}

#[test]
fn test_ifndef() {
    let src = "#ifndef UNDEFINED\nyes\n#else\nno\n#endif\n";
    let tokens = setup_preprocessor_test(src);
    assert_token_kinds!(tokens, PPTokenKind::Identifier(StringId::new("yes")));
}

#[test]
fn test_defines_inside_skipped_branch_are_ignored() {
    let src = "#ifdef UNDEFINED\n#define N 1\n#endif\nN\n";
    let tokens = setup_preprocessor_test(src);
    assert_token_kinds!(tokens, PPTokenKind::Identifier(StringId::new("N")));
}

#[test]
fn test_stray_else_and_endif_are_reported() {
    let src = "#else\n#endif\nint x;\n";
    let (tokens, diagnostics) = setup_preprocessor_test_with_diagnostics(src);
    assert_eq!(diagnostics.len(), 2);
    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("int")),
        PPTokenKind::Identifier(StringId::new("x")),
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_null_directive() {
    let src = "#\nint x;\n";
    let tokens = setup_preprocessor_test(src);
    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("int")),
        PPTokenKind::Identifier(StringId::new("x")),
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_invalid_directive_skips_line() {
    let src = "#frobnicate all the things\nint x;\n";
    let (tokens, diagnostics) = setup_preprocessor_test_with_diagnostics(src);
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.contains("invalid preprocessor directive"));
    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("int")),
        PPTokenKind::Identifier(StringId::new("x")),
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_quoted_include_splices_registered_buffer() {
    let _ = env_logger::try_init();
    let mut source_manager = SourceManager::new();
    let mut diagnostics = DiagnosticEngine::new();
    source_manager.add_buffer("defs.h", "#define VALUE 7\n");
    let main_id = source_manager.add_buffer("main.c", "#include \"defs.h\"\nint x = VALUE;\n");

    let mut preprocessor = Preprocessor::new(&mut source_manager, &mut diagnostics);
    let tokens: Vec<_> = preprocessor
        .process(main_id)
        .into_iter()
        .filter(|t| t.kind != PPTokenKind::Eof)
        .collect();

    assert!(!diagnostics.has_errors());
    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("int")),
        PPTokenKind::Identifier(StringId::new("x")),
        PPTokenKind::Assign,
        PPTokenKind::Number(StringId::new("7")),
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_missing_quoted_include_is_reported() {
    let src = "#include \"nope.h\"\nint x;\n";
    let (tokens, diagnostics) = setup_preprocessor_test_with_diagnostics(src);
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.contains("not found"));
    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("int")),
        PPTokenKind::Identifier(StringId::new("x")),
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_stdint_include_synthesizes_typedefs() {
    let src = "#include <stdint.h>\n";
    let tokens = setup_preprocessor_test(src);
    let has_int32 = tokens
        .iter()
        .any(|t| t.kind == PPTokenKind::Identifier(StringId::new("int32_t")));
    assert!(has_int32);
}

#[test]
fn test_other_angle_includes_are_noops() {
    let src = "#include <stdio.h>\nint x;\n";
    let tokens = setup_preprocessor_test(src);
    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("int")),
        PPTokenKind::Identifier(StringId::new("x")),
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_command_line_define() {
    let _ = env_logger::try_init();
    let mut source_manager = SourceManager::new();
    let mut diagnostics = DiagnosticEngine::new();
    let main_id = source_manager.add_buffer("main.c", "#ifdef FEATURE\non\n#endif\nFEATURE\n");

    let mut preprocessor = Preprocessor::new(&mut source_manager, &mut diagnostics);
    preprocessor.define_object_macro("FEATURE", "1");
    let tokens: Vec<_> = preprocessor
        .process(main_id)
        .into_iter()
        .filter(|t| t.kind != PPTokenKind::Eof)
        .collect();

    assert_token_kinds!(
        tokens,
        PPTokenKind::Identifier(StringId::new("on")),
        PPTokenKind::Number(StringId::new("1"))
    );
}

#[test]
fn test_unterminated_conditional_is_reported() {
    let src = "#ifdef UNDEFINED\nint x;\n";
    let (_, diagnostics) = setup_preprocessor_test_with_diagnostics(src);
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.contains("unterminated conditional"));
}
