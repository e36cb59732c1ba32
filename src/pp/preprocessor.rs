//! Macro preprocessor.
//!
//! Single pass over the raw token stream. Directives are interpreted at
//! line starts, macros are expanded with an explicit expansion stack to
//! block self-recursion, and `#include` splices a nested tokenization
//! through a lexer stack. All errors are reported to the diagnostic
//! engine and processing continues on the next line.

use hashbrown::{HashMap, HashSet};

use crate::diagnostic::DiagnosticEngine;
use crate::intern::StringId;
use crate::pp::pp_lexer::{PPLexer, PPToken, PPTokenFlags, PPTokenKind};
use crate::source_manager::{SourceId, SourceLoc, SourceManager, SourceSpan};

/// Preprocessor directive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Define,
    Undef,
    Include,
    Ifdef,
    Ifndef,
    Else,
    Endif,
}

/// Table of pre-interned directive names for O(1) keyword recognition.
#[derive(Clone)]
pub struct DirectiveKeywordTable {
    define: StringId,
    undef: StringId,
    include: StringId,
    ifdef: StringId,
    ifndef: StringId,
    else_: StringId,
    endif: StringId,
}

impl Default for DirectiveKeywordTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveKeywordTable {
    pub fn new() -> Self {
        DirectiveKeywordTable {
            define: StringId::new("define"),
            undef: StringId::new("undef"),
            include: StringId::new("include"),
            ifdef: StringId::new("ifdef"),
            ifndef: StringId::new("ifndef"),
            else_: StringId::new("else"),
            endif: StringId::new("endif"),
        }
    }

    pub fn is_directive(&self, symbol: StringId) -> Option<DirectiveKind> {
        if symbol == self.define {
            Some(DirectiveKind::Define)
        } else if symbol == self.undef {
            Some(DirectiveKind::Undef)
        } else if symbol == self.include {
            Some(DirectiveKind::Include)
        } else if symbol == self.ifdef {
            Some(DirectiveKind::Ifdef)
        } else if symbol == self.ifndef {
            Some(DirectiveKind::Ifndef)
        } else if symbol == self.else_ {
            Some(DirectiveKind::Else)
        } else if symbol == self.endif {
            Some(DirectiveKind::Endif)
        } else {
            None
        }
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MacroFlags: u8 {
        const FUNCTION_LIKE = 1 << 0;
        const VARIADIC = 1 << 1;
    }
}

/// A macro definition: captured replacement tokens plus the parameter
/// names for function-like macros.
#[derive(Clone)]
pub struct MacroInfo {
    pub location: SourceLoc,
    pub flags: MacroFlags,
    pub tokens: Vec<PPToken>,
    pub parameter_list: Vec<StringId>,
}

impl MacroInfo {
    fn is_function_like(&self) -> bool {
        self.flags.contains(MacroFlags::FUNCTION_LIKE)
    }
}

/// Conditional-inclusion frame.
#[derive(Debug, Clone)]
struct PPConditionalInfo {
    was_skipping: bool,
    found_else: bool,
    found_non_skipping: bool,
}

const MAX_INCLUDE_DEPTH: usize = 32;

/// The only angle-bracket header with synthesized content. Every other
/// `#include <...>` is consumed and ignored.
const STDINT_NAME: &str = "stdint.h";
const STDINT_SOURCE: &str = "\
typedef signed char int8_t;
typedef short int16_t;
typedef int int32_t;
typedef long long int64_t;
typedef unsigned char uint8_t;
typedef unsigned short uint16_t;
typedef unsigned int uint32_t;
typedef unsigned long long uint64_t;
typedef long intptr_t;
typedef unsigned long uintptr_t;
";

/// Main preprocessor structure.
pub struct Preprocessor<'src> {
    source_manager: &'src mut SourceManager,
    diag: &'src mut DiagnosticEngine,

    directive_keywords: DirectiveKeywordTable,
    va_arg: StringId,

    macros: HashMap<StringId, MacroInfo>,
    once_included: HashSet<SourceId>,
    conditional_stack: Vec<PPConditionalInfo>,
    lexer_stack: Vec<PPLexer>,
    skipping: bool,
}

impl<'src> Preprocessor<'src> {
    pub fn new(source_manager: &'src mut SourceManager, diag: &'src mut DiagnosticEngine) -> Self {
        Preprocessor {
            source_manager,
            diag,
            directive_keywords: DirectiveKeywordTable::new(),
            va_arg: StringId::new("__VA_ARG__"),
            macros: HashMap::new(),
            once_included: HashSet::new(),
            conditional_stack: Vec::new(),
            lexer_stack: Vec::new(),
            skipping: false,
        }
    }

    /// Predefine an object-like macro (command-line `-D`). The replacement
    /// text is tokenized in its own buffer.
    pub fn define_object_macro(&mut self, name: &str, replacement: &str) {
        let id = self
            .source_manager
            .add_buffer(format!("<define:{name}>"), replacement);
        let content = self.source_manager.get(id).map(|f| f.content.clone()).unwrap_or_default();
        let mut lexer = PPLexer::new(id, content.into_bytes());
        let mut tokens = Vec::new();
        while let Ok(Some(token)) = lexer.next_token() {
            tokens.push(token);
        }
        self.macros.insert(
            StringId::new(name),
            MacroInfo {
                location: SourceLoc::new(id, 0),
                flags: MacroFlags::empty(),
                tokens,
                parameter_list: Vec::new(),
            },
        );
    }

    pub fn is_macro_defined(&self, symbol: StringId) -> bool {
        self.macros.contains_key(&symbol)
    }

    /// Process one source buffer and return the cleaned token stream,
    /// terminated by an end-of-stream token.
    pub fn process(&mut self, source_id: SourceId) -> Vec<PPToken> {
        let (content, content_len) = match self.source_manager.get(source_id) {
            Some(file) => (file.content.clone(), file.content.len() as u32),
            None => (String::new(), 0),
        };
        self.lexer_stack.push(PPLexer::new(source_id, content.into_bytes()));

        let mut result_tokens = Vec::new();
        while let Some(token) = self.lex_token() {
            if token.kind == PPTokenKind::Hash && token.is_at_line_start() {
                self.handle_directive(token);
                continue;
            }
            if self.is_currently_skipping() {
                continue;
            }
            if let PPTokenKind::Identifier(symbol) = token.kind {
                let mut active = HashSet::new();
                if let Some(expanded) = self.try_expand(&token, symbol, &mut active) {
                    result_tokens.extend(expanded);
                    continue;
                }
            }
            result_tokens.push(token);
        }

        if !self.conditional_stack.is_empty() {
            self.diag.report_error(
                "unterminated conditional directive",
                SourceSpan::new_with_length(source_id, content_len.saturating_sub(1), 1),
            );
            self.conditional_stack.clear();
        }

        result_tokens.push(PPToken::new(
            PPTokenKind::Eof,
            PPTokenFlags::empty(),
            SourceLoc::new(source_id, content_len),
            0,
        ));
        result_tokens
    }

    fn current_location(&self) -> SourceLoc {
        match self.lexer_stack.last() {
            Some(lexer) => SourceLoc::new(lexer.source_id, lexer.position()),
            None => SourceLoc::default(),
        }
    }

    fn current_span(&self) -> SourceSpan {
        let loc = self.current_location();
        SourceSpan::new(loc, loc)
    }

    fn is_currently_skipping(&self) -> bool {
        self.skipping || self.conditional_stack.iter().any(|info| info.was_skipping)
    }

    /// Pull the next raw token, popping finished lexers off the include
    /// stack. Lex errors abort the current file only.
    fn lex_token(&mut self) -> Option<PPToken> {
        loop {
            let lexer = self.lexer_stack.last_mut()?;
            match lexer.next_token() {
                Ok(Some(token)) => return Some(token),
                Ok(None) => {
                    self.lexer_stack.pop();
                }
                Err(err) => {
                    let location = err.location();
                    self.diag.report_error(err.to_string(), location);
                    self.lexer_stack.pop();
                }
            }
        }
    }

    fn put_back(&mut self, token: PPToken) {
        if let Some(lexer) = self.lexer_stack.last_mut() {
            lexer.put_back(token);
        }
    }

    /// Next token if it is still on the current directive line.
    fn next_on_line(&mut self) -> Option<PPToken> {
        let token = self.lex_token()?;
        if token.is_at_line_start() {
            self.put_back(token);
            return None;
        }
        Some(token)
    }

    /// Discard the remainder of the current line.
    fn skip_line(&mut self) {
        while self.next_on_line().is_some() {}
    }

    fn handle_directive(&mut self, hash: PPToken) {
        let name_token = match self.next_on_line() {
            Some(t) => t,
            // Null directive: a line consisting of a bare `#`.
            None => return,
        };
        let directive = match name_token.kind {
            PPTokenKind::Identifier(sym) => self.directive_keywords.is_directive(sym),
            _ => None,
        };

        if self.is_currently_skipping() {
            // Inside a skipped region only the if-family is interpreted,
            // so that the skipped span nests correctly.
            match directive {
                Some(DirectiveKind::Ifdef) | Some(DirectiveKind::Ifndef) => {
                    self.conditional_stack.push(PPConditionalInfo {
                        was_skipping: true,
                        found_else: false,
                        found_non_skipping: false,
                    });
                    self.skip_line();
                }
                Some(DirectiveKind::Else) => self.handle_else(&name_token),
                Some(DirectiveKind::Endif) => self.handle_endif(&name_token),
                _ => self.skip_line(),
            }
            return;
        }

        match directive {
            Some(DirectiveKind::Define) => self.handle_define(),
            Some(DirectiveKind::Undef) => self.handle_undef(),
            Some(DirectiveKind::Include) => self.handle_include(&hash),
            Some(DirectiveKind::Ifdef) => self.handle_ifdef(false),
            Some(DirectiveKind::Ifndef) => self.handle_ifdef(true),
            Some(DirectiveKind::Else) => self.handle_else(&name_token),
            Some(DirectiveKind::Endif) => self.handle_endif(&name_token),
            None => {
                let name = match name_token.kind {
                    PPTokenKind::Identifier(sym) => sym.as_str().to_string(),
                    other => other.spelling().to_string(),
                };
                self.diag.report_error(
                    format!("invalid preprocessor directive '{name}'"),
                    name_token.span(),
                );
                self.skip_line();
            }
        }
    }

    /// `#define NAME ...` / `#define NAME(params) ...`. Redefinition
    /// silently replaces any prior macro of the same name.
    fn handle_define(&mut self) {
        let name_token = match self.next_on_line() {
            Some(t) => t,
            None => {
                self.diag
                    .report_error("expected macro name after #define", self.current_span());
                return;
            }
        };
        let name = match name_token.kind {
            PPTokenKind::Identifier(sym) => sym,
            _ => {
                self.diag
                    .report_error("expected macro name after #define", name_token.span());
                self.skip_line();
                return;
            }
        };

        let mut flags = MacroFlags::empty();
        let mut params = Vec::new();

        // A `(` with no intervening whitespace opens a parameter list.
        if let Some(next) = self.next_on_line() {
            if next.kind == PPTokenKind::LeftParen
                && !next.flags.contains(PPTokenFlags::LEADING_SPACE)
            {
                flags |= MacroFlags::FUNCTION_LIKE;
                if !self.parse_macro_params(&mut params, &mut flags) {
                    self.skip_line();
                    return;
                }
            } else {
                self.put_back(next);
            }
        }

        let mut tokens = Vec::new();
        while let Some(token) = self.next_on_line() {
            tokens.push(token);
        }

        log::debug!("#define {} ({} replacement tokens)", name.as_str(), tokens.len());
        self.macros.insert(
            name,
            MacroInfo {
                location: name_token.location,
                flags,
                tokens,
                parameter_list: params,
            },
        );
    }

    fn parse_macro_params(&mut self, params: &mut Vec<StringId>, flags: &mut MacroFlags) -> bool {
        loop {
            let token = match self.next_on_line() {
                Some(t) => t,
                None => {
                    self.diag
                        .report_error("unterminated macro parameter list", self.current_span());
                    return false;
                }
            };
            match token.kind {
                PPTokenKind::RightParen => return true,
                PPTokenKind::Ellipsis => {
                    *flags |= MacroFlags::VARIADIC;
                    match self.next_on_line().map(|t| t.kind) {
                        Some(PPTokenKind::RightParen) => return true,
                        _ => {
                            self.diag
                                .report_error("expected ')' after '...'", token.span());
                            return false;
                        }
                    }
                }
                PPTokenKind::Identifier(sym) => {
                    if params.contains(&sym) {
                        self.diag.report_error(
                            format!("duplicate macro parameter '{}'", sym.as_str()),
                            token.span(),
                        );
                        return false;
                    }
                    params.push(sym);
                    match self.next_on_line().map(|t| t.kind) {
                        Some(PPTokenKind::Comma) => continue,
                        Some(PPTokenKind::RightParen) => return true,
                        _ => {
                            self.diag
                                .report_error("expected ',' or ')' in macro parameter list", token.span());
                            return false;
                        }
                    }
                }
                _ => {
                    self.diag
                        .report_error("invalid macro parameter", token.span());
                    return false;
                }
            }
        }
    }

    /// `#undef NAME`: removing an unknown name is not an error.
    fn handle_undef(&mut self) {
        match self.next_on_line() {
            Some(token) => match token.kind {
                PPTokenKind::Identifier(sym) => {
                    self.macros.remove(&sym);
                    self.skip_line();
                }
                _ => {
                    self.diag
                        .report_error("expected macro name after #undef", token.span());
                    self.skip_line();
                }
            },
            None => {
                self.diag
                    .report_error("expected macro name after #undef", self.current_span());
            }
        }
    }

    fn handle_include(&mut self, hash: &PPToken) {
        let token = match self.next_on_line() {
            Some(t) => t,
            None => {
                self.diag
                    .report_error("expected file name after #include", hash.span());
                return;
            }
        };

        match token.kind {
            PPTokenKind::StringLiteral(symbol) => {
                let spelled = symbol.as_str();
                let path = spelled.trim_start_matches('"').trim_end_matches('"').to_string();
                self.skip_line();
                self.splice_quoted_include(&path, token);
            }
            PPTokenKind::Less => {
                // Collect the header name up to `>`.
                let mut name = String::new();
                loop {
                    match self.next_on_line() {
                        Some(part) if part.kind == PPTokenKind::Greater => break,
                        Some(part) => name.push_str(part.kind.spelling()),
                        None => {
                            self.diag
                                .report_error("expected '>' in #include", token.span());
                            return;
                        }
                    }
                }
                self.skip_line();
                if name == STDINT_NAME {
                    self.splice_stdint(token);
                } else {
                    // Unknown system headers are consumed and ignored.
                    log::debug!("ignoring #include <{name}>");
                }
            }
            _ => {
                self.diag
                    .report_error("expected \"file\" or <file> after #include", token.span());
                self.skip_line();
            }
        }
    }

    fn splice_quoted_include(&mut self, path: &str, token: PPToken) {
        let source_id = match self.source_manager.find_by_path(path) {
            Some(id) => id,
            None => {
                self.diag
                    .report_error(format!("include file '{path}' not found"), token.span());
                return;
            }
        };
        self.push_include(source_id, token);
    }

    fn splice_stdint(&mut self, token: PPToken) {
        // Splicing the typedefs twice would redeclare them.
        if let Some(id) = self.source_manager.find_by_path("<stdint.h>") {
            if self.once_included.contains(&id) {
                return;
            }
        }
        let id = self.source_manager.add_buffer("<stdint.h>", STDINT_SOURCE);
        self.once_included.insert(id);
        self.push_include(id, token);
    }

    fn push_include(&mut self, source_id: SourceId, token: PPToken) {
        if self.lexer_stack.len() >= MAX_INCLUDE_DEPTH {
            self.diag
                .report_error("include depth exceeded", token.span());
            return;
        }
        if self.lexer_stack.iter().any(|l| l.source_id == source_id) {
            self.diag
                .report_error("circular include detected", token.span());
            return;
        }
        let content = match self.source_manager.get(source_id) {
            Some(file) => file.content.clone(),
            None => return,
        };
        self.lexer_stack
            .push(PPLexer::new(source_id, content.into_bytes()));
    }

    fn handle_ifdef(&mut self, negated: bool) {
        let name_token = match self.next_on_line() {
            Some(t) => t,
            None => {
                self.diag
                    .report_error("expected identifier in conditional directive", self.current_span());
                return;
            }
        };
        let name = match name_token.kind {
            PPTokenKind::Identifier(sym) => sym,
            _ => {
                self.diag
                    .report_error("expected identifier in conditional directive", name_token.span());
                self.skip_line();
                return;
            }
        };
        self.skip_line();

        let mut condition = self.macros.contains_key(&name);
        if negated {
            condition = !condition;
        }
        self.conditional_stack.push(PPConditionalInfo {
            was_skipping: self.is_currently_skipping(),
            found_else: false,
            found_non_skipping: condition,
        });
        if !condition {
            self.skipping = true;
        }
    }

    fn handle_else(&mut self, name_token: &PPToken) {
        self.skip_line();
        let current = match self.conditional_stack.last_mut() {
            Some(c) => c,
            None => {
                self.diag
                    .report_error("#else without matching #ifdef", name_token.span());
                return;
            }
        };
        if current.found_else {
            self.diag
                .report_error("#else after #else", name_token.span());
            return;
        }
        current.found_else = true;
        if current.was_skipping {
            return;
        }
        let take_else = !current.found_non_skipping;
        if take_else {
            current.found_non_skipping = true;
        }
        self.skipping = !take_else;
    }

    fn handle_endif(&mut self, name_token: &PPToken) {
        self.skip_line();
        match self.conditional_stack.pop() {
            Some(info) => self.skipping = info.was_skipping,
            None => {
                self.diag
                    .report_error("#endif without matching #ifdef", name_token.span());
            }
        }
    }

    /// Expand `symbol` if it names a macro that is not already being
    /// expanded. Returns `None` when the token should pass through
    /// unchanged (not a macro, in-expansion, or function-like without
    /// an argument list).
    fn try_expand(
        &mut self,
        token: &PPToken,
        symbol: StringId,
        active: &mut HashSet<StringId>,
    ) -> Option<Vec<PPToken>> {
        if active.contains(&symbol) {
            return None;
        }
        let macro_info = self.macros.get(&symbol)?.clone();

        let body = if macro_info.is_function_like() {
            match self.lex_token() {
                Some(next) if next.kind == PPTokenKind::LeftParen && !next.is_at_line_start() => {
                    let args = self.collect_macro_args()?;
                    if !self.check_arg_count(&macro_info, symbol, token, args.len()) {
                        return Some(Vec::new());
                    }
                    self.substitute(&macro_info, &args)
                }
                Some(next) => {
                    self.put_back(next);
                    return None;
                }
                None => return None,
            }
        } else {
            macro_info.tokens.clone()
        };

        active.insert(symbol);
        let expanded = self.rescan(body, token, active);
        active.remove(&symbol);
        Some(expanded)
    }

    /// Gather call arguments from the lexer, split on top-level commas.
    /// Returns `None` when the stream ends before the closing paren.
    fn collect_macro_args(&mut self) -> Option<Vec<Vec<PPToken>>> {
        let mut args: Vec<Vec<PPToken>> = Vec::new();
        let mut current: Vec<PPToken> = Vec::new();
        let mut depth = 0usize;
        loop {
            let token = match self.lex_token() {
                Some(t) => t,
                None => {
                    self.diag
                        .report_error("unterminated macro argument list", self.current_span());
                    return None;
                }
            };
            match token.kind {
                PPTokenKind::LeftParen => {
                    depth += 1;
                    current.push(token);
                }
                PPTokenKind::RightParen => {
                    if depth == 0 {
                        if !current.is_empty() || !args.is_empty() {
                            args.push(current);
                        }
                        return Some(args);
                    }
                    depth -= 1;
                    current.push(token);
                }
                PPTokenKind::Comma if depth == 0 => {
                    args.push(current);
                    current = Vec::new();
                }
                _ => current.push(token),
            }
        }
    }

    fn check_arg_count(
        &mut self,
        macro_info: &MacroInfo,
        symbol: StringId,
        token: &PPToken,
        got: usize,
    ) -> bool {
        let expected = macro_info.parameter_list.len();
        let ok = if macro_info.flags.contains(MacroFlags::VARIADIC) {
            got >= expected
        } else {
            got == expected
        };
        if !ok {
            self.diag.report_error(
                format!(
                    "macro '{}' expects {} argument(s), got {}",
                    symbol.as_str(),
                    expected,
                    got
                ),
                token.span(),
            );
        }
        ok
    }

    /// Substitute parameters (and the `__VA_ARG__` placeholder) in a
    /// function-like macro body. Arguments are inserted verbatim.
    fn substitute(&self, macro_info: &MacroInfo, args: &[Vec<PPToken>]) -> Vec<PPToken> {
        let mut result = Vec::new();
        for token in &macro_info.tokens {
            if let PPTokenKind::Identifier(sym) = token.kind {
                if let Some(index) = macro_info.parameter_list.iter().position(|&p| p == sym) {
                    result.extend(args.get(index).into_iter().flatten().copied());
                    continue;
                }
                if sym == self.va_arg && macro_info.flags.contains(MacroFlags::VARIADIC) {
                    // Remaining arguments, with their commas restored.
                    let rest = &args[macro_info.parameter_list.len().min(args.len())..];
                    for (i, arg) in rest.iter().enumerate() {
                        if i > 0 {
                            result.push(PPToken::new(
                                PPTokenKind::Comma,
                                PPTokenFlags::MACRO_EXPANDED,
                                token.location,
                                1,
                            ));
                        }
                        result.extend(arg.iter().copied());
                    }
                    continue;
                }
            }
            result.push(*token);
        }
        result
    }

    /// Re-scan substituted tokens for further macro invocations. Names on
    /// the active expansion stack are emitted literally.
    fn rescan(
        &mut self,
        tokens: Vec<PPToken>,
        origin: &PPToken,
        active: &mut HashSet<StringId>,
    ) -> Vec<PPToken> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let token = self.mark_expanded(tokens[i], origin);
            if let PPTokenKind::Identifier(sym) = token.kind {
                if !active.contains(&sym) {
                    if let Some(info) = self.macros.get(&sym).cloned() {
                        if info.is_function_like() {
                            if tokens.get(i + 1).map(|t| t.kind) == Some(PPTokenKind::LeftParen) {
                                if let Some((args, next)) = collect_args_from_slice(&tokens, i + 2) {
                                    i = next;
                                    if self.check_arg_count(&info, sym, &token, args.len()) {
                                        let body = self.substitute(&info, &args);
                                        active.insert(sym);
                                        let expanded = self.rescan(body, origin, active);
                                        active.remove(&sym);
                                        out.extend(expanded);
                                    }
                                    continue;
                                }
                            }
                        } else {
                            active.insert(sym);
                            let expanded = self.rescan(info.tokens.clone(), origin, active);
                            active.remove(&sym);
                            out.extend(expanded);
                            i += 1;
                            continue;
                        }
                    }
                }
            }
            out.push(token);
            i += 1;
        }
        out
    }

    /// Expanded tokens take the invocation site's location and lose their
    /// line-start flag so they cannot be mistaken for directives.
    fn mark_expanded(&self, token: PPToken, origin: &PPToken) -> PPToken {
        let mut flags = token.flags | PPTokenFlags::MACRO_EXPANDED;
        flags.remove(PPTokenFlags::BEGINNING_OF_LINE);
        PPToken::new(token.kind, flags, origin.location, token.length)
    }
}

/// Gather call arguments from an already-substituted token slice,
/// starting just past the opening paren. Returns the arguments and the
/// index past the closing paren.
fn collect_args_from_slice(tokens: &[PPToken], start: usize) -> Option<(Vec<Vec<PPToken>>, usize)> {
    let mut args: Vec<Vec<PPToken>> = Vec::new();
    let mut current: Vec<PPToken> = Vec::new();
    let mut depth = 0usize;
    let mut i = start;
    while i < tokens.len() {
        let token = tokens[i];
        i += 1;
        match token.kind {
            PPTokenKind::LeftParen => {
                depth += 1;
                current.push(token);
            }
            PPTokenKind::RightParen => {
                if depth == 0 {
                    if !current.is_empty() || !args.is_empty() {
                        args.push(current);
                    }
                    return Some((args, i));
                }
                depth -= 1;
                current.push(token);
            }
            PPTokenKind::Comma if depth == 0 => {
                args.push(current);
                current = Vec::new();
            }
            _ => current.push(token),
        }
    }
    None
}
