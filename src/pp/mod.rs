pub mod pp_lexer;
pub mod preprocessor;
#[cfg(test)]
mod tests_pp_lexer;
#[cfg(test)]
mod tests_preprocessor;

pub use pp_lexer::{LexError, PPLexer, PPToken, PPTokenFlags, PPTokenKind};
pub use preprocessor::Preprocessor;
