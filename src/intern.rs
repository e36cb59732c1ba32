//! String interning.
//!
//! All identifier spellings, macro names, and literal spellings are interned
//! through a process-wide table so that symbol comparison is an integer
//! comparison and hash maps own their keys.

pub use symbol_table::GlobalSymbol as StringId;
