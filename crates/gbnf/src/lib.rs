mod check;
pub mod convert;
mod display;
pub mod error;
pub mod grammar;
pub mod parse;
pub mod token;

pub use convert::{convert_to_bnf, ConvertOptions};
pub use display::GrammarTree;
pub use error::{GrammarError, ParseError, ParseErrorKind};
pub use grammar::{Grammar, GrammarRule, NonTerminal, Rules, TagId};
pub use parse::parse;
pub use token::{GrammarOption, GrammarToken, GroupKind};
