pub mod assemble;
pub mod buffer;
pub mod error;
pub mod lexer;
pub mod threaded;

use gbnf::TagId;

pub use assemble::{assemble, AssembleOptions, GroupRole, LexerGrammar, RegexRule, ReservedTags, TokenType};
pub use error::{AssembleError, LexError};
pub use lexer::{Lexer, LexerOptions, LexerState, Position};
pub use threaded::ThreadedLexer;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LexicToken {
    pub token_type_id: TagId,
    pub text: String,
}

/// Anything handing out tokens one at a time, until `LexError::EndOfStream`.
pub trait TokenSource {
    fn next_token(&mut self) -> Result<LexicToken, LexError>;

    /// Iterates the remaining tokens. The iterator ends at the end of the
    /// stream and after yielding an unrecoverable error.
    fn tokens(&mut self) -> Tokens<'_, Self>
    where
        Self: Sized,
    {
        Tokens {
            source: self,
            done: false,
        }
    }
}

pub struct Tokens<'a, S> {
    source: &'a mut S,
    done: bool,
}

impl<S: TokenSource> Iterator for Tokens<'_, S> {
    type Item = Result<LexicToken, LexError>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.source.next_token() {
            Err(LexError::EndOfStream) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = !err.is_recoverable();
                Some(Err(err))
            }
            Ok(token) => Some(Ok(token)),
        }
    }
}
