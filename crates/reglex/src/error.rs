use std::sync::Arc;

use gbnf::TagId;

use crate::lexer::Position;

#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("reserved rule <{name}> ({tag}) is declared but never defined")]
    MissingSpecialRule { tag: TagId, name: String },
    #[error("rule <{name}> ({rule}) references <{target_name}> ({target}) which has no rule")]
    UndefinedRule {
        rule: TagId,
        name: String,
        target: TagId,
        target_name: String,
    },
    #[error("failed to assemble the lexer regex: {reason}")]
    RegexAssemblyFailure {
        reason: String,
        #[source]
        source: Option<regex::Error>,
    },
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum LexError {
    #[error("end of stream")]
    EndOfStream,
    #[error("invalid token {text:?} at {position}")]
    InvalidToken { position: Position, text: String },
    #[error("no token rule matches the input at {position}, near {snippet:?}")]
    UnmatchableInput { position: Position, snippet: String },
    #[error("failed to read the input stream")]
    Io(#[source] Arc<std::io::Error>),
    #[error("the lexer worker thread stopped without finishing the stream")]
    WorkerLost,
}

impl LexError {
    /// The lexer may be called again after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LexError::InvalidToken { .. })
    }
}

impl From<std::io::Error> for LexError {
    fn from(value: std::io::Error) -> Self {
        LexError::Io(Arc::new(value))
    }
}
