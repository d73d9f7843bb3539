use crate::grammar::TagId;

/// Structural problems of a grammar found by the conversion passes.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("malformed grammar in rule <{name}> ({rule}): {reason}")]
    MalformedGrammar {
        rule: TagId,
        name: String,
        reason: &'static str,
    },
    #[error("rule <{name}> ({rule}) references <{target_name}> ({target}) which has no rule")]
    DanglingReference {
        rule: TagId,
        name: String,
        target: TagId,
        target_name: String,
    },
}

#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
#[error("[{line}:{column}] {kind}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub kind: ParseErrorKind,
}

#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("tag hasn't ended")]
    UnterminatedTag,
    #[error("tag is empty")]
    EmptyTag,
    #[error("wrong character {0:?} in a tag")]
    InvalidTagCharacter(char),
    #[error("string hasn't ended")]
    UnterminatedLiteral,
    #[error("group hasn't ended")]
    UnterminatedGroup,
    #[error("rule <{0}> is missing the ';' terminator")]
    MissingTerminator(String),
    #[error("rule <{0}> has no definition-assignment operator")]
    MissingAssignment(String),
    #[error("rule <{0}> has no options")]
    EmptyRule(String),
    #[error("parameter <#{0}> must be defined by a single string")]
    InvalidParameter(String),
    #[error("rule <{0}> is defined more than once")]
    DuplicateRule(String),
    #[error("wrong token start symbol {0:?}")]
    UnexpectedCharacter(char),
}
