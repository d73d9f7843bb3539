use std::{io::Read, sync::Arc};

use bstr::ByteSlice;

use crate::{
    assemble::{GroupRole, LexerGrammar},
    buffer::{complete_utf8_len, ReadBuffer},
    error::LexError,
    LexicToken, TokenSource,
};

/// Characters of unmatchable input quoted in the error.
const SNIPPET_LEN: usize = 16;

#[derive(Clone, Debug)]
pub struct LexerOptions {
    /// Nominal size of the read buffer, tokens may grow it temporarily.
    pub buffer_size: usize,
    /// Capacity of the token queue of the threaded lexer.
    pub queue_capacity: usize,
}

impl Default for LexerOptions {
    fn default() -> Self {
        Self {
            buffer_size: 2048,
            queue_capacity: 64,
        }
    }
}

/// Location in the input, line and column are 1-based and count characters.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Position {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl Position {
    fn advance(&mut self, bytes: &[u8]) {
        self.offset += bytes.len();
        for c in bytes.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LexerState {
    Ready,
    AwaitingRefill,
    TokenMatched,
    EndOfStream,
    FatalError,
}

enum Step {
    Refill,
    Skip(usize),
    Done(usize, Result<LexicToken, LexError>),
}

/// Tokenizes a stream by searching the master regex in a sliding read buffer.
pub struct Lexer<R> {
    grammar: Arc<LexerGrammar>,
    reader: R,
    buffer: ReadBuffer,
    position: Position,
    state: LexerState,
    failure: Option<LexError>,
}

impl<R: Read> Lexer<R> {
    pub fn new(grammar: Arc<LexerGrammar>, reader: R, options: &LexerOptions) -> Lexer<R> {
        Lexer {
            grammar,
            reader,
            buffer: ReadBuffer::new(options.buffer_size),
            position: Position::default(),
            state: LexerState::Ready,
            failure: None,
        }
    }

    pub fn grammar(&self) -> &Arc<LexerGrammar> {
        &self.grammar
    }

    pub fn state(&self) -> LexerState {
        self.state
    }

    /// Position of the first byte which has not been tokenized yet.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Returns the next token. `InvalidToken` errors are recoverable, the
    /// lexer continues after the invalid text on the next call. Any other
    /// error is returned again by every later call.
    pub fn next_token(&mut self) -> Result<LexicToken, LexError> {
        match self.state {
            LexerState::EndOfStream => return Err(LexError::EndOfStream),
            LexerState::FatalError => {
                if let Some(failure) = &self.failure {
                    return Err(failure.clone());
                }
            }
            _ => {}
        }

        let result = self.scan();
        self.state = match &result {
            Ok(_) => LexerState::TokenMatched,
            Err(LexError::EndOfStream) => LexerState::EndOfStream,
            Err(err) if err.is_recoverable() => LexerState::Ready,
            Err(err) => {
                self.failure = Some(err.clone());
                LexerState::FatalError
            }
        };
        result
    }

    fn scan(&mut self) -> Result<LexicToken, LexError> {
        loop {
            if self.buffer.is_empty() {
                if self.buffer.is_exhausted() {
                    return Err(LexError::EndOfStream);
                }
                self.refill()?;
                continue;
            }

            match self.step() {
                Step::Refill => self.refill()?,
                Step::Skip(len) => self.consume(len),
                Step::Done(len, result) => {
                    self.consume(len);
                    return result;
                }
            }
        }
    }

    /// Decides what to do with the current buffer contents, the position
    /// in errors is the one before consuming.
    fn step(&self) -> Step {
        let exhausted = self.buffer.is_exhausted();
        let filled = self.buffer.filled();
        let window = match exhausted {
            true => filled,
            false => &filled[..complete_utf8_len(filled)],
        };

        let Some(captures) = self.grammar.master().captures(window) else {
            if !exhausted {
                return Step::Refill;
            }
            if self.grammar.use_error_fallback() {
                return Step::Done(filled.len(), Err(self.invalid(filled)));
            }
            return Step::Done(0, Err(self.unmatchable(filled)));
        };
        let Some(whole) = captures.get(0) else {
            return Step::Done(0, Err(self.unmatchable(filled)));
        };

        // more input could still extend the match
        if whole.end() == window.len() && !exhausted {
            return Step::Refill;
        }

        if whole.start() > 0 {
            if self.grammar.use_error_fallback() {
                let skipped = &window[..whole.start()];
                return Step::Done(skipped.len(), Err(self.invalid(skipped)));
            }
            return Step::Done(0, Err(self.unmatchable(filled)));
        }

        if whole.is_empty() {
            return Step::Done(0, Err(self.unmatchable(filled)));
        }

        let text = whole.as_bytes();
        match self.grammar.classify(&captures) {
            Some(GroupRole::Whitespace) => Step::Skip(text.len()),
            Some(GroupRole::Error) => Step::Done(text.len(), Err(self.invalid(text))),
            Some(GroupRole::Token(token)) => {
                log::trace!("matched <{}> at {}", token.name, self.position);
                let token = LexicToken {
                    token_type_id: token.id,
                    text: text.to_str_lossy().into_owned(),
                };
                Step::Done(text.len(), Ok(token))
            }
            None => Step::Done(0, Err(self.unmatchable(filled))),
        }
    }

    fn refill(&mut self) -> Result<(), LexError> {
        self.state = LexerState::AwaitingRefill;
        let read = self.buffer.fill(&mut self.reader)?;
        log::trace!(
            "read {read} bytes, {} buffered, capacity {}",
            self.buffer.filled().len(),
            self.buffer.capacity()
        );
        Ok(())
    }

    fn consume(&mut self, len: usize) {
        self.position.advance(&self.buffer.filled()[..len]);
        self.buffer.consume(len);
    }

    fn invalid(&self, text: &[u8]) -> LexError {
        LexError::InvalidToken {
            position: self.position,
            text: text.to_str_lossy().into_owned(),
        }
    }

    fn unmatchable(&self, rest: &[u8]) -> LexError {
        LexError::UnmatchableInput {
            position: self.position,
            snippet: rest.to_str_lossy().chars().take(SNIPPET_LEN).collect(),
        }
    }
}

impl<R: Read> TokenSource for Lexer<R> {
    fn next_token(&mut self) -> Result<LexicToken, LexError> {
        Lexer::next_token(self)
    }
}

#[cfg(test)]
mod tests {
    use gbnf::parse;

    use super::*;
    use crate::assemble::{assemble, AssembleOptions};

    fn lexer<'a>(lexics: &str, input: &'a str, fallback: bool) -> Lexer<&'a [u8]> {
        let grammar = parse(lexics).unwrap();
        let options = AssembleOptions {
            use_error_fallback: fallback,
            ..Default::default()
        };
        let grammar = Arc::new(assemble(&grammar, &options).unwrap());
        let options = LexerOptions {
            buffer_size: 4,
            ..Default::default()
        };
        Lexer::new(grammar, input.as_bytes(), &options)
    }

    #[test]
    fn whitespace_is_skipped() {
        let mut lexer = lexer(r#"<ident> := "\w+" ;"#, "a   b", false);
        assert_eq!(lexer.next_token().unwrap().text, "a");
        assert_eq!(lexer.state(), LexerState::TokenMatched);
        assert_eq!(lexer.next_token().unwrap().text, "b");
        assert!(matches!(lexer.next_token(), Err(LexError::EndOfStream)));
        assert_eq!(lexer.state(), LexerState::EndOfStream);
        assert!(matches!(lexer.next_token(), Err(LexError::EndOfStream)));
    }

    #[test]
    fn positions() {
        let mut lexer = lexer(r#"<ident> := "\w+" ;"#, "ab\n  cd é", false);
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();
        assert_eq!(
            lexer.position(),
            Position {
                offset: 7,
                line: 2,
                column: 5
            }
        );
        assert_eq!(lexer.next_token().unwrap().text, "é");
        assert_eq!(lexer.position().offset, 10);
        assert_eq!(lexer.position().column, 7);
    }

    #[test]
    fn invalid_token_is_recoverable() {
        let mut lexer = lexer(r#"<ident> := "[a-z]+" ;"#, "ab 12 cd", true);
        assert_eq!(lexer.next_token().unwrap().text, "ab");
        let err = lexer.next_token().unwrap_err();
        assert!(
            matches!(&err, LexError::InvalidToken { position, text } if position.column == 4 && text == "12 cd")
        );
        assert!(matches!(lexer.next_token(), Err(LexError::EndOfStream)));
    }

    #[test]
    fn skipped_bytes_are_invalid() {
        // the fallback does not match invalid UTF-8, the search skips over it
        let grammar = parse(r#"<ident> := "[a-z]+" ;"#).unwrap();
        let options = AssembleOptions {
            use_error_fallback: true,
            ..Default::default()
        };
        let grammar = Arc::new(assemble(&grammar, &options).unwrap());
        let input: &[u8] = b"\xffab";
        let mut lexer = Lexer::new(grammar, input, &LexerOptions::default());
        assert!(matches!(lexer.next_token(), Err(LexError::InvalidToken { text, .. }) if text == "\u{FFFD}"));
        assert_eq!(lexer.next_token().unwrap().text, "ab");
    }

    #[test]
    fn unmatchable_is_fatal() {
        let mut lexer = lexer(r#"<ident> := "[a-z]+" ;"#, "ab ?? cd", false);
        assert_eq!(lexer.next_token().unwrap().text, "ab");
        let err = lexer.next_token().unwrap_err();
        assert!(matches!(
            &err,
            LexError::UnmatchableInput { position, snippet } if position.offset == 3 && snippet.starts_with("??")
        ));
        assert_eq!(lexer.state(), LexerState::FatalError);
        assert!(matches!(lexer.next_token(), Err(LexError::UnmatchableInput { .. })));
    }

    #[test]
    fn empty_match_is_unmatchable() {
        // matches nothing at a word boundary but not the empty input
        let mut lexer = lexer(r#"<a> := "x*\b" ;"#, "y", false);
        assert!(matches!(lexer.next_token(), Err(LexError::UnmatchableInput { .. })));
    }

    #[test]
    fn io_errors_are_fatal() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "broken"))
            }
        }

        let grammar = parse(r#"<a> := "x" ;"#).unwrap();
        let grammar = Arc::new(assemble(&grammar, &AssembleOptions::default()).unwrap());
        let mut lexer = Lexer::new(grammar, Broken, &LexerOptions::default());
        assert!(matches!(lexer.next_token(), Err(LexError::Io(_))));
        assert!(matches!(lexer.next_token(), Err(LexError::Io(_))));
    }
}
