use crate::{
    error::{ParseError, ParseErrorKind},
    grammar::{Grammar, GrammarRule},
    token::{GrammarOption, GrammarToken, GroupKind},
};

/// Definition-assignment operators, longest first.
const ASSIGNMENT_OPERATORS: &[&str] = &["::==", "::=", ":==", ":=", "="];

/// Reads EBNF-like grammar text into a [`Grammar`].
///
/// ```text
/// # comment
/// <!start> ::= <item> {"," <item>}* ;
/// <item>   :=  "[a-z]+" | <number> ;
/// <#name>  :=  "value" ;
/// ```
pub fn parse(src: &str) -> Result<Grammar, ParseError> {
    let mut parser = Parser {
        reader: Reader::new(src),
        grammar: Grammar::new(),
    };
    parser.file()?;
    Ok(parser.grammar)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Location {
    line: u32,
    column: u32,
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn location(&self) -> Location {
        Location {
            line: self.line,
            column: self.column,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn consume(&mut self, value: char) -> bool {
        if self.peek() == Some(value) {
            self.next();
            true
        } else {
            false
        }
    }

    fn consume_str(&mut self, value: &str) -> bool {
        if self.remaining().starts_with(value) {
            for _ in value.chars() {
                self.next();
            }
            true
        } else {
            false
        }
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace() && c != '\n') {
            self.next();
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.next();
        }
    }

    /// Skips whitespace and `#` comments.
    fn skip_trivia(&mut self) {
        loop {
            self.skip_whitespace();
            if !self.consume('#') {
                break;
            }
            while let Some(c) = self.next() {
                if c == '\n' {
                    break;
                }
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RuleMarker {
    None,
    Start,
    Param,
}

struct Parser<'a> {
    reader: Reader<'a>,
    grammar: Grammar,
}

impl<'a> Parser<'a> {
    fn error(&self, kind: ParseErrorKind) -> ParseError {
        self.error_at(self.reader.location(), kind)
    }

    fn error_at(&self, location: Location, kind: ParseErrorKind) -> ParseError {
        ParseError {
            line: location.line,
            column: location.column,
            kind,
        }
    }

    fn file(&mut self) -> Result<(), ParseError> {
        loop {
            self.reader.skip_trivia();
            match self.reader.peek() {
                None => return Ok(()),
                Some('<') => self.rule()?,
                Some(c) => return Err(self.error(ParseErrorKind::UnexpectedCharacter(c))),
            }
        }
    }

    fn rule(&mut self) -> Result<(), ParseError> {
        let start = self.reader.location();
        self.reader.next();
        self.reader.skip_spaces();

        let marker = if self.reader.consume('!') {
            RuleMarker::Start
        } else if self.reader.consume('#') {
            RuleMarker::Param
        } else {
            RuleMarker::None
        };

        let name = self.tag_name()?;
        self.assignment(&name)?;

        if marker == RuleMarker::Param {
            return self.param(name);
        }

        let id = self.grammar.intern_tag(&name);
        if self.grammar.rule(id).is_some() {
            return Err(self.error_at(start, ParseErrorKind::DuplicateRule(name)));
        }

        let options = self.options(&name)?;
        if options.is_empty() {
            return Err(self.error_at(start, ParseErrorKind::EmptyRule(name)));
        }
        log::trace!("rule <{name}> with {} options", options.len());

        self.grammar.add_rule(GrammarRule::new(id, options));
        if marker == RuleMarker::Start {
            self.grammar.set_start(id);
        }
        Ok(())
    }

    /// Reads a tag name up to and including the closing `>`, the opening `<` is already consumed.
    fn tag_name(&mut self) -> Result<String, ParseError> {
        let mut name = String::new();
        loop {
            let location = self.reader.location();
            match self.reader.next() {
                None => return Err(self.error(ParseErrorKind::UnterminatedTag)),
                Some('>') => break,
                Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '-' => name.push(c),
                Some(c) if c.is_whitespace() && c != '\n' => {
                    // after trailing spaces only the end can follow
                    self.reader.skip_spaces();
                    let location = self.reader.location();
                    match self.reader.next() {
                        Some('>') => break,
                        Some(c) => {
                            return Err(
                                self.error_at(location, ParseErrorKind::InvalidTagCharacter(c))
                            )
                        }
                        None => return Err(self.error(ParseErrorKind::UnterminatedTag)),
                    }
                }
                Some(c) => {
                    return Err(self.error_at(location, ParseErrorKind::InvalidTagCharacter(c)))
                }
            }
        }

        if name.is_empty() {
            return Err(self.error(ParseErrorKind::EmptyTag));
        }
        Ok(name)
    }

    fn assignment(&mut self, name: &str) -> Result<(), ParseError> {
        self.reader.skip_whitespace();
        for op in ASSIGNMENT_OPERATORS {
            if self.reader.consume_str(op) {
                return Ok(());
            }
        }
        Err(self.error(ParseErrorKind::MissingAssignment(name.to_owned())))
    }

    fn param(&mut self, name: String) -> Result<(), ParseError> {
        self.reader.skip_trivia();
        if !self.reader.consume('"') {
            return Err(self.error(ParseErrorKind::InvalidParameter(name)));
        }
        let value = self.literal()?;

        self.reader.skip_trivia();
        if !self.reader.consume(';') {
            return Err(self.error(ParseErrorKind::InvalidParameter(name)));
        }

        self.grammar.set_param(&name, &value);
        Ok(())
    }

    fn options(&mut self, name: &str) -> Result<Vec<GrammarOption>, ParseError> {
        let mut options = Vec::new();
        let mut current = GrammarOption::default();
        loop {
            self.reader.skip_trivia();
            match self.reader.peek() {
                None => return Err(self.error(ParseErrorKind::MissingTerminator(name.to_owned()))),
                Some(c @ ('|' | ';')) => {
                    self.reader.next();
                    // empty options are dropped, a lone `""` spells out the empty option
                    let mut option = std::mem::take(&mut current);
                    if option.children == [GrammarToken::Literal(String::new())] {
                        option.children.clear();
                        options.push(option);
                    } else if !option.is_empty() {
                        options.push(option);
                    }
                    if c == ';' {
                        return Ok(options);
                    }
                }
                Some(_) => {
                    let token = self.token()?;
                    current.children.push(token);
                }
            }
        }
    }

    fn token(&mut self) -> Result<GrammarToken, ParseError> {
        let location = self.reader.location();
        match self.reader.peek() {
            Some('<') => {
                self.reader.next();
                self.reader.skip_spaces();
                let name = self.tag_name()?;
                Ok(GrammarToken::TagRef(self.grammar.intern_tag(&name)))
            }
            Some('"') => {
                self.reader.next();
                Ok(GrammarToken::Literal(self.literal()?))
            }
            Some('{') => {
                self.reader.next();
                let mut children = Vec::new();
                loop {
                    self.reader.skip_trivia();
                    match self.reader.peek() {
                        None => {
                            return Err(self.error_at(location, ParseErrorKind::UnterminatedGroup))
                        }
                        Some('}') => {
                            self.reader.next();
                            break;
                        }
                        Some(_) => children.push(self.token()?),
                    }
                }

                self.reader.skip_whitespace();
                let kind = match self.reader.peek().and_then(GroupKind::from_suffix) {
                    Some(kind) => {
                        self.reader.next();
                        kind
                    }
                    None => GroupKind::One,
                };
                Ok(GrammarToken::Group { kind, children })
            }
            Some(c) => Err(self.error(ParseErrorKind::UnexpectedCharacter(c))),
            None => Err(self.error(ParseErrorKind::UnterminatedGroup)),
        }
    }

    /// Reads a literal after its opening quote. Escapes are kept verbatim,
    /// the literal is a regex pattern.
    fn literal(&mut self) -> Result<String, ParseError> {
        let start = Location {
            line: self.reader.line,
            column: self.reader.column.saturating_sub(1),
        };
        let mut pattern = String::new();
        let mut escaped = false;
        loop {
            match self.reader.next() {
                None => return Err(self.error_at(start, ParseErrorKind::UnterminatedLiteral)),
                Some('"') if !escaped => return Ok(pattern),
                Some(c) => {
                    pattern.push(c);
                    escaped = c == '\\' && !escaped;
                }
            }
        }
    }
}
