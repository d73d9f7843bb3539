use cranelift_entity::SecondaryMap;
use gbnf::{Grammar, GrammarOption, GrammarRule, GrammarToken, TagId};
use regex::bytes::{Captures, Regex};

use crate::error::AssembleError;

/// Whitespace fragment used when the grammar does not define its own.
pub const DEFAULT_WHITESPACE: &str = r"\s+";
/// Fragment of the error fallback group.
pub const ERROR_FALLBACK: &str = ".+";

/// Tag names which configure the lexer instead of defining tokens.
#[derive(Clone, Debug)]
pub struct ReservedTags {
    /// Its fragment replaces the default whitespace fragment.
    pub whitespace: String,
    pub configuration: Vec<String>,
}

impl Default for ReservedTags {
    fn default() -> Self {
        Self {
            whitespace: "whitespace".to_owned(),
            configuration: vec!["delim".to_owned(), "regex-delim".to_owned()],
        }
    }
}

impl ReservedTags {
    pub fn is_reserved(&self, name: &str) -> bool {
        self.whitespace == name || self.configuration.iter().any(|c| c == name)
    }
}

#[derive(Clone, Debug, Default)]
pub struct AssembleOptions {
    /// Append the `(.+)` group which turns uncovered input into invalid tokens.
    pub use_error_fallback: bool,
    pub reserved: ReservedTags,
}

/// The regex fragment of a single rule.
#[derive(Clone, Debug)]
pub struct RegexRule {
    pub id: TagId,
    pub name: String,
    pub source: String,
    full: Regex,
}

impl RegexRule {
    fn new(id: TagId, name: &str, source: String) -> Result<RegexRule, AssembleError> {
        let full = compile(&format!("^(?:{source})$"))?;
        Ok(RegexRule {
            id,
            name: name.to_owned(),
            source,
            full,
        })
    }

    /// Whether the whole text is matched by the rule.
    pub fn is_full_match(&self, text: &str) -> bool {
        self.full.is_match(text.as_bytes())
    }

    /// Capture groups declared inside the fragment itself.
    fn inner_groups(&self) -> usize {
        self.full.captures_len() - 1
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TokenType {
    pub id: TagId,
    pub name: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GroupRole<'a> {
    Token(&'a TokenType),
    Whitespace,
    Error,
}

/// Master regex of a lexer together with the meaning of its top level capture groups.
#[derive(Clone, Debug)]
pub struct LexerGrammar {
    master: Regex,
    source: String,
    rules: Vec<RegexRule>,
    configuration: Vec<RegexRule>,
    whitespace: String,
    token_groups: Vec<(usize, TokenType)>,
    whitespace_group: usize,
    error_group: Option<usize>,
}

impl LexerGrammar {
    pub fn master(&self) -> &Regex {
        &self.master
    }
    pub fn source(&self) -> &str {
        &self.source
    }
    /// Fragments of the token rules, in capture group order.
    pub fn rules(&self) -> &[RegexRule] {
        &self.rules
    }
    pub fn rule(&self, name: &str) -> Option<&RegexRule> {
        self.rules
            .iter()
            .chain(&self.configuration)
            .find(|r| r.name == name)
    }
    /// Fragments of the reserved configuration rules which are defined.
    pub fn configuration(&self) -> &[RegexRule] {
        &self.configuration
    }
    pub fn whitespace(&self) -> &str {
        &self.whitespace
    }
    /// Pairs of capture group index and the token type it produces.
    pub fn token_groups(&self) -> &[(usize, TokenType)] {
        &self.token_groups
    }
    pub fn token_for_group(&self, group: usize) -> Option<&TokenType> {
        self.token_groups
            .iter()
            .find(|(index, _)| *index == group)
            .map(|(_, token)| token)
    }
    pub fn whitespace_group(&self) -> usize {
        self.whitespace_group
    }
    pub fn error_group(&self) -> Option<usize> {
        self.error_group
    }
    pub fn use_error_fallback(&self) -> bool {
        self.error_group.is_some()
    }

    /// Finds the first top level group which matched a non-empty text.
    pub fn classify(&self, captures: &Captures<'_>) -> Option<GroupRole<'_>> {
        let matched = |index: usize| captures.get(index).is_some_and(|m| !m.is_empty());

        for (index, token) in &self.token_groups {
            if matched(*index) {
                return Some(GroupRole::Token(token));
            }
        }
        if matched(self.whitespace_group) {
            return Some(GroupRole::Whitespace);
        }
        match self.error_group {
            Some(index) if matched(index) => Some(GroupRole::Error),
            _ => None,
        }
    }
}

/// Builds the master regex of `grammar`, one capture group for every
/// non-synthetic rule which is not reserved.
pub fn assemble(grammar: &Grammar, options: &AssembleOptions) -> Result<LexerGrammar, AssembleError> {
    let mut cx = AssembleCx::new(grammar);
    let reserved = &options.reserved;

    let whitespace = match grammar.tag_id(&reserved.whitespace) {
        Some(id) => {
            let rule = special_rule(grammar, id)?;
            cx.fragment(rule)?
        }
        None => DEFAULT_WHITESPACE.to_owned(),
    };
    if compile(&format!("^(?:{whitespace})$"))?.is_match(b"") {
        return Err(matches_empty(&reserved.whitespace));
    }

    let mut configuration = Vec::new();
    for name in &reserved.configuration {
        if let Some(id) = grammar.tag_id(name) {
            let rule = special_rule(grammar, id)?;
            let fragment = cx.fragment(rule)?;
            configuration.push(RegexRule::new(id, name, fragment)?);
        }
    }

    let mut rules = Vec::new();
    for rule in grammar.rules() {
        let Some(tag) = grammar.tag(rule.id) else {
            continue;
        };
        if tag.synthetic || reserved.is_reserved(&tag.name) {
            continue;
        }
        let fragment = cx.fragment(rule)?;
        log::debug!("fragment of <{}>: {fragment}", tag.name);
        let rule = RegexRule::new(rule.id, &tag.name, fragment)?;
        // an empty match would win over the whitespace group
        if rule.is_full_match("") {
            return Err(matches_empty(&tag.name));
        }
        rules.push(rule);
    }

    if rules.is_empty() {
        return Err(AssembleError::RegexAssemblyFailure {
            reason: "the grammar defines no token rules".to_owned(),
            source: None,
        });
    }

    // (f1)|(f2)|...|(whitespace)|(.+)
    let mut source = String::new();
    let mut group = 1;
    let mut token_groups = Vec::new();
    for rule in &rules {
        source.push('(');
        source.push_str(&rule.source);
        source.push_str(")|");
        token_groups.push((
            group,
            TokenType {
                id: rule.id,
                name: rule.name.clone(),
            },
        ));
        group += 1 + rule.inner_groups();
    }

    let whitespace_group = group;
    source.push('(');
    source.push_str(&whitespace);
    source.push(')');
    group += 1 + compile(&whitespace)?.captures_len() - 1;

    let error_group = if options.use_error_fallback {
        source.push_str("|(");
        source.push_str(ERROR_FALLBACK);
        source.push(')');
        Some(group)
    } else {
        None
    };

    log::debug!("master regex: {source}");
    let master = compile(&source)?;

    Ok(LexerGrammar {
        master,
        source,
        rules,
        configuration,
        whitespace,
        token_groups,
        whitespace_group,
        error_group,
    })
}

/// Computes the fragment of a single rule.
pub fn rule_fragment(grammar: &Grammar, id: TagId) -> Result<String, AssembleError> {
    let mut cx = AssembleCx::new(grammar);
    match grammar.rule(id) {
        Some(rule) => cx.fragment(rule),
        None => Err(AssembleError::RegexAssemblyFailure {
            reason: format!("<{}> has no rule", grammar.tag_name(id)),
            source: None,
        }),
    }
}

fn special_rule(grammar: &Grammar, id: TagId) -> Result<&GrammarRule, AssembleError> {
    grammar
        .rule(id)
        .ok_or_else(|| AssembleError::MissingSpecialRule {
            tag: id,
            name: grammar.tag_name(id).to_owned(),
        })
}

fn matches_empty(name: &str) -> AssembleError {
    AssembleError::RegexAssemblyFailure {
        reason: format!("<{name}> matches the empty string"),
        source: None,
    }
}

fn compile(source: &str) -> Result<Regex, AssembleError> {
    Regex::new(source).map_err(|err| AssembleError::RegexAssemblyFailure {
        reason: format!("the regex engine rejected {source:?}"),
        source: Some(err),
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Recursion {
    /// `R ::= P <R> | B`
    Right,
    /// `R ::= <R> S | B`
    Left,
}

struct AssembleCx<'a> {
    grammar: &'a Grammar,
    /// Rules on the current reference path.
    visiting: SecondaryMap<TagId, bool>,
}

impl<'a> AssembleCx<'a> {
    fn new(grammar: &'a Grammar) -> Self {
        Self {
            grammar,
            visiting: SecondaryMap::new(),
        }
    }

    fn fragment(&mut self, rule: &GrammarRule) -> Result<String, AssembleError> {
        if self.visiting[rule.id] {
            return Ok(String::new());
        }
        self.visiting[rule.id] = true;
        let result = self.fragment_impl(rule);
        self.visiting[rule.id] = false;
        result
    }

    fn fragment_impl(&mut self, rule: &GrammarRule) -> Result<String, AssembleError> {
        if let Some(literal) = rule.single_literal() {
            return Ok(literal.to_owned());
        }

        if let Some(fragment) = self.flatten_self_recursion(rule)? {
            return Ok(fragment);
        }

        let mut buf = String::from("(?:");
        self.options(rule.id, &rule.options, &mut buf)?;
        buf.push(')');
        Ok(buf)
    }

    fn options(
        &mut self,
        owner: TagId,
        options: &[GrammarOption],
        buf: &mut String,
    ) -> Result<(), AssembleError> {
        for (i, option) in options.iter().enumerate() {
            if i > 0 {
                buf.push('|');
            }
            self.sequence(owner, &option.children, buf)?;
        }
        Ok(())
    }

    fn sequence(
        &mut self,
        owner: TagId,
        children: &[GrammarToken],
        buf: &mut String,
    ) -> Result<(), AssembleError> {
        let spliced = children.len() > 1;
        for child in children {
            let fragment = self.token(owner, child)?;
            if spliced && has_top_level_alternation(&fragment) {
                buf.push_str("(?:");
                buf.push_str(&fragment);
                buf.push(')');
            } else {
                buf.push_str(&fragment);
            }
        }
        Ok(())
    }

    fn token(&mut self, owner: TagId, token: &GrammarToken) -> Result<String, AssembleError> {
        match token {
            GrammarToken::Literal(pattern) => Ok(pattern.clone()),
            GrammarToken::TagRef(target) => match self.grammar.rule(*target) {
                Some(rule) => self.fragment(rule),
                None => Err(AssembleError::UndefinedRule {
                    rule: owner,
                    name: self.grammar.tag_name(owner).to_owned(),
                    target: *target,
                    target_name: self.grammar.tag_name(*target).to_owned(),
                }),
            },
            GrammarToken::Group { kind, children } => {
                let mut buf = String::from("(?:");
                self.sequence(owner, children, &mut buf)?;
                buf.push(')');
                buf.push_str(kind.suffix());
                Ok(buf)
            }
        }
    }

    /// Turns `R ::= P <R> | B` into `(?:P)*(?:B)` and `R ::= <R> S | B` into `(?:B)(?:S)*`.
    fn flatten_self_recursion(
        &mut self,
        rule: &GrammarRule,
    ) -> Result<Option<String>, AssembleError> {
        let id = rule.id;
        let is_self = |token: &GrammarToken| *token == GrammarToken::TagRef(id);
        let mentions_self = |option: &GrammarOption| option.children.iter().any(|t| mentions(t, id));

        let mut kind = None;
        let mut recursive = Vec::new();
        let mut base = Vec::new();
        for option in &rule.options {
            if !mentions_self(option) {
                base.push(option.clone());
                continue;
            }

            let children = option.children.as_slice();
            let (this, rest) = match children {
                [rest @ .., last] if is_self(last) && !rest.iter().any(|t| mentions(t, id)) => {
                    (Recursion::Right, rest)
                }
                [first, rest @ ..] if is_self(first) && !rest.iter().any(|t| mentions(t, id)) => {
                    (Recursion::Left, rest)
                }
                _ => return Ok(None),
            };
            if rest.is_empty() || kind.is_some_and(|k| k != this) {
                return Ok(None);
            }
            kind = Some(this);
            recursive.push(GrammarOption::new(rest.to_vec()));
        }

        let Some(kind) = kind else {
            return Ok(None);
        };
        if base.is_empty() {
            return Ok(None);
        }

        let mut repeated = String::from("(?:");
        self.options(id, &recursive, &mut repeated)?;
        repeated.push_str(")*");

        let mut finish = String::from("(?:");
        self.options(id, &base, &mut finish)?;
        finish.push(')');

        Ok(Some(match kind {
            Recursion::Right => repeated + &finish,
            Recursion::Left => finish + &repeated,
        }))
    }
}

fn mentions(token: &GrammarToken, id: TagId) -> bool {
    let mut found = false;
    token.visit(|t| found |= *t == GrammarToken::TagRef(id));
    found
}

/// Whether the pattern contains a `|` outside of any group or class.
fn has_top_level_alternation(pattern: &str) -> bool {
    let mut depth = 0u32;
    let mut in_class = false;
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => depth = depth.saturating_sub(1),
            '|' if !in_class && depth == 0 => return true,
            _ => {}
        }
    }
    false
}
