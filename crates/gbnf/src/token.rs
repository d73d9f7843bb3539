use std::fmt::Write;

use crate::grammar::{Grammar, TagId};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GroupKind {
    One,
    Optional,
    RepeatZeroOrMore,
    RepeatOneOrMore,
}

impl GroupKind {
    pub fn from_suffix(c: char) -> Option<GroupKind> {
        match c {
            '?' => Some(GroupKind::Optional),
            '*' => Some(GroupKind::RepeatZeroOrMore),
            '+' => Some(GroupKind::RepeatOneOrMore),
            _ => None,
        }
    }
    pub fn suffix(self) -> &'static str {
        match self {
            GroupKind::One => "",
            GroupKind::Optional => "?",
            GroupKind::RepeatZeroOrMore => "*",
            GroupKind::RepeatOneOrMore => "+",
        }
    }
    /// The construct may match zero occurrences of its children.
    pub fn matches_empty(self) -> bool {
        matches!(self, GroupKind::Optional | GroupKind::RepeatZeroOrMore)
    }
    pub fn is_repeat(self) -> bool {
        matches!(
            self,
            GroupKind::RepeatZeroOrMore | GroupKind::RepeatOneOrMore
        )
    }
    pub fn display_into(self, buf: &mut dyn Write) -> std::fmt::Result {
        let name = match self {
            GroupKind::One => "GroupOne",
            GroupKind::Optional => "GroupOptional",
            GroupKind::RepeatZeroOrMore => "GroupRepeatZeroOrMore",
            GroupKind::RepeatOneOrMore => "GroupRepeatOneOrMore",
        };
        buf.write_str(name)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum GrammarToken {
    /// Terminal matched by a regex-like pattern.
    Literal(String),
    /// Invocation of a non-terminal.
    TagRef(TagId),
    Group {
        kind: GroupKind,
        children: Vec<GrammarToken>,
    },
}

impl GrammarToken {
    pub fn literal(pattern: impl Into<String>) -> GrammarToken {
        GrammarToken::Literal(pattern.into())
    }
    pub fn group(kind: GroupKind, children: Vec<GrammarToken>) -> GrammarToken {
        GrammarToken::Group { kind, children }
    }
    pub fn is_group(&self) -> bool {
        matches!(self, GrammarToken::Group { .. })
    }
    /// Leaves have no nested children.
    pub fn is_leaf(&self) -> bool {
        !self.is_group()
    }
    pub fn children(&self) -> &[GrammarToken] {
        match self {
            GrammarToken::Group { children, .. } => children,
            _ => &[],
        }
    }
    fn visit_impl(&self, f: &mut dyn FnMut(&GrammarToken)) {
        for child in self.children() {
            child.visit_impl(f);
        }
        f(self)
    }
    /// Visits children before their parent.
    pub fn visit(&self, mut f: impl FnMut(&GrammarToken)) {
        self.visit_impl(&mut f)
    }
    /// Writes the token back in EBNF notation.
    pub fn write_ebnf(&self, buf: &mut dyn Write, cx: &Grammar) -> std::fmt::Result {
        match self {
            GrammarToken::Literal(pattern) => write_literal(buf, pattern),
            GrammarToken::TagRef(id) => write!(buf, "<{}>", cx.tag_name(*id)),
            GrammarToken::Group { kind, children } => {
                buf.write_char('{')?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        buf.write_char(' ')?;
                    }
                    child.write_ebnf(buf, cx)?;
                }
                write!(buf, "}}{}", kind.suffix())
            }
        }
    }
    pub fn display_into_indent(
        &self,
        buf: &mut dyn Write,
        cx: &Grammar,
        indent: u32,
    ) -> std::fmt::Result {
        for _ in 0..indent {
            write!(buf, "  ")?;
        }
        match self {
            GrammarToken::Literal(pattern) => {
                write!(buf, "Literal(")?;
                write_literal(buf, pattern)?;
                write!(buf, ")")?;
            }
            GrammarToken::TagRef(id) => write!(buf, "TagRef({}, {id})", cx.tag_name(*id))?,
            GrammarToken::Group { kind, .. } => kind.display_into(buf)?,
        }
        write!(buf, "\n")?;
        for child in self.children() {
            child.display_into_indent(buf, cx, indent + 1)?;
        }
        Ok(())
    }
}

/// One alternative of a rule, a concatenation of tokens.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct GrammarOption {
    pub children: Vec<GrammarToken>,
}

impl GrammarOption {
    pub fn new(children: Vec<GrammarToken>) -> GrammarOption {
        GrammarOption { children }
    }
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
    pub fn write_ebnf(&self, buf: &mut dyn Write, cx: &Grammar) -> std::fmt::Result {
        if self.children.is_empty() {
            return write_literal(buf, "");
        }
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                buf.write_char(' ')?;
            }
            child.write_ebnf(buf, cx)?;
        }
        Ok(())
    }
}

// A quote is only escaped when it would otherwise end the literal.
pub(crate) fn write_literal(buf: &mut dyn Write, pattern: &str) -> std::fmt::Result {
    buf.write_char('"')?;
    let mut escaped = false;
    for c in pattern.chars() {
        if c == '"' && !escaped {
            buf.write_char('\\')?;
        }
        escaped = c == '\\' && !escaped;
        buf.write_char(c)?;
    }
    buf.write_char('"')
}
