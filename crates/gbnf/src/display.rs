use std::fmt::Write;

use crate::{
    grammar::{Grammar, GrammarRule},
    token::write_literal,
};

impl GrammarRule {
    pub fn write_ebnf(&self, buf: &mut dyn Write, cx: &Grammar) -> std::fmt::Result {
        let marker = if cx.start() == Some(self.id) { "!" } else { "" };
        write!(buf, "<{marker}{}> ::=", cx.tag_name(self.id))?;
        for (i, option) in self.options.iter().enumerate() {
            if i > 0 {
                buf.write_str(" |")?;
            }
            buf.write_char(' ')?;
            option.write_ebnf(buf, cx)?;
        }
        buf.write_str(" ;")
    }
}

/// Prints the grammar back in EBNF notation, one rule per line.
impl std::fmt::Display for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, value) in self.params() {
            write!(f, "<#{key}> := ")?;
            write_literal(f, value)?;
            f.write_str(" ;\n")?;
        }
        for rule in self.rules() {
            rule.write_ebnf(f, self)?;
            f.write_char('\n')?;
        }
        Ok(())
    }
}

pub struct GrammarTree<'a>(&'a Grammar);

impl Grammar {
    /// Debug view with the tag table and the token tree of every rule.
    pub fn display_tree(&self) -> GrammarTree<'_> {
        GrammarTree(self)
    }
}

impl std::fmt::Display for GrammarTree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let grammar = self.0;

        writeln!(f, "Tags")?;
        for tag in grammar.tags() {
            let synthetic = if tag.synthetic { " (synthetic)" } else { "" };
            writeln!(f, "  {} {}{synthetic}", tag.id, tag.name)?;
        }

        for rule in grammar.rules() {
            writeln!(f, "Rule {} {}", rule.id, grammar.tag_name(rule.id))?;
            for option in &rule.options {
                writeln!(f, "  Option")?;
                for child in &option.children {
                    child.display_into_indent(f, grammar, 2)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        convert::{convert_to_bnf, ConvertOptions},
        parse::parse,
        token::GrammarOption,
    };

    #[test]
    fn print_roundtrips() {
        let src = "<#version> := \"1\" ;\n\
                   <!a> ::= \"x\" {<b> \"\\\"\"}* | <b> ;\n\
                   <b> ::= {\"y\"}? ;\n";
        let grammar = parse(src).unwrap();
        assert_eq!(grammar.to_string(), src);
        assert_eq!(parse(&grammar.to_string()).unwrap().to_string(), src);
    }

    #[test]
    fn empty_option_roundtrips() {
        let mut grammar = parse(r#"<r> ::= {"a"}? ;"#).unwrap();
        convert_to_bnf(&mut grammar, &ConvertOptions::default()).unwrap();

        let printed = grammar.to_string();
        assert_eq!(printed, "<r> ::= \"a\" | \"\" ;\n");
        let reparsed = parse(&printed).unwrap();
        let r = reparsed.tag_id("r").unwrap();
        assert_eq!(reparsed.rule(r).unwrap().options[1], GrammarOption::default());
        assert_eq!(reparsed.to_string(), printed);
    }

    #[test]
    fn tree() {
        let grammar = parse(r#"<a> ::= "x" {<a>}? ;"#).unwrap();
        assert_eq!(
            grammar.display_tree().to_string(),
            "Tags\n  \
             #0 a\n\
             Rule #0 a\n  \
             Option\n    \
             Literal(\"x\")\n    \
             GroupOptional\n      \
             TagRef(a, #0)\n"
        );
    }
}
