use crate::{
    error::GrammarError,
    grammar::{Grammar, GrammarRule},
    token::GrammarToken,
};

impl Grammar {
    /// Checks that every rule has options, every group has children and
    /// every reference points to a defined rule. Reports the first problem found.
    pub fn validate(&self) -> Result<(), GrammarError> {
        for rule in self.rules() {
            if rule.options.is_empty() {
                return Err(self.malformed(rule, "rule has no options"));
            }

            let mut error = None;
            for option in &rule.options {
                for child in &option.children {
                    child.visit(|token| {
                        if error.is_some() {
                            return;
                        }
                        match token {
                            GrammarToken::Group { children, .. } if children.is_empty() => {
                                error = Some(self.malformed(rule, "group has no children"));
                            }
                            GrammarToken::TagRef(target) if self.rule(*target).is_none() => {
                                error = Some(GrammarError::DanglingReference {
                                    rule: rule.id,
                                    name: self.tag_name(rule.id).to_owned(),
                                    target: *target,
                                    target_name: self.tag_name(*target).to_owned(),
                                });
                            }
                            _ => {}
                        }
                    });
                }
            }
            if let Some(error) = error {
                return Err(error);
            }
        }
        Ok(())
    }

    fn malformed(&self, rule: &GrammarRule, reason: &'static str) -> GrammarError {
        GrammarError::MalformedGrammar {
            rule: rule.id,
            name: self.tag_name(rule.id).to_owned(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{error::GrammarError, parse::parse};

    #[test]
    fn valid() {
        let grammar = parse(r#"<a> ::= <b> {<b>}* ; <b> := "b" ;"#).unwrap();
        assert_eq!(grammar.validate(), Ok(()));
    }

    #[test]
    fn dangling_reference() {
        let grammar = parse(r#"<a> ::= "x" {<b>}? ;"#).unwrap();
        let err = grammar.validate().unwrap_err();
        assert_eq!(
            err,
            GrammarError::DanglingReference {
                rule: grammar.tag_id("a").unwrap(),
                name: "a".to_owned(),
                target: grammar.tag_id("b").unwrap(),
                target_name: "b".to_owned(),
            }
        );
        assert_eq!(
            err.to_string(),
            "rule <a> (#0) references <b> (#1) which has no rule"
        );
    }

    #[test]
    fn empty_group() {
        let grammar = parse(r#"<a> ::= "x" {}+ ;"#).unwrap();
        assert!(matches!(
            grammar.validate(),
            Err(GrammarError::MalformedGrammar {
                reason: "group has no children",
                ..
            })
        ));
    }
}
