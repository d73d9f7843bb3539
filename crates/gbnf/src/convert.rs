use cranelift_entity::{EntityRef, PrimaryMap};

use crate::{
    error::GrammarError,
    grammar::{push_tag, Grammar, GrammarRule, NonTerminal, TagId},
    token::{GrammarOption, GrammarToken, GroupKind},
};

#[derive(Clone, Copy, Debug)]
pub struct ConvertOptions {
    /// Place the self reference of repetition rules at the end of the option
    /// (`T ::= body <T>`) instead of at the start (`T ::= <T> body`).
    pub prefer_right_recursion: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            prefer_right_recursion: true,
        }
    }
}

/// Rewrites every rule so that no group remains, synthesizing new rules for
/// the group bodies. Synthesized rules are added after all existing rules
/// have been scanned. On error the grammar is left untouched.
pub fn convert_to_bnf(grammar: &mut Grammar, options: &ConvertOptions) -> Result<(), GrammarError> {
    let mut converted = grammar.clone();
    convert_in_place(&mut converted, options)?;
    *grammar = converted;
    Ok(())
}

fn convert_in_place(grammar: &mut Grammar, options: &ConvertOptions) -> Result<(), GrammarError> {
    let ids: Vec<TagId> = grammar.rules().map(|r| r.id).collect();

    let mut cx = ConvertCx {
        tags: &mut grammar.tags,
        created: Vec::new(),
        prefer_right: options.prefer_right_recursion,
    };

    for id in ids {
        let Some(mut rule) = grammar.rules[id].take() else {
            continue;
        };
        let result = cx.convert_rule(&mut rule);
        grammar.rules[id] = Some(rule);
        result?;
    }

    let created = std::mem::take(&mut cx.created);
    for rule in created {
        let id = rule.id;
        grammar.rules[id] = Some(rule);
    }

    Ok(())
}

struct ConvertCx<'a> {
    tags: &'a mut PrimaryMap<TagId, NonTerminal>,
    created: Vec<GrammarRule>,
    prefer_right: bool,
}

impl ConvertCx<'_> {
    fn malformed(&self, rule: TagId, reason: &'static str) -> GrammarError {
        let name = match self.tags.get(rule) {
            Some(tag) => tag.name.clone(),
            None => "?".to_owned(),
        };
        GrammarError::MalformedGrammar { rule, name, reason }
    }

    fn new_tag(&mut self) -> TagId {
        let mut n = self.tags.next_key().index();
        let name = loop {
            let name = format!("__bnf_{n}");
            if !self.tags.values().any(|t| t.name == name) {
                break name;
            }
            n += 1;
        };
        push_tag(self.tags, name, true)
    }

    fn finish(&mut self, rule: GrammarRule) {
        log::debug!(
            "synthesized <{}> with {} options",
            self.tags[rule.id].name,
            rule.options.len()
        );
        self.created.push(rule);
    }

    fn convert_rule(&mut self, rule: &mut GrammarRule) -> Result<(), GrammarError> {
        if rule.options.is_empty() {
            return Err(self.malformed(rule.id, "rule has no options"));
        }

        let mut i = 0;
        while i < rule.options.len() {
            let mut nullable = Vec::new();
            for (j, child) in rule.options[i].children.iter_mut().enumerate() {
                let GrammarToken::Group { kind, children } = child else {
                    continue;
                };
                let kind = *kind;
                let children = std::mem::take(children);
                *child = self.replace_group(rule.id, kind, children)?;
                if kind.matches_empty() {
                    nullable.push(j);
                }
            }

            // every nullable element may be left out, the variants go to the end of the rule
            let mut variants = vec![rule.options[i].clone()];
            for &j in nullable.iter().rev() {
                for k in 0..variants.len() {
                    let mut skipped = variants[k].clone();
                    skipped.children.remove(j);
                    variants.push(skipped);
                }
            }
            rule.options.extend(variants.into_iter().skip(1));

            i += 1;
        }

        Ok(())
    }

    fn replace_group(
        &mut self,
        owner: TagId,
        kind: GroupKind,
        mut children: Vec<GrammarToken>,
    ) -> Result<GrammarToken, GrammarError> {
        if children.is_empty() {
            return Err(self.malformed(owner, "group has no children"));
        }

        if !kind.is_repeat() && children.len() == 1 && children[0].is_leaf() {
            if let Some(leaf) = children.pop() {
                return Ok(leaf);
            }
        }

        let id = self.new_tag();
        let mut rule = GrammarRule::new(id, vec![GrammarOption::new(children)]);
        self.convert_rule(&mut rule)?;

        if kind.is_repeat() {
            if rule.options.len() > 1 {
                let body_id = self.new_tag();
                let reference = GrammarOption::new(vec![GrammarToken::TagRef(body_id)]);
                let body = std::mem::replace(&mut rule.options, vec![reference]);
                self.finish(GrammarRule::new(body_id, body));
            }

            let base = rule.options[0].clone();
            let recursive = &mut rule.options[0].children;
            if self.prefer_right {
                recursive.push(GrammarToken::TagRef(id));
            } else {
                recursive.insert(0, GrammarToken::TagRef(id));
            }
            rule.options.push(base);
        }

        self.finish(rule);
        Ok(GrammarToken::TagRef(id))
    }
}
