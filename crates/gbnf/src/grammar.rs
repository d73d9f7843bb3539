use std::collections::BTreeMap;

use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};

use crate::token::{GrammarOption, GrammarToken};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TagId(u32);

entity_impl! { TagId }

impl std::fmt::Display for TagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl TagId {
    pub fn name(self, grammar: &Grammar) -> &str {
        grammar.tag_name(self)
    }
}

/// A named grammar symbol, also known as the tag.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NonTerminal {
    pub id: TagId,
    pub name: String,
    /// Created by the BNF conversion rather than written by the user.
    pub synthetic: bool,
}

/// Definition of a single non-terminal. Options are alternatives.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GrammarRule {
    pub id: TagId,
    pub options: Vec<GrammarOption>,
}

impl GrammarRule {
    pub fn new(id: TagId, options: Vec<GrammarOption>) -> GrammarRule {
        GrammarRule { id, options }
    }
    /// The rule consists of exactly one option holding exactly one literal.
    pub fn single_literal(&self) -> Option<&str> {
        match self.options.as_slice() {
            [option] => match option.children.as_slice() {
                [GrammarToken::Literal(pattern)] => Some(pattern.as_str()),
                _ => None,
            },
            _ => None,
        }
    }
    pub fn contains_groups(&self) -> bool {
        self.options
            .iter()
            .flat_map(|o| o.children.iter())
            .any(GrammarToken::is_group)
    }
}

#[derive(Clone, Debug)]
pub struct Grammar {
    pub(crate) tags: PrimaryMap<TagId, NonTerminal>,
    pub(crate) rules: SecondaryMap<TagId, Option<GrammarRule>>,
    params: BTreeMap<String, String>,
    start: Option<TagId>,
}

impl Default for Grammar {
    fn default() -> Self {
        Grammar::new()
    }
}

impl Grammar {
    pub fn new() -> Grammar {
        Grammar {
            tags: PrimaryMap::new(),
            rules: SecondaryMap::new(),
            params: BTreeMap::new(),
            start: None,
        }
    }

    pub(crate) fn push_tag(&mut self, name: String, synthetic: bool) -> TagId {
        push_tag(&mut self.tags, name, synthetic)
    }

    /// Returns the id of the tag with this name, inserting it into the tag table if needed.
    pub fn intern_tag(&mut self, name: &str) -> TagId {
        match self.tag_id(name) {
            Some(id) => id,
            None => self.push_tag(name.to_owned(), false),
        }
    }

    pub fn tag_id(&self, name: &str) -> Option<TagId> {
        self.tags
            .iter()
            .find(|(_, tag)| tag.name == name)
            .map(|(id, _)| id)
    }

    pub fn tag(&self, id: TagId) -> Option<&NonTerminal> {
        self.tags.get(id)
    }

    pub fn tag_name(&self, id: TagId) -> &str {
        match self.tags.get(id) {
            Some(tag) => &tag.name,
            None => "?",
        }
    }

    pub fn tags(&self) -> impl Iterator<Item = &NonTerminal> + '_ {
        self.tags.values()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Inserts a rule, returning the rule previously defining the same tag.
    pub fn add_rule(&mut self, rule: GrammarRule) -> Option<GrammarRule> {
        let id = rule.id;
        std::mem::replace(&mut self.rules[id], Some(rule))
    }

    pub fn remove_rule(&mut self, id: TagId) -> Option<GrammarRule> {
        match self.rules.get(id) {
            Some(Some(_)) => self.rules[id].take(),
            _ => None,
        }
    }

    pub fn rule(&self, id: TagId) -> Option<&GrammarRule> {
        self.rules.get(id)?.as_ref()
    }

    pub fn rule_mut(&mut self, id: TagId) -> Option<&mut GrammarRule> {
        match self.rules.get(id) {
            Some(Some(_)) => self.rules[id].as_mut(),
            _ => None,
        }
    }

    /// Iterates the defined rules in id order.
    pub fn rules(&self) -> Rules<'_> {
        Rules {
            inner: self.rules.iter(),
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules().count()
    }

    pub fn option_count(&self) -> usize {
        self.rules().map(|r| r.options.len()).sum()
    }

    /// Whether any EBNF group is still present anywhere in the rule table.
    pub fn contains_groups(&self) -> bool {
        self.rules().any(GrammarRule::contains_groups)
    }

    pub fn start(&self) -> Option<TagId> {
        self.start
    }

    pub fn set_start(&mut self, id: TagId) {
        self.start = Some(id);
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the previous value of the parameter.
    pub fn set_param(&mut self, key: &str, value: &str) -> Option<String> {
        self.params.insert(key.to_owned(), value.to_owned())
    }

    pub fn remove_param(&mut self, key: &str) -> Option<String> {
        self.params.remove(key)
    }
}

pub(crate) fn push_tag(
    tags: &mut PrimaryMap<TagId, NonTerminal>,
    name: String,
    synthetic: bool,
) -> TagId {
    let id = tags.next_key();
    tags.push(NonTerminal {
        id,
        name,
        synthetic,
    })
}

pub struct Rules<'a> {
    inner: cranelift_entity::Iter<'a, TagId, Option<GrammarRule>>,
}

impl<'a> Iterator for Rules<'a> {
    type Item = &'a GrammarRule;
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (_, next) = self.inner.next()?;
            match next {
                Some(a) => return Some(a),
                None => continue,
            }
        }
    }
}
