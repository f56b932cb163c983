//! Builders for chained contextual and reverse chaining subtables.
//!
//! Every contextual rule gets a subtable of its own, in format 3 (a coverage
//! table per position).

use std::collections::BTreeMap;

use crate::{
    common::{GlyphClass, GlyphId16},
    compile::tables::{
        gsub::ReverseChainSingleSubst,
        layout::{ChainContextFormat3, CoverageTable},
        Subtable,
    },
    model::{ChainContext, Rule, RuleBody},
};

use super::{Fit, PackCtx, SubtableBuilder};

/// The parts of a reverse chaining rule.
#[derive(Clone, Debug)]
pub(crate) struct ReverseChain {
    backtrack: Vec<GlyphClass>,
    substitutions: Vec<(GlyphId16, GlyphId16)>,
    lookahead: Vec<GlyphClass>,
}

pub(crate) fn chain_items(rules: &[Rule]) -> Vec<(ChainContext, bool)> {
    rules
        .iter()
        .filter_map(|rule| match &rule.body {
            RuleBody::ChainContextSub(context) | RuleBody::ChainContextPos(context) => {
                Some((context.clone(), rule.subtable_break))
            }
            _ => None,
        })
        .collect()
}

pub(crate) fn reverse_items(rules: &[Rule]) -> Vec<(ReverseChain, bool)> {
    rules
        .iter()
        .filter_map(|rule| match &rule.body {
            RuleBody::ReverseChainSub {
                backtrack,
                substitutions,
                lookahead,
            } => Some((
                ReverseChain {
                    backtrack: backtrack.clone(),
                    substitutions: substitutions.clone(),
                    lookahead: lookahead.clone(),
                },
                rule.subtable_break,
            )),
            _ => None,
        })
        .collect()
}

fn coverages<'a>(classes: impl Iterator<Item = &'a GlyphClass>) -> Vec<CoverageTable> {
    classes.map(|cls| cls.iter().collect()).collect()
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ChainContextBuilder {
    rule: Option<ChainContext>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ReverseChainBuilder {
    rule: Option<ReverseChain>,
}

impl SubtableBuilder for ChainContextBuilder {
    type Item = ChainContext;

    fn fit(&self, _: &Self::Item) -> Fit {
        Fit::Incompatible
    }

    fn add(&mut self, item: Self::Item) {
        self.rule = Some(item);
    }

    fn is_empty(&self) -> bool {
        self.rule.is_none()
    }

    fn build(self, ctx: &PackCtx) -> Subtable {
        let context = self.rule.unwrap_or_default();
        // a reference to a lookup in the other table has already been reported
        let lookup_records = context
            .input
            .iter()
            .enumerate()
            .flat_map(|(i, input)| {
                input
                    .lookups
                    .iter()
                    .filter_map(move |id| ctx.lookup_indices.get(id).map(|idx| (i as u16, *idx)))
            })
            .collect();
        Subtable::ChainContext(ChainContextFormat3 {
            backtrack: coverages(context.backtrack.iter().rev()),
            input: coverages(context.input.iter().map(|input| &input.glyphs)),
            lookahead: coverages(context.lookahead.iter()),
            lookup_records,
        })
    }
}

impl SubtableBuilder for ReverseChainBuilder {
    type Item = ReverseChain;

    fn fit(&self, _: &Self::Item) -> Fit {
        Fit::Incompatible
    }

    fn add(&mut self, item: Self::Item) {
        self.rule = Some(item);
    }

    fn is_empty(&self) -> bool {
        self.rule.is_none()
    }

    fn build(self, _ctx: &PackCtx) -> Subtable {
        let Some(rule) = self.rule else {
            return Subtable::ReverseChainSub(Default::default());
        };
        let mut mapping = BTreeMap::new();
        for (target, replacement) in rule.substitutions {
            mapping.entry(target).or_insert(replacement);
        }
        Subtable::ReverseChainSub(ReverseChainSingleSubst {
            backtrack: coverages(rule.backtrack.iter().rev()),
            lookahead: coverages(rule.lookahead.iter()),
            mapping,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        compile::location::LookupLocation,
        model::{ContextInput, LayoutRules, Lookup, LookupKind},
    };

    fn class(ids: &[u16]) -> GlyphClass {
        ids.iter().copied().map(GlyphId16::new).collect()
    }

    fn coverage(ids: &[u16]) -> CoverageTable {
        ids.iter().copied().map(GlyphId16::new).collect()
    }

    #[test]
    fn backtrack_is_reversed_and_records_follow_input() {
        let mut rules = LayoutRules::new("Test");
        let one = rules.add_lookup(Lookup::new(LookupKind::SingleSub));
        let two = rules.add_lookup(Lookup::new(LookupKind::SingleSub));
        let context = ChainContext {
            backtrack: vec![class(&[1]), class(&[2])],
            input: vec![
                ContextInput {
                    glyphs: class(&[3, 4]),
                    lookups: vec![two],
                },
                ContextInput {
                    glyphs: class(&[5]),
                    lookups: vec![one, two],
                },
            ],
            lookahead: vec![class(&[6])],
        };
        let indices = HashMap::from([(one, 0u16), (two, 1)]);
        let location = LookupLocation::default();
        let ctx = PackCtx {
            budget: usize::MAX,
            marks: None,
            lookup_indices: &indices,
            location: &location,
        };
        let mut builder = ChainContextBuilder::default();
        builder.add(context);
        let Subtable::ChainContext(table) = builder.build(&ctx) else {
            panic!("wrong subtable type");
        };
        assert_eq!(table.backtrack, vec![coverage(&[2]), coverage(&[1])]);
        assert_eq!(table.input, vec![coverage(&[3, 4]), coverage(&[5])]);
        assert_eq!(table.lookahead, vec![coverage(&[6])]);
        assert_eq!(table.lookup_records, vec![(0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn one_rule_per_subtable() {
        let builder = ReverseChainBuilder::default();
        assert!(builder.is_empty());
        let rule = ReverseChain {
            backtrack: vec![class(&[1]), class(&[2])],
            substitutions: vec![(GlyphId16::new(3), GlyphId16::new(4))],
            lookahead: Vec::new(),
        };
        let mut builder = builder;
        assert_eq!(builder.fit(&rule), Fit::Incompatible);
        builder.add(rule);
        let subtable = crate::compile::pack::with_test_ctx(|ctx| builder.build(ctx));
        let Subtable::ReverseChainSub(table) = subtable else {
            panic!("wrong subtable type");
        };
        assert_eq!(table.backtrack, vec![coverage(&[2]), coverage(&[1])]);
    }
}
