//! Builders for the GSUB subtables without context.

use std::collections::{BTreeMap, HashSet};

use crate::{
    common::GlyphId16,
    compile::tables::{
        gsub::{AlternateSubst, LigatureSubst, MultipleSubst, SingleSubst},
        layout::CoverageTable,
        Subtable,
    },
    model::{Rule, RuleBody},
};

use super::{Fit, PackCtx, SubtableBuilder};

pub(crate) fn single_items(rules: &[Rule]) -> Vec<((GlyphId16, GlyphId16), bool)> {
    rules
        .iter()
        .filter_map(|rule| match &rule.body {
            RuleBody::SingleSub {
                target,
                replacement,
            } => Some(((*target, *replacement), rule.subtable_break)),
            _ => None,
        })
        .collect()
}

pub(crate) fn sequence_items(rules: &[Rule]) -> Vec<((GlyphId16, Vec<GlyphId16>), bool)> {
    rules
        .iter()
        .filter_map(|rule| match &rule.body {
            RuleBody::MultipleSub {
                target,
                replacement: glyphs,
            }
            | RuleBody::AlternateSub {
                target,
                alternates: glyphs,
            } => Some(((*target, glyphs.clone()), rule.subtable_break)),
            _ => None,
        })
        .collect()
}

pub(crate) fn ligature_items(rules: &[Rule]) -> Vec<((Vec<GlyphId16>, GlyphId16), bool)> {
    rules
        .iter()
        .filter_map(|rule| match &rule.body {
            RuleBody::LigatureSub {
                components,
                replacement,
            } if !components.is_empty() => {
                Some(((components.clone(), *replacement), rule.subtable_break))
            }
            _ => None,
        })
        .collect()
}

#[derive(Clone, Debug, Default)]
pub(crate) struct SingleSubBuilder {
    mapping: BTreeMap<GlyphId16, GlyphId16>,
}

impl SingleSubBuilder {
    // format 2 is the larger of the two formats
    fn size_with(n_glyphs: usize) -> usize {
        6 + 2 * n_glyphs + CoverageTable::size_bound(n_glyphs)
    }
}

impl SubtableBuilder for SingleSubBuilder {
    type Item = (GlyphId16, GlyphId16);

    fn fit(&self, (target, _): &Self::Item) -> Fit {
        let added = usize::from(!self.mapping.contains_key(target));
        Fit::Size(Self::size_with(self.mapping.len() + added))
    }

    fn add(&mut self, (target, replacement): Self::Item) {
        self.mapping.entry(target).or_insert(replacement);
    }

    fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    fn build(self, _ctx: &PackCtx) -> Subtable {
        Subtable::SingleSub(self.mapping.into_iter().collect::<SingleSubst>())
    }
}

/// Multiple and alternate substitution share a layout.
#[derive(Clone, Debug, Default)]
pub(crate) struct SequenceSubBuilder {
    alternate: bool,
    mapping: BTreeMap<GlyphId16, Vec<GlyphId16>>,
    n_output_glyphs: usize,
}

impl SequenceSubBuilder {
    pub(crate) fn multiple() -> Self {
        SequenceSubBuilder::default()
    }

    pub(crate) fn alternate() -> Self {
        SequenceSubBuilder {
            alternate: true,
            ..Default::default()
        }
    }

    fn size_with(n_targets: usize, n_output_glyphs: usize) -> usize {
        // header, offsets, coverage, and a counted array per target
        6 + 2 * n_targets
            + CoverageTable::size_bound(n_targets)
            + 2 * n_targets
            + 2 * n_output_glyphs
    }
}

impl SubtableBuilder for SequenceSubBuilder {
    type Item = (GlyphId16, Vec<GlyphId16>);

    fn fit(&self, (target, glyphs): &Self::Item) -> Fit {
        if self.mapping.contains_key(target) {
            return Fit::Size(Self::size_with(self.mapping.len(), self.n_output_glyphs));
        }
        Fit::Size(Self::size_with(
            self.mapping.len() + 1,
            self.n_output_glyphs + glyphs.len(),
        ))
    }

    fn add(&mut self, (target, glyphs): Self::Item) {
        if let std::collections::btree_map::Entry::Vacant(entry) = self.mapping.entry(target) {
            self.n_output_glyphs += glyphs.len();
            entry.insert(glyphs);
        }
    }

    fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    fn build(self, _ctx: &PackCtx) -> Subtable {
        if self.alternate {
            Subtable::AlternateSub(self.mapping.into_iter().collect::<AlternateSubst>())
        } else {
            Subtable::MultipleSub(self.mapping.into_iter().collect::<MultipleSubst>())
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct LigatureSubBuilder {
    table: LigatureSubst,
    first_glyphs: HashSet<GlyphId16>,
    n_ligatures: usize,
    // components after the first, summed over all ligatures
    n_trailing: usize,
}

impl LigatureSubBuilder {
    fn size_with(n_sets: usize, n_ligatures: usize, n_trailing: usize) -> usize {
        6 + 2 * n_sets
            + CoverageTable::size_bound(n_sets)
            + 2 * n_sets
            + 2 * n_ligatures
            + 4 * n_ligatures
            + 2 * n_trailing
    }
}

impl SubtableBuilder for LigatureSubBuilder {
    type Item = (Vec<GlyphId16>, GlyphId16);

    fn fit(&self, (components, _): &Self::Item) -> Fit {
        let new_set = components
            .first()
            .map(|first| !self.first_glyphs.contains(first))
            .unwrap_or_default();
        Fit::Size(Self::size_with(
            self.first_glyphs.len() + usize::from(new_set),
            self.n_ligatures + 1,
            self.n_trailing + components.len().saturating_sub(1),
        ))
    }

    fn add(&mut self, (components, glyph): Self::Item) {
        let Some(first) = components.first() else {
            return;
        };
        self.first_glyphs.insert(*first);
        self.n_ligatures += 1;
        self.n_trailing += components.len() - 1;
        self.table.insert(&components, glyph);
    }

    fn is_empty(&self) -> bool {
        self.n_ligatures == 0
    }

    fn build(self, _ctx: &PackCtx) -> Subtable {
        Subtable::LigatureSub(self.table)
    }
}

#[cfg(test)]
mod tests {
    use more_asserts::assert_le;

    use super::*;
    use crate::{compile::pack::with_test_ctx, write::dump_table};

    fn gid(id: u16) -> GlyphId16 {
        GlyphId16::new(id)
    }

    // the estimate never undercounts the encoded size
    fn check_bound<B: SubtableBuilder>(mut builder: B, items: Vec<B::Item>) {
        let mut estimate = 0;
        for item in items {
            if let Fit::Size(size) = builder.fit(&item) {
                estimate = size;
            }
            builder.add(item);
        }
        let subtable = with_test_ctx(|ctx| builder.build(ctx));
        let bytes = dump_table(&subtable).unwrap();
        assert_le!(bytes.len(), estimate);
    }

    #[test]
    fn single_bound() {
        let items = (0..40).map(|i| (gid(i * 3), gid(i + 500))).collect();
        check_bound(SingleSubBuilder::default(), items);
    }

    #[test]
    fn sequence_bound() {
        let items = (0..20)
            .map(|i| (gid(i), vec![gid(i + 1); (i % 4) as usize + 1]))
            .collect();
        check_bound(SequenceSubBuilder::multiple(), items);
    }

    #[test]
    fn ligature_bound() {
        let items = (0..30)
            .map(|i| {
                let components = (0..(i % 3 + 2)).map(|j| gid(i % 7 + j)).collect();
                (components, gid(1000 + i))
            })
            .collect();
        check_bound(LigatureSubBuilder::default(), items);
    }

    #[test]
    fn alternate_builds_alternate_subtable() {
        let mut builder = SequenceSubBuilder::alternate();
        builder.add((gid(1), vec![gid(2), gid(3)]));
        let subtable = with_test_ctx(|ctx| builder.build(ctx));
        assert!(matches!(subtable, Subtable::AlternateSub(_)));
    }
}
