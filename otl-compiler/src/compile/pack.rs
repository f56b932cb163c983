//! Partitioning a lookup's rules into subtables.
//!
//! Packing is greedy and in rule order. Each subtable builder keeps a running,
//! conservative estimate of the encoded size of its subtable (the subtable and
//! every table it references); a new subtable is started when the next rule
//! would take that estimate over the budget, when the rule follows an explicit
//! subtable break, or when the rule cannot share a subtable with the rules
//! already in it.

use std::collections::HashMap;

use crate::{
    diagnostic::Reporter,
    model::{LookupId, LookupKind, Rule},
};

use super::{location::LookupLocation, tables::Subtable, validate::MarkSet};

mod contextual;
mod gpos_builders;
mod gsub_builders;

/// Everything the builders need besides the rules.
pub(crate) struct PackCtx<'a> {
    /// The size above which a new subtable is started.
    pub(crate) budget: usize,
    /// The mark classes of a mark attachment lookup
    pub(crate) marks: Option<&'a MarkSet>,
    /// Lookup indices in the table being built, for contextual rules.
    pub(crate) lookup_indices: &'a HashMap<LookupId, u16>,
    pub(crate) location: &'a LookupLocation,
}

/// Whether an item can join the current subtable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Fit {
    /// It can, and the estimated size would then be this.
    Size(usize),
    /// The item needs a different subtable format.
    Incompatible,
    /// The item's glyph classes overlap classes already in the subtable.
    Overlap,
}

/// Accumulates the items of a single subtable.
pub(crate) trait SubtableBuilder {
    /// The unit of packing; usually a rule.
    type Item;

    /// Whether `item` can be added, and at what cost.
    fn fit(&self, item: &Self::Item) -> Fit;

    fn add(&mut self, item: Self::Item);

    fn is_empty(&self) -> bool;

    fn build(self, ctx: &PackCtx) -> Subtable;
}

/// Partition the (resolved, validated) rules of a lookup into subtables.
pub(crate) fn pack_lookup(
    kind: LookupKind,
    rules: &[Rule],
    ctx: &PackCtx,
    reporter: &mut Reporter,
) -> Vec<Subtable> {
    let subtables = match kind {
        LookupKind::SingleSub => pack(
            gsub_builders::single_items(rules),
            ctx,
            reporter,
            gsub_builders::SingleSubBuilder::default,
        ),
        LookupKind::MultipleSub => pack(
            gsub_builders::sequence_items(rules),
            ctx,
            reporter,
            gsub_builders::SequenceSubBuilder::multiple,
        ),
        LookupKind::AlternateSub => pack(
            gsub_builders::sequence_items(rules),
            ctx,
            reporter,
            gsub_builders::SequenceSubBuilder::alternate,
        ),
        LookupKind::LigatureSub => pack(
            gsub_builders::ligature_items(rules),
            ctx,
            reporter,
            gsub_builders::LigatureSubBuilder::default,
        ),
        LookupKind::ChainContextSub | LookupKind::ChainContextPos => pack(
            contextual::chain_items(rules),
            ctx,
            reporter,
            contextual::ChainContextBuilder::default,
        ),
        LookupKind::ReverseChainSub => pack(
            contextual::reverse_items(rules),
            ctx,
            reporter,
            contextual::ReverseChainBuilder::default,
        ),
        LookupKind::SinglePos => pack(
            gpos_builders::single_items(rules),
            ctx,
            reporter,
            gpos_builders::SinglePosBuilder::default,
        ),
        LookupKind::PairPos => pack(
            gpos_builders::pair_items(rules),
            ctx,
            reporter,
            gpos_builders::PairPosBuilder::default,
        ),
        LookupKind::CursivePos => pack(
            gpos_builders::cursive_items(rules),
            ctx,
            reporter,
            gpos_builders::CursivePosBuilder::default,
        ),
        LookupKind::MarkToBase | LookupKind::MarkToMark => {
            let marks = ctx.marks.cloned().unwrap_or_default();
            let mark_to_mark = kind == LookupKind::MarkToMark;
            pack(
                gpos_builders::base_items(rules, &marks),
                ctx,
                reporter,
                || gpos_builders::MarkBaseBuilder::new(&marks, mark_to_mark),
            )
        }
        LookupKind::MarkToLig => {
            let marks = ctx.marks.cloned().unwrap_or_default();
            pack(
                gpos_builders::ligature_items(rules, &marks),
                ctx,
                reporter,
                || gpos_builders::MarkLigBuilder::new(&marks),
            )
        }
    };
    log::debug!(
        "packed {} rules {} into {} subtables",
        rules.len(),
        ctx.location,
        subtables.len()
    );
    subtables
}

/// The greedy packing loop.
///
/// Each item is paired with a flag that is `true` if it follows an explicit
/// subtable break.
fn pack<B, F>(
    items: Vec<(B::Item, bool)>,
    ctx: &PackCtx,
    reporter: &mut Reporter,
    make_builder: F,
) -> Vec<Subtable>
where
    B: SubtableBuilder,
    F: Fn() -> B,
{
    let mut subtables = Vec::new();
    let mut current = make_builder();
    for (item, subtable_break) in items {
        if !current.is_empty() {
            let split = subtable_break
                || match current.fit(&item) {
                    Fit::Size(size) => {
                        let split = size > ctx.budget;
                        if split {
                            log::trace!("subtable {} full at ~{size} bytes", subtables.len());
                        }
                        split
                    }
                    Fit::Incompatible => true,
                    Fit::Overlap => {
                        reporter.warning(
                            &ctx.location.site(),
                            format!(
                                "Pair positioning {}: forced new subtable by overlapping glyph classes; some pairs may never be accessed",
                                ctx.location
                            ),
                        );
                        true
                    }
                };
            if split {
                let full = std::mem::replace(&mut current, make_builder());
                subtables.push(full.build(ctx));
            }
        }
        current.add(item);
    }
    if !current.is_empty() {
        subtables.push(current.build(ctx));
    }
    subtables
}

/// Run `f` with a context that has no budget and no marks.
#[cfg(test)]
pub(crate) fn with_test_ctx<R>(f: impl FnOnce(&PackCtx) -> R) -> R {
    let location = LookupLocation::default();
    let lookup_indices = HashMap::new();
    f(&PackCtx {
        budget: usize::MAX,
        marks: None,
        lookup_indices: &lookup_indices,
        location: &location,
    })
}
