//! Builders for GPOS subtables.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;

use crate::{
    common::{GlyphClass, GlyphId16},
    compile::{
        tables::{
            gpos::{
                anchor_size, value_record_size, CursivePos, MarkBasePos, MarkLigPos,
                MarkRecords, PairPos, PairPosFormat1, PairPosFormat2, SinglePos,
            },
            layout::{ClassDefBuilder, CoverageTable},
            Subtable,
        },
        validate::MarkSet,
    },
    model::{Anchor, MarkAnchors, Rule, RuleBody, ValueRecord},
};

use super::{Fit, PackCtx, SubtableBuilder};

/// A pair positioning rule, split by format.
#[derive(Clone, Debug)]
pub(crate) enum PairItem {
    Glyph(GlyphId16, GlyphId16, ValueRecord, ValueRecord),
    Class(GlyphClass, GlyphClass, ValueRecord, ValueRecord),
}

/// A base (or base mark) glyph with an anchor per mark class.
pub(crate) type BaseRecord = (GlyphId16, Vec<Option<Anchor>>);

/// A ligature glyph with, per component, an anchor per mark class.
pub(crate) type LigatureRecord = (GlyphId16, Vec<Vec<Option<Anchor>>>);

pub(crate) fn single_items(rules: &[Rule]) -> Vec<((GlyphId16, ValueRecord), bool)> {
    rules
        .iter()
        .filter_map(|rule| match &rule.body {
            RuleBody::SinglePos { glyph, value } => Some(((*glyph, *value), rule.subtable_break)),
            _ => None,
        })
        .collect()
}

pub(crate) fn pair_items(rules: &[Rule]) -> Vec<(PairItem, bool)> {
    rules
        .iter()
        .filter_map(|rule| {
            let RuleBody::PairPos {
                first,
                value1,
                second,
                value2,
            } = &rule.body
            else {
                return None;
            };
            let item = if first.is_class() || second.is_class() {
                PairItem::Class(first.to_class(), second.to_class(), *value1, *value2)
            } else {
                let first = first.iter().next()?;
                let second = second.iter().next()?;
                PairItem::Glyph(first, second, *value1, *value2)
            };
            Some((item, rule.subtable_break))
        })
        .collect()
}

pub(crate) fn cursive_items(
    rules: &[Rule],
) -> Vec<((GlyphId16, Option<Anchor>, Option<Anchor>), bool)> {
    rules
        .iter()
        .filter_map(|rule| match &rule.body {
            RuleBody::CursivePos { glyph, entry, exit } => {
                Some(((*glyph, *entry, *exit), rule.subtable_break))
            }
            _ => None,
        })
        .collect()
}

/// Group mark-to-base (or mark-to-mark) rules by base glyph.
///
/// Bases are in order of first appearance; the first anchor given for a
/// (base, class) wins, and a class with no anchor gets (0, 0).
pub(crate) fn base_items(rules: &[Rule], marks: &MarkSet) -> Vec<(BaseRecord, bool)> {
    let n_classes = marks.class_count() as usize;
    let mut records: IndexMap<GlyphId16, (Vec<Option<Anchor>>, bool)> = IndexMap::new();
    let mut pending_break = false;
    for rule in rules {
        let (bases, anchors) = match &rule.body {
            RuleBody::MarkToBase {
                base,
                marks: anchors,
            } => (base, anchors),
            RuleBody::MarkToMark {
                base_mark,
                marks: anchors,
            } => (base_mark, anchors),
            _ => continue,
        };
        pending_break |= rule.subtable_break;
        for gid in bases.iter() {
            let (row, _) = records.entry(gid).or_insert_with(|| {
                (
                    vec![None; n_classes],
                    std::mem::take(&mut pending_break),
                )
            });
            fill_row(row, anchors, marks);
        }
    }
    records
        .into_iter()
        .map(|(gid, (row, subtable_break))| {
            let row = row
                .into_iter()
                .map(|anchor| Some(anchor.unwrap_or_default()))
                .collect();
            ((gid, row), subtable_break)
        })
        .collect()
}

/// Group mark-to-ligature rules by ligature glyph.
///
/// A (component, class) with no anchor is left empty.
pub(crate) fn ligature_items(rules: &[Rule], marks: &MarkSet) -> Vec<(LigatureRecord, bool)> {
    let n_classes = marks.class_count() as usize;
    let mut records: IndexMap<GlyphId16, (Vec<Vec<Option<Anchor>>>, bool)> = IndexMap::new();
    let mut pending_break = false;
    for rule in rules {
        let RuleBody::MarkToLig {
            ligature,
            components,
        } = &rule.body
        else {
            continue;
        };
        pending_break |= rule.subtable_break;
        for gid in ligature.iter() {
            let (rows, _) = records
                .entry(gid)
                .or_insert_with(|| (Vec::new(), std::mem::take(&mut pending_break)));
            if rows.len() < components.len() {
                rows.resize(components.len(), vec![None; n_classes]);
            }
            for (row, anchors) in rows.iter_mut().zip(components) {
                fill_row(row, anchors, marks);
            }
        }
    }
    records
        .into_iter()
        .map(|(gid, (rows, subtable_break))| ((gid, rows), subtable_break))
        .collect()
}

fn fill_row(row: &mut [Option<Anchor>], anchors: &MarkAnchors, marks: &MarkSet) {
    for (class, anchor) in anchors {
        if let Some(slot) = marks
            .class_id(class)
            .and_then(|id| row.get_mut(id as usize))
        {
            slot.get_or_insert(*anchor);
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct SinglePosBuilder {
    items: BTreeMap<GlyphId16, ValueRecord>,
    value_format: u16,
}

impl SubtableBuilder for SinglePosBuilder {
    type Item = (GlyphId16, ValueRecord);

    fn fit(&self, (glyph, value): &Self::Item) -> Fit {
        let n_glyphs = self.items.len() + usize::from(!self.items.contains_key(glyph));
        let value_size = value_record_size(self.value_format | value.format());
        Fit::Size(8 + n_glyphs * value_size + CoverageTable::size_bound(n_glyphs))
    }

    fn add(&mut self, (glyph, value): Self::Item) {
        self.value_format |= value.format();
        self.items.entry(glyph).or_insert(value);
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn build(self, _ctx: &PackCtx) -> Subtable {
        Subtable::SinglePos(self.items.into_iter().collect::<SinglePos>())
    }
}

/// Specific pairs and class pairs always go in separate subtables.
#[derive(Clone, Debug, Default)]
pub(crate) enum PairPosBuilder {
    #[default]
    Empty,
    Glyph(GlyphPairBuilder),
    Class(ClassPairBuilder),
}

#[derive(Clone, Debug, Default)]
pub(crate) struct GlyphPairBuilder {
    table: PairPosFormat1,
    first_glyphs: HashSet<GlyphId16>,
    pairs: HashSet<(GlyphId16, GlyphId16)>,
    value_formats: (u16, u16),
}

#[derive(Clone, Debug)]
pub(crate) struct ClassPairBuilder {
    pairs: Vec<(GlyphClass, GlyphClass, ValueRecord, ValueRecord)>,
    classdef_1: ClassDefBuilder,
    classdef_2: ClassDefBuilder,
    n_first_glyphs: usize,
    value_formats: (u16, u16),
}

impl GlyphPairBuilder {
    fn fit(&self, first: GlyphId16, second: GlyphId16, val1: &ValueRecord, val2: &ValueRecord) -> Fit {
        let n_firsts = self.first_glyphs.len() + usize::from(!self.first_glyphs.contains(&first));
        let n_pairs = self.pairs.len() + usize::from(!self.pairs.contains(&(first, second)));
        let record_size = 2
            + value_record_size(self.value_formats.0 | val1.format())
            + value_record_size(self.value_formats.1 | val2.format());
        // header, pair set offsets, coverage, pair set counts, records
        Fit::Size(
            10 + 2 * n_firsts
                + CoverageTable::size_bound(n_firsts)
                + 2 * n_firsts
                + n_pairs * record_size,
        )
    }

    fn add(&mut self, first: GlyphId16, second: GlyphId16, val1: ValueRecord, val2: ValueRecord) {
        self.first_glyphs.insert(first);
        self.pairs.insert((first, second));
        self.value_formats.0 |= val1.format();
        self.value_formats.1 |= val2.format();
        self.table.insert(first, second, (val1, val2));
    }
}

impl Default for ClassPairBuilder {
    fn default() -> Self {
        ClassPairBuilder {
            pairs: Vec::new(),
            classdef_1: ClassDefBuilder::new(true),
            classdef_2: ClassDefBuilder::new(false),
            n_first_glyphs: 0,
            value_formats: (0, 0),
        }
    }
}

impl ClassPairBuilder {
    fn fit(&self, first: &GlyphClass, second: &GlyphClass, val1: &ValueRecord, val2: &ValueRecord) -> Fit {
        if !self.classdef_1.can_add(first) || !self.classdef_2.can_add(second) {
            return Fit::Overlap;
        }
        let new_first = !self.classdef_1.contains(first);
        let new_second = !self.classdef_2.contains(second);
        let class1_count = self.classdef_1.n_classes() + usize::from(new_first);
        let class2_count = self.classdef_2.n_classes() + usize::from(new_second) + 1;
        let n_first_glyphs = self.n_first_glyphs + if new_first { first.len() } else { 0 };
        let record_size = value_record_size(self.value_formats.0 | val1.format())
            + value_record_size(self.value_formats.1 | val2.format());
        Fit::Size(
            16 + CoverageTable::size_bound(n_first_glyphs)
                + self.classdef_1.size_bound_after(first)
                + self.classdef_2.size_bound_after(second)
                + class1_count * class2_count * record_size,
        )
    }

    fn add(&mut self, first: GlyphClass, second: GlyphClass, val1: ValueRecord, val2: ValueRecord) {
        if !self.classdef_1.contains(&first) {
            self.n_first_glyphs += first.len();
        }
        self.classdef_1.checked_add(first.clone());
        self.classdef_2.checked_add(second.clone());
        self.value_formats.0 |= val1.format();
        self.value_formats.1 |= val2.format();
        self.pairs.push((first, second, val1, val2));
    }
}

impl SubtableBuilder for PairPosBuilder {
    type Item = PairItem;

    fn fit(&self, item: &Self::Item) -> Fit {
        match (self, item) {
            (PairPosBuilder::Empty, _) => Fit::Size(0),
            (PairPosBuilder::Glyph(builder), PairItem::Glyph(first, second, val1, val2)) => {
                builder.fit(*first, *second, val1, val2)
            }
            (PairPosBuilder::Class(builder), PairItem::Class(first, second, val1, val2)) => {
                builder.fit(first, second, val1, val2)
            }
            _ => Fit::Incompatible,
        }
    }

    fn add(&mut self, item: Self::Item) {
        if matches!(self, PairPosBuilder::Empty) {
            *self = match item {
                PairItem::Glyph(..) => PairPosBuilder::Glyph(Default::default()),
                PairItem::Class(..) => PairPosBuilder::Class(Default::default()),
            };
        }
        match (self, item) {
            (PairPosBuilder::Glyph(builder), PairItem::Glyph(first, second, val1, val2)) => {
                builder.add(first, second, val1, val2)
            }
            (PairPosBuilder::Class(builder), PairItem::Class(first, second, val1, val2)) => {
                builder.add(first, second, val1, val2)
            }
            // the driver never adds an incompatible item
            _ => log::error!("pair positioning item added to a subtable of the other format"),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, PairPosBuilder::Empty)
    }

    fn build(self, _ctx: &PackCtx) -> Subtable {
        let table = match self {
            PairPosBuilder::Empty => PairPos::Glyph(Default::default()),
            PairPosBuilder::Glyph(builder) => PairPos::Glyph(builder.table),
            PairPosBuilder::Class(builder) => PairPos::Class(PairPosFormat2::new(
                &builder.pairs,
                builder.classdef_1,
                builder.classdef_2,
            )),
        };
        Subtable::PairPos(table)
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct CursivePosBuilder {
    table: CursivePos,
    anchor_bytes: usize,
}

impl CursivePosBuilder {
    fn anchor_bytes(entry: &Option<Anchor>, exit: &Option<Anchor>) -> usize {
        [entry, exit].into_iter().flatten().map(anchor_size).sum()
    }
}

impl SubtableBuilder for CursivePosBuilder {
    type Item = (GlyphId16, Option<Anchor>, Option<Anchor>);

    fn fit(&self, (_, entry, exit): &Self::Item) -> Fit {
        let n_glyphs = self.table.len() + 1;
        Fit::Size(
            6 + 4 * n_glyphs
                + CoverageTable::size_bound(n_glyphs)
                + self.anchor_bytes
                + Self::anchor_bytes(entry, exit),
        )
    }

    fn add(&mut self, (glyph, entry, exit): Self::Item) {
        self.anchor_bytes += Self::anchor_bytes(&entry, &exit);
        self.table.insert(glyph, entry, exit);
    }

    fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    fn build(self, _ctx: &PackCtx) -> Subtable {
        Subtable::CursivePos(self.table)
    }
}

/// The encoded size of the mark coverage and mark array, which every mark
/// attachment subtable of a lookup carries in full.
fn mark_array_bytes(marks: &MarkRecords) -> usize {
    let anchors: usize = marks.values().map(|(_, anchor)| anchor_size(anchor)).sum();
    CoverageTable::size_bound(marks.len()) + 2 + 4 * marks.len() + anchors
}

fn row_bytes(row: &[Option<Anchor>]) -> usize {
    2 * row.len() + row.iter().flatten().map(anchor_size).sum::<usize>()
}

#[derive(Clone, Debug)]
pub(crate) struct MarkBaseBuilder {
    mark_to_mark: bool,
    marks: MarkRecords,
    class_count: u16,
    mark_bytes: usize,
    bases: BTreeMap<GlyphId16, Vec<Option<Anchor>>>,
    row_bytes: usize,
}

impl MarkBaseBuilder {
    pub(crate) fn new(marks: &MarkSet, mark_to_mark: bool) -> Self {
        MarkBaseBuilder {
            mark_to_mark,
            marks: marks.marks.clone(),
            class_count: marks.class_count(),
            mark_bytes: mark_array_bytes(&marks.marks),
            bases: BTreeMap::new(),
            row_bytes: 0,
        }
    }
}

impl SubtableBuilder for MarkBaseBuilder {
    type Item = BaseRecord;

    fn fit(&self, (_, row): &Self::Item) -> Fit {
        let n_bases = self.bases.len() + 1;
        Fit::Size(
            12 + self.mark_bytes
                + CoverageTable::size_bound(n_bases)
                + 2
                + self.row_bytes
                + row_bytes(row),
        )
    }

    fn add(&mut self, (glyph, row): Self::Item) {
        self.row_bytes += row_bytes(&row);
        self.bases.insert(glyph, row);
    }

    fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    fn build(self, _ctx: &PackCtx) -> Subtable {
        Subtable::MarkBasePos(MarkBasePos {
            mark_to_mark: self.mark_to_mark,
            marks: self.marks,
            class_count: self.class_count,
            bases: self.bases,
        })
    }
}

#[derive(Clone, Debug)]
pub(crate) struct MarkLigBuilder {
    marks: MarkRecords,
    class_count: u16,
    mark_bytes: usize,
    ligatures: BTreeMap<GlyphId16, Vec<Vec<Option<Anchor>>>>,
    attach_bytes: usize,
}

impl MarkLigBuilder {
    pub(crate) fn new(marks: &MarkSet) -> Self {
        MarkLigBuilder {
            marks: marks.marks.clone(),
            class_count: marks.class_count(),
            mark_bytes: mark_array_bytes(&marks.marks),
            ligatures: BTreeMap::new(),
            attach_bytes: 0,
        }
    }

    // a LigatureAttach table, and its offset in the ligature array
    fn attach_bytes(rows: &[Vec<Option<Anchor>>]) -> usize {
        2 + 2 + rows.iter().map(|row| row_bytes(row)).sum::<usize>()
    }
}

impl SubtableBuilder for MarkLigBuilder {
    type Item = LigatureRecord;

    fn fit(&self, (_, rows): &Self::Item) -> Fit {
        let n_ligatures = self.ligatures.len() + 1;
        Fit::Size(
            12 + self.mark_bytes
                + CoverageTable::size_bound(n_ligatures)
                + 2
                + self.attach_bytes
                + Self::attach_bytes(rows),
        )
    }

    fn add(&mut self, (glyph, rows): Self::Item) {
        self.attach_bytes += Self::attach_bytes(&rows);
        self.ligatures.insert(glyph, rows);
    }

    fn is_empty(&self) -> bool {
        self.ligatures.is_empty()
    }

    fn build(self, _ctx: &PackCtx) -> Subtable {
        Subtable::MarkLigPos(MarkLigPos {
            marks: self.marks,
            class_count: self.class_count,
            ligatures: self.ligatures,
        })
    }
}
