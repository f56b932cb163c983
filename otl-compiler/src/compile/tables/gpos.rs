//! GPOS subtables

use std::{collections::BTreeMap, sync::Arc};

use write_fonts::types::GlyphId16;

use crate::{
    common::GlyphClass,
    model::{Anchor, ValueRecord},
    write::{write_len, FontWrite, OffsetLen, Structure, TableWriter},
};

use super::layout::{ClassDef, ClassDefBuilder, CoverageTable};

/// Mark glyphs with their class index and anchor.
pub(crate) type MarkRecords = Arc<BTreeMap<GlyphId16, (u16, Anchor)>>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SinglePos {
    items: BTreeMap<GlyphId16, ValueRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PairPos {
    Glyph(PairPosFormat1),
    Class(PairPosFormat2),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct PairPosFormat1 {
    pairs: BTreeMap<GlyphId16, BTreeMap<GlyphId16, (ValueRecord, ValueRecord)>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PairPosFormat2 {
    coverage: CoverageTable,
    class_def1: ClassDef,
    class_def2: ClassDef,
    /// indexed by class 1, then class 2
    records: Vec<Vec<(ValueRecord, ValueRecord)>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct CursivePos {
    items: BTreeMap<GlyphId16, (Option<Anchor>, Option<Anchor>)>,
}

/// Mark-to-base, or mark-to-mark (the layout is the same).
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MarkBasePos {
    pub(crate) mark_to_mark: bool,
    pub(crate) marks: MarkRecords,
    pub(crate) class_count: u16,
    /// one anchor per mark class
    pub(crate) bases: BTreeMap<GlyphId16, Vec<Option<Anchor>>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MarkLigPos {
    pub(crate) marks: MarkRecords,
    pub(crate) class_count: u16,
    /// for each component, one anchor per mark class
    pub(crate) ligatures: BTreeMap<GlyphId16, Vec<Vec<Option<Anchor>>>>,
}

struct PairSet<'a> {
    value_format1: u16,
    value_format2: u16,
    pairs: &'a BTreeMap<GlyphId16, (ValueRecord, ValueRecord)>,
}

struct MarkArray<'a>(&'a BTreeMap<GlyphId16, (u16, Anchor)>);

/// A BaseArray, a Mark2Array, or a LigatureAttach: rows of optional anchors.
struct AnchorMatrix<'a>(&'a [&'a [Option<Anchor>]]);

struct LigatureArray<'a>(&'a BTreeMap<GlyphId16, Vec<Vec<Option<Anchor>>>>);

/// The encoded size of a value record with this format.
pub(crate) fn value_record_size(format: u16) -> usize {
    2 * format.count_ones() as usize
}

/// The encoded size of an anchor table.
pub(crate) fn anchor_size(anchor: &Anchor) -> usize {
    if anchor.contour_point.is_some() {
        8
    } else {
        6
    }
}

fn write_value_record(record: &ValueRecord, format: u16, writer: &mut TableWriter) {
    for (bit, field) in [
        (0x0001, record.x_placement),
        (0x0002, record.y_placement),
        (0x0004, record.x_advance),
        (0x0008, record.y_advance),
    ] {
        if format & bit != 0 {
            field.unwrap_or_default().write_into(writer);
        }
    }
}

impl FontWrite for Anchor {
    fn write_into(&self, writer: &mut TableWriter) {
        match self.contour_point {
            None => {
                1u16.write_into(writer);
                self.x.write_into(writer);
                self.y.write_into(writer);
            }
            Some(point) => {
                2u16.write_into(writer);
                self.x.write_into(writer);
                self.y.write_into(writer);
                point.write_into(writer);
            }
        }
    }
}

impl FromIterator<(GlyphId16, ValueRecord)> for SinglePos {
    fn from_iter<T: IntoIterator<Item = (GlyphId16, ValueRecord)>>(iter: T) -> Self {
        SinglePos {
            items: iter.into_iter().collect(),
        }
    }
}

impl FontWrite for SinglePos {
    fn write_into(&self, writer: &mut TableWriter) {
        let coverage = self.items.keys().copied().collect::<CoverageTable>();
        let format = self.items.values().fold(0, |acc, val| acc | val.format());
        let first = self.items.values().next().copied().unwrap_or_default();
        if self.items.values().all(|val| *val == first) {
            1u16.write_into(writer);
            writer.write_offset(&coverage, OffsetLen::Offset16, Structure::Coverage);
            format.write_into(writer);
            write_value_record(&first, format, writer);
        } else {
            2u16.write_into(writer);
            writer.write_offset(&coverage, OffsetLen::Offset16, Structure::Coverage);
            format.write_into(writer);
            write_len(self.items.len(), writer);
            for value in self.items.values() {
                write_value_record(value, format, writer);
            }
        }
    }
}

impl PairPosFormat1 {
    /// Add a pair; if the pair is already present, the existing values win.
    pub(crate) fn insert(
        &mut self,
        first: GlyphId16,
        second: GlyphId16,
        values: (ValueRecord, ValueRecord),
    ) {
        self.pairs
            .entry(first)
            .or_default()
            .entry(second)
            .or_insert(values);
    }

    fn value_formats(&self) -> (u16, u16) {
        self.pairs
            .values()
            .flat_map(|set| set.values())
            .fold((0, 0), |(one, two), (val1, val2)| {
                (one | val1.format(), two | val2.format())
            })
    }
}

impl FontWrite for PairPos {
    fn write_into(&self, writer: &mut TableWriter) {
        match self {
            PairPos::Glyph(table) => table.write_into(writer),
            PairPos::Class(table) => table.write_into(writer),
        }
    }
}

impl FontWrite for PairPosFormat1 {
    fn write_into(&self, writer: &mut TableWriter) {
        let coverage = self.pairs.keys().copied().collect::<CoverageTable>();
        let (value_format1, value_format2) = self.value_formats();
        1u16.write_into(writer);
        writer.write_offset(&coverage, OffsetLen::Offset16, Structure::Coverage);
        value_format1.write_into(writer);
        value_format2.write_into(writer);
        write_len(self.pairs.len(), writer);
        for pairs in self.pairs.values() {
            let pair_set = PairSet {
                value_format1,
                value_format2,
                pairs,
            };
            writer.write_offset(&pair_set, OffsetLen::Offset16, Structure::PairSet);
        }
    }
}

impl FontWrite for PairSet<'_> {
    fn write_into(&self, writer: &mut TableWriter) {
        write_len(self.pairs.len(), writer);
        for (second, (val1, val2)) in self.pairs {
            second.write_into(writer);
            write_value_record(val1, self.value_format1, writer);
            write_value_record(val2, self.value_format2, writer);
        }
    }
}

impl PairPosFormat2 {
    /// Build from class pairs and the class definitions that contain them.
    ///
    /// The first class definition should use class 0; every first class must
    /// have been added to `classdef_1`, and every second class to `classdef_2`.
    pub(crate) fn new(
        pairs: &[(GlyphClass, GlyphClass, ValueRecord, ValueRecord)],
        classdef_1: ClassDefBuilder,
        classdef_2: ClassDefBuilder,
    ) -> Self {
        let (class_def1, class1_ids) = classdef_1.build();
        let (class_def2, class2_ids) = classdef_2.build();
        let class1_count = class1_ids.len();
        let class2_count = class2_ids.len() + 1;
        let mut records = vec![vec![Default::default(); class2_count]; class1_count];
        for (first, second, val1, val2) in pairs {
            let (Some(class1), Some(class2)) = (class1_ids.get(first), class2_ids.get(second))
            else {
                continue;
            };
            records[*class1 as usize][*class2 as usize] = (*val1, *val2);
        }
        let coverage = pairs
            .iter()
            .flat_map(|(first, ..)| first.iter())
            .collect::<CoverageTable>();
        PairPosFormat2 {
            coverage,
            class_def1,
            class_def2,
            records,
        }
    }

    pub(crate) fn class1_count(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn class2_count(&self) -> usize {
        self.records.first().map(Vec::len).unwrap_or_default()
    }
}

impl FontWrite for PairPosFormat2 {
    fn write_into(&self, writer: &mut TableWriter) {
        let (value_format1, value_format2) = self
            .records
            .iter()
            .flatten()
            .fold((0, 0), |(one, two), (val1, val2)| {
                (one | val1.format(), two | val2.format())
            });
        2u16.write_into(writer);
        writer.write_offset(&self.coverage, OffsetLen::Offset16, Structure::Coverage);
        value_format1.write_into(writer);
        value_format2.write_into(writer);
        writer.write_offset(&self.class_def1, OffsetLen::Offset16, Structure::ClassDef1);
        writer.write_offset(&self.class_def2, OffsetLen::Offset16, Structure::ClassDef2);
        write_len(self.class1_count(), writer);
        write_len(self.class2_count(), writer);
        for (val1, val2) in self.records.iter().flatten() {
            write_value_record(val1, value_format1, writer);
            write_value_record(val2, value_format2, writer);
        }
    }
}

impl CursivePos {
    /// Add an entry/exit pair; an existing entry for this glyph wins.
    pub(crate) fn insert(&mut self, glyph: GlyphId16, entry: Option<Anchor>, exit: Option<Anchor>) {
        self.items.entry(glyph).or_insert((entry, exit));
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

impl FontWrite for CursivePos {
    fn write_into(&self, writer: &mut TableWriter) {
        let coverage = self.items.keys().copied().collect::<CoverageTable>();
        1u16.write_into(writer);
        writer.write_offset(&coverage, OffsetLen::Offset16, Structure::Coverage);
        write_len(self.items.len(), writer);
        for (entry, exit) in self.items.values() {
            for anchor in [entry, exit] {
                writer.write_optional_offset(
                    anchor.as_ref().map(|x| x as &dyn FontWrite),
                    OffsetLen::Offset16,
                    Structure::CursiveAttach,
                );
            }
        }
    }
}

impl FontWrite for MarkArray<'_> {
    fn write_into(&self, writer: &mut TableWriter) {
        write_len(self.0.len(), writer);
        for (class, anchor) in self.0.values() {
            class.write_into(writer);
            writer.write_offset(anchor, OffsetLen::Offset16, Structure::Anchor);
        }
    }
}

impl FontWrite for AnchorMatrix<'_> {
    fn write_into(&self, writer: &mut TableWriter) {
        write_len(self.0.len(), writer);
        for row in self.0 {
            for anchor in row.iter() {
                writer.write_optional_offset(
                    anchor.as_ref().map(|x| x as &dyn FontWrite),
                    OffsetLen::Offset16,
                    Structure::Anchor,
                );
            }
        }
    }
}

impl FontWrite for MarkBasePos {
    fn write_into(&self, writer: &mut TableWriter) {
        let (base_coverage, base_array) = if self.mark_to_mark {
            (Structure::BaseMarkCoverage, Structure::BaseMarkArray)
        } else {
            (Structure::BaseCoverage, Structure::BaseArray)
        };
        let mark_coverage = self.marks.keys().copied().collect::<CoverageTable>();
        let coverage = self.bases.keys().copied().collect::<CoverageTable>();
        let rows = self.bases.values().map(Vec::as_slice).collect::<Vec<_>>();
        1u16.write_into(writer);
        writer.write_offset(&mark_coverage, OffsetLen::Offset16, Structure::MarkCoverage);
        writer.write_offset(&coverage, OffsetLen::Offset16, base_coverage);
        self.class_count.write_into(writer);
        writer.write_offset(&MarkArray(&self.marks), OffsetLen::Offset16, Structure::MarkArray);
        writer.write_offset(&AnchorMatrix(&rows), OffsetLen::Offset16, base_array);
    }
}

impl FontWrite for MarkLigPos {
    fn write_into(&self, writer: &mut TableWriter) {
        let mark_coverage = self.marks.keys().copied().collect::<CoverageTable>();
        let coverage = self.ligatures.keys().copied().collect::<CoverageTable>();
        1u16.write_into(writer);
        writer.write_offset(&mark_coverage, OffsetLen::Offset16, Structure::MarkCoverage);
        writer.write_offset(&coverage, OffsetLen::Offset16, Structure::LigatureCoverage);
        self.class_count.write_into(writer);
        writer.write_offset(&MarkArray(&self.marks), OffsetLen::Offset16, Structure::MarkArray);
        writer.write_offset(
            &LigatureArray(&self.ligatures),
            OffsetLen::Offset16,
            Structure::LigatureArray,
        );
    }
}

impl FontWrite for LigatureArray<'_> {
    fn write_into(&self, writer: &mut TableWriter) {
        write_len(self.0.len(), writer);
        for components in self.0.values() {
            let rows = components.iter().map(Vec::as_slice).collect::<Vec<_>>();
            writer.write_offset(
                &AnchorMatrix(&rows),
                OffsetLen::Offset16,
                Structure::LigatureAttach,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::dump_table;

    fn gid(id: u16) -> GlyphId16 {
        GlyphId16::new(id)
    }

    fn class(ids: &[u16]) -> GlyphClass {
        ids.iter().copied().map(GlyphId16::new).collect()
    }

    #[test]
    fn single_pos_format_1_when_values_match() {
        let value = ValueRecord::new().with_x_advance(-20);
        let table: SinglePos = [(gid(3), value), (gid(4), value)].into_iter().collect();
        let bytes = dump_table(&table).unwrap();
        // format, coverage offset, value format, x advance
        assert_eq!(&bytes[..8], &[0, 1, 0, 8, 0, 4, 0xff, 0xec]);
    }

    #[test]
    fn single_pos_format_2_unions_formats() {
        let table: SinglePos = [
            (gid(3), ValueRecord::new().with_x_advance(5)),
            (gid(4), ValueRecord::new().with_x_placement(7)),
        ]
        .into_iter()
        .collect();
        let bytes = dump_table(&table).unwrap();
        // format 2, coverage offset, format 0x5, count 2, then 2x2 fields
        assert_eq!(&bytes[..8], &[0, 2, 0, 16, 0, 5, 0, 2]);
        assert_eq!(&bytes[8..16], &[0, 0, 0, 5, 0, 7, 0, 0]);
    }

    #[test]
    fn pair_pos_first_pair_wins() {
        let mut table = PairPosFormat1::default();
        let kern = |x| (ValueRecord::new().with_x_advance(x), ValueRecord::new());
        table.insert(gid(1), gid(2), kern(-10));
        table.insert(gid(1), gid(2), kern(-30));
        let bytes = dump_table(&table).unwrap();
        // header 12 bytes, coverage 6, then the pair set
        assert_eq!(&bytes[18..24], &[0, 1, 0, 2, 0xff, 0xf6]);
    }

    #[test]
    fn class_pair_assigns_class_zero_to_largest() {
        let big = class(&[1, 2, 3]);
        let small = class(&[7]);
        let second = class(&[9]);
        let mut cd1 = ClassDefBuilder::new(true);
        let mut cd2 = ClassDefBuilder::new(false);
        cd1.checked_add(big.clone());
        cd1.checked_add(small.clone());
        cd2.checked_add(second.clone());
        let val = ValueRecord::new().with_x_advance(-5);
        let table = PairPosFormat2::new(
            &[
                (big, second.clone(), val, ValueRecord::new()),
                (small, second, val, ValueRecord::new()),
            ],
            cd1,
            cd2,
        );
        assert_eq!(table.class1_count(), 2);
        assert_eq!(table.class2_count(), 2);
        assert_eq!(table.class_def1.get(gid(1)), 0);
        assert_eq!(table.class_def1.get(gid(7)), 1);
        assert_eq!(table.coverage.iter().count(), 4);
        assert_eq!(table.records[1][1].0, val);
        assert_eq!(table.records[1][0].0, ValueRecord::new());
    }

    #[test]
    fn mark_base_missing_anchor_is_null() {
        let marks: MarkRecords = Arc::new(
            [(gid(10), (0, Anchor::new(0, 500))), (gid(11), (1, Anchor::new(0, -20)))]
                .into_iter()
                .collect(),
        );
        let table = MarkBasePos {
            mark_to_mark: false,
            marks,
            class_count: 2,
            bases: [(gid(1), vec![Some(Anchor::new(250, 600)), None])]
                .into_iter()
                .collect(),
        };
        let bytes = dump_table(&table).unwrap();
        // header (12), mark coverage (8), base coverage (6),
        // mark array (2 + 2 * 4) then its two anchors (12)
        let base_array = 12 + 8 + 6 + 10 + 12;
        assert_eq!(&bytes[10..12], &(base_array as u16).to_be_bytes());
        // one base, with an anchor for class 0 and nothing for class 1
        assert_eq!(&bytes[base_array..base_array + 2], &[0, 1]);
        assert_ne!(&bytes[base_array + 2..base_array + 4], &[0, 0]);
        assert_eq!(&bytes[base_array + 4..base_array + 6], &[0, 0]);
    }
}
