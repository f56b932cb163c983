//! Structures shared by GSUB, GPOS and GDEF.

use std::collections::{BTreeMap, HashMap, HashSet};

use write_fonts::types::{GlyphId16, Tag};

use crate::{
    common::GlyphClass,
    write::{write_len, FontWrite, OffsetLen, Structure, TableWriter},
};

use super::Subtable;

/// A coverage table; the glyphs are sorted and unique.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct CoverageTable {
    glyphs: Vec<GlyphId16>,
}

/// A class definition table; glyphs in class 0 are not stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ClassDef {
    items: BTreeMap<GlyphId16, u16>,
}

// There is a ClassDef builder in write-fonts, but we need more from it:
//
// - to assign the largest class the lowest id
// - to be able to retrieve the id for a given class, before building
// - to handle optionally assigning class 0 or not
// - to know an upper bound on the size of the table as classes are added
#[derive(Clone, Debug, Default)]
pub(crate) struct ClassDefBuilder {
    classes: HashSet<GlyphClass>,
    glyphs: HashSet<GlyphId16>,
    first: Option<GlyphId16>,
    last: Option<GlyphId16>,
    use_class_0: bool,
}

/// The table header shared by GSUB and GPOS.
#[derive(Clone, Debug, Default)]
pub(crate) struct LayoutHeader {
    pub(crate) script_list: ScriptList,
    pub(crate) feature_list: FeatureList,
    pub(crate) lookup_list: LookupList,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ScriptList {
    pub(crate) scripts: Vec<(Tag, Script)>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Script {
    pub(crate) default_lang_sys: Option<LangSys>,
    pub(crate) lang_sys: Vec<(Tag, LangSys)>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct LangSys {
    pub(crate) feature_indices: Vec<u16>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct FeatureList {
    pub(crate) features: Vec<(Tag, Feature)>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Feature {
    pub(crate) lookup_indices: Vec<u16>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct LookupList {
    pub(crate) lookups: Vec<Lookup>,
}

#[derive(Clone, Debug)]
pub(crate) struct Lookup {
    pub(crate) lookup_type: u16,
    pub(crate) flag: u16,
    pub(crate) mark_filtering_set: Option<u16>,
    pub(crate) subtables: Vec<Subtable>,
    /// If set, subtables are wrapped in extension subtables of this type.
    pub(crate) extension_type: Option<u16>,
}

/// An extension subtable; the same layout in GSUB (type 7) and GPOS (type 9).
struct Extension<'a> {
    lookup_type: u16,
    subtable: &'a Subtable,
}

/// A chained contextual subtable, format 3. Shared by GSUB and GPOS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ChainContextFormat3 {
    /// In reverse logical order: the glyph closest to the input comes first.
    pub(crate) backtrack: Vec<CoverageTable>,
    pub(crate) input: Vec<CoverageTable>,
    pub(crate) lookahead: Vec<CoverageTable>,
    /// (sequence index, lookup list index)
    pub(crate) lookup_records: Vec<(u16, u16)>,
}

impl CoverageTable {
    pub(crate) fn iter(&self) -> impl Iterator<Item = GlyphId16> + '_ {
        self.glyphs.iter().copied()
    }

    /// The largest possible encoded size of a coverage table with this many glyphs.
    pub(crate) fn size_bound(n_glyphs: usize) -> usize {
        4 + 2 * n_glyphs
    }

    fn ranges(&self) -> Vec<(GlyphId16, GlyphId16)> {
        let mut ranges: Vec<(GlyphId16, GlyphId16)> = Vec::new();
        for gid in self.iter() {
            match ranges.last_mut() {
                Some((_, end)) if end.to_u16() + 1 == gid.to_u16() => *end = gid,
                _ => ranges.push((gid, gid)),
            }
        }
        ranges
    }
}

impl FromIterator<GlyphId16> for CoverageTable {
    fn from_iter<T: IntoIterator<Item = GlyphId16>>(iter: T) -> Self {
        let mut glyphs = iter.into_iter().collect::<Vec<_>>();
        glyphs.sort_unstable();
        glyphs.dedup();
        CoverageTable { glyphs }
    }
}

impl FontWrite for CoverageTable {
    fn write_into(&self, writer: &mut TableWriter) {
        let ranges = self.ranges();
        if ranges.len() * 3 < self.glyphs.len() {
            2u16.write_into(writer);
            write_len(ranges.len(), writer);
            let mut coverage_index = 0;
            for (start, end) in ranges {
                start.write_into(writer);
                end.write_into(writer);
                write_len(coverage_index, writer);
                coverage_index += glyph_span(start, end);
            }
        } else {
            1u16.write_into(writer);
            write_len(self.glyphs.len(), writer);
            self.glyphs.write_into(writer);
        }
    }
}

impl ClassDef {
    pub(crate) fn get(&self, gid: GlyphId16) -> u16 {
        self.items.get(&gid).copied().unwrap_or_default()
    }

    fn ranges(&self) -> Vec<(GlyphId16, GlyphId16, u16)> {
        let mut ranges: Vec<(GlyphId16, GlyphId16, u16)> = Vec::new();
        for (gid, class) in &self.items {
            match ranges.last_mut() {
                Some((_, end, prev)) if end.to_u16() + 1 == gid.to_u16() && prev == class => {
                    *end = *gid
                }
                _ => ranges.push((*gid, *gid, *class)),
            }
        }
        ranges
    }

    /// `None` if empty, or if the class values cannot be stored as one array.
    fn format_1_size(&self) -> Option<usize> {
        let first = self.items.keys().next()?;
        let last = self.items.keys().next_back()?;
        format_1_size(*first, *last)
    }
}

/// The number of glyph ids from `first` through `last`.
fn glyph_span(first: GlyphId16, last: GlyphId16) -> usize {
    (last.to_u16() as usize + 1).saturating_sub(first.to_u16() as usize)
}

/// The size of a format 1 class definition covering `first` through `last`.
///
/// The glyph count is a u16, so a class def spanning every glyph id needs format 2.
fn format_1_size(first: GlyphId16, last: GlyphId16) -> Option<usize> {
    let span = glyph_span(first, last);
    (span <= u16::MAX as usize).then_some(6 + 2 * span)
}

impl FromIterator<(GlyphId16, u16)> for ClassDef {
    fn from_iter<T: IntoIterator<Item = (GlyphId16, u16)>>(iter: T) -> Self {
        ClassDef {
            items: iter.into_iter().filter(|(_, class)| *class != 0).collect(),
        }
    }
}

impl FontWrite for ClassDef {
    fn write_into(&self, writer: &mut TableWriter) {
        let ranges = self.ranges();
        let format_2_size = 4 + 6 * ranges.len();
        match self.format_1_size() {
            Some(size) if size <= format_2_size => {
                let first = self.items.keys().next().copied().unwrap_or_default();
                let last = self.items.keys().next_back().copied().unwrap_or_default();
                1u16.write_into(writer);
                first.write_into(writer);
                write_len(glyph_span(first, last), writer);
                for gid in first.to_u16()..=last.to_u16() {
                    self.get(GlyphId16::new(gid)).write_into(writer);
                }
            }
            _ => {
                2u16.write_into(writer);
                write_len(ranges.len(), writer);
                for (start, end, class) in ranges {
                    start.write_into(writer);
                    end.write_into(writer);
                    class.write_into(writer);
                }
            }
        }
    }
}

impl ClassDefBuilder {
    /// Create a new class def builder.
    ///
    /// If `use_class_0` is true, we will assign the '0' class id to one of the
    /// added classes; otherwise it will be unused (and implicitly refer to
    /// 'all other glyphs').
    pub(crate) fn new(use_class_0: bool) -> Self {
        Self {
            use_class_0,
            ..Default::default()
        }
    }

    /// `true` if the class is already present, or shares no glyphs with
    /// any class already present.
    pub(crate) fn can_add(&self, cls: &GlyphClass) -> bool {
        self.classes.contains(cls) || cls.iter().all(|gid| !self.glyphs.contains(&gid))
    }

    pub(crate) fn contains(&self, cls: &GlyphClass) -> bool {
        self.classes.contains(cls)
    }

    /// Check that this class can be added to this classdef, and add it if so.
    ///
    /// returns `true` if the class is added, and `false` otherwise.
    pub(crate) fn checked_add(&mut self, cls: GlyphClass) -> bool {
        if !self.can_add(&cls) {
            return false;
        }
        if let (Some(first), Some(last)) = (cls.first(), cls.items().last().copied()) {
            self.first = Some(self.first.map_or(first, |prev| prev.min(first)));
            self.last = Some(self.last.map_or(last, |prev| prev.max(last)));
        }
        self.glyphs.extend(cls.iter());
        self.classes.insert(cls);
        true
    }

    /// The number of distinct classes added.
    pub(crate) fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// An upper bound on the encoded size of the built table.
    pub(crate) fn size_bound(&self) -> usize {
        Self::size_bound_with(self.glyphs.len(), self.first.zip(self.last))
    }

    /// The size bound after adding this class, if it could be added.
    pub(crate) fn size_bound_after(&self, cls: &GlyphClass) -> usize {
        if self.classes.contains(cls) || cls.is_empty() {
            return self.size_bound();
        }
        let first = cls.first().unwrap_or_default();
        let last = cls.items().last().copied().unwrap_or_default();
        let span = match self.first.zip(self.last) {
            Some((prev_first, prev_last)) => (prev_first.min(first), prev_last.max(last)),
            None => (first, last),
        };
        Self::size_bound_with(self.glyphs.len() + cls.len(), Some(span))
    }

    fn size_bound_with(n_glyphs: usize, span: Option<(GlyphId16, GlyphId16)>) -> usize {
        let format_2 = 4 + 6 * n_glyphs;
        match span {
            Some((first, last)) => format_1_size(first, last)
                .map_or(format_2, |format_1| format_1.min(format_2)),
            None => format_2,
        }
    }

    /// Returns a compiled classdef, as well as a mapping from our class
    /// objects to the final class ids.
    ///
    /// Larger classes receive lower ids; ties go to the class with the lowest
    /// glyph id.
    pub(crate) fn build(self) -> (ClassDef, HashMap<GlyphClass, u16>) {
        let mut classes = self.classes.into_iter().collect::<Vec<_>>();
        classes.sort_unstable_by_key(|cls| (std::cmp::Reverse(cls.len()), cls.first()));
        let add_one = u16::from(!self.use_class_0);
        let mapping = classes
            .into_iter()
            .enumerate()
            .map(|(i, cls)| (cls, i as u16 + add_one))
            .collect::<HashMap<_, _>>();
        let class_def = mapping
            .iter()
            .flat_map(|(cls, id)| cls.iter().map(move |gid| (gid, *id)))
            .collect::<ClassDef>();
        (class_def, mapping)
    }
}

impl FontWrite for LayoutHeader {
    fn write_into(&self, writer: &mut TableWriter) {
        1u16.write_into(writer);
        0u16.write_into(writer);
        writer.write_offset(&self.script_list, OffsetLen::Offset16, Structure::ScriptList);
        writer.write_offset(&self.feature_list, OffsetLen::Offset16, Structure::FeatureList);
        writer.write_offset(&self.lookup_list, OffsetLen::Offset16, Structure::LookupList);
    }
}

impl FontWrite for ScriptList {
    fn write_into(&self, writer: &mut TableWriter) {
        write_len(self.scripts.len(), writer);
        for (tag, script) in &self.scripts {
            tag.write_into(writer);
            writer.write_offset(script, OffsetLen::Offset16, Structure::Script);
        }
    }
}

impl FontWrite for Script {
    fn write_into(&self, writer: &mut TableWriter) {
        writer.write_optional_offset(
            self.default_lang_sys.as_ref().map(|x| x as &dyn FontWrite),
            OffsetLen::Offset16,
            Structure::LangSys,
        );
        write_len(self.lang_sys.len(), writer);
        for (tag, lang_sys) in &self.lang_sys {
            tag.write_into(writer);
            writer.write_offset(lang_sys, OffsetLen::Offset16, Structure::LangSys);
        }
    }
}

impl FontWrite for LangSys {
    fn write_into(&self, writer: &mut TableWriter) {
        // lookupOrderOffset, reserved
        0u16.write_into(writer);
        // no required feature
        0xFFFFu16.write_into(writer);
        write_len(self.feature_indices.len(), writer);
        self.feature_indices.write_into(writer);
    }
}

impl FontWrite for FeatureList {
    fn write_into(&self, writer: &mut TableWriter) {
        write_len(self.features.len(), writer);
        for (tag, feature) in &self.features {
            tag.write_into(writer);
            writer.write_offset(feature, OffsetLen::Offset16, Structure::Feature);
        }
    }
}

impl FontWrite for Feature {
    fn write_into(&self, writer: &mut TableWriter) {
        // featureParamsOffset
        writer.write_null_offset(OffsetLen::Offset16);
        write_len(self.lookup_indices.len(), writer);
        self.lookup_indices.write_into(writer);
    }
}

impl FontWrite for LookupList {
    fn write_into(&self, writer: &mut TableWriter) {
        write_len(self.lookups.len(), writer);
        for (i, lookup) in self.lookups.iter().enumerate() {
            writer.set_lookup(Some(i as u16));
            writer.write_offset(lookup, OffsetLen::Offset16, Structure::Lookup);
        }
        writer.set_lookup(None);
    }
}

impl FontWrite for Lookup {
    fn write_into(&self, writer: &mut TableWriter) {
        self.extension_type
            .unwrap_or(self.lookup_type)
            .write_into(writer);
        self.flag.write_into(writer);
        write_len(self.subtables.len(), writer);
        for subtable in &self.subtables {
            match self.extension_type {
                Some(_) => writer.write_offset(
                    &Extension {
                        lookup_type: self.lookup_type,
                        subtable,
                    },
                    OffsetLen::Offset16,
                    Structure::LookupSubtable,
                ),
                None => writer.write_deferred_offset(
                    subtable,
                    OffsetLen::Offset16,
                    Structure::LookupSubtable,
                ),
            }
        }
        if let Some(set) = self.mark_filtering_set {
            set.write_into(writer);
        }
    }
}

impl FontWrite for Extension<'_> {
    fn write_into(&self, writer: &mut TableWriter) {
        1u16.write_into(writer);
        self.lookup_type.write_into(writer);
        writer.write_deferred_offset(
            self.subtable,
            OffsetLen::Offset32,
            Structure::LookupSubtable,
        );
    }
}

impl FontWrite for ChainContextFormat3 {
    fn write_into(&self, writer: &mut TableWriter) {
        3u16.write_into(writer);
        for (coverages, target) in [
            (&self.backtrack, Structure::BacktrackCoverage),
            (&self.input, Structure::InputCoverage),
            (&self.lookahead, Structure::LookaheadCoverage),
        ] {
            write_len(coverages.len(), writer);
            for coverage in coverages {
                writer.write_offset(coverage, OffsetLen::Offset16, target);
            }
        }
        write_len(self.lookup_records.len(), writer);
        for (sequence_index, lookup_index) in &self.lookup_records {
            sequence_index.write_into(writer);
            lookup_index.write_into(writer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::dump_table;

    fn glyph_class(glyphs: &[u16]) -> GlyphClass {
        glyphs.iter().copied().map(GlyphId16::new).collect()
    }

    #[test]
    fn coverage_formats() {
        let sparse: CoverageTable = [1u16, 3, 5].into_iter().map(GlyphId16::new).collect();
        assert_eq!(
            dump_table(&sparse).unwrap(),
            [0, 1, 0, 3, 0, 1, 0, 3, 0, 5]
        );
        let dense: CoverageTable = (10u16..20).map(GlyphId16::new).collect();
        assert_eq!(
            dump_table(&dense).unwrap(),
            [0, 2, 0, 1, 0, 10, 0, 19, 0, 0]
        );
        assert!(dump_table(&dense).unwrap().len() <= CoverageTable::size_bound(10));
    }

    #[test]
    fn coverage_of_every_glyph() {
        let all: CoverageTable = (0..=u16::MAX).map(GlyphId16::new).collect();
        assert_eq!(
            dump_table(&all).unwrap(),
            [0, 2, 0, 1, 0, 0, 0xff, 0xff, 0, 0]
        );
    }

    #[test]
    fn class_def_spanning_every_glyph_id() {
        let ends: ClassDef = [(0u16, 1u16), (u16::MAX, 1)]
            .into_iter()
            .map(|(gid, cls)| (GlyphId16::new(gid), cls))
            .collect();
        assert_eq!(
            dump_table(&ends).unwrap(),
            [0, 2, 0, 2, 0, 0, 0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff, 0, 1]
        );
        let all: ClassDef = (0..=u16::MAX).map(|gid| (GlyphId16::new(gid), 2)).collect();
        assert_eq!(
            dump_table(&all).unwrap(),
            [0, 2, 0, 1, 0, 0, 0xff, 0xff, 0, 2]
        );

        let mut builder = ClassDefBuilder::default();
        let ends = glyph_class(&[0, u16::MAX]);
        assert_eq!(builder.size_bound_after(&ends), 4 + 6 * 2);
        builder.checked_add(ends);
        assert_eq!(builder.size_bound(), 4 + 6 * 2);
    }

    #[test]
    fn class_def_formats() {
        let contiguous: ClassDef = [(4u16, 1u16), (5, 1), (6, 2)]
            .into_iter()
            .map(|(gid, cls)| (GlyphId16::new(gid), cls))
            .collect();
        // format 1: 6 + 2 * 3 = 12 bytes, format 2 would be 4 + 6 * 2
        assert_eq!(
            dump_table(&contiguous).unwrap(),
            [0, 1, 0, 4, 0, 3, 0, 1, 0, 1, 0, 2]
        );
        let spread: ClassDef = [(1u16, 1u16), (1000, 1)]
            .into_iter()
            .map(|(gid, cls)| (GlyphId16::new(gid), cls))
            .collect();
        assert_eq!(dump_table(&spread).unwrap().len(), 4 + 6 * 2);
        let empty = ClassDef::default();
        assert_eq!(dump_table(&empty).unwrap(), [0, 2, 0, 0]);
    }

    #[test]
    fn class_builder_with_class_0() {
        let mut builder = ClassDefBuilder::new(true);
        assert!(builder.checked_add(glyph_class(&[6, 10])));
        let (cls, _) = builder.build();
        assert_eq!(cls.get(GlyphId16::new(6)), 0);
        assert_eq!(dump_table(&cls).unwrap(), [0, 2, 0, 0]);
    }

    #[test]
    fn class_builder_assign_order() {
        // longer classes before short ones; if tied, lowest glyph id first
        let mut builder = ClassDefBuilder::default();
        builder.checked_add(glyph_class(&[7, 8, 9]));
        builder.checked_add(glyph_class(&[12, 3]));
        builder.checked_add(glyph_class(&[1, 4]));
        assert!(!builder.checked_add(glyph_class(&[4, 5])));
        assert!(builder.checked_add(glyph_class(&[7, 9, 8])));
        assert_eq!(builder.n_classes(), 3);
        let (cls, mapping) = builder.build();
        assert_eq!(cls.get(GlyphId16::new(9)), 1);
        assert_eq!(cls.get(GlyphId16::new(1)), 2);
        assert_eq!(cls.get(GlyphId16::new(12)), 3);
        assert_eq!(cls.get(GlyphId16::new(5)), 0);
        assert_eq!(mapping.get(&glyph_class(&[3, 12])), Some(&3));
    }

    #[test]
    fn class_builder_size_bound() {
        let mut builder = ClassDefBuilder::default();
        let first = glyph_class(&[1, 2, 3]);
        let second = glyph_class(&[500]);
        assert_eq!(builder.size_bound_after(&first), 6 + 2 * 3);
        builder.checked_add(first);
        // span 1..=500 would be larger than 4 ranges
        assert_eq!(builder.size_bound_after(&second), 4 + 6 * 4);
        builder.checked_add(second);
        let bound = builder.size_bound();
        let (class_def, _) = builder.build();
        assert!(dump_table(&class_def).unwrap().len() <= bound);
    }

    #[test]
    fn extension_lookup_uses_32_bit_offsets() {
        use super::super::gsub::SingleSubst;
        let subtable = Subtable::SingleSub(SingleSubst::from_iter([(
            GlyphId16::new(1),
            GlyphId16::new(2),
        )]));
        let lookup = Lookup {
            lookup_type: 1,
            flag: 0,
            mark_filtering_set: None,
            subtables: vec![subtable],
            extension_type: Some(7),
        };
        let bytes = dump_table(&lookup).unwrap();
        // lookup: type, flag, count, offset (8 bytes); then the extension
        assert_eq!(&bytes[..8], &[0, 7, 0, 0, 0, 1, 0, 8]);
        // extension: format, type, 32-bit offset to the subtable
        assert_eq!(&bytes[8..16], &[0, 1, 0, 1, 0, 0, 0, 8]);
        // the actual subtable is single substitution format 1
        assert_eq!(&bytes[16..18], &[0, 1]);
    }
}
