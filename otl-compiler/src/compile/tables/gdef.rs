//! The GDEF table

use std::collections::BTreeMap;

use write_fonts::types::GlyphId16;

use crate::{
    model::CaretValues,
    write::{write_len, FontWrite, OffsetLen, Structure, TableWriter},
};

use super::layout::{ClassDef, CoverageTable};

/// The glyph classes of the GlyphClassDef table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum GlyphClassDef {
    Base = 1,
    Ligature = 2,
    Mark = 3,
    Component = 4,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Gdef {
    pub(crate) glyph_classes: BTreeMap<GlyphId16, GlyphClassDef>,
    pub(crate) ligature_carets: BTreeMap<GlyphId16, CaretValues>,
    pub(crate) mark_attach_classes: BTreeMap<GlyphId16, u16>,
    pub(crate) mark_glyph_sets: Vec<CoverageTable>,
}

struct LigCaretList<'a>(&'a BTreeMap<GlyphId16, CaretValues>);

struct LigGlyph<'a>(&'a CaretValues);

enum CaretValue {
    Coordinate(i16),
    ContourPoint(u16),
}

struct MarkGlyphSets<'a>(&'a [CoverageTable]);

impl Gdef {
    pub(crate) fn is_empty(&self) -> bool {
        self.glyph_classes.is_empty()
            && self.ligature_carets.is_empty()
            && self.mark_attach_classes.is_empty()
            && self.mark_glyph_sets.is_empty()
    }
}

impl FontWrite for Gdef {
    fn write_into(&self, writer: &mut TableWriter) {
        let glyph_class_def = (!self.glyph_classes.is_empty()).then(|| {
            self.glyph_classes
                .iter()
                .map(|(gid, cls)| (*gid, *cls as u16))
                .collect::<ClassDef>()
        });
        let mark_attach_class_def = (!self.mark_attach_classes.is_empty()).then(|| {
            self.mark_attach_classes
                .iter()
                .map(|(gid, cls)| (*gid, *cls))
                .collect::<ClassDef>()
        });
        let lig_caret_list =
            (!self.ligature_carets.is_empty()).then_some(LigCaretList(&self.ligature_carets));

        1u16.write_into(writer);
        // minor version 2 adds the mark glyph sets
        let minor_version: u16 = if self.mark_glyph_sets.is_empty() { 0 } else { 2 };
        minor_version.write_into(writer);
        writer.write_optional_offset(
            glyph_class_def.as_ref().map(|x| x as &dyn FontWrite),
            OffsetLen::Offset16,
            Structure::GlyphClassDef,
        );
        // attachList
        writer.write_null_offset(OffsetLen::Offset16);
        writer.write_optional_offset(
            lig_caret_list.as_ref().map(|x| x as &dyn FontWrite),
            OffsetLen::Offset16,
            Structure::LigCaretList,
        );
        writer.write_optional_offset(
            mark_attach_class_def.as_ref().map(|x| x as &dyn FontWrite),
            OffsetLen::Offset16,
            Structure::MarkAttachClassDef,
        );
        if minor_version == 2 {
            writer.write_offset(
                &MarkGlyphSets(&self.mark_glyph_sets),
                OffsetLen::Offset16,
                Structure::MarkGlyphSets,
            );
        }
    }
}

impl FontWrite for LigCaretList<'_> {
    fn write_into(&self, writer: &mut TableWriter) {
        let coverage = self.0.keys().copied().collect::<CoverageTable>();
        writer.write_offset(&coverage, OffsetLen::Offset16, Structure::Coverage);
        write_len(self.0.len(), writer);
        for carets in self.0.values() {
            writer.write_offset(&LigGlyph(carets), OffsetLen::Offset16, Structure::LigGlyph);
        }
    }
}

impl FontWrite for LigGlyph<'_> {
    fn write_into(&self, writer: &mut TableWriter) {
        let carets = match self.0 {
            CaretValues::Positions(coords) => coords
                .iter()
                .copied()
                .map(CaretValue::Coordinate)
                .collect::<Vec<_>>(),
            CaretValues::ContourPoints(points) => points
                .iter()
                .copied()
                .map(CaretValue::ContourPoint)
                .collect(),
        };
        write_len(carets.len(), writer);
        for caret in &carets {
            writer.write_offset(caret, OffsetLen::Offset16, Structure::CaretValue);
        }
    }
}

impl FontWrite for CaretValue {
    fn write_into(&self, writer: &mut TableWriter) {
        match self {
            CaretValue::Coordinate(coord) => {
                1u16.write_into(writer);
                coord.write_into(writer);
            }
            CaretValue::ContourPoint(point) => {
                2u16.write_into(writer);
                point.write_into(writer);
            }
        }
    }
}

impl FontWrite for MarkGlyphSets<'_> {
    fn write_into(&self, writer: &mut TableWriter) {
        1u16.write_into(writer);
        write_len(self.0.len(), writer);
        for coverage in self.0 {
            writer.write_offset(coverage, OffsetLen::Offset32, Structure::Coverage);
        }
    }
}
