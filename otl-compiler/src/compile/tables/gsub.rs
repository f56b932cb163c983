//! GSUB subtables

use std::collections::BTreeMap;

use write_fonts::types::GlyphId16;

use crate::write::{write_len, FontWrite, OffsetLen, Structure, TableWriter};

use super::layout::CoverageTable;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SingleSubst {
    mapping: BTreeMap<GlyphId16, GlyphId16>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct MultipleSubst {
    mapping: BTreeMap<GlyphId16, Vec<GlyphId16>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct AlternateSubst {
    mapping: BTreeMap<GlyphId16, Vec<GlyphId16>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct LigatureSubst {
    /// first glyph -> (remaining components, ligature glyph)
    sets: BTreeMap<GlyphId16, Vec<(Vec<GlyphId16>, GlyphId16)>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ReverseChainSingleSubst {
    /// In reverse logical order: the glyph closest to the input comes first.
    pub(crate) backtrack: Vec<CoverageTable>,
    pub(crate) lookahead: Vec<CoverageTable>,
    pub(crate) mapping: BTreeMap<GlyphId16, GlyphId16>,
}

/// A Sequence or AlternateSet table: a counted glyph array.
struct GlyphArray<'a>(&'a [GlyphId16]);

struct LigatureSet<'a>(&'a [(Vec<GlyphId16>, GlyphId16)]);

struct Ligature<'a> {
    glyph: GlyphId16,
    components: &'a [GlyphId16],
}

impl SingleSubst {
    fn delta(target: GlyphId16, replacement: GlyphId16) -> u16 {
        replacement.to_u16().wrapping_sub(target.to_u16())
    }
}

impl FromIterator<(GlyphId16, GlyphId16)> for SingleSubst {
    fn from_iter<T: IntoIterator<Item = (GlyphId16, GlyphId16)>>(iter: T) -> Self {
        SingleSubst {
            mapping: iter.into_iter().collect(),
        }
    }
}

impl FontWrite for SingleSubst {
    fn write_into(&self, writer: &mut TableWriter) {
        let coverage = self.mapping.keys().copied().collect::<CoverageTable>();
        let mut deltas = self
            .mapping
            .iter()
            .map(|(target, replacement)| Self::delta(*target, *replacement));
        let first_delta = deltas.next().unwrap_or_default();
        if deltas.all(|delta| delta == first_delta) {
            1u16.write_into(writer);
            writer.write_offset(&coverage, OffsetLen::Offset16, Structure::Coverage);
            first_delta.write_into(writer);
        } else {
            2u16.write_into(writer);
            writer.write_offset(&coverage, OffsetLen::Offset16, Structure::Coverage);
            write_len(self.mapping.len(), writer);
            for replacement in self.mapping.values() {
                replacement.write_into(writer);
            }
        }
    }
}

impl FromIterator<(GlyphId16, Vec<GlyphId16>)> for MultipleSubst {
    fn from_iter<T: IntoIterator<Item = (GlyphId16, Vec<GlyphId16>)>>(iter: T) -> Self {
        MultipleSubst {
            mapping: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<(GlyphId16, Vec<GlyphId16>)> for AlternateSubst {
    fn from_iter<T: IntoIterator<Item = (GlyphId16, Vec<GlyphId16>)>>(iter: T) -> Self {
        AlternateSubst {
            mapping: iter.into_iter().collect(),
        }
    }
}

fn write_sequence_subst(
    mapping: &BTreeMap<GlyphId16, Vec<GlyphId16>>,
    target: Structure,
    writer: &mut TableWriter,
) {
    let coverage = mapping.keys().copied().collect::<CoverageTable>();
    1u16.write_into(writer);
    writer.write_offset(&coverage, OffsetLen::Offset16, Structure::Coverage);
    write_len(mapping.len(), writer);
    for glyphs in mapping.values() {
        writer.write_offset(&GlyphArray(glyphs), OffsetLen::Offset16, target);
    }
}

impl FontWrite for MultipleSubst {
    fn write_into(&self, writer: &mut TableWriter) {
        write_sequence_subst(&self.mapping, Structure::Sequence, writer)
    }
}

impl FontWrite for AlternateSubst {
    fn write_into(&self, writer: &mut TableWriter) {
        write_sequence_subst(&self.mapping, Structure::AlternateSet, writer)
    }
}

impl FontWrite for GlyphArray<'_> {
    fn write_into(&self, writer: &mut TableWriter) {
        write_len(self.0.len(), writer);
        self.0.write_into(writer);
    }
}

impl LigatureSubst {
    pub(crate) fn insert(&mut self, components: &[GlyphId16], glyph: GlyphId16) {
        let Some((first, rest)) = components.split_first() else {
            return;
        };
        self.sets
            .entry(*first)
            .or_default()
            .push((rest.to_vec(), glyph));
    }
}

impl FontWrite for LigatureSubst {
    fn write_into(&self, writer: &mut TableWriter) {
        let coverage = self.sets.keys().copied().collect::<CoverageTable>();
        1u16.write_into(writer);
        writer.write_offset(&coverage, OffsetLen::Offset16, Structure::Coverage);
        write_len(self.sets.len(), writer);
        for ligatures in self.sets.values() {
            // longest match first; otherwise in rule order
            let mut ligatures = ligatures.clone();
            ligatures.sort_by_key(|(rest, _)| std::cmp::Reverse(rest.len()));
            writer.write_offset(
                &LigatureSet(&ligatures),
                OffsetLen::Offset16,
                Structure::LigatureSet,
            );
        }
    }
}

impl FontWrite for LigatureSet<'_> {
    fn write_into(&self, writer: &mut TableWriter) {
        write_len(self.0.len(), writer);
        for (components, glyph) in self.0 {
            let ligature = Ligature {
                glyph: *glyph,
                components,
            };
            writer.write_offset(&ligature, OffsetLen::Offset16, Structure::Ligature);
        }
    }
}

impl FontWrite for Ligature<'_> {
    fn write_into(&self, writer: &mut TableWriter) {
        self.glyph.write_into(writer);
        write_len(self.components.len() + 1, writer);
        self.components.write_into(writer);
    }
}

impl FontWrite for ReverseChainSingleSubst {
    fn write_into(&self, writer: &mut TableWriter) {
        let coverage = self.mapping.keys().copied().collect::<CoverageTable>();
        1u16.write_into(writer);
        writer.write_offset(&coverage, OffsetLen::Offset16, Structure::Coverage);
        for (coverages, target) in [
            (&self.backtrack, Structure::BacktrackCoverage),
            (&self.lookahead, Structure::LookaheadCoverage),
        ] {
            write_len(coverages.len(), writer);
            for coverage in coverages {
                writer.write_offset(coverage, OffsetLen::Offset16, target);
            }
        }
        write_len(self.mapping.len(), writer);
        for replacement in self.mapping.values() {
            replacement.write_into(writer);
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

    #[test]
    fn single_subst_picks_format() {
        let same_delta: SingleSubst = [(gid(1), gid(11)), (gid(2), gid(12))]
            .into_iter()
            .collect();
        let bytes = dump_table(&same_delta).unwrap();
        assert_eq!(&bytes[..6], &[0, 1, 0, 6, 0, 10]);

        let mixed: SingleSubst = [(gid(1), gid(11)), (gid(2), gid(1))].into_iter().collect();
        let bytes = dump_table(&mixed).unwrap();
        assert_eq!(&bytes[..10], &[0, 2, 0, 10, 0, 2, 0, 11, 0, 1]);
    }

    #[test]
    fn negative_delta_wraps() {
        let table: SingleSubst = [(gid(5), gid(2))].into_iter().collect();
        let bytes = dump_table(&table).unwrap();
        assert_eq!(&bytes[4..6], &(-3i16).to_be_bytes());
    }

    #[test]
    fn ligatures_longest_first() {
        let mut table = LigatureSubst::default();
        table.insert(&[gid(1), gid(2)], gid(10));
        table.insert(&[gid(1), gid(2), gid(3)], gid(11));
        let bytes = dump_table(&table).unwrap();
        // header (8) + coverage (6) + ligature set (2 + 2 * 2)
        let set_start = 8 + 6;
        assert_eq!(&bytes[set_start..set_start + 2], &[0, 2]);
        // the first ligature is the three-component one
        let first_offset = u16::from_be_bytes([bytes[set_start + 2], bytes[set_start + 3]]);
        let first_lig = set_start + first_offset as usize;
        assert_eq!(&bytes[first_lig..first_lig + 4], &[0, 11, 0, 3]);
    }
}
