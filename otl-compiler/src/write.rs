//! Serializing tables to bytes.
//!
//! Tables describe themselves to a [`TableWriter`], which collects the bytes
//! of each table along with the offsets it contains. Once the root table is
//! written, every table is assigned a position and every offset is resolved;
//! the first offset that does not fit in its field is reported as an
//! [`Overflow`].
//!
//! Placement is a fixed depth-first walk: a table is followed by the tables it
//! references via *inline* offsets, in the order the offsets are written.
//! Tables referenced via *deferred* offsets (lookup subtables) are queued and
//! placed after everything reachable inline from the root, in the order they
//! were encountered.

use std::{
    collections::VecDeque,
    fmt::{Display, Formatter},
};

use write_fonts::types::{GlyphId16, Tag};

/// A type that can be written out as part of a layout table.
pub(crate) trait FontWrite {
    /// Write our data and information about offsets into this [TableWriter].
    fn write_into(&self, writer: &mut TableWriter);
}

/// The width of an offset field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OffsetLen {
    Offset16 = 2,
    Offset32 = 4,
}

/// Where a referenced table is placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Immediately after the referencing table (and its earlier children)
    Inline,
    /// After every table reachable inline from the root
    Deferred,
}

/// The kind of structure an offset points to.
///
/// This is used to name the target of an overflowing offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Structure {
    ScriptList,
    Script,
    LangSys,
    FeatureList,
    Feature,
    LookupList,
    Lookup,
    LookupSubtable,
    Coverage,
    BacktrackCoverage,
    InputCoverage,
    LookaheadCoverage,
    MarkCoverage,
    BaseCoverage,
    LigatureCoverage,
    BaseMarkCoverage,
    ClassDef1,
    ClassDef2,
    Sequence,
    AlternateSet,
    LigatureSet,
    Ligature,
    PairSet,
    CursiveAttach,
    MarkArray,
    BaseArray,
    BaseMarkArray,
    LigatureArray,
    LigatureAttach,
    Anchor,
    GlyphClassDef,
    LigCaretList,
    LigGlyph,
    CaretValue,
    MarkAttachClassDef,
    MarkGlyphSets,
}

/// A record of an offset that does not fit in its field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Overflow {
    /// The index (in its lookup list) of the lookup owning the offending offset.
    ///
    /// This is `None` for offsets outside of any lookup (for instance in the
    /// script or feature lists, or in GDEF).
    pub lookup: Option<u16>,
    /// The structure the offset points to
    pub target: Structure,
    /// The resolved offset value
    pub value: u64,
}

/// An object that manages a collection of serialized tables.
#[derive(Debug)]
pub(crate) struct TableWriter {
    /// Finished tables; the index is the object id.
    tables: Vec<TableData>,
    /// Tables currently being written.
    stack: Vec<TableData>,
    cur_lookup: Option<u16>,
}

/// The encoded data for a given table, along with info on included offsets
#[derive(Debug, Default, Clone)]
struct TableData {
    bytes: Vec<u8>,
    offsets: Vec<OffsetRecord>,
    lookup: Option<u16>,
}

/// The position and type of an offset, along with the id of the pointed-to table
#[derive(Debug, Clone)]
struct OffsetRecord {
    /// the position of the offset within the parent table
    pos: usize,
    len: OffsetLen,
    object: usize,
    target: Structure,
    placement: Placement,
}

/// Attempt to serialize a table.
///
/// Returns the bytes of the table, or the first overflowing offset.
pub(crate) fn dump_table(table: &dyn FontWrite) -> Result<Vec<u8>, Overflow> {
    let mut writer = TableWriter::default();
    table.write_into(&mut writer);
    writer.finish()
}

impl OffsetLen {
    fn max_value(self) -> u64 {
        match self {
            OffsetLen::Offset16 => u16::MAX as u64,
            OffsetLen::Offset32 => u32::MAX as u64,
        }
    }
}

impl Structure {
    pub(crate) fn is_lookup_subtable(self) -> bool {
        matches!(self, Structure::LookupSubtable)
    }
}

impl Display for Structure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Structure::ScriptList => "a script list",
            Structure::Script => "a script table",
            Structure::LangSys => "a language system table",
            Structure::FeatureList => "a feature list",
            Structure::Feature => "a feature table",
            Structure::LookupList => "a lookup list",
            Structure::Lookup => "a lookup table",
            Structure::LookupSubtable => "a lookup subtable",
            Structure::Coverage => "a coverage table",
            Structure::BacktrackCoverage => "a backtrack coverage table",
            Structure::InputCoverage => "an input coverage table",
            Structure::LookaheadCoverage => "a lookahead coverage table",
            Structure::MarkCoverage => "a mark coverage table",
            Structure::BaseCoverage => "a base coverage table",
            Structure::LigatureCoverage => "a ligature coverage table",
            Structure::BaseMarkCoverage => "a base mark coverage table",
            Structure::ClassDef1 => "a class 1 definition table",
            Structure::ClassDef2 => "a class 2 definition table",
            Structure::Sequence => "a sequence table",
            Structure::AlternateSet => "an alternate set table",
            Structure::LigatureSet => "a ligature set table",
            Structure::Ligature => "a ligature table",
            Structure::PairSet => "a pair set table",
            Structure::CursiveAttach => "a cursive attach table",
            Structure::MarkArray => "a mark array",
            Structure::BaseArray => "a base array",
            Structure::BaseMarkArray => "a base mark array",
            Structure::LigatureArray => "a ligature array",
            Structure::LigatureAttach => "a ligature attach table",
            Structure::Anchor => "an anchor table",
            Structure::GlyphClassDef => "a glyph class definition table",
            Structure::LigCaretList => "a ligature caret list",
            Structure::LigGlyph => "a ligature glyph table",
            Structure::CaretValue => "a caret value table",
            Structure::MarkAttachClassDef => "a mark attachment class definition table",
            Structure::MarkGlyphSets => "a mark glyph sets table",
        })
    }
}

impl TableWriter {
    fn add_table(&mut self, table: &dyn FontWrite) -> usize {
        self.stack.push(TableData {
            lookup: self.cur_lookup,
            ..Default::default()
        });
        table.write_into(self);
        let data = self.stack.pop().unwrap();
        self.tables.push(data);
        self.tables.len() - 1
    }

    /// Attribute the tables written from now on to this lookup.
    pub(crate) fn set_lookup(&mut self, lookup: Option<u16>) {
        self.cur_lookup = lookup;
    }

    /// Write raw bytes into this table.
    ///
    /// The caller is responsible for ensuring bytes are in big-endian order.
    #[inline]
    pub(crate) fn write_slice(&mut self, bytes: &[u8]) {
        self.stack
            .last_mut()
            .unwrap()
            .bytes
            .extend_from_slice(bytes)
    }

    /// Create an offset to a table that is placed inline.
    ///
    /// The provided table is serialized immediately; its offset is resolved
    /// when the root table is finished.
    pub(crate) fn write_offset(&mut self, obj: &dyn FontWrite, len: OffsetLen, target: Structure) {
        self.write_offset_impl(obj, len, target, Placement::Inline)
    }

    /// Create an offset to a table that is placed after the inline tables.
    pub(crate) fn write_deferred_offset(
        &mut self,
        obj: &dyn FontWrite,
        len: OffsetLen,
        target: Structure,
    ) {
        self.write_offset_impl(obj, len, target, Placement::Deferred)
    }

    /// Write an offset field that points nowhere.
    pub(crate) fn write_null_offset(&mut self, len: OffsetLen) {
        self.write_slice(&[0u8; 4][..len as usize]);
    }

    /// Write an offset if `obj` is present, and a null offset otherwise.
    pub(crate) fn write_optional_offset(
        &mut self,
        obj: Option<&dyn FontWrite>,
        len: OffsetLen,
        target: Structure,
    ) {
        match obj {
            Some(obj) => self.write_offset(obj, len, target),
            None => self.write_null_offset(len),
        }
    }

    fn write_offset_impl(
        &mut self,
        obj: &dyn FontWrite,
        len: OffsetLen,
        target: Structure,
        placement: Placement,
    ) {
        let object = self.add_table(obj);
        let data = self.stack.last_mut().unwrap();
        data.offsets.push(OffsetRecord {
            pos: data.bytes.len(),
            len,
            object,
            target,
            placement,
        });
        self.write_null_offset(len);
    }

    /// Finish writing, placing every table and resolving offsets.
    fn finish(mut self) -> Result<Vec<u8>, Overflow> {
        let root = self.stack.pop().unwrap();
        self.tables.push(root);
        let root_id = self.tables.len() - 1;
        let order = self.placement_order(root_id);

        let mut positions = vec![0usize; self.tables.len()];
        let mut total = 0;
        for id in &order {
            positions[*id] = total;
            total += self.tables[*id].bytes.len();
        }

        // find the first overflow before writing anything
        for id in &order {
            let table = &self.tables[*id];
            for offset in &table.offsets {
                let resolved = resolved_offset(&positions, *id, offset);
                if resolved > offset.len.max_value() {
                    return Err(Overflow {
                        lookup: table.lookup,
                        target: offset.target,
                        value: resolved,
                    });
                }
            }
        }

        let mut out = Vec::with_capacity(total);
        for id in &order {
            let table = &self.tables[*id];
            let start = out.len();
            out.extend_from_slice(&table.bytes);
            for offset in &table.offsets {
                let resolved = resolved_offset(&positions, *id, offset);
                let at = &mut out[start + offset.pos..start + offset.pos + offset.len as usize];
                match offset.len {
                    OffsetLen::Offset16 => at.copy_from_slice(&(resolved as u16).to_be_bytes()),
                    OffsetLen::Offset32 => at.copy_from_slice(&(resolved as u32).to_be_bytes()),
                }
            }
        }
        Ok(out)
    }

    fn placement_order(&self, root: usize) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.tables.len());
        let mut deferred = VecDeque::new();
        deferred.push_back(root);
        while let Some(next) = deferred.pop_front() {
            self.place(next, &mut order, &mut deferred);
        }
        order
    }

    fn place(&self, id: usize, order: &mut Vec<usize>, deferred: &mut VecDeque<usize>) {
        order.push(id);
        for offset in &self.tables[id].offsets {
            match offset.placement {
                Placement::Inline => self.place(offset.object, order, deferred),
                Placement::Deferred => deferred.push_back(offset.object),
            }
        }
    }
}

fn resolved_offset(positions: &[usize], parent: usize, offset: &OffsetRecord) -> u64 {
    // children are always placed after their parents
    (positions[offset.object] - positions[parent]) as u64
}

impl Default for TableWriter {
    fn default() -> Self {
        TableWriter {
            tables: Vec::new(),
            stack: vec![TableData::default()],
            cur_lookup: None,
        }
    }
}

impl FontWrite for u16 {
    fn write_into(&self, writer: &mut TableWriter) {
        writer.write_slice(&self.to_be_bytes())
    }
}

impl FontWrite for i16 {
    fn write_into(&self, writer: &mut TableWriter) {
        writer.write_slice(&self.to_be_bytes())
    }
}

impl FontWrite for u32 {
    fn write_into(&self, writer: &mut TableWriter) {
        writer.write_slice(&self.to_be_bytes())
    }
}

impl FontWrite for GlyphId16 {
    fn write_into(&self, writer: &mut TableWriter) {
        self.to_u16().write_into(writer)
    }
}

impl FontWrite for Tag {
    fn write_into(&self, writer: &mut TableWriter) {
        writer.write_slice(&self.into_bytes())
    }
}

impl<T: FontWrite> FontWrite for [T] {
    fn write_into(&self, writer: &mut TableWriter) {
        for item in self {
            item.write_into(writer);
        }
    }
}

/// Write a `u16` array length.
///
/// Builders never produce arrays longer than the glyph count, which is itself
/// a u16, so saturating is only a guard against misuse.
pub(crate) fn write_len(len: usize, writer: &mut TableWriter) {
    u16::try_from(len).unwrap_or(u16::MAX).write_into(writer)
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;

    /// A table made of filler bytes, with offsets to other mock tables.
    #[derive(Clone, Debug)]
    pub(crate) struct Mock {
        pub(crate) size: usize,
        pub(crate) children: Vec<(Mock, OffsetLen, Structure, Placement)>,
        pub(crate) lookup: Option<u16>,
    }

    impl Mock {
        pub(crate) fn new(size: usize) -> Self {
            Mock {
                size,
                children: Vec::new(),
                lookup: None,
            }
        }

        pub(crate) fn child(mut self, child: Mock, len: OffsetLen, target: Structure) -> Self {
            self.children.push((child, len, target, Placement::Inline));
            self
        }

        pub(crate) fn deferred(mut self, child: Mock, target: Structure) -> Self {
            self.children
                .push((child, OffsetLen::Offset16, target, Placement::Deferred));
            self
        }

        pub(crate) fn in_lookup(mut self, lookup: u16) -> Self {
            self.lookup = Some(lookup);
            self
        }
    }

    impl FontWrite for Mock {
        fn write_into(&self, writer: &mut TableWriter) {
            if self.lookup.is_some() {
                writer.set_lookup(self.lookup);
            }
            for (child, len, target, placement) in &self.children {
                match placement {
                    Placement::Inline => writer.write_offset(child, *len, *target),
                    Placement::Deferred => writer.write_deferred_offset(child, *len, *target),
                }
            }
            writer.write_slice(&vec![0xca; self.size]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::Mock;
    use super::*;

    struct Pair(u16, Mock);

    impl FontWrite for Pair {
        fn write_into(&self, writer: &mut TableWriter) {
            self.0.write_into(writer);
            writer.write_offset(&self.1, OffsetLen::Offset16, Structure::Coverage);
        }
    }

    #[test]
    fn offsets_are_resolved() {
        let table = Pair(0xbeef, Mock::new(3));
        let bytes = dump_table(&table).unwrap();
        assert_eq!(bytes, [0xbe, 0xef, 0x00, 0x04, 0xca, 0xca, 0xca]);
    }

    #[test]
    fn deferred_tables_come_last() {
        // root -> a (inline) -> a1 (deferred)
        //      -> b (inline)
        let a = Mock::new(2).deferred(Mock::new(1), Structure::LookupSubtable);
        let b = Mock::new(2);
        let root = Mock::new(0)
            .child(a, OffsetLen::Offset16, Structure::Lookup)
            .child(b, OffsetLen::Offset16, Structure::Lookup);
        let bytes = dump_table(&root).unwrap();
        // root: 2 offsets (4 bytes); a: offset + 2 bytes = 4; b: 2 bytes; a1: 1
        assert_eq!(bytes.len(), 4 + 4 + 2 + 1);
        // root -> a
        assert_eq!(&bytes[0..2], &[0, 4]);
        // root -> b
        assert_eq!(&bytes[2..4], &[0, 8]);
        // a -> a1: a is at 4, a1 at 10
        assert_eq!(&bytes[4..6], &[0, 6]);
    }

    #[test]
    fn overflow_is_reported_with_value_and_target() {
        let big = Mock::new(0x10000);
        let root = Mock::new(0)
            .child(big, OffsetLen::Offset16, Structure::Coverage)
            .child(Mock::new(4), OffsetLen::Offset16, Structure::ClassDef2);
        let err = dump_table(&root).unwrap_err();
        assert_eq!(err.target, Structure::ClassDef2);
        // root is 4 bytes, then 0x10000 bytes of coverage
        assert_eq!(err.value, 0x10004);
        assert_eq!(err.lookup, None);
    }

    #[test]
    fn offset32_does_not_overflow() {
        let root = Mock::new(0)
            .child(Mock::new(0x20000), OffsetLen::Offset32, Structure::Coverage)
            .child(Mock::new(1), OffsetLen::Offset32, Structure::LookupSubtable);
        let bytes = dump_table(&root).unwrap();
        assert_eq!(&bytes[4..8], &0x20008u32.to_be_bytes());
    }

    #[test]
    fn overflow_is_attributed_to_lookup() {
        let subtable = Mock::new(0)
            .child(Mock::new(0xfffc), OffsetLen::Offset16, Structure::Coverage)
            .child(Mock::new(2), OffsetLen::Offset16, Structure::BaseCoverage);
        let lookup = Mock::new(4)
            .deferred(subtable, Structure::LookupSubtable)
            .in_lookup(3);
        let err = dump_table(&lookup).unwrap_err();
        assert_eq!(err.lookup, Some(3));
        assert_eq!(err.target, Structure::BaseCoverage);
        // the subtable is 4 bytes, followed by its coverage
        assert_eq!(err.value, 0x10000);
        assert!(!err.target.is_lookup_subtable());
        assert_eq!(err.target.to_string(), "a base coverage table");
    }
}
