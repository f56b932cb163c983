//! The binary structures of the layout tables.
//!
//! These types hold exactly what ends up in the font; deciding what goes into
//! them (deduplication, partitioning into subtables, class assignment) happens
//! earlier, in the packer.

use crate::write::{FontWrite, TableWriter};

pub(crate) mod gdef;
pub(crate) mod gpos;
pub(crate) mod gsub;
pub(crate) mod layout;

/// A single lookup subtable, of any type.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Subtable {
    SingleSub(gsub::SingleSubst),
    MultipleSub(gsub::MultipleSubst),
    AlternateSub(gsub::AlternateSubst),
    LigatureSub(gsub::LigatureSubst),
    ReverseChainSub(gsub::ReverseChainSingleSubst),
    ChainContext(layout::ChainContextFormat3),
    SinglePos(gpos::SinglePos),
    PairPos(gpos::PairPos),
    CursivePos(gpos::CursivePos),
    MarkBasePos(gpos::MarkBasePos),
    MarkLigPos(gpos::MarkLigPos),
}

impl FontWrite for Subtable {
    fn write_into(&self, writer: &mut TableWriter) {
        match self {
            Subtable::SingleSub(table) => table.write_into(writer),
            Subtable::MultipleSub(table) => table.write_into(writer),
            Subtable::AlternateSub(table) => table.write_into(writer),
            Subtable::LigatureSub(table) => table.write_into(writer),
            Subtable::ReverseChainSub(table) => table.write_into(writer),
            Subtable::ChainContext(table) => table.write_into(writer),
            Subtable::SinglePos(table) => table.write_into(writer),
            Subtable::PairPos(table) => table.write_into(writer),
            Subtable::CursivePos(table) => table.write_into(writer),
            Subtable::MarkBasePos(table) => table.write_into(writer),
            Subtable::MarkLigPos(table) => table.write_into(writer),
        }
    }
}
