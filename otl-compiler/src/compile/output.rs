//! The result of a compilation

use write_fonts::FontBuilder;

use crate::{common::tags, DiagnosticSet};

/// The output of a successful compilation.
///
/// A table is `None` if it was not requested, or if it would have been empty.
#[derive(Clone, Debug, Default)]
pub struct Compilation {
    pub gdef: Option<Vec<u8>>,
    pub gsub: Option<Vec<u8>>,
    pub gpos: Option<Vec<u8>>,
    /// Notes and warnings produced along the way
    pub diagnostics: DiagnosticSet,
}

impl Compilation {
    /// The compiled tables, with their tags, in tag order.
    pub fn tables(&self) -> impl Iterator<Item = (write_fonts::types::Tag, &[u8])> + '_ {
        [
            (tags::GDEF, &self.gdef),
            (tags::GPOS, &self.gpos),
            (tags::GSUB, &self.gsub),
        ]
        .into_iter()
        .filter_map(|(tag, bytes)| bytes.as_deref().map(|bytes| (tag, bytes)))
    }

    /// Wrap the compiled tables in a minimal sfnt.
    ///
    /// The result contains only the layout tables; it is intended for
    /// inspection with tools such as `ttx`, or for merging into a font.
    pub fn to_font_bytes(&self) -> Vec<u8> {
        let mut builder = FontBuilder::new();
        for (tag, bytes) in self.tables() {
            builder.add_raw(tag, bytes);
        }
        builder.build()
    }
}
